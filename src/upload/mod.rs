//! Upload module
//!
//! Validates and stores the files of a `multipart/form-data` request.
//!
//! Each file part is peeked for its first [`sniff::SNIFF_LEN`] bytes, its
//! content type is sniffed and checked against the [`UploadPolicy`], and it is
//! then streamed to the target directory under either its original name or a
//! random token that keeps the original extension.
//!
//! # Example
//!
//! ```no_run
//! use handler_kit::upload::{upload_files, UploadPolicy};
//! use http_body_util::Full;
//! use bytes::Bytes;
//! use std::path::Path;
//!
//! # async fn example(req: hyper::Request<Full<Bytes>>) {
//! let policy = UploadPolicy::default().allow("image/png").allow("image/jpeg");
//!
//! match upload_files(req, Path::new("./uploads"), &policy, true).await {
//!     Ok(files) => println!("stored {} files", files.len()),
//!     Err(partial) => {
//!         eprintln!("failed after {} files: {}", partial.uploaded.len(), partial.source)
//!     }
//! }
//! # }
//! ```

use crate::fs::ensure_dir;
use crate::metrics;
use bytes::Bytes;
use http_body_util::BodyExt;
use hyper::body::Body;
use hyper::header::CONTENT_TYPE;
use hyper::{Request, StatusCode};
use multer::{Constraints, Field, Multipart, SizeLimit};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

pub mod sniff;
pub mod token;

/// Default ceiling for a whole multipart payload (512 MiB).
pub const DEFAULT_MAX_TOTAL_BYTES: u64 = 512 * 1024 * 1024;

/// Entry of the allowed-type set that permits every content type.
pub const ANY_CONTENT_TYPE: &str = "*";

/// Upload errors
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Uploaded payload is too large (limit {limit} bytes)")]
    PayloadTooLarge { limit: u64 },

    #[error("File type is not allowed: {content_type}")]
    TypeNotAllowed { content_type: String },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to create directory {path}: {source}")]
    DirectoryCreate {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid multipart request: {0}")]
    Multipart(String),

    #[error("No file found in request")]
    NoFile,

    #[error("Exactly one file expected, got {count}")]
    ExpectedSingleFile { count: usize },
}

impl UploadError {
    /// HTTP status a handler should answer with for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            UploadError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            UploadError::TypeNotAllowed { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            UploadError::Multipart(_)
            | UploadError::NoFile
            | UploadError::ExpectedSingleFile { .. } => StatusCode::BAD_REQUEST,
            UploadError::Io(_) | UploadError::DirectoryCreate { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<multer::Error> for UploadError {
    fn from(err: multer::Error) -> Self {
        match err {
            multer::Error::StreamSizeExceeded { limit } => UploadError::PayloadTooLarge { limit },
            multer::Error::FieldSizeExceeded { limit, .. } => {
                UploadError::PayloadTooLarge { limit }
            }
            multer::Error::StreamReadFailed(e) => UploadError::Io(io::Error::other(e)),
            other => UploadError::Multipart(other.to_string()),
        }
    }
}

/// A batch upload that stopped at its first error.
///
/// Files stored before the failure stay on disk and are listed in `uploaded`.
#[derive(Error, Debug)]
#[error("{source}")]
pub struct PartialUpload {
    pub uploaded: Vec<UploadedFile>,
    #[source]
    pub source: UploadError,
}

/// Per-call upload limits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPolicy {
    /// Ceiling for the whole multipart payload, enforced while parsing
    pub max_total_bytes: u64,
    /// Allowed sniffed content types; empty or `"*"` permits everything
    pub allowed_content_types: Vec<String>,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_total_bytes: DEFAULT_MAX_TOTAL_BYTES,
            allowed_content_types: Vec::new(),
        }
    }
}

impl UploadPolicy {
    /// Set the payload ceiling
    pub fn with_max_total_bytes(mut self, max_total_bytes: u64) -> Self {
        self.max_total_bytes = max_total_bytes;
        self
    }

    /// Add a content type to the allowed set
    pub fn allow(mut self, content_type: &str) -> Self {
        self.allowed_content_types.push(content_type.to_string());
        self
    }

    /// Check a sniffed content type against the allowed set.
    ///
    /// Matching is case-insensitive against both the full type and its
    /// essence, so `text/plain` admits `text/plain; charset=utf-8`.
    pub fn allows(&self, content_type: &str) -> bool {
        if self.allowed_content_types.is_empty() {
            return true;
        }
        let essence = sniff::essence(content_type);
        self.allowed_content_types.iter().any(|allowed| {
            let allowed = allowed.trim();
            allowed == ANY_CONTENT_TYPE
                || allowed.eq_ignore_ascii_case(content_type)
                || allowed.eq_ignore_ascii_case(&essence)
        })
    }
}

/// Metadata of one stored file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedFile {
    /// File name as declared by the client, reduced to its last path component
    pub original_name: String,
    /// Name of the file inside the target directory
    pub stored_name: String,
    /// Bytes written to disk
    pub size_bytes: u64,
}

/// Store every file part of a multipart request in `target_dir`.
///
/// Files are processed grouped by form field: fields in the order their first
/// file part appears, each field's files in body order. Parts of the first
/// file field are streamed straight to disk; parts of later fields are held
/// in memory until the body has been read. The first failure stops the
/// batch; records of files stored before it are returned inside
/// [`PartialUpload`].
#[tracing::instrument(
    name = "upload.files",
    skip(req, policy),
    fields(
        upload.dir = %target_dir.display(),
        upload.rename = rename,
        upload.max_bytes = policy.max_total_bytes,
        upload.files = tracing::field::Empty
    ),
    err
)]
pub async fn upload_files<B>(
    req: Request<B>,
    target_dir: &Path,
    policy: &UploadPolicy,
    rename: bool,
) -> Result<Vec<UploadedFile>, PartialUpload>
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let start_time = Instant::now();
    let mut uploaded = Vec::new();

    let result = store_all(req, target_dir, policy, rename, &mut uploaded).await;

    let duration = start_time.elapsed();
    metrics::record_upload_duration(duration.as_secs_f64());
    tracing::Span::current().record("upload.files", uploaded.len());

    match result {
        Ok(()) => {
            info!(
                files = uploaded.len(),
                duration_ms = duration.as_millis(),
                "Upload completed"
            );
            Ok(uploaded)
        }
        Err(source) => Err(PartialUpload { uploaded, source }),
    }
}

/// Store exactly one file part of a multipart request in `target_dir`.
///
/// A request carrying no file fails with [`UploadError::NoFile`]. A request
/// carrying several fails with [`UploadError::ExpectedSingleFile`] and the
/// files this call wrote are removed again.
#[tracing::instrument(
    name = "upload.file",
    skip(req, policy),
    fields(upload.dir = %target_dir.display(), upload.rename = rename),
    err
)]
pub async fn upload_file<B>(
    req: Request<B>,
    target_dir: &Path,
    policy: &UploadPolicy,
    rename: bool,
) -> Result<UploadedFile, UploadError>
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let mut uploaded = match upload_files(req, target_dir, policy, rename).await {
        Ok(uploaded) => uploaded,
        Err(partial) => {
            discard(target_dir, &partial.uploaded).await;
            return Err(partial.source);
        }
    };

    if uploaded.len() > 1 {
        discard(target_dir, &uploaded).await;
        return Err(UploadError::ExpectedSingleFile {
            count: uploaded.len(),
        });
    }

    uploaded.pop().ok_or(UploadError::NoFile)
}

async fn store_all<B>(
    req: Request<B>,
    target_dir: &Path,
    policy: &UploadPolicy,
    rename: bool,
    uploaded: &mut Vec<UploadedFile>,
) -> Result<(), UploadError>
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    ensure_dir(target_dir)
        .await
        .map_err(|source| UploadError::DirectoryCreate {
            path: target_dir.to_path_buf(),
            source,
        })?;

    let mut multipart = multipart_reader(req, policy.max_total_bytes)?;

    let mut first_field: Option<String> = None;
    // Later fields in first-seen order, their parts held back
    let mut held: Vec<(String, Vec<HeldPart>)> = Vec::new();

    while let Some(mut field) = multipart.next_field().await? {
        // Plain form values carry no file name
        let Some(declared) = field.file_name().filter(|n| !n.is_empty()) else {
            continue;
        };
        let original_name = base_name(declared)?;
        let field_name = field.name().unwrap_or_default().to_string();

        let first = first_field.get_or_insert_with(|| field_name.clone());
        if *first == field_name {
            let source = PartSource::Streaming(field);
            store_part(source, original_name, target_dir, policy, rename, uploaded).await?;
            continue;
        }

        let mut chunks = Vec::new();
        while let Some(chunk) = field.chunk().await? {
            chunks.push(chunk);
        }
        debug!(field = %field_name, file = %original_name, "Held back file part");

        let part = HeldPart {
            original_name,
            chunks,
        };
        match held.iter_mut().find(|(name, _)| *name == field_name) {
            Some((_, parts)) => parts.push(part),
            None => held.push((field_name, vec![part])),
        }
    }

    for (_, parts) in held {
        for part in parts {
            let source = PartSource::Held(part.chunks.into_iter());
            store_part(source, part.original_name, target_dir, policy, rename, uploaded).await?;
        }
    }

    Ok(())
}

/// A file part read into memory ahead of its turn
struct HeldPart {
    original_name: String,
    chunks: Vec<Bytes>,
}

/// Chunks of one file part, either still on the wire or held in memory
enum PartSource {
    Streaming(Field<'static>),
    Held(std::vec::IntoIter<Bytes>),
}

impl PartSource {
    async fn chunk(&mut self) -> Result<Option<Bytes>, UploadError> {
        match self {
            PartSource::Streaming(field) => Ok(field.chunk().await?),
            PartSource::Held(chunks) => Ok(chunks.next()),
        }
    }
}

async fn store_part(
    source: PartSource,
    original_name: String,
    target_dir: &Path,
    policy: &UploadPolicy,
    rename: bool,
    uploaded: &mut Vec<UploadedFile>,
) -> Result<(), UploadError> {
    match store_field(source, original_name, target_dir, policy, rename).await {
        Ok(record) => {
            uploaded.push(record);
            Ok(())
        }
        Err(e @ UploadError::TypeNotAllowed { .. }) => {
            metrics::record_file_rejected();
            Err(e)
        }
        Err(e) => {
            metrics::record_file_failed();
            Err(e)
        }
    }
}

fn multipart_reader<B>(req: Request<B>, limit: u64) -> Result<Multipart<'static>, UploadError>
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let content_type = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| UploadError::Multipart("missing Content-Type header".into()))?;
    let boundary = multer::parse_boundary(content_type)?;

    let constraints = Constraints::new().size_limit(SizeLimit::new().whole_stream(limit));
    let stream = req.into_body().into_data_stream();

    Ok(Multipart::with_constraints(stream, boundary, constraints))
}

async fn store_field(
    mut source: PartSource,
    original_name: String,
    target_dir: &Path,
    policy: &UploadPolicy,
    rename: bool,
) -> Result<UploadedFile, UploadError> {
    // Peek the head of the part; the chunks are kept and written out later
    let mut head = Vec::with_capacity(sniff::SNIFF_LEN);
    let mut pending: Vec<Bytes> = Vec::new();
    while head.len() < sniff::SNIFF_LEN {
        let Some(chunk) = source.chunk().await? else {
            break;
        };
        let take = chunk.len().min(sniff::SNIFF_LEN - head.len());
        head.extend_from_slice(&chunk[..take]);
        pending.push(chunk);
    }

    let content_type = sniff::detect_content_type(&head);
    debug!(file = %original_name, content_type, "Sniffed content type");

    if !policy.allows(content_type) {
        warn!(file = %original_name, content_type, "Rejected upload with disallowed type");
        return Err(UploadError::TypeNotAllowed {
            content_type: content_type.to_string(),
        });
    }

    let stored_name = if rename {
        format!(
            "{}{}",
            token::random_token(token::FILE_TOKEN_LEN),
            extension(&original_name)
        )
    } else {
        original_name.clone()
    };
    let path = target_dir.join(&stored_name);

    let mut file = tokio::fs::File::create(&path).await?;
    let size_bytes = match copy_field(&mut file, pending, &mut source).await {
        Ok(n) => n,
        Err(e) => {
            drop(file);
            // Never leave a truncated file behind
            if let Err(rm) = tokio::fs::remove_file(&path).await {
                warn!(path = %path.display(), error = %rm, "Failed to remove partial upload");
            }
            return Err(e);
        }
    };

    metrics::record_file_stored(size_bytes);
    info!(
        original = %original_name,
        stored = %stored_name,
        content_type,
        size_bytes,
        "Stored uploaded file"
    );

    Ok(UploadedFile {
        original_name,
        stored_name,
        size_bytes,
    })
}

async fn copy_field(
    file: &mut tokio::fs::File,
    pending: Vec<Bytes>,
    source: &mut PartSource,
) -> Result<u64, UploadError> {
    let mut written = 0u64;

    for chunk in pending {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    while let Some(chunk) = source.chunk().await? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }

    file.flush().await?;
    Ok(written)
}

/// Best-effort removal of files written by a failed single-file call
async fn discard(target_dir: &Path, files: &[UploadedFile]) {
    for file in files {
        let path = target_dir.join(&file.stored_name);
        if let Err(e) = tokio::fs::remove_file(&path).await {
            warn!(path = %path.display(), error = %e, "Failed to discard upload");
        }
    }
}

/// Last path component of a client-declared file name.
///
/// Both `/` and `\` separate components, since browsers on Windows may send
/// full paths.
fn base_name(declared: &str) -> Result<String, UploadError> {
    let name = declared.rsplit(['/', '\\']).next().unwrap_or_default();
    if name.is_empty() || name == "." || name == ".." {
        return Err(UploadError::Multipart(format!(
            "invalid file name {:?}",
            declared
        )));
    }
    Ok(name.to_string())
}

/// Extension of `name` including the leading dot, or an empty string.
fn extension(name: &str) -> String {
    Path::new(name)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default()
}
