//! File download responses

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderValue, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use hyper::{Response, StatusCode};
use std::io;
use std::path::{Component, Path};
use thiserror::Error;

/// Download errors
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("Invalid file name: {0}")]
    InvalidName(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl DownloadError {
    /// HTTP status a handler should answer with for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            DownloadError::InvalidName(_) => StatusCode::BAD_REQUEST,
            DownloadError::NotFound(_) => StatusCode::NOT_FOUND,
            DownloadError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Build a response that makes the client save `dir/file` as `display_name`.
///
/// `file` must be a single path component.
pub async fn download_file(
    dir: &Path,
    file: &str,
    display_name: &str,
) -> Result<Response<Full<Bytes>>, DownloadError> {
    let mut components = Path::new(file).components();
    if !matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    ) || file.contains('\\')
    {
        return Err(DownloadError::InvalidName(file.to_string()));
    }

    let path = dir.join(file);
    let content = match tokio::fs::read(&path).await {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(DownloadError::NotFound(file.to_string()))
        }
        Err(e) => return Err(e.into()),
    };

    let content_type = mime_guess::from_path(&path).first_or_octet_stream();
    let disposition = format!(
        "attachment; filename=\"{}\"",
        display_name.replace(['"', '\\', '\r', '\n'], "_")
    );

    let mut response = Response::new(Full::new(Bytes::new()));
    let headers = response.headers_mut();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_str(content_type.as_ref())
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(CONTENT_LENGTH, HeaderValue::from(content.len()));
    headers.insert(
        CONTENT_DISPOSITION,
        HeaderValue::from_str(&disposition)
            .map_err(|e| DownloadError::InvalidName(e.to_string()))?,
    );
    *response.body_mut() = Full::new(Bytes::from(content));

    tracing::debug!(path = %path.display(), display_name, "Serving download");
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_download_headers() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("img.png"), b"\x89PNG\r\n\x1a\nrest").unwrap();

        let response = download_file(tmp.path(), "img.png", "rgb.png").await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "image/png");
        assert_eq!(
            response.headers()["content-disposition"],
            "attachment; filename=\"rgb.png\""
        );
        assert_eq!(response.headers()["content-length"], "12");
    }

    #[tokio::test]
    async fn test_download_missing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let err = download_file(tmp.path(), "nope.txt", "nope.txt")
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::NotFound(_)));
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_download_rejects_traversal() {
        let tmp = tempfile::tempdir().unwrap();
        for name in ["../etc/passwd", "a/b.txt", "..", "", "/etc/passwd", "..\\x"] {
            let err = download_file(tmp.path(), name, "x").await.unwrap_err();
            assert!(
                matches!(err, DownloadError::InvalidName(_)),
                "{} should be rejected",
                name
            );
        }
    }
}
