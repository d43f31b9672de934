//! Request routing
//!
//! # Supported Endpoints
//!
//! * `GET /health` - Health check
//! * `GET /metrics` - Prometheus metrics (when enabled)
//! * `POST /upload` - Store every file of a multipart body
//! * `POST /upload/single` - Store exactly one file of a multipart body
//! * `GET /download/{name}` - Download a stored file as an attachment
//! * `POST /slug` - Convert `{"text": ...}` to a slug
//! * All other requests return 404 Not Found

use crate::config::Config;
use crate::download::download_file;
use crate::json::{error_json, read_json, write_json, JsonResponse};
use crate::metrics;
use crate::slug::to_slug;
use crate::upload::{upload_file, upload_files};
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Body;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Method, Request, Response, StatusCode};
use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

const DOWNLOAD_PREFIX: &str = "/download/";

#[derive(Debug, Deserialize)]
struct SlugRequest {
    text: String,
}

#[derive(Debug, Serialize)]
struct SlugData {
    slug: String,
}

/// Handle one HTTP request
///
/// Routes by method and path and renders every failure as a JSON error
/// with the status code of the underlying error.
pub async fn handle_request<B>(req: Request<B>, config: Arc<Config>) -> Response<Full<Bytes>>
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let (route, response) = match (&method, path.as_str()) {
        (&Method::GET, "/health") => ("/health", health()),
        (&Method::GET, "/metrics") if config.metrics.enabled => ("/metrics", metrics_export()),
        (&Method::POST, "/upload") => ("/upload", upload_many(req, &config).await),
        (&Method::POST, "/upload/single") => ("/upload/single", upload_one(req, &config).await),
        (&Method::POST, "/slug") => ("/slug", slug(req, &config).await),
        (&Method::GET, p) if p.starts_with(DOWNLOAD_PREFIX) => {
            ("/download", download(&p[DOWNLOAD_PREFIX.len()..], &config).await)
        }
        _ => ("not_found", not_found()),
    };

    let status = response.status().as_u16();
    metrics::record_http_request(route, status);
    info!(method = %method, path = %path, status, "Handled request");

    response
}

async fn upload_many<B>(req: Request<B>, config: &Config) -> Response<Full<Bytes>>
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let policy = config.upload.policy();

    match upload_files(req, &config.upload.directory, &policy, config.upload.rename).await {
        Ok(files) => {
            let message = format!("{} file(s) uploaded", files.len());
            json(StatusCode::OK, &JsonResponse::ok(message, files))
        }
        Err(partial) => {
            warn!(
                error = %partial.source,
                stored = partial.uploaded.len(),
                "Upload batch failed"
            );
            // Partial results are reported so clients can clean up
            let payload = JsonResponse {
                error: true,
                message: partial.source.to_string(),
                data: Some(partial.uploaded),
            };
            json(partial.source.status_code(), &payload)
        }
    }
}

async fn upload_one<B>(req: Request<B>, config: &Config) -> Response<Full<Bytes>>
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let policy = config.upload.policy();

    match upload_file(req, &config.upload.directory, &policy, config.upload.rename).await {
        Ok(file) => json(StatusCode::OK, &JsonResponse::ok("file uploaded", file)),
        Err(e) => error_json(&e, Some(e.status_code())),
    }
}

async fn slug<B>(req: Request<B>, config: &Config) -> Response<Full<Bytes>>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let request: SlugRequest = match read_json(req, &config.json.options()).await {
        Ok(request) => request,
        Err(e) => return error_json(&e, Some(e.status_code())),
    };

    match to_slug(&request.text) {
        Ok(slug) => json(StatusCode::OK, &JsonResponse::ok("ok", SlugData { slug })),
        Err(e) => error_json(&e, None),
    }
}

async fn download(encoded_name: &str, config: &Config) -> Response<Full<Bytes>> {
    let name = match percent_decode_str(encoded_name).decode_utf8() {
        Ok(name) => name,
        Err(e) => return error_json(&e, None),
    };

    match download_file(&config.download.directory, &name, &name).await {
        Ok(response) => response,
        Err(e) => error_json(&e, Some(e.status_code())),
    }
}

fn json<T: Serialize>(status: StatusCode, data: &T) -> Response<Full<Bytes>> {
    write_json(status, data, None)
        .unwrap_or_else(|e| error_json(&e, Some(StatusCode::INTERNAL_SERVER_ERROR)))
}

fn health() -> Response<Full<Bytes>> {
    json(StatusCode::OK, &serde_json::json!({ "status": "ok" }))
}

fn metrics_export() -> Response<Full<Bytes>> {
    match metrics::encode() {
        Ok((buffer, content_type)) => {
            let mut response = Response::new(Full::new(Bytes::from(buffer)));
            if let Ok(value) = HeaderValue::from_str(&content_type) {
                response.headers_mut().insert(CONTENT_TYPE, value);
            }
            response
        }
        Err(e) => error_json(&e, Some(StatusCode::INTERNAL_SERVER_ERROR)),
    }
}

fn not_found() -> Response<Full<Bytes>> {
    error_json(&"Not Found", Some(StatusCode::NOT_FOUND))
}
