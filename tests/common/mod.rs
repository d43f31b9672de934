//! Common Test Infrastructure
//!
//! Provides shared utilities for integration tests:
//! - Multipart body construction
//! - Sample file payloads
//! - Test server management

#![allow(dead_code)]

use bytes::Bytes;
use handler_kit::config::{
    Config, DownloadConfig, JsonConfig, MetricsConfig, ServerConfig, UploadConfig,
};
use handler_kit::server::Server;
use http_body_util::Full;
use hyper::Request;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tokio::sync::oneshot;

/// Boundary used by every multipart body built here
pub const BOUNDARY: &str = "handler-kit-test-boundary-7MA4YWxkTrZu0gW";

/// A small PNG (signature, IHDR and IEND chunks)
pub fn png_bytes() -> Vec<u8> {
    let mut data = b"\x89PNG\r\n\x1a\n".to_vec();
    data.extend_from_slice(b"\x00\x00\x00\x0dIHDR\x00\x00\x00\x01\x00\x00\x00\x01\x08\x06\x00\x00\x00\x1f\x15\xc4\x89");
    data.extend_from_slice(b"\x00\x00\x00\x00IEND\xaeB`\x82");
    data
}

/// A JPEG/JFIF header followed by filler
pub fn jpeg_bytes() -> Vec<u8> {
    let mut data = b"\xff\xd8\xff\xe0\x00\x10JFIF\x00\x01\x01\x00\x00\x01\x00\x01\x00\x00".to_vec();
    data.extend(std::iter::repeat(0x42).take(1024));
    data
}

/// A GIF header
pub fn gif_bytes() -> Vec<u8> {
    b"GIF89a\x01\x00\x01\x00\x80\x00\x00\xff\xff\xff\x00\x00\x00,".to_vec()
}

/// Builder for `multipart/form-data` bodies
#[derive(Default)]
pub struct MultipartBuilder {
    body: Vec<u8>,
}

impl MultipartBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file part
    pub fn file(mut self, field: &str, file_name: &str, content: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                BOUNDARY, field, file_name
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(content);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    /// Add a plain form value
    pub fn text(mut self, field: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, field, value
            )
            .as_bytes(),
        );
        self
    }

    /// Finish the body
    pub fn build(mut self) -> Vec<u8> {
        self.body
            .extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        self.body
    }

    /// Finish the body and wrap it in a POST request
    pub fn request(self, uri: &str) -> Request<Full<Bytes>> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", content_type())
            .body(Full::new(Bytes::from(self.build())))
            .unwrap()
    }
}

/// `Content-Type` header value for bodies built by [`MultipartBuilder`]
pub fn content_type() -> String {
    format!("multipart/form-data; boundary={}", BOUNDARY)
}

/// Names of the entries in `dir`, sorted
pub fn dir_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

/// Test configuration that stores into `dir`
pub fn test_config(dir: &Path, allowed_types: &[&str]) -> Config {
    Config {
        server: ServerConfig {
            address: "127.0.0.1:0".into(),
        },
        upload: UploadConfig {
            directory: dir.to_path_buf(),
            allowed_types: allowed_types.iter().map(|s| s.to_string()).collect(),
            ..UploadConfig::default()
        },
        json: JsonConfig::default(),
        download: DownloadConfig {
            directory: dir.to_path_buf(),
        },
        metrics: MetricsConfig::default(),
    }
}

/// Running server bound to an OS-assigned port
pub struct TestServer {
    pub addr: SocketAddr,
    pub client: reqwest::Client,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl TestServer {
    pub async fn start(config: Config) -> Self {
        let server = Server::bind(config).await.expect("Server should bind");
        let addr = server.local_addr();

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let _ = server
                .serve(async {
                    let _ = shutdown_rx.await;
                })
                .await;
        });

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap();

        Self {
            addr,
            client,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}
