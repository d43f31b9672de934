//! Handler Kit Library
//!
//! Helper toolkit for hyper request handlers.
//!
//! # Features
//!
//! - **Uploads**: Multipart file uploads with content sniffing, a payload
//!   ceiling and optional randomized file names
//! - **JSON**: Size-limited request decoding and response encoding
//! - **Downloads**: Attachment responses for stored files
//! - **Slugs**: URL-safe slugs from arbitrary text
//!
//! # Example
//!
//! ```no_run
//! use handler_kit::upload::{upload_files, UploadPolicy};
//! use hyper::{body::Incoming, Request};
//! use std::path::Path;
//!
//! async fn handle(req: Request<Incoming>) {
//!     let policy = UploadPolicy::default().allow("image/png");
//!     match upload_files(req, Path::new("./uploads"), &policy, true).await {
//!         Ok(files) => println!("stored {:?}", files),
//!         Err(partial) => eprintln!("{} (after {} files)", partial, partial.uploaded.len()),
//!     }
//! }
//! ```

pub mod config;
pub mod download;
pub mod fs;
pub mod json;
pub mod metrics;
pub mod server;
pub mod slug;
pub mod upload;

// Re-export commonly used types
pub use config::Config;
pub use server::Server;
pub use upload::{UploadError, UploadPolicy, UploadedFile};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
