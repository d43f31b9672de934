//! HTTP server module
//!
//! A small hyper server that exposes every toolkit operation as a route.
//! Each connection is served on its own tokio task; requests share nothing
//! but the read-only [`Config`].
//!
//! # Example
//!
//! ```no_run
//! use handler_kit::config::Config;
//! use handler_kit::server::Server;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load("config.yaml")?;
//! let server = Server::bind(config).await?;
//! println!("Listening on {}", server.local_addr());
//! server.run().await?;
//! # Ok(())
//! # }
//! ```

use crate::config::Config;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{error, info};

mod routes;

pub use routes::handle_request;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind to address: {0}")]
    BindError(String),
}

/// HTTP Server
pub struct Server {
    config: Arc<Config>,
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Server {
    /// Bind a new server to the configured address
    ///
    /// With port 0 the OS picks a free port; see [`Server::local_addr`].
    pub async fn bind(config: Config) -> Result<Self, ServerError> {
        let addr: SocketAddr = config
            .server
            .address
            .parse()
            .map_err(|e| ServerError::BindError(format!("Invalid address: {}", e)))?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindError(format!("Failed to bind to {}: {}", addr, e)))?;

        let local_addr = listener
            .local_addr()
            .map_err(|e| ServerError::BindError(format!("Failed to get local address: {}", e)))?;

        info!("Server bound to {}", local_addr);

        Ok(Self {
            config: Arc::new(config),
            listener,
            local_addr,
        })
    }

    /// The address the server is listening on
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Run the server until Ctrl-C
    pub async fn run(self) -> Result<(), ServerError> {
        let shutdown = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
        };
        self.serve(shutdown).await
    }

    /// Accept connections until `shutdown` completes
    ///
    /// Connections already accepted keep running on their own tasks.
    pub async fn serve<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        info!(
            "Serving on {} (uploads to {})",
            self.local_addr,
            self.config.upload.directory.display()
        );

        tokio::pin!(shutdown);

        loop {
            let (stream, peer_addr) = tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutting down server");
                    return Ok(());
                }
                accepted = self.listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        continue;
                    }
                },
            };

            let config = Arc::clone(&self.config);

            tokio::spawn(async move {
                let io = TokioIo::new(stream);

                let service = service_fn(move |req| {
                    let config = Arc::clone(&config);
                    async move { Ok::<_, Infallible>(handle_request(req, config).await) }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    error!("Error serving connection from {}: {}", peer_addr, e);
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DownloadConfig, JsonConfig, MetricsConfig, ServerConfig, UploadConfig};

    fn test_config(address: &str) -> Config {
        Config {
            server: ServerConfig {
                address: address.into(),
            },
            upload: UploadConfig::default(),
            json: JsonConfig::default(),
            download: DownloadConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }

    #[tokio::test]
    async fn test_server_bind() {
        let server = Server::bind(test_config("127.0.0.1:0")).await.unwrap();
        assert_ne!(server.local_addr().port(), 0);
    }

    #[tokio::test]
    async fn test_server_invalid_address() {
        let result = Server::bind(test_config("invalid")).await;
        assert!(matches!(result, Err(ServerError::BindError(_))));
    }

    #[tokio::test]
    async fn test_serve_stops_on_shutdown() {
        let server = Server::bind(test_config("127.0.0.1:0")).await.unwrap();
        let result = server.serve(async {}).await;
        assert!(result.is_ok());
    }
}
