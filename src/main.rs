//! Handler Kit - demo server for the handler toolkit
//!
//! Serves uploads, downloads, slugs and metrics over HTTP.

use clap::Parser;
use handler_kit::{config::Config, fs::ensure_dir, server::Server};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Handler Kit - upload, download and JSON helpers behind a small HTTP server
#[derive(Parser, Debug)]
#[command(name = "handler-kit")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // RUST_LOG wins over --log-level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(args.log_level.to_lowercase()))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting Handler Kit v{}", handler_kit::VERSION);

    let config = Config::load(&args.config)?;
    info!("Loaded configuration from {:?}", args.config);

    ensure_dir(&config.upload.directory).await?;

    let server = Server::bind(config).await?;
    server.run().await?;

    Ok(())
}
