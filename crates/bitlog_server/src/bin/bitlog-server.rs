//! Store node binary.

use anyhow::{Context, Result};
use bitlog_server::{init_tracing, shutdown_signal, store, StoreConfig, StoreState};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Serves one bitlog engine over HTTP.
#[derive(Parser, Debug)]
#[command(name = "bitlog-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Listen address
    #[arg(long, env = "BITLOG_LISTEN", default_value = "0.0.0.0:8083")]
    listen: SocketAddr,

    /// Engine directory
    #[arg(long, env = "BITLOG_DATA_DIR", default_value = "./data")]
    data_dir: PathBuf,

    /// Rotate the active segment above this many bytes
    #[arg(long, env = "BITLOG_MAX_SEGMENT_SIZE", default_value_t = bitlog_core::DEFAULT_MAX_SEGMENT_SIZE)]
    max_segment_size: u64,

    /// Skip fsync after each write
    #[arg(long)]
    no_sync: bool,

    /// Largest accepted request body in bytes
    #[arg(long, default_value_t = bitlog_server::DEFAULT_MAX_BODY_BYTES)]
    max_body_bytes: usize,

    /// Log level
    #[arg(long, env = "BITLOG_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level);

    let config = StoreConfig::new(args.listen, args.data_dir)
        .with_max_segment_size(args.max_segment_size)
        .with_sync_on_write(!args.no_sync)
        .with_max_body_bytes(args.max_body_bytes);

    let engine = store::open_engine(&config).context("failed to open engine")?;
    let app = store::router(StoreState::new(engine.clone()), config.max_body_bytes);

    let listener = TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("failed to bind {}", config.listen))?;
    info!(addr = %config.listen, "store node listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Err(e) = engine.close() {
        warn!(error = %e, "engine did not close cleanly");
    }
    info!("store node stopped");
    Ok(())
}
