//! Worker binary.

use anyhow::{Context, Result};
use bitlog_server::{init_tracing, shutdown_signal, worker, WorkerConfig, WorkerState};
use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;

/// Stateless worker in front of a bitlog store node.
#[derive(Parser, Debug)]
#[command(name = "bitlog-worker")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Listen address
    #[arg(long, env = "BITLOG_LISTEN", default_value = "0.0.0.0:8080")]
    listen: SocketAddr,

    /// Base URL of the store node
    #[arg(long, env = "BITLOG_STORE_URL", default_value = "http://127.0.0.1:8083")]
    store_url: String,

    /// Report failure from /health
    #[arg(long, env = "CONF_HEALTH_FAILURE")]
    health_failure: bool,

    /// Delay data responses by this many seconds (1-300)
    #[arg(long, env = "CONF_RESPONSE_DELAY_SEC", value_parser = clap::value_parser!(u64).range(1..=300))]
    response_delay_sec: Option<u64>,

    /// Key to write to the store at startup
    #[arg(long, env = "BITLOG_SEED_KEY", requires = "seed_value")]
    seed_key: Option<String>,

    /// Value written under --seed-key
    #[arg(long, env = "BITLOG_SEED_VALUE", requires = "seed_key")]
    seed_value: Option<String>,

    /// Store request timeout in seconds
    #[arg(long, default_value_t = 5)]
    timeout_sec: u64,

    /// Log level
    #[arg(long, env = "BITLOG_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level);

    let mut config = WorkerConfig::new(args.listen, args.store_url)
        .with_health_failure(args.health_failure)
        .with_response_delay(args.response_delay_sec.map(Duration::from_secs))
        .with_request_timeout(Duration::from_secs(args.timeout_sec));
    if let (Some(key), Some(value)) = (args.seed_key, args.seed_value) {
        config = config.with_seed(key, value);
    }

    let state = WorkerState::new(&config).context("invalid worker configuration")?;
    let app = worker::router(state.clone());

    let listener = TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("failed to bind {}", config.listen))?;
    info!(
        addr = %config.listen,
        store = %config.store_url,
        health_failure = config.health_failure,
        "worker listening"
    );

    tokio::spawn(async move {
        state.seed_store().await;
    });

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}
