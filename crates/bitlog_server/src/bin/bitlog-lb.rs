//! Load balancer binary.

use anyhow::{Context, Result};
use bitlog_server::{balancer, init_tracing, shutdown_signal, BalancerConfig, BalancerState};
use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;

/// Least-connections load balancer for bitlog workers.
#[derive(Parser, Debug)]
#[command(name = "bitlog-lb")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Backend address (host:port); repeat for each backend
    #[arg(long = "backend", required = true)]
    backends: Vec<String>,

    /// Listen host
    #[arg(long, default_value = "0.0.0.0")]
    host: IpAddr,

    /// Listen port
    #[arg(long, default_value_t = 8090)]
    port: u16,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 5)]
    timeout_sec: u64,

    /// Seconds between health check rounds
    #[arg(long, default_value_t = 10)]
    health_interval_sec: u64,

    /// Use HTTPS towards backends
    #[arg(long)]
    https: bool,

    /// Add an lb-from header naming the serving backend
    #[arg(long)]
    trace: bool,

    /// Log level
    #[arg(long, env = "BITLOG_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level);

    let config = BalancerConfig::new(SocketAddr::new(args.host, args.port), args.backends)
        .with_request_timeout(Duration::from_secs(args.timeout_sec))
        .with_health_interval(Duration::from_secs(args.health_interval_sec))
        .with_https(args.https)
        .with_trace(args.trace);

    let state = BalancerState::new(&config).context("invalid balancer configuration")?;
    let checks = state.spawn_health_checks(config.health_interval);
    let app = balancer::router(state);

    let listener = TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("failed to bind {}", config.listen))?;
    info!(
        addr = %config.listen,
        backends = ?config.backends,
        "load balancer listening"
    );

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    checks.abort();
    Ok(())
}
