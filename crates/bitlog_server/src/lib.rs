//! # bitlog_server
//!
//! HTTP services around the bitlog engine:
//!
//! - [`store`]: one engine per process behind `GET/POST/DELETE /store/{key}`
//! - [`worker`]: a stateless front that reads keys from a store node
//! - [`balancer`]: a least-connections proxy over a static list of workers
//!
//! Each service exposes a `router` function returning an [`axum::Router`]
//! so it can be served by its binary or exercised directly in tests.

pub mod balancer;
pub mod config;
pub mod error;
pub mod store;
pub mod worker;

pub use balancer::{Backend, BackendPool, BalancerState, InFlight, LB_FROM_HEADER};
pub use config::{BalancerConfig, StoreConfig, WorkerConfig, DEFAULT_MAX_BODY_BYTES};
pub use error::{ServerError, ServerResult};
pub use store::{StatsResponse, StoreState};
pub use worker::WorkerState;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `default_level`.
pub fn init_tracing(default_level: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()))
        .with(fmt::layer())
        .init();
}

/// Resolves when the process receives Ctrl-C.
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
