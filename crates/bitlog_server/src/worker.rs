//! Stateless worker in front of a store node.
//!
//! The worker owns no data. `GET /api/v1/data?key=<k>` is relayed to the
//! store node's `GET /store/{k}` and `POST /api/v1/data?key=<k>` to
//! `POST /store/{k}` with the request body as the value. The store's status
//! and body are passed back unchanged. `/health` can be told to fail so the
//! balancer's health checking can be exercised.
//!
//! A worker may be configured to write one seed value to the store when it
//! starts. A failed seed is logged and the worker serves anyway.

use crate::config::WorkerConfig;
use crate::error::{ServerError, ServerResult};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use reqwest::{Client, Url};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

/// Shared state for the worker handlers.
#[derive(Debug, Clone)]
pub struct WorkerState {
    inner: Arc<WorkerInner>,
}

#[derive(Debug)]
struct WorkerInner {
    client: Client,
    store_url: Url,
    health_failure: bool,
    response_delay: Option<Duration>,
    seed: Option<(String, Vec<u8>)>,
}

impl WorkerState {
    /// Builds the HTTP client and parses the store URL.
    pub fn new(config: &WorkerConfig) -> ServerResult<Self> {
        let store_url = Url::parse(&config.store_url).map_err(|e| {
            ServerError::config(format!("invalid store url {}: {e}", config.store_url))
        })?;
        if store_url.cannot_be_a_base() {
            return Err(ServerError::config(format!(
                "store url cannot be a base: {}",
                config.store_url
            )));
        }
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self {
            inner: Arc::new(WorkerInner {
                client,
                store_url,
                health_failure: config.health_failure,
                response_delay: config.response_delay,
                seed: config.seed.clone(),
            }),
        })
    }

    fn key_url(&self, key: &str) -> Url {
        let mut url = self.inner.store_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("store").push(key);
        }
        url
    }

    /// Writes the configured seed value to the store.
    ///
    /// Returns whether the store accepted it. Failures are logged and never
    /// returned, so a worker whose store is not up yet still starts.
    pub async fn seed_store(&self) -> bool {
        let Some((key, value)) = &self.inner.seed else {
            return false;
        };
        let url = self.key_url(key);
        match self.inner.client.post(url).body(value.clone()).send().await {
            Ok(response) if response.status().is_success() => {
                info!(%key, "seeded store");
                true
            }
            Ok(response) => {
                warn!(%key, status = %response.status(), "store rejected seed value");
                false
            }
            Err(e) => {
                warn!(%key, error = %e, "failed to seed store");
                false
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct DataQuery {
    key: Option<String>,
}

/// Builds the worker router.
pub fn router(state: WorkerState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/data", get(data).post(put_data))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<WorkerState>) -> (StatusCode, &'static str) {
    if state.inner.health_failure {
        (StatusCode::INTERNAL_SERVER_ERROR, "FAILURE")
    } else {
        (StatusCode::OK, "OK")
    }
}

impl DataQuery {
    fn key(self) -> ServerResult<String> {
        match self.key {
            Some(key) if !key.is_empty() => Ok(key),
            _ => Err(ServerError::bad_request("missing key parameter")),
        }
    }
}

async fn relay(upstream: reqwest::Response) -> ServerResult<Response> {
    let status = upstream.status();
    let body = upstream.bytes().await?;
    Ok((status, body).into_response())
}

async fn data(
    State(state): State<WorkerState>,
    Query(query): Query<DataQuery>,
) -> ServerResult<Response> {
    let key = query.key()?;

    if let Some(delay) = state.inner.response_delay {
        tokio::time::sleep(delay).await;
    }

    let url = state.key_url(&key);
    debug!(%url, "fetching from store");
    relay(state.inner.client.get(url).send().await?).await
}

async fn put_data(
    State(state): State<WorkerState>,
    Query(query): Query<DataQuery>,
    body: Bytes,
) -> ServerResult<Response> {
    let key = query.key()?;

    if let Some(delay) = state.inner.response_delay {
        tokio::time::sleep(delay).await;
    }

    let url = state.key_url(&key);
    debug!(%url, len = body.len(), "writing to store");
    relay(state.inner.client.post(url).body(body).send().await?).await
}
