//! Store node: one engine behind an HTTP API.
//!
//! | Method | Path | Response |
//! |--------|------|----------|
//! | `GET` | `/store/{key}` | 200 + raw value, 404 if missing |
//! | `POST` | `/store/{key}` | 200, body is the value |
//! | `DELETE` | `/store/{key}` | 200 |
//! | `POST` | `/compact` | 200 + JSON compaction result |
//! | `GET` | `/stats` | 200 + JSON counters and segments |
//! | `GET` | `/health` | 200 `OK` |
//!
//! Engine calls block on file I/O and the writer queue, so every handler
//! runs them on the blocking pool.

use crate::config::StoreConfig;
use crate::error::{ServerError, ServerResult};
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use bitlog_core::{CompactionResult, Engine, SegmentInfo, StatsSnapshot};
use bytes::Bytes;
use serde::Serialize;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

/// Shared state for the store handlers.
#[derive(Debug, Clone)]
pub struct StoreState {
    engine: Arc<Engine>,
}

impl StoreState {
    /// Wraps an open engine.
    #[must_use]
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    /// The underlying engine.
    #[must_use]
    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    async fn blocking<T, F>(&self, f: F) -> ServerResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Engine) -> bitlog_core::CoreResult<T> + Send + 'static,
    {
        let engine = Arc::clone(&self.engine);
        Ok(tokio::task::spawn_blocking(move || f(&engine)).await??)
    }
}

/// Body of `GET /stats`.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    /// Live keys.
    pub keys: usize,
    /// Size of the active segment.
    pub active_size: u64,
    /// Operation counters.
    pub counters: StatsSnapshot,
    /// Segments in replay order.
    pub segments: Vec<SegmentInfo>,
}

/// Builds the store router.
pub fn router(state: StoreState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/store/{key}", get(get_key).post(put_key).delete(delete_key))
        .route("/compact", post(compact))
        .route("/stats", get(stats))
        .route("/health", get(health))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(DefaultBodyLimit::max(max_body_bytes)),
        )
        .with_state(state)
}

/// Opens the engine described by `config`.
pub fn open_engine(config: &StoreConfig) -> ServerResult<Arc<Engine>> {
    let engine = Engine::open_with_config(&config.data_dir, config.engine_config())?;
    info!(
        path = %config.data_dir.display(),
        keys = engine.len(),
        "store engine opened"
    );
    Ok(Arc::new(engine))
}

async fn get_key(State(state): State<StoreState>, Path(key): Path<String>) -> ServerResult<Bytes> {
    let value = state
        .blocking(move |engine| engine.get(key.as_bytes()))
        .await?;
    value.map(Bytes::from).ok_or(ServerError::NotFound)
}

async fn put_key(
    State(state): State<StoreState>,
    Path(key): Path<String>,
    body: Bytes,
) -> ServerResult<()> {
    debug!(key = %key, len = body.len(), "put");
    state
        .blocking(move |engine| engine.put(key.as_bytes(), &body))
        .await
}

async fn delete_key(State(state): State<StoreState>, Path(key): Path<String>) -> ServerResult<()> {
    debug!(key = %key, "delete");
    state
        .blocking(move |engine| engine.delete(key.as_bytes()))
        .await
}

async fn compact(State(state): State<StoreState>) -> ServerResult<Json<CompactionResult>> {
    let result = state.blocking(Engine::compact).await?;
    Ok(Json(result))
}

async fn stats(State(state): State<StoreState>) -> ServerResult<Json<StatsResponse>> {
    let response = state
        .blocking(|engine| {
            Ok(StatsResponse {
                keys: engine.len(),
                active_size: engine.size()?,
                counters: engine.stats(),
                segments: engine.segments()?,
            })
        })
        .await?;
    Ok(Json(response))
}

async fn health() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request, StatusCode};
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn setup() -> (TempDir, Router) {
        let temp = TempDir::new().unwrap();
        let engine = Arc::new(Engine::open(temp.path()).unwrap());
        (temp, router(StoreState::new(engine), 1024))
    }

    fn request(method: Method, uri: &str, body: &'static [u8]) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::from(body))
            .unwrap()
    }

    async fn body_of(response: axum::response::Response) -> Vec<u8> {
        to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec()
    }

    #[tokio::test]
    async fn put_then_get() {
        let (_temp, app) = setup();

        let response = app
            .clone()
            .oneshot(request(Method::POST, "/store/alpha", b"one"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(request(Method::GET, "/store/alpha", b""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_of(response).await, b"one");
    }

    #[tokio::test]
    async fn missing_key_is_404() {
        let (_temp, app) = setup();
        let response = app
            .oneshot(request(Method::GET, "/store/nope", b""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn delete_removes_key() {
        let (_temp, app) = setup();
        app.clone()
            .oneshot(request(Method::POST, "/store/k", b"v"))
            .await
            .unwrap();
        let response = app
            .clone()
            .oneshot(request(Method::DELETE, "/store/k", b""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(request(Method::GET, "/store/k", b""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn oversized_body_rejected() {
        let (_temp, app) = setup();
        let response = app
            .oneshot(request(Method::POST, "/store/big", &[0u8; 2048]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn compact_returns_json() {
        let (_temp, app) = setup();
        let response = app
            .oneshot(request(Method::POST, "/compact", b""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body_of(response).await).unwrap();
        assert!(json["output_segment"].is_null());
    }

    #[tokio::test]
    async fn stats_counts_keys() {
        let (_temp, app) = setup();
        app.clone()
            .oneshot(request(Method::POST, "/store/a", b"1"))
            .await
            .unwrap();
        let response = app
            .oneshot(request(Method::GET, "/stats", b""))
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body_of(response).await).unwrap();
        assert_eq!(json["keys"], 1);
        assert_eq!(json["counters"]["writes"], 1);
        assert_eq!(json["segments"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn health_is_ok() {
        let (_temp, app) = setup();
        let response = app
            .oneshot(request(Method::GET, "/health", b""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_of(response).await, b"OK");
    }

    #[tokio::test]
    async fn closed_engine_is_unavailable() {
        let (_temp, app) = {
            let temp = TempDir::new().unwrap();
            let engine = Arc::new(Engine::open(temp.path()).unwrap());
            engine.close().unwrap();
            (temp, router(StoreState::new(engine), 1024))
        };
        let response = app
            .oneshot(request(Method::POST, "/store/k", b"v"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
