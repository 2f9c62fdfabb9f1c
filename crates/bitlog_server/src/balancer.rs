//! Least-connections load balancer.
//!
//! Backends come from a static list. A background task polls each
//! backend's `GET /health` on a fixed interval; a backend starts unhealthy
//! and only receives traffic after its first successful check. Every
//! inbound request is forwarded to the healthy backend with the fewest
//! requests in flight, ties going to the backend listed first.

use crate::config::BalancerConfig;
use crate::error::{ServerError, ServerResult};
use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::response::Response;
use axum::Router;
use reqwest::Client;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

/// Response header naming the backend that served a request.
pub const LB_FROM_HEADER: &str = "lb-from";

/// Largest request body the balancer buffers.
const MAX_FORWARD_BODY: usize = 64 * 1024 * 1024;

/// Headers that describe one hop and are not forwarded.
const HOP_HEADERS: [HeaderName; 4] = [
    header::HOST,
    header::CONNECTION,
    header::CONTENT_LENGTH,
    header::TRANSFER_ENCODING,
];

/// One backend and its live counters.
#[derive(Debug)]
pub struct Backend {
    addr: String,
    healthy: AtomicBool,
    in_flight: AtomicUsize,
}

impl Backend {
    fn new(addr: String) -> Self {
        Self {
            addr,
            healthy: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
        }
    }

    /// `host:port` of the backend.
    #[must_use]
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Result of the latest health check.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    /// Records a health check result. Returns true if the state changed.
    pub fn set_healthy(&self, healthy: bool) -> bool {
        self.healthy.swap(healthy, Ordering::AcqRel) != healthy
    }

    /// Requests currently being forwarded to this backend.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }
}

/// Marks one forwarded request; releases its slot on drop.
#[derive(Debug)]
pub struct InFlight {
    backend: Arc<Backend>,
}

impl InFlight {
    /// The selected backend.
    #[must_use]
    pub fn backend(&self) -> &Backend {
        &self.backend
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.backend.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

/// The static backend list.
#[derive(Debug)]
pub struct BackendPool {
    backends: Vec<Arc<Backend>>,
}

impl BackendPool {
    /// Creates a pool with every backend marked unhealthy.
    #[must_use]
    pub fn new(addrs: impl IntoIterator<Item = String>) -> Self {
        Self {
            backends: addrs.into_iter().map(|a| Arc::new(Backend::new(a))).collect(),
        }
    }

    /// Backends in configuration order.
    #[must_use]
    pub fn backends(&self) -> &[Arc<Backend>] {
        &self.backends
    }

    /// Picks the healthy backend with the fewest in-flight requests and
    /// claims a slot on it.
    pub fn select(&self) -> Option<InFlight> {
        let backend = self
            .backends
            .iter()
            .filter(|b| b.is_healthy())
            .min_by_key(|b| b.in_flight())?;
        backend.in_flight.fetch_add(1, Ordering::AcqRel);
        Some(InFlight {
            backend: Arc::clone(backend),
        })
    }
}

/// Shared state for the forwarding handler.
#[derive(Debug, Clone)]
pub struct BalancerState {
    pool: Arc<BackendPool>,
    client: Client,
    scheme: &'static str,
    trace: bool,
}

impl BalancerState {
    /// Builds the pool and the HTTP client used for forwarding and health
    /// checks.
    pub fn new(config: &BalancerConfig) -> ServerResult<Self> {
        if config.backends.is_empty() {
            return Err(ServerError::config("no backends configured"));
        }
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self {
            pool: Arc::new(BackendPool::new(config.backends.iter().cloned())),
            client,
            scheme: config.scheme(),
            trace: config.trace,
        })
    }

    /// The backend pool.
    #[must_use]
    pub fn pool(&self) -> &Arc<BackendPool> {
        &self.pool
    }

    /// Checks every backend once, in order.
    pub async fn check_all(&self) {
        for backend in self.pool.backends() {
            let url = format!("{}://{}/health", self.scheme, backend.addr());
            let healthy = match self.client.get(&url).send().await {
                Ok(response) => response.status().is_success(),
                Err(e) => {
                    debug!(backend = backend.addr(), error = %e, "health check failed");
                    false
                }
            };
            if backend.set_healthy(healthy) {
                if healthy {
                    info!(backend = backend.addr(), "backend is healthy");
                } else {
                    warn!(backend = backend.addr(), "backend is unhealthy");
                }
            }
        }
    }

    /// Runs [`BalancerState::check_all`] now and then every `interval`.
    pub fn spawn_health_checks(&self, interval: Duration) -> JoinHandle<()> {
        let state = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                state.check_all().await;
            }
        })
    }
}

/// Builds the balancer router. Every path is forwarded.
pub fn router(state: BalancerState) -> Router {
    Router::new()
        .fallback(forward)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn forward(State(state): State<BalancerState>, request: Request) -> ServerResult<Response> {
    let slot = state.pool.select().ok_or(ServerError::NoHealthyBackend)?;
    let addr = slot.backend().addr().to_string();

    let (parts, body) = request.into_parts();
    let body = to_bytes(body, MAX_FORWARD_BODY)
        .await
        .map_err(|e| ServerError::bad_request(format!("cannot read request body: {e}")))?;
    let path = parts
        .uri
        .path_and_query()
        .map_or("/", |p| p.as_str());
    let url = format!("{}://{addr}{path}", state.scheme);
    debug!(%url, method = %parts.method, "forwarding");

    let upstream = state
        .client
        .request(parts.method, url)
        .headers(without_hop_headers(parts.headers))
        .body(body)
        .send()
        .await?;

    let status = upstream.status();
    let headers = without_hop_headers(upstream.headers().clone());
    let body = upstream.bytes().await?;
    drop(slot);

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    if state.trace {
        if let Ok(value) = HeaderValue::from_str(&addr) {
            response
                .headers_mut()
                .insert(HeaderName::from_static(LB_FROM_HEADER), value);
        }
    }
    Ok(response)
}

fn without_hop_headers(mut headers: HeaderMap) -> HeaderMap {
    for name in &HOP_HEADERS {
        headers.remove(name);
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::get;
    use tokio::net::TcpListener;
    use tower::ServiceExt;

    fn pool(n: usize) -> BackendPool {
        BackendPool::new((0..n).map(|i| format!("backend-{i}:80")))
    }

    #[test]
    fn select_skips_unhealthy() {
        let pool = pool(3);
        assert!(pool.select().is_none());

        pool.backends()[1].set_healthy(true);
        let slot = pool.select().unwrap();
        assert_eq!(slot.backend().addr(), "backend-1:80");
    }

    #[test]
    fn select_prefers_fewest_in_flight() {
        let pool = pool(3);
        for backend in pool.backends() {
            backend.set_healthy(true);
        }

        let first = pool.select().unwrap();
        let second = pool.select().unwrap();
        let third = pool.select().unwrap();
        assert_eq!(first.backend().addr(), "backend-0:80");
        assert_eq!(second.backend().addr(), "backend-1:80");
        assert_eq!(third.backend().addr(), "backend-2:80");

        drop(second);
        assert_eq!(pool.select().unwrap().backend().addr(), "backend-1:80");
    }

    #[test]
    fn ties_go_to_list_order() {
        let pool = pool(2);
        pool.backends()[0].set_healthy(true);
        pool.backends()[1].set_healthy(true);
        for _ in 0..3 {
            assert_eq!(pool.select().unwrap().backend().addr(), "backend-0:80");
        }
        assert_eq!(pool.backends()[0].in_flight(), 0);
    }

    #[test]
    fn set_healthy_reports_changes() {
        let backend = Backend::new("b:1".into());
        assert!(backend.set_healthy(true));
        assert!(!backend.set_healthy(true));
        assert!(backend.set_healthy(false));
    }

    #[test]
    fn empty_backend_list_rejected() {
        let config = BalancerConfig::new("127.0.0.1:0".parse().unwrap(), Vec::new());
        assert!(BalancerState::new(&config).is_err());
    }

    async fn spawn_backend(body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new()
            .route("/health", get(|| async { "OK" }))
            .route("/echo", get(move || async move { body }));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr.to_string()
    }

    fn echo_request() -> Request {
        axum::http::Request::builder().uri("/echo?x=1").body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn no_healthy_backend_is_unavailable() {
        let config = BalancerConfig::new("127.0.0.1:0".parse().unwrap(), vec!["a:1".into()]);
        let app = router(BalancerState::new(&config).unwrap());
        let response = app.oneshot(echo_request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn forwards_to_healthy_backend_with_trace_header() {
        let healthy = spawn_backend("from-backend").await;
        let config = BalancerConfig::new(
            "127.0.0.1:0".parse().unwrap(),
            vec!["127.0.0.1:1".into(), healthy.clone()],
        )
        .with_trace(true)
        .with_request_timeout(Duration::from_secs(2));
        let state = BalancerState::new(&config).unwrap();
        state.check_all().await;
        assert!(!state.pool().backends()[0].is_healthy());
        assert!(state.pool().backends()[1].is_healthy());

        let response = router(state.clone()).oneshot(echo_request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(LB_FROM_HEADER).unwrap(),
            healthy.as_str()
        );
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"from-backend");
        assert_eq!(state.pool().backends()[1].in_flight(), 0);
    }
}
