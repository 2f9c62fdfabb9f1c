//! Configuration for the HTTP services.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Default request body limit for the store node (16 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Store node configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Address to listen on.
    pub listen: SocketAddr,
    /// Engine directory.
    pub data_dir: PathBuf,
    /// Rotation threshold passed to the engine.
    pub max_segment_size: u64,
    /// Whether every write is synced before it is acknowledged.
    pub sync_on_write: bool,
    /// Largest accepted request body.
    pub max_body_bytes: usize,
}

impl StoreConfig {
    /// Creates a configuration with engine defaults.
    #[must_use]
    pub fn new(listen: SocketAddr, data_dir: impl Into<PathBuf>) -> Self {
        let engine = bitlog_core::Config::default();
        Self {
            listen,
            data_dir: data_dir.into(),
            max_segment_size: engine.max_segment_size,
            sync_on_write: engine.sync_on_write,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    /// Sets the rotation threshold.
    #[must_use]
    pub fn with_max_segment_size(mut self, bytes: u64) -> Self {
        self.max_segment_size = bytes;
        self
    }

    /// Sets whether writes are synced.
    #[must_use]
    pub fn with_sync_on_write(mut self, sync: bool) -> Self {
        self.sync_on_write = sync;
        self
    }

    /// Sets the request body limit.
    #[must_use]
    pub fn with_max_body_bytes(mut self, bytes: usize) -> Self {
        self.max_body_bytes = bytes;
        self
    }

    /// Engine configuration derived from these settings.
    #[must_use]
    pub fn engine_config(&self) -> bitlog_core::Config {
        bitlog_core::Config::new()
            .max_segment_size(self.max_segment_size)
            .sync_on_write(self.sync_on_write)
    }
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Address to listen on.
    pub listen: SocketAddr,
    /// Base URL of the store node.
    pub store_url: String,
    /// Report failure from `/health`.
    pub health_failure: bool,
    /// Artificial delay before answering data requests.
    pub response_delay: Option<Duration>,
    /// Timeout for requests to the store node.
    pub request_timeout: Duration,
    /// Key and value written to the store once at startup.
    pub seed: Option<(String, Vec<u8>)>,
}

impl WorkerConfig {
    /// Creates a healthy worker configuration with no delay.
    #[must_use]
    pub fn new(listen: SocketAddr, store_url: impl Into<String>) -> Self {
        Self {
            listen,
            store_url: store_url.into(),
            health_failure: false,
            response_delay: None,
            request_timeout: Duration::from_secs(5),
            seed: None,
        }
    }

    /// Makes `/health` report failure.
    #[must_use]
    pub fn with_health_failure(mut self, failing: bool) -> Self {
        self.health_failure = failing;
        self
    }

    /// Delays every data response.
    #[must_use]
    pub fn with_response_delay(mut self, delay: Option<Duration>) -> Self {
        self.response_delay = delay;
        self
    }

    /// Sets the store request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Writes `value` under `key` on the store when the worker starts.
    #[must_use]
    pub fn with_seed(mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.seed = Some((key.into(), value.into()));
        self
    }
}

/// Load balancer configuration.
#[derive(Debug, Clone)]
pub struct BalancerConfig {
    /// Address to listen on.
    pub listen: SocketAddr,
    /// Backend addresses (`host:port`), in tie-break order.
    pub backends: Vec<String>,
    /// Interval between health check rounds.
    pub health_interval: Duration,
    /// Timeout for health checks and forwarded requests.
    pub request_timeout: Duration,
    /// Talk to backends over HTTPS.
    pub https: bool,
    /// Add an `lb-from` header naming the serving backend.
    pub trace: bool,
}

impl BalancerConfig {
    /// Creates a configuration with a 10 s health interval and 5 s timeout.
    #[must_use]
    pub fn new(listen: SocketAddr, backends: Vec<String>) -> Self {
        Self {
            listen,
            backends,
            health_interval: Duration::from_secs(10),
            request_timeout: Duration::from_secs(5),
            https: false,
            trace: false,
        }
    }

    /// Sets the health check interval.
    #[must_use]
    pub fn with_health_interval(mut self, interval: Duration) -> Self {
        self.health_interval = interval;
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Uses HTTPS towards backends.
    #[must_use]
    pub fn with_https(mut self, https: bool) -> Self {
        self.https = https;
        self
    }

    /// Enables the `lb-from` response header.
    #[must_use]
    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    /// URL scheme used towards backends.
    #[must_use]
    pub fn scheme(&self) -> &'static str {
        if self.https {
            "https"
        } else {
            "http"
        }
    }
}
