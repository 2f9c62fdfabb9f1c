//! Error types for the HTTP services.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bitlog_core::CoreError;
use thiserror::Error;
use tracing::error;

/// Result type for HTTP handlers.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors surfaced by the store node, worker and balancer.
///
/// Each variant maps to one HTTP status; see [`ServerError::status`].
#[derive(Debug, Error)]
pub enum ServerError {
    /// The key has no value.
    #[error("key not found")]
    NotFound,

    /// The request is malformed.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The storage engine failed.
    #[error("engine error: {0}")]
    Engine(#[from] CoreError),

    /// A request to another service failed.
    #[error("upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),

    /// A service was configured with an unusable value.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Every backend is failing its health check.
    #[error("no healthy backend available")]
    NoHealthyBackend,

    /// A blocking task panicked or was cancelled.
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl ServerError {
    /// Creates a bad request error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Returns true if this is a client error (4xx).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        self.status().is_client_error()
    }

    /// Returns true if this is a server error (5xx).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        self.status().is_server_error()
    }

    /// HTTP status for this error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Engine(CoreError::InvalidOperation { .. } | CoreError::RecordTooLarge { .. }) => {
                StatusCode::BAD_REQUEST
            }
            Self::Engine(CoreError::EngineClosed) | Self::NoHealthyBackend => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::Engine(_) | Self::Config(_) | Self::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Upstream(e) if e.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if self.is_server_error() {
            error!(status = status.as_u16(), error = %self, "request failed");
        }
        (status, self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_classification() {
        assert!(ServerError::bad_request("bad").is_client_error());
        assert!(ServerError::NoHealthyBackend.is_server_error());
        assert!(!ServerError::NotFound.is_server_error());
    }

    #[test]
    fn status_mapping() {
        assert_eq!(ServerError::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(ServerError::bad_request("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ServerError::NoHealthyBackend.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ServerError::Engine(CoreError::invalid_operation("empty key")).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServerError::Engine(CoreError::DatabaseLocked).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ServerError::Engine(CoreError::EngineClosed).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
