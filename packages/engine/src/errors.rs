//! Error types for the engine

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Classification of a backend failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// Connection dropped, timeout, DNS failure
    Network,

    /// 5xx response
    Server(u16),

    /// 4xx response
    Client(u16),

    Other,
}

/// Failure reported by the accept/reject backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind:?}: {message}")]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub message: String,
}

impl ApiError {
    pub fn new(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Network, message)
    }

    /// Build from an HTTP status code
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let kind = match status {
            400..=499 => ApiErrorKind::Client(status),
            500..=599 => ApiErrorKind::Server(status),
            _ => ApiErrorKind::Other,
        };
        Self::new(kind, message)
    }

    /// Network errors and 5xx responses may succeed on retry; 4xx will not.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, ApiErrorKind::Network | ApiErrorKind::Server(_))
    }
}
