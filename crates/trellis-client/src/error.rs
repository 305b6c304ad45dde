//! Error types for the Trellis client
//!
//! Transport- and staleness-level failures are recovered locally and never
//! surfaced; only request-level failures that require user action reach
//! callers of the service layer.

use thiserror::Error;
use trellis_core::CoreError;

/// Client error types
#[derive(Error, Debug)]
pub enum ClientError {
    /// Resource not found
    #[error("{0} not found")]
    NotFound(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Domain-level error
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;

impl ClientError {
    /// Whether the operation may be retried as-is
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::Core(CoreError::RequestTimeout(_)) | ClientError::Core(CoreError::Transport(_))
        )
    }
}
