use thiserror::Error;

/// Core error type for the Trellis client
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Transport failure on the push channel or an outbound call
    #[error("Transport error: {0}")]
    Transport(String),

    /// Event refers to a no-longer-relevant execution or step
    #[error("Stale event: {0}")]
    StaleEvent(String),

    /// Event omitted an execution id and cannot be attributed
    #[error("Ambiguous execution: {0}")]
    AmbiguousExecution(String),

    /// An outbound call exceeded its time bound
    #[error("Request timeout: {0}")]
    RequestTimeout(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Inbound channel message could not be parsed
    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    /// Workflow definition not found
    #[error("Workflow not found: {0}")]
    WorkflowNotFound(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Serialization(err.to_string())
    }
}

impl From<String> for CoreError {
    fn from(err: String) -> Self {
        CoreError::Other(err)
    }
}

impl From<&str> for CoreError {
    fn from(err: &str) -> Self {
        CoreError::Other(err.to_string())
    }
}

impl CoreError {
    /// Whether this error is recovered entirely locally and must never be
    /// surfaced to the user.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            CoreError::Transport(_) | CoreError::StaleEvent(_) | CoreError::AmbiguousExecution(_)
        )
    }
}
