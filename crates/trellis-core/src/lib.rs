//!
//! Trellis Core - Domain layer for the Trellis workflow client
//!
//! This crate defines the domain models shared by the Trellis client:
//! workflow definitions, the execution aggregate mirrored from the server,
//! the channel event model, prompt requests, and chat messages. It performs
//! no I/O; the `trellis-client` crate builds the reconciliation services
//! on top of these types.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Domain layer - core models and rules
pub mod domain;

/// Error types
pub mod error;

/// Shared value types
pub mod types;

// Re-export key types
pub use error::CoreError;
pub use types::{MediaRef, ServiceType};

pub use domain::chat::{ChatMessage, ChatRole, ConversationId, ConversationScope};
pub use domain::events::{ChannelEvent, EventEnvelope};
pub use domain::execution::{Execution, ExecutionId, ExecutionStatus, HistoryEntry};
pub use domain::prompt::{
    DecisionOption, DecisionRequest, PromptRequest, SelectionOption, SelectionRequest,
};
pub use domain::workflow::{Step, StepId, StepType, Transition, Workflow, WorkflowId};
