//!
//! Trellis Test Utils - Testing utilities for the Trellis client
//!
//! In-memory implementations of the collaborator seams, data builders for
//! workflows and channel events, and mockall mocks. Used by unit and
//! integration tests across the workspace.

/// Data builders for workflows, events, and messages
pub mod builders;

/// In-memory collaborator implementations
pub mod implementations;

/// Mockall mocks for the collaborator traits
pub mod mocks;

pub use builders::{
    chat_message, chat_message_event, decision_required, envelope, execution_completed,
    execution_started, movie_workflow, selection_required, step_changed,
};
pub use implementations::{InMemoryHistoryStore, InMemoryWorkflowEngine};
pub use mocks::{MockEngine, MockHistory};

/// Initialize tracing for tests; safe to call repeatedly
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
