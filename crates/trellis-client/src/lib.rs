//!
//! Trellis Client - Reconciliation core for the Trellis workflow client
//!
//! This crate keeps one consistent, live view of a remote workflow
//! execution whose true state lives on the server. Inbound push events and
//! authoritative poll results feed the [`ExecutionSynchronizer`]; pending
//! decision and selection prompts are arbitrated across observer surfaces
//! by the [`PromptArbiter`]; optimistic and server-confirmed chat history
//! is merged by the [`ChatHistoryReconciler`], scoped by whatever
//! conversation the [`ConversationRouter`] currently considers active.

// External dependencies
use std::sync::Arc;

/// Prompt arbitration module
pub mod arbiter;

/// Workflow catalog module
pub mod catalog;

/// Chat history reconciliation module
pub mod chat;

/// Configuration module
pub mod config;

/// Collaborator trait seams
pub mod engine;

/// Error module
pub mod error;

/// HTTP collaborator client module
pub mod http;

/// Conversation routing module
pub mod router;

/// Client service module
pub mod service;

/// Execution synchronization module
pub mod synchronizer;

// Re-export key types
pub use arbiter::{PromptArbiter, SurfaceId};
pub use catalog::WorkflowCatalog;
pub use chat::ChatHistoryReconciler;
pub use config::ClientConfig;
pub use engine::{HistoryStore, WorkflowEngine};
pub use error::{ClientError, ClientResult};
pub use http::HttpEngineClient;
pub use router::{ConversationRouter, FetchTicket};
pub use service::TrellisClient;
pub use synchronizer::{DropReason, EventOutcome, ExecutionSynchronizer, ResetHint, TrackPhase};

/// Build a [`TrellisClient`] wired to the HTTP collaborator described by
/// the configuration.
pub fn connect(config: ClientConfig) -> ClientResult<TrellisClient> {
    config.validate()?;
    let http = Arc::new(HttpEngineClient::new(
        config.engine_base_url.clone(),
        config.request_timeout(),
    ));
    Ok(TrellisClient::new(config, http.clone(), http))
}
