//! Inbound channel event model
//!
//! The push channel delivers `{type, data, timestamp}` messages with
//! at-least-once, possibly-out-of-order semantics. Events are parsed into
//! a tagged union at the channel boundary; malformed messages are rejected
//! there and never reach the reconciliation core.

use crate::domain::chat::{ChatRole, ConversationId};
use crate::domain::execution::ExecutionId;
use crate::domain::prompt::{DecisionOption, SelectionOption};
use crate::domain::workflow::StepId;
use crate::{CoreError, ServiceType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One event as delivered by the push channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ChannelEvent {
    /// A new execution started on the server
    #[serde(rename_all = "camelCase")]
    ExecutionStarted {
        /// The execution that started
        execution_id: ExecutionId,
        /// Service type of its workflow
        service_type: ServiceType,
    },

    /// An execution moved to a new step
    #[serde(rename_all = "camelCase")]
    StepChanged {
        /// The execution that moved; may be absent on a degraded channel
        execution_id: Option<ExecutionId>,
        /// The step it moved to
        step_id: StepId,
    },

    /// The server is blocked on an explicit user decision
    #[serde(rename_all = "camelCase")]
    DecisionRequired {
        /// The execution that is blocked
        execution_id: Option<ExecutionId>,
        /// The decision step
        step_id: StepId,
        /// Prompt text
        prompt: String,
        /// Choosable options
        options: Vec<DecisionOption>,
        /// Advisory rendering timeout in seconds
        timeout: u64,
        /// Optional media url shown alongside the prompt
        video_url: Option<String>,
        /// Optional media title
        title: Option<String>,
    },

    /// The server offers candidate results for a soft selection
    #[serde(rename_all = "camelCase")]
    SelectionRequired {
        /// The execution the candidates belong to
        execution_id: Option<ExecutionId>,
        /// The selection step
        step_id: StepId,
        /// Prompt text
        prompt: String,
        /// Candidate results
        options: Vec<SelectionOption>,
        /// Advisory rendering timeout in seconds
        timeout: u64,
    },

    /// An execution finished
    #[serde(rename_all = "camelCase")]
    ExecutionCompleted {
        /// The execution that finished
        execution_id: Option<ExecutionId>,
    },

    /// A server-confirmed chat message
    #[serde(rename_all = "camelCase")]
    ChatMessage {
        /// Conversation the message belongs to
        conversation_id: ConversationId,
        /// Server-assigned id, or the echoed local id of an optimistic send
        id: Option<String>,
        /// Author role
        role: ChatRole,
        /// Message body
        content: String,
        /// When the message was written
        timestamp: DateTime<Utc>,
        /// Author identifier
        author_email: String,
    },

    /// A conversation's history was deleted server-side
    #[serde(rename_all = "camelCase")]
    ChatHistoryDeleted {
        /// The conversation that was cleared
        conversation_id: ConversationId,
    },
}

impl ChannelEvent {
    /// The wire name of this event type
    pub fn event_type(&self) -> &'static str {
        match self {
            ChannelEvent::ExecutionStarted { .. } => "execution_started",
            ChannelEvent::StepChanged { .. } => "step_changed",
            ChannelEvent::DecisionRequired { .. } => "decision_required",
            ChannelEvent::SelectionRequired { .. } => "selection_required",
            ChannelEvent::ExecutionCompleted { .. } => "execution_completed",
            ChannelEvent::ChatMessage { .. } => "chat_message",
            ChannelEvent::ChatHistoryDeleted { .. } => "chat_history_deleted",
        }
    }

    /// Whether this event mutates execution state
    pub fn is_execution_scoped(&self) -> bool {
        !matches!(
            self,
            ChannelEvent::ChatMessage { .. } | ChannelEvent::ChatHistoryDeleted { .. }
        )
    }

    /// The execution id the event carries, if any
    pub fn execution_id(&self) -> Option<&ExecutionId> {
        match self {
            ChannelEvent::ExecutionStarted { execution_id, .. } => Some(execution_id),
            ChannelEvent::StepChanged { execution_id, .. }
            | ChannelEvent::DecisionRequired { execution_id, .. }
            | ChannelEvent::SelectionRequired { execution_id, .. }
            | ChannelEvent::ExecutionCompleted { execution_id } => execution_id.as_ref(),
            _ => None,
        }
    }
}

/// The channel envelope: an event plus its delivery timestamp
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// The delivered event
    #[serde(flatten)]
    pub event: ChannelEvent,

    /// Server-side emission timestamp
    pub timestamp: DateTime<Utc>,
}

impl EventEnvelope {
    /// Parse a raw channel message, rejecting malformed payloads
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        serde_json::from_str(raw).map_err(|err| CoreError::MalformedEvent(err.to_string()))
    }
}
