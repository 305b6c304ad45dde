//! Collaborator trait seams for the Trellis client
//!
//! The workflow engine and the chat history persistence are external
//! collaborators. These traits define exactly the outbound calls the
//! reconciliation core makes; implementations live in [`crate::http`] and
//! in the test utilities.

use async_trait::async_trait;
use std::collections::HashMap;

use trellis_core::{
    ChatMessage, ConversationId, CoreError, Execution, ExecutionId, ServiceType, StepId, Workflow,
};

/// Outbound calls to the remote workflow engine
#[async_trait]
pub trait WorkflowEngine: Send + Sync {
    /// Start a new execution for a service type
    async fn start_execution(
        &self,
        service_type: &ServiceType,
        context: HashMap<String, serde_json::Value>,
    ) -> Result<Execution, CoreError>;

    /// Submit the user's choice for a blocking decision
    async fn submit_decision<'a>(
        &self,
        execution_id: &ExecutionId,
        value: &str,
        step_id: Option<&'a StepId>,
    ) -> Result<(), CoreError>;

    /// Submit the user's pick for a soft selection
    async fn submit_selection(
        &self,
        execution_id: &ExecutionId,
        value: &str,
        payload: serde_json::Value,
    ) -> Result<(), CoreError>;

    /// Poll for the currently active execution; authoritative
    async fn get_active_execution(&self) -> Result<Option<Execution>, CoreError>;

    /// Fetch the static workflow definition for a service type
    async fn get_workflow(&self, service_type: &ServiceType) -> Result<Workflow, CoreError>;
}

/// Outbound calls to the chat history persistence collaborator
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Fetch the most recent messages of a conversation
    async fn fetch_history(
        &self,
        conversation: &ConversationId,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, CoreError>;

    /// Persist one message
    async fn append_history(&self, message: &ChatMessage) -> Result<(), CoreError>;

    /// Delete a conversation's persisted history
    async fn delete_history(&self, conversation: &ConversationId) -> Result<(), CoreError>;
}
