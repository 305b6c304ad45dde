//! Mockall mocks for the collaborator traits

use async_trait::async_trait;
use mockall::mock;
use std::collections::HashMap;

use trellis_client::engine::{HistoryStore, WorkflowEngine};
use trellis_core::{
    ChatMessage, ConversationId, CoreError, Execution, ExecutionId, ServiceType, StepId, Workflow,
};

mock! {
    /// Mock of the workflow engine collaborator
    pub Engine {}

    #[async_trait]
    impl WorkflowEngine for Engine {
        async fn start_execution(
            &self,
            service_type: &ServiceType,
            context: HashMap<String, serde_json::Value>,
        ) -> Result<Execution, CoreError>;

        async fn submit_decision<'a>(
            &self,
            execution_id: &ExecutionId,
            value: &str,
            step_id: Option<&'a StepId>,
        ) -> Result<(), CoreError>;

        async fn submit_selection(
            &self,
            execution_id: &ExecutionId,
            value: &str,
            payload: serde_json::Value,
        ) -> Result<(), CoreError>;

        async fn get_active_execution(&self) -> Result<Option<Execution>, CoreError>;

        async fn get_workflow(&self, service_type: &ServiceType) -> Result<Workflow, CoreError>;
    }
}

mock! {
    /// Mock of the history persistence collaborator
    pub History {}

    #[async_trait]
    impl HistoryStore for History {
        async fn fetch_history(
            &self,
            conversation: &ConversationId,
            limit: usize,
        ) -> Result<Vec<ChatMessage>, CoreError>;

        async fn append_history(&self, message: &ChatMessage) -> Result<(), CoreError>;

        async fn delete_history(&self, conversation: &ConversationId) -> Result<(), CoreError>;
    }
}
