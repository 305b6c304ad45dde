//! In-memory implementations of the collaborator seams
//!
//! These fakes stand in for the workflow engine and the history
//! persistence in tests: scriptable active execution for poll scenarios,
//! recorded submissions, and switchable append failures.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use uuid::Uuid;

use trellis_client::engine::{HistoryStore, WorkflowEngine};
use trellis_core::{
    ChatMessage, ConversationId, CoreError, Execution, ExecutionId, ServiceType, StepId, Workflow,
};

/// Scriptable in-memory workflow engine
#[derive(Default)]
pub struct InMemoryWorkflowEngine {
    workflows: Mutex<HashMap<ServiceType, Workflow>>,
    active: Mutex<Option<Execution>>,
    decisions: Mutex<Vec<(ExecutionId, String, Option<StepId>)>>,
    selections: Mutex<Vec<(ExecutionId, String, serde_json::Value)>>,
    workflow_fetches: AtomicUsize,
    fail_next: Mutex<Option<CoreError>>,
}

impl InMemoryWorkflowEngine {
    /// Create an engine with no workflows and no active execution
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a workflow definition
    pub fn register_workflow(&self, workflow: Workflow) {
        self.workflows
            .lock()
            .insert(workflow.service_type.clone(), workflow);
    }

    /// Script what the next poll returns
    pub fn set_active_execution(&self, execution: Option<Execution>) {
        *self.active.lock() = execution;
    }

    /// Make the next call fail with the given error
    pub fn fail_next_call(&self, error: CoreError) {
        *self.fail_next.lock() = Some(error);
    }

    /// How many times a workflow definition was fetched
    pub fn workflow_fetches(&self) -> usize {
        self.workflow_fetches.load(Ordering::SeqCst)
    }

    /// Decisions submitted so far
    pub fn submitted_decisions(&self) -> Vec<(ExecutionId, String, Option<StepId>)> {
        self.decisions.lock().clone()
    }

    /// Selections submitted so far
    pub fn submitted_selections(&self) -> Vec<(ExecutionId, String, serde_json::Value)> {
        self.selections.lock().clone()
    }

    fn take_failure(&self) -> Result<(), CoreError> {
        match self.fail_next.lock().take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl WorkflowEngine for InMemoryWorkflowEngine {
    async fn start_execution(
        &self,
        service_type: &ServiceType,
        context: HashMap<String, serde_json::Value>,
    ) -> Result<Execution, CoreError> {
        self.take_failure()?;
        let workflow = self
            .workflows
            .lock()
            .get(service_type)
            .cloned()
            .ok_or_else(|| CoreError::WorkflowNotFound(service_type.0.clone()))?;

        let execution = Execution::new(
            ExecutionId(format!("exec-{}", Uuid::new_v4())),
            service_type.clone(),
            workflow.initial_step_id.clone(),
            context,
        );
        *self.active.lock() = Some(execution.clone());
        Ok(execution)
    }

    async fn submit_decision<'a>(
        &self,
        execution_id: &ExecutionId,
        value: &str,
        step_id: Option<&'a StepId>,
    ) -> Result<(), CoreError> {
        self.take_failure()?;
        self.decisions.lock().push((
            execution_id.clone(),
            value.to_string(),
            step_id.cloned(),
        ));
        Ok(())
    }

    async fn submit_selection(
        &self,
        execution_id: &ExecutionId,
        value: &str,
        payload: serde_json::Value,
    ) -> Result<(), CoreError> {
        self.take_failure()?;
        self.selections
            .lock()
            .push((execution_id.clone(), value.to_string(), payload));
        Ok(())
    }

    async fn get_active_execution(&self) -> Result<Option<Execution>, CoreError> {
        self.take_failure()?;
        Ok(self.active.lock().clone())
    }

    async fn get_workflow(&self, service_type: &ServiceType) -> Result<Workflow, CoreError> {
        self.workflow_fetches.fetch_add(1, Ordering::SeqCst);
        self.take_failure()?;
        self.workflows
            .lock()
            .get(service_type)
            .cloned()
            .ok_or_else(|| CoreError::WorkflowNotFound(service_type.0.clone()))
    }
}

/// In-memory history persistence with switchable append failures
#[derive(Default)]
pub struct InMemoryHistoryStore {
    messages: Mutex<HashMap<ConversationId, Vec<ChatMessage>>>,
    fail_appends: AtomicBool,
    append_attempts: AtomicUsize,
}

impl InMemoryHistoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a conversation's persisted history
    pub fn seed_history(&self, conversation: &ConversationId, messages: Vec<ChatMessage>) {
        self.messages.lock().insert(conversation.clone(), messages);
    }

    /// Make appends fail until switched back
    pub fn set_fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }

    /// How many appends were attempted, failed ones included
    pub fn append_attempts(&self) -> usize {
        self.append_attempts.load(Ordering::SeqCst)
    }

    /// The persisted messages of a conversation
    pub fn stored(&self, conversation: &ConversationId) -> Vec<ChatMessage> {
        self.messages
            .lock()
            .get(conversation)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn fetch_history(
        &self,
        conversation: &ConversationId,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, CoreError> {
        let messages = self.stored(conversation);
        let start = messages.len().saturating_sub(limit);
        Ok(messages[start..].to_vec())
    }

    async fn append_history(&self, message: &ChatMessage) -> Result<(), CoreError> {
        self.append_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(CoreError::Transport(
                "history append rejected by test configuration".to_string(),
            ));
        }
        self.messages
            .lock()
            .entry(message.conversation_id.clone())
            .or_default()
            .push(message.clone());
        Ok(())
    }

    async fn delete_history(&self, conversation: &ConversationId) -> Result<(), CoreError> {
        self.messages.lock().remove(conversation);
        Ok(())
    }
}
