//! HTTP implementation of the collaborator seams
//!
//! This module talks JSON over HTTP to the workflow engine and the history
//! persistence API. Timeouts surface as retryable request timeouts; every
//! other transport failure is a transport error recovered by the next poll
//! cycle.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use crate::engine::{HistoryStore, WorkflowEngine};
use trellis_core::{
    ChatMessage, ConversationId, CoreError, Execution, ExecutionId, ServiceType, StepId, Workflow,
};

/// HTTP client for the workflow engine and history collaborators
#[derive(Debug, Clone)]
pub struct HttpEngineClient {
    /// Base URL of the engine API
    base_url: String,

    /// HTTP client
    client: Client,
}

impl HttpEngineClient {
    /// Create a new HttpEngineClient
    pub fn new(base_url: String, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Get the base URL for execution endpoints
    fn executions_url(&self) -> String {
        format!("{}/api/executions", self.base_url)
    }

    /// Get the URL for a specific execution
    fn execution_url(&self, execution_id: &ExecutionId) -> String {
        format!("{}/{}", self.executions_url(), execution_id.0)
    }

    /// Get the URL for a workflow definition
    fn workflow_url(&self, service_type: &ServiceType) -> String {
        format!("{}/api/workflows/{}", self.base_url, service_type.0)
    }

    /// Get the URL for a conversation's messages
    fn messages_url(&self, conversation: &ConversationId) -> String {
        format!("{}/api/conversations/{}/messages", self.base_url, conversation.0)
    }
}

fn request_error(operation: &str, err: reqwest::Error) -> CoreError {
    if err.is_timeout() {
        CoreError::RequestTimeout(format!("{}: {}", operation, err))
    } else {
        CoreError::Transport(format!("{}: {}", operation, err))
    }
}

fn status_error(operation: &str, status: StatusCode) -> CoreError {
    CoreError::Transport(format!("{} failed with status {}", operation, status))
}

async fn read_json<T: serde::de::DeserializeOwned>(
    operation: &str,
    response: reqwest::Response,
) -> Result<T, CoreError> {
    response
        .json()
        .await
        .map_err(|err| CoreError::Serialization(format!("{}: {}", operation, err)))
}

#[async_trait]
impl WorkflowEngine for HttpEngineClient {
    async fn start_execution(
        &self,
        service_type: &ServiceType,
        context: HashMap<String, serde_json::Value>,
    ) -> Result<Execution, CoreError> {
        debug!(service_type = %service_type, "Starting execution");
        let response = self
            .client
            .post(self.executions_url())
            .json(&json!({
                "serviceType": service_type,
                "context": context,
            }))
            .send()
            .await
            .map_err(|err| request_error("start_execution", err))?;

        if !response.status().is_success() {
            return Err(status_error("start_execution", response.status()));
        }
        read_json("start_execution", response).await
    }

    async fn submit_decision<'a>(
        &self,
        execution_id: &ExecutionId,
        value: &str,
        step_id: Option<&'a StepId>,
    ) -> Result<(), CoreError> {
        debug!(execution_id = %execution_id, value, "Submitting decision");
        let response = self
            .client
            .post(format!("{}/decision", self.execution_url(execution_id)))
            .json(&json!({
                "value": value,
                "stepId": step_id,
            }))
            .send()
            .await
            .map_err(|err| request_error("submit_decision", err))?;

        if !response.status().is_success() {
            return Err(status_error("submit_decision", response.status()));
        }
        Ok(())
    }

    async fn submit_selection(
        &self,
        execution_id: &ExecutionId,
        value: &str,
        payload: serde_json::Value,
    ) -> Result<(), CoreError> {
        debug!(execution_id = %execution_id, value, "Submitting selection");
        let response = self
            .client
            .post(format!("{}/selection", self.execution_url(execution_id)))
            .json(&json!({
                "value": value,
                "payload": payload,
            }))
            .send()
            .await
            .map_err(|err| request_error("submit_selection", err))?;

        if !response.status().is_success() {
            return Err(status_error("submit_selection", response.status()));
        }
        Ok(())
    }

    async fn get_active_execution(&self) -> Result<Option<Execution>, CoreError> {
        let response = self
            .client
            .get(format!("{}/active", self.executions_url()))
            .send()
            .await
            .map_err(|err| request_error("get_active_execution", err))?;

        match response.status() {
            StatusCode::NO_CONTENT | StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                Ok(Some(read_json("get_active_execution", response).await?))
            }
            status => Err(status_error("get_active_execution", status)),
        }
    }

    async fn get_workflow(&self, service_type: &ServiceType) -> Result<Workflow, CoreError> {
        let response = self
            .client
            .get(self.workflow_url(service_type))
            .send()
            .await
            .map_err(|err| request_error("get_workflow", err))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(CoreError::WorkflowNotFound(service_type.0.clone())),
            status if status.is_success() => read_json("get_workflow", response).await,
            status => Err(status_error("get_workflow", status)),
        }
    }
}

#[async_trait]
impl HistoryStore for HttpEngineClient {
    async fn fetch_history(
        &self,
        conversation: &ConversationId,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, CoreError> {
        let response = self
            .client
            .get(self.messages_url(conversation))
            .query(&[("limit", limit)])
            .send()
            .await
            .map_err(|err| request_error("fetch_history", err))?;

        if !response.status().is_success() {
            return Err(status_error("fetch_history", response.status()));
        }
        read_json("fetch_history", response).await
    }

    async fn append_history(&self, message: &ChatMessage) -> Result<(), CoreError> {
        let response = self
            .client
            .post(self.messages_url(&message.conversation_id))
            .json(message)
            .send()
            .await
            .map_err(|err| request_error("append_history", err))?;

        if !response.status().is_success() {
            return Err(status_error("append_history", response.status()));
        }
        Ok(())
    }

    async fn delete_history(&self, conversation: &ConversationId) -> Result<(), CoreError> {
        let response = self
            .client
            .delete(self.messages_url(conversation))
            .send()
            .await
            .map_err(|err| request_error("delete_history", err))?;

        if !response.status().is_success() {
            return Err(status_error("delete_history", response.status()));
        }
        Ok(())
    }
}
