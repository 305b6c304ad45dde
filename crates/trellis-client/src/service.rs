//! The Trellis client service
//!
//! Wires the reconciliation components together: inbound channel events
//! are validated at the boundary and dispatched to the synchronizer or the
//! chat reconciler, emitted prompts go to the arbiter, and outbound
//! submissions are validated against the workflow catalog before any
//! network call. All observer surfaces read from this one instance.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::arbiter::{PromptArbiter, SurfaceId};
use crate::catalog::WorkflowCatalog;
use crate::chat::ChatHistoryReconciler;
use crate::config::ClientConfig;
use crate::engine::{HistoryStore, WorkflowEngine};
use crate::error::{ClientError, ClientResult};
use crate::router::ConversationRouter;
use crate::synchronizer::{EventOutcome, ExecutionSynchronizer, ResetHint};
use trellis_core::{
    ChannelEvent, ChatMessage, ChatRole, ConversationId, ConversationScope, CoreError,
    EventEnvelope, Execution, ExecutionId, PromptRequest, ServiceType, StepId, StepType,
};

/// One consistent, live view of a remote workflow execution
pub struct TrellisClient {
    config: ClientConfig,
    engine: Arc<dyn WorkflowEngine>,
    history: Arc<dyn HistoryStore>,
    catalog: Arc<WorkflowCatalog>,
    synchronizer: ExecutionSynchronizer,
    arbiter: PromptArbiter,
    chat: ChatHistoryReconciler,
    router: ConversationRouter,
}

impl TrellisClient {
    /// Create a client over the given collaborators
    pub fn new(
        config: ClientConfig,
        engine: Arc<dyn WorkflowEngine>,
        history: Arc<dyn HistoryStore>,
    ) -> Self {
        let catalog = Arc::new(WorkflowCatalog::new(engine.clone(), config.catalog_capacity));
        let synchronizer =
            ExecutionSynchronizer::new(engine.clone(), catalog.clone(), config.completed_grace());
        let chat =
            ChatHistoryReconciler::new(config.chat_clear_cooldown(), config.history_render_limit);

        Self {
            config,
            engine,
            history,
            catalog,
            synchronizer,
            arbiter: PromptArbiter::new(),
            chat,
            router: ConversationRouter::new(),
        }
    }

    /// Apply one raw channel message
    ///
    /// Malformed payloads are rejected at this boundary and never reach
    /// the reconciliation core.
    pub async fn handle_channel_message(&mut self, raw: &str) -> ClientResult<()> {
        let envelope = match EventEnvelope::parse(raw) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(error = %err, "Rejecting malformed channel message");
                return Err(err.into());
            }
        };
        self.handle_event(envelope).await
    }

    /// Apply one parsed channel event
    pub async fn handle_event(&mut self, envelope: EventEnvelope) -> ClientResult<()> {
        match &envelope.event {
            ChannelEvent::ChatMessage {
                conversation_id,
                id,
                role,
                content,
                timestamp,
                author_email,
            } => {
                let message = ChatMessage {
                    id: id.clone(),
                    conversation_id: conversation_id.clone(),
                    role: *role,
                    content: content.clone(),
                    timestamp: *timestamp,
                    author: author_email.clone(),
                    media: None,
                };
                let conversation = conversation_id.clone();
                self.chat.merge_server_batch(&conversation, vec![message]);
            }
            ChannelEvent::ChatHistoryDeleted { conversation_id } => {
                let conversation = conversation_id.clone();
                self.chat.clear(&conversation);
            }
            _ => {
                let outcome = self.synchronizer.on_event(&envelope).await;
                match outcome {
                    EventOutcome::Prompt(prompt) => {
                        self.arbiter.offer(prompt);
                    }
                    EventOutcome::AdoptedPendingSync => {
                        if let Err(err) = self.synchronizer.poll_now().await {
                            warn!(error = %err, "Resync poll failed; retrying on next cycle");
                        }
                    }
                    EventOutcome::Applied | EventOutcome::Dropped(_) => {}
                }
            }
        }
        Ok(())
    }

    /// Start a new execution for a service type
    ///
    /// Execution-scoped events are dropped while the start call is in
    /// flight; the returned execution is adopted as the tracked one.
    pub async fn start_execution(
        &mut self,
        service_type: &ServiceType,
        context: HashMap<String, serde_json::Value>,
    ) -> ClientResult<Execution> {
        // Ensure the workflow exists (and is cached) before starting.
        self.catalog.get(service_type).await?;

        self.synchronizer.reset(ResetHint::Pending);
        let execution = self.engine.start_execution(service_type, context).await?;
        info!(
            execution_id = %execution.id,
            service_type = %service_type,
            "Execution started"
        );
        self.synchronizer.adopt(execution.clone());
        Ok(execution)
    }

    /// Submit the user's choice for a blocking decision
    ///
    /// The step type is checked against the workflow catalog before the
    /// network call; submitting a decision for a non-decision step fails
    /// immediately without touching the server.
    pub async fn submit_decision(
        &mut self,
        execution_id: &ExecutionId,
        value: &str,
        step_id: Option<StepId>,
    ) -> ClientResult<()> {
        let execution = self
            .synchronizer
            .active_execution()
            .ok_or_else(|| ClientError::NotFound("Active execution".to_string()))?;
        if execution.id != *execution_id {
            return Err(ClientError::NotFound(format!("Execution {}", execution_id)));
        }
        let service_type = execution.service_type.clone();
        let step_id = match step_id {
            Some(step_id) => step_id,
            None => match self.arbiter.pending() {
                Some(pending) if pending.execution_id() == execution_id => {
                    pending.step_id().clone()
                }
                _ => execution.current_step_id.clone(),
            },
        };

        let step = self
            .catalog
            .step(&service_type, &step_id)
            .await?
            .ok_or_else(|| ClientError::NotFound(format!("Step {}", step_id)))?;
        if step.step_type != StepType::Decision {
            return Err(CoreError::Validation(format!(
                "Step {} is not a decision step",
                step_id
            ))
            .into());
        }

        self.engine
            .submit_decision(execution_id, value, Some(&step_id))
            .await?;
        self.arbiter.resolve(execution_id);
        Ok(())
    }

    /// Submit the user's pick for a soft selection
    pub async fn submit_selection(
        &mut self,
        execution_id: &ExecutionId,
        value: &str,
        payload: serde_json::Value,
    ) -> ClientResult<()> {
        self.engine
            .submit_selection(execution_id, value, payload)
            .await?;
        self.arbiter.resolve(execution_id);
        Ok(())
    }

    /// Force an authoritative poll
    pub async fn poll_now(&mut self) -> ClientResult<()> {
        self.synchronizer.poll_now().await?;
        Ok(())
    }

    /// Handle a channel reconnect: push deliveries may have been lost, so
    /// resynchronize immediately from the authoritative poll.
    pub async fn on_reconnected(&mut self) -> ClientResult<()> {
        info!("Channel reconnected; forcing resynchronization poll");
        self.poll_now().await
    }

    /// Switch the active conversation and fetch its history
    ///
    /// The rendered list blanks immediately; the fetch response is applied
    /// only if the active conversation and fetch sequence still match at
    /// completion time.
    pub async fn switch_conversation(
        &mut self,
        scope: ConversationScope,
        scope_id: &str,
        view_mode: &str,
    ) -> ClientResult<ConversationId> {
        let conversation = ConversationRouter::conversation_id(scope, scope_id, view_mode);
        let Some(ticket) = self.router.set_active(conversation.clone()) else {
            return Ok(conversation);
        };

        self.chat.reset(&conversation);
        let fetched = self
            .history
            .fetch_history(&ticket.conversation, self.config.history_render_limit)
            .await;
        match fetched {
            Ok(batch) => {
                if self.router.accept(&ticket) {
                    self.chat.merge_server_batch(&ticket.conversation, batch);
                } else {
                    debug!(
                        conversation = %ticket.conversation,
                        seq = ticket.seq,
                        "Discarding stale history fetch"
                    );
                }
            }
            Err(err) => {
                warn!(
                    conversation = %ticket.conversation,
                    error = %err,
                    "History fetch failed; view stays empty until the next switch"
                );
            }
        }
        Ok(conversation)
    }

    /// Send a chat message: visible immediately, persisted best-effort
    ///
    /// A failed server append does not retract the optimistic entry; it is
    /// flagged for silent retry via [`TrellisClient::flush_retries`].
    pub async fn send_chat_message(
        &mut self,
        conversation: &ConversationId,
        content: &str,
        author: &str,
    ) -> ClientResult<Option<ChatMessage>> {
        let message = ChatMessage {
            id: None,
            conversation_id: conversation.clone(),
            role: ChatRole::User,
            content: content.to_string(),
            timestamp: Utc::now(),
            author: author.to_string(),
            media: None,
        };

        let Some(stored) = self.chat.append_optimistic(message) else {
            return Ok(None);
        };
        let local_id = stored.id.clone().unwrap_or_default();

        let appended = self.history.append_history(&stored).await;
        match appended {
            Ok(()) => self.chat.confirm_append(conversation, &local_id),
            Err(err) => {
                warn!(
                    conversation = %conversation,
                    error = %err,
                    "Chat append failed; entry stays visible and will retry"
                );
                self.chat.mark_append_failed(conversation, &local_id);
            }
        }
        Ok(Some(stored))
    }

    /// Retry previously failed chat appends for a conversation
    pub async fn flush_retries(&mut self, conversation: &ConversationId) {
        for message in self.chat.take_retryable(conversation) {
            let local_id = message.id.clone().unwrap_or_default();
            let appended = self.history.append_history(&message).await;
            match appended {
                Ok(()) => self.chat.confirm_append(conversation, &local_id),
                Err(err) => {
                    warn!(
                        conversation = %conversation,
                        error = %err,
                        "Chat append retry failed; entry stays flagged"
                    );
                    self.chat.mark_append_failed(conversation, &local_id);
                }
            }
        }
    }

    /// Delete a conversation's history, locally and server-side
    pub async fn delete_conversation(&mut self, conversation: &ConversationId) -> ClientResult<()> {
        self.chat.clear(conversation);
        self.history.delete_history(conversation).await?;
        Ok(())
    }

    /// Register an observer surface with its visibility predicate
    pub fn register_surface<F>(&mut self, surface: SurfaceId, is_visible: F)
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.arbiter.register_surface(surface, is_visible);
    }

    /// Notify the arbiter that surface visibility may have changed
    pub fn visibility_changed(&mut self) {
        self.arbiter.reevaluate();
    }

    /// The prompt arbiter
    pub fn arbiter(&self) -> &PromptArbiter {
        &self.arbiter
    }

    /// Mutable access to the prompt arbiter, for surfaces acquiring prompts
    pub fn arbiter_mut(&mut self) -> &mut PromptArbiter {
        &mut self.arbiter
    }

    /// The pending prompt, if any
    pub fn pending_prompt(&self) -> Option<&PromptRequest> {
        self.arbiter.pending()
    }

    /// The tracked execution, if any
    pub fn active_execution(&self) -> Option<&Execution> {
        self.synchronizer.active_execution()
    }

    /// The tracked execution's current step, if any
    pub fn current_step(&self) -> Option<&StepId> {
        self.synchronizer.current_step()
    }

    /// The rendered messages of a conversation
    pub fn messages(&self, conversation: &ConversationId) -> &[ChatMessage] {
        self.chat.messages(conversation)
    }

    /// The currently active conversation, if any
    pub fn active_conversation(&self) -> Option<&ConversationId> {
        self.router.active()
    }

    /// The client configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}
