//! Execution synchronization
//!
//! The synchronizer applies inbound channel events and authoritative poll
//! results to the local execution mirror. Push delivery is best-effort,
//! at-least-once, and unordered; every event is therefore checked for
//! idempotency, staleness, and execution scoping before it touches state.
//! Poll results always win over push-derived state.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::catalog::WorkflowCatalog;
use crate::engine::WorkflowEngine;
use trellis_core::{
    ChannelEvent, CoreError, DecisionRequest, EventEnvelope, Execution, ExecutionId, MediaRef,
    PromptRequest, SelectionRequest, ServiceType, StepId,
};

/// How tracking is reset
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResetHint {
    /// Drop all execution-scoped events until a start event supplies an id
    Pending,

    /// Only events for this execution may be applied
    Expect(ExecutionId),
}

/// Why an event was not applied
///
/// None of these are errors: drops are logged and recovered by the next
/// poll cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Synchronizer is awaiting a start event after a reset
    PendingReset,

    /// Event refers to an execution other than the tracked one
    StaleExecution,

    /// Event carries no execution id and cannot be attributed
    Ambiguous,

    /// Benign duplicate delivery
    Duplicate,

    /// Event does not mutate execution state
    NotExecutionScoped,
}

/// Result of applying one inbound event
#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    /// Event was applied to the tracked execution
    Applied,

    /// Event produced a prompt for the arbiter
    Prompt(PromptRequest),

    /// An execution id was adopted without state; the caller should poll
    AdoptedPendingSync,

    /// Event was dropped
    Dropped(DropReason),
}

/// Coarse tracking phase, exposed for observers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackPhase {
    /// No execution tracked
    Untracked,

    /// Awaiting a start event or poll discovery
    Pending,

    /// One active execution tracked
    Tracking,

    /// Tracked execution finished, retained for the grace period
    Completed,
}

enum TrackState {
    Untracked,
    Pending { expected: Option<ExecutionId> },
    Tracking(Execution),
    Completed { execution: Execution, since: DateTime<Utc> },
}

/// Applies inbound events and poll results to the local execution mirror
///
/// At most one execution is tracked per synchronizer instance; every
/// observer surface reads from the same instance.
pub struct ExecutionSynchronizer {
    engine: Arc<dyn WorkflowEngine>,
    catalog: Arc<WorkflowCatalog>,
    state: TrackState,
    grace: chrono::Duration,
}

impl ExecutionSynchronizer {
    /// Create a synchronizer in the untracked state
    pub fn new(
        engine: Arc<dyn WorkflowEngine>,
        catalog: Arc<WorkflowCatalog>,
        completed_grace: std::time::Duration,
    ) -> Self {
        let grace =
            chrono::Duration::from_std(completed_grace).unwrap_or_else(|_| chrono::Duration::seconds(30));
        Self {
            engine,
            catalog,
            state: TrackState::Untracked,
            grace,
        }
    }

    /// Clear execution tracking
    ///
    /// With [`ResetHint::Pending`], every execution-scoped event is dropped
    /// until a start event supplies a concrete id. With
    /// [`ResetHint::Expect`], only events matching the hinted id are
    /// considered.
    pub fn reset(&mut self, hint: ResetHint) {
        match hint {
            ResetHint::Pending => {
                debug!("Execution tracking reset to pending");
                self.state = TrackState::Pending { expected: None };
            }
            ResetHint::Expect(id) => {
                debug!(execution_id = %id, "Execution tracking reset; expecting execution");
                self.state = TrackState::Pending { expected: Some(id) };
            }
        }
    }

    /// Adopt an execution obtained out of band (a successful start call)
    pub fn adopt(&mut self, execution: Execution) {
        info!(execution_id = %execution.id, "Tracking execution");
        self.install(execution, Utc::now());
    }

    /// Apply one inbound channel event
    pub async fn on_event(&mut self, envelope: &EventEnvelope) -> EventOutcome {
        self.on_event_at(envelope, Utc::now()).await
    }

    pub async fn on_event_at(&mut self, envelope: &EventEnvelope, now: DateTime<Utc>) -> EventOutcome {
        self.expire_completed_at(now);

        if !envelope.event.is_execution_scoped() {
            debug!(
                event = envelope.event.event_type(),
                "Ignoring non-execution event"
            );
            return EventOutcome::Dropped(DropReason::NotExecutionScoped);
        }

        if let ChannelEvent::ExecutionStarted {
            execution_id,
            service_type,
        } = &envelope.event
        {
            return self.on_execution_started(execution_id, service_type, now).await;
        }

        let event_execution = envelope.event.execution_id().cloned();
        let state = std::mem::replace(&mut self.state, TrackState::Untracked);
        match state {
            TrackState::Pending { expected } => {
                let outcome = match (&expected, &event_execution) {
                    (Some(hinted), Some(id)) if hinted == id => {
                        debug!(
                            execution_id = %id,
                            "Event for expected execution arrived before its state; deferring to poll"
                        );
                        EventOutcome::AdoptedPendingSync
                    }
                    (Some(hinted), Some(id)) => {
                        debug!(
                            execution_id = %id,
                            expected = %hinted,
                            "Dropping event for unexpected execution"
                        );
                        EventOutcome::Dropped(DropReason::StaleExecution)
                    }
                    _ => {
                        debug!(
                            event = envelope.event.event_type(),
                            "Dropping execution event during pending reset"
                        );
                        EventOutcome::Dropped(DropReason::PendingReset)
                    }
                };
                self.state = TrackState::Pending { expected };
                outcome
            }
            TrackState::Untracked => match event_execution {
                Some(id) => {
                    info!(
                        execution_id = %id,
                        event = envelope.event.event_type(),
                        "Adopting execution id from event; state follows on next poll"
                    );
                    self.state = TrackState::Pending { expected: Some(id) };
                    EventOutcome::AdoptedPendingSync
                }
                None => {
                    warn!(
                        event = envelope.event.event_type(),
                        "Event carries no execution id and none is tracked; dropping"
                    );
                    EventOutcome::Dropped(DropReason::Ambiguous)
                }
            },
            TrackState::Tracking(mut execution) => {
                if let Some(id) = &event_execution {
                    if *id != execution.id {
                        debug!(
                            execution_id = %id,
                            tracked = %execution.id,
                            "Dropping event for non-tracked execution"
                        );
                        self.state = TrackState::Tracking(execution);
                        return EventOutcome::Dropped(DropReason::StaleExecution);
                    }
                } else {
                    // Exactly one execution is tracked; attribute the event
                    // to it and note the ambiguity.
                    debug!(
                        tracked = %execution.id,
                        event = envelope.event.event_type(),
                        "Event carries no execution id; attributing to the tracked execution"
                    );
                }

                let outcome = apply_to_tracked(&mut execution, &envelope.event, now);
                if execution.is_active() {
                    self.state = TrackState::Tracking(execution);
                } else {
                    info!(execution_id = %execution.id, "Execution completed");
                    self.state = TrackState::Completed {
                        execution,
                        since: now,
                    };
                }
                outcome
            }
            TrackState::Completed { execution, since } => {
                let outcome = match &event_execution {
                    Some(id) if *id == execution.id => {
                        debug!(
                            execution_id = %id,
                            event = envelope.event.event_type(),
                            "Absorbing trailing event for completed execution"
                        );
                        EventOutcome::Dropped(DropReason::Duplicate)
                    }
                    Some(id) => {
                        debug!(execution_id = %id, "Dropping event for non-tracked execution");
                        EventOutcome::Dropped(DropReason::StaleExecution)
                    }
                    None => {
                        debug!("Dropping ambiguous event while tracking a completed execution");
                        EventOutcome::Dropped(DropReason::Ambiguous)
                    }
                };
                self.state = TrackState::Completed { execution, since };
                outcome
            }
        }
    }

    async fn on_execution_started(
        &mut self,
        execution_id: &ExecutionId,
        service_type: &ServiceType,
        now: DateTime<Utc>,
    ) -> EventOutcome {
        match &self.state {
            TrackState::Pending {
                expected: Some(hinted),
            } if hinted != execution_id => {
                debug!(
                    execution_id = %execution_id,
                    expected = %hinted,
                    "Dropping start of unexpected execution"
                );
                return EventOutcome::Dropped(DropReason::StaleExecution);
            }
            TrackState::Tracking(execution) => {
                return if execution.id == *execution_id {
                    debug!(execution_id = %execution_id, "Duplicate start event");
                    EventOutcome::Dropped(DropReason::Duplicate)
                } else {
                    debug!(
                        execution_id = %execution_id,
                        tracked = %execution.id,
                        "Dropping start while another execution is tracked"
                    );
                    EventOutcome::Dropped(DropReason::StaleExecution)
                };
            }
            TrackState::Completed { execution, .. } if execution.id == *execution_id => {
                debug!(execution_id = %execution_id, "Duplicate start of completed execution");
                return EventOutcome::Dropped(DropReason::Duplicate);
            }
            // Untracked, matching or unset expectation, or a completed
            // execution being superseded.
            _ => {}
        }

        let workflow = self.catalog.get(service_type).await;
        match workflow {
            Ok(workflow) => {
                info!(
                    execution_id = %execution_id,
                    service_type = %service_type,
                    "Tracking started execution"
                );
                let execution = Execution::new(
                    execution_id.clone(),
                    service_type.clone(),
                    workflow.initial_step_id.clone(),
                    HashMap::new(),
                );
                self.install(execution, now);
                EventOutcome::Applied
            }
            Err(err) => {
                warn!(
                    execution_id = %execution_id,
                    service_type = %service_type,
                    error = %err,
                    "Workflow lookup failed for started execution; deferring state to poll"
                );
                self.state = TrackState::Pending {
                    expected: Some(execution_id.clone()),
                };
                EventOutcome::AdoptedPendingSync
            }
        }
    }

    /// Issue the authoritative poll and reconcile with local state
    pub async fn poll_now(&mut self) -> Result<(), CoreError> {
        let result = self.engine.get_active_execution().await?;
        self.apply_poll_result(result);
        Ok(())
    }

    /// Reconcile a poll result with local state; the poll result wins
    pub fn apply_poll_result(&mut self, result: Option<Execution>) {
        let now = Utc::now();
        self.expire_completed_at(now);

        match result {
            Some(mut server) => {
                let state = std::mem::replace(&mut self.state, TrackState::Untracked);
                match state {
                    TrackState::Tracking(local) if local.id == server.id => {
                        if server.current_step_id != local.current_step_id {
                            debug!(
                                push_step = %local.current_step_id,
                                poll_step = %server.current_step_id,
                                "Poll disagrees with push-derived step; poll wins"
                            );
                        }
                        // Completed steps never shrink, whatever the poll says.
                        server
                            .completed_steps
                            .extend(local.completed_steps.iter().cloned());
                        self.install(server, now);
                    }
                    _ => {
                        info!(execution_id = %server.id, "Poll discovered execution");
                        self.install(server, now);
                    }
                }
            }
            None => match &self.state {
                TrackState::Tracking(execution) => {
                    info!(
                        execution_id = %execution.id,
                        "Poll found no active execution; clearing local tracking"
                    );
                    self.state = TrackState::Untracked;
                }
                TrackState::Completed { .. } => {
                    self.state = TrackState::Untracked;
                }
                _ => {}
            },
        }
    }

    /// The tracked execution, if any (active or within its grace period)
    pub fn active_execution(&self) -> Option<&Execution> {
        match &self.state {
            TrackState::Tracking(execution) => Some(execution),
            TrackState::Completed { execution, .. } => Some(execution),
            _ => None,
        }
    }

    /// The tracked execution's current step, if any
    pub fn current_step(&self) -> Option<&StepId> {
        self.active_execution().map(|execution| &execution.current_step_id)
    }

    /// Coarse tracking phase
    pub fn phase(&self) -> TrackPhase {
        match &self.state {
            TrackState::Untracked => TrackPhase::Untracked,
            TrackState::Pending { .. } => TrackPhase::Pending,
            TrackState::Tracking(_) => TrackPhase::Tracking,
            TrackState::Completed { .. } => TrackPhase::Completed,
        }
    }

    fn install(&mut self, execution: Execution, now: DateTime<Utc>) {
        if execution.is_active() {
            self.state = TrackState::Tracking(execution);
        } else {
            self.state = TrackState::Completed {
                execution,
                since: now,
            };
        }
    }

    fn expire_completed_at(&mut self, now: DateTime<Utc>) {
        if let TrackState::Completed { execution, since } = &self.state {
            if now.signed_duration_since(*since) >= self.grace {
                info!(
                    execution_id = %execution.id,
                    "Completed execution grace period elapsed; dropping"
                );
                self.state = TrackState::Untracked;
            }
        }
    }
}

fn apply_to_tracked(
    execution: &mut Execution,
    event: &ChannelEvent,
    now: DateTime<Utc>,
) -> EventOutcome {
    match event {
        ChannelEvent::StepChanged { step_id, .. } => {
            if execution.advance_to(step_id.clone(), now) {
                debug!(execution_id = %execution.id, step = %step_id, "Step changed");
                EventOutcome::Applied
            } else {
                debug!(execution_id = %execution.id, step = %step_id, "Duplicate step change");
                EventOutcome::Dropped(DropReason::Duplicate)
            }
        }
        ChannelEvent::DecisionRequired {
            step_id,
            prompt,
            options,
            timeout,
            video_url,
            title,
            ..
        } => EventOutcome::Prompt(PromptRequest::Decision(DecisionRequest {
            execution_id: execution.id.clone(),
            step_id: step_id.clone(),
            prompt: prompt.clone(),
            options: options.clone(),
            timeout_secs: *timeout,
            media: video_url.clone().map(|url| MediaRef {
                url,
                title: title.clone(),
            }),
        })),
        ChannelEvent::SelectionRequired {
            step_id,
            prompt,
            options,
            timeout,
            ..
        } => EventOutcome::Prompt(PromptRequest::Selection(SelectionRequest {
            execution_id: execution.id.clone(),
            step_id: step_id.clone(),
            prompt: prompt.clone(),
            options: options.clone(),
            timeout_secs: *timeout,
        })),
        ChannelEvent::ExecutionCompleted { .. } => {
            execution.complete(now);
            EventOutcome::Applied
        }
        _ => EventOutcome::Dropped(DropReason::NotExecutionScoped),
    }
}
