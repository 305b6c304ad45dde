use crate::domain::workflow::StepId;
use crate::ServiceType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Value object: Execution ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionId(pub String);

impl std::fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    /// Execution is running on the server
    Active,

    /// Execution has finished
    Completed,
}

/// One visited step in an execution's history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    /// The step that was left
    pub step_id: StepId,

    /// When the step was left
    pub timestamp: DateTime<Utc>,

    /// Data captured at that step
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Aggregate: the client's mirror of one running workflow execution
///
/// The true state lives on the server; this mirror is mutated only by the
/// synchronizer. `completed_steps` grows monotonically and history stays
/// one step behind or equal to the current step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    /// Unique identifier
    pub id: ExecutionId,

    /// Service type of the workflow this execution runs
    pub service_type: ServiceType,

    /// The step the execution is currently on
    pub current_step_id: StepId,

    /// Steps already passed through, monotonically growing
    pub completed_steps: HashSet<StepId>,

    /// Ordered record of steps left, with timestamps
    pub history: Vec<HistoryEntry>,

    /// Mutable execution context
    pub context: HashMap<String, serde_json::Value>,

    /// Current status
    pub status: ExecutionStatus,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last updated timestamp
    pub updated_at: DateTime<Utc>,
}

impl Execution {
    /// Create a new execution mirror positioned on its initial step
    pub fn new(
        id: ExecutionId,
        service_type: ServiceType,
        initial_step: StepId,
        context: HashMap<String, serde_json::Value>,
    ) -> Self {
        let now = Utc::now();

        Self {
            id,
            service_type,
            current_step_id: initial_step,
            completed_steps: HashSet::new(),
            history: Vec::new(),
            context,
            status: ExecutionStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    /// Advance to a new step, recording the step being left
    ///
    /// Returns `false` when the destination equals the current step (a
    /// duplicate delivery), leaving all state untouched. Otherwise the
    /// previous current step is appended to `completed_steps` and to
    /// `history` unless it was already completed, and the current step
    /// becomes `step_id`.
    pub fn advance_to(&mut self, step_id: StepId, at: DateTime<Utc>) -> bool {
        if self.current_step_id == step_id {
            return false;
        }

        let previous = std::mem::replace(&mut self.current_step_id, step_id);
        if !self.completed_steps.contains(&previous) {
            self.completed_steps.insert(previous.clone());
            self.history.push(HistoryEntry {
                step_id: previous,
                timestamp: at,
                data: serde_json::Value::Null,
            });
        }
        self.updated_at = at;

        true
    }

    /// Mark the execution completed
    pub fn complete(&mut self, at: DateTime<Utc>) {
        self.status = ExecutionStatus::Completed;
        self.updated_at = at;
    }

    /// Check if a step has been passed through
    pub fn is_step_completed(&self, step_id: &StepId) -> bool {
        self.completed_steps.contains(step_id)
    }

    /// Whether the execution is still running
    pub fn is_active(&self) -> bool {
        self.status == ExecutionStatus::Active
    }
}
