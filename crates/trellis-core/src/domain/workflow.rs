use crate::{CoreError, ServiceType};
use serde::{Deserialize, Serialize};

/// Value object: Workflow ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowId(pub String);

/// Value object: Step ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StepId(pub String);

impl std::fmt::Display for StepId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The kind of work a step represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepType {
    /// Collects input from the user
    Input,

    /// Server-side processing
    Process,

    /// Produces a user-visible result
    Output,

    /// Blocks on an explicit user decision
    Decision,

    /// Error handling step
    Error,
}

/// An outgoing transition from a step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transition {
    /// Destination step
    pub to: StepId,

    /// Optional condition label selecting this transition
    pub when: Option<String>,
}

/// A named stage of a workflow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    /// ID of the step, unique within its workflow
    pub id: StepId,

    /// Human-readable name
    pub name: String,

    /// The kind of work this step represents
    pub step_type: StepType,

    /// Optional UI component bound to this step
    pub component: Option<String>,

    /// Outgoing transitions
    pub transitions: Vec<Transition>,
}

/// A static workflow definition, loaded once per service type
///
/// Immutable after load; the catalog validates a definition before
/// handing it out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    /// ID of the workflow
    pub id: WorkflowId,

    /// Service type this workflow is defined for
    pub service_type: ServiceType,

    /// Ordered steps
    pub steps: Vec<Step>,

    /// The step an execution starts on
    pub initial_step_id: StepId,
}

impl Workflow {
    /// Validate the workflow definition
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.steps.is_empty() {
            return Err(CoreError::Validation(
                "Workflow must have at least one step".to_string(),
            ));
        }

        // Check for ID uniqueness
        let mut step_ids = std::collections::HashSet::new();
        for step in &self.steps {
            if !step_ids.insert(&step.id) {
                return Err(CoreError::Validation(format!(
                    "Duplicate step ID: {}",
                    step.id
                )));
            }
        }

        // The initial step must exist
        if !step_ids.contains(&self.initial_step_id) {
            return Err(CoreError::Validation(format!(
                "Initial step not defined: {}",
                self.initial_step_id
            )));
        }

        // Check for valid transition targets
        for step in &self.steps {
            for transition in &step.transitions {
                if !step_ids.contains(&transition.to) {
                    return Err(CoreError::Validation(format!(
                        "Step {} transitions to non-existent step: {}",
                        step.id, transition.to
                    )));
                }
            }
        }

        Ok(())
    }

    /// Look up a step by ID
    pub fn step(&self, id: &StepId) -> Option<&Step> {
        self.steps.iter().find(|step| &step.id == id)
    }

    /// The step an execution starts on
    pub fn initial_step(&self) -> Option<&Step> {
        self.step(&self.initial_step_id)
    }
}
