use crate::domain::execution::ExecutionId;
use crate::domain::workflow::StepId;
use crate::MediaRef;
use serde::{Deserialize, Serialize};

/// One choosable option of a decision prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionOption {
    /// The value submitted when this option is chosen
    pub value: String,

    /// Display label
    pub label: String,
}

/// One candidate result of a selection prompt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionOption {
    /// Display label
    pub label: String,

    /// Opaque payload forwarded on submit
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// A hard, blocking prompt requiring exactly one explicit choice
///
/// Consumed by exactly one submit or by timeout; the timeout is advisory
/// to the UI only, the server's own timeout handling is authoritative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionRequest {
    /// Execution this decision gates
    pub execution_id: ExecutionId,

    /// Step the decision belongs to
    pub step_id: StepId,

    /// Prompt text shown to the user
    pub prompt: String,

    /// Ordered options
    pub options: Vec<DecisionOption>,

    /// Advisory rendering timeout in seconds
    pub timeout_secs: u64,

    /// Optional media shown alongside the prompt
    pub media: Option<MediaRef>,
}

/// A soft, non-blocking prompt offering candidate results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionRequest {
    /// Execution this selection belongs to
    pub execution_id: ExecutionId,

    /// Step the selection belongs to
    pub step_id: StepId,

    /// Prompt text shown to the user
    pub prompt: String,

    /// Candidate results
    pub options: Vec<SelectionOption>,

    /// Advisory rendering timeout in seconds
    pub timeout_secs: u64,
}

/// Either kind of pending prompt
///
/// A decision always supersedes a selection for the same execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptRequest {
    /// A blocking decision
    Decision(DecisionRequest),

    /// A non-blocking selection
    Selection(SelectionRequest),
}

impl PromptRequest {
    /// Execution this prompt belongs to
    pub fn execution_id(&self) -> &ExecutionId {
        match self {
            PromptRequest::Decision(request) => &request.execution_id,
            PromptRequest::Selection(request) => &request.execution_id,
        }
    }

    /// Step this prompt belongs to
    pub fn step_id(&self) -> &StepId {
        match self {
            PromptRequest::Decision(request) => &request.step_id,
            PromptRequest::Selection(request) => &request.step_id,
        }
    }

    /// Whether this is a blocking decision
    pub fn is_decision(&self) -> bool {
        matches!(self, PromptRequest::Decision(_))
    }

    /// Whether this prompt replaces `pending` when both are in flight
    ///
    /// A decision supersedes a pending selection for the same execution; a
    /// selection never displaces a pending decision.
    pub fn supersedes(&self, pending: &PromptRequest) -> bool {
        if self.execution_id() != pending.execution_id() {
            return true;
        }
        match (self, pending) {
            (PromptRequest::Selection(_), PromptRequest::Decision(_)) => false,
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decision(execution: &str) -> PromptRequest {
        PromptRequest::Decision(DecisionRequest {
            execution_id: ExecutionId(execution.to_string()),
            step_id: StepId("pick".to_string()),
            prompt: "Which one?".to_string(),
            options: vec![DecisionOption {
                value: "a".to_string(),
                label: "A".to_string(),
            }],
            timeout_secs: 60,
            media: None,
        })
    }

    fn selection(execution: &str) -> PromptRequest {
        PromptRequest::Selection(SelectionRequest {
            execution_id: ExecutionId(execution.to_string()),
            step_id: StepId("browse".to_string()),
            prompt: "Maybe one of these?".to_string(),
            options: vec![SelectionOption {
                label: "B".to_string(),
                payload: serde_json::json!({"rank": 1}),
            }],
            timeout_secs: 30,
        })
    }

    #[test]
    fn test_decision_supersedes_selection() {
        assert!(decision("exec-1").supersedes(&selection("exec-1")));
    }

    #[test]
    fn test_selection_never_displaces_decision() {
        assert!(!selection("exec-1").supersedes(&decision("exec-1")));
    }

    #[test]
    fn test_same_kind_replaces() {
        assert!(decision("exec-1").supersedes(&decision("exec-1")));
        assert!(selection("exec-1").supersedes(&selection("exec-1")));
    }

    #[test]
    fn test_other_execution_always_replaces() {
        assert!(selection("exec-2").supersedes(&decision("exec-1")));
    }
}
