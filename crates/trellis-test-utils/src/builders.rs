//! Data builders for tests
//!
//! A representative "movie" workflow and builders for channel event
//! envelopes and chat messages.

use chrono::Utc;

use trellis_core::{
    ChannelEvent, ChatMessage, ChatRole, ConversationId, DecisionOption, EventEnvelope,
    ExecutionId, SelectionOption, ServiceType, Step, StepId, StepType, Transition, Workflow,
    WorkflowId,
};

/// The movie-night workflow: browse, pick, pay, watch, with an error stage
pub fn movie_workflow() -> Workflow {
    Workflow {
        id: WorkflowId("wf-movie".to_string()),
        service_type: ServiceType("movie".to_string()),
        steps: vec![
            step("browse", "Browse catalog", StepType::Input, &[("pick", None)]),
            step("pick", "Pick a movie", StepType::Decision, &[("pay", None)]),
            step(
                "pay",
                "Payment",
                StepType::Process,
                &[("watch", None), ("error", Some("failure"))],
            ),
            step("watch", "Watch", StepType::Output, &[]),
            step("error", "Something went wrong", StepType::Error, &[]),
        ],
        initial_step_id: StepId("browse".to_string()),
    }
}

fn step(id: &str, name: &str, step_type: StepType, transitions: &[(&str, Option<&str>)]) -> Step {
    Step {
        id: StepId(id.to_string()),
        name: name.to_string(),
        step_type,
        component: None,
        transitions: transitions
            .iter()
            .map(|&(to, when)| Transition {
                to: StepId(to.to_string()),
                when: when.map(str::to_string),
            })
            .collect(),
    }
}

/// Wrap an event in an envelope stamped with the current time
pub fn envelope(event: ChannelEvent) -> EventEnvelope {
    EventEnvelope {
        event,
        timestamp: Utc::now(),
    }
}

/// An `execution_started` envelope
pub fn execution_started(execution_id: &str, service_type: &str) -> EventEnvelope {
    envelope(ChannelEvent::ExecutionStarted {
        execution_id: ExecutionId(execution_id.to_string()),
        service_type: ServiceType(service_type.to_string()),
    })
}

/// A `step_changed` envelope, optionally without an execution id
pub fn step_changed(execution_id: Option<&str>, step_id: &str) -> EventEnvelope {
    envelope(ChannelEvent::StepChanged {
        execution_id: execution_id.map(|id| ExecutionId(id.to_string())),
        step_id: StepId(step_id.to_string()),
    })
}

/// A `decision_required` envelope with two options and a media reference
pub fn decision_required(execution_id: &str, step_id: &str, prompt: &str) -> EventEnvelope {
    envelope(ChannelEvent::DecisionRequired {
        execution_id: Some(ExecutionId(execution_id.to_string())),
        step_id: StepId(step_id.to_string()),
        prompt: prompt.to_string(),
        options: vec![
            DecisionOption {
                value: "m1".to_string(),
                label: "First".to_string(),
            },
            DecisionOption {
                value: "m2".to_string(),
                label: "Second".to_string(),
            },
        ],
        timeout: 60,
        video_url: Some("https://cdn.example/t.mp4".to_string()),
        title: Some("Trailer".to_string()),
    })
}

/// A `selection_required` envelope with one candidate
pub fn selection_required(execution_id: &str, step_id: &str, prompt: &str) -> EventEnvelope {
    envelope(ChannelEvent::SelectionRequired {
        execution_id: Some(ExecutionId(execution_id.to_string())),
        step_id: StepId(step_id.to_string()),
        prompt: prompt.to_string(),
        options: vec![SelectionOption {
            label: "Candidate".to_string(),
            payload: serde_json::json!({"rank": 1}),
        }],
        timeout: 30,
    })
}

/// An `execution_completed` envelope
pub fn execution_completed(execution_id: &str) -> EventEnvelope {
    envelope(ChannelEvent::ExecutionCompleted {
        execution_id: Some(ExecutionId(execution_id.to_string())),
    })
}

/// A `chat_message` envelope
pub fn chat_message_event(
    conversation: &ConversationId,
    id: Option<&str>,
    content: &str,
) -> EventEnvelope {
    envelope(ChannelEvent::ChatMessage {
        conversation_id: conversation.clone(),
        id: id.map(str::to_string),
        role: ChatRole::Assistant,
        content: content.to_string(),
        timestamp: Utc::now(),
        author_email: "assistant@trellis.local".to_string(),
    })
}

/// A chat message ready for the reconciler or the history store
pub fn chat_message(conversation: &ConversationId, id: Option<&str>, content: &str) -> ChatMessage {
    ChatMessage {
        id: id.map(str::to_string),
        conversation_id: conversation.clone(),
        role: ChatRole::Assistant,
        content: content.to_string(),
        timestamp: Utc::now(),
        author: "assistant@trellis.local".to_string(),
        media: None,
    }
}
