//! End-to-end execution tracking scenarios against in-memory collaborators.

use std::collections::HashMap;
use std::sync::Arc;

use trellis_client::{ClientConfig, ClientError, TrellisClient};
use trellis_core::{CoreError, ExecutionId, ServiceType, StepId};
use trellis_test_utils::{
    execution_completed, execution_started, init_test_logging, movie_workflow, step_changed,
    InMemoryHistoryStore, InMemoryWorkflowEngine,
};

fn client() -> (Arc<InMemoryWorkflowEngine>, TrellisClient) {
    init_test_logging();
    let engine = Arc::new(InMemoryWorkflowEngine::new());
    engine.register_workflow(movie_workflow());
    let history = Arc::new(InMemoryHistoryStore::new());
    let client = TrellisClient::new(ClientConfig::default(), engine.clone(), history);
    (engine, client)
}

#[tokio::test]
async fn start_execution_positions_on_initial_step() {
    let (_engine, mut client) = client();

    let mut context = HashMap::new();
    context.insert("q".to_string(), serde_json::json!("tonight"));
    let execution = client
        .start_execution(&ServiceType("movie".to_string()), context)
        .await
        .unwrap();

    assert_eq!(execution.current_step_id, movie_workflow().initial_step_id);
    assert_eq!(client.current_step().unwrap().0, "browse");
    assert_eq!(
        execution.context.get("q").unwrap(),
        &serde_json::json!("tonight")
    );
}

#[tokio::test]
async fn step_sequence_completes_previous_steps() {
    let (_engine, mut client) = client();
    let execution = client
        .start_execution(&ServiceType("movie".to_string()), HashMap::new())
        .await
        .unwrap();
    let id = execution.id.0.as_str();

    client
        .handle_event(step_changed(Some(id), "pay"))
        .await
        .unwrap();
    client
        .handle_event(step_changed(Some(id), "watch"))
        .await
        .unwrap();

    let tracked = client.active_execution().unwrap();
    assert!(tracked.is_step_completed(&StepId("pay".to_string())));
    assert_eq!(tracked.current_step_id.0, "watch");
}

#[tokio::test]
async fn duplicate_step_events_are_idempotent() {
    let (_engine, mut client) = client();
    let execution = client
        .start_execution(&ServiceType("movie".to_string()), HashMap::new())
        .await
        .unwrap();
    let id = execution.id.0.as_str();

    client
        .handle_event(step_changed(Some(id), "pay"))
        .await
        .unwrap();
    let after_first = client.active_execution().unwrap().clone();

    client
        .handle_event(step_changed(Some(id), "pay"))
        .await
        .unwrap();
    let after_second = client.active_execution().unwrap();

    assert_eq!(after_first.current_step_id, after_second.current_step_id);
    assert_eq!(after_first.completed_steps, after_second.completed_steps);
    assert_eq!(after_first.history.len(), after_second.history.len());
}

#[tokio::test]
async fn events_for_other_executions_are_ignored_until_reset() {
    let (_engine, mut client) = client();
    let execution = client
        .start_execution(&ServiceType("movie".to_string()), HashMap::new())
        .await
        .unwrap();

    client
        .handle_event(step_changed(Some("someone-else"), "watch"))
        .await
        .unwrap();

    let tracked = client.active_execution().unwrap();
    assert_eq!(tracked.id, execution.id);
    assert_eq!(tracked.current_step_id.0, "browse");
}

#[tokio::test]
async fn completed_steps_never_shrink() {
    let (_engine, mut client) = client();
    let execution = client
        .start_execution(&ServiceType("movie".to_string()), HashMap::new())
        .await
        .unwrap();
    let id = execution.id.0.clone();

    let events = vec![
        step_changed(Some(&id), "pay"),
        step_changed(Some(&id), "pay"),
        step_changed(Some("intruder"), "watch"),
        step_changed(Some(&id), "browse"),
        step_changed(None, "watch"),
        step_changed(Some(&id), "pay"),
    ];

    let mut previous = 0;
    for event in events {
        client.handle_event(event).await.unwrap();
        let completed = client.active_execution().unwrap().completed_steps.len();
        assert!(completed >= previous, "completed steps shrank");
        previous = completed;
    }
}

#[tokio::test]
async fn poll_clears_execution_the_server_no_longer_has() {
    let (engine, mut client) = client();
    client
        .start_execution(&ServiceType("movie".to_string()), HashMap::new())
        .await
        .unwrap();
    assert!(client.active_execution().is_some());

    // The server finished and forgot the execution; push never told us.
    engine.set_active_execution(None);
    client.poll_now().await.unwrap();

    assert!(client.active_execution().is_none());
}

#[tokio::test]
async fn reconnect_forces_resynchronization() {
    let (engine, mut client) = client();
    let execution = client
        .start_execution(&ServiceType("movie".to_string()), HashMap::new())
        .await
        .unwrap();

    // Push deliveries were lost while disconnected; the server moved on.
    let mut server_state = execution.clone();
    server_state.advance_to(StepId("pay".to_string()), chrono::Utc::now());
    server_state.advance_to(StepId("watch".to_string()), chrono::Utc::now());
    engine.set_active_execution(Some(server_state));

    client.on_reconnected().await.unwrap();

    let tracked = client.active_execution().unwrap();
    assert_eq!(tracked.current_step_id.0, "watch");
    assert!(tracked.is_step_completed(&StepId("pay".to_string())));
}

#[tokio::test]
async fn completion_event_marks_execution_completed() {
    let (_engine, mut client) = client();
    let execution = client
        .start_execution(&ServiceType("movie".to_string()), HashMap::new())
        .await
        .unwrap();

    client
        .handle_event(execution_completed(&execution.id.0))
        .await
        .unwrap();

    // Retained within the grace period, but no longer active
    let tracked = client.active_execution().unwrap();
    assert!(!tracked.is_active());
}

#[tokio::test]
async fn decision_for_non_decision_step_is_rejected_before_network() {
    let (engine, mut client) = client();
    let execution = client
        .start_execution(&ServiceType("movie".to_string()), HashMap::new())
        .await
        .unwrap();

    let result = client
        .submit_decision(&execution.id, "m1", Some(StepId("pay".to_string())))
        .await;

    match result {
        Err(ClientError::Core(CoreError::Validation(msg))) => {
            assert!(msg.contains("pay"));
        }
        other => panic!("Expected validation error, got {:?}", other.err()),
    }
    // Rejected before any network call
    assert!(engine.submitted_decisions().is_empty());
}

#[tokio::test]
async fn decision_for_decision_step_is_submitted() {
    let (engine, mut client) = client();
    let execution = client
        .start_execution(&ServiceType("movie".to_string()), HashMap::new())
        .await
        .unwrap();

    client
        .submit_decision(&execution.id, "m1", Some(StepId("pick".to_string())))
        .await
        .unwrap();

    let submitted = engine.submitted_decisions();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].0, execution.id);
    assert_eq!(submitted[0].1, "m1");
    assert_eq!(submitted[0].2, Some(StepId("pick".to_string())));
}

#[tokio::test]
async fn submitting_for_unknown_execution_fails_locally() {
    let (engine, mut client) = client();
    client
        .start_execution(&ServiceType("movie".to_string()), HashMap::new())
        .await
        .unwrap();

    let result = client
        .submit_decision(&ExecutionId("ghost".to_string()), "m1", None)
        .await;

    assert!(matches!(result, Err(ClientError::NotFound(_))));
    assert!(engine.submitted_decisions().is_empty());
}

#[tokio::test]
async fn malformed_channel_message_is_rejected_at_the_boundary() {
    let (_engine, mut client) = client();

    let result = client.handle_channel_message("{\"type\": \"mystery\"}").await;

    assert!(matches!(
        result,
        Err(ClientError::Core(CoreError::MalformedEvent(_)))
    ));

    // A well-formed message still applies afterwards
    let raw = serde_json::to_string(&execution_started("exec-1", "movie")).unwrap();
    client.handle_channel_message(&raw).await.unwrap();
    assert_eq!(client.active_execution().unwrap().id.0, "exec-1");
}
