//! Synchronizer tests (relocated from the `synchronizer` module so they link a
//! single instance of `trellis-client` alongside the `trellis-test-utils`
//! dev-dependency).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use trellis_client::catalog::WorkflowCatalog;
use trellis_client::synchronizer::{
    DropReason, EventOutcome, ExecutionSynchronizer, ResetHint, TrackPhase,
};
use trellis_core::{Execution, ExecutionId, PromptRequest, ServiceType, StepId};
use trellis_test_utils::{
    decision_required, execution_completed, execution_started, movie_workflow, step_changed,
    InMemoryWorkflowEngine,
};

fn synchronizer() -> (Arc<InMemoryWorkflowEngine>, ExecutionSynchronizer) {
    let engine = Arc::new(InMemoryWorkflowEngine::new());
    engine.register_workflow(movie_workflow());
    let catalog = Arc::new(WorkflowCatalog::new(engine.clone(), 4));
    let synchronizer =
        ExecutionSynchronizer::new(engine.clone(), catalog, Duration::from_secs(30));
    (engine, synchronizer)
}

#[tokio::test]
async fn test_start_event_adopts_execution_on_initial_step() {
    let (_engine, mut sync) = synchronizer();

    let outcome = sync.on_event(&execution_started("exec-1", "movie")).await;

    assert_eq!(outcome, EventOutcome::Applied);
    assert_eq!(sync.phase(), TrackPhase::Tracking);
    let execution = sync.active_execution().unwrap();
    assert_eq!(execution.id.0, "exec-1");
    assert_eq!(execution.current_step_id.0, "browse");
}

#[tokio::test]
async fn test_step_changed_is_idempotent() {
    let (_engine, mut sync) = synchronizer();
    sync.on_event(&execution_started("exec-1", "movie")).await;

    let event = step_changed(Some("exec-1"), "pay");
    assert_eq!(sync.on_event(&event).await, EventOutcome::Applied);
    let after_first = sync.active_execution().unwrap().clone();

    assert_eq!(
        sync.on_event(&event).await,
        EventOutcome::Dropped(DropReason::Duplicate)
    );
    let after_second = sync.active_execution().unwrap();

    assert_eq!(after_first.current_step_id, after_second.current_step_id);
    assert_eq!(after_first.completed_steps, after_second.completed_steps);
    assert_eq!(after_first.history, after_second.history);
}

#[tokio::test]
async fn test_step_sequence_builds_monotonic_history() {
    let (_engine, mut sync) = synchronizer();
    sync.on_event(&execution_started("exec-1", "movie")).await;

    sync.on_event(&step_changed(Some("exec-1"), "pay")).await;
    sync.on_event(&step_changed(Some("exec-1"), "watch")).await;

    let execution = sync.active_execution().unwrap();
    assert_eq!(execution.current_step_id.0, "watch");
    assert!(execution.is_step_completed(&StepId("browse".to_string())));
    assert!(execution.is_step_completed(&StepId("pay".to_string())));
    assert_eq!(execution.completed_steps.len(), 2);
}

#[tokio::test]
async fn test_events_for_other_executions_are_dropped() {
    let (_engine, mut sync) = synchronizer();
    sync.on_event(&execution_started("exec-1", "movie")).await;
    sync.on_event(&step_changed(Some("exec-1"), "pay")).await;

    let outcome = sync.on_event(&step_changed(Some("exec-2"), "watch")).await;

    assert_eq!(outcome, EventOutcome::Dropped(DropReason::StaleExecution));
    let execution = sync.active_execution().unwrap();
    assert_eq!(execution.id.0, "exec-1");
    assert_eq!(execution.current_step_id.0, "pay");
}

#[tokio::test]
async fn test_event_without_id_applies_to_single_tracked_execution() {
    let (_engine, mut sync) = synchronizer();
    sync.on_event(&execution_started("exec-1", "movie")).await;

    let outcome = sync.on_event(&step_changed(None, "pay")).await;

    assert_eq!(outcome, EventOutcome::Applied);
    assert_eq!(sync.current_step().unwrap().0, "pay");
}

#[tokio::test]
async fn test_event_without_id_while_untracked_is_ambiguous() {
    let (_engine, mut sync) = synchronizer();

    let outcome = sync.on_event(&step_changed(None, "pay")).await;

    assert_eq!(outcome, EventOutcome::Dropped(DropReason::Ambiguous));
    assert_eq!(sync.phase(), TrackPhase::Untracked);
}

#[tokio::test]
async fn test_pending_reset_drops_until_start() {
    let (_engine, mut sync) = synchronizer();
    sync.reset(ResetHint::Pending);

    assert_eq!(
        sync.on_event(&step_changed(Some("exec-1"), "pay")).await,
        EventOutcome::Dropped(DropReason::PendingReset)
    );

    assert_eq!(
        sync.on_event(&execution_started("exec-1", "movie")).await,
        EventOutcome::Applied
    );
    assert_eq!(sync.phase(), TrackPhase::Tracking);
}

#[tokio::test]
async fn test_expected_hint_filters_starts() {
    let (_engine, mut sync) = synchronizer();
    sync.reset(ResetHint::Expect(ExecutionId("exec-2".to_string())));

    assert_eq!(
        sync.on_event(&execution_started("exec-1", "movie")).await,
        EventOutcome::Dropped(DropReason::StaleExecution)
    );
    assert_eq!(sync.phase(), TrackPhase::Pending);

    assert_eq!(
        sync.on_event(&execution_started("exec-2", "movie")).await,
        EventOutcome::Applied
    );
    assert_eq!(sync.active_execution().unwrap().id.0, "exec-2");
}

#[tokio::test]
async fn test_untracked_adopts_bare_execution_id_and_requests_sync() {
    let (_engine, mut sync) = synchronizer();

    let outcome = sync.on_event(&step_changed(Some("exec-1"), "pay")).await;

    assert_eq!(outcome, EventOutcome::AdoptedPendingSync);
    assert_eq!(sync.phase(), TrackPhase::Pending);

    // Scoping now holds: other executions are rejected
    assert_eq!(
        sync.on_event(&step_changed(Some("exec-2"), "pay")).await,
        EventOutcome::Dropped(DropReason::StaleExecution)
    );
}

#[tokio::test]
async fn test_decision_required_emits_prompt_with_media() {
    let (_engine, mut sync) = synchronizer();
    sync.on_event(&execution_started("exec-1", "movie")).await;

    let outcome = sync
        .on_event(&decision_required("exec-1", "pick", "Which movie?"))
        .await;

    match outcome {
        EventOutcome::Prompt(PromptRequest::Decision(request)) => {
            assert_eq!(request.execution_id.0, "exec-1");
            assert_eq!(request.step_id.0, "pick");
            assert_eq!(request.media.as_ref().unwrap().url, "https://cdn.example/t.mp4");
        }
        other => panic!("Expected decision prompt, got {:?}", other),
    }
}

#[tokio::test]
async fn test_completion_retains_execution_within_grace() {
    let (_engine, mut sync) = synchronizer();
    sync.on_event(&execution_started("exec-1", "movie")).await;

    assert_eq!(
        sync.on_event(&execution_completed("exec-1")).await,
        EventOutcome::Applied
    );
    assert_eq!(sync.phase(), TrackPhase::Completed);

    // Trailing late events are absorbed without error
    assert_eq!(
        sync.on_event(&step_changed(Some("exec-1"), "watch")).await,
        EventOutcome::Dropped(DropReason::Duplicate)
    );
}

#[tokio::test]
async fn test_grace_expiry_clears_completed_execution() {
    let (_engine, mut sync) = synchronizer();
    sync.on_event(&execution_started("exec-1", "movie")).await;

    let completed_at = Utc::now();
    sync.on_event_at(&execution_completed("exec-1"), completed_at)
        .await;

    let late = completed_at + chrono::Duration::seconds(31);
    sync.on_event_at(&step_changed(Some("exec-2"), "pay"), late)
        .await;

    // Grace elapsed before the event was considered, so the completed
    // execution was dropped and the new id adopted.
    assert_eq!(sync.phase(), TrackPhase::Pending);
}

#[tokio::test]
async fn test_new_start_supersedes_completed_execution() {
    let (_engine, mut sync) = synchronizer();
    sync.on_event(&execution_started("exec-1", "movie")).await;
    sync.on_event(&execution_completed("exec-1")).await;

    assert_eq!(
        sync.on_event(&execution_started("exec-2", "movie")).await,
        EventOutcome::Applied
    );
    assert_eq!(sync.active_execution().unwrap().id.0, "exec-2");
    assert_eq!(sync.phase(), TrackPhase::Tracking);
}

#[tokio::test]
async fn test_poll_clears_tracking_when_server_has_none() {
    let (engine, mut sync) = synchronizer();
    sync.on_event(&execution_started("exec-1", "movie")).await;
    assert_eq!(sync.phase(), TrackPhase::Tracking);

    engine.set_active_execution(None);
    sync.poll_now().await.unwrap();

    assert_eq!(sync.phase(), TrackPhase::Untracked);
    assert!(sync.active_execution().is_none());
}

#[tokio::test]
async fn test_poll_discovers_execution() {
    let (engine, mut sync) = synchronizer();

    let server_execution = Execution::new(
        ExecutionId("exec-9".to_string()),
        ServiceType("movie".to_string()),
        StepId("pay".to_string()),
        HashMap::new(),
    );
    engine.set_active_execution(Some(server_execution));

    sync.poll_now().await.unwrap();

    assert_eq!(sync.active_execution().unwrap().id.0, "exec-9");
    assert_eq!(sync.current_step().unwrap().0, "pay");
}

#[tokio::test]
async fn test_poll_wins_over_push_derived_step() {
    let (engine, mut sync) = synchronizer();
    sync.on_event(&execution_started("exec-1", "movie")).await;
    sync.on_event(&step_changed(Some("exec-1"), "pay")).await;

    // Server state is ahead of the push-derived view and, oddly, does
    // not list the first step as completed.
    let mut server_execution = Execution::new(
        ExecutionId("exec-1".to_string()),
        ServiceType("movie".to_string()),
        StepId("watch".to_string()),
        HashMap::new(),
    );
    server_execution
        .completed_steps
        .insert(StepId("pay".to_string()));
    engine.set_active_execution(Some(server_execution));

    sync.poll_now().await.unwrap();

    let execution = sync.active_execution().unwrap();
    assert_eq!(execution.current_step_id.0, "watch");
    assert!(execution.is_step_completed(&StepId("pay".to_string())));
    // Locally known completed steps are never lost
    assert!(execution.is_step_completed(&StepId("browse".to_string())));
}

#[tokio::test]
async fn test_poll_resolves_adopted_execution_id() {
    let (engine, mut sync) = synchronizer();
    sync.on_event(&step_changed(Some("exec-1"), "pay")).await;
    assert_eq!(sync.phase(), TrackPhase::Pending);

    let server_execution = Execution::new(
        ExecutionId("exec-1".to_string()),
        ServiceType("movie".to_string()),
        StepId("pay".to_string()),
        HashMap::new(),
    );
    engine.set_active_execution(Some(server_execution));

    sync.poll_now().await.unwrap();

    assert_eq!(sync.phase(), TrackPhase::Tracking);
    assert_eq!(sync.current_step().unwrap().0, "pay");
}
