//! Integration tests for status reconciliation.
//!
//! Tests the polling loop end to end:
//! - Worker states map onto run transitions exactly once
//! - Result payload shapes are unwrapped and counted
//! - Transient poll errors are retried, the attempt ceiling is fatal
//! - Abort and completion racing for the same run: whoever persists first wins

mod common;

use std::time::Duration;

use crate::common::{eventually, TestHarness};
use runs_core::domains::runs::activities::{
    reconcile_run, ReconcileOutcome, TIMEOUT_ERROR_PREFIX,
};
use runs_core::domains::runs::store::RunStore;
use runs_core::domains::runs::{Run, RunError, RunEventKind, RunStatus};
use runs_core::kernel::{ExecutionStatus, MockExecutionService, TestDependencies};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

// =============================================================================
// Test Helpers
// =============================================================================

fn harness_with(execution: MockExecutionService) -> TestHarness {
    TestHarness::with_deps(TestDependencies::new().mock_execution(execution))
}

fn queued_run(ctx: &TestHarness) -> Run {
    Run::builder()
        .actor_id("amazon")
        .actor_name("Amazon Product Scraper")
        .owner_id(ctx.owner_id)
        .input(json!({}))
        .build()
}

fn success(result: Value) -> ExecutionStatus {
    ExecutionStatus::Success(result)
}

// =============================================================================
// Transitions
// =============================================================================

#[tokio::test]
async fn queued_running_succeeded() {
    let output = json!({"results": [{"url": "https://a"}, {"url": "https://b"}]});
    let ctx = harness_with(
        MockExecutionService::new()
            .with_poll(ExecutionStatus::Queued)
            .with_poll(ExecutionStatus::Running(None))
            .with_poll(ExecutionStatus::Running(None))
            .with_poll(ExecutionStatus::Running(None))
            .with_poll(success(output.clone())),
    );

    let run = ctx.create_run(ctx.owner_id, "amazon", json!({})).await;
    let finished = ctx.wait_for_status(run.run_id, RunStatus::Succeeded).await;

    assert_eq!(finished.output, Some(output));
    assert_eq!(finished.result_count, 2);
    assert!(finished.error.is_none());
    assert!(finished.finished_at.is_some());
    assert!(finished.duration.is_some_and(|ms| ms >= 0));

    ctx.wait_for_reconciler_exit(run.run_id).await;
    // Repeated RUNNING observations publish one status change
    assert_eq!(
        ctx.events().kinds_for(run.run_id),
        vec![
            RunEventKind::Created,
            RunEventKind::Status,
            RunEventKind::Completed
        ]
    );
    assert_eq!(ctx.execution().poll_count_for(run.run_id), 5);
}

#[tokio::test]
async fn success_envelope_is_unwrapped() {
    let ctx = harness_with(MockExecutionService::new().with_poll(success(json!({
        "status": "success",
        "data": {"results": [{"placeId": "p1"}, {"placeId": "p2"}, {"placeId": "p3"}]}
    }))));

    let run = ctx.create_run(ctx.owner_id, "amazon", json!({})).await;
    let finished = ctx.wait_for_status(run.run_id, RunStatus::Succeeded).await;

    assert_eq!(
        finished.output,
        Some(json!({"results": [{"placeId": "p1"}, {"placeId": "p2"}, {"placeId": "p3"}]}))
    );
    assert_eq!(finished.result_count, 3);
}

#[tokio::test]
async fn explicit_result_count_is_used_without_items() {
    let ctx = harness_with(
        MockExecutionService::new().with_poll(success(json!({"resultCount": 42, "file": "s3://x"}))),
    );

    let run = ctx.create_run(ctx.owner_id, "website", json!({})).await;
    let finished = ctx.wait_for_status(run.run_id, RunStatus::Succeeded).await;

    assert_eq!(finished.result_count, 42);
}

#[tokio::test]
async fn error_envelope_fails_the_run() {
    let ctx = harness_with(MockExecutionService::new().with_poll(success(json!({
        "status": "error",
        "error": "quota exceeded"
    }))));

    let run = ctx.create_run(ctx.owner_id, "amazon", json!({})).await;
    let failed = ctx.wait_for_status(run.run_id, RunStatus::Failed).await;

    assert_eq!(failed.error.as_deref(), Some("quota exceeded"));
    assert!(failed.output.is_none());
    ctx.wait_for_reconciler_exit(run.run_id).await;
    assert_eq!(
        ctx.events().kinds_for(run.run_id),
        vec![RunEventKind::Created, RunEventKind::Failed]
    );
}

#[tokio::test]
async fn worker_failure_keeps_reason() {
    let ctx = harness_with(
        MockExecutionService::new()
            .with_poll(ExecutionStatus::Failure(Some("browser crashed".to_string()))),
    );

    let run = ctx.create_run(ctx.owner_id, "amazon", json!({})).await;
    let failed = ctx.wait_for_status(run.run_id, RunStatus::Failed).await;

    assert_eq!(failed.error.as_deref(), Some("browser crashed"));
}

#[tokio::test]
async fn worker_failure_without_reason_gets_default_error() {
    let ctx = harness_with(MockExecutionService::new().with_poll(ExecutionStatus::Failure(None)));

    let run = ctx.create_run(ctx.owner_id, "amazon", json!({})).await;
    let failed = ctx.wait_for_status(run.run_id, RunStatus::Failed).await;

    assert_eq!(failed.error.as_deref(), Some("execution failed"));
}

#[tokio::test]
async fn transient_poll_errors_are_retried() {
    let ctx = harness_with(
        MockExecutionService::new()
            .with_poll_error("timeout")
            .with_poll_error("502 bad gateway")
            .with_poll(success(json!([]))),
    );

    let run = ctx.create_run(ctx.owner_id, "amazon", json!({})).await;
    let finished = ctx.wait_for_status(run.run_id, RunStatus::Succeeded).await;

    assert_eq!(finished.result_count, 0);
    assert_eq!(ctx.execution().poll_count_for(run.run_id), 3);
}

#[tokio::test]
async fn progress_is_published_when_it_changes() {
    let page_one = json!({"message": "page 1"});
    let page_two = json!({"message": "page 2"});
    let ctx = harness_with(
        MockExecutionService::new()
            .with_poll(ExecutionStatus::Running(Some(page_one.clone())))
            .with_poll(ExecutionStatus::Running(Some(page_one.clone())))
            .with_poll(ExecutionStatus::Running(Some(page_two.clone())))
            .with_poll(success(json!([]))),
    );

    let run = ctx.create_run(ctx.owner_id, "amazon", json!({})).await;
    ctx.wait_for_status(run.run_id, RunStatus::Succeeded).await;
    ctx.wait_for_reconciler_exit(run.run_id).await;

    assert_eq!(
        ctx.events().kinds_for(run.run_id),
        vec![
            RunEventKind::Created,
            RunEventKind::Status,
            RunEventKind::Progress,
            RunEventKind::Progress,
            RunEventKind::Completed
        ]
    );

    let progress: Vec<Value> = ctx
        .events()
        .events_for(run.run_id)
        .into_iter()
        .filter(|e| e.kind == RunEventKind::Progress)
        .filter_map(|e| e.progress)
        .collect();
    assert_eq!(progress, vec![page_one, page_two]);
}

// =============================================================================
// Timeout
// =============================================================================

#[tokio::test]
async fn attempt_ceiling_fails_the_run_and_stops_polling() {
    let ctx = TestHarness::with_deps(
        TestDependencies::new().with_reconciler(Duration::from_millis(1), 3),
    );

    let run = ctx.create_run(ctx.owner_id, "amazon", json!({})).await;
    let failed = ctx.wait_for_status(run.run_id, RunStatus::Failed).await;

    let error = failed.error.unwrap();
    assert!(error.starts_with(TIMEOUT_ERROR_PREFIX), "error was {error}");
    assert!(error.contains("3 attempts"));

    ctx.wait_for_reconciler_exit(run.run_id).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(ctx.execution().poll_count_for(run.run_id), 3);
    assert_eq!(
        ctx.events().kinds_for(run.run_id),
        vec![RunEventKind::Created, RunEventKind::Failed]
    );
}

// =============================================================================
// Abort vs completion
// =============================================================================

#[tokio::test]
async fn abort_before_completion_wins() {
    let ctx = TestHarness::with_deps(
        TestDependencies::new()
            .with_reconciler(Duration::from_millis(1), 240)
            .mock_execution(MockExecutionService::new().with_default_status(success(json!([1, 2])))),
    );
    let run = queued_run(&ctx);
    ctx.store().insert(&run).await.unwrap();

    ctx.controller.abort_run(run.run_id, ctx.owner_id).await.unwrap();

    // A reconciler that starts late sees the terminal run and writes nothing
    let outcome = reconcile_run(&ctx.controller, run.run_id, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome, ReconcileOutcome::AlreadyTerminal(RunStatus::Aborted));

    // A late success report is refused by the compare-and-set
    let late = ctx
        .controller
        .mark_succeeded(run.run_id, json!([1, 2]))
        .await
        .unwrap();
    assert!(late.is_none());

    let stored = ctx.find_run(run.run_id).await;
    assert_eq!(stored.status, RunStatus::Aborted);
    assert!(stored.output.is_none());
    assert_eq!(ctx.events().count_for(run.run_id, RunEventKind::Completed), 0);
    assert_eq!(ctx.execution().poll_count_for(run.run_id), 0);
}

#[tokio::test]
async fn completion_before_abort_wins() {
    let ctx = harness_with(MockExecutionService::new().with_poll(success(json!([{"url": "a"}]))));

    let run = ctx.create_run(ctx.owner_id, "amazon", json!({})).await;
    ctx.wait_for_status(run.run_id, RunStatus::Succeeded).await;

    let result = ctx.controller.abort_run(run.run_id, ctx.owner_id).await;

    assert!(matches!(
        result,
        Err(RunError::InvalidState {
            status: RunStatus::Succeeded
        })
    ));
    assert_eq!(ctx.find_run(run.run_id).await.status, RunStatus::Succeeded);
    assert_eq!(ctx.events().count_for(run.run_id, RunEventKind::Update), 0);
    assert_eq!(ctx.events().count_for(run.run_id, RunEventKind::Status), 0);
}

#[tokio::test]
async fn abort_during_in_flight_poll_wins() {
    let execution = MockExecutionService::new().with_default_status(success(json!([1, 2, 3])));
    let gate = execution.gate_polls();
    let ctx = harness_with(execution);

    let run = ctx.create_run(ctx.owner_id, "amazon", json!({})).await;

    // The reconciler is now blocked inside its first poll
    eventually(|| async { (ctx.execution().poll_count_for(run.run_id) >= 1).then_some(()) }).await;

    let aborted = ctx
        .controller
        .abort_run(run.run_id, ctx.owner_id)
        .await
        .unwrap();
    assert_eq!(aborted.status, RunStatus::Aborted);

    // Let the poll answer SUCCESS after the abort was persisted
    gate.notify_one();
    ctx.wait_for_reconciler_exit(run.run_id).await;

    let stored = ctx.find_run(run.run_id).await;
    assert_eq!(stored.status, RunStatus::Aborted);
    assert!(stored.output.is_none());
    assert_eq!(stored.result_count, 0);
    assert_eq!(
        ctx.events().kinds_for(run.run_id),
        vec![
            RunEventKind::Created,
            RunEventKind::Status,
            RunEventKind::Update
        ]
    );
}

#[tokio::test]
async fn progress_after_abort_is_not_published() {
    let execution = MockExecutionService::new()
        .with_poll(ExecutionStatus::Running(Some(json!({"message": "page 1"}))))
        .with_default_status(ExecutionStatus::Running(Some(json!({"message": "page 2"}))));
    let gate = execution.gate_polls();
    let ctx = harness_with(execution);

    let run = ctx.create_run(ctx.owner_id, "amazon", json!({})).await;

    gate.notify_one();
    ctx.wait_for_status(run.run_id, RunStatus::Running).await;

    // Second poll is in flight when the abort lands
    eventually(|| async { (ctx.execution().poll_count_for(run.run_id) >= 2).then_some(()) }).await;
    ctx.controller
        .abort_run(run.run_id, ctx.owner_id)
        .await
        .unwrap();

    gate.notify_one();
    ctx.wait_for_reconciler_exit(run.run_id).await;

    assert_eq!(ctx.find_run(run.run_id).await.status, RunStatus::Aborted);
    assert_eq!(
        ctx.events().kinds_for(run.run_id),
        vec![
            RunEventKind::Created,
            RunEventKind::Status,
            RunEventKind::Progress,
            RunEventKind::Status,
            RunEventKind::Update
        ]
    );
    assert!(ctx
        .events()
        .events_for(run.run_id)
        .iter()
        .filter(|e| e.kind == RunEventKind::Progress)
        .all(|e| e.status == RunStatus::Running));
}

// =============================================================================
// Loop exits
// =============================================================================

#[tokio::test]
async fn cancelled_token_stops_the_loop() {
    let ctx = TestHarness::new();
    let run = queued_run(&ctx);
    ctx.store().insert(&run).await.unwrap();

    let token = CancellationToken::new();
    token.cancel();
    let outcome = reconcile_run(&ctx.controller, run.run_id, token).await.unwrap();

    assert_eq!(outcome, ReconcileOutcome::Cancelled);
    assert_eq!(ctx.execution().poll_count(), 0);
    assert_eq!(ctx.find_run(run.run_id).await.status, RunStatus::Queued);
}

#[tokio::test]
async fn missing_run_ends_the_loop() {
    let ctx = TestHarness::new();
    let run = queued_run(&ctx);

    let outcome = reconcile_run(&ctx.controller, run.run_id, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome, ReconcileOutcome::Vanished);
    assert_eq!(ctx.execution().poll_count(), 0);
}

#[tokio::test]
async fn one_reconciler_per_run() {
    let ctx = TestHarness::with_deps(
        TestDependencies::new().with_reconciler(Duration::from_secs(3600), 1),
    );
    let run = ctx.create_run(ctx.owner_id, "amazon", json!({})).await;

    assert!(!ctx.controller.spawn_reconciler(run.run_id));
    assert_eq!(ctx.controller.reconcilers().active_count(), 1);
}

// =============================================================================
// Enrichment dispatch
// =============================================================================

#[tokio::test]
async fn enriching_actor_submits_items_after_success() {
    let items = json!([{"placeId": "p1", "name": "Cafe"}, {"placeId": "p2", "name": "Bakery"}]);
    let ctx = harness_with(
        MockExecutionService::new().with_poll(success(json!({"results": items.clone()}))),
    );

    let run = ctx.create_run(ctx.owner_id, "google-maps", json!({"searchTerms": "cafe"})).await;
    ctx.wait_for_status(run.run_id, RunStatus::Succeeded).await;

    let (enriched_run, submitted) =
        eventually(|| async { ctx.execution().enrichments().into_iter().next() }).await;
    assert_eq!(enriched_run, run.run_id);
    assert_eq!(Value::Array(submitted), items);
}

#[tokio::test]
async fn non_enriching_actor_submits_nothing() {
    let ctx = harness_with(
        MockExecutionService::new().with_poll(success(json!([{"url": "https://a"}]))),
    );

    let run = ctx.create_run(ctx.owner_id, "amazon", json!({})).await;
    ctx.wait_for_status(run.run_id, RunStatus::Succeeded).await;
    ctx.wait_for_reconciler_exit(run.run_id).await;

    assert!(ctx.execution().enrichments().is_empty());
}

#[tokio::test]
async fn enrichment_dispatch_failure_leaves_run_succeeded() {
    let ctx = harness_with(
        MockExecutionService::new()
            .with_poll(success(json!([{"placeId": "p1"}])))
            .failing_enrichment("worker busy"),
    );

    let run = ctx.create_run(ctx.owner_id, "google-maps", json!({})).await;
    ctx.wait_for_status(run.run_id, RunStatus::Succeeded).await;
    eventually(|| async { (!ctx.execution().enrichments().is_empty()).then_some(()) }).await;

    let stored = ctx.find_run(run.run_id).await;
    assert_eq!(stored.status, RunStatus::Succeeded);
    assert!(stored.error.is_none());
}
