//! Per-run status reconciliation.
//!
//! The execution service only answers polls, so every in-flight run gets a
//! loop that asks for its task state and turns each observation into a run
//! transition.
//!
//! ```text
//! loop (max_attempts):
//!     sleep(poll_interval)            <- cancellation wakes this and exits
//!     re-read run                     <- terminal? stop, nothing written
//!     poll_status
//!         transport error -> count the attempt, keep going
//!         QUEUED          -> nothing
//!         RUNNING         -> queued => running
//!         SUCCESS         -> succeeded (or failed for an error envelope)
//!         FAILURE         -> failed
//! after max_attempts: failed with "reconciliation timed out after N attempts"
//! ```
//!
//! Every transition goes through the controller's compare-and-set. If abort
//! (or anything else) finished the run first, the transition is refused and
//! the loop stops without publishing.

use std::time::Duration;

use anyhow::Result;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::common::RunId;
use crate::domains::runs::controller::RunController;
use crate::domains::runs::models::{Run, RunStatus};
use crate::domains::runs::result_count::{
    canonical_output, enrichable_items, envelope_error, is_error_envelope,
};
use crate::kernel::detached::spawn_detached;
use crate::kernel::ExecutionStatus;

/// Greppable prefix of the error stored on runs that never finished.
pub const TIMEOUT_ERROR_PREFIX: &str = "reconciliation timed out";

/// Error stored when the worker reports failure without a reason.
pub const DEFAULT_FAILURE_ERROR: &str = "execution failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcilerConfig {
    pub poll_interval: Duration,
    pub max_attempts: u32,
}

impl Default for ReconcilerConfig {
    /// 240 polls at 5 seconds: the worker's 20 minute task limit.
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            max_attempts: 240,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Succeeded,
    Failed,
    TimedOut,
    /// Something else finished the run first.
    AlreadyTerminal(RunStatus),
    Cancelled,
    /// The run disappeared from the store.
    Vanished,
}

pub async fn reconcile_run(
    controller: &RunController,
    run_id: RunId,
    cancel: CancellationToken,
) -> Result<ReconcileOutcome> {
    let deps = controller.deps();
    let config = deps.reconciler;
    let mut last_progress: Option<Value> = None;

    for attempt in 1..=config.max_attempts {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(run_id = %run_id, attempt, "Reconciler cancelled");
                return Ok(ReconcileOutcome::Cancelled);
            }
            _ = tokio::time::sleep(config.poll_interval) => {}
        }

        let run = match deps.run_store.find(run_id).await {
            Ok(Some(run)) => run,
            Ok(None) => return Ok(ReconcileOutcome::Vanished),
            Err(e) => {
                warn!(run_id = %run_id, attempt, error = %e, "Failed to re-read run, retrying");
                continue;
            }
        };
        if run.status.is_terminal() {
            debug!(run_id = %run_id, status = %run.status, "Run already finished, stopping");
            return Ok(ReconcileOutcome::AlreadyTerminal(run.status));
        }

        let status = match deps.execution.poll_status(run_id).await {
            Ok(status) => status,
            Err(e) => {
                warn!(run_id = %run_id, attempt, error = %e, "Status poll failed, retrying");
                continue;
            }
        };

        if let Some(outcome) = observe_status(controller, &run, status, &mut last_progress).await? {
            return Ok(outcome);
        }
    }

    let error = format!(
        "{} after {} attempts",
        TIMEOUT_ERROR_PREFIX, config.max_attempts
    );
    match controller.mark_failed(run_id, error).await? {
        Some(_) => {
            warn!(run_id = %run_id, attempts = config.max_attempts, "Run timed out");
            Ok(ReconcileOutcome::TimedOut)
        }
        None => current_outcome(controller, run_id).await,
    }
}

/// Apply one poll observation. `Some` ends the loop.
async fn observe_status(
    controller: &RunController,
    run: &Run,
    status: ExecutionStatus,
    last_progress: &mut Option<Value>,
) -> Result<Option<ReconcileOutcome>> {
    let run_id = run.run_id;

    match status {
        ExecutionStatus::Queued => Ok(None),

        ExecutionStatus::Running(progress) => {
            if run.status == RunStatus::Queued {
                controller.mark_running(run_id).await?;
            }

            if let Some(progress) = progress {
                if last_progress.as_ref() != Some(&progress)
                    && controller.publish_progress(run_id, progress.clone()).await?
                {
                    *last_progress = Some(progress);
                }
            }
            Ok(None)
        }

        ExecutionStatus::Success(result) if is_error_envelope(&result) => {
            let error = envelope_error(&result).unwrap_or_else(|| DEFAULT_FAILURE_ERROR.to_string());
            fail(controller, run_id, error).await.map(Some)
        }

        ExecutionStatus::Success(result) => {
            let output = canonical_output(result);
            match controller.mark_succeeded(run_id, output).await? {
                Some(run) => {
                    info!(run_id = %run_id, result_count = run.result_count, "Run succeeded");
                    request_enrichment(controller, &run).await;
                    Ok(Some(ReconcileOutcome::Succeeded))
                }
                None => current_outcome(controller, run_id).await.map(Some),
            }
        }

        ExecutionStatus::Failure(error) => {
            let error = error.unwrap_or_else(|| DEFAULT_FAILURE_ERROR.to_string());
            fail(controller, run_id, error).await.map(Some)
        }
    }
}

async fn fail(controller: &RunController, run_id: RunId, error: String) -> Result<ReconcileOutcome> {
    match controller.mark_failed(run_id, error.as_str()).await? {
        Some(_) => {
            info!(run_id = %run_id, error = %error, "Run failed");
            Ok(ReconcileOutcome::Failed)
        }
        None => current_outcome(controller, run_id).await,
    }
}

/// Outcome after a refused transition: whatever state won.
async fn current_outcome(controller: &RunController, run_id: RunId) -> Result<ReconcileOutcome> {
    Ok(match controller.deps().run_store.find(run_id).await? {
        Some(run) => {
            debug!(run_id = %run_id, status = %run.status, "Transition lost to concurrent update");
            ReconcileOutcome::AlreadyTerminal(run.status)
        }
        None => ReconcileOutcome::Vanished,
    })
}

/// Hand the items of a successful run to the worker's enrichment pipeline,
/// when the actor has one. Failures are logged only.
async fn request_enrichment(controller: &RunController, run: &Run) {
    let deps = controller.deps();

    let actor = match deps.actors.find_actor(&run.actor_id).await {
        Ok(Some(actor)) => actor,
        Ok(None) => return,
        Err(e) => {
            warn!(run_id = %run.run_id, error = %e, "Actor lookup failed, skipping enrichment");
            return;
        }
    };
    if !actor.enrichment {
        return;
    }

    let items: Vec<Value> = run
        .output
        .as_ref()
        .and_then(enrichable_items)
        .cloned()
        .unwrap_or_default();
    if items.is_empty() {
        return;
    }

    let run_id = run.run_id;
    let execution = deps.execution.clone();
    debug!(run_id = %run_id, items = items.len(), "Requesting enrichment");
    spawn_detached("submit_enrichment", run_id, async move {
        execution.submit_enrichment(run_id, &items).await
    });
}
