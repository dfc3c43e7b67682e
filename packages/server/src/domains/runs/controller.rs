//! Run lifecycle controller.
//!
//! Owns every run state transition. Each transition is a compare-and-set in
//! the store followed by the matching event publishes, done while holding a
//! per-run lock so events for one run go out in the order their transitions
//! were persisted. There is no lock across runs.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use serde_json::{Map, Value};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, error, info};

use super::activities::{abort_run, bulk_abort, create_run, merge_enrichment, reconcile};
use super::activities::bulk_abort::BulkAbortResult;
use super::activities::create_run::CreateRunRequest;
use super::errors::{RunError, RunResult};
use super::events::RunEvent;
use super::models::{Run, RunTransition};
use super::result_count::count_results;
use super::store::MergeOutcome;
use crate::common::{OwnerId, RunId};
use crate::kernel::{ReconcilerPool, ServerDeps};

pub const DEFAULT_LIST_LIMIT: i64 = 20;
pub const MAX_LIST_LIMIT: i64 = 100;

type EventFactory = fn(&Run) -> RunEvent;

#[derive(Clone)]
pub struct RunController {
    deps: Arc<ServerDeps>,
    reconcilers: ReconcilerPool,
    locks: RunLocks,
}

impl RunController {
    pub fn new(deps: ServerDeps, reconcilers: ReconcilerPool) -> Self {
        Self {
            deps: Arc::new(deps),
            reconcilers,
            locks: RunLocks::default(),
        }
    }

    pub fn deps(&self) -> &ServerDeps {
        &self.deps
    }

    pub fn reconcilers(&self) -> &ReconcilerPool {
        &self.reconcilers
    }

    // =========================================================================
    // Operations
    // =========================================================================

    pub async fn create_run(&self, owner_id: OwnerId, request: CreateRunRequest) -> RunResult<Run> {
        create_run::create_run(owner_id, request, self).await
    }

    pub async fn abort_run(&self, run_id: RunId, owner_id: OwnerId) -> RunResult<Run> {
        abort_run::abort_run(run_id, owner_id, self).await
    }

    pub async fn bulk_abort(&self, run_ids: &[RunId], owner_id: OwnerId) -> BulkAbortResult {
        bulk_abort::bulk_abort(run_ids, owner_id, self).await
    }

    /// `Ok(None)` when no output item matches the record's identifier.
    pub async fn merge_enrichment(&self, run_id: RunId, record: Value) -> RunResult<Option<Run>> {
        merge_enrichment::merge_enrichment(run_id, record, self).await
    }

    pub async fn get_run(&self, run_id: RunId, owner_id: OwnerId) -> RunResult<Run> {
        self.deps
            .run_store
            .find_for_owner(run_id, owner_id)
            .await?
            .ok_or(RunError::NotFound("run"))
    }

    /// Newest first. `limit` is clamped to 1..=100 and defaults to 20.
    pub async fn list_runs(&self, owner_id: OwnerId, limit: Option<i64>) -> RunResult<Vec<Run>> {
        let limit = limit
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .clamp(1, MAX_LIST_LIMIT);
        Ok(self.deps.run_store.list_for_owner(owner_id, limit).await?)
    }

    /// Restart reconcilers for runs left unfinished by a previous process.
    pub async fn resume_reconcilers(&self) -> Result<usize> {
        let unfinished = self.deps.run_store.list_unfinished().await?;
        let mut resumed = 0;
        for run in &unfinished {
            if self.spawn_reconciler(run.run_id) {
                resumed += 1;
            }
        }
        if resumed > 0 {
            info!(resumed, "Resumed reconcilers for unfinished runs");
        }
        Ok(resumed)
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    pub async fn mark_running(&self, run_id: RunId) -> Result<Option<Run>> {
        self.transition(run_id, RunTransition::running(), &[RunEvent::status])
            .await
    }

    /// Computes the result count from `output` and publishes `run:completed`.
    pub async fn mark_succeeded(&self, run_id: RunId, output: Value) -> Result<Option<Run>> {
        let count = count_results(&output);
        self.transition(
            run_id,
            RunTransition::succeeded(output, count),
            &[RunEvent::completed],
        )
        .await
    }

    pub async fn mark_failed(&self, run_id: RunId, error: impl Into<String>) -> Result<Option<Run>> {
        self.transition(run_id, RunTransition::failed(error), &[RunEvent::failed])
            .await
    }

    pub async fn mark_aborted(&self, run_id: RunId, error: impl Into<String>) -> Result<Option<Run>> {
        self.transition(
            run_id,
            RunTransition::aborted(error),
            &[RunEvent::status, RunEvent::update],
        )
        .await
    }

    /// Publish `run:progress` from the persisted run. Nothing is published
    /// once the run is terminal or gone. Returns whether an event went out.
    pub async fn publish_progress(&self, run_id: RunId, progress: Value) -> Result<bool> {
        let _lock = self.locks.lock(run_id).await;

        match self.deps.run_store.find(run_id).await? {
            Some(run) if !run.status.is_terminal() => {
                self.deps.events.publish(RunEvent::progress(&run, progress));
                Ok(true)
            }
            _ => {
                debug!(run_id = %run_id, "Skipping progress for finished run");
                Ok(false)
            }
        }
    }

    /// Merge an enrichment record and publish `run:update` if anything changed.
    pub(crate) async fn apply_enrichment(
        &self,
        run_id: RunId,
        record: &Map<String, Value>,
    ) -> Result<MergeOutcome> {
        let _lock = self.locks.lock(run_id).await;

        let outcome = self
            .deps
            .run_store
            .merge_output_item(run_id, record)
            .await?;
        if let MergeOutcome::Merged(run) = &outcome {
            self.deps.events.publish(RunEvent::update(run));
        }
        Ok(outcome)
    }

    /// Compare-and-set, then publish. `None` means the transition was refused
    /// (or the run is gone) and nothing was published.
    async fn transition(
        &self,
        run_id: RunId,
        transition: RunTransition,
        events: &[EventFactory],
    ) -> Result<Option<Run>> {
        let _lock = self.locks.lock(run_id).await;

        let Some(run) = self
            .deps
            .run_store
            .apply_transition(run_id, &transition)
            .await?
        else {
            debug!(run_id = %run_id, to = %transition.to, "Transition refused");
            return Ok(None);
        };

        debug!(run_id = %run_id, status = %run.status, "Run transitioned");
        for event in events {
            self.deps.events.publish(event(&run));
        }
        Ok(Some(run))
    }

    // =========================================================================
    // Reconcilers
    // =========================================================================

    /// Start polling the execution service for `run_id`. Returns `false` if a
    /// reconciler is already running for it.
    pub fn spawn_reconciler(&self, run_id: RunId) -> bool {
        let controller = self.clone();
        self.reconcilers
            .spawn(run_id, move |token| async move {
                match reconcile::reconcile_run(&controller, run_id, token).await {
                    Ok(outcome) => {
                        debug!(run_id = %run_id, outcome = ?outcome, "Reconciler finished");
                    }
                    Err(e) => {
                        error!(run_id = %run_id, error = %e, "Reconciler failed");
                        let reason = format!("reconciliation error: {}", e);
                        if let Err(e) = controller.mark_failed(run_id, reason).await {
                            error!(run_id = %run_id, error = %e, "Failed to mark run as failed");
                        }
                    }
                }
            })
            .is_some()
    }
}

/// Per-run async locks, created on demand and dropped once unused.
#[derive(Clone, Default)]
struct RunLocks {
    locks: Arc<Mutex<HashMap<RunId, Arc<tokio::sync::Mutex<()>>>>>,
}

impl RunLocks {
    async fn lock(&self, run_id: RunId) -> RunLockGuard {
        let lock = self
            .locks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(run_id)
            .or_default()
            .clone();

        RunLockGuard {
            run_id,
            locks: self.locks.clone(),
            _guard: lock.lock_owned().await,
        }
    }
}

struct RunLockGuard {
    run_id: RunId,
    locks: Arc<Mutex<HashMap<RunId, Arc<tokio::sync::Mutex<()>>>>>,
    _guard: OwnedMutexGuard<()>,
}

impl Drop for RunLockGuard {
    fn drop(&mut self) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        // The map and this guard are the only holders: nobody is waiting.
        if locks
            .get(&self.run_id)
            .is_some_and(|lock| Arc::strong_count(lock) <= 2)
        {
            locks.remove(&self.run_id);
        }
    }
}
