use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};

use super::{MergeOutcome, RunStore};
use crate::common::{OwnerId, RunId};
use crate::domains::runs::models::{Run, RunStatus, RunTransition};
use crate::domains::runs::result_count::merge_enriched_item;

/// In-process store for tests and database-less development.
///
/// One write lock covers each read-modify-write, which gives the same
/// per-document atomicity as a row lock.
#[derive(Default)]
pub struct MemoryRunStore {
    runs: RwLock<HashMap<RunId, Run>>,
}

impl MemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.runs.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RunStore for MemoryRunStore {
    async fn insert(&self, run: &Run) -> Result<()> {
        let mut runs = self.runs.write().unwrap_or_else(|e| e.into_inner());
        if runs.contains_key(&run.run_id) {
            anyhow::bail!("run {} already exists", run.run_id);
        }
        runs.insert(run.run_id, run.clone());
        Ok(())
    }

    async fn find(&self, run_id: RunId) -> Result<Option<Run>> {
        let runs = self.runs.read().unwrap_or_else(|e| e.into_inner());
        Ok(runs.get(&run_id).cloned())
    }

    async fn list_for_owner(&self, owner_id: OwnerId, limit: i64) -> Result<Vec<Run>> {
        let runs = self.runs.read().unwrap_or_else(|e| e.into_inner());
        let mut owned: Vec<Run> = runs
            .values()
            .filter(|run| run.is_owned_by(owner_id))
            .cloned()
            .collect();
        owned.sort_by(|a, b| {
            b.started_at
                .cmp(&a.started_at)
                .then_with(|| b.run_id.cmp(&a.run_id))
        });
        owned.truncate(limit.max(0) as usize);
        Ok(owned)
    }

    async fn apply_transition(
        &self,
        run_id: RunId,
        transition: &RunTransition,
    ) -> Result<Option<Run>> {
        let mut runs = self.runs.write().unwrap_or_else(|e| e.into_inner());
        let Some(run) = runs.get_mut(&run_id) else {
            return Ok(None);
        };
        Ok(run.apply(transition).then(|| run.clone()))
    }

    async fn merge_output_item(
        &self,
        run_id: RunId,
        record: &Map<String, Value>,
    ) -> Result<MergeOutcome> {
        let mut runs = self.runs.write().unwrap_or_else(|e| e.into_inner());
        let Some(run) = runs.get_mut(&run_id) else {
            return Ok(MergeOutcome::RunNotFound);
        };
        if run.status != RunStatus::Succeeded {
            return Ok(MergeOutcome::InvalidState(run.status));
        }

        let merged = run
            .output
            .as_mut()
            .is_some_and(|output| merge_enriched_item(output, record));

        Ok(if merged {
            MergeOutcome::Merged(run.clone())
        } else {
            MergeOutcome::ItemNotFound
        })
    }

    async fn list_unfinished(&self) -> Result<Vec<Run>> {
        let runs = self.runs.read().unwrap_or_else(|e| e.into_inner());
        let mut unfinished: Vec<Run> = runs
            .values()
            .filter(|run| !run.status.is_terminal())
            .cloned()
            .collect();
        unfinished.sort_by_key(|run| run.started_at);
        Ok(unfinished)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
