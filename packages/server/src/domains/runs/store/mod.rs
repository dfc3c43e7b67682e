//! Run persistence.
//!
//! The store is the single source of truth for run status. Every status write
//! goes through [`RunStore::apply_transition`], a compare-and-set against the
//! persisted status, so a terminal transition can land at most once no matter
//! how many tasks race for it.

mod memory;
mod postgres;

pub use memory::MemoryRunStore;
pub use postgres::PostgresRunStore;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};

use super::models::{Run, RunStatus, RunTransition};
use crate::common::{OwnerId, RunId};

/// Result of merging one enrichment record into a run's output.
#[derive(Debug, Clone, PartialEq)]
pub enum MergeOutcome {
    Merged(Run),
    /// The run exists but no output item carries the record's identifier.
    ItemNotFound,
    RunNotFound,
    /// Merges only apply to succeeded runs.
    InvalidState(RunStatus),
}

#[async_trait]
pub trait RunStore: Send + Sync {
    async fn insert(&self, run: &Run) -> Result<()>;

    async fn find(&self, run_id: RunId) -> Result<Option<Run>>;

    /// Find a run only if it belongs to `owner_id`.
    async fn find_for_owner(&self, run_id: RunId, owner_id: OwnerId) -> Result<Option<Run>> {
        Ok(self
            .find(run_id)
            .await?
            .filter(|run| run.is_owned_by(owner_id)))
    }

    /// Newest first.
    async fn list_for_owner(&self, owner_id: OwnerId, limit: i64) -> Result<Vec<Run>>;

    /// Apply `transition` if the persisted status allows it.
    ///
    /// Returns the updated run, or `None` when the run is missing or the
    /// transition was refused. Refusal writes nothing.
    async fn apply_transition(&self, run_id: RunId, transition: &RunTransition)
        -> Result<Option<Run>>;

    /// Merge an enrichment record into the matching output item while holding
    /// the run's row lock.
    async fn merge_output_item(
        &self,
        run_id: RunId,
        record: &Map<String, Value>,
    ) -> Result<MergeOutcome>;

    /// Runs still `queued` or `running`, oldest first.
    async fn list_unfinished(&self) -> Result<Vec<Run>>;

    async fn ping(&self) -> Result<()>;
}
