use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::{PgPool, Postgres, Transaction};

use super::{MergeOutcome, RunStore};
use crate::common::{OwnerId, RunId};
use crate::domains::runs::models::{Run, RunStatus, RunTransition};
use crate::domains::runs::result_count::merge_enriched_item;

/// Postgres-backed run store.
///
/// Read-modify-write operations lock the row with `SELECT ... FOR UPDATE`
/// inside a transaction, decide in Rust, then write back.
#[derive(Clone)]
pub struct PostgresRunStore {
    pool: PgPool,
}

impl PostgresRunStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn lock_run(tx: &mut Transaction<'_, Postgres>, run_id: RunId) -> Result<Option<Run>> {
        sqlx::query_as::<_, Run>("SELECT * FROM runs WHERE run_id = $1 FOR UPDATE")
            .bind(run_id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(Into::into)
    }

    async fn write_back(tx: &mut Transaction<'_, Postgres>, run: &Run) -> Result<()> {
        sqlx::query(
            "UPDATE runs
             SET status = $2, output = $3, result_count = $4, error = $5,
                 finished_at = $6, duration = $7
             WHERE run_id = $1",
        )
        .bind(run.run_id)
        .bind(run.status)
        .bind(&run.output)
        .bind(run.result_count)
        .bind(&run.error)
        .bind(run.finished_at)
        .bind(run.duration)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl RunStore for PostgresRunStore {
    async fn insert(&self, run: &Run) -> Result<()> {
        sqlx::query(
            "INSERT INTO runs (
                run_id, actor_id, actor_name, owner_id, input, status, output,
                result_count, error, started_at, finished_at, duration, scheduled
             ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        )
        .bind(run.run_id)
        .bind(&run.actor_id)
        .bind(&run.actor_name)
        .bind(run.owner_id)
        .bind(&run.input)
        .bind(run.status)
        .bind(&run.output)
        .bind(run.result_count)
        .bind(&run.error)
        .bind(run.started_at)
        .bind(run.finished_at)
        .bind(run.duration)
        .bind(run.scheduled)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find(&self, run_id: RunId) -> Result<Option<Run>> {
        sqlx::query_as::<_, Run>("SELECT * FROM runs WHERE run_id = $1")
            .bind(run_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Into::into)
    }

    async fn find_for_owner(&self, run_id: RunId, owner_id: OwnerId) -> Result<Option<Run>> {
        sqlx::query_as::<_, Run>("SELECT * FROM runs WHERE run_id = $1 AND owner_id = $2")
            .bind(run_id)
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Into::into)
    }

    async fn list_for_owner(&self, owner_id: OwnerId, limit: i64) -> Result<Vec<Run>> {
        sqlx::query_as::<_, Run>(
            "SELECT * FROM runs WHERE owner_id = $1
             ORDER BY started_at DESC, run_id DESC
             LIMIT $2",
        )
        .bind(owner_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Into::into)
    }

    async fn apply_transition(
        &self,
        run_id: RunId,
        transition: &RunTransition,
    ) -> Result<Option<Run>> {
        let mut tx = self.pool.begin().await?;

        let Some(mut run) = Self::lock_run(&mut tx, run_id).await? else {
            tx.rollback().await?;
            return Ok(None);
        };
        if !run.apply(transition) {
            tx.rollback().await?;
            return Ok(None);
        }

        Self::write_back(&mut tx, &run).await?;
        tx.commit().await?;
        Ok(Some(run))
    }

    async fn merge_output_item(
        &self,
        run_id: RunId,
        record: &Map<String, Value>,
    ) -> Result<MergeOutcome> {
        let mut tx = self.pool.begin().await?;

        let Some(mut run) = Self::lock_run(&mut tx, run_id).await? else {
            tx.rollback().await?;
            return Ok(MergeOutcome::RunNotFound);
        };
        if run.status != RunStatus::Succeeded {
            tx.rollback().await?;
            return Ok(MergeOutcome::InvalidState(run.status));
        }

        let merged = run
            .output
            .as_mut()
            .is_some_and(|output| merge_enriched_item(output, record));
        if !merged {
            tx.rollback().await?;
            return Ok(MergeOutcome::ItemNotFound);
        }

        sqlx::query("UPDATE runs SET output = $2 WHERE run_id = $1")
            .bind(run.run_id)
            .bind(&run.output)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(MergeOutcome::Merged(run))
    }

    async fn list_unfinished(&self) -> Result<Vec<Run>> {
        sqlx::query_as::<_, Run>(
            "SELECT * FROM runs WHERE status IN ('queued', 'running') ORDER BY started_at ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Into::into)
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
