// ScraperClient adapter (implements BaseExecutionService trait)

use anyhow::Result;
use async_trait::async_trait;
use scraper_client::{ScraperClient, TaskState};
use serde_json::{json, Value};
use std::sync::Arc;

use super::{BaseExecutionService, ExecutionStatus};
use crate::common::RunId;

/// Wrapper around ScraperClient that implements BaseExecutionService trait
pub struct ScraperServiceAdapter(pub Arc<ScraperClient>);

impl ScraperServiceAdapter {
    pub fn new(client: Arc<ScraperClient>) -> Self {
        Self(client)
    }
}

#[async_trait]
impl BaseExecutionService for ScraperServiceAdapter {
    async fn submit_job(&self, actor_id: &str, input: &Value, run_id: RunId) -> Result<()> {
        self.0
            .submit_scrape(actor_id, input, &run_id.to_string())
            .await
            .map(|_| ())
            .map_err(|e| anyhow::anyhow!("{}", e))
    }

    async fn poll_status(&self, run_id: RunId) -> Result<ExecutionStatus> {
        let task = self
            .0
            .task_status(&run_id.to_string())
            .await
            .map_err(|e| anyhow::anyhow!("{}", e))?;

        Ok(match task.state() {
            TaskState::Queued => ExecutionStatus::Queued,
            TaskState::Running => {
                ExecutionStatus::Running(task.message.map(|message| json!({ "message": message })))
            }
            TaskState::Success => ExecutionStatus::Success(task.result.unwrap_or(Value::Null)),
            TaskState::Failure => ExecutionStatus::Failure(task.error.or(task.message)),
        })
    }

    async fn cancel_job(&self, run_id: RunId) -> Result<()> {
        self.0
            .cancel_task(&run_id.to_string())
            .await
            .map_err(|e| anyhow::anyhow!("{}", e))
    }

    async fn submit_enrichment(&self, run_id: RunId, items: &[Value]) -> Result<()> {
        self.0
            .submit_enrichment(&run_id.to_string(), items)
            .await
            .map_err(|e| anyhow::anyhow!("{}", e))
    }
}
