// Trait definitions for dependency injection
//
// These are INFRASTRUCTURE traits only - no business logic.
// Run lifecycle rules live in domains::runs and use these traits.
//
// Naming convention: Base* for trait names (e.g., BaseExecutionService)

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::common::RunId;
use crate::domains::actors::ActorDefinition;

// =============================================================================
// Execution Service Trait (Infrastructure - external scraping worker)
// =============================================================================

/// Normalized view of a worker task's state.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionStatus {
    Queued,
    /// Optional progress detail reported by the worker
    Running(Option<Value>),
    /// Raw task result, possibly wrapped in the worker's envelope.
    Success(Value),
    Failure(Option<String>),
}

#[async_trait]
pub trait BaseExecutionService: Send + Sync {
    /// Submit a job. Acceptance only; the result arrives through polling.
    async fn submit_job(&self, actor_id: &str, input: &Value, run_id: RunId) -> Result<()>;

    async fn poll_status(&self, run_id: RunId) -> Result<ExecutionStatus>;

    /// Best-effort; callers log and ignore failures.
    async fn cancel_job(&self, run_id: RunId) -> Result<()>;

    /// Best-effort; callers log and ignore failures.
    async fn submit_enrichment(&self, run_id: RunId, items: &[Value]) -> Result<()>;
}

// =============================================================================
// Actor Registry Trait (Infrastructure - read-only catalog)
// =============================================================================

#[async_trait]
pub trait BaseActorRegistry: Send + Sync {
    async fn find_actor(&self, actor_id: &str) -> Result<Option<ActorDefinition>>;
}
