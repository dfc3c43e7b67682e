//! Server dependencies for run orchestration (using traits for testability)
//!
//! This module provides the central dependency container used by the run
//! controller. All external services use trait abstractions so tests can swap
//! in mocks.

use std::sync::Arc;

use super::{BaseActorRegistry, BaseExecutionService, RunEventPublisher};
use crate::domains::runs::activities::reconcile::ReconcilerConfig;
use crate::domains::runs::store::RunStore;

/// Dependencies shared by every run operation
#[derive(Clone)]
pub struct ServerDeps {
    pub run_store: Arc<dyn RunStore>,
    /// External scraping worker
    pub execution: Arc<dyn BaseExecutionService>,
    pub actors: Arc<dyn BaseActorRegistry>,
    /// Live update fan-out
    pub events: Arc<dyn RunEventPublisher>,
    pub reconciler: ReconcilerConfig,
}

impl ServerDeps {
    pub fn new(
        run_store: Arc<dyn RunStore>,
        execution: Arc<dyn BaseExecutionService>,
        actors: Arc<dyn BaseActorRegistry>,
        events: Arc<dyn RunEventPublisher>,
        reconciler: ReconcilerConfig,
    ) -> Self {
        Self {
            run_store,
            execution,
            actors,
            events,
            reconciler,
        }
    }
}
