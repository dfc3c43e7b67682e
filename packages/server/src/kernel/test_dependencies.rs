// TestDependencies - mock implementations for testing
//
// Provides mock services that can be injected into RunController for tests.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::Notify;

use super::{
    BaseExecutionService, EventBus, ExecutionStatus, ReconcilerPool, RunEventPublisher,
    ServerDeps,
};
use crate::common::RunId;
use crate::domains::actors::{ActorCatalog, ActorDefinition};
use crate::domains::runs::activities::reconcile::ReconcilerConfig;
use crate::domains::runs::events::{RunEvent, RunEventKind};
use crate::domains::runs::store::MemoryRunStore;
use crate::domains::runs::RunController;

// =============================================================================
// Mock Execution Service
// =============================================================================

/// Arguments captured from a submit call
#[derive(Debug, Clone)]
pub struct SubmitCall {
    pub actor_id: String,
    pub input: Value,
    pub run_id: RunId,
}

pub struct MockExecutionService {
    /// Scripted poll answers, consumed front to back
    polls: Mutex<VecDeque<std::result::Result<ExecutionStatus, String>>>,
    /// Answer once the script is exhausted
    default_status: Mutex<ExecutionStatus>,
    poll_gate: Mutex<Option<Arc<Notify>>>,
    submit_error: Mutex<Option<String>>,
    cancel_error: Mutex<Option<String>>,
    enrichment_error: Mutex<Option<String>>,
    submit_calls: Mutex<Vec<SubmitCall>>,
    poll_calls: Mutex<Vec<RunId>>,
    cancel_calls: Mutex<Vec<RunId>>,
    enrichment_calls: Mutex<Vec<(RunId, Vec<Value>)>>,
}

impl MockExecutionService {
    pub fn new() -> Self {
        Self {
            polls: Mutex::new(VecDeque::new()),
            default_status: Mutex::new(ExecutionStatus::Queued),
            poll_gate: Mutex::new(None),
            submit_error: Mutex::new(None),
            cancel_error: Mutex::new(None),
            enrichment_error: Mutex::new(None),
            submit_calls: Mutex::new(Vec::new()),
            poll_calls: Mutex::new(Vec::new()),
            cancel_calls: Mutex::new(Vec::new()),
            enrichment_calls: Mutex::new(Vec::new()),
        }
    }

    /// Queue a poll answer
    pub fn with_poll(self, status: ExecutionStatus) -> Self {
        self.push_poll(status);
        self
    }

    /// Queue a transport error for one poll
    pub fn with_poll_error(self, message: &str) -> Self {
        self.polls
            .lock()
            .unwrap()
            .push_back(Err(message.to_string()));
        self
    }

    pub fn with_default_status(self, status: ExecutionStatus) -> Self {
        self.set_default_status(status);
        self
    }

    pub fn failing_submit(self, message: &str) -> Self {
        *self.submit_error.lock().unwrap() = Some(message.to_string());
        self
    }

    pub fn failing_cancel(self, message: &str) -> Self {
        *self.cancel_error.lock().unwrap() = Some(message.to_string());
        self
    }

    pub fn failing_enrichment(self, message: &str) -> Self {
        *self.enrichment_error.lock().unwrap() = Some(message.to_string());
        self
    }

    /// Hold every poll until the returned gate is notified (once per poll)
    pub fn gate_polls(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.poll_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn push_poll(&self, status: ExecutionStatus) {
        self.polls.lock().unwrap().push_back(Ok(status));
    }

    pub fn set_default_status(&self, status: ExecutionStatus) {
        *self.default_status.lock().unwrap() = status;
    }

    /// Get all submit calls
    pub fn submitted(&self) -> Vec<SubmitCall> {
        self.submit_calls.lock().unwrap().clone()
    }

    pub fn poll_count(&self) -> usize {
        self.poll_calls.lock().unwrap().len()
    }

    pub fn poll_count_for(&self, run_id: RunId) -> usize {
        self.poll_calls
            .lock()
            .unwrap()
            .iter()
            .filter(|id| **id == run_id)
            .count()
    }

    pub fn cancelled(&self) -> Vec<RunId> {
        self.cancel_calls.lock().unwrap().clone()
    }

    pub fn enrichments(&self) -> Vec<(RunId, Vec<Value>)> {
        self.enrichment_calls.lock().unwrap().clone()
    }
}

impl Default for MockExecutionService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseExecutionService for MockExecutionService {
    async fn submit_job(&self, actor_id: &str, input: &Value, run_id: RunId) -> Result<()> {
        self.submit_calls.lock().unwrap().push(SubmitCall {
            actor_id: actor_id.to_string(),
            input: input.clone(),
            run_id,
        });

        match self.submit_error.lock().unwrap().clone() {
            Some(message) => Err(anyhow::anyhow!(message)),
            None => Ok(()),
        }
    }

    async fn poll_status(&self, run_id: RunId) -> Result<ExecutionStatus> {
        self.poll_calls.lock().unwrap().push(run_id);

        let gate = self.poll_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let scripted = self.polls.lock().unwrap().pop_front();
        match scripted {
            Some(Ok(status)) => Ok(status),
            Some(Err(message)) => Err(anyhow::anyhow!(message)),
            None => Ok(self.default_status.lock().unwrap().clone()),
        }
    }

    async fn cancel_job(&self, run_id: RunId) -> Result<()> {
        self.cancel_calls.lock().unwrap().push(run_id);

        match self.cancel_error.lock().unwrap().clone() {
            Some(message) => Err(anyhow::anyhow!(message)),
            None => Ok(()),
        }
    }

    async fn submit_enrichment(&self, run_id: RunId, items: &[Value]) -> Result<()> {
        self.enrichment_calls
            .lock()
            .unwrap()
            .push((run_id, items.to_vec()));

        match self.enrichment_error.lock().unwrap().clone() {
            Some(message) => Err(anyhow::anyhow!(message)),
            None => Ok(()),
        }
    }
}

// =============================================================================
// Recording Publisher
// =============================================================================

/// Publisher that records every event for assertions.
///
/// Optionally forwards to a real `EventBus` so delivery can be tested at the
/// same time.
#[derive(Default)]
pub struct RecordingPublisher {
    published: RwLock<Vec<RunEvent>>,
    forward: Option<EventBus>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn forwarding_to(bus: EventBus) -> Self {
        Self {
            published: RwLock::new(Vec::new()),
            forward: Some(bus),
        }
    }

    /// Get all published events.
    pub fn events(&self) -> Vec<RunEvent> {
        self.published
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Get published events for a specific run.
    pub fn events_for(&self, run_id: RunId) -> Vec<RunEvent> {
        self.published
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|e| e.run_id == run_id)
            .cloned()
            .collect()
    }

    /// Event kinds for a run, in publish order.
    pub fn kinds_for(&self, run_id: RunId) -> Vec<RunEventKind> {
        self.events_for(run_id).iter().map(|e| e.kind).collect()
    }

    /// Get the count of events of one kind for a run.
    pub fn count_for(&self, run_id: RunId, kind: RunEventKind) -> usize {
        self.published
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|e| e.run_id == run_id && e.kind == kind)
            .count()
    }

    /// Clear all recorded events.
    pub fn clear(&self) {
        self.published
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

impl RunEventPublisher for RecordingPublisher {
    fn publish(&self, event: RunEvent) -> usize {
        self.published
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(event.clone());
        match &self.forward {
            Some(bus) => bus.publish(event),
            None => 0,
        }
    }
}

// =============================================================================
// TestDependencies
// =============================================================================

/// Builder for a fully mocked controller.
///
/// Polling defaults to 1ms so reconciler tests finish quickly.
pub struct TestDependencies {
    pub store: Arc<MemoryRunStore>,
    pub execution: Arc<MockExecutionService>,
    pub events: Arc<RecordingPublisher>,
    pub actors: ActorCatalog,
    pub reconciler: ReconcilerConfig,
    pub max_concurrent_reconcilers: usize,
}

impl TestDependencies {
    pub fn new() -> Self {
        Self {
            store: Arc::new(MemoryRunStore::new()),
            execution: Arc::new(MockExecutionService::new()),
            events: Arc::new(RecordingPublisher::new()),
            actors: ActorCatalog::builtin(),
            reconciler: ReconcilerConfig {
                poll_interval: Duration::from_millis(1),
                max_attempts: 240,
            },
            max_concurrent_reconcilers: 16,
        }
    }

    pub fn mock_execution(mut self, execution: MockExecutionService) -> Self {
        self.execution = Arc::new(execution);
        self
    }

    /// Record events and deliver them through `bus`
    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.events = Arc::new(RecordingPublisher::forwarding_to(bus));
        self
    }

    pub fn with_actor(mut self, actor: ActorDefinition) -> Self {
        self.actors = self.actors.with_actor(actor);
        self
    }

    pub fn with_reconciler(mut self, poll_interval: Duration, max_attempts: u32) -> Self {
        self.reconciler = ReconcilerConfig {
            poll_interval,
            max_attempts,
        };
        self
    }

    pub fn server_deps(&self) -> ServerDeps {
        ServerDeps::new(
            self.store.clone(),
            self.execution.clone(),
            Arc::new(self.actors.clone()),
            self.events.clone(),
            self.reconciler,
        )
    }

    pub fn controller(&self) -> RunController {
        RunController::new(
            self.server_deps(),
            ReconcilerPool::new(self.max_concurrent_reconcilers),
        )
    }
}

impl Default for TestDependencies {
    fn default() -> Self {
        Self::new()
    }
}
