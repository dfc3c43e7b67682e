//! Test harness for integration testing.
//!
//! Wires a real `RunController`, `EventBus` and HTTP router over the in-memory
//! run store and the mock execution service, so tests drive the same code the
//! server runs without a database or scraping worker.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use runs_core::common::{OwnerId, RunId};
use runs_core::domains::auth::JwtService;
use runs_core::domains::runs::activities::CreateRunRequest;
use runs_core::domains::runs::store::{MemoryRunStore, RunStore};
use runs_core::domains::runs::{Run, RunController, RunStatus};
use runs_core::kernel::{EventBus, MockExecutionService, RecordingPublisher, TestDependencies};
use runs_core::server::{build_app, AppState};
use serde_json::Value;

pub const JWT_SECRET: &str = "test_secret";
pub const JWT_ISSUER: &str = "test_issuer";
pub const WORKER_TOKEN: &str = "test-worker-token";

/// How long `eventually` waits before failing the test.
const EVENTUALLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Test harness around a fully mocked controller.
///
/// Reconcilers still running when the harness drops are cancelled.
///
/// # Example
///
/// ```ignore
/// #[tokio::test]
/// async fn my_test() {
///     let ctx = TestHarness::new();
///     let run = ctx.create_run(ctx.owner_id, "amazon", json!({})).await;
///     // ... test code
/// }
/// ```
pub struct TestHarness {
    pub deps: TestDependencies,
    pub controller: RunController,
    pub bus: EventBus,
    pub jwt_service: Arc<JwtService>,
    /// Default owner for tests that only need one
    pub owner_id: OwnerId,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_deps(TestDependencies::new())
    }

    /// Build around custom dependencies. Events are recorded and delivered
    /// through the harness bus.
    pub fn with_deps(deps: TestDependencies) -> Self {
        init_tracing();

        let bus = EventBus::new();
        let deps = deps.with_event_bus(bus.clone());
        let controller = deps.controller();

        Self {
            deps,
            controller,
            bus,
            jwt_service: Arc::new(JwtService::new(JWT_SECRET, JWT_ISSUER.to_string())),
            owner_id: OwnerId::new(),
        }
    }

    pub fn execution(&self) -> &MockExecutionService {
        &self.deps.execution
    }

    pub fn events(&self) -> &RecordingPublisher {
        &self.deps.events
    }

    pub fn store(&self) -> &MemoryRunStore {
        &self.deps.store
    }

    /// Router with the harness controller, bus and secrets.
    pub fn app(&self) -> Router {
        let state = AppState::new(
            self.controller.clone(),
            self.bus.clone(),
            self.jwt_service.clone(),
            WORKER_TOKEN,
        );
        build_app(state, &[])
    }

    pub fn token_for(&self, owner_id: OwnerId) -> String {
        self.jwt_service
            .create_token(owner_id)
            .expect("Failed to create token")
    }

    pub async fn create_run(&self, owner_id: OwnerId, actor_id: &str, input: Value) -> Run {
        self.controller
            .create_run(owner_id, CreateRunRequest::new(actor_id, input))
            .await
            .expect("Failed to create run")
    }

    pub async fn find_run(&self, run_id: RunId) -> Run {
        self.deps
            .store
            .find(run_id)
            .await
            .expect("Store error")
            .expect("Run not found")
    }

    /// Wait until the stored run reaches `status`.
    pub async fn wait_for_status(&self, run_id: RunId, status: RunStatus) -> Run {
        eventually(|| async move {
            let run = self.find_run(run_id).await;
            (run.status == status).then_some(run)
        })
        .await
    }

    /// Wait until no reconciler is tracked for `run_id`.
    pub async fn wait_for_reconciler_exit(&self, run_id: RunId) {
        eventually(|| async move {
            (!self.controller.reconcilers().is_tracked(run_id)).then_some(())
        })
        .await
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TestHarness {
    fn drop(&mut self) {
        self.controller.reconcilers().shutdown();
    }
}

/// Poll `check` until it yields a value. Panics after five seconds.
pub async fn eventually<T, F, Fut>(mut check: F) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let deadline = Instant::now() + EVENTUALLY_TIMEOUT;
    loop {
        if let Some(value) = check().await {
            return value;
        }
        if Instant::now() > deadline {
            panic!("condition not met within {:?}", EVENTUALLY_TIMEOUT);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Initialize tracing subscriber to respect RUST_LOG environment variable.
/// Uses try_init() to avoid panicking if already initialized.
/// Run tests with: RUST_LOG=debug cargo test -- --nocapture
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
