//! Kernel module - server infrastructure and dependencies.

pub mod deps;
pub mod detached;
pub mod event_bus;
pub mod reconciler_pool;
pub mod scraper_service;
pub mod test_dependencies;
pub mod traits;

pub use deps::ServerDeps;
pub use event_bus::{EventBus, RunEventPublisher, Subscription};
pub use reconciler_pool::ReconcilerPool;
pub use scraper_service::ScraperServiceAdapter;
pub use test_dependencies::{MockExecutionService, RecordingPublisher, TestDependencies};
pub use traits::*;
