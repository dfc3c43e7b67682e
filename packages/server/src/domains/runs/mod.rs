//! Runs: one execution of an actor, tracked from creation to a terminal state.

pub mod activities;
pub mod controller;
pub mod errors;
pub mod events;
pub mod models;
pub mod result_count;
pub mod store;

pub use controller::RunController;
pub use errors::{RunError, RunResult};
pub use events::{RunEvent, RunEventKind};
pub use models::{Run, RunStatus, RunTransition};
