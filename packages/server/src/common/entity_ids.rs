//! Typed ID definitions for the run-orchestration entities.
//!
//! ```rust
//! use runs_core::common::{OwnerId, RunId};
//!
//! let run_id = RunId::new();
//! let owner_id = OwnerId::new();
//! // let wrong: OwnerId = run_id; // compile error
//! ```

pub use super::id::Id;

/// Marker type for Run entities.
pub struct RunEntity;

/// Marker type for the requesting user (owned by the external auth service).
pub struct Owner;

/// Marker type for live event-stream connections.
pub struct Connection;

pub type RunId = Id<RunEntity>;

pub type OwnerId = Id<Owner>;

pub type ConnectionId = Id<Connection>;
