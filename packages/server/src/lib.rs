// Run orchestration - API Core
//
// Tracks scraping runs from creation to a terminal state: dispatches jobs to the
// scraping worker, reconciles their status by polling, merges enrichment
// callbacks, and fans run events out to live SSE connections.
//
// Operations are organized per-domain in domains/*/activities/

pub mod common;
pub mod config;
pub mod domains;
pub mod kernel;
pub mod server;

pub use config::*;
