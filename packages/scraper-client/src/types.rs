use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body for `POST /scrape`.
#[derive(Debug, Clone, Serialize)]
pub struct ScrapeRequest<'a> {
    pub actor_id: &'a str,
    pub input_data: &'a Value,
    /// The worker reuses this as its task id, so polling is keyed by run id.
    pub run_id: &'a str,
}

/// Acknowledgement for an accepted scrape task.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitResponse {
    pub task_id: String,
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
}

/// Body for `POST /enrich`.
#[derive(Debug, Clone, Serialize)]
pub struct EnrichRequest<'a> {
    pub run_id: &'a str,
    pub places_data: &'a [Value],
}

/// Response of `GET /task/{task_id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskStatusResponse {
    pub task_id: String,
    pub status: String,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Coarse task state reported by the worker queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Queued,
    Running,
    Success,
    Failure,
}

impl TaskState {
    /// Map a raw worker queue state onto the four states the platform cares about.
    ///
    /// Unknown states are treated as still queued; the caller keeps polling.
    pub fn from_raw(raw: &str) -> Self {
        match raw.to_ascii_uppercase().as_str() {
            "STARTED" | "PROGRESS" => TaskState::Running,
            "SUCCESS" => TaskState::Success,
            "FAILURE" | "REVOKED" => TaskState::Failure,
            "PENDING" | "RECEIVED" | "RETRY" => TaskState::Queued,
            other => {
                tracing::debug!(state = other, "Unrecognized task state, treating as queued");
                TaskState::Queued
            }
        }
    }
}

impl TaskStatusResponse {
    pub fn state(&self) -> TaskState {
        TaskState::from_raw(&self.status)
    }
}
