use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a run.
///
/// ```text
/// queued ──► running ──► succeeded
///   │  │        │  └───► failed
///   │  └────────┼──────► succeeded | failed   (terminal state seen before "running")
///   └───────────┴──────► aborted
/// ```
///
/// `succeeded`, `failed` and `aborted` are terminal.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, Default,
)]
#[sqlx(type_name = "run_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Queued,
    Running,
    Succeeded,
    Failed,
    Aborted,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::Running => "running",
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
            RunStatus::Aborted => "aborted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Succeeded | RunStatus::Failed | RunStatus::Aborted
        )
    }

    /// Whether a user may still abort a run in this state.
    pub fn is_abortable(&self) -> bool {
        matches!(self, RunStatus::Queued | RunStatus::Running)
    }

    /// States from which `self` may be entered.
    pub fn predecessors(&self) -> &'static [RunStatus] {
        match self {
            RunStatus::Queued => &[],
            RunStatus::Running => &[RunStatus::Queued],
            RunStatus::Succeeded | RunStatus::Failed | RunStatus::Aborted => {
                &[RunStatus::Queued, RunStatus::Running]
            }
        }
    }

    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        next.predecessors().contains(self)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
