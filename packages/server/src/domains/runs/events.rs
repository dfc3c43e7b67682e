use serde::{Deserialize, Serialize};

use super::models::{Run, RunStatus};
use crate::common::{OwnerId, RunId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunEventKind {
    #[serde(rename = "run:created")]
    Created,
    #[serde(rename = "run:status")]
    Status,
    #[serde(rename = "run:progress")]
    Progress,
    #[serde(rename = "run:completed")]
    Completed,
    #[serde(rename = "run:failed")]
    Failed,
    #[serde(rename = "run:update")]
    Update,
}

impl RunEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunEventKind::Created => "run:created",
            RunEventKind::Status => "run:status",
            RunEventKind::Progress => "run:progress",
            RunEventKind::Completed => "run:completed",
            RunEventKind::Failed => "run:failed",
            RunEventKind::Update => "run:update",
        }
    }
}

/// Payload pushed to live connections.
///
/// Always carries `runId`, `ownerId` and `status`. Heavier kinds embed the
/// full run so clients can render without a follow-up fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunEvent {
    #[serde(rename = "type")]
    pub kind: RunEventKind,
    pub run_id: RunId,
    pub owner_id: OwnerId,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run: Option<Run>,
}

impl RunEvent {
    fn lightweight(kind: RunEventKind, run: &Run) -> Self {
        Self {
            kind,
            run_id: run.run_id,
            owner_id: run.owner_id,
            status: run.status,
            progress: None,
            error: None,
            run: None,
        }
    }

    fn snapshot(kind: RunEventKind, run: &Run) -> Self {
        Self {
            run: Some(run.clone()),
            ..Self::lightweight(kind, run)
        }
    }

    pub fn created(run: &Run) -> Self {
        Self::snapshot(RunEventKind::Created, run)
    }

    pub fn status(run: &Run) -> Self {
        Self::lightweight(RunEventKind::Status, run)
    }

    pub fn progress(run: &Run, progress: serde_json::Value) -> Self {
        Self {
            progress: Some(progress),
            ..Self::lightweight(RunEventKind::Progress, run)
        }
    }

    pub fn completed(run: &Run) -> Self {
        Self::snapshot(RunEventKind::Completed, run)
    }

    pub fn failed(run: &Run) -> Self {
        Self {
            error: run.error.clone(),
            ..Self::snapshot(RunEventKind::Failed, run)
        }
    }

    pub fn update(run: &Run) -> Self {
        Self::snapshot(RunEventKind::Update, run)
    }
}
