use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use typed_builder::TypedBuilder;

use super::RunStatus;
use crate::common::{OwnerId, RunId};

/// One execution of an actor against an input.
///
/// Rows live in the `runs` table; the JSON form is what the API and the live
/// event stream expose.
#[derive(FromRow, Debug, Clone, PartialEq, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
#[builder(field_defaults(setter(into)))]
pub struct Run {
    #[builder(default = RunId::new())]
    pub run_id: RunId,
    pub actor_id: String,
    pub actor_name: String,
    pub owner_id: OwnerId,
    pub input: Value,

    #[builder(default)]
    pub status: RunStatus,
    #[builder(default)]
    pub output: Option<Value>,
    #[builder(default)]
    pub result_count: i64,
    #[builder(default)]
    pub error: Option<String>,

    #[builder(default = Utc::now())]
    pub started_at: DateTime<Utc>,
    #[builder(default)]
    pub finished_at: Option<DateTime<Utc>>,
    /// Milliseconds between `started_at` and `finished_at`
    #[builder(default)]
    pub duration: Option<i64>,

    #[builder(default)]
    pub scheduled: bool,
}

/// A status change together with the fields it writes.
#[derive(Debug, Clone)]
pub struct RunTransition {
    pub to: RunStatus,
    pub output: Option<Value>,
    pub result_count: Option<i64>,
    pub error: Option<String>,
    pub at: DateTime<Utc>,
}

impl RunTransition {
    fn to(status: RunStatus) -> Self {
        Self {
            to: status,
            output: None,
            result_count: None,
            error: None,
            at: Utc::now(),
        }
    }

    pub fn running() -> Self {
        Self::to(RunStatus::Running)
    }

    pub fn succeeded(output: Value, result_count: i64) -> Self {
        Self {
            output: Some(output),
            result_count: Some(result_count),
            ..Self::to(RunStatus::Succeeded)
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::to(RunStatus::Failed)
        }
    }

    pub fn aborted(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::to(RunStatus::Aborted)
        }
    }
}

impl Run {
    /// Apply a transition in place if the state machine allows it.
    ///
    /// Returns `false` and leaves the run untouched otherwise. `finished_at`
    /// and `duration` are stamped only on the first terminal transition.
    pub fn apply(&mut self, transition: &RunTransition) -> bool {
        if !self.status.can_transition_to(transition.to) {
            return false;
        }

        self.status = transition.to;
        if let Some(output) = &transition.output {
            self.output = Some(output.clone());
        }
        if let Some(count) = transition.result_count {
            self.result_count = count;
        }
        if let Some(error) = &transition.error {
            self.error = Some(error.clone());
        }

        if transition.to.is_terminal() && self.finished_at.is_none() {
            self.finished_at = Some(transition.at);
            self.duration = Some(
                (transition.at - self.started_at)
                    .num_milliseconds()
                    .max(0),
            );
        }

        true
    }

    pub fn is_owned_by(&self, owner_id: OwnerId) -> bool {
        self.owner_id == owner_id
    }
}
