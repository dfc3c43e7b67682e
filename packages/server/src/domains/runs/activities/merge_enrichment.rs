use serde_json::Value;
use tracing::debug;

use crate::common::RunId;
use crate::domains::runs::controller::RunController;
use crate::domains::runs::errors::{RunError, RunResult};
use crate::domains::runs::models::Run;
use crate::domains::runs::result_count::has_item_identifier;
use crate::domains::runs::store::MergeOutcome;

/// Merge one enriched record into the output item sharing its `placeId` or
/// `url`.
///
/// Returns `Ok(None)` when no item matches; the run is left untouched.
pub async fn merge_enrichment(
    run_id: RunId,
    record: Value,
    controller: &RunController,
) -> RunResult<Option<Run>> {
    let Value::Object(record) = record else {
        return Err(RunError::validation("record", "must be a JSON object"));
    };
    if !has_item_identifier(&record) {
        return Err(RunError::validation("record", "needs a placeId or url"));
    }

    match controller.apply_enrichment(run_id, &record).await? {
        MergeOutcome::Merged(run) => {
            debug!(run_id = %run_id, "Enrichment merged");
            Ok(Some(run))
        }
        MergeOutcome::ItemNotFound => {
            debug!(run_id = %run_id, "No output item matches enrichment record");
            Ok(None)
        }
        MergeOutcome::RunNotFound => Err(RunError::NotFound("run")),
        MergeOutcome::InvalidState(status) => Err(RunError::InvalidState { status }),
    }
}
