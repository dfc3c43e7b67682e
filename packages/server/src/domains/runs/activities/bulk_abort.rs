use std::collections::HashSet;

use serde::Serialize;
use tracing::{info, warn};

use super::abort_run::abort_run;
use crate::common::{OwnerId, RunId};
use crate::domains::runs::controller::RunController;
use crate::domains::runs::errors::RunError;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BulkAbortResult {
    pub aborted: Vec<RunId>,
    pub failed: Vec<RunId>,
    pub skipped: Vec<RunId>,
}

/// Abort each run independently, in order. Repeated ids are handled once.
///
/// Missing runs land in `failed`, runs that already finished in `skipped`.
pub async fn bulk_abort(
    run_ids: &[RunId],
    owner_id: OwnerId,
    controller: &RunController,
) -> BulkAbortResult {
    let mut result = BulkAbortResult::default();
    let mut seen = HashSet::new();

    for &run_id in run_ids {
        if !seen.insert(run_id) {
            continue;
        }

        match abort_run(run_id, owner_id, controller).await {
            Ok(_) => result.aborted.push(run_id),
            Err(RunError::InvalidState { .. }) => result.skipped.push(run_id),
            Err(RunError::NotFound(_)) => result.failed.push(run_id),
            Err(e) => {
                warn!(run_id = %run_id, error = %e, "Bulk abort entry failed");
                result.failed.push(run_id);
            }
        }
    }

    info!(
        owner_id = %owner_id,
        aborted = result.aborted.len(),
        failed = result.failed.len(),
        skipped = result.skipped.len(),
        "Bulk abort finished"
    );
    result
}
