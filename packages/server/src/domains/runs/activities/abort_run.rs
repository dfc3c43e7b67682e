use tracing::{info, warn};

use crate::common::{OwnerId, RunId};
use crate::domains::runs::controller::RunController;
use crate::domains::runs::errors::{RunError, RunResult};
use crate::domains::runs::models::Run;
use crate::kernel::detached::spawn_detached;

pub const ABORTED_BY_USER: &str = "aborted by user";

/// Abort a queued or running run.
///
/// The local transition never waits on the execution service: cancellation
/// there is requested on a detached task and its failure is only logged.
pub async fn abort_run(run_id: RunId, owner_id: OwnerId, controller: &RunController) -> RunResult<Run> {
    let deps = controller.deps();

    let run = deps
        .run_store
        .find_for_owner(run_id, owner_id)
        .await?
        .ok_or(RunError::NotFound("run"))?;
    if !run.status.is_abortable() {
        return Err(RunError::InvalidState { status: run.status });
    }

    let Some(aborted) = controller.mark_aborted(run_id, ABORTED_BY_USER).await? else {
        // Lost the race against a terminal transition
        let status = deps
            .run_store
            .find(run_id)
            .await?
            .map(|r| r.status)
            .unwrap_or(run.status);
        warn!(run_id = %run_id, status = %status, "Abort arrived after run finished");
        return Err(RunError::InvalidState { status });
    };

    controller.reconcilers().cancel(run_id);

    let execution = deps.execution.clone();
    spawn_detached("cancel_job", run_id, async move {
        execution.cancel_job(run_id).await
    });

    info!(run_id = %run_id, owner_id = %owner_id, "Run aborted");
    Ok(aborted)
}
