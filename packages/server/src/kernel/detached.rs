use std::future::Future;

use tokio::task::JoinHandle;
use tracing::warn;

use crate::common::RunId;

/// Fire-and-forget side effect tied to a run. Errors are logged and dropped.
pub fn spawn_detached<F>(label: &'static str, run_id: RunId, fut: F) -> JoinHandle<()>
where
    F: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = fut.await {
            warn!(run_id = %run_id, task = label, error = %e, "Detached task failed");
        }
    })
}
