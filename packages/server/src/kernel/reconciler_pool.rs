//! Bounded set of per-run background tasks.
//!
//! Every in-flight run gets one task. The pool caps how many run at once with
//! a semaphore, and keeps a cancellation token per run so abort and shutdown
//! can stop a task without waiting for its next poll.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::common::RunId;

pub const DEFAULT_MAX_CONCURRENT_RECONCILERS: usize = 64;

#[derive(Clone)]
pub struct ReconcilerPool {
    permits: Arc<Semaphore>,
    /// Track running reconcilers for cancellation
    running: Arc<RwLock<HashMap<RunId, CancellationToken>>>,
    shutdown: CancellationToken,
}

impl ReconcilerPool {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            running: Arc::new(RwLock::new(HashMap::new())),
            shutdown: CancellationToken::new(),
        }
    }

    /// Spawn the task for `run_id`.
    ///
    /// The permit is acquired inside the task, so this never blocks. Returns
    /// `None` if the run already has a task.
    pub fn spawn<F, Fut>(&self, run_id: RunId, task: F) -> Option<JoinHandle<()>>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = self.shutdown.child_token();
        {
            let mut running = self.running.write().unwrap_or_else(|e| e.into_inner());
            if running.contains_key(&run_id) {
                warn!(run_id = %run_id, "Reconciler already running");
                return None;
            }
            running.insert(run_id, token.clone());
        }

        let permits = self.permits.clone();
        let guard = Registration {
            run_id,
            running: self.running.clone(),
        };

        Some(tokio::spawn(async move {
            let _guard = guard;

            let _permit = tokio::select! {
                _ = token.cancelled() => {
                    debug!(run_id = %run_id, "Reconciler cancelled before start");
                    return;
                }
                permit = permits.acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => return,
                },
            };

            task(token).await;
        }))
    }

    /// Signal the task for `run_id`. Returns `false` if none is tracked.
    pub fn cancel(&self, run_id: RunId) -> bool {
        let running = self.running.read().unwrap_or_else(|e| e.into_inner());
        match running.get(&run_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_tracked(&self, run_id: RunId) -> bool {
        self.running
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(&run_id)
    }

    pub fn active_count(&self) -> usize {
        self.running.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Cancel every task, including ones still waiting for a permit.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

impl Default for ReconcilerPool {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONCURRENT_RECONCILERS)
    }
}

/// Removes the run from the tracking map when its task ends or panics.
struct Registration {
    run_id: RunId,
    running: Arc<RwLock<HashMap<RunId, CancellationToken>>>,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.running
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.run_id);
    }
}
