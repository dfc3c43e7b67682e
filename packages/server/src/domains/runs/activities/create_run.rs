//! Create a run and hand it to the execution service.
//!
//! Flow:
//! 1. Resolve the actor and check the owner may use it
//! 2. Normalize the input with the actor's rule table
//! 3. Persist the run as `queued` and publish `run:created`
//! 4. Submit the job; on failure the run is persisted as `failed` and returned
//! 5. Start the reconciler and return without waiting for it

use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::common::OwnerId;
use crate::domains::actors::normalize_input;
use crate::domains::runs::controller::RunController;
use crate::domains::runs::errors::{RunError, RunResult};
use crate::domains::runs::events::RunEvent;
use crate::domains::runs::models::Run;

/// Prefix of the error stored on runs the execution service refused.
pub const DISPATCH_FAILED_PREFIX: &str = "dispatch failed";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRunRequest {
    #[serde(default)]
    pub actor_id: String,
    #[serde(default)]
    pub input: Value,
    #[serde(default)]
    pub scheduled: bool,
}

impl CreateRunRequest {
    pub fn new(actor_id: impl Into<String>, input: Value) -> Self {
        Self {
            actor_id: actor_id.into(),
            input,
            scheduled: false,
        }
    }
}

pub async fn create_run(
    owner_id: OwnerId,
    request: CreateRunRequest,
    controller: &RunController,
) -> RunResult<Run> {
    let deps = controller.deps();

    let actor_id = request.actor_id.trim();
    if actor_id.is_empty() {
        return Err(RunError::validation("actorId", "is required"));
    }

    let actor = deps
        .actors
        .find_actor(actor_id)
        .await?
        .ok_or(RunError::NotFound("actor"))?;
    if !actor.is_visible_to(owner_id) {
        return Err(RunError::Forbidden);
    }

    let input = normalize_input(actor.input_rules, request.input)?;

    let run = Run::builder()
        .actor_id(actor.id.clone())
        .actor_name(actor.name.clone())
        .owner_id(owner_id)
        .input(input)
        .scheduled(request.scheduled)
        .build();

    deps.run_store.insert(&run).await?;
    info!(
        run_id = %run.run_id,
        actor_id = %run.actor_id,
        owner_id = %owner_id,
        scheduled = run.scheduled,
        "Run created"
    );
    deps.events.publish(RunEvent::created(&run));

    if let Err(e) = deps
        .execution
        .submit_job(&run.actor_id, &run.input, run.run_id)
        .await
    {
        warn!(run_id = %run.run_id, error = %e, "Dispatch failed");
        let reason = format!("{}: {}", DISPATCH_FAILED_PREFIX, e);
        return match controller.mark_failed(run.run_id, reason).await? {
            Some(failed) => Ok(failed),
            None => deps
                .run_store
                .find(run.run_id)
                .await?
                .ok_or(RunError::NotFound("run")),
        };
    }

    controller.spawn_reconciler(run.run_id);
    Ok(run)
}
