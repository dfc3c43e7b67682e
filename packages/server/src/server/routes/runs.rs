//! Run control routes.
//!
//! Every route except the enrichment callback acts on behalf of the
//! authenticated owner; runs owned by someone else read as not found.

use axum::{
    extract::{rejection::JsonRejection, Extension, Path, Query},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::common::{ConnectionId, RunId};
use crate::domains::runs::activities::{BulkAbortResult, CreateRunRequest};
use crate::domains::runs::{Run, RunError};
use crate::server::app::AppState;
use crate::server::error::ApiError;
use crate::server::middleware::AuthUser;

pub const WORKER_TOKEN_HEADER: &str = "x-worker-token";

#[derive(Debug, Deserialize)]
pub struct ListRunsQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkAbortRequest {
    pub run_ids: Vec<RunId>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeRequest {
    pub run_id: RunId,
}

/// POST /api/runs
///
/// A dispatch failure still answers 201: the run exists, already `failed`.
pub async fn create_run_handler(
    Extension(state): Extension<AppState>,
    user: AuthUser,
    body: Result<Json<CreateRunRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Run>), ApiError> {
    let Json(request) = body?;
    let run = state.controller.create_run(user.owner_id, request).await?;
    Ok((StatusCode::CREATED, Json(run)))
}

/// GET /api/runs?limit=
pub async fn list_runs_handler(
    Extension(state): Extension<AppState>,
    user: AuthUser,
    Query(query): Query<ListRunsQuery>,
) -> Result<Json<Vec<Run>>, ApiError> {
    let runs = state
        .controller
        .list_runs(user.owner_id, query.limit)
        .await?;
    Ok(Json(runs))
}

/// GET /api/runs/:run_id
pub async fn get_run_handler(
    Extension(state): Extension<AppState>,
    user: AuthUser,
    Path(run_id): Path<RunId>,
) -> Result<Json<Run>, ApiError> {
    let run = state.controller.get_run(run_id, user.owner_id).await?;
    Ok(Json(run))
}

/// POST /api/runs/:run_id/abort
pub async fn abort_run_handler(
    Extension(state): Extension<AppState>,
    user: AuthUser,
    Path(run_id): Path<RunId>,
) -> Result<Json<Run>, ApiError> {
    let run = state.controller.abort_run(run_id, user.owner_id).await?;
    Ok(Json(run))
}

/// POST /api/runs/bulk-abort
pub async fn bulk_abort_handler(
    Extension(state): Extension<AppState>,
    user: AuthUser,
    body: Result<Json<BulkAbortRequest>, JsonRejection>,
) -> Result<Json<BulkAbortResult>, ApiError> {
    let Json(request) = body?;
    let result = state
        .controller
        .bulk_abort(&request.run_ids, user.owner_id)
        .await;
    Ok(Json(result))
}

/// POST /api/runs/:run_id/enrichment
///
/// Called by the scraping worker, not by users. Authenticated with the
/// shared worker token instead of a JWT.
pub async fn merge_enrichment_handler(
    Extension(state): Extension<AppState>,
    Path(run_id): Path<RunId>,
    headers: HeaderMap,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let presented = headers
        .get(WORKER_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok());
    if presented != Some(&*state.worker_token) {
        warn!(run_id = %run_id, "Enrichment callback with bad worker token");
        return Err(ApiError::Unauthorized);
    }

    let Json(record) = body?;
    match state.controller.merge_enrichment(run_id, record).await? {
        Some(_) => Ok((StatusCode::OK, Json(json!({ "merged": true })))),
        None => Ok((StatusCode::NOT_FOUND, Json(json!({ "merged": false })))),
    }
}

/// POST /api/connections/:connection_id/subscriptions
pub async fn subscribe_handler(
    Extension(state): Extension<AppState>,
    user: AuthUser,
    Path(connection_id): Path<ConnectionId>,
    body: Result<Json<SubscribeRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(request) = body?;
    ensure_connection_owner(&state, connection_id, &user)?;

    // Only the run's owner may follow it
    state
        .controller
        .get_run(request.run_id, user.owner_id)
        .await?;

    if state.events.subscribe(connection_id, request.run_id) {
        debug!(connection_id = %connection_id, run_id = %request.run_id, "Subscribed to run");
    }
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/connections/:connection_id/subscriptions/:run_id
pub async fn unsubscribe_handler(
    Extension(state): Extension<AppState>,
    user: AuthUser,
    Path((connection_id, run_id)): Path<(ConnectionId, RunId)>,
) -> Result<StatusCode, ApiError> {
    ensure_connection_owner(&state, connection_id, &user)?;

    if state.events.unsubscribe(connection_id, run_id) {
        debug!(connection_id = %connection_id, run_id = %run_id, "Unsubscribed from run");
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Connections belonging to another owner read as not found.
fn ensure_connection_owner(
    state: &AppState,
    connection_id: ConnectionId,
    user: &AuthUser,
) -> Result<(), ApiError> {
    match state.events.owner_of(connection_id) {
        Some(owner_id) if owner_id == user.owner_id => Ok(()),
        _ => Err(RunError::NotFound("connection").into()),
    }
}
