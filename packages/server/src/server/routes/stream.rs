//! SSE streaming endpoint.
//!
//! GET /api/runs/stream?token=JWT
//!
//! Opens an Event Bus connection for the authenticated owner. The owner
//! receives events for all of their runs without subscribing; the connection
//! id sent in the `connected` event is what the subscription routes take.
//!
//! Auth strategy: JWT passed as `?token=` query param.
//! EventSource can't send custom headers, so the Authorization header is only
//! a fallback for non-browser clients.

use std::convert::Infallible;

use axum::{
    extract::{Extension, Query},
    http::HeaderMap,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::server::app::AppState;
use crate::server::error::ApiError;
use crate::server::middleware::{authenticate, bearer_token};

#[derive(Deserialize)]
pub struct StreamQuery {
    /// JWT token for authentication
    token: Option<String>,
}

/// SSE stream handler.
///
/// The connection is torn down (and its subscriptions dropped) when the
/// client goes away and the response stream is dropped.
pub async fn stream_handler(
    Extension(state): Extension<AppState>,
    Query(query): Query<StreamQuery>,
    headers: HeaderMap,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let token = query
        .token
        .as_deref()
        .or_else(|| bearer_token(&headers))
        .ok_or(ApiError::Unauthorized)?;
    let user = authenticate(token, &state.jwt_service).ok_or(ApiError::Unauthorized)?;

    let subscription = state.events.connect(user.owner_id);
    let connection_id = subscription.id();
    debug!(connection_id = %connection_id, owner_id = %user.owner_id, "Stream connected");

    let connected = stream::once(async move {
        Ok::<_, Infallible>(
            Event::default()
                .event("connected")
                .data(json!({ "connectionId": connection_id }).to_string()),
        )
    });

    let events = subscription.filter_map(|event| async move {
        match Event::default().event(event.kind.as_str()).json_data(&event) {
            Ok(sse_event) => Some(Ok(sse_event)),
            Err(e) => {
                warn!(run_id = %event.run_id, error = %e, "Failed to encode run event");
                None
            }
        }
    });

    Ok(Sse::new(connected.chain(events)).keep_alive(KeepAlive::default()))
}
