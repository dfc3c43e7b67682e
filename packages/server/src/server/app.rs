//! Application setup and server configuration.

use std::sync::Arc;

use axum::{
    extract::Extension,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, HeaderValue, Method,
    },
    middleware,
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::domains::auth::JwtService;
use crate::domains::runs::RunController;
use crate::kernel::EventBus;
use crate::server::middleware::jwt_auth_middleware;
use crate::server::routes::{
    abort_run_handler, bulk_abort_handler, create_run_handler, get_run_handler, health_handler,
    list_runs_handler, merge_enrichment_handler, stream_handler, subscribe_handler,
    unsubscribe_handler, WORKER_TOKEN_HEADER,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub controller: RunController,
    /// Same bus the controller publishes to, used here for connection routing
    pub events: EventBus,
    pub jwt_service: Arc<JwtService>,
    /// Shared secret the scraping worker sends on enrichment callbacks
    pub worker_token: Arc<str>,
}

impl AppState {
    pub fn new(
        controller: RunController,
        events: EventBus,
        jwt_service: Arc<JwtService>,
        worker_token: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            controller,
            events,
            jwt_service,
            worker_token: worker_token.into(),
        }
    }
}

/// Build the Axum application router
///
/// An empty `allowed_origins` allows any origin (development).
pub fn build_app(state: AppState, allowed_origins: &[String]) -> Router {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    let allow_origin = if origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(origins)
    };

    let cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([
            AUTHORIZATION,
            CONTENT_TYPE,
            HeaderName::from_static(WORKER_TOKEN_HEADER),
        ]);

    let jwt_service = state.jwt_service.clone();

    Router::new()
        .route("/api/runs", post(create_run_handler).get(list_runs_handler))
        .route("/api/runs/stream", get(stream_handler))
        .route("/api/runs/bulk-abort", post(bulk_abort_handler))
        .route("/api/runs/:run_id", get(get_run_handler))
        .route("/api/runs/:run_id/abort", post(abort_run_handler))
        .route("/api/runs/:run_id/enrichment", post(merge_enrichment_handler))
        .route(
            "/api/connections/:connection_id/subscriptions",
            post(subscribe_handler),
        )
        .route(
            "/api/connections/:connection_id/subscriptions/:run_id",
            delete(unsubscribe_handler),
        )
        .route("/health", get(health_handler))
        // Middleware layers (applied in reverse order - last added runs first)
        .layer(middleware::from_fn(move |req, next| {
            jwt_auth_middleware(jwt_service.clone(), req, next)
        }))
        .layer(Extension(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
