//! HTTP error mapping.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::domains::runs::RunError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("missing or invalid token")]
    Unauthorized,

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Run(#[from] RunError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Run(RunError::Validation { .. }) => StatusCode::BAD_REQUEST,
            ApiError::Run(RunError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Run(RunError::Forbidden) => StatusCode::FORBIDDEN,
            ApiError::Run(RunError::InvalidState { .. }) => StatusCode::CONFLICT,
            ApiError::Run(RunError::Store(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Store failures are logged here and kept out of the response body
        let message = match &self {
            ApiError::Run(RunError::Store(e)) => {
                error!(error = %e, "Run store error");
                "internal server error".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
