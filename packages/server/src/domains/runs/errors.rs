use thiserror::Error;

use super::models::RunStatus;

/// Errors returned synchronously by run operations.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("actor is not available to this owner")]
    Forbidden,

    #[error("run is {status}")]
    InvalidState { status: RunStatus },

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl RunError {
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }
}

pub type RunResult<T> = std::result::Result<T, RunError>;
