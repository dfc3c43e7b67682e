use thiserror::Error;

/// Errors returned by the scraper service client.
#[derive(Debug, Error)]
pub enum ScraperError {
    /// Transport-level failure (connection refused, timeout, TLS, ...)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-success status code
    #[error("scraper service returned {status}: {message}")]
    Api { status: u16, message: String },

    /// Response body could not be decoded
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ScraperError>;
