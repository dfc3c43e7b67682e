use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::time::Duration;

use crate::domains::runs::activities::reconcile::ReconcilerConfig;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres connection string. When unset the server keeps runs in memory.
    pub database_url: Option<String>,
    pub port: u16,
    pub scraper_service_url: String,
    pub jwt_secret: String,
    pub jwt_issuer: String,
    /// Shared secret the scraping worker presents on enrichment callbacks
    pub worker_token: String,
    pub reconcile_poll_interval: Duration,
    pub reconcile_max_attempts: u32,
    pub max_concurrent_reconcilers: usize,
    pub allowed_origins: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").ok(),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("PORT must be a valid number")?,
            scraper_service_url: env::var("SCRAPER_SERVICE_URL")
                .unwrap_or_else(|_| "http://localhost:8002".to_string()),
            jwt_secret: env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            jwt_issuer: env::var("JWT_ISSUER").unwrap_or_else(|_| "scraper-platform".to_string()),
            worker_token: env::var("WORKER_TOKEN").context("WORKER_TOKEN must be set")?,
            reconcile_poll_interval: Duration::from_secs(
                env::var("RECONCILE_POLL_INTERVAL_SECS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .context("RECONCILE_POLL_INTERVAL_SECS must be a valid number")?,
            ),
            reconcile_max_attempts: env::var("RECONCILE_MAX_ATTEMPTS")
                .unwrap_or_else(|_| "240".to_string())
                .parse()
                .context("RECONCILE_MAX_ATTEMPTS must be a valid number")?,
            max_concurrent_reconcilers: env::var("MAX_CONCURRENT_RECONCILERS")
                .unwrap_or_else(|_| "64".to_string())
                .parse()
                .context("MAX_CONCURRENT_RECONCILERS must be a valid number")?,
            allowed_origins: env::var("ALLOWED_ORIGINS")
                .map(|origins| {
                    origins
                        .split(',')
                        .map(|o| o.trim().to_string())
                        .filter(|o| !o.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
        })
    }

    pub fn reconciler_config(&self) -> ReconcilerConfig {
        ReconcilerConfig {
            poll_interval: self.reconcile_poll_interval,
            max_attempts: self.reconcile_max_attempts,
        }
    }
}
