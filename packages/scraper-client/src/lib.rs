//! REST client for the scraping worker service.
//!
//! The worker exposes a small task API: submit a scrape for an actor, poll the
//! task by id, revoke it, and queue a website-enrichment pass over results.
//! Task ids are the platform's run ids, so every call is keyed by run id.
//!
//! # Example
//!
//! ```rust,ignore
//! use scraper_client::ScraperClient;
//!
//! let client = ScraperClient::new("http://localhost:8002");
//!
//! client.submit_scrape("google-maps", &input, &run_id).await?;
//! let status = client.task_status(&run_id).await?;
//! println!("{:?}", status.state());
//! ```

pub mod error;
pub mod types;

pub use error::{Result, ScraperError};
pub use types::{SubmitResponse, TaskState, TaskStatusResponse};

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use types::{EnrichRequest, ScrapeRequest};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct ScraperClient {
    client: reqwest::Client,
    base_url: String,
}

impl ScraperClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Queue a scrape task. Returns as soon as the worker accepts it.
    pub async fn submit_scrape(
        &self,
        actor_id: &str,
        input: &Value,
        run_id: &str,
    ) -> Result<SubmitResponse> {
        let body = ScrapeRequest {
            actor_id,
            input_data: input,
            run_id,
        };

        let url = format!("{}/scrape", self.base_url);
        let resp = self.client.post(&url).json(&body).send().await?;
        let submitted: SubmitResponse = Self::decode(resp).await?;

        tracing::debug!(
            run_id,
            task_id = %submitted.task_id,
            status = %submitted.status,
            "Scrape task accepted"
        );
        Ok(submitted)
    }

    /// Fetch the current state of a task.
    pub async fn task_status(&self, run_id: &str) -> Result<TaskStatusResponse> {
        let url = format!("{}/task/{}", self.base_url, run_id);
        let resp = self.client.get(&url).send().await?;
        Self::decode(resp).await
    }

    /// Revoke a queued or running task.
    pub async fn cancel_task(&self, run_id: &str) -> Result<()> {
        let url = format!("{}/task/{}", self.base_url, run_id);
        let resp = self.client.delete(&url).send().await?;
        let _: Value = Self::decode(resp).await?;
        Ok(())
    }

    /// Queue website enrichment for the places produced by a run.
    pub async fn submit_enrichment(&self, run_id: &str, places: &[Value]) -> Result<()> {
        let body = EnrichRequest {
            run_id,
            places_data: places,
        };

        let url = format!("{}/enrich", self.base_url);
        let resp = self.client.post(&url).json(&body).send().await?;
        let _: Value = Self::decode(resp).await?;

        tracing::debug!(run_id, places = places.len(), "Enrichment task accepted");
        Ok(())
    }

    async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ScraperError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let bytes = resp.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_is_normalized() {
        let client = ScraperClient::new("http://worker:8002/");
        assert_eq!(client.base_url(), "http://worker:8002");
    }

    #[tokio::test]
    async fn test_unreachable_service_is_http_error() {
        // Port 9 (discard) on localhost is closed in test environments.
        let client = ScraperClient::new("http://127.0.0.1:9");
        let err = client.task_status("run-1").await.unwrap_err();
        assert!(matches!(err, ScraperError::Http(_)));
    }
}
