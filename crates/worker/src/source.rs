//! Upstream flash API client.
//!
//! The pipeline only depends on the [`FlashSource`] trait; the HTTP client
//! here is the production implementation. Timeouts and a bounded retry
//! with exponential backoff live inside it — the coordinator never waits
//! on the network beyond what this client allows.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use flash_core::{Error, FlashBatch, Result};

/// Upstream fetch collaborator.
#[async_trait]
pub trait FlashSource: Send + Sync {
    /// Pulls the latest batch. `None` means the endpoint answered with no
    /// usable body; callers treat it the same as an incomplete batch.
    async fn fetch_batch(&self) -> Result<Option<FlashBatch>>;
}

/// Source configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// API base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Attempts per fetch (min 1)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_base_url() -> String {
    "https://api.space-invaders.com".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_max_attempts() -> u32 {
    3
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
        }
    }
}

/// HTTP client for the flash API.
pub struct InvadersApi {
    http: reqwest::Client,
    config: SourceConfig,
}

impl InvadersApi {
    pub fn new(config: SourceConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { http, config })
    }

    fn flashes_url(&self) -> String {
        format!(
            "{}/flashinvaders/flashes",
            self.config.base_url.trim_end_matches('/')
        )
    }

    async fn get_flashes_once(&self) -> Result<FlashBatch> {
        let response = self
            .http
            .get(self.flashes_url())
            .send()
            .await
            .map_err(|e| Error::fetch(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::fetch(format!("upstream returned HTTP {}", status)));
        }

        response
            .json::<FlashBatch>()
            .await
            .map_err(|e| Error::fetch(format!("malformed body: {}", e)))
    }
}

#[async_trait]
impl FlashSource for InvadersApi {
    async fn fetch_batch(&self) -> Result<Option<FlashBatch>> {
        let attempts = self.config.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            match self.get_flashes_once().await {
                Ok(batch) => {
                    debug!(count = batch.len(), attempt, "Fetched flash batch");
                    return Ok(Some(batch));
                }
                Err(e) => {
                    warn!(attempt, attempts, "Fetch attempt failed: {}", e);
                    last_error = Some(e);
                    if attempt < attempts {
                        let backoff = Duration::from_millis(500 * 2u64.pow(attempt));
                        tokio::time::sleep(backoff).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| Error::fetch("no attempts made")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flashes_url_tolerates_trailing_slash() {
        let api = InvadersApi::new(SourceConfig {
            base_url: "https://api.example.com/".into(),
            ..SourceConfig::default()
        })
        .unwrap();
        assert_eq!(
            api.flashes_url(),
            "https://api.example.com/flashinvaders/flashes"
        );
    }
}
