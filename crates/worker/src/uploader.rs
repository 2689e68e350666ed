//! Image mirror collaborator.
//!
//! Downloads each flash image from the upstream CDN and hands it to the
//! upload service, which stores it in the bucket and answers 201 for a new
//! object or 200 for one it already has. The whole step is best-effort:
//! a failed upload is logged and retried implicitly when the pinning
//! service reports the ref missing.

use std::sync::Arc;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error};

use flash_core::{Error, Flash, Result};

/// One image to mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    /// Absolute URL of the source image.
    pub image_url: String,
    /// Object key in the bucket; the upstream relative path is reused.
    pub key: String,
}

/// Upload collaborator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Whether image mirroring runs at all.
    #[serde(default)]
    pub enabled: bool,
    /// Upload service endpoint.
    #[serde(default)]
    pub upload_url: String,
    /// Upload service API key.
    #[serde(default)]
    pub api_key: String,
    /// Base URL images are downloaded from.
    #[serde(default = "default_image_base_url")]
    pub image_base_url: String,
    /// Parallel uploads per batch.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_image_base_url() -> String {
    "https://api.space-invaders.com".to_string()
}

fn default_concurrency() -> usize {
    3
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            upload_url: String::new(),
            api_key: String::new(),
            image_base_url: default_image_base_url(),
            concurrency: default_concurrency(),
        }
    }
}

/// Mirrors flash images into the object store.
pub struct ImageSync {
    http: reqwest::Client,
    config: UploadConfig,
}

impl ImageSync {
    pub fn new(config: UploadConfig) -> Result<Self> {
        if config.enabled && (config.upload_url.is_empty() || config.api_key.is_empty()) {
            return Err(Error::Config(
                "uploader.upload_url and uploader.api_key must be set when uploads are enabled"
                    .into(),
            ));
        }

        let http = reqwest::Client::new();
        Ok(Self { http, config })
    }

    /// Build upload requests for a set of flashes.
    pub fn requests_for(&self, flashes: &[Flash]) -> Vec<UploadRequest> {
        let base = self.config.image_base_url.trim_end_matches('/');
        flashes
            .iter()
            .map(|flash| UploadRequest {
                image_url: format!("{}/{}", base, flash.img.trim_start_matches('/')),
                key: flash.img.clone(),
            })
            .collect()
    }

    /// Mirror one image. Returns 1 if the service inserted a new object,
    /// 0 if it already had it.
    async fn upload(&self, request: &UploadRequest) -> Result<u64> {
        let image = self
            .http
            .get(&request.image_url)
            .send()
            .await
            .map_err(|e| Error::internal(format!("image download failed: {}", e)))?;

        if !image.status().is_success() {
            return Err(Error::internal(format!(
                "image download returned HTTP {}",
                image.status()
            )));
        }

        let bytes = image
            .bytes()
            .await
            .map_err(|e| Error::internal(format!("image download failed: {}", e)))?;

        let response = self
            .http
            .post(format!(
                "{}/upload",
                self.config.upload_url.trim_end_matches('/')
            ))
            .header("x-api-key", &self.config.api_key)
            .header("x-object-key", &request.key)
            .body(bytes)
            .send()
            .await
            .map_err(|e| Error::internal(format!("upload failed: {}", e)))?;

        match response.status() {
            StatusCode::CREATED => Ok(1),
            status if status.is_success() => Ok(0),
            status => Err(Error::internal(format!("upload returned HTTP {}", status))),
        }
    }

    /// Mirror a batch with bounded concurrency. Returns the number of
    /// images newly inserted; individual failures are logged, never
    /// propagated.
    pub async fn upload_batch(self: Arc<Self>, requests: Vec<UploadRequest>) -> u64 {
        if requests.is_empty() {
            return 0;
        }

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut tasks = JoinSet::new();

        for request in requests {
            let uploader = Arc::clone(&self);
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return 0,
                };
                match uploader.upload(&request).await {
                    Ok(inserted) => {
                        debug!(key = %request.key, inserted, "Image mirrored");
                        inserted
                    }
                    Err(e) => {
                        error!(key = %request.key, "Image upload failed: {}", e);
                        0
                    }
                }
            });
        }

        let mut inserted = 0;
        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(count) => inserted += count,
                Err(e) => error!("Upload task failed: {}", e),
            }
        }
        inserted
    }
}
