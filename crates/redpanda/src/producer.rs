//! Redpanda producer using rskafka.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rskafka::client::{
    partition::{Compression, UnknownTopicHandling},
    ClientBuilder,
};
use rskafka::record::Record;
use tokio::sync::RwLock;
use tracing::{debug, error};

use flash_core::{Error, Flash, Result};
use telemetry::metrics;

use crate::config::RedpandaConfig;

/// Downstream queue contract: one call per flash, success or failure.
///
/// No implicit batching — callers own failure isolation across a batch.
#[async_trait]
pub trait FlashPublisher: Send + Sync {
    async fn publish(&self, flash: &Flash) -> Result<()>;

    fn is_healthy(&self) -> bool {
        true
    }
}

/// Redpanda-backed publisher.
pub struct Producer {
    config: RedpandaConfig,
    /// Cached partition clients per topic
    clients: RwLock<BTreeMap<String, Arc<rskafka::client::partition::PartitionClient>>>,
}

impl Producer {
    /// Creates a new producer. Connections are established lazily on the
    /// first publish.
    pub fn new(config: RedpandaConfig) -> Self {
        Self {
            config,
            clients: RwLock::new(BTreeMap::new()),
        }
    }

    /// Gets or creates a partition client for a topic.
    async fn get_client(
        &self,
        topic: &str,
        partition: i32,
    ) -> Result<Arc<rskafka::client::partition::PartitionClient>> {
        let key = format!("{}:{}", topic, partition);

        // Check cache first
        {
            let clients = self.clients.read().await;
            if let Some(client) = clients.get(&key) {
                return Ok(client.clone());
            }
        }

        // Create new client
        let connection = self.config.broker_string();
        let client = ClientBuilder::new(vec![connection])
            .build()
            .await
            .map_err(|e| Error::internal(format!("Failed to connect: {}", e)))?;

        let partition_client = client
            .partition_client(topic.to_string(), partition, UnknownTopicHandling::Error)
            .await
            .map_err(|e| Error::internal(format!("Failed to get partition client: {}", e)))?;

        let partition_client = Arc::new(partition_client);

        // Cache it
        {
            let mut clients = self.clients.write().await;
            clients.insert(key, partition_client.clone());
        }

        Ok(partition_client)
    }

    fn compression(&self) -> Compression {
        match self.config.compression.as_str() {
            "gzip" => Compression::Gzip,
            "snappy" => Compression::Snappy,
            "lz4" => Compression::Lz4,
            "zstd" => Compression::Zstd,
            _ => Compression::NoCompression,
        }
    }
}

#[async_trait]
impl FlashPublisher for Producer {
    /// Publishes a single flash as one record, keyed by `flash_id`.
    async fn publish(&self, flash: &Flash) -> Result<()> {
        let topic = &self.config.topic;
        let start = std::time::Instant::now();

        let client = self.get_client(topic, 0).await?;

        let payload = serde_json::to_vec(flash)?;
        let record = Record {
            key: Some(flash.flash_id.to_string().into_bytes()),
            value: Some(payload),
            headers: BTreeMap::new(),
            timestamp: Utc::now(),
        };

        match client.produce(vec![record], self.compression()).await {
            Ok(_offsets) => {
                let elapsed = start.elapsed();
                metrics().flashes_published.inc();
                metrics()
                    .publish_latency_ms
                    .observe(elapsed.as_millis() as u64);

                debug!(
                    topic = %topic,
                    flash_id = flash.flash_id,
                    latency_ms = %elapsed.as_millis(),
                    "Published flash"
                );
                Ok(())
            }
            Err(e) => {
                error!(flash_id = flash.flash_id, "Failed to publish flash: {}", e);
                metrics().publish_failures.inc();
                Err(Error::publish(flash.flash_id, e.to_string()))
            }
        }
    }
}
