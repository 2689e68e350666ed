//! Redpanda health checks.

use std::collections::HashSet;

use rskafka::client::ClientBuilder;
use tracing::{debug, error};

use crate::config::RedpandaConfig;

/// Check Redpanda connection health.
pub async fn check_connection(config: &RedpandaConfig) -> bool {
    let connection = config.broker_string();

    match ClientBuilder::new(vec![connection]).build().await {
        Ok(client) => match client.list_topics().await {
            Ok(topics) => {
                debug!(topics = topics.len(), "Redpanda connection healthy");
                true
            }
            Err(e) => {
                error!("Failed to list Redpanda topics: {}", e);
                false
            }
        },
        Err(e) => {
            error!("Failed to connect to Redpanda: {}", e);
            false
        }
    }
}

/// Check that the configured publish topic exists.
pub async fn verify_topic(config: &RedpandaConfig) -> bool {
    let connection = config.broker_string();

    match ClientBuilder::new(vec![connection]).build().await {
        Ok(client) => match client.list_topics().await {
            Ok(topics) => {
                let existing: HashSet<_> = topics.iter().map(|t| t.name.as_str()).collect();
                existing.contains(config.topic.as_str())
            }
            Err(_) => false,
        },
        Err(_) => false,
    }
}
