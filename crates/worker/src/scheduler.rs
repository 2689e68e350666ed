//! Interval scheduler for the ingestion pipeline.
//!
//! One loop, one await: runs are serialized by construction, so two
//! pipeline passes can never overlap even when a run overshoots the
//! interval.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tracing::info;

use crate::pipeline::Coordinator;

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Delay between pipeline runs.
    pub sync_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sync_interval: Duration::from_secs(300),
        }
    }
}

/// Drives the coordinator on a fixed interval.
pub struct Scheduler {
    config: SchedulerConfig,
    coordinator: Arc<Coordinator>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig, coordinator: Arc<Coordinator>) -> Self {
        Self {
            config,
            coordinator,
        }
    }

    /// Starts the run loop.
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        info!(
            interval_secs = self.config.sync_interval.as_secs(),
            "Starting flash sync scheduler"
        );

        tokio::spawn(async move {
            let mut ticker = interval(self.config.sync_interval);
            // A slow run delays the next tick instead of stacking ticks.
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                // run() contains its own failure handling; nothing escapes.
                let _summary = self.coordinator.run().await;
            }
        })
    }
}
