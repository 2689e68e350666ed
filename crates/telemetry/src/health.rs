//! Component health tracking.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

/// Health status for the process as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Health state of one external collaborator.
#[derive(Debug)]
pub struct ComponentHealth {
    name: &'static str,
    healthy: AtomicBool,
    message: parking_lot::RwLock<Option<String>>,
}

impl ComponentHealth {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            healthy: AtomicBool::new(false),
            message: parking_lot::RwLock::new(None),
        }
    }

    pub fn set_healthy(&self) {
        self.healthy.store(true, Ordering::Relaxed);
        *self.message.write() = None;
    }

    pub fn set_unhealthy(&self, msg: impl Into<String>) {
        self.healthy.store(false, Ordering::Relaxed);
        *self.message.write() = Some(msg.into());
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn message(&self) -> Option<String> {
        self.message.read().clone()
    }
}

/// Health registry for the pipeline's collaborators.
#[derive(Debug)]
pub struct HealthRegistry {
    /// Publish queue (Redpanda).
    pub queue: ComponentHealth,
    /// Relational store (Postgres).
    pub store: ComponentHealth,
    /// Upstream flash API.
    pub source: ComponentHealth,
}

impl HealthRegistry {
    const fn new() -> Self {
        Self {
            queue: ComponentHealth::new("queue"),
            store: ComponentHealth::new("store"),
            source: ComponentHealth::new("source"),
        }
    }

    /// Aggregate status: the store is load-bearing, the queue and source
    /// only degrade (their failures land in the ledger / retry next run).
    pub fn status(&self) -> HealthStatus {
        if !self.store.is_healthy() {
            return HealthStatus::Unhealthy;
        }
        if self.queue.is_healthy() && self.source.is_healthy() {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        }
    }

    pub fn report(&self) -> HealthReport {
        HealthReport {
            status: self.status(),
            components: [&self.queue, &self.store, &self.source]
                .iter()
                .map(|c| ComponentHealthReport {
                    name: c.name().to_string(),
                    healthy: c.is_healthy(),
                    message: c.message(),
                })
                .collect(),
        }
    }
}

/// Aggregated health report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub components: Vec<ComponentHealthReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealthReport {
    pub name: String,
    pub healthy: bool,
    pub message: Option<String>,
}

/// Global health registry.
pub fn health() -> &'static HealthRegistry {
    static HEALTH: OnceLock<HealthRegistry> = OnceLock::new();
    HEALTH.get_or_init(HealthRegistry::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_outage_is_unhealthy() {
        let reg = HealthRegistry::new();
        reg.queue.set_healthy();
        reg.source.set_healthy();
        reg.store.set_unhealthy("connection refused");
        assert_eq!(reg.status(), HealthStatus::Unhealthy);
    }

    #[test]
    fn queue_outage_only_degrades() {
        let reg = HealthRegistry::new();
        reg.store.set_healthy();
        reg.source.set_healthy();
        reg.queue.set_unhealthy("broker unreachable");
        assert_eq!(reg.status(), HealthStatus::Degraded);

        reg.queue.set_healthy();
        assert_eq!(reg.status(), HealthStatus::Healthy);
    }

    #[test]
    fn report_carries_messages() {
        let reg = HealthRegistry::new();
        reg.store.set_unhealthy("pool exhausted");
        let report = reg.report();
        let store = report
            .components
            .iter()
            .find(|c| c.name == "store")
            .unwrap();
        assert!(!store.healthy);
        assert_eq!(store.message.as_deref(), Some("pool exhausted"));
    }
}
