//! Internal telemetry for the flashline pipeline.
//!
//! Structured logging via tracing, in-memory metrics for run summaries,
//! and a small component health registry. No external exporters.

pub mod health;
pub mod metrics;
pub mod tracing_setup;

pub use health::{health, ComponentHealth, HealthReport, HealthStatus};
pub use metrics::{metrics, MetricsSnapshot, PipelineMetrics};
pub use tracing_setup::{init_tracing, init_tracing_from_env, TracingConfig};
