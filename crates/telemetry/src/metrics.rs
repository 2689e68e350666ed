//! In-memory metrics for the pipeline.
//!
//! Counters accumulate across runs inside one process; `snapshot()` feeds
//! the periodic observability log line. Nothing is exported.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A counter metric.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// A gauge metric (can go up or down).
#[derive(Debug, Default)]
pub struct Gauge(AtomicU64);

impl Gauge {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn set(&self, val: u64) {
        self.0.store(val, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Histogram for latency tracking, in milliseconds.
#[derive(Debug)]
pub struct Histogram {
    /// Buckets: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 5s, 10s
    buckets: [AtomicU64; 11],
    sum: AtomicU64,
    count: AtomicU64,
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl Histogram {
    const BUCKET_BOUNDS: [u64; 11] = [1, 5, 10, 25, 50, 100, 250, 500, 1000, 5000, 10000];

    pub fn new() -> Self {
        Self {
            buckets: Default::default(),
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Records a value in milliseconds.
    pub fn observe(&self, ms: u64) {
        self.sum.fetch_add(ms, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        for (i, &bound) in Self::BUCKET_BOUNDS.iter().enumerate() {
            if ms <= bound {
                self.buckets[i].fetch_add(1, Ordering::Relaxed);
                return;
            }
        }
        // Value exceeds all buckets, add to last
        self.buckets[10].fetch_add(1, Ordering::Relaxed);
    }

    pub fn mean_ms(&self) -> f64 {
        let count = self.count.load(Ordering::Relaxed);
        if count == 0 {
            return 0.0;
        }
        self.sum.load(Ordering::Relaxed) as f64 / count as f64
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

/// All pipeline metrics.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    /// Flashes pulled from the upstream API.
    pub flashes_fetched: Counter,
    /// Rows newly inserted into the store.
    pub flashes_stored: Counter,
    /// Flashes pushed onto the queue.
    pub flashes_published: Counter,
    /// Per-item publish failures.
    pub publish_failures: Counter,
    /// Batch-level store failures.
    pub store_failures: Counter,
    /// Records dropped by validation.
    pub validation_failures: Counter,
    /// Images mirrored into the object store.
    pub images_uploaded: Counter,
    /// Completed pipeline runs.
    pub runs_completed: Counter,
    /// Runs skipped by the change detector.
    pub runs_skipped: Counter,
    /// Envelopes currently waiting in the disk ledger.
    pub ledger_pending: Gauge,
    /// Store insert latency.
    pub store_latency_ms: Histogram,
    /// Per-publish queue latency.
    pub publish_latency_ms: Histogram,
}

/// Point-in-time snapshot for the observability log line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub at: DateTime<Utc>,
    pub flashes_fetched: u64,
    pub flashes_stored: u64,
    pub flashes_published: u64,
    pub publish_failures: u64,
    pub store_failures: u64,
    pub validation_failures: u64,
    pub images_uploaded: u64,
    pub runs_completed: u64,
    pub runs_skipped: u64,
    pub ledger_pending: u64,
    pub store_latency_mean_ms: f64,
    pub publish_latency_mean_ms: f64,
}

impl PipelineMetrics {
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            at: Utc::now(),
            flashes_fetched: self.flashes_fetched.get(),
            flashes_stored: self.flashes_stored.get(),
            flashes_published: self.flashes_published.get(),
            publish_failures: self.publish_failures.get(),
            store_failures: self.store_failures.get(),
            validation_failures: self.validation_failures.get(),
            images_uploaded: self.images_uploaded.get(),
            runs_completed: self.runs_completed.get(),
            runs_skipped: self.runs_skipped.get(),
            ledger_pending: self.ledger_pending.get(),
            store_latency_mean_ms: self.store_latency_ms.mean_ms(),
            publish_latency_mean_ms: self.publish_latency_ms.mean_ms(),
        }
    }
}

/// Global metrics instance.
pub fn metrics() -> &'static PipelineMetrics {
    static METRICS: OnceLock<PipelineMetrics> = OnceLock::new();
    METRICS.get_or_init(PipelineMetrics::default)
}
