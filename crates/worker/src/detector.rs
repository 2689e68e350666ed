//! Change detection and polling backoff.
//!
//! Two independent gates in front of the pipeline:
//! - a probabilistic pre-poll skip (off-peak hours, escalating with the
//!   unchanged-counter streak) that reduces pressure on the upstream API
//! - a counter comparison after a fetch that skips store/publish work when
//!   the source reports nothing new
//!
//! The probability math is a pure function and randomness comes from an
//! injectable source, so tests are deterministic.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Timelike, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Uniform random source in `[0, 1)`.
pub trait RandomSource: Send + Sync {
    fn roll(&self) -> f64;
}

/// xorshift64* generator seeded from the clock. Not cryptographic; only
/// spreads poll skips.
pub struct SystemRandom {
    state: AtomicU64,
}

impl SystemRandom {
    pub fn new() -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0x9E3779B97F4A7C15)
            | 1;
        Self {
            state: AtomicU64::new(seed),
        }
    }
}

impl Default for SystemRandom {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomSource for SystemRandom {
    fn roll(&self) -> f64 {
        let mut next = 0u64;
        let _ = self
            .state
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |mut x| {
                x ^= x >> 12;
                x ^= x << 25;
                x ^= x >> 27;
                next = x.wrapping_mul(0x2545F4914F6CDD1D);
                Some(x)
            });
        (next >> 11) as f64 / (1u64 << 53) as f64
    }
}

/// Detector configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Master switch; disabled means every run polls and processes.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Start of the peak window, UTC hour (inclusive).
    #[serde(default = "default_peak_start_hour")]
    pub peak_start_hour: u32,
    /// End of the peak window, UTC hour (exclusive).
    #[serde(default = "default_peak_end_hour")]
    pub peak_end_hour: u32,
    /// Base skip probability outside the peak window.
    #[serde(default = "default_off_peak_skip")]
    pub off_peak_skip: f64,
    /// Added skip probability per consecutive unchanged-counter run.
    #[serde(default = "default_streak_step")]
    pub streak_step: f64,
    /// Upper bound on the combined skip probability.
    #[serde(default = "default_max_skip")]
    pub max_skip: f64,
}

fn default_enabled() -> bool {
    true
}

fn default_peak_start_hour() -> u32 {
    7
}

fn default_peak_end_hour() -> u32 {
    22
}

fn default_off_peak_skip() -> f64 {
    0.3
}

fn default_streak_step() -> f64 {
    0.1
}

fn default_max_skip() -> f64 {
    0.8
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            peak_start_hour: default_peak_start_hour(),
            peak_end_hour: default_peak_end_hour(),
            off_peak_skip: default_off_peak_skip(),
            streak_step: default_streak_step(),
            max_skip: default_max_skip(),
        }
    }
}

impl DetectorConfig {
    fn in_peak(&self, hour: u32) -> bool {
        if self.peak_start_hour <= self.peak_end_hour {
            hour >= self.peak_start_hour && hour < self.peak_end_hour
        } else {
            // window wraps midnight
            hour >= self.peak_start_hour || hour < self.peak_end_hour
        }
    }
}

/// Probability of skipping a poll at `hour` with the given unchanged
/// streak. Pure; the caller rolls the dice.
pub fn skip_probability(hour: u32, unchanged_streak: u32, config: &DetectorConfig) -> f64 {
    let base = if config.in_peak(hour) {
        0.0
    } else {
        config.off_peak_skip
    };
    (base + config.streak_step * f64::from(unchanged_streak)).min(config.max_skip)
}

/// Result of comparing the upstream counter against the previous run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CounterChange {
    Changed,
    Unchanged { streak: u32 },
}

/// Tracks the upstream counter across runs and gates polling.
pub struct ChangeDetector {
    config: DetectorConfig,
    rng: Box<dyn RandomSource>,
    last_counter: Mutex<Option<String>>,
    unchanged_streak: AtomicU32,
}

impl ChangeDetector {
    pub fn new(config: DetectorConfig, rng: Box<dyn RandomSource>) -> Self {
        Self {
            config,
            rng,
            last_counter: Mutex::new(None),
            unchanged_streak: AtomicU32::new(0),
        }
    }

    pub fn unchanged_streak(&self) -> u32 {
        self.unchanged_streak.load(Ordering::Relaxed)
    }

    /// Whether this run should skip polling entirely.
    pub fn should_skip_poll(&self, now: DateTime<Utc>) -> bool {
        if !self.config.enabled {
            return false;
        }
        let probability =
            skip_probability(now.hour(), self.unchanged_streak(), &self.config);
        if probability <= 0.0 {
            return false;
        }
        let roll = self.rng.roll();
        debug!(probability, roll, "Poll skip roll");
        roll < probability
    }

    /// Compare the freshly observed counter with the last seen one.
    ///
    /// A missing counter (empty batch edge) counts as changed — without a
    /// value there is nothing to prove the source is idle.
    pub fn observe(&self, counter: Option<&str>) -> CounterChange {
        if !self.config.enabled {
            return CounterChange::Changed;
        }

        let Some(counter) = counter else {
            return CounterChange::Changed;
        };

        let mut last = self.last_counter.lock();
        match last.as_deref() {
            Some(previous) if previous == counter => {
                let streak = self.unchanged_streak.fetch_add(1, Ordering::Relaxed) + 1;
                CounterChange::Unchanged { streak }
            }
            _ => {
                *last = Some(counter.to_string());
                self.unchanged_streak.store(0, Ordering::Relaxed);
                CounterChange::Changed
            }
        }
    }
}
