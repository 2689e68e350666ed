//! Redpanda publish adapter for the flashline pipeline.
//!
//! One record per publish call, no accumulator: the coordinator isolates
//! per-flash failures itself and must never lose N-1 successes to one bad
//! record hidden inside a bulk produce.

pub mod config;
pub mod health;
pub mod producer;

pub use config::*;
pub use producer::*;
