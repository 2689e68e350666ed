//! Unified error types for the flashline pipeline.
//!
//! Each variant tags one failure class so the coordinator can dispatch on
//! kind instead of inspecting messages:
//! - retryable failures end up in the disk ledger and are retried next run
//! - permanent failures are logged and dropped

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the flashline pipeline.
#[derive(Debug, Error)]
pub enum Error {
    /// Upstream fetch failed or returned a partial batch.
    ///
    /// Fatal for the run; nothing was fetched, so there is nothing to
    /// ledger. The next scheduled run retries implicitly.
    #[error("upstream fetch failed: {0}")]
    Fetch(String),

    /// Batch-level store write failure after validation passed.
    ///
    /// The attempted batch is persisted whole to the disk ledger.
    #[error("store write failed: {0}")]
    Store(String),

    /// A single row failed the per-row insert fallback.
    ///
    /// Permanent: the row already passed validation, so this is a true
    /// constraint violation. Dropped, never ledgered.
    #[error("flash {flash_id} rejected by store: {reason}")]
    RowRejected { flash_id: i64, reason: String },

    /// Publishing one flash to the queue failed.
    #[error("publish failed for flash {flash_id}: {reason}")]
    Publish { flash_id: i64, reason: String },

    /// Disk ledger I/O failure. Logged at the ledger boundary, never
    /// propagated into the pipeline.
    #[error("ledger error: {0}")]
    Ledger(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a fetch error.
    pub fn fetch(msg: impl Into<String>) -> Self {
        Self::Fetch(msg.into())
    }

    /// Create a batch-level store error.
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a per-item publish error.
    pub fn publish(flash_id: i64, reason: impl Into<String>) -> Self {
        Self::Publish {
            flash_id,
            reason: reason.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether a later attempt can plausibly succeed.
    ///
    /// Retryable failures are persisted to the disk ledger; permanent ones
    /// (validation, true constraint violations) are dropped with a log line.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Fetch(_) | Self::Store(_) | Self::Publish { .. } | Self::Internal(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(Error::store("pool timeout").is_retryable());
        assert!(Error::publish(7, "broker down").is_retryable());
        assert!(Error::fetch("HTTP 503").is_retryable());
        assert!(!Error::RowRejected {
            flash_id: 7,
            reason: "fk violation".into()
        }
        .is_retryable());
        assert!(!Error::Config("missing broker".into()).is_retryable());
    }
}
