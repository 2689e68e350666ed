//! Disk-backed retry ledger for failed batches.
//!
//! One JSON envelope per failure, immutable once written. A retry pass
//! acknowledges an envelope only by deleting the whole file; a partially
//! successful retry re-persists the still-failing subset as a fresh
//! envelope instead of editing the old one.
//!
//! Ledger I/O never fails the pipeline: losing a retry record is
//! acceptable, crashing a run is not.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use flash_core::Flash;
use telemetry::metrics;

/// Persisted envelope for one failed batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedBatch {
    pub recorded_at: DateTime<Utc>,
    pub reason: String,
    pub flashes: Vec<Flash>,
}

/// An envelope on disk, identified by its filename.
#[derive(Debug, Clone)]
pub struct LedgerEntry {
    pub envelope_id: String,
    pub batch: FailedBatch,
}

/// Append-only directory of failure envelopes.
pub struct FailureLedger {
    dir: PathBuf,
}

impl FailureLedger {
    /// Opens the ledger, creating its directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        if let Err(e) = std::fs::create_dir_all(&dir) {
            error!(dir = %dir.display(), "Failed to create ledger directory: {}", e);
        }
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes one new envelope. Empty batches are a no-op. Write failures
    /// are logged and swallowed.
    pub async fn persist(&self, flashes: &[Flash], reason: &str) {
        if flashes.is_empty() {
            return;
        }

        let batch = FailedBatch {
            recorded_at: Utc::now(),
            reason: reason.to_string(),
            flashes: flashes.to_vec(),
        };

        let filename = Self::envelope_filename(&batch.recorded_at);
        let path = self.dir.join(&filename);

        let payload = match serde_json::to_vec_pretty(&batch) {
            Ok(p) => p,
            Err(e) => {
                error!("Failed to serialize failure envelope: {}", e);
                return;
            }
        };

        match tokio::fs::write(&path, payload).await {
            Ok(()) => {
                let ids: Vec<i64> = batch.flashes.iter().map(|f| f.flash_id).collect();
                info!(
                    envelope = %filename,
                    count = ids.len(),
                    reason,
                    flash_ids = ?ids,
                    "Persisted failed flashes"
                );
            }
            Err(e) => {
                error!(envelope = %filename, "Failed to persist flashes to disk: {}", e);
            }
        }

        metrics().ledger_pending.set(self.pending_count().await as u64);
    }

    /// All pending envelopes, newest first. Unreadable files are logged
    /// and skipped.
    pub async fn list_pending(&self) -> Vec<LedgerEntry> {
        let mut entries = Vec::new();

        let mut dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(d) => d,
            Err(e) => {
                error!(dir = %self.dir.display(), "Failed to read ledger directory: {}", e);
                return entries;
            }
        };

        loop {
            let file = match dir.next_entry().await {
                Ok(Some(file)) => file,
                Ok(None) => break,
                Err(e) => {
                    error!("Failed to walk ledger directory: {}", e);
                    break;
                }
            };

            let name = file.file_name().to_string_lossy().to_string();
            if !name.ends_with(".json") {
                continue;
            }

            match tokio::fs::read(file.path()).await {
                Ok(bytes) => match serde_json::from_slice::<FailedBatch>(&bytes) {
                    Ok(batch) => entries.push(LedgerEntry {
                        envelope_id: name,
                        batch,
                    }),
                    Err(e) => warn!(envelope = %name, "Skipping unreadable envelope: {}", e),
                },
                Err(e) => warn!(envelope = %name, "Skipping unreadable envelope: {}", e),
            }
        }

        entries.sort_by(|a, b| {
            (b.batch.recorded_at, &b.envelope_id).cmp(&(a.batch.recorded_at, &a.envelope_id))
        });
        entries
    }

    /// All pending flashes flattened: newest envelope first, in-envelope
    /// order preserved.
    pub async fn pending_flashes(&self) -> Vec<Flash> {
        self.list_pending()
            .await
            .into_iter()
            .flat_map(|entry| entry.batch.flashes)
            .collect()
    }

    /// Number of pending envelopes.
    pub async fn pending_count(&self) -> usize {
        match tokio::fs::read_dir(&self.dir).await {
            Ok(mut dir) => {
                let mut count = 0;
                while let Ok(Some(file)) = dir.next_entry().await {
                    if file.file_name().to_string_lossy().ends_with(".json") {
                        count += 1;
                    }
                }
                count
            }
            Err(_) => 0,
        }
    }

    /// Deletes one envelope after its flashes were republished.
    pub async fn clear(&self, envelope_id: &str) {
        let path = self.dir.join(envelope_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => info!(envelope = %envelope_id, "Cleared failure envelope"),
            Err(e) => error!(envelope = %envelope_id, "Failed to clear envelope: {}", e),
        }
        metrics().ledger_pending.set(self.pending_count().await as u64);
    }

    /// Deletes every envelope.
    pub async fn clear_all(&self) {
        let pending = self.list_pending().await;
        for entry in &pending {
            let path = self.dir.join(&entry.envelope_id);
            if let Err(e) = tokio::fs::remove_file(&path).await {
                error!(envelope = %entry.envelope_id, "Failed to clear envelope: {}", e);
            }
        }
        if !pending.is_empty() {
            info!(count = pending.len(), "Cleared all failure envelopes");
        }
        metrics().ledger_pending.set(self.pending_count().await as u64);
    }

    fn envelope_filename(recorded_at: &DateTime<Utc>) -> String {
        // Millisecond timestamp plus a short random suffix: two envelopes
        // written in the same instant must never collide, because an
        // envelope is only ever removed whole.
        let ts = recorded_at.format("%Y-%m-%dT%H-%M-%S-%3fZ");
        let suffix = Uuid::new_v4().simple().to_string();
        format!("failed-flashes-{}-{}.json", ts, &suffix[..8])
    }
}
