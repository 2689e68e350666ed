//! The ingestion coordinator.
//!
//! One run walks a fixed sequence: retry previously-failed batches, fetch
//! the latest upstream batch, filter it through the deployment policy,
//! persist what survives validation, work out which flashes must be
//! (re-)published, fan the publishes out with per-item isolation, and
//! persist whatever failed to the disk ledger. Every failure is caught
//! here: a run reports an outcome, it never takes the scheduler down.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use uuid::Uuid;

use flash_core::{Error, Flash, ProcessPolicy, Result};
use postgres_store::FlashStore;
use redpanda::FlashPublisher;
use telemetry::metrics;

use crate::detector::{ChangeDetector, CounterChange};
use crate::ledger::FailureLedger;
use crate::source::FlashSource;
use crate::uploader::ImageSync;

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    /// Pre-poll backoff gate fired; nothing was fetched.
    SkippedBackoff,
    /// Upstream counter unchanged; nothing new to process.
    SkippedUnchanged,
    /// Upstream fetch failed or was partial; retried next schedule.
    FetchFailed,
    /// The store rejected the batch; it is in the ledger now.
    StoreFailed,
}

/// Counters for one run, logged as a single summary line.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub outcome: RunOutcome,
    /// Flashes pulled out of the ledger and replayed.
    pub retried: usize,
    pub fetched: usize,
    pub stored: usize,
    pub published: usize,
    pub publish_failures: usize,
}

impl RunSummary {
    fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            outcome: RunOutcome::Completed,
            retried: 0,
            fetched: 0,
            stored: 0,
            published: 0,
            publish_failures: 0,
        }
    }

    /// Whether a one-shot invocation should exit non-zero.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.outcome,
            RunOutcome::FetchFailed | RunOutcome::StoreFailed
        )
    }
}

/// Whether a batch comes fresh from upstream or out of the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BatchContext {
    Fresh,
    Retry,
}

struct BatchOutcome {
    stored: usize,
    published: usize,
    publish_failures: usize,
}

/// Orchestrates one scheduled ingestion run.
pub struct Coordinator {
    store: Arc<dyn FlashStore>,
    publisher: Arc<dyn FlashPublisher>,
    source: Arc<dyn FlashSource>,
    policy: Arc<dyn ProcessPolicy>,
    ledger: Arc<FailureLedger>,
    detector: Option<Arc<ChangeDetector>>,
    uploader: Option<Arc<ImageSync>>,
    publish_concurrency: usize,
}

impl Coordinator {
    pub fn new(
        store: Arc<dyn FlashStore>,
        publisher: Arc<dyn FlashPublisher>,
        source: Arc<dyn FlashSource>,
        policy: Arc<dyn ProcessPolicy>,
        ledger: Arc<FailureLedger>,
    ) -> Self {
        Self {
            store,
            publisher,
            source,
            policy,
            ledger,
            detector: None,
            uploader: None,
            publish_concurrency: 8,
        }
    }

    pub fn with_detector(mut self, detector: Arc<ChangeDetector>) -> Self {
        self.detector = Some(detector);
        self
    }

    pub fn with_uploader(mut self, uploader: Arc<ImageSync>) -> Self {
        self.uploader = Some(uploader);
        self
    }

    pub fn with_publish_concurrency(mut self, concurrency: usize) -> Self {
        self.publish_concurrency = concurrency.max(1);
        self
    }

    /// Execute one full run. Never panics or returns an error — failures
    /// are folded into the summary and the ledger.
    pub async fn run(&self) -> RunSummary {
        let run_id = Uuid::new_v4();
        let mut summary = RunSummary::new(run_id);

        // Backoff gate fires before any I/O happens.
        if let Some(detector) = &self.detector {
            if detector.should_skip_poll(Utc::now()) {
                summary.outcome = RunOutcome::SkippedBackoff;
                metrics().runs_skipped.inc();
                info!(run_id = %run_id, "Run skipped by off-peak backoff");
                return summary;
            }
        }

        // Retry pass: replay everything the ledger holds before touching
        // new work, so failures drain in arrival order.
        self.retry_pending(&mut summary).await;

        // Fetch. A partial batch is an upstream outage, not an empty day.
        let batch = match self.source.fetch_batch().await {
            Ok(Some(batch)) if batch.is_complete() => batch,
            Ok(_) => {
                error!(run_id = %run_id, "Upstream returned an empty or partial batch");
                summary.outcome = RunOutcome::FetchFailed;
                self.log_summary(&summary);
                return summary;
            }
            Err(e) => {
                error!(run_id = %run_id, "Upstream fetch failed: {}", e);
                summary.outcome = RunOutcome::FetchFailed;
                self.log_summary(&summary);
                return summary;
            }
        };

        summary.fetched = batch.len();
        metrics().flashes_fetched.inc_by(batch.len() as u64);

        if let Some(detector) = &self.detector {
            if let CounterChange::Unchanged { streak } = detector.observe(batch.latest_counter())
            {
                summary.outcome = RunOutcome::SkippedUnchanged;
                metrics().runs_skipped.inc();
                info!(
                    run_id = %run_id,
                    streak,
                    "Upstream counter unchanged, skipping run"
                );
                return summary;
            }
        }

        // Policy filter: which of the fetched flashes this deployment cares
        // about.
        let accepted: Vec<Flash> = batch
            .into_tagged()
            .into_iter()
            .filter(|(feed, flash)| self.policy.should_process(*feed, flash))
            .map(|(_, flash)| flash)
            .collect();

        if accepted.is_empty() {
            info!(
                run_id = %run_id,
                fetched = summary.fetched,
                policy = self.policy.name(),
                "No flashes accepted by policy"
            );
            metrics().runs_completed.inc();
            return summary;
        }

        match self.process_batch(accepted, BatchContext::Fresh).await {
            Ok(outcome) => {
                summary.stored += outcome.stored;
                summary.published += outcome.published;
                summary.publish_failures += outcome.publish_failures;
            }
            Err(_) => {
                // Already ledgered and logged inside process_batch.
                summary.outcome = RunOutcome::StoreFailed;
            }
        }

        metrics().runs_completed.inc();
        self.log_summary(&summary);
        summary
    }

    /// Replay ledgered batches through the persist → publish pipeline.
    ///
    /// The policy filter is skipped here: the original feed categorization
    /// is lost once a batch hits the ledger.
    async fn retry_pending(&self, summary: &mut RunSummary) {
        let pending = self.ledger.list_pending().await;
        if pending.is_empty() {
            return;
        }

        let flashes: Vec<Flash> = pending
            .iter()
            .flat_map(|entry| entry.batch.flashes.clone())
            .collect();

        info!(
            envelopes = pending.len(),
            flashes = flashes.len(),
            "Retrying ledgered flashes"
        );
        summary.retried = flashes.len();

        match self.process_batch(flashes, BatchContext::Retry).await {
            Ok(outcome) => {
                summary.stored += outcome.stored;
                summary.published += outcome.published;
                summary.publish_failures += outcome.publish_failures;
            }
            Err(e) => {
                // The batch was re-persisted whole by process_batch; the
                // originals below are stale duplicates either way.
                warn!("Retry pass failed, batch re-ledgered: {}", e);
            }
        }

        // Acknowledge the consumed envelopes. Still-failing flashes were
        // re-persisted as new envelopes, so this never loses them.
        for entry in &pending {
            self.ledger.clear(&entry.envelope_id).await;
        }
    }

    /// Persist → compute publish set → publish → ledger failures.
    ///
    /// Returns `Err` only for batch-level store failures; the batch has
    /// already been written to the ledger when that happens.
    async fn process_batch(
        &self,
        flashes: Vec<Flash>,
        context: BatchContext,
    ) -> Result<BatchOutcome> {
        let attempted = flashes.clone();

        let inserted = match self.store.insert_batch(flashes).await {
            Ok(inserted) => inserted,
            Err(e) => {
                metrics().store_failures.inc();
                self.ledger
                    .persist(&attempted, &format!("store write failed: {}", e))
                    .await;
                return Err(e);
            }
        };

        if context == BatchContext::Fresh {
            self.mirror_images(&inserted).await;
        }

        let publish_set = match self.compute_publish_set(&attempted, &inserted).await {
            Ok(set) => set,
            Err(e) => {
                metrics().store_failures.inc();
                self.ledger
                    .persist(&attempted, &format!("publish-set lookup failed: {}", e))
                    .await;
                return Err(e);
            }
        };

        let (published, failed) = self.publish_all(publish_set).await;

        if !failed.is_empty() {
            let reason = match context {
                BatchContext::Fresh => "publish failed",
                BatchContext::Retry => "publish failed on retry",
            };
            self.ledger.persist(&failed, reason).await;
        }

        Ok(BatchOutcome {
            stored: inserted.len(),
            published,
            publish_failures: failed.len(),
        })
    }

    /// A flash must be published if it was just inserted, or if it was
    /// already stored but the pinning service has not attached a media ref
    /// yet — those were stored before enrichment caught up and their
    /// publish is still owed.
    async fn compute_publish_set(
        &self,
        attempted: &[Flash],
        inserted: &[Flash],
    ) -> Result<Vec<Flash>> {
        let inserted_ids: HashSet<i64> = inserted.iter().map(|f| f.flash_id).collect();

        let existing_ids: Vec<i64> = attempted
            .iter()
            .map(|f| f.flash_id)
            .filter(|id| !inserted_ids.contains(id))
            .collect();

        let existing = self.store.get_by_ids(&existing_ids).await?;

        let mut publish_set = inserted.to_vec();
        publish_set.extend(existing.into_iter().filter(|f| !f.is_enriched()));
        Ok(publish_set)
    }

    /// Publish every flash in the set, one call each, bounded concurrency.
    /// One flash's failure never cancels its siblings.
    async fn publish_all(&self, flashes: Vec<Flash>) -> (usize, Vec<Flash>) {
        if flashes.is_empty() {
            return (0, Vec::new());
        }

        let semaphore = Arc::new(Semaphore::new(self.publish_concurrency));
        let mut tasks = JoinSet::new();

        for flash in flashes {
            let publisher = Arc::clone(&self.publisher);
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let flash_id = flash.flash_id;
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return (flash, Err(Error::publish(flash_id, "semaphore closed")));
                    }
                };
                let result = publisher.publish(&flash).await;
                (flash, result)
            });
        }

        let mut published = 0;
        let mut failed = Vec::new();

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(()))) => published += 1,
                Ok((flash, Err(e))) => {
                    warn!(flash_id = flash.flash_id, "Publish failed: {}", e);
                    failed.push(flash);
                }
                Err(e) => error!("Publish task failed: {}", e),
            }
        }

        (published, failed)
    }

    async fn mirror_images(&self, inserted: &[Flash]) {
        let Some(uploader) = &self.uploader else {
            return;
        };
        if inserted.is_empty() {
            return;
        }

        let requests = uploader.requests_for(inserted);
        let uploaded = Arc::clone(uploader).upload_batch(requests).await;
        metrics().images_uploaded.inc_by(uploaded);
    }

    fn log_summary(&self, summary: &RunSummary) {
        info!(
            run_id = %summary.run_id,
            outcome = ?summary.outcome,
            retried = summary.retried,
            fetched = summary.fetched,
            stored = summary.stored,
            published = summary.published,
            publish_failures = summary.publish_failures,
            "Flash sync run finished"
        );
    }
}
