//! Coordinator behavior against in-memory collaborators.
//!
//! These exercise the real pipeline code paths: retry pass, fetch, policy
//! filter, persist, publish-set computation, per-item publish isolation,
//! and disk-ledger bookkeeping.

use std::sync::Arc;

use tempfile::TempDir;

use flash_core::{FlashFeed, PlayerAllowList, ProcessAll, ProcessPolicy};
use integration_tests::fixtures::{
    batch, enriched_flash, flash, flash_by, flashes, invalid_flash,
};
use integration_tests::mocks::{MockPublisher, MockSource, MockStore};
use worker::{ChangeDetector, Coordinator, DetectorConfig, FailureLedger, RunOutcome, SystemRandom};

struct Harness {
    store: MockStore,
    publisher: MockPublisher,
    source: MockSource,
    ledger: Arc<FailureLedger>,
    coordinator: Coordinator,
    _dir: TempDir,
}

fn harness(source: MockSource) -> Harness {
    harness_with_policy(source, Arc::new(ProcessAll))
}

fn harness_with_policy(source: MockSource, policy: Arc<dyn ProcessPolicy>) -> Harness {
    let dir = TempDir::new().unwrap();
    let store = MockStore::new();
    let publisher = MockPublisher::new();
    let ledger = Arc::new(FailureLedger::new(dir.path()));

    let coordinator = Coordinator::new(
        Arc::new(store.clone()),
        Arc::new(publisher.clone()),
        Arc::new(source.clone()),
        policy,
        ledger.clone(),
    );

    Harness {
        store,
        publisher,
        source,
        ledger,
        coordinator,
        _dir: dir,
    }
}

/// A batch whose flashes are already stored and enriched: it passes the
/// completeness check but contributes nothing to the publish set.
fn neutral_source(store: &MockStore) -> MockSource {
    let a = enriched_flash(900);
    let b = enriched_flash(901);
    store.seed(a.clone());
    store.seed(b.clone());
    MockSource::serving(batch(vec![a], vec![b]))
}

#[tokio::test]
async fn fresh_batch_is_stored_and_published() {
    let h = harness(MockSource::serving(batch(flashes(1, 3), flashes(4, 2))));

    let summary = h.coordinator.run().await;

    assert_eq!(summary.outcome, RunOutcome::Completed);
    assert_eq!(summary.fetched, 5);
    assert_eq!(summary.stored, 5);
    assert_eq!(summary.published, 5);
    assert_eq!(summary.publish_failures, 0);
    assert_eq!(h.store.row_count(), 5);
    assert_eq!(h.ledger.pending_count().await, 0);
}

#[tokio::test]
async fn publish_set_includes_new_and_unenriched_rows_only() {
    // 3 pre-existing rows still waiting on the pinning service, 2 already
    // enriched (and therefore already published).
    let store_seed = MockStore::new();
    for id in 6..=8 {
        store_seed.seed(flash(id));
    }
    for id in 9..=10 {
        store_seed.seed(enriched_flash(id));
    }

    let fetched_existing: Vec<_> = (6..=10).map(flash).collect();
    let source = MockSource::serving(batch(flashes(1, 5), fetched_existing));

    let dir = TempDir::new().unwrap();
    let publisher = MockPublisher::new();
    let ledger = Arc::new(FailureLedger::new(dir.path()));
    let coordinator = Coordinator::new(
        Arc::new(store_seed.clone()),
        Arc::new(publisher.clone()),
        Arc::new(source),
        Arc::new(ProcessAll),
        ledger,
    );

    let summary = coordinator.run().await;

    assert_eq!(summary.stored, 5);
    assert_eq!(summary.published, 8);

    let mut ids = publisher.published_ids();
    ids.sort();
    assert_eq!(ids, vec![1, 2, 3, 4, 5, 6, 7, 8]);
}

#[tokio::test]
async fn one_failing_publish_does_not_roll_back_siblings() {
    let h = harness(MockSource::serving(batch(flashes(1, 3), flashes(4, 3))));
    h.publisher.fail_for([2, 5]);

    let summary = h.coordinator.run().await;

    assert_eq!(summary.outcome, RunOutcome::Completed);
    assert_eq!(summary.stored, 6);
    assert_eq!(summary.published, 4);
    assert_eq!(summary.publish_failures, 2);

    // every row landed regardless of publish failures
    assert_eq!(h.store.row_count(), 6);

    // exactly the failed subset is ledgered
    let pending = h.ledger.list_pending().await;
    assert_eq!(pending.len(), 1);
    let mut failed_ids: Vec<i64> = pending[0].batch.flashes.iter().map(|f| f.flash_id).collect();
    failed_ids.sort();
    assert_eq!(failed_ids, vec![2, 5]);
    assert_eq!(pending[0].batch.reason, "publish failed");
}

#[tokio::test]
async fn retry_pass_converges_and_clears_the_ledger() {
    let store = MockStore::new();
    let source = neutral_source(&store);

    let dir = TempDir::new().unwrap();
    let publisher = MockPublisher::new();
    let ledger = Arc::new(FailureLedger::new(dir.path()));
    ledger.persist(&flashes(100, 4), "publish failed").await;

    let coordinator = Coordinator::new(
        Arc::new(store),
        Arc::new(publisher.clone()),
        Arc::new(source),
        Arc::new(ProcessAll),
        ledger.clone(),
    );

    let summary = coordinator.run().await;

    assert_eq!(summary.outcome, RunOutcome::Completed);
    assert_eq!(summary.retried, 4);
    assert_eq!(publisher.publish_count(), 4);

    let mut ids = publisher.published_ids();
    ids.sort();
    assert_eq!(ids, vec![100, 101, 102, 103]);
    assert_eq!(ledger.pending_count().await, 0);
}

#[tokio::test]
async fn partial_retry_repersists_only_the_still_failing_subset() {
    let store = MockStore::new();
    let source = neutral_source(&store);

    let dir = TempDir::new().unwrap();
    let publisher = MockPublisher::new();
    publisher.fail_for([202, 203]);

    let ledger = Arc::new(FailureLedger::new(dir.path()));
    ledger.persist(&flashes(200, 4), "publish failed").await;
    let original_id = ledger.list_pending().await[0].envelope_id.clone();

    let coordinator = Coordinator::new(
        Arc::new(store),
        Arc::new(publisher.clone()),
        Arc::new(source),
        Arc::new(ProcessAll),
        ledger.clone(),
    );

    coordinator.run().await;

    // the original envelope is gone; one new envelope holds exactly the
    // still-failing flashes
    let pending = ledger.list_pending().await;
    assert_eq!(pending.len(), 1);
    assert_ne!(pending[0].envelope_id, original_id);
    assert_eq!(pending[0].batch.reason, "publish failed on retry");
    let mut failed_ids: Vec<i64> = pending[0].batch.flashes.iter().map(|f| f.flash_id).collect();
    failed_ids.sort();
    assert_eq!(failed_ids, vec![202, 203]);

    // downstream recovers; next run drains the rest
    publisher.recover_all();
    coordinator.run().await;
    assert_eq!(ledger.pending_count().await, 0);

    let mut ids = publisher.published_ids();
    ids.sort();
    assert_eq!(ids, vec![200, 201, 202, 203]);
}

#[tokio::test]
async fn fetch_failure_ends_the_run_without_side_effects() {
    for source in [
        MockSource::failing("HTTP 503"),
        MockSource::empty(),
        // missing required category
        MockSource::serving(batch(flashes(1, 2), vec![])),
    ] {
        let h = harness(source);
        let summary = h.coordinator.run().await;

        assert_eq!(summary.outcome, RunOutcome::FetchFailed);
        assert_eq!(h.store.row_count(), 0);
        assert_eq!(h.publisher.publish_count(), 0);
        assert_eq!(h.ledger.pending_count().await, 0);
    }
}

#[tokio::test]
async fn store_failure_ledgers_the_whole_batch_and_recovers() {
    let h = harness(MockSource::serving(batch(flashes(1, 2), flashes(3, 2))));
    h.store.set_fail_inserts(true);

    let summary = h.coordinator.run().await;

    assert_eq!(summary.outcome, RunOutcome::StoreFailed);
    assert_eq!(h.publisher.publish_count(), 0);

    let pending = h.ledger.list_pending().await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].batch.flashes.len(), 4);
    assert!(pending[0].batch.reason.starts_with("store write failed"));

    // store comes back; the next run replays the ledger
    h.store.set_fail_inserts(false);
    let summary = h.coordinator.run().await;

    assert_eq!(summary.outcome, RunOutcome::Completed);
    assert_eq!(summary.retried, 4);
    assert_eq!(h.store.row_count(), 4);
    assert_eq!(h.ledger.pending_count().await, 0);
    for id in 1..=4 {
        assert!(h.store.contains(id));
    }
}

#[tokio::test]
async fn invalid_records_never_reach_the_store() {
    let h = harness(MockSource::serving(batch(
        vec![invalid_flash()],
        flashes(1, 9),
    )));

    let summary = h.coordinator.run().await;

    assert_eq!(summary.fetched, 10);
    assert_eq!(summary.stored, 9);
    assert_eq!(summary.published, 9);
    assert_eq!(h.store.row_count(), 9);
    assert!(!h.store.contains(-1));
    // validation failures are dropped, not ledgered
    assert_eq!(h.ledger.pending_count().await, 0);
}

#[tokio::test]
async fn policy_gates_the_restricted_feed() {
    let source = MockSource::serving(batch(
        vec![flash_by(1, "stranger")],
        vec![flash_by(2, "AVA"), flash_by(3, "bob")],
    ));
    let policy = Arc::new(PlayerAllowList::new(
        FlashFeed::Paris,
        vec!["ava".to_string()],
    ));
    let h = harness_with_policy(source, policy);

    let summary = h.coordinator.run().await;

    assert_eq!(summary.fetched, 3);
    assert_eq!(summary.stored, 2);
    assert!(h.store.contains(1));
    assert!(h.store.contains(2));
    assert!(!h.store.contains(3));
}

#[tokio::test]
async fn unchanged_counter_skips_store_and_publish_work() {
    let dir = TempDir::new().unwrap();
    let store = MockStore::new();
    let publisher = MockPublisher::new();
    let source = MockSource::serving(batch(flashes(1, 2), flashes(3, 2)));
    let ledger = Arc::new(FailureLedger::new(dir.path()));

    // detector that never pre-skips (zero probabilities) but still
    // compares counters
    let detector = Arc::new(ChangeDetector::new(
        DetectorConfig {
            enabled: true,
            peak_start_hour: 0,
            peak_end_hour: 24,
            off_peak_skip: 0.0,
            streak_step: 0.0,
            max_skip: 0.0,
        },
        Box::new(SystemRandom::new()),
    ));

    let coordinator = Coordinator::new(
        Arc::new(store.clone()),
        Arc::new(publisher.clone()),
        Arc::new(source.clone()),
        Arc::new(ProcessAll),
        ledger,
    )
    .with_detector(detector);

    let first = coordinator.run().await;
    assert_eq!(first.outcome, RunOutcome::Completed);
    let published_after_first = publisher.publish_count();

    // same batch, same counter: the second run does no store/publish work
    let second = coordinator.run().await;
    assert_eq!(second.outcome, RunOutcome::SkippedUnchanged);
    assert_eq!(publisher.publish_count(), published_after_first);
    assert_eq!(store.insert_calls(), 1);
}

#[tokio::test]
async fn second_run_inserts_nothing_for_known_ids() {
    let h = harness(MockSource::serving(batch(flashes(1, 2), flashes(3, 2))));

    let first = h.coordinator.run().await;
    assert_eq!(first.stored, 4);

    let second = h.coordinator.run().await;
    assert_eq!(second.stored, 0);
    assert_eq!(h.store.row_count(), 4);
}
