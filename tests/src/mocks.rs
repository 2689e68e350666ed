//! Mock implementations for testing.
//!
//! These implement the same traits the production collaborators do, so the
//! coordinator under test runs its real code paths against in-memory
//! state.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use flash_core::{partition, Error, Flash, FlashBatch, Result};
use postgres_store::FlashStore;
use redpanda::FlashPublisher;
use worker::FlashSource;

/// In-memory store mirroring `PgFlashStore` semantics: validation
/// partition, conflict no-op, lookups that never error on missing rows.
#[derive(Clone, Default)]
pub struct MockStore {
    rows: Arc<Mutex<BTreeMap<i64, Flash>>>,
    fail_inserts: Arc<Mutex<bool>>,
    insert_calls: Arc<Mutex<usize>>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seed a stored row without going through insert accounting.
    pub fn seed(&self, flash: Flash) {
        self.rows.lock().insert(flash.flash_id, flash);
    }

    pub fn row_count(&self) -> usize {
        self.rows.lock().len()
    }

    pub fn contains(&self, flash_id: i64) -> bool {
        self.rows.lock().contains_key(&flash_id)
    }

    pub fn insert_calls(&self) -> usize {
        *self.insert_calls.lock()
    }

    /// Make every insert fail with a batch-level store error.
    pub fn set_fail_inserts(&self, fail: bool) {
        *self.fail_inserts.lock() = fail;
    }
}

#[async_trait]
impl FlashStore for MockStore {
    async fn insert_batch(&self, flashes: Vec<Flash>) -> Result<Vec<Flash>> {
        *self.insert_calls.lock() += 1;

        if *self.fail_inserts.lock() {
            return Err(Error::store("mock store failure"));
        }

        let (valid, _rejected) = partition(flashes);

        let mut rows = self.rows.lock();
        let mut inserted = Vec::new();
        for flash in valid {
            if !rows.contains_key(&flash.flash_id) {
                rows.insert(flash.flash_id, flash.clone());
                inserted.push(flash);
            }
        }
        Ok(inserted)
    }

    async fn get_by_ids(&self, ids: &[i64]) -> Result<Vec<Flash>> {
        let rows = self.rows.lock();
        Ok(ids.iter().filter_map(|id| rows.get(id).cloned()).collect())
    }

    async fn get_since(
        &self,
        since: DateTime<Utc>,
        players: Option<&[String]>,
    ) -> Result<Vec<Flash>> {
        let lowered: Option<HashSet<String>> =
            players.map(|p| p.iter().map(|s| s.to_lowercase()).collect());

        let mut found: Vec<Flash> = self
            .rows
            .lock()
            .values()
            .filter(|f| f.timestamp >= since.timestamp())
            .filter(|f| {
                lowered
                    .as_ref()
                    .map(|set| set.contains(&f.player.to_lowercase()))
                    .unwrap_or(true)
            })
            .cloned()
            .collect();
        found.sort_by_key(|f| std::cmp::Reverse(f.timestamp));
        Ok(found)
    }
}

/// Publisher that captures published flashes and fails on demand.
#[derive(Clone, Default)]
pub struct MockPublisher {
    published: Arc<Mutex<Vec<i64>>>,
    fail_ids: Arc<Mutex<HashSet<i64>>>,
    fail_all: Arc<Mutex<bool>>,
}

impl MockPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Published flash ids, in completion order.
    pub fn published_ids(&self) -> Vec<i64> {
        self.published.lock().clone()
    }

    pub fn publish_count(&self) -> usize {
        self.published.lock().len()
    }

    /// Fail publishes for these specific flashes.
    pub fn fail_for(&self, ids: impl IntoIterator<Item = i64>) {
        self.fail_ids.lock().extend(ids);
    }

    /// Stop failing a flash (downstream recovered).
    pub fn recover(&self, id: i64) {
        self.fail_ids.lock().remove(&id);
    }

    pub fn recover_all(&self) {
        self.fail_ids.lock().clear();
        *self.fail_all.lock() = false;
    }

    pub fn set_fail_all(&self, fail: bool) {
        *self.fail_all.lock() = fail;
    }
}

#[async_trait]
impl FlashPublisher for MockPublisher {
    async fn publish(&self, flash: &Flash) -> Result<()> {
        if *self.fail_all.lock() || self.fail_ids.lock().contains(&flash.flash_id) {
            return Err(Error::publish(flash.flash_id, "mock publish failure"));
        }
        self.published.lock().push(flash.flash_id);
        Ok(())
    }
}

/// Scripted upstream source.
#[derive(Clone)]
pub enum SourceBehavior {
    /// Serve this batch on every fetch.
    Batch(FlashBatch),
    /// Answer with no usable body.
    Empty,
    /// Fail the fetch outright.
    Fail(String),
}

#[derive(Clone)]
pub struct MockSource {
    behavior: Arc<Mutex<SourceBehavior>>,
    fetch_calls: Arc<Mutex<usize>>,
}

impl MockSource {
    pub fn serving(batch: FlashBatch) -> Self {
        Self {
            behavior: Arc::new(Mutex::new(SourceBehavior::Batch(batch))),
            fetch_calls: Arc::new(Mutex::new(0)),
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            behavior: Arc::new(Mutex::new(SourceBehavior::Fail(reason.into()))),
            fetch_calls: Arc::new(Mutex::new(0)),
        }
    }

    pub fn empty() -> Self {
        Self {
            behavior: Arc::new(Mutex::new(SourceBehavior::Empty)),
            fetch_calls: Arc::new(Mutex::new(0)),
        }
    }

    pub fn set_behavior(&self, behavior: SourceBehavior) {
        *self.behavior.lock() = behavior;
    }

    pub fn fetch_calls(&self) -> usize {
        *self.fetch_calls.lock()
    }
}

#[async_trait]
impl FlashSource for MockSource {
    async fn fetch_batch(&self) -> Result<Option<FlashBatch>> {
        *self.fetch_calls.lock() += 1;
        match &*self.behavior.lock() {
            SourceBehavior::Batch(batch) => Ok(Some(batch.clone())),
            SourceBehavior::Empty => Ok(None),
            SourceBehavior::Fail(reason) => Err(Error::fetch(reason.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::flash;

    #[tokio::test]
    async fn mock_store_is_idempotent() {
        let store = MockStore::new();
        let first = store
            .insert_batch(vec![flash(1), flash(2)])
            .await
            .unwrap();
        assert_eq!(first.len(), 2);

        let second = store.insert_batch(vec![flash(1)]).await.unwrap();
        assert!(second.is_empty());
        assert_eq!(store.row_count(), 2);
    }

    #[tokio::test]
    async fn mock_publisher_fails_selected_ids() {
        let publisher = MockPublisher::new();
        publisher.fail_for([2]);

        assert!(publisher.publish(&flash(1)).await.is_ok());
        assert!(publisher.publish(&flash(2)).await.is_err());
        assert_eq!(publisher.published_ids(), vec![1]);
    }
}
