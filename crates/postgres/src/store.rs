//! The store trait the coordinator depends on, and its Postgres impl.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use flash_core::{Flash, Result};

use crate::client::PgStore;
use crate::{insert, query};

/// Authoritative flash persistence.
#[async_trait]
pub trait FlashStore: Send + Sync {
    /// Validate and insert a batch; returns rows actually inserted.
    /// Conflicting ids are a no-op, not an error.
    async fn insert_batch(&self, flashes: Vec<Flash>) -> Result<Vec<Flash>>;

    /// Current stored state of the given ids. Missing ids are absent from
    /// the result, never an error.
    async fn get_by_ids(&self, ids: &[i64]) -> Result<Vec<Flash>>;

    /// Flashes at or after `since`, newest first, optionally restricted to
    /// a set of players (case-insensitive).
    async fn get_since(
        &self,
        since: DateTime<Utc>,
        players: Option<&[String]>,
    ) -> Result<Vec<Flash>>;
}

/// Postgres-backed [`FlashStore`].
#[derive(Clone)]
pub struct PgFlashStore {
    client: PgStore,
}

impl PgFlashStore {
    pub fn new(client: PgStore) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FlashStore for PgFlashStore {
    async fn insert_batch(&self, flashes: Vec<Flash>) -> Result<Vec<Flash>> {
        insert::insert_batch(self.client.pool(), flashes).await
    }

    async fn get_by_ids(&self, ids: &[i64]) -> Result<Vec<Flash>> {
        query::get_by_ids(self.client.pool(), ids).await
    }

    async fn get_since(
        &self,
        since: DateTime<Utc>,
        players: Option<&[String]>,
    ) -> Result<Vec<Flash>> {
        query::get_since(self.client.pool(), since, players).await
    }
}
