//! Postgres pool wrapper.
//!
//! The pool is built once at the composition root and passed down
//! explicitly; nothing in this crate caches connections in module state.

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use flash_core::{Error, Result};

use crate::config::PostgresConfig;

/// Postgres client wrapper with connection pooling.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    config: PostgresConfig,
}

impl PgStore {
    /// Connects a new pool.
    pub async fn connect(config: PostgresConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(&config.url)
            .await
            .map_err(|e| Error::store(format!("failed to connect: {}", e)))?;

        info!(
            max_connections = config.max_connections,
            "Connected Postgres pool"
        );

        Ok(Self { pool, config })
    }

    /// Wraps an existing pool (tests hand one in from a container).
    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            config: PostgresConfig::default(),
        }
    }

    /// Returns the inner pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Returns the configuration.
    pub fn config(&self) -> &PostgresConfig {
        &self.config
    }
}
