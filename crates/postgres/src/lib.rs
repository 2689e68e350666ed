//! Postgres-backed flash store.
//!
//! Idempotent batch inserts (`ON CONFLICT (flash_id) DO NOTHING`) with a
//! per-row fallback when a whole statement fails, plus the lookup and range
//! queries the coordinator needs to compute publish sets.

pub mod client;
pub mod config;
pub mod health;
pub mod insert;
pub mod query;
pub mod schema;
pub mod store;

pub use client::PgStore;
pub use config::PostgresConfig;
pub use store::{FlashStore, PgFlashStore};
