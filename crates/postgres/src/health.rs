//! Postgres health checks.

use tracing::error;

use crate::client::PgStore;

/// Check Postgres connection health.
pub async fn check_connection(store: &PgStore) -> bool {
    match sqlx::query("SELECT 1").execute(store.pool()).await {
        Ok(_) => true,
        Err(e) => {
            error!("Postgres health check failed: {}", e);
            false
        }
    }
}
