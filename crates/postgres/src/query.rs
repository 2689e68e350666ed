//! Lookup and range queries.
//!
//! "Not found" is always an empty vec, never an error; only transport and
//! statement failures propagate.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use flash_core::{Error, Flash, Result};

use crate::insert::FlashRow;

const SELECT_COLUMNS: &str = "flash_id, city, player, img, ipfs_cid, text, timestamp, flash_count";

/// Fetch the stored state of the given flash ids.
pub async fn get_by_ids(pool: &PgPool, ids: &[i64]) -> Result<Vec<Flash>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let sql = format!(
        "SELECT {} FROM flashes WHERE flash_id = ANY($1)",
        SELECT_COLUMNS
    );

    let rows: Vec<FlashRow> = sqlx::query_as(&sql)
        .bind(ids)
        .fetch_all(pool)
        .await
        .map_err(|e| Error::store(format!("get_by_ids failed: {}", e)))?;

    Ok(rows.into_iter().map(Flash::from).collect())
}

/// Fetch flashes at or after `since`, newest first, optionally restricted
/// to a set of players (case-insensitive).
pub async fn get_since(
    pool: &PgPool,
    since: DateTime<Utc>,
    players: Option<&[String]>,
) -> Result<Vec<Flash>> {
    let rows: Vec<FlashRow> = match players {
        Some(players) => {
            let lowered: Vec<String> = players.iter().map(|p| p.to_lowercase()).collect();
            let sql = format!(
                "SELECT {} FROM flashes \
                 WHERE timestamp >= $1 AND LOWER(player) = ANY($2) \
                 ORDER BY timestamp DESC",
                SELECT_COLUMNS
            );
            sqlx::query_as(&sql)
                .bind(since)
                .bind(&lowered)
                .fetch_all(pool)
                .await
        }
        None => {
            let sql = format!(
                "SELECT {} FROM flashes WHERE timestamp >= $1 ORDER BY timestamp DESC",
                SELECT_COLUMNS
            );
            sqlx::query_as(&sql).bind(since).fetch_all(pool).await
        }
    }
    .map_err(|e| Error::store(format!("get_since failed: {}", e)))?;

    Ok(rows.into_iter().map(Flash::from).collect())
}
