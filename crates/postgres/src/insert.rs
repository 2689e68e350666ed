//! Idempotent batch insert with per-row fallback.
//!
//! The fast path is a single multi-row `INSERT ... ON CONFLICT (flash_id)
//! DO NOTHING RETURNING *`. When that statement fails as a whole — one
//! malformed value poisons every row bound into it — the slow path replays
//! the chunk one row at a time, so the poisoned row is isolated and the
//! other rows still land.

use chrono::{DateTime, TimeZone, Utc};
use sqlx::{PgPool, QueryBuilder};
use tracing::{debug, error, warn};

use flash_core::{partition, Error, Flash, Result};
use telemetry::metrics;

/// Rows per multi-row statement. 8 binds per row; Postgres caps a statement
/// at 65535 bind parameters.
const INSERT_CHUNK_ROWS: usize = 500;

const INSERT_COLUMNS: &str = "flash_id, city, player, img, ipfs_cid, text, timestamp, flash_count";

/// A flashes-table row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FlashRow {
    pub flash_id: i64,
    pub city: String,
    pub player: String,
    pub img: String,
    pub ipfs_cid: Option<String>,
    pub text: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub flash_count: String,
}

impl From<FlashRow> for Flash {
    fn from(row: FlashRow) -> Self {
        Flash {
            flash_id: row.flash_id,
            player: row.player,
            city: row.city,
            img: row.img,
            ipfs_cid: row.ipfs_cid,
            text: row.text,
            timestamp: row.timestamp.timestamp(),
            flash_count: row.flash_count,
        }
    }
}

impl TryFrom<&Flash> for FlashRow {
    type Error = Error;

    fn try_from(flash: &Flash) -> Result<Self> {
        let timestamp = Utc
            .timestamp_opt(flash.timestamp, 0)
            .single()
            .ok_or_else(|| Error::internal(format!("unrepresentable timestamp {}", flash.timestamp)))?;

        Ok(Self {
            flash_id: flash.flash_id,
            city: flash.city.clone(),
            player: flash.player.clone(),
            img: flash.img.clone(),
            ipfs_cid: flash.ipfs_cid.clone(),
            text: flash.text.clone(),
            timestamp,
            flash_count: flash.flash_count.clone(),
        })
    }
}

/// Whether a sqlx error is transport/pool-level (worth retrying later)
/// rather than a statement rejection.
fn is_transient(e: &sqlx::Error) -> bool {
    matches!(
        e,
        sqlx::Error::Io(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
            | sqlx::Error::Tls(_)
    )
}

/// Validate, sanitize, and insert a batch. Returns the rows actually
/// inserted (conflicts and invalid rows excluded).
///
/// Transient transport failures propagate as [`Error::Store`] so the caller
/// can ledger the batch; statement-level failures never escape — they are
/// isolated by the per-row fallback and dropped.
pub async fn insert_batch(pool: &PgPool, flashes: Vec<Flash>) -> Result<Vec<Flash>> {
    if flashes.is_empty() {
        return Ok(Vec::new());
    }

    let total = flashes.len();
    let (valid, rejected) = partition(flashes);

    for (flash, violations) in &rejected {
        let codes: Vec<&str> = violations.iter().map(|v| v.as_str()).collect();
        warn!(
            flash_id = flash.flash_id,
            player = %flash.player,
            violations = ?codes,
            "Dropping invalid flash"
        );
    }
    if !rejected.is_empty() {
        metrics().validation_failures.inc_by(rejected.len() as u64);
        error!(
            rejected = rejected.len(),
            total, "Flashes failed validation and will be skipped"
        );
    }

    if valid.is_empty() {
        warn!(total, "No valid flashes to insert after validation");
        return Ok(Vec::new());
    }

    let start = std::time::Instant::now();
    let mut inserted = Vec::new();

    for chunk in valid.chunks(INSERT_CHUNK_ROWS) {
        let rows: Vec<FlashRow> = chunk
            .iter()
            .map(FlashRow::try_from)
            .collect::<Result<_>>()?;

        match insert_chunk(pool, &rows).await {
            Ok(mut landed) => inserted.append(&mut landed),
            Err(e) if is_transient(&e) => {
                return Err(Error::store(format!("batch insert failed: {}", e)));
            }
            Err(e) => {
                error!(
                    rows = rows.len(),
                    "Batch statement failed, falling back to per-row inserts: {}", e
                );
                let mut landed = insert_individually(pool, &rows).await?;
                inserted.append(&mut landed);
            }
        }
    }

    let elapsed = start.elapsed();
    metrics().flashes_stored.inc_by(inserted.len() as u64);
    metrics().store_latency_ms.observe(elapsed.as_millis() as u64);

    if inserted.len() < valid.len() {
        debug!(
            skipped = valid.len() - inserted.len(),
            "Flashes skipped as already stored"
        );
    }

    Ok(inserted)
}

/// One multi-row statement for a chunk.
async fn insert_chunk(
    pool: &PgPool,
    rows: &[FlashRow],
) -> std::result::Result<Vec<Flash>, sqlx::Error> {
    let mut builder =
        QueryBuilder::new(format!("INSERT INTO flashes ({}) ", INSERT_COLUMNS));

    builder.push_values(rows, |mut b, row| {
        b.push_bind(row.flash_id)
            .push_bind(&row.city)
            .push_bind(&row.player)
            .push_bind(&row.img)
            .push_bind(&row.ipfs_cid)
            .push_bind(&row.text)
            .push_bind(row.timestamp)
            .push_bind(&row.flash_count);
    });
    builder.push(format!(
        " ON CONFLICT (flash_id) DO NOTHING RETURNING {}",
        INSERT_COLUMNS
    ));

    let landed: Vec<FlashRow> = builder.build_query_as().fetch_all(pool).await?;
    Ok(landed.into_iter().map(Flash::from).collect())
}

/// Per-row fallback: isolates which rows a failed statement was poisoned
/// by. Rows rejected here already passed validation, so a rejection is a
/// genuine constraint violation — dropped and logged, never retried.
async fn insert_individually(pool: &PgPool, rows: &[FlashRow]) -> Result<Vec<Flash>> {
    let sql = format!(
        "INSERT INTO flashes ({cols}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
         ON CONFLICT (flash_id) DO NOTHING RETURNING {cols}",
        cols = INSERT_COLUMNS
    );

    let mut inserted = Vec::new();
    let mut dropped = 0usize;

    for row in rows {
        let result = sqlx::query_as::<_, FlashRow>(&sql)
            .bind(row.flash_id)
            .bind(&row.city)
            .bind(&row.player)
            .bind(&row.img)
            .bind(&row.ipfs_cid)
            .bind(&row.text)
            .bind(row.timestamp)
            .bind(&row.flash_count)
            .fetch_optional(pool)
            .await;

        match result {
            Ok(Some(landed)) => inserted.push(Flash::from(landed)),
            Ok(None) => {
                debug!(flash_id = row.flash_id, "Flash already exists (conflict)");
            }
            Err(e) if is_transient(&e) => {
                return Err(Error::store(format!("per-row insert failed: {}", e)));
            }
            Err(e) => {
                dropped += 1;
                let rejection = Error::RowRejected {
                    flash_id: row.flash_id,
                    reason: e.to_string(),
                };
                error!(flash_id = row.flash_id, "{}", rejection);
            }
        }
    }

    if dropped > 0 {
        error!(dropped, "Rows dropped by per-row insert fallback");
    }

    Ok(inserted)
}
