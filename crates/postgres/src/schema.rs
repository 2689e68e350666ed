//! Schema initialization.

use sqlx::PgPool;
use tracing::info;

use flash_core::{Error, Result};

/// DDL for the flashes table. `flash_id` is the source-assigned id; the
/// primary key makes the conflict-no-op insert possible.
const CREATE_FLASHES: &str = r#"
CREATE TABLE IF NOT EXISTS flashes (
    flash_id    BIGINT PRIMARY KEY,
    city        VARCHAR(100) NOT NULL,
    player      VARCHAR(100) NOT NULL,
    img         VARCHAR(500) NOT NULL,
    ipfs_cid    VARCHAR(255),
    text        VARCHAR(1000),
    timestamp   TIMESTAMPTZ NOT NULL,
    flash_count VARCHAR(50) NOT NULL DEFAULT ''
)
"#;

const CREATE_TIMESTAMP_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_flashes_timestamp ON flashes (timestamp DESC)";

const CREATE_PLAYER_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_flashes_player ON flashes (LOWER(player))";

/// Create tables and indexes if they do not exist. Safe to run at every
/// startup.
pub async fn init_schema(pool: &PgPool) -> Result<()> {
    for ddl in [CREATE_FLASHES, CREATE_TIMESTAMP_INDEX, CREATE_PLAYER_INDEX] {
        sqlx::query(ddl)
            .execute(pool)
            .await
            .map_err(|e| Error::store(format!("schema init failed: {}", e)))?;
    }

    info!("Postgres schema initialized");
    Ok(())
}
