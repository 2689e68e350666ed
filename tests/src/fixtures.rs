//! Test fixtures and flash generators.

use chrono::Utc;

use flash_core::{Flash, FlashBatch};

/// A valid flash with the given id, timestamped one hour ago.
pub fn flash(id: i64) -> Flash {
    Flash {
        flash_id: id,
        player: format!("player_{}", id),
        city: "Paris".into(),
        img: format!("/flashes/{}.jpg", id),
        ipfs_cid: None,
        text: None,
        timestamp: Utc::now().timestamp() - 3600,
        flash_count: "4 121 730".into(),
    }
}

/// A valid flash for a specific player.
pub fn flash_by(id: i64, player: &str) -> Flash {
    Flash {
        player: player.into(),
        ..flash(id)
    }
}

/// A flash whose media ref has been pinned.
pub fn enriched_flash(id: i64) -> Flash {
    Flash {
        ipfs_cid: Some(format!("bafybeig{}", id)),
        ..flash(id)
    }
}

/// A flash that fails validation (non-positive id).
pub fn invalid_flash() -> Flash {
    Flash {
        flash_id: -1,
        ..flash(1)
    }
}

/// N valid flashes with consecutive ids starting at `first_id`.
pub fn flashes(first_id: i64, n: usize) -> Vec<Flash> {
    (0..n as i64).map(|i| flash(first_id + i)).collect()
}

/// A complete upstream batch: both categories populated.
pub fn batch(with_paris: Vec<Flash>, without_paris: Vec<Flash>) -> FlashBatch {
    FlashBatch {
        with_paris,
        without_paris,
    }
}
