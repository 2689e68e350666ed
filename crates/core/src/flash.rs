//! Flash record types, wire-shaped to match the upstream API.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// One flash as reported by the upstream API.
///
/// `flash_id` is source-assigned and globally unique; everything else is
/// untrusted until it has been through [`crate::validation`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Flash {
    /// Source-assigned unique id.
    #[validate(range(min = 1, code = "invalid_flash_id"))]
    pub flash_id: i64,

    /// Player handle that flashed the invader.
    #[validate(custom(function = "crate::validation::check_player"))]
    pub player: String,

    /// City the invader lives in.
    #[validate(custom(function = "crate::validation::check_city"))]
    pub city: String,

    /// Relative image path on the upstream CDN, reused as the object key.
    #[validate(custom(function = "crate::validation::check_img"))]
    pub img: String,

    /// Content-addressed id attached by the pinning service after the image
    /// lands in the object store. Empty or absent until that catches up.
    #[validate(length(max = 255, code = "invalid_ipfs_cid"))]
    #[serde(default)]
    pub ipfs_cid: Option<String>,

    /// Optional caption.
    #[validate(length(max = 1000, code = "text_too_long"))]
    #[serde(default)]
    pub text: Option<String>,

    /// Unix timestamp in seconds.
    #[validate(custom(function = "crate::validation::check_timestamp"))]
    pub timestamp: i64,

    /// Display counter from the source, e.g. "4 121 730".
    ///
    /// Monotonically-increasing-ish; compared as an opaque string by the
    /// change detector, never parsed.
    #[validate(length(max = 50, code = "flash_count_too_long"))]
    #[serde(default)]
    pub flash_count: String,
}

impl Flash {
    /// Whether the async pinning step has populated the derived media ref.
    pub fn is_enriched(&self) -> bool {
        matches!(&self.ipfs_cid, Some(cid) if !cid.trim().is_empty())
    }
}

/// Upstream feed a flash arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlashFeed {
    /// The `with_paris` half of the response.
    Paris,
    /// The `without_paris` half of the response.
    Global,
}

impl FlashFeed {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Paris => "paris",
            Self::Global => "global",
        }
    }
}

/// One polled batch, exactly as the upstream endpoint shapes it.
///
/// The API always returns both halves; a missing half means the endpoint is
/// degraded and the whole fetch is treated as failed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlashBatch {
    pub with_paris: Vec<Flash>,
    pub without_paris: Vec<Flash>,
}

impl FlashBatch {
    /// Both required categories present and non-empty.
    pub fn is_complete(&self) -> bool {
        !self.with_paris.is_empty() && !self.without_paris.is_empty()
    }

    pub fn len(&self) -> usize {
        self.with_paris.len() + self.without_paris.len()
    }

    pub fn is_empty(&self) -> bool {
        self.with_paris.is_empty() && self.without_paris.is_empty()
    }

    /// Display counter carried by the newest flash in the batch.
    ///
    /// Every record snapshots the source's global counter at flash time,
    /// so the newest record carries the freshest value. Compared as an
    /// opaque string by the change detector.
    pub fn latest_counter(&self) -> Option<&str> {
        self.with_paris
            .iter()
            .chain(self.without_paris.iter())
            .max_by_key(|f| f.timestamp)
            .map(|f| f.flash_count.as_str())
    }

    /// Flatten into `(feed, flash)` pairs, Paris feed first.
    pub fn into_tagged(self) -> Vec<(FlashFeed, Flash)> {
        let mut out = Vec::with_capacity(self.len());
        out.extend(self.with_paris.into_iter().map(|f| (FlashFeed::Paris, f)));
        out.extend(self.without_paris.into_iter().map(|f| (FlashFeed::Global, f)));
        out
    }
}
