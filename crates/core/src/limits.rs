//! Field limits for upstream flash records.
//!
//! The upstream API is third-party and occasionally ships malformed rows;
//! these bounds keep a single bad record from poisoning a batch insert.
//! The `#[validate]` derive macro requires literal values in attributes,
//! so the limits are duplicated there. Keep both in sync when modifying.

/// Max length of a city name.
pub const MAX_CITY_LEN: usize = 100;

/// Max length of a player handle.
pub const MAX_PLAYER_LEN: usize = 100;

/// Max length of the relative image path.
pub const MAX_IMG_LEN: usize = 500;

/// Max length of the optional flash caption.
pub const MAX_TEXT_LEN: usize = 1000;

/// Max length of the upstream display counter.
///
/// Used only for change detection, never parsed as a number.
pub const MAX_FLASH_COUNT_LEN: usize = 50;

/// Max length of an IPFS CID.
///
/// CIDv1 strings are ~60 chars; 255 leaves room for future multibase forms.
pub const MAX_IPFS_CID_LEN: usize = 255;

/// Timestamp sanity window: oldest accepted flash, in days before now.
pub const MAX_FLASH_AGE_DAYS: i64 = 2 * 365;

/// Timestamp sanity window: furthest accepted future skew, in days after now.
pub const MAX_FUTURE_SKEW_DAYS: i64 = 365;
