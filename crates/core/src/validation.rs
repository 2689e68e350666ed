//! Validation and sanitization for upstream flash records.
//!
//! All checks run and all violations are collected; a record is never
//! rejected on the first problem. Callers log the full violation list and
//! drop the record — validation failures are permanent, not retried.
//!
//! Non-numeric or absent `flash_id`/`timestamp` cannot reach this layer:
//! serde rejects the record during deserialization. The checks here cover
//! the values the type system cannot.

use chrono::{Duration, Utc};
use validator::{Validate, ValidationError};

use crate::flash::Flash;
use crate::limits::{
    MAX_CITY_LEN, MAX_FLASH_AGE_DAYS, MAX_FUTURE_SKEW_DAYS, MAX_IMG_LEN, MAX_PLAYER_LEN,
};

/// One validation violation. Codes are stable snake_case strings used in
/// log lines and error breakdowns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorKind {
    InvalidId,
    InvalidTimestamp,
    TimestampOutOfRange,
    MissingPlayer,
    PlayerTooLong,
    MissingCity,
    CityTooLong,
    MissingImg,
    ImgTooLong,
    TextTooLong,
    FlashCountTooLong,
    InvalidIpfsCid,
}

impl ErrorKind {
    /// Stable code string for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidId => "invalid_flash_id",
            Self::InvalidTimestamp => "invalid_timestamp",
            Self::TimestampOutOfRange => "timestamp_out_of_range",
            Self::MissingPlayer => "missing_player",
            Self::PlayerTooLong => "player_too_long",
            Self::MissingCity => "missing_city",
            Self::CityTooLong => "city_too_long",
            Self::MissingImg => "missing_img",
            Self::ImgTooLong => "img_too_long",
            Self::TextTooLong => "text_too_long",
            Self::FlashCountTooLong => "flash_count_too_long",
            Self::InvalidIpfsCid => "invalid_ipfs_cid",
        }
    }

    fn from_code(code: &str) -> Option<Self> {
        Some(match code {
            "invalid_flash_id" => Self::InvalidId,
            "invalid_timestamp" => Self::InvalidTimestamp,
            "timestamp_out_of_range" => Self::TimestampOutOfRange,
            "missing_player" => Self::MissingPlayer,
            "player_too_long" => Self::PlayerTooLong,
            "missing_city" => Self::MissingCity,
            "city_too_long" => Self::CityTooLong,
            "missing_img" => Self::MissingImg,
            "img_too_long" => Self::ImgTooLong,
            "text_too_long" => Self::TextTooLong,
            "flash_count_too_long" => Self::FlashCountTooLong,
            "invalid_ipfs_cid" => Self::InvalidIpfsCid,
            _ => return None,
        })
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn required_trimmed(
    value: &str,
    max: usize,
    missing: &'static str,
    too_long: &'static str,
) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new(missing));
    }
    if value.chars().count() > max {
        return Err(ValidationError::new(too_long));
    }
    Ok(())
}

pub fn check_player(player: &str) -> Result<(), ValidationError> {
    required_trimmed(player, MAX_PLAYER_LEN, "missing_player", "player_too_long")
}

pub fn check_city(city: &str) -> Result<(), ValidationError> {
    required_trimmed(city, MAX_CITY_LEN, "missing_city", "city_too_long")
}

pub fn check_img(img: &str) -> Result<(), ValidationError> {
    required_trimmed(img, MAX_IMG_LEN, "missing_img", "img_too_long")
}

/// Timestamp must be positive and inside the sanity window.
///
/// The upstream API has shipped both zeroed and far-future timestamps
/// during outages; both poison `to_timestamp` conversions downstream.
pub fn check_timestamp(ts: i64) -> Result<(), ValidationError> {
    if ts <= 0 {
        return Err(ValidationError::new("invalid_timestamp"));
    }
    let now = Utc::now();
    let oldest = (now - Duration::days(MAX_FLASH_AGE_DAYS)).timestamp();
    let newest = (now + Duration::days(MAX_FUTURE_SKEW_DAYS)).timestamp();
    if ts < oldest || ts > newest {
        return Err(ValidationError::new("timestamp_out_of_range"));
    }
    Ok(())
}

/// Run every check on a flash and collect all violations.
pub fn validate(flash: &Flash) -> Vec<ErrorKind> {
    match Validate::validate(flash) {
        Ok(()) => Vec::new(),
        Err(errors) => {
            let mut kinds: Vec<ErrorKind> = errors
                .field_errors()
                .values()
                .flat_map(|field| field.iter())
                .filter_map(|e| ErrorKind::from_code(&e.code))
                .collect();
            kinds.sort();
            kinds.dedup();
            kinds
        }
    }
}

/// Normalize a record that already passed [`validate`]: trim strings and
/// collapse blank optionals to `None`.
pub fn sanitize(flash: Flash) -> Flash {
    let trim_opt = |v: Option<String>| {
        v.and_then(|s| {
            let t = s.trim().to_string();
            if t.is_empty() {
                None
            } else {
                Some(t)
            }
        })
    };

    Flash {
        flash_id: flash.flash_id,
        player: flash.player.trim().to_string(),
        city: flash.city.trim().to_string(),
        img: flash.img.trim().to_string(),
        ipfs_cid: trim_opt(flash.ipfs_cid),
        text: trim_opt(flash.text),
        timestamp: flash.timestamp,
        flash_count: flash.flash_count.trim().to_string(),
    }
}

/// Split a raw batch into sanitized valid rows and rejected rows with
/// their violations. Input order is preserved within each side.
pub fn partition(flashes: Vec<Flash>) -> (Vec<Flash>, Vec<(Flash, Vec<ErrorKind>)>) {
    let mut valid = Vec::with_capacity(flashes.len());
    let mut rejected = Vec::new();

    for flash in flashes {
        let violations = validate(&flash);
        if violations.is_empty() {
            valid.push(sanitize(flash));
        } else {
            rejected.push((flash, violations));
        }
    }

    (valid, rejected)
}
