//! Per-deployment inclusion policy for fetched flashes.
//!
//! The coordinator never hard-codes which flashes matter; it asks an
//! injected [`ProcessPolicy`]. Deployments pick a policy through config.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::flash::{Flash, FlashFeed};

/// Decides whether a fetched flash enters the pipeline.
pub trait ProcessPolicy: Send + Sync {
    fn should_process(&self, feed: FlashFeed, flash: &Flash) -> bool;

    /// Short name for log lines.
    fn name(&self) -> &'static str;
}

/// Process everything from both feeds.
#[derive(Debug, Default)]
pub struct ProcessAll;

impl ProcessPolicy for ProcessAll {
    fn should_process(&self, _feed: FlashFeed, _flash: &Flash) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "all"
    }
}

/// Always process one feed; gate the other on a player allow-list.
///
/// Player comparison is case-insensitive — upstream capitalization of
/// handles is not stable.
#[derive(Debug)]
pub struct PlayerAllowList {
    unrestricted: FlashFeed,
    players: HashSet<String>,
}

impl PlayerAllowList {
    pub fn new(unrestricted: FlashFeed, players: impl IntoIterator<Item = String>) -> Self {
        Self {
            unrestricted,
            players: players.into_iter().map(|p| p.to_lowercase()).collect(),
        }
    }
}

impl ProcessPolicy for PlayerAllowList {
    fn should_process(&self, feed: FlashFeed, flash: &Flash) -> bool {
        feed == self.unrestricted || self.players.contains(&flash.player.to_lowercase())
    }

    fn name(&self) -> &'static str {
        "player-allow-list"
    }
}

/// Config shape for selecting a policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum PolicyConfig {
    All,
    PlayerAllowList {
        #[serde(default = "default_unrestricted")]
        unrestricted: FlashFeed,
        #[serde(default)]
        players: Vec<String>,
    },
}

fn default_unrestricted() -> FlashFeed {
    FlashFeed::Paris
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self::All
    }
}

impl PolicyConfig {
    pub fn build(self) -> Box<dyn ProcessPolicy> {
        match self {
            Self::All => Box::new(ProcessAll),
            Self::PlayerAllowList {
                unrestricted,
                players,
            } => Box::new(PlayerAllowList::new(unrestricted, players)),
        }
    }
}
