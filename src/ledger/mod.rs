//! Reward ledger.
//!
//! Point credits for stage transitions, cooldown-gated repeatable rewards,
//! the article session-code challenge and the background sweep of expired
//! cooldown markers.

mod book;
pub mod challenge;
mod cooldown;
mod sweeper;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::store::TaskStage;

pub use book::{RewardLedger, TransitionStatus};
pub use cooldown::CooldownTracker;
pub use sweeper::{CooldownSweeper, SweeperMessage};

/// Named reward categories. Every balance change is attributable to one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardKind {
    TelegramJoin,
    Instagram,
    Youtube,
    Referral,
    WatchAd,
    ReadArticle,
}

impl RewardKind {
    /// The one-time reward earned by reaching `stage`.
    #[must_use]
    pub const fn for_stage(stage: TaskStage) -> Option<Self> {
        match stage {
            TaskStage::Start => None,
            TaskStage::TelegramDone => Some(Self::TelegramJoin),
            TaskStage::InstagramDone => Some(Self::Instagram),
            TaskStage::YoutubeDone => Some(Self::Youtube),
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TelegramJoin => "telegram_join",
            Self::Instagram => "instagram",
            Self::Youtube => "youtube",
            Self::Referral => "referral",
            Self::WatchAd => "watch_ad",
            Self::ReadArticle => "read_article",
        }
    }
}

impl fmt::Display for RewardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
