//! Reward amounts and cooldown windows.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ledger::RewardKind;
use crate::store::TaskStage;

/// Errors that can occur while loading or validating the reward table.
#[derive(Debug, Error)]
pub enum RewardConfigError {
    #[error("Reward for reaching {stage} must be greater than 0")]
    ZeroStageCredit { stage: TaskStage },

    #[error("Cooldown for {kind} must be greater than 0 seconds")]
    ZeroCooldown { kind: RewardKind },

    #[error("Failed to read reward file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse reward file: {0}")]
    ParseError(#[from] serde_json::Error),
}

/// Point amounts for every reward category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardTable {
    #[serde(default = "default_telegram_join")]
    pub telegram_join: u64,

    #[serde(default = "default_instagram")]
    pub instagram: u64,

    #[serde(default = "default_youtube")]
    pub youtube: u64,

    /// Credited to the referrer for each valid signup.
    #[serde(default = "default_referral")]
    pub referral: u64,

    #[serde(default = "default_watch_ad")]
    pub watch_ad: u64,

    #[serde(default = "default_read_article")]
    pub read_article: u64,

    #[serde(default = "default_ad_cooldown")]
    pub ad_cooldown_secs: u64,

    #[serde(default = "default_article_cooldown")]
    pub article_cooldown_secs: u64,
}

const fn default_telegram_join() -> u64 {
    1000
}

const fn default_instagram() -> u64 {
    500
}

const fn default_youtube() -> u64 {
    500
}

const fn default_referral() -> u64 {
    1000
}

const fn default_watch_ad() -> u64 {
    30
}

const fn default_read_article() -> u64 {
    100
}

const fn default_ad_cooldown() -> u64 {
    60
}

const fn default_article_cooldown() -> u64 {
    3600
}

impl Default for RewardTable {
    fn default() -> Self {
        Self {
            telegram_join: default_telegram_join(),
            instagram: default_instagram(),
            youtube: default_youtube(),
            referral: default_referral(),
            watch_ad: default_watch_ad(),
            read_article: default_read_article(),
            ad_cooldown_secs: default_ad_cooldown(),
            article_cooldown_secs: default_article_cooldown(),
        }
    }
}

impl RewardTable {
    /// Loads the table from a JSON file.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, RewardConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Loads the table if the file exists, otherwise returns defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, RewardConfigError> {
        if path.as_ref().exists() {
            Self::load_from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Saves the table to a JSON file.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), RewardConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validates amounts and cooldowns.
    ///
    /// Stage credits must be positive so every transition is attributable.
    /// Repeatable rewards may be zero but their cooldowns may not.
    pub fn validate(&self) -> Result<(), RewardConfigError> {
        for stage in [TaskStage::TelegramDone, TaskStage::InstagramDone, TaskStage::YoutubeDone] {
            if self.stage_credit(stage) == 0 {
                return Err(RewardConfigError::ZeroStageCredit { stage });
            }
        }
        for kind in [RewardKind::WatchAd, RewardKind::ReadArticle] {
            if self.cooldown(kind).is_some_and(|d| d.is_zero()) {
                return Err(RewardConfigError::ZeroCooldown { kind });
            }
        }
        Ok(())
    }

    /// Amount credited for a reward category.
    #[must_use]
    pub const fn amount(&self, kind: RewardKind) -> u64 {
        match kind {
            RewardKind::TelegramJoin => self.telegram_join,
            RewardKind::Instagram => self.instagram,
            RewardKind::Youtube => self.youtube,
            RewardKind::Referral => self.referral,
            RewardKind::WatchAd => self.watch_ad,
            RewardKind::ReadArticle => self.read_article,
        }
    }

    /// Amount credited for reaching `stage`.
    #[must_use]
    pub const fn stage_credit(&self, stage: TaskStage) -> u64 {
        match RewardKind::for_stage(stage) {
            Some(kind) => self.amount(kind),
            None => 0,
        }
    }

    /// Cooldown window of a repeatable reward, `None` for one-time rewards.
    #[must_use]
    pub const fn cooldown(&self, kind: RewardKind) -> Option<Duration> {
        match kind {
            RewardKind::WatchAd => Some(Duration::from_secs(self.ad_cooldown_secs)),
            RewardKind::ReadArticle => Some(Duration::from_secs(self.article_cooldown_secs)),
            _ => None,
        }
    }

    /// Example table written by `--generate-config`.
    #[must_use]
    pub fn example() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let table = RewardTable::default();
        assert_eq!(table.stage_credit(TaskStage::TelegramDone), 1000);
        assert_eq!(table.stage_credit(TaskStage::InstagramDone), 500);
        assert_eq!(table.stage_credit(TaskStage::YoutubeDone), 500);
        assert_eq!(table.stage_credit(TaskStage::Start), 0);
        assert_eq!(table.amount(RewardKind::Referral), 1000);
        assert_eq!(table.cooldown(RewardKind::WatchAd), Some(Duration::from_secs(60)));
        assert_eq!(table.cooldown(RewardKind::Referral), None);
        assert!(table.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let table: RewardTable = serde_json::from_str(r#"{"watch_ad": 50}"#).unwrap();
        assert_eq!(table.watch_ad, 50);
        assert_eq!(table.telegram_join, 1000);
    }

    #[test]
    fn test_zero_cooldown_rejected() {
        let table = RewardTable {
            ad_cooldown_secs: 0,
            ..RewardTable::default()
        };
        assert!(matches!(
            table.validate(),
            Err(RewardConfigError::ZeroCooldown { kind: RewardKind::WatchAd })
        ));
    }

    #[test]
    fn test_zero_stage_credit_rejected() {
        let table = RewardTable {
            instagram: 0,
            ..RewardTable::default()
        };
        assert!(matches!(
            table.validate(),
            Err(RewardConfigError::ZeroStageCredit { stage: TaskStage::InstagramDone })
        ));
    }
}
