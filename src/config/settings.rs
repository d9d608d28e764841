//! Application settings read from the environment.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How non-entry triggers treat a user with no record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreationMode {
    /// Reject with a "needs initialization" signal.
    #[default]
    Strict,
    /// Create the record on the spot, without a referrer.
    Implicit,
}

impl FromStr for CreationMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "implicit" => Ok(Self::Implicit),
            _ => Err(ConfigError::InvalidValue {
                var: "CREATION_MODE",
                value: s.to_owned(),
            }),
        }
    }
}

/// Referral code generation strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferralCodeStyle {
    /// `USER001`, `USER002`, ... derived from the record count.
    #[default]
    Sequential,
    /// Random uppercase letters and digits.
    Random,
}

impl FromStr for ReferralCodeStyle {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sequential" => Ok(Self::Sequential),
            "random" => Ok(Self::Random),
            _ => Err(ConfigError::InvalidValue {
                var: "REFERRAL_CODES",
                value: s.to_owned(),
            }),
        }
    }
}

impl fmt::Display for ReferralCodeStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sequential => f.write_str("sequential"),
            Self::Random => f.write_str("random"),
        }
    }
}

/// Bot-specific settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotSettings {
    /// Bot username used to build `t.me` deep links.
    #[serde(default = "default_bot_username")]
    pub bot_username: String,

    /// Path to the JSON record file.
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,

    /// Path to the reward table JSON file.
    #[serde(default = "default_rewards_path")]
    pub rewards_path: PathBuf,

    #[serde(default)]
    pub creation_mode: CreationMode,

    #[serde(default)]
    pub referral_codes: ReferralCodeStyle,

    /// Channels a user must stay joined to. Empty disables the gate.
    #[serde(default)]
    pub required_channels: Vec<String>,

    /// Base URL of the article; the session code is appended as a query.
    #[serde(default = "default_article_url")]
    pub article_url: String,

    /// How often expired cooldown markers are purged.
    #[serde(default = "default_cooldown_sweep")]
    pub cooldown_sweep_secs: u64,
}

fn default_bot_username() -> String {
    "promo_task_bot".to_owned()
}

fn default_store_path() -> PathBuf {
    PathBuf::from("users.json")
}

fn default_rewards_path() -> PathBuf {
    PathBuf::from("rewards.json")
}

fn default_article_url() -> String {
    "https://example.com/article".to_owned()
}

fn default_cooldown_sweep() -> u64 {
    60
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            bot_username: default_bot_username(),
            store_path: default_store_path(),
            rewards_path: default_rewards_path(),
            creation_mode: CreationMode::default(),
            referral_codes: ReferralCodeStyle::default(),
            required_channels: Vec::new(),
            article_url: default_article_url(),
            cooldown_sweep_secs: default_cooldown_sweep(),
        }
    }
}

impl BotSettings {
    /// Creates bot settings from environment variables with defaults.
    ///
    /// Unset variables fall back to defaults; malformed values are errors.
    pub fn from_env() -> Result<Self, ConfigError> {
        let creation_mode = match std::env::var("CREATION_MODE") {
            Ok(v) => v.parse()?,
            Err(_) => CreationMode::default(),
        };
        let referral_codes = match std::env::var("REFERRAL_CODES") {
            Ok(v) => v.parse()?,
            Err(_) => ReferralCodeStyle::default(),
        };

        Ok(Self {
            bot_username: std::env::var("BOT_USERNAME")
                .map(|s| s.trim_start_matches('@').to_owned())
                .unwrap_or_else(|_| default_bot_username()),
            store_path: std::env::var("STORE_PATH").map_or_else(|_| default_store_path(), PathBuf::from),
            rewards_path: std::env::var("REWARDS_PATH").map_or_else(|_| default_rewards_path(), PathBuf::from),
            creation_mode,
            referral_codes,
            required_channels: std::env::var("REQUIRED_CHANNELS")
                .map(|s| parse_channel_list(&s))
                .unwrap_or_default(),
            article_url: std::env::var("ARTICLE_URL").unwrap_or_else(|_| default_article_url()),
            cooldown_sweep_secs: parse_sweep_secs(std::env::var("COOLDOWN_SWEEP_SECS").ok())?,
        })
    }

    /// Deep link that opens the bot with `code` as the start payload.
    #[must_use]
    pub fn referral_link(&self, code: &str) -> String {
        format!("https://t.me/{}?start={code}", self.bot_username)
    }

    /// Article link carrying a session code.
    #[must_use]
    pub fn article_link(&self, code: &str) -> String {
        let sep = if self.article_url.contains('?') { '&' } else { '?' };
        format!("{}{sep}code={code}", self.article_url)
    }
}

/// Parses the sweep interval. Unset means the default; zero is rejected.
fn parse_sweep_secs(raw: Option<String>) -> Result<u64, ConfigError> {
    let Some(raw) = raw else {
        return Ok(default_cooldown_sweep());
    };
    match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(secs),
        _ => Err(ConfigError::InvalidValue {
            var: "COOLDOWN_SWEEP_SECS",
            value: raw,
        }),
    }
}

/// Splits a comma separated channel list, dropping `@` prefixes and blanks.
fn parse_channel_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|c| c.trim().trim_start_matches('@'))
        .filter(|c| !c.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value:?}")]
    InvalidValue { var: &'static str, value: String },
}
