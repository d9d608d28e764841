//! Configuration module for the promo bot.
//!
//! Handles loading and validation of bot settings from the environment and
//! of the reward table from JSON.

mod rewards;
mod settings;

pub use rewards::{RewardConfigError, RewardTable};
pub use settings::{BotSettings, ConfigError, CreationMode, ReferralCodeStyle};
