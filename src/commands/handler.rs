//! Event handler implementation.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use super::types::{BotCommand, CommandResult, Inbound};
use crate::flow::{
    ChannelRoster, FlowError, NextStep, ProfileView, TaskFlow, TextOutcome, TransitionOutcome,
};
use crate::store::ProfileSeed;

/// Dispatches inbound events into the task flow and renders the replies.
pub struct CommandHandler {
    flow: Arc<TaskFlow>,

    /// Membership roster fed by `/member` and `/leave`, if the gate is on.
    roster: Option<Arc<ChannelRoster>>,
}

impl CommandHandler {
    #[must_use]
    pub const fn new(flow: Arc<TaskFlow>, roster: Option<Arc<ChannelRoster>>) -> Self {
        Self { flow, roster }
    }

    /// Parses and handles a driver line.
    ///
    /// Returns `None` if the line holds no event.
    pub async fn try_handle(&self, line: &str) -> Option<CommandResult> {
        let inbound = Inbound::parse_line(line)?;
        Some(self.handle(inbound).await)
    }

    /// Handles one event. Never fails; errors become reply text.
    pub async fn handle(&self, inbound: Inbound) -> CommandResult {
        debug!("Handling {} from user {}", inbound.command, inbound.user_id);
        let result = self.execute(&inbound.user_id, inbound.command).await;
        info!(
            "Event for user {} handled: success={}",
            inbound.user_id, result.success
        );
        result
    }

    async fn execute(&self, user_id: &str, command: BotCommand) -> CommandResult {
        let outcome = match command {
            BotCommand::Start(code) => self.handle_start(user_id, code.as_deref()).await,
            BotCommand::Joined => self.handle_joined(user_id).await,
            BotCommand::Photo => self.handle_photo(user_id).await,
            BotCommand::WatchAd => self.handle_watch_ad(user_id).await,
            BotCommand::ReadArticle => self.handle_article(user_id).await,
            BotCommand::Profile => self.handle_profile(user_id).await,
            BotCommand::Text(text) => self.handle_text(user_id, &text).await,
            BotCommand::NewTask => Ok(CommandResult::success("New task functionality coming soon...")),
            BotCommand::Help => Ok(Self::handle_help()),
            BotCommand::Member(channel) => Ok(self.handle_member(user_id, &channel, true).await),
            BotCommand::Leave(channel) => Ok(self.handle_member(user_id, &channel, false).await),
        };

        outcome.unwrap_or_else(|e| render_error(&e))
    }

    async fn handle_start(&self, user_id: &str, code: Option<&str>) -> Result<CommandResult, FlowError> {
        let seed = ProfileSeed::new(user_id, "");
        let entry = self.flow.on_entry(user_id, seed, code).await?;

        let greeting = if entry.created {
            format!("✓ Welcome! Your referral code is {}", entry.record.referral_code)
        } else {
            "Welcome back!".to_owned()
        };
        Ok(CommandResult::success(format!(
            "{greeting}\n{}",
            render_next_step(&entry.next)
        )))
    }

    async fn handle_joined(&self, user_id: &str) -> Result<CommandResult, FlowError> {
        let outcome = self.flow.on_channel_join_confirmed(user_id).await?;
        Ok(self.render_transition(user_id, &outcome, "Telegram join verified!").await)
    }

    async fn handle_photo(&self, user_id: &str) -> Result<CommandResult, FlowError> {
        let outcome = self.flow.on_photo_received(user_id).await?;
        Ok(self.render_transition(user_id, &outcome, "YouTube subscription verified.").await)
    }

    async fn handle_text(&self, user_id: &str, text: &str) -> Result<CommandResult, FlowError> {
        let outcome = self.flow.on_free_text(user_id, text).await?;
        Ok(match outcome {
            TextOutcome::ArticleRedeemed { record, credited } => CommandResult::success(format!(
                "✓ Article code accepted! +{credited} points\nBalance: {}",
                record.balance
            )),
            TextOutcome::InstagramCaptured { credited, next, .. } => CommandResult::success(format!(
                "✓ Instagram username saved! +{credited} points\n{}",
                render_next_step(&next)
            )),
            TextOutcome::Ignored { record } => {
                CommandResult::success(render_next_step(&NextStep::for_stage(
                    record.task_stage,
                    &self.flow.settings().required_channels,
                )))
            }
        })
    }

    async fn handle_watch_ad(&self, user_id: &str) -> Result<CommandResult, FlowError> {
        let granted = self.flow.on_watch_ad_claim(user_id).await?;
        Ok(CommandResult::success(format!(
            "✓ Thanks for watching! +{} points\nBalance: {}",
            granted.credited, granted.record.balance
        )))
    }

    async fn handle_article(&self, user_id: &str) -> Result<CommandResult, FlowError> {
        let challenge = self.flow.on_read_article_request(user_id).await?;
        Ok(CommandResult::success(format!(
            "Read the article and send back the code shown at the end:\n{}",
            challenge.link
        )))
    }

    async fn handle_profile(&self, user_id: &str) -> Result<CommandResult, FlowError> {
        let profile = self.flow.on_profile_query(user_id).await?;
        Ok(CommandResult::success(render_profile(&profile)))
    }

    async fn handle_member(&self, user_id: &str, channel: &str, joined: bool) -> CommandResult {
        let Some(roster) = &self.roster else {
            return CommandResult::error("No required channels are configured.");
        };
        if joined {
            roster.join(user_id, channel).await;
            CommandResult::success(format!("✓ Marked {channel} as joined"))
        } else {
            roster.leave(user_id, channel).await;
            CommandResult::success(format!("✓ Marked {channel} as left"))
        }
    }

    fn handle_help() -> CommandResult {
        let mut lines = vec![
            "Promo Bot Commands (line format: <user_id> <message>)".to_owned(),
            String::new(),
        ];

        for (cmd, aliases, desc) in BotCommand::all_commands() {
            let alias_str = if aliases.is_empty() {
                String::new()
            } else {
                format!(" {aliases}")
            };
            lines.push(format!("  {cmd}{alias_str} - {desc}"));
        }

        CommandResult::success(lines.join("\n"))
    }

    async fn render_transition(
        &self,
        user_id: &str,
        outcome: &TransitionOutcome,
        headline: &str,
    ) -> CommandResult {
        match outcome {
            TransitionOutcome::Advanced {
                credited,
                next: NextStep::Completed,
                ..
            } => {
                let profile = match self.flow.on_profile_query(user_id).await {
                    Ok(profile) => render_profile(&profile),
                    Err(e) => render_error(&e).message,
                };
                CommandResult::success(format!(
                    "✓ {headline} +{credited} points\nAll tasks completed!\n\n{profile}"
                ))
            }
            TransitionOutcome::Advanced { credited, next, .. } => CommandResult::success(format!(
                "✓ {headline} +{credited} points\n{}",
                render_next_step(next)
            )),
            TransitionOutcome::AlreadyCompleted { next, .. } => {
                CommandResult::success(render_next_step(next))
            }
        }
    }
}

impl std::fmt::Debug for CommandHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandHandler")
            .field("gated", &self.roster.is_some())
            .finish_non_exhaustive()
    }
}

fn render_next_step(next: &NextStep) -> String {
    match next {
        NextStep::JoinChannels { channels } if channels.is_empty() => {
            "Join our Telegram channel, then send /joined".to_owned()
        }
        NextStep::JoinChannels { channels } => {
            let links: Vec<String> = channels.iter().map(|c| format!("https://t.me/{c}")).collect();
            format!("Join our Telegram channels, then send /joined:\n{}", links.join("\n"))
        }
        NextStep::EnterInstagram => "Follow our Instagram and enter your username:".to_owned(),
        NextStep::SendYoutubeProof => {
            "Subscribe to our YouTube channel and send a screenshot as proof (/photo)".to_owned()
        }
        NextStep::Completed => "All tasks completed! Share your referral link to earn more.".to_owned(),
    }
}

fn render_profile(profile: &ProfileView) -> String {
    format!(
        "Your Profile\n\
         Balance: {} points\n\
         Referrals: {}\n\
         Referral link: {}",
        profile.balance, profile.referral_count, profile.referral_link
    )
}

fn render_error(err: &FlowError) -> CommandResult {
    match err {
        FlowError::NotInitialized(_) => CommandResult::error("You need to /start first."),
        FlowError::PreconditionNotMet { missing } => CommandResult::error(format!(
            "Please join {} before continuing.",
            missing
                .iter()
                .map(|c| format!("@{c}"))
                .collect::<Vec<_>>()
                .join(", ")
        )),
        FlowError::CooldownActive { remaining, .. } => CommandResult::error(format!(
            "Please wait {} before claiming again.",
            format_wait(*remaining)
        )),
        FlowError::Storage(_) | FlowError::ReferralCodesExhausted { .. } => {
            CommandResult::error("Something went wrong, please try again later.")
        }
    }
}

/// Formats a wait as `45s`, `3m 5s` or `1h 2m`, rounding up to whole seconds.
fn format_wait(wait: Duration) -> String {
    let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        let (m, s) = (secs / 60, secs % 60);
        if s == 0 { format!("{m}m") } else { format!("{m}m {s}s") }
    } else {
        let (h, m) = (secs / 3600, (secs % 3600) / 60);
        if m == 0 { format!("{h}h") } else { format!("{h}h {m}m") }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BotSettings, RewardTable};
    use crate::store::MemoryStore;

    fn handler(roster: Option<Arc<ChannelRoster>>) -> CommandHandler {
        let mut flow = TaskFlow::new(
            Arc::new(MemoryStore::new()),
            BotSettings::default(),
            RewardTable::default(),
        );
        if let Some(roster) = &roster {
            flow = flow.with_gate(roster.clone());
        }
        CommandHandler::new(Arc::new(flow), roster)
    }

    #[test]
    fn test_format_wait() {
        assert_eq!(format_wait(Duration::from_secs(30)), "30s");
        assert_eq!(format_wait(Duration::from_millis(29_100)), "30s");
        assert_eq!(format_wait(Duration::from_secs(60)), "1m");
        assert_eq!(format_wait(Duration::from_secs(185)), "3m 5s");
        assert_eq!(format_wait(Duration::from_secs(3600)), "1h");
        assert_eq!(format_wait(Duration::from_secs(3720)), "1h 2m");
    }

    #[tokio::test]
    async fn test_requires_start() {
        let handler = handler(None);
        let result = handler.try_handle("7 /joined").await.unwrap();
        assert!(!result.success);
        assert!(result.message.contains("/start"));
    }

    #[tokio::test]
    async fn test_walkthrough() {
        let handler = handler(None);

        let start = handler.try_handle("7 /start").await.unwrap();
        assert!(start.success);
        assert!(start.message.contains("USER001"));

        let joined = handler.try_handle("7 /joined").await.unwrap();
        assert!(joined.message.contains("+1000"));

        let ig = handler.try_handle("7 my_insta").await.unwrap();
        assert!(ig.message.contains("+500"));

        let photo = handler.try_handle("7 /photo").await.unwrap();
        assert!(photo.message.contains("All tasks completed"));
        assert!(photo.message.contains("Balance: 2000"));

        let ad = handler.try_handle("7 /ad").await.unwrap();
        assert!(ad.success);
        let again = handler.try_handle("7 /ad").await.unwrap();
        assert!(!again.success);
        assert!(again.message.contains("wait"));
    }

    #[tokio::test]
    async fn test_gate_messages() {
        let roster = Arc::new(ChannelRoster::new(vec!["news".to_owned()]));
        let handler = handler(Some(roster));

        handler.try_handle("7 /start").await.unwrap();
        let blocked = handler.try_handle("7 /joined").await.unwrap();
        assert!(!blocked.success);
        assert!(blocked.message.contains("@news"));

        handler.try_handle("7 /member news").await.unwrap();
        let ok = handler.try_handle("7 /joined").await.unwrap();
        assert!(ok.success);
    }

    #[tokio::test]
    async fn test_member_without_gate() {
        let handler = handler(None);
        let result = handler.try_handle("7 /member news").await.unwrap();
        assert!(!result.success);
    }

    #[tokio::test]
    async fn test_blank_line() {
        assert!(handler(None).try_handle("   ").await.is_none());
    }
}
