//! Inbound event types and definitions.

use std::fmt;

/// An inbound event tagged with the user it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    pub user_id: String,
    pub command: BotCommand,
}

impl Inbound {
    /// Parses a driver line of the form `<user_id> <message>`.
    ///
    /// Returns `None` for blank lines and lines without a message.
    #[must_use]
    pub fn parse_line(line: &str) -> Option<Self> {
        let line = line.trim();
        let (user_id, rest) = line.split_once(char::is_whitespace)?;
        let command = BotCommand::parse(rest)?;
        Some(Self {
            user_id: user_id.to_owned(),
            command,
        })
    }
}

/// Events the bot reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand {
    /// First contact, optionally with a referral code from the deep link.
    Start(Option<String>),

    /// The user says they joined the required channels.
    Joined,

    /// A photo message (YouTube subscription proof).
    Photo,

    /// Claim the ad-watch reward.
    WatchAd,

    /// Request an article challenge code.
    ReadArticle,

    /// Show the profile.
    Profile,

    /// Ask for a new task.
    NewTask,

    /// Show help information.
    Help,

    /// Mark the user as a member of a channel.
    Member(String),

    /// Mark the user as having left a channel.
    Leave(String),

    /// Any other message text.
    Text(String),
}

impl BotCommand {
    /// Parses message text. Anything that is not a known command is free text.
    ///
    /// Returns `None` only for empty input.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        if !text.starts_with('/') {
            return Some(Self::Text(text.to_owned()));
        }

        let (cmd, args) = match text.split_once(char::is_whitespace) {
            Some((cmd, args)) => (cmd.to_lowercase(), Some(args.trim())),
            None => (text.to_lowercase(), None),
        };
        let arg = args.filter(|a| !a.is_empty()).map(str::to_owned);

        match cmd.as_str() {
            "/start" => Some(Self::Start(arg)),
            "/joined" | "/verify_telegram" => Some(Self::Joined),
            "/photo" => Some(Self::Photo),
            "/ad" | "/watch_ad" => Some(Self::WatchAd),
            "/article" | "/read_article" => Some(Self::ReadArticle),
            "/profile" | "/refresh" | "/refresh_profile" => Some(Self::Profile),
            "/newtask" | "/new_task" => Some(Self::NewTask),
            "/help" | "/h" => Some(Self::Help),
            "/member" => arg.map(Self::Member),
            "/leave" => arg.map(Self::Leave),
            _ => Some(Self::Text(text.to_owned())),
        }
    }

    /// Returns the command name as it appears in help.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Start(_) => "start",
            Self::Joined => "joined",
            Self::Photo => "photo",
            Self::WatchAd => "ad",
            Self::ReadArticle => "article",
            Self::Profile => "profile",
            Self::NewTask => "newtask",
            Self::Help => "help",
            Self::Member(_) => "member",
            Self::Leave(_) => "leave",
            Self::Text(_) => "text",
        }
    }

    /// Returns all available commands with their descriptions.
    #[must_use]
    pub fn all_commands() -> Vec<(&'static str, &'static str, &'static str)> {
        vec![
            ("/start [code]", "", "Register, optionally with a referral code"),
            ("/joined", "(/verify_telegram)", "Confirm the channel join"),
            ("/photo", "", "Send the YouTube subscription screenshot"),
            ("/ad", "(/watch_ad)", "Claim the ad-watch reward"),
            ("/article", "(/read_article)", "Get an article code to send back"),
            ("/profile", "(/refresh)", "Show balance and referral link"),
            ("/newtask", "", "Look for a new task"),
            ("/member <channel>", "", "Mark a channel as joined"),
            ("/leave <channel>", "", "Mark a channel as left"),
            ("/help", "(/h)", "Show this help message"),
            ("<text>", "", "Instagram username or article code"),
        ]
    }
}

impl fmt::Display for BotCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start(Some(code)) => write!(f, "start {code}"),
            Self::Member(channel) => write!(f, "member {channel}"),
            Self::Leave(channel) => write!(f, "leave {channel}"),
            // Free text may carry a session code; keep it out of logs.
            Self::Text(text) => write!(f, "text ({} chars)", text.chars().count()),
            _ => write!(f, "{}", self.name()),
        }
    }
}

/// Result of handling an event.
#[derive(Debug, Clone)]
pub struct CommandResult {
    /// Whether the event was handled without a user-facing error.
    pub success: bool,

    /// Response message to show the user.
    pub message: String,
}

impl CommandResult {
    /// Creates a successful result.
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    /// Creates an error result.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}
