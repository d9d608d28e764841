//! Results returned to the transport layer for rendering.

use std::time::Duration;

use thiserror::Error;

use crate::ledger::RewardKind;
use crate::referral::ReferralError;
use crate::store::{StoreError, TaskStage, UserRecord};

/// What the user should do next in the linear flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextStep {
    /// Join the listed channels, then confirm.
    JoinChannels { channels: Vec<String> },
    /// Reply with an Instagram username.
    EnterInstagram,
    /// Send a screenshot proving the YouTube subscription.
    SendYoutubeProof,
    /// All tasks done; share the referral link.
    Completed,
}

impl NextStep {
    #[must_use]
    pub fn for_stage(stage: TaskStage, channels: &[String]) -> Self {
        match stage {
            TaskStage::Start => Self::JoinChannels {
                channels: channels.to_vec(),
            },
            TaskStage::TelegramDone => Self::EnterInstagram,
            TaskStage::InstagramDone => Self::SendYoutubeProof,
            TaskStage::YoutubeDone => Self::Completed,
        }
    }
}

/// Result of the entry intent.
#[derive(Debug, Clone)]
pub struct EntryOutcome {
    pub record: UserRecord,
    /// True if this call created the record.
    pub created: bool,
    /// True if a referrer was credited for this signup.
    pub referrer_credited: bool,
    pub next: NextStep,
}

/// Result of a stage-advancing trigger.
#[derive(Debug, Clone)]
pub enum TransitionOutcome {
    Advanced {
        record: UserRecord,
        credited: u64,
        next: NextStep,
    },
    /// Duplicate or out-of-order trigger; nothing changed.
    AlreadyCompleted { record: UserRecord, next: NextStep },
}

impl TransitionOutcome {
    #[must_use]
    pub const fn record(&self) -> &UserRecord {
        match self {
            Self::Advanced { record, .. } | Self::AlreadyCompleted { record, .. } => record,
        }
    }
}

/// Result of a free-text message.
#[derive(Debug, Clone)]
pub enum TextOutcome {
    /// The text was the pending article code.
    ArticleRedeemed { record: UserRecord, credited: u64 },
    /// The text was taken as the Instagram handle.
    InstagramCaptured {
        record: UserRecord,
        credited: u64,
        next: NextStep,
    },
    /// Neither applied; nothing changed.
    Ignored { record: UserRecord },
}

/// A credited repeatable reward.
#[derive(Debug, Clone)]
pub struct RewardGranted {
    pub record: UserRecord,
    pub kind: RewardKind,
    pub credited: u64,
}

/// An issued article challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleChallenge {
    pub code: String,
    /// Article link carrying the code.
    pub link: String,
}

/// Snapshot shown on profile queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileView {
    pub user_id: String,
    pub display_name: String,
    pub balance: u64,
    pub referral_count: u64,
    pub referral_code: String,
    pub referral_link: String,
    pub stage: TaskStage,
    pub next: NextStep,
}

/// Errors surfaced by flow intents.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("User {0} has no record yet; send /start first")]
    NotInitialized(String),

    #[error("Membership precondition not met; missing channels: {missing:?}")]
    PreconditionNotMet { missing: Vec<String> },

    #[error("Reward {kind} is on cooldown for another {}s", remaining.as_secs())]
    CooldownActive { kind: RewardKind, remaining: Duration },

    #[error("No unique referral code available after {attempts} attempts")]
    ReferralCodesExhausted { attempts: usize },

    #[error("Storage failure: {0}")]
    Storage(#[from] StoreError),
}

impl FlowError {
    /// Returns true for failures that are operational faults rather than
    /// user-facing validation results.
    #[must_use]
    pub const fn is_fault(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::ReferralCodesExhausted { .. })
    }
}

impl From<ReferralError> for FlowError {
    fn from(err: ReferralError) -> Self {
        match err {
            ReferralError::Exhausted { attempts } => Self::ReferralCodesExhausted { attempts },
            ReferralError::Store(e) => Self::Storage(e),
        }
    }
}
