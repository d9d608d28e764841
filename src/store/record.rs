//! Strongly typed user records and partial updates.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::StoreError;

/// Position of a user in the linear onboarding sequence.
///
/// Stages are ordered; a record only ever moves to a later stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStage {
    /// Record created, channel join pending.
    #[default]
    Start,
    /// Channel join confirmed, Instagram handle pending.
    TelegramDone,
    /// Instagram handle captured, YouTube proof pending.
    InstagramDone,
    /// Linear flow finished.
    YoutubeDone,
}

impl TaskStage {
    /// Returns the stage that follows this one, if any.
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Start => Some(Self::TelegramDone),
            Self::TelegramDone => Some(Self::InstagramDone),
            Self::InstagramDone => Some(Self::YoutubeDone),
            Self::YoutubeDone => None,
        }
    }

    /// Returns the persisted name of the stage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::TelegramDone => "telegram_done",
            Self::InstagramDone => "instagram_done",
            Self::YoutubeDone => "youtube_done",
        }
    }

    /// Returns true once the linear flow is finished.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::YoutubeDone)
    }
}

impl fmt::Display for TaskStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Informational profile fields supplied by the transport on first contact.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileSeed {
    pub display_name: String,
    pub handle: String,
}

impl ProfileSeed {
    #[must_use]
    pub fn new(display_name: impl Into<String>, handle: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            handle: handle.into(),
        }
    }
}

/// Fields required to create a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub id: String,
    pub seed: ProfileSeed,
    pub referral_code: String,
    pub referred_by: Option<String>,
}

/// One persisted user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// External user identifier, immutable.
    pub id: String,

    #[serde(default)]
    pub display_name: String,

    #[serde(default)]
    pub handle: String,

    pub joined_at: DateTime<Utc>,

    /// Code other users pass in a deep link to name this user as referrer.
    pub referral_code: String,

    /// Referral code of whoever referred this user at signup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referred_by: Option<String>,

    #[serde(default)]
    pub referral_count: u64,

    #[serde(default)]
    pub balance: u64,

    #[serde(default)]
    pub task_stage: TaskStage,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instagram_handle: Option<String>,

    /// Outstanding article challenge, cleared on redemption.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_session_code: Option<String>,
}

impl UserRecord {
    /// Builds a fresh record from creation fields.
    #[must_use]
    pub fn from_new(new: NewUser, joined_at: DateTime<Utc>) -> Self {
        Self {
            id: new.id,
            display_name: new.seed.display_name,
            handle: new.seed.handle,
            joined_at,
            referral_code: new.referral_code,
            referred_by: new.referred_by.filter(|code| !code.is_empty()),
            referral_count: 0,
            balance: 0,
            task_stage: TaskStage::Start,
            instagram_handle: None,
            pending_session_code: None,
        }
    }

    /// Applies a partial update after checking the record invariants.
    ///
    /// Balance and referral count never decrease and the stage never regresses.
    /// On error the record is left untouched.
    pub fn apply(&mut self, patch: &UserPatch) -> Result<(), StoreError> {
        if let Some(balance) = patch.balance
            && balance < self.balance
        {
            return Err(self.rejected(format!(
                "balance would decrease from {} to {balance}",
                self.balance
            )));
        }
        if let Some(count) = patch.referral_count
            && count < self.referral_count
        {
            return Err(self.rejected(format!(
                "referral count would decrease from {} to {count}",
                self.referral_count
            )));
        }
        if let Some(stage) = patch.task_stage
            && stage < self.task_stage
        {
            return Err(self.rejected(format!(
                "stage would regress from {} to {stage}",
                self.task_stage
            )));
        }

        if let Some(name) = &patch.display_name {
            self.display_name.clone_from(name);
        }
        if let Some(handle) = &patch.handle {
            self.handle.clone_from(handle);
        }
        if let Some(balance) = patch.balance {
            self.balance = balance;
        }
        if let Some(count) = patch.referral_count {
            self.referral_count = count;
        }
        if let Some(stage) = patch.task_stage {
            self.task_stage = stage;
        }
        if let Some(ig) = &patch.instagram_handle {
            self.instagram_handle = Some(ig.clone());
        }
        if let Some(code) = &patch.pending_session_code {
            self.pending_session_code.clone_from(code);
        }
        Ok(())
    }

    fn rejected(&self, reason: String) -> StoreError {
        StoreError::Rejected {
            id: self.id.clone(),
            reason,
        }
    }
}

/// Partial update of a record. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserPatch {
    pub display_name: Option<String>,
    pub handle: Option<String>,
    pub balance: Option<u64>,
    pub referral_count: Option<u64>,
    pub task_stage: Option<TaskStage>,
    pub instagram_handle: Option<String>,
    /// `Some(None)` clears the pending code.
    pub pending_session_code: Option<Option<String>>,
}

impl UserPatch {
    /// Builds the patch that turns `before` into `after`.
    ///
    /// Immutable fields are ignored.
    #[must_use]
    pub fn diff(before: &UserRecord, after: &UserRecord) -> Self {
        fn changed<T: PartialEq + Clone>(old: &T, new: &T) -> Option<T> {
            (old != new).then(|| new.clone())
        }

        Self {
            display_name: changed(&before.display_name, &after.display_name),
            handle: changed(&before.handle, &after.handle),
            balance: changed(&before.balance, &after.balance),
            referral_count: changed(&before.referral_count, &after.referral_count),
            task_stage: changed(&before.task_stage, &after.task_stage),
            instagram_handle: changed(&before.instagram_handle, &after.instagram_handle).flatten(),
            pending_session_code: changed(&before.pending_session_code, &after.pending_session_code),
        }
    }

    /// Returns true if the patch changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
