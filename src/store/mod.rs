//! User record storage.
//!
//! The task flow only talks to the [`UserStore`] trait. Two adapters ship with
//! the crate: an in-memory table and a JSON file that is rewritten after every
//! confirmed change.

mod audit;
mod json_file;
mod memory;
mod record;
mod table;

use async_trait::async_trait;
use thiserror::Error;

pub use audit::{AuditIssue, audit_records};
pub use json_file::{JsonFileStore, read_records};
pub use memory::MemoryStore;
pub use record::{NewUser, ProfileSeed, TaskStage, UserPatch, UserRecord};

/// Errors returned by record stores.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("User not found: {0}")]
    NotFound(String),

    #[error("User already exists: {0}")]
    AlreadyExists(String),

    #[error("Referral code already assigned: {0}")]
    DuplicateReferralCode(String),

    #[error("Update rejected for user {id}: {reason}")]
    Rejected { id: String, reason: String },

    #[error("Record store unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to parse record file: {0}")]
    Parse(#[from] serde_json::Error),
}

impl StoreError {
    /// Returns true for failures worth retrying later.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Persistent per-user records keyed by external identity.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Looks a record up by user id.
    async fn find_by_id(&self, id: &str) -> Result<Option<UserRecord>, StoreError>;

    /// Looks a record up by its referral code.
    async fn find_by_referral_code(&self, code: &str) -> Result<Option<UserRecord>, StoreError>;

    /// Creates a record. Fails if the id or referral code is taken.
    async fn create(&self, new: NewUser) -> Result<UserRecord, StoreError>;

    /// Applies a partial update. Fails if the id is unknown.
    async fn update(&self, id: &str, patch: UserPatch) -> Result<UserRecord, StoreError>;

    /// Number of stored records.
    async fn count(&self) -> Result<usize, StoreError>;

    /// Every stored record, oldest first.
    async fn all(&self) -> Result<Vec<UserRecord>, StoreError>;
}
