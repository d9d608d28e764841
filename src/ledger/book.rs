//! Point credits for stage transitions and repeatable rewards.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::{CooldownTracker, RewardKind};
use crate::config::RewardTable;
use crate::store::{TaskStage, UserRecord};

/// Result of applying a stage transition to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionStatus {
    /// Stage advanced and `credited` points were added.
    Advanced { credited: u64 },
    /// The record is no longer at the source stage; nothing changed.
    AlreadyCompleted,
}

/// Applies reward rules to in-memory records.
///
/// The ledger never writes to storage. Callers persist the mutated record and
/// call [`RewardLedger::release`] if a cooldown-gated credit fails to persist.
#[derive(Debug)]
pub struct RewardLedger {
    table: RewardTable,
    cooldowns: Arc<CooldownTracker>,
}

impl RewardLedger {
    #[must_use]
    pub fn new(table: RewardTable) -> Self {
        Self::with_tracker(table, Arc::new(CooldownTracker::new()))
    }

    #[must_use]
    pub const fn with_tracker(table: RewardTable, cooldowns: Arc<CooldownTracker>) -> Self {
        Self { table, cooldowns }
    }

    #[must_use]
    pub const fn table(&self) -> &RewardTable {
        &self.table
    }

    #[must_use]
    pub fn cooldowns(&self) -> &Arc<CooldownTracker> {
        &self.cooldowns
    }

    /// Advances `record` from `from` to `to` and credits the stage reward.
    ///
    /// A record not at `from`, or a `to` that does not directly follow
    /// `from`, is left unchanged.
    pub fn credit_for_transition(
        &self,
        record: &mut UserRecord,
        from: TaskStage,
        to: TaskStage,
    ) -> TransitionStatus {
        if record.task_stage != from {
            debug!(
                "Stale transition for user {}: at {}, trigger expects {}",
                record.id, record.task_stage, from
            );
            return TransitionStatus::AlreadyCompleted;
        }
        if from.next() != Some(to) {
            warn!("Illegal transition {} -> {} for user {}", from, to, record.id);
            return TransitionStatus::AlreadyCompleted;
        }

        let credited = self.table.stage_credit(to);
        record.task_stage = to;
        record.balance = record.balance.saturating_add(credited);
        TransitionStatus::Advanced { credited }
    }

    /// Credits a cooldown-gated reward and starts its cooldown.
    ///
    /// Returns the credited amount, or the remaining wait if the cooldown for
    /// this user and kind is still active. One-time kinds are credited with
    /// no cooldown.
    pub async fn claim_cooldowned_reward(
        &self,
        record: &mut UserRecord,
        kind: RewardKind,
    ) -> Result<u64, Duration> {
        if let Some(window) = self.table.cooldown(kind) {
            self.cooldowns.try_acquire(&record.id, kind, window).await?;
        }

        let amount = self.table.amount(kind);
        record.balance = record.balance.saturating_add(amount);
        Ok(amount)
    }

    /// Returns the remaining cooldown for a user and kind, if any.
    pub async fn cooldown_remaining(&self, user_id: &str, kind: RewardKind) -> Option<Duration> {
        self.cooldowns.remaining(user_id, kind).await
    }

    /// Drops a cooldown started by a claim whose write failed.
    pub async fn release(&self, user_id: &str, kind: RewardKind) {
        self.cooldowns.release(user_id, kind).await;
    }

    /// Credits a referrer for one valid signup.
    pub fn credit_referral(&self, referrer: &mut UserRecord) -> u64 {
        let amount = self.table.amount(RewardKind::Referral);
        referrer.referral_count += 1;
        referrer.balance = referrer.balance.saturating_add(amount);
        amount
    }
}
