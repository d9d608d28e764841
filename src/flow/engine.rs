//! Task flow engine.
//!
//! Each intent follows the same shape:
//! 1. Take the user's lock
//! 2. Load the record (or create it, depending on the intent and mode)
//! 3. Check the membership gate if the trigger would change state
//! 4. Apply ledger rules to a copy of the record
//! 5. Persist the difference; only a confirmed write is reported as credited
//!
//! Referrer bonuses are written after the new user's lock is released, under
//! the referrer's own lock, as an independent write.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::gate::{MembershipGate, OpenGate};
use super::locks::UserLocks;
use super::outcome::{
    ArticleChallenge, EntryOutcome, FlowError, NextStep, ProfileView, RewardGranted,
    TextOutcome, TransitionOutcome,
};
use crate::config::{BotSettings, CreationMode, RewardTable};
use crate::ledger::{RewardKind, RewardLedger, TransitionStatus, challenge};
use crate::referral::{ReferralEngine, ReferralError, strategy_for};
use crate::store::{NewUser, ProfileSeed, StoreError, TaskStage, UserPatch, UserRecord, UserStore};

/// Drives users through the task sequence.
pub struct TaskFlow {
    store: Arc<dyn UserStore>,
    ledger: RewardLedger,
    referrals: ReferralEngine,
    gate: Arc<dyn MembershipGate>,
    locks: UserLocks,
    settings: BotSettings,
}

impl TaskFlow {
    /// Creates a flow with an always-open membership gate.
    #[must_use]
    pub fn new(store: Arc<dyn UserStore>, settings: BotSettings, rewards: RewardTable) -> Self {
        Self {
            store,
            ledger: RewardLedger::new(rewards),
            referrals: ReferralEngine::new(strategy_for(settings.referral_codes)),
            gate: Arc::new(OpenGate),
            locks: UserLocks::new(),
            settings,
        }
    }

    /// Replaces the membership gate.
    #[must_use]
    pub fn with_gate(mut self, gate: Arc<dyn MembershipGate>) -> Self {
        self.gate = gate;
        self
    }

    /// Replaces the referral engine.
    #[must_use]
    pub fn with_referrals(mut self, referrals: ReferralEngine) -> Self {
        self.referrals = referrals;
        self
    }

    #[must_use]
    pub const fn ledger(&self) -> &RewardLedger {
        &self.ledger
    }

    #[must_use]
    pub const fn settings(&self) -> &BotSettings {
        &self.settings
    }

    /// First contact. Creates the record if absent and credits the referrer
    /// named by `ref_code` when it resolves to another user.
    pub async fn on_entry(
        &self,
        user_id: &str,
        seed: ProfileSeed,
        ref_code: Option<&str>,
    ) -> Result<EntryOutcome, FlowError> {
        let guard = self.locks.lock(user_id).await;

        if let Some(existing) = self.load(user_id).await? {
            let record = self.refresh_profile(existing, seed).await?;
            drop(guard);
            return Ok(EntryOutcome {
                next: self.next_step(record.task_stage),
                record,
                created: false,
                referrer_credited: false,
            });
        }

        let (record, referrer) = self.create_record(user_id, seed, ref_code).await?;
        drop(guard);

        let referrer_credited = match referrer {
            Some(referrer) => self.credit_referrer(&referrer.id, &record).await,
            None => false,
        };

        Ok(EntryOutcome {
            next: self.next_step(record.task_stage),
            record,
            created: true,
            referrer_credited,
        })
    }

    /// The user says they joined the required channels.
    pub async fn on_channel_join_confirmed(&self, user_id: &str) -> Result<TransitionOutcome, FlowError> {
        let _guard = self.locks.lock(user_id).await;
        let record = self.require(user_id).await?;
        self.advance(record, TaskStage::Start, TaskStage::TelegramDone, |_| {})
            .await
    }

    /// Free text: redeems a pending article code, otherwise captures the
    /// Instagram handle if that stage is pending, otherwise does nothing.
    pub async fn on_free_text(&self, user_id: &str, text: &str) -> Result<TextOutcome, FlowError> {
        let _guard = self.locks.lock(user_id).await;
        let record = self.require(user_id).await?;

        if challenge::matches_pending(&record, text) {
            return self.redeem_article(record, text).await;
        }

        let handle = text.trim();
        if record.task_stage == TaskStage::TelegramDone && !handle.is_empty() {
            let handle = handle.to_owned();
            let outcome = self
                .advance(record, TaskStage::TelegramDone, TaskStage::InstagramDone, move |r| {
                    r.instagram_handle = Some(handle);
                })
                .await?;
            return Ok(match outcome {
                TransitionOutcome::Advanced { record, credited, next } => {
                    TextOutcome::InstagramCaptured { record, credited, next }
                }
                TransitionOutcome::AlreadyCompleted { record, .. } => TextOutcome::Ignored { record },
            });
        }

        debug!("Ignoring free text from user {} at {}", user_id, record.task_stage);
        Ok(TextOutcome::Ignored { record })
    }

    /// A photo arrived; taken as the YouTube subscription proof.
    pub async fn on_photo_received(&self, user_id: &str) -> Result<TransitionOutcome, FlowError> {
        let _guard = self.locks.lock(user_id).await;
        let record = self.require(user_id).await?;
        self.advance(record, TaskStage::InstagramDone, TaskStage::YoutubeDone, |_| {})
            .await
    }

    /// Claims the ad-watch reward.
    pub async fn on_watch_ad_claim(&self, user_id: &str) -> Result<RewardGranted, FlowError> {
        let _guard = self.locks.lock(user_id).await;
        let record = self.require(user_id).await?;
        self.check_gate(user_id).await?;

        let mut updated = record.clone();
        let credited = self.claim(&mut updated, RewardKind::WatchAd).await?;
        let record = self
            .persist_claim(&record, &updated, RewardKind::WatchAd)
            .await?;

        info!("User {} credited {} for watching an ad", user_id, credited);
        Ok(RewardGranted {
            record,
            kind: RewardKind::WatchAd,
            credited,
        })
    }

    /// Issues an article challenge code, replacing any pending one.
    pub async fn on_read_article_request(&self, user_id: &str) -> Result<ArticleChallenge, FlowError> {
        let _guard = self.locks.lock(user_id).await;
        let record = self.require(user_id).await?;
        self.check_gate(user_id).await?;

        if let Some(remaining) = self
            .ledger
            .cooldown_remaining(user_id, RewardKind::ReadArticle)
            .await
        {
            return Err(FlowError::CooldownActive {
                kind: RewardKind::ReadArticle,
                remaining,
            });
        }

        let mut updated = record.clone();
        let code = challenge::issue_challenge(&mut updated);
        self.persist(&record, &updated).await?;

        debug!("Issued article challenge for user {}", user_id);
        Ok(ArticleChallenge {
            link: self.settings.article_link(&code),
            code,
        })
    }

    /// Current profile snapshot.
    pub async fn on_profile_query(&self, user_id: &str) -> Result<ProfileView, FlowError> {
        let _guard = self.locks.lock(user_id).await;
        let record = self.require(user_id).await?;

        Ok(ProfileView {
            referral_link: self.settings.referral_link(&record.referral_code),
            next: self.next_step(record.task_stage),
            user_id: record.id,
            display_name: record.display_name,
            balance: record.balance,
            referral_count: record.referral_count,
            referral_code: record.referral_code,
            stage: record.task_stage,
        })
    }

    fn next_step(&self, stage: TaskStage) -> NextStep {
        NextStep::for_stage(stage, &self.settings.required_channels)
    }

    async fn load(&self, user_id: &str) -> Result<Option<UserRecord>, FlowError> {
        self.store.find_by_id(user_id).await.map_err(storage_fault)
    }

    /// Loads a record for a non-entry trigger, creating it in implicit mode.
    async fn require(&self, user_id: &str) -> Result<UserRecord, FlowError> {
        if let Some(record) = self.load(user_id).await? {
            return Ok(record);
        }
        match self.settings.creation_mode {
            CreationMode::Strict => Err(FlowError::NotInitialized(user_id.to_owned())),
            CreationMode::Implicit => {
                // Creation is a state change; a gated user leaves no record behind.
                self.check_gate(user_id).await?;
                debug!("Implicitly creating record for user {}", user_id);
                let (record, _) = self.create_record(user_id, ProfileSeed::default(), None).await?;
                Ok(record)
            }
        }
    }

    async fn check_gate(&self, user_id: &str) -> Result<(), FlowError> {
        let missing = self.gate.missing_channels(user_id).await;
        if missing.is_empty() {
            Ok(())
        } else {
            debug!("User {} is missing channels {:?}", user_id, missing);
            Err(FlowError::PreconditionNotMet { missing })
        }
    }

    /// Creates a record with a fresh referral code. Returns the resolved
    /// referrer, if any. Caller holds the user's lock.
    async fn create_record(
        &self,
        user_id: &str,
        seed: ProfileSeed,
        ref_code: Option<&str>,
    ) -> Result<(UserRecord, Option<UserRecord>), FlowError> {
        let referrer = self
            .referrals
            .resolve_referrer(self.store.as_ref(), user_id, ref_code)
            .await
            .map_err(storage_fault)?;

        let mut skip = 0;
        loop {
            let code = self
                .referrals
                .generate_unique_referral_code(self.store.as_ref(), skip)
                .await
                .map_err(|e| match e {
                    ReferralError::Store(e) => storage_fault(e),
                    other => other.into(),
                })?;

            // The new code cannot already be the referrer's, but never credit a user for themselves.
            let referrer = referrer.clone().filter(|r| r.referral_code != code);

            let new = NewUser {
                id: user_id.to_owned(),
                seed: seed.clone(),
                referral_code: code,
                referred_by: referrer.as_ref().map(|r| r.referral_code.clone()),
            };

            match self.store.create(new).await {
                Ok(record) => {
                    info!(
                        "Created user {} with code {} (referred by {:?})",
                        record.id, record.referral_code, record.referred_by
                    );
                    return Ok((record, referrer));
                }
                Err(StoreError::DuplicateReferralCode(code)) => {
                    debug!("Lost race for referral code {}, retrying", code);
                    skip += 1;
                }
                Err(e) => return Err(storage_fault(e)),
            }
        }
    }

    /// Updates informational fields on an existing record if they changed.
    async fn refresh_profile(&self, record: UserRecord, seed: ProfileSeed) -> Result<UserRecord, FlowError> {
        let mut updated = record.clone();
        if !seed.display_name.is_empty() {
            updated.display_name = seed.display_name;
        }
        if !seed.handle.is_empty() {
            updated.handle = seed.handle;
        }
        self.persist(&record, &updated).await
    }

    /// Credits the referrer of `new_user`. Failures are logged, not returned.
    async fn credit_referrer(&self, referrer_id: &str, new_user: &UserRecord) -> bool {
        let _guard = self.locks.lock(referrer_id).await;

        let referrer = match self.store.find_by_id(referrer_id).await {
            Ok(Some(r)) => r,
            Ok(None) => {
                warn!(
                    "Reconciliation gap: referrer {} of user {} disappeared before credit",
                    referrer_id, new_user.id
                );
                return false;
            }
            Err(e) => {
                warn!(
                    "Reconciliation gap: could not load referrer {} of user {}: {}",
                    referrer_id, new_user.id, e
                );
                return false;
            }
        };

        let mut updated = referrer.clone();
        let amount = self.ledger.credit_referral(&mut updated);

        match self
            .store
            .update(referrer_id, UserPatch::diff(&referrer, &updated))
            .await
        {
            Ok(_) => {
                info!(
                    "Referrer {} credited {} for signup of {}",
                    referrer_id, amount, new_user.id
                );
                true
            }
            Err(e) => {
                warn!(
                    "Reconciliation gap: referral bonus for {} (signup {}) not written: {}",
                    referrer_id, new_user.id, e
                );
                false
            }
        }
    }

    /// Applies a stage transition plus any extra field changes and persists it.
    async fn advance(
        &self,
        record: UserRecord,
        from: TaskStage,
        to: TaskStage,
        extra: impl FnOnce(&mut UserRecord),
    ) -> Result<TransitionOutcome, FlowError> {
        if record.task_stage != from {
            return Ok(TransitionOutcome::AlreadyCompleted {
                next: self.next_step(record.task_stage),
                record,
            });
        }
        self.check_gate(&record.id).await?;

        let mut updated = record.clone();
        match self.ledger.credit_for_transition(&mut updated, from, to) {
            TransitionStatus::AlreadyCompleted => Ok(TransitionOutcome::AlreadyCompleted {
                next: self.next_step(record.task_stage),
                record,
            }),
            TransitionStatus::Advanced { credited } => {
                extra(&mut updated);
                let record = self.persist(&record, &updated).await?;
                info!("User {} advanced to {} (+{})", record.id, to, credited);
                Ok(TransitionOutcome::Advanced {
                    next: self.next_step(record.task_stage),
                    record,
                    credited,
                })
            }
        }
    }

    async fn redeem_article(&self, record: UserRecord, text: &str) -> Result<TextOutcome, FlowError> {
        self.check_gate(&record.id).await?;

        let mut updated = record.clone();
        let credited = self.claim(&mut updated, RewardKind::ReadArticle).await?;
        challenge::redeem(&mut updated, text);
        let record = self
            .persist_claim(&record, &updated, RewardKind::ReadArticle)
            .await?;

        info!("User {} redeemed article code (+{})", record.id, credited);
        Ok(TextOutcome::ArticleRedeemed { record, credited })
    }

    async fn claim(&self, record: &mut UserRecord, kind: RewardKind) -> Result<u64, FlowError> {
        self.ledger
            .claim_cooldowned_reward(record, kind)
            .await
            .map_err(|remaining| FlowError::CooldownActive { kind, remaining })
    }

    /// Persists a cooldown-gated credit, releasing the cooldown on failure.
    async fn persist_claim(
        &self,
        before: &UserRecord,
        after: &UserRecord,
        kind: RewardKind,
    ) -> Result<UserRecord, FlowError> {
        match self.persist(before, after).await {
            Ok(record) => Ok(record),
            Err(e) => {
                self.ledger.release(&before.id, kind).await;
                Err(e)
            }
        }
    }

    async fn persist(&self, before: &UserRecord, after: &UserRecord) -> Result<UserRecord, FlowError> {
        let patch = UserPatch::diff(before, after);
        if patch.is_empty() {
            return Ok(after.clone());
        }
        self.store
            .update(&before.id, patch)
            .await
            .map_err(storage_fault)
    }
}

/// Logs a storage failure as an operational fault.
fn storage_fault(err: StoreError) -> FlowError {
    error!("Record store failure: {}", err);
    FlowError::Storage(err)
}

impl std::fmt::Debug for TaskFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskFlow")
            .field("ledger", &self.ledger)
            .field("referrals", &self.referrals)
            .field("creation_mode", &self.settings.creation_mode)
            .finish_non_exhaustive()
    }
}
