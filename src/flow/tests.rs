use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::*;
use crate::config::{BotSettings, CreationMode, RewardTable};
use crate::ledger::RewardKind;
use crate::store::{
    MemoryStore, NewUser, ProfileSeed, StoreError, TaskStage, UserPatch, UserRecord, UserStore,
};

/// Memory store whose updates can be switched to fail.
#[derive(Debug, Default)]
struct FlakyStore {
    inner: MemoryStore,
    fail_updates: AtomicBool,
}

impl FlakyStore {
    fn set_failing(&self, failing: bool) {
        self.fail_updates.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl UserStore for FlakyStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<UserRecord>, StoreError> {
        self.inner.find_by_id(id).await
    }

    async fn find_by_referral_code(&self, code: &str) -> Result<Option<UserRecord>, StoreError> {
        self.inner.find_by_referral_code(code).await
    }

    async fn create(&self, new: NewUser) -> Result<UserRecord, StoreError> {
        self.inner.create(new).await
    }

    async fn update(&self, id: &str, patch: UserPatch) -> Result<UserRecord, StoreError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("timeout".to_owned()));
        }
        self.inner.update(id, patch).await
    }

    async fn count(&self) -> Result<usize, StoreError> {
        self.inner.count().await
    }

    async fn all(&self) -> Result<Vec<UserRecord>, StoreError> {
        self.inner.all().await
    }
}

fn settings() -> BotSettings {
    BotSettings {
        bot_username: "cnfc_bot".to_owned(),
        ..BotSettings::default()
    }
}

fn memory_flow() -> (TaskFlow, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let flow = TaskFlow::new(store.clone(), settings(), RewardTable::default());
    (flow, store)
}

fn flaky_flow() -> (TaskFlow, Arc<FlakyStore>) {
    let store = Arc::new(FlakyStore::default());
    let flow = TaskFlow::new(store.clone(), settings(), RewardTable::default());
    (flow, store)
}

fn seed(name: &str) -> ProfileSeed {
    ProfileSeed::new(name, name.to_lowercase())
}

async fn balance(store: &dyn UserStore, id: &str) -> u64 {
    store.find_by_id(id).await.unwrap().unwrap().balance
}

#[tokio::test]
async fn test_referral_signup_credits_referrer() {
    let (flow, store) = memory_flow();

    let a = flow.on_entry("A", seed("Ann"), None).await.unwrap();
    assert!(a.created);
    assert_eq!(a.record.task_stage, TaskStage::Start);
    assert_eq!(a.record.balance, 0);
    assert!(!a.record.referral_code.is_empty());

    let b = flow
        .on_entry("B", seed("Bob"), Some(&a.record.referral_code))
        .await
        .unwrap();
    assert!(b.created);
    assert!(b.referrer_credited);
    assert_eq!(b.record.referred_by.as_deref(), Some(a.record.referral_code.as_str()));

    let a_now = store.find_by_id("A").await.unwrap().unwrap();
    assert_eq!(a_now.referral_count, 1);
    assert_eq!(a_now.balance, 1000);
    assert_eq!(balance(&*store, "B").await, 0);
}

#[tokio::test]
async fn test_unknown_referral_code_is_ignored() {
    let (flow, store) = memory_flow();
    flow.on_entry("A", seed("Ann"), None).await.unwrap();

    let b = flow.on_entry("B", seed("Bob"), Some("NOPE")).await.unwrap();
    assert!(b.created);
    assert!(!b.referrer_credited);
    assert_eq!(b.record.referred_by, None);
    assert_eq!(balance(&*store, "A").await, 0);
}

#[tokio::test]
async fn test_repeated_entry_does_not_recredit() {
    let (flow, store) = memory_flow();
    let a = flow.on_entry("A", seed("Ann"), None).await.unwrap();
    flow.on_entry("B", seed("Bob"), Some(&a.record.referral_code))
        .await
        .unwrap();

    // Re-entering with any code, including their own or the referrer's, changes nothing.
    let again = flow
        .on_entry("B", ProfileSeed::default(), Some(&a.record.referral_code))
        .await
        .unwrap();
    assert!(!again.created);
    assert!(!again.referrer_credited);
    let own = flow
        .on_entry("A", ProfileSeed::default(), Some(&a.record.referral_code))
        .await
        .unwrap();
    assert!(!own.created);

    let a_now = store.find_by_id("A").await.unwrap().unwrap();
    assert_eq!(a_now.referral_count, 1);
    assert_eq!(a_now.balance, 1000);
}

#[tokio::test]
async fn test_entry_refreshes_profile_fields() {
    let (flow, store) = memory_flow();
    flow.on_entry("A", seed("Ann"), None).await.unwrap();
    flow.on_entry("A", ProfileSeed::new("Anna", "anna_k"), None)
        .await
        .unwrap();

    let rec = store.find_by_id("A").await.unwrap().unwrap();
    assert_eq!(rec.display_name, "Anna");
    assert_eq!(rec.handle, "anna_k");
}

#[tokio::test]
async fn test_duplicate_join_confirmation_credits_once() {
    let (flow, store) = memory_flow();
    flow.on_entry("A", seed("Ann"), None).await.unwrap();

    let first = flow.on_channel_join_confirmed("A").await.unwrap();
    assert!(matches!(first, TransitionOutcome::Advanced { credited: 1000, .. }));

    let second = flow.on_channel_join_confirmed("A").await.unwrap();
    assert!(matches!(second, TransitionOutcome::AlreadyCompleted { .. }));

    let rec = store.find_by_id("A").await.unwrap().unwrap();
    assert_eq!(rec.balance, 1000);
    assert_eq!(rec.task_stage, TaskStage::TelegramDone);
}

#[tokio::test]
async fn test_concurrent_duplicate_triggers_credit_once() {
    let (flow, store) = memory_flow();
    let flow = Arc::new(flow);
    flow.on_entry("A", seed("Ann"), None).await.unwrap();

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let flow = Arc::clone(&flow);
            tokio::spawn(async move { flow.on_channel_join_confirmed("A").await })
        })
        .collect();

    let mut advanced = 0;
    for handle in handles {
        if let TransitionOutcome::Advanced { .. } = handle.await.unwrap().unwrap() {
            advanced += 1;
        }
    }

    assert_eq!(advanced, 1);
    assert_eq!(balance(&*store, "A").await, 1000);
}

#[tokio::test]
async fn test_full_linear_flow() {
    let (flow, store) = memory_flow();
    flow.on_entry("A", seed("Ann"), None).await.unwrap();
    flow.on_channel_join_confirmed("A").await.unwrap();

    let text = flow.on_free_text("A", "ann_on_ig").await.unwrap();
    let TextOutcome::InstagramCaptured { record, credited, next } = text else {
        panic!("expected instagram capture");
    };
    assert_eq!(credited, 500);
    assert_eq!(record.instagram_handle.as_deref(), Some("ann_on_ig"));
    assert_eq!(next, NextStep::SendYoutubeProof);

    let photo = flow.on_photo_received("A").await.unwrap();
    assert!(matches!(photo, TransitionOutcome::Advanced { credited: 500, next: NextStep::Completed, .. }));

    let replay = flow.on_photo_received("A").await.unwrap();
    assert!(matches!(replay, TransitionOutcome::AlreadyCompleted { .. }));

    let late_text = flow.on_free_text("A", "other_handle").await.unwrap();
    assert!(matches!(late_text, TextOutcome::Ignored { .. }));

    let rec = store.find_by_id("A").await.unwrap().unwrap();
    assert_eq!(rec.balance, 2000);
    assert_eq!(rec.task_stage, TaskStage::YoutubeDone);
    assert_eq!(rec.instagram_handle.as_deref(), Some("ann_on_ig"));
}

#[tokio::test]
async fn test_out_of_order_triggers_are_noops() {
    let (flow, store) = memory_flow();
    flow.on_entry("A", seed("Ann"), None).await.unwrap();

    let photo = flow.on_photo_received("A").await.unwrap();
    assert!(matches!(photo, TransitionOutcome::AlreadyCompleted { .. }));
    assert_eq!(photo.record().task_stage, TaskStage::Start);

    let text = flow.on_free_text("A", "ann_on_ig").await.unwrap();
    assert!(matches!(text, TextOutcome::Ignored { .. }));

    let rec = store.find_by_id("A").await.unwrap().unwrap();
    assert_eq!(rec.balance, 0);
    assert_eq!(rec.instagram_handle, None);
}

#[tokio::test]
async fn test_strict_mode_requires_entry() {
    let (flow, store) = memory_flow();

    assert!(matches!(
        flow.on_channel_join_confirmed("ghost").await,
        Err(FlowError::NotInitialized(_))
    ));
    assert!(matches!(flow.on_photo_received("ghost").await, Err(FlowError::NotInitialized(_))));
    assert!(matches!(flow.on_free_text("ghost", "hi").await, Err(FlowError::NotInitialized(_))));
    assert!(matches!(flow.on_watch_ad_claim("ghost").await, Err(FlowError::NotInitialized(_))));
    assert!(matches!(flow.on_profile_query("ghost").await, Err(FlowError::NotInitialized(_))));
    assert_eq!(store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_implicit_mode_creates_record() {
    let store = Arc::new(MemoryStore::new());
    let settings = BotSettings {
        creation_mode: CreationMode::Implicit,
        ..settings()
    };
    let flow = TaskFlow::new(store.clone(), settings, RewardTable::default());

    let outcome = flow.on_channel_join_confirmed("new").await.unwrap();
    assert!(matches!(outcome, TransitionOutcome::Advanced { credited: 1000, .. }));
    let rec = store.find_by_id("new").await.unwrap().unwrap();
    assert_eq!(rec.referred_by, None);
    assert_eq!(rec.balance, 1000);
}

#[tokio::test]
async fn test_implicit_mode_gate_blocks_creation() {
    let store = Arc::new(MemoryStore::new());
    let roster = Arc::new(ChannelRoster::new(vec!["news".to_owned()]));
    let settings = BotSettings {
        creation_mode: CreationMode::Implicit,
        ..settings()
    };
    let flow = TaskFlow::new(store.clone(), settings, RewardTable::default())
        .with_gate(roster.clone());

    assert!(matches!(
        flow.on_channel_join_confirmed("ghost").await,
        Err(FlowError::PreconditionNotMet { .. })
    ));
    assert!(matches!(flow.on_watch_ad_claim("ghost").await, Err(FlowError::PreconditionNotMet { .. })));
    assert_eq!(store.count().await.unwrap(), 0);

    roster.join("ghost", "news").await;
    let outcome = flow.on_channel_join_confirmed("ghost").await.unwrap();
    assert!(matches!(outcome, TransitionOutcome::Advanced { credited: 1000, .. }));
    assert_eq!(store.count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_membership_gate_blocks_without_mutation() {
    let store = Arc::new(MemoryStore::new());
    let roster = Arc::new(ChannelRoster::new(vec!["news".to_owned()]));
    let flow = TaskFlow::new(store.clone(), settings(), RewardTable::default())
        .with_gate(roster.clone());
    flow.on_entry("A", seed("Ann"), None).await.unwrap();

    let err = flow.on_channel_join_confirmed("A").await.unwrap_err();
    assert!(matches!(err, FlowError::PreconditionNotMet { ref missing } if *missing == vec!["news".to_owned()]));
    assert!(matches!(flow.on_watch_ad_claim("A").await, Err(FlowError::PreconditionNotMet { .. })));
    assert_eq!(balance(&*store, "A").await, 0);

    roster.join("A", "news").await;
    let ok = flow.on_channel_join_confirmed("A").await.unwrap();
    assert!(matches!(ok, TransitionOutcome::Advanced { .. }));
}

#[tokio::test]
async fn test_article_code_is_exact_and_single_use() {
    let (flow, store) = memory_flow();
    flow.on_entry("A", seed("Ann"), None).await.unwrap();

    let challenge = flow.on_read_article_request("A").await.unwrap();
    assert!(challenge.link.ends_with(&format!("code={}", challenge.code)));

    // Pin a known code to mirror what the user saw.
    store
        .update(
            "A",
            UserPatch {
                pending_session_code: Some(Some("AB12CD34".to_owned())),
                ..UserPatch::default()
            },
        )
        .await
        .unwrap();

    let wrong_case = flow.on_free_text("A", "ab12cd34").await.unwrap();
    assert!(matches!(wrong_case, TextOutcome::Ignored { .. }));
    assert_eq!(balance(&*store, "A").await, 0);

    let redeemed = flow.on_free_text("A", "AB12CD34").await.unwrap();
    let TextOutcome::ArticleRedeemed { record, credited } = redeemed else {
        panic!("expected redemption");
    };
    assert_eq!(credited, 100);
    assert_eq!(record.pending_session_code, None);

    let again = flow.on_free_text("A", "AB12CD34").await.unwrap();
    assert!(matches!(again, TextOutcome::Ignored { .. }));
    assert_eq!(balance(&*store, "A").await, 100);
}

#[tokio::test]
async fn test_article_cooldown_blocks_new_challenge() {
    let (flow, _store) = memory_flow();
    flow.on_entry("A", seed("Ann"), None).await.unwrap();

    let challenge = flow.on_read_article_request("A").await.unwrap();
    flow.on_free_text("A", &challenge.code).await.unwrap();

    assert!(matches!(
        flow.on_read_article_request("A").await,
        Err(FlowError::CooldownActive { kind: RewardKind::ReadArticle, .. })
    ));
}

#[tokio::test]
async fn test_mismatched_code_falls_through_to_instagram() {
    let (flow, store) = memory_flow();
    flow.on_entry("A", seed("Ann"), None).await.unwrap();
    flow.on_channel_join_confirmed("A").await.unwrap();
    flow.on_read_article_request("A").await.unwrap();

    let outcome = flow.on_free_text("A", "ann_on_ig").await.unwrap();
    assert!(matches!(outcome, TextOutcome::InstagramCaptured { .. }));

    let rec = store.find_by_id("A").await.unwrap().unwrap();
    assert!(rec.pending_session_code.is_some());
    assert_eq!(rec.balance, 1500);
}

#[tokio::test]
async fn test_ad_claim_cooldown() {
    let (flow, store) = memory_flow();
    flow.on_entry("A", seed("Ann"), None).await.unwrap();

    let granted = flow.on_watch_ad_claim("A").await.unwrap();
    assert_eq!(granted.credited, 30);

    let err = flow.on_watch_ad_claim("A").await.unwrap_err();
    let FlowError::CooldownActive { kind, remaining } = err else {
        panic!("expected cooldown");
    };
    assert_eq!(kind, RewardKind::WatchAd);
    assert!(remaining <= Duration::from_secs(60));
    assert_eq!(balance(&*store, "A").await, 30);
}

#[tokio::test]
async fn test_ad_claim_after_window() {
    let store = Arc::new(MemoryStore::new());
    let rewards = RewardTable {
        ad_cooldown_secs: 1,
        ..RewardTable::default()
    };
    let flow = TaskFlow::new(store.clone(), settings(), rewards);
    flow.on_entry("A", seed("Ann"), None).await.unwrap();

    flow.on_watch_ad_claim("A").await.unwrap();
    assert!(flow.on_watch_ad_claim("A").await.is_err());

    tokio::time::sleep(Duration::from_millis(1100)).await;
    flow.on_watch_ad_claim("A").await.unwrap();
    assert_eq!(balance(&*store, "A").await, 60);
}

#[tokio::test]
async fn test_storage_failure_leaves_no_credit() {
    let (flow, store) = flaky_flow();
    flow.on_entry("A", seed("Ann"), None).await.unwrap();

    store.set_failing(true);
    let err = flow.on_channel_join_confirmed("A").await.unwrap_err();
    assert!(matches!(err, FlowError::Storage(_)));
    assert!(err.is_fault());
    assert!(matches!(flow.on_watch_ad_claim("A").await, Err(FlowError::Storage(_))));

    let rec = store.find_by_id("A").await.unwrap().unwrap();
    assert_eq!(rec.balance, 0);
    assert_eq!(rec.task_stage, TaskStage::Start);

    // The failed ad claim must not leave a cooldown behind.
    store.set_failing(false);
    assert_eq!(flow.on_watch_ad_claim("A").await.unwrap().credited, 30);
    assert!(flow.on_channel_join_confirmed("A").await.is_ok());
}

#[tokio::test]
async fn test_referrer_credit_failure_keeps_signup() {
    let (flow, store) = flaky_flow();
    let a = flow.on_entry("A", seed("Ann"), None).await.unwrap();

    store.set_failing(true);
    let b = flow
        .on_entry("B", seed("Bob"), Some(&a.record.referral_code))
        .await
        .unwrap();
    assert!(b.created);
    assert!(!b.referrer_credited);
    assert!(store.find_by_id("B").await.unwrap().is_some());

    let a_now = store.find_by_id("A").await.unwrap().unwrap();
    assert_eq!(a_now.balance, 0);
    assert_eq!(a_now.referral_count, 0);
}

#[tokio::test]
async fn test_concurrent_signups_get_unique_codes() {
    let (flow, store) = memory_flow();
    let flow = Arc::new(flow);

    let handles: Vec<_> = (0..40)
        .map(|i| {
            let flow = Arc::clone(&flow);
            tokio::spawn(async move { flow.on_entry(&format!("u{i}"), ProfileSeed::default(), None).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let all = store.all().await.unwrap();
    let codes: HashSet<_> = all.iter().map(|r| r.referral_code.as_str()).collect();
    assert_eq!(all.len(), 40);
    assert_eq!(codes.len(), 40);
}

#[tokio::test]
async fn test_balance_never_decreases() {
    let (flow, store) = memory_flow();
    flow.on_entry("A", seed("Ann"), None).await.unwrap();

    let mut last = 0;
    for step in 0..12 {
        // Errors such as cooldowns are expected along the way.
        let _ = match step % 6 {
            0 => flow.on_channel_join_confirmed("A").await.map(|_| ()),
            1 => flow.on_free_text("A", "handle").await.map(|_| ()),
            2 => flow.on_photo_received("A").await.map(|_| ()),
            3 => flow.on_watch_ad_claim("A").await.map(|_| ()),
            4 => flow.on_read_article_request("A").await.map(|_| ()),
            _ => flow.on_entry("A", ProfileSeed::default(), Some("USER001")).await.map(|_| ()),
        };
        let now = balance(&*store, "A").await;
        assert!(now >= last);
        last = now;
    }
    assert_eq!(last, 2030);
}

#[tokio::test]
async fn test_profile_query() {
    let (flow, _store) = memory_flow();
    let a = flow.on_entry("A", seed("Ann"), None).await.unwrap();

    let profile = flow.on_profile_query("A").await.unwrap();
    assert_eq!(profile.balance, 0);
    assert_eq!(profile.referral_code, a.record.referral_code);
    assert_eq!(
        profile.referral_link,
        format!("https://t.me/cnfc_bot?start={}", a.record.referral_code)
    );
    assert_eq!(profile.next, NextStep::JoinChannels { channels: vec![] });
}
