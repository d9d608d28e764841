//! Process-local cooldown markers for repeatable rewards.
//!
//! Markers expire on their own after the window passes. They are not
//! persisted: after a restart a user may claim once more before the window
//! would have closed.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::debug;

use super::RewardKind;

/// Keyed expiry map of `(user id, reward kind) -> deadline`.
#[derive(Debug, Default)]
pub struct CooldownTracker {
    markers: Mutex<HashMap<(String, RewardKind), Instant>>,
}

impl CooldownTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a cooldown unless one is active.
    ///
    /// Returns the remaining wait if the marker is still live.
    pub async fn try_acquire(
        &self,
        user_id: &str,
        kind: RewardKind,
        window: Duration,
    ) -> Result<(), Duration> {
        let mut markers = self.markers.lock().await;
        let key = (user_id.to_owned(), kind);
        let now = Instant::now();

        if let Some(&deadline) = markers.get(&key)
            && deadline > now
        {
            return Err(deadline - now);
        }

        markers.insert(key, now + window);
        debug!("Cooldown started: user={} kind={} window={:?}", user_id, kind, window);
        Ok(())
    }

    /// Drops a marker, e.g. after the credit it guarded failed to persist.
    pub async fn release(&self, user_id: &str, kind: RewardKind) {
        let mut markers = self.markers.lock().await;
        markers.remove(&(user_id.to_owned(), kind));
    }

    /// Returns the time left on an active marker.
    pub async fn remaining(&self, user_id: &str, kind: RewardKind) -> Option<Duration> {
        let markers = self.markers.lock().await;
        let deadline = *markers.get(&(user_id.to_owned(), kind))?;
        let now = Instant::now();
        (deadline > now).then(|| deadline - now)
    }

    /// Removes expired markers and returns how many were dropped.
    pub async fn purge_expired(&self) -> usize {
        let mut markers = self.markers.lock().await;
        let now = Instant::now();
        let before = markers.len();
        markers.retain(|_, deadline| *deadline > now);
        before - markers.len()
    }

    /// Number of stored markers, expired or not.
    pub async fn len(&self) -> usize {
        self.markers.lock().await.len()
    }

    /// Returns true if no markers are stored.
    pub async fn is_empty(&self) -> bool {
        self.markers.lock().await.is_empty()
    }
}
