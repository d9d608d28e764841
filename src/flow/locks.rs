//! Per-user serialization of mutating intents.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockMap = DashMap<String, Arc<Mutex<()>>>;

/// Registry of one async mutex per user id.
///
/// Entries live only while someone holds or waits for them, so ids that are
/// seen once (including rejected ones) do not accumulate.
#[derive(Debug, Default)]
pub struct UserLocks {
    locks: LockMap,
}

impl UserLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to a user's record.
    pub async fn lock(&self, user_id: &str) -> UserGuard<'_> {
        // Clone the Arc out so the shard lock is not held across the await.
        let mutex = Arc::clone(
            self.locks
                .entry(user_id.to_owned())
                .or_default()
                .value(),
        );
        UserGuard {
            guard: Some(mutex.lock_owned().await),
            locks: &self.locks,
            user_id: user_id.to_owned(),
        }
    }

    /// Number of ids currently held or waited on.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Exclusive access to one user's record. Releasing the last reference
/// removes the registry entry.
pub struct UserGuard<'a> {
    guard: Option<OwnedMutexGuard<()>>,
    locks: &'a LockMap,
    user_id: String,
}

impl Drop for UserGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Waiters hold their own clone, so a count of one means only the map is left.
        self.locks
            .remove_if(&self.user_id, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

impl std::fmt::Debug for UserGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserGuard")
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}
