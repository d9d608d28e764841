//! In-memory record store.

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::table::RecordTable;
use super::{NewUser, StoreError, UserPatch, UserRecord, UserStore};

/// Record store backed by a process-local table. Contents are lost on exit.
#[derive(Debug, Default)]
pub struct MemoryStore {
    table: RwLock<RecordTable>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with records.
    ///
    /// # Errors
    ///
    /// Returns an error if two records share an id or a referral code.
    pub fn with_records(records: Vec<UserRecord>) -> Result<Self, StoreError> {
        Ok(Self {
            table: RwLock::new(RecordTable::from_records(records)?),
        })
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.table.read().await.get(id).cloned())
    }

    async fn find_by_referral_code(&self, code: &str) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.table.read().await.get_by_code(code).cloned())
    }

    async fn create(&self, new: NewUser) -> Result<UserRecord, StoreError> {
        let record = self.table.write().await.create(new)?;
        debug!("Created user {} with code {}", record.id, record.referral_code);
        Ok(record)
    }

    async fn update(&self, id: &str, patch: UserPatch) -> Result<UserRecord, StoreError> {
        let (_, updated) = self.table.write().await.update(id, &patch)?;
        Ok(updated)
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.table.read().await.len())
    }

    async fn all(&self) -> Result<Vec<UserRecord>, StoreError> {
        Ok(self.table.read().await.sorted())
    }
}
