//! Record store persisted as a single JSON document.
//!
//! Every successful write rewrites the whole file through a temporary file
//! and a rename. If the flush fails the in-memory change is rolled back, so a
//! caller never observes a credit that is not on disk.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::table::RecordTable;
use super::{NewUser, StoreError, UserPatch, UserRecord, UserStore};

/// On-disk layout of the record file.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default)]
    users: Vec<UserRecord>,
}

/// Loads every record from a store file without opening a store.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub async fn read_records(path: impl AsRef<Path>) -> Result<Vec<UserRecord>, StoreError> {
    let content = tokio::fs::read_to_string(path.as_ref())
        .await
        .map_err(|e| StoreError::Unavailable(format!("{}: {e}", path.as_ref().display())))?;
    let file: StoreFile = serde_json::from_str(&content)?;
    Ok(file.users)
}

/// JSON-file backed record store.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    table: Mutex<RecordTable>,
}

impl JsonFileStore {
    /// Opens the store at `path`, starting empty if the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read or holds
    /// conflicting records.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();

        let records = if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            read_records(&path).await?
        } else {
            info!("Store file {} not found, starting empty", path.display());
            Vec::new()
        };

        info!("Loaded {} user records from {}", records.len(), path.display());

        Ok(Self {
            table: Mutex::new(RecordTable::from_records(records)?),
            path,
        })
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn flush(&self, table: &RecordTable) -> Result<(), StoreError> {
        let file = StoreFile {
            users: table.sorted(),
        };
        let json = serde_json::to_string_pretty(&file)?;

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| StoreError::Unavailable(format!("write {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| StoreError::Unavailable(format!("rename {}: {e}", self.path.display())))?;

        debug!("Flushed {} records to {}", file.users.len(), self.path.display());
        Ok(())
    }
}

#[async_trait]
impl UserStore for JsonFileStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.table.lock().await.get(id).cloned())
    }

    async fn find_by_referral_code(&self, code: &str) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.table.lock().await.get_by_code(code).cloned())
    }

    async fn create(&self, new: NewUser) -> Result<UserRecord, StoreError> {
        let mut table = self.table.lock().await;
        let record = table.create(new)?;

        if let Err(e) = self.flush(&table).await {
            warn!("Rolling back creation of user {}: {}", record.id, e);
            table.remove(&record.id);
            return Err(e);
        }
        Ok(record)
    }

    async fn update(&self, id: &str, patch: UserPatch) -> Result<UserRecord, StoreError> {
        let mut table = self.table.lock().await;
        let (previous, updated) = table.update(id, &patch)?;

        if let Err(e) = self.flush(&table).await {
            warn!("Rolling back update of user {}: {}", id, e);
            table.restore(previous);
            return Err(e);
        }
        Ok(updated)
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.table.lock().await.len())
    }

    async fn all(&self) -> Result<Vec<UserRecord>, StoreError> {
        Ok(self.table.lock().await.sorted())
    }
}
