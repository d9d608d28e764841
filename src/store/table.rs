//! Indexed record table shared by the store adapters.

use std::collections::HashMap;

use chrono::Utc;

use super::{NewUser, StoreError, UserPatch, UserRecord};

#[derive(Debug, Default)]
pub(super) struct RecordTable {
    records: HashMap<String, UserRecord>,
    /// referral code -> user id
    by_code: HashMap<String, String>,
}

impl RecordTable {
    pub(super) fn from_records(records: Vec<UserRecord>) -> Result<Self, StoreError> {
        let mut table = Self::default();
        for record in records {
            table.insert(record)?;
        }
        Ok(table)
    }

    pub(super) fn get(&self, id: &str) -> Option<&UserRecord> {
        self.records.get(id)
    }

    pub(super) fn get_by_code(&self, code: &str) -> Option<&UserRecord> {
        self.by_code.get(code).and_then(|id| self.records.get(id))
    }

    pub(super) fn len(&self) -> usize {
        self.records.len()
    }

    pub(super) fn create(&mut self, new: NewUser) -> Result<UserRecord, StoreError> {
        let record = UserRecord::from_new(new, Utc::now());
        self.insert(record.clone())?;
        Ok(record)
    }

    /// Applies a patch and returns `(previous, updated)`.
    pub(super) fn update(
        &mut self,
        id: &str,
        patch: &UserPatch,
    ) -> Result<(UserRecord, UserRecord), StoreError> {
        let record = self
            .records
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_owned()))?;
        let previous = record.clone();
        record.apply(patch)?;
        Ok((previous, record.clone()))
    }

    /// Puts a previous version back after a failed flush.
    pub(super) fn restore(&mut self, previous: UserRecord) {
        self.records.insert(previous.id.clone(), previous);
    }

    pub(super) fn remove(&mut self, id: &str) {
        if let Some(record) = self.records.remove(id) {
            self.by_code.remove(&record.referral_code);
        }
    }

    /// Records sorted by join time, then id.
    pub(super) fn sorted(&self) -> Vec<UserRecord> {
        let mut all: Vec<UserRecord> = self.records.values().cloned().collect();
        all.sort_by(|a, b| a.joined_at.cmp(&b.joined_at).then_with(|| a.id.cmp(&b.id)));
        all
    }

    fn insert(&mut self, record: UserRecord) -> Result<(), StoreError> {
        if self.records.contains_key(&record.id) {
            return Err(StoreError::AlreadyExists(record.id));
        }
        if self.by_code.contains_key(&record.referral_code) {
            return Err(StoreError::DuplicateReferralCode(record.referral_code));
        }
        self.by_code
            .insert(record.referral_code.clone(), record.id.clone());
        self.records.insert(record.id.clone(), record);
        Ok(())
    }
}
