//! Consistency checks over a full set of records.

use std::collections::{HashMap, HashSet};

use thiserror::Error;

use super::{TaskStage, UserRecord};

/// A consistency problem found in stored records.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuditIssue {
    #[error("Referral code {code} is shared by users {ids:?}")]
    DuplicateReferralCode { code: String, ids: Vec<String> },

    #[error("User {id} has an empty referral code")]
    EmptyReferralCode { id: String },

    #[error("User {id} was referred by unknown code {code}")]
    DanglingReferrer { id: String, code: String },

    #[error("User {id} is marked as referred by their own code")]
    SelfReferral { id: String },

    #[error("User {id} passed the Instagram stage without a stored handle")]
    MissingInstagramHandle { id: String },

    #[error("User {id} claims {claimed} referrals but only {found} records name their code")]
    ReferralCountMismatch { id: String, claimed: u64, found: u64 },
}

/// Checks records for broken invariants.
///
/// Issues are reported in a stable order: per-record issues in input order,
/// then duplicate codes sorted by code.
#[must_use]
pub fn audit_records(records: &[UserRecord]) -> Vec<AuditIssue> {
    let mut issues = Vec::new();

    let mut owners: HashMap<&str, Vec<&str>> = HashMap::new();
    for record in records {
        owners
            .entry(record.referral_code.as_str())
            .or_default()
            .push(record.id.as_str());
    }
    let known_codes: HashSet<&str> = owners.keys().copied().collect();

    let mut referred: HashMap<&str, u64> = HashMap::new();
    for record in records {
        if let Some(code) = record.referred_by.as_deref() {
            *referred.entry(code).or_default() += 1;
        }
    }

    for record in records {
        if record.referral_code.is_empty() {
            issues.push(AuditIssue::EmptyReferralCode {
                id: record.id.clone(),
            });
        }

        if let Some(code) = record.referred_by.as_deref() {
            if code == record.referral_code {
                issues.push(AuditIssue::SelfReferral {
                    id: record.id.clone(),
                });
            } else if !known_codes.contains(code) {
                issues.push(AuditIssue::DanglingReferrer {
                    id: record.id.clone(),
                    code: code.to_owned(),
                });
            }
        }

        if record.task_stage >= TaskStage::InstagramDone && record.instagram_handle.is_none() {
            issues.push(AuditIssue::MissingInstagramHandle {
                id: record.id.clone(),
            });
        }

        // Referrer credits are separate writes, so the count may lag but never lead.
        let found = referred
            .get(record.referral_code.as_str())
            .copied()
            .unwrap_or(0);
        if record.referral_count > found {
            issues.push(AuditIssue::ReferralCountMismatch {
                id: record.id.clone(),
                claimed: record.referral_count,
                found,
            });
        }
    }

    let mut duplicates: Vec<_> = owners
        .into_iter()
        .filter(|(_, ids)| ids.len() > 1)
        .collect();
    duplicates.sort_by(|a, b| a.0.cmp(b.0));
    for (code, ids) in duplicates {
        issues.push(AuditIssue::DuplicateReferralCode {
            code: code.to_owned(),
            ids: ids.into_iter().map(str::to_owned).collect(),
        });
    }

    issues
}
