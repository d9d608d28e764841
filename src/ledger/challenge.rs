//! One-time session codes for the article reward.

use rand::Rng;

use crate::store::UserRecord;

/// Length of generated session codes.
pub const SESSION_CODE_LEN: usize = 8;

const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Generates a code of uppercase letters and digits containing at least one
/// of each.
#[must_use]
pub fn generate_session_code() -> String {
    let mut rng = rand::thread_rng();
    loop {
        let code: String = (0..SESSION_CODE_LEN)
            .map(|_| char::from(CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())]))
            .collect();

        let has_letter = code.chars().any(|c| c.is_ascii_alphabetic());
        let has_digit = code.chars().any(|c| c.is_ascii_digit());
        if has_letter && has_digit {
            return code;
        }
    }
}

/// Stores a fresh code as the record's pending challenge and returns it.
///
/// A previously pending code is replaced.
pub fn issue_challenge(record: &mut UserRecord) -> String {
    let code = generate_session_code();
    record.pending_session_code = Some(code.clone());
    code
}

/// Returns true if `submitted` is exactly the pending code.
#[must_use]
pub fn matches_pending(record: &UserRecord, submitted: &str) -> bool {
    record
        .pending_session_code
        .as_deref()
        .is_some_and(|code| !code.is_empty() && code == submitted)
}

/// Clears the pending code if `submitted` matches it.
pub fn redeem(record: &mut UserRecord, submitted: &str) -> bool {
    if !matches_pending(record, submitted) {
        return false;
    }
    record.pending_session_code = None;
    true
}
