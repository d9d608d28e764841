//! Referral code generation strategies.

use rand::Rng;

use crate::config::ReferralCodeStyle;

/// Produces candidate referral codes. Uniqueness is checked by the caller.
pub trait CodeStrategy: Send + Sync + std::fmt::Debug {
    /// Returns a candidate given the current record count and the number of
    /// rejected candidates so far.
    fn candidate(&self, existing: usize, attempt: usize) -> String;

    /// Whether the caller should give up after a fixed number of attempts.
    /// Strategies that walk a sequence always reach a free code eventually.
    fn is_bounded(&self) -> bool {
        true
    }
}

/// `USER001`, `USER002`, ... Collision free as long as records are never
/// deleted; later attempts skip ahead.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialCodes;

impl CodeStrategy for SequentialCodes {
    fn candidate(&self, existing: usize, attempt: usize) -> String {
        format!("USER{:03}", existing + 1 + attempt)
    }

    fn is_bounded(&self) -> bool {
        false
    }
}

/// Random uppercase alphanumeric codes.
#[derive(Debug, Clone, Copy)]
pub struct RandomCodes {
    len: usize,
}

const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

impl RandomCodes {
    #[must_use]
    pub const fn new(len: usize) -> Self {
        Self { len }
    }
}

impl Default for RandomCodes {
    fn default() -> Self {
        Self::new(8)
    }
}

impl CodeStrategy for RandomCodes {
    fn candidate(&self, _existing: usize, _attempt: usize) -> String {
        let mut rng = rand::thread_rng();
        (0..self.len)
            .map(|_| char::from(ALPHABET[rng.gen_range(0..ALPHABET.len())]))
            .collect()
    }
}

/// Builds the strategy selected in settings.
#[must_use]
pub fn strategy_for(style: ReferralCodeStyle) -> Box<dyn CodeStrategy> {
    match style {
        ReferralCodeStyle::Sequential => Box::new(SequentialCodes),
        ReferralCodeStyle::Random => Box::new(RandomCodes::default()),
    }
}
