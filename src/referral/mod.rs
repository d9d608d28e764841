//! Referral engine.
//!
//! Assigns unique referral codes and resolves a deep-link code to the user
//! who should receive the signup bonus.

mod codes;

use thiserror::Error;
use tracing::debug;

use crate::store::{StoreError, UserRecord, UserStore};

pub use codes::{CodeStrategy, RandomCodes, SequentialCodes, strategy_for};

/// Default number of candidates tried before giving up.
pub const DEFAULT_MAX_ATTEMPTS: usize = 32;

/// Errors raised while assigning referral codes.
#[derive(Debug, Error)]
pub enum ReferralError {
    #[error("No unique referral code found after {attempts} attempts")]
    Exhausted { attempts: usize },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Generates codes and resolves referrers against a store.
#[derive(Debug)]
pub struct ReferralEngine {
    strategy: Box<dyn CodeStrategy>,
    max_attempts: usize,
}

impl ReferralEngine {
    #[must_use]
    pub fn new(strategy: Box<dyn CodeStrategy>) -> Self {
        Self {
            strategy,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Returns a code no stored record uses.
    ///
    /// Bounded strategies give up after `max_attempts` candidates; sequential
    /// codes keep walking past taken ones, since gaps left by lost creation
    /// races are finite.
    ///
    /// `skip` offsets the strategy's attempt counter so a caller retrying
    /// after a lost creation race does not get the same candidate back.
    pub async fn generate_unique_referral_code(
        &self,
        store: &dyn UserStore,
        skip: usize,
    ) -> Result<String, ReferralError> {
        let existing = store.count().await?;
        let bounded = self.strategy.is_bounded();

        let mut attempt = 0;
        while !bounded || attempt < self.max_attempts {
            let candidate = self.strategy.candidate(existing, skip + attempt);
            attempt += 1;
            if candidate.is_empty() {
                continue;
            }
            if store.find_by_referral_code(&candidate).await?.is_none() {
                return Ok(candidate);
            }
            debug!("Referral code {} already taken, retrying", candidate);
        }

        Err(ReferralError::Exhausted {
            attempts: self.max_attempts,
        })
    }

    /// Resolves a deep-link code to the referring record.
    ///
    /// Empty, unknown and self-referencing codes resolve to `None`; they are
    /// ignored rather than reported.
    pub async fn resolve_referrer(
        &self,
        store: &dyn UserStore,
        new_user_id: &str,
        ref_code: Option<&str>,
    ) -> Result<Option<UserRecord>, StoreError> {
        let Some(code) = ref_code.map(str::trim).filter(|c| !c.is_empty()) else {
            return Ok(None);
        };

        match store.find_by_referral_code(code).await? {
            Some(referrer) if referrer.id == new_user_id => {
                debug!("Ignoring self referral by {}", new_user_id);
                Ok(None)
            }
            Some(referrer) => Ok(Some(referrer)),
            None => {
                debug!("Ignoring unknown referral code {:?}", code);
                Ok(None)
            }
        }
    }
}
