//! Task state machine.
//!
//! Maps inbound intents (entry, channel-join confirmation, free text, photo,
//! ad claim, article request, profile query) onto record transitions and
//! reward credits.

mod engine;
mod gate;
mod locks;
mod outcome;

#[cfg(test)]
mod tests;

pub use engine::TaskFlow;
pub use gate::{ChannelRoster, MembershipGate, OpenGate};
pub use locks::{UserGuard, UserLocks};
pub use outcome::{
    ArticleChallenge, EntryOutcome, FlowError, NextStep, ProfileView, RewardGranted,
    TextOutcome, TransitionOutcome,
};
