//! External membership precondition.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;

/// Checks that a user still satisfies the membership requirement.
#[async_trait]
pub trait MembershipGate: Send + Sync {
    /// Returns the required channels the user has not joined. Empty means
    /// the precondition holds.
    async fn missing_channels(&self, user_id: &str) -> Vec<String>;
}

/// Gate that is always satisfied.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenGate;

#[async_trait]
impl MembershipGate for OpenGate {
    async fn missing_channels(&self, _user_id: &str) -> Vec<String> {
        Vec::new()
    }
}

/// In-memory roster of channel memberships fed by the transport.
#[derive(Debug, Default)]
pub struct ChannelRoster {
    required: Vec<String>,
    members: RwLock<HashMap<String, HashSet<String>>>,
}

impl ChannelRoster {
    #[must_use]
    pub fn new(required: Vec<String>) -> Self {
        Self {
            required,
            members: RwLock::new(HashMap::new()),
        }
    }

    /// Channels every user must be joined to.
    #[must_use]
    pub fn required(&self) -> &[String] {
        &self.required
    }

    /// Records that a user joined a channel.
    pub async fn join(&self, user_id: &str, channel: &str) {
        self.members
            .write()
            .await
            .entry(user_id.to_owned())
            .or_default()
            .insert(normalize(channel));
    }

    /// Records that a user left a channel.
    pub async fn leave(&self, user_id: &str, channel: &str) {
        if let Some(channels) = self.members.write().await.get_mut(user_id) {
            channels.remove(&normalize(channel));
        }
    }
}

#[async_trait]
impl MembershipGate for ChannelRoster {
    async fn missing_channels(&self, user_id: &str) -> Vec<String> {
        let members = self.members.read().await;
        let joined = members.get(user_id);
        self.required
            .iter()
            .filter(|c| !joined.is_some_and(|set| set.contains(c.as_str())))
            .cloned()
            .collect()
    }
}

fn normalize(channel: &str) -> String {
    channel.trim().trim_start_matches('@').to_owned()
}
