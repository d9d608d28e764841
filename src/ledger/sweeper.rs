//! Background purge of expired cooldown markers.
//!
//! Expired markers are already ignored by lookups; the sweep only keeps the
//! map from growing with users who never come back.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{debug, info};

use super::CooldownTracker;

/// Messages that can be sent to the sweeper.
#[derive(Debug, Clone)]
pub enum SweeperMessage {
    /// Purge immediately.
    SweepNow,
    /// Stop the sweeper.
    Shutdown,
}

/// Periodic cooldown sweeper.
pub struct CooldownSweeper {
    tracker: Arc<CooldownTracker>,
    sweep_interval: Duration,
}

impl CooldownSweeper {
    #[must_use]
    pub const fn new(tracker: Arc<CooldownTracker>, sweep_interval: Duration) -> Self {
        Self {
            tracker,
            sweep_interval,
        }
    }

    /// Runs until a shutdown message arrives or the channel closes.
    pub async fn run(&self, mut rx: mpsc::Receiver<SweeperMessage>) {
        info!("Cooldown sweeper started (every {:?})", self.sweep_interval);

        let mut timer = interval(self.sweep_interval);

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    self.sweep().await;
                }
                msg = rx.recv() => {
                    match msg {
                        Some(SweeperMessage::SweepNow) => {
                            debug!("Received sweep request");
                            self.sweep().await;
                        }
                        Some(SweeperMessage::Shutdown) | None => {
                            info!("Cooldown sweeper shutting down");
                            break;
                        }
                    }
                }
            }
        }
    }

    async fn sweep(&self) {
        let purged = self.tracker.purge_expired().await;
        if purged > 0 {
            debug!("Purged {} expired cooldown markers", purged);
        }
    }
}

impl std::fmt::Debug for CooldownSweeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CooldownSweeper")
            .field("sweep_interval", &self.sweep_interval)
            .finish_non_exhaustive()
    }
}
