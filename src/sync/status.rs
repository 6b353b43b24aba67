//! Online status of the sync engine.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncStatus {
    /// No pull has completed yet
    #[default]
    Loading,
    /// The last pull succeeded, or too few pulls have failed since
    Online,
    /// Pulls are failing
    Offline,
}

/// Tracks pull outcomes and derives the status.
///
/// `Loading` and `Offline` flip on the first failure or success. `Online`
/// only drops to `Offline` after `offline_after` consecutive failures, so a
/// single transient error does not make the dashboard flicker.
#[derive(Debug, Clone)]
pub struct StatusTracker {
    status: SyncStatus,
    consecutive_failures: u32,
    offline_after: u32,
}

impl StatusTracker {
    /// A threshold of 0 behaves like 1: status follows the latest pull.
    pub fn new(offline_after: u32) -> Self {
        Self {
            status: SyncStatus::Loading,
            consecutive_failures: 0,
            offline_after: offline_after.max(1),
        }
    }

    pub fn status(&self) -> SyncStatus {
        self.status
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn record_success(&mut self) -> SyncStatus {
        self.consecutive_failures = 0;
        self.status = SyncStatus::Online;
        self.status
    }

    pub fn record_failure(&mut self) -> SyncStatus {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.status = match self.status {
            SyncStatus::Loading | SyncStatus::Offline => SyncStatus::Offline,
            SyncStatus::Online if self.consecutive_failures >= self.offline_after => {
                SyncStatus::Offline
            }
            SyncStatus::Online => SyncStatus::Online,
        };
        self.status
    }
}
