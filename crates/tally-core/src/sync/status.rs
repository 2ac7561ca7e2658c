use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::merge::MergeStats;

/// Classification of a failed sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncErrorKind {
    /// Transient: retried on the next tick.
    Network,
    /// Credentials or backend configuration: background sync suspends
    /// until a manual refresh.
    Auth,
}

impl fmt::Display for SyncErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Network => "network",
            Self::Auth => "auth",
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "kind", rename_all = "lowercase")]
pub enum SyncState {
    #[default]
    Idle,
    Syncing,
    Error(SyncErrorKind),
}

/// What a front end needs to render the sync indicator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    #[serde(flatten)]
    pub state: SyncState,
    pub dirty: bool,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub suspended: bool,
    pub last_error: Option<String>,
    pub cloud_enabled: bool,
    /// Another device removed this one from the account.
    pub signed_out: bool,
}

impl SyncStatus {
    /// One-word indicator text.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        if !self.cloud_enabled {
            return "local-only";
        }
        if self.signed_out {
            return "signed-out";
        }
        match self.state {
            SyncState::Syncing => "syncing",
            SyncState::Error(SyncErrorKind::Network) => "offline",
            SyncState::Error(SyncErrorKind::Auth) => "needs-attention",
            SyncState::Idle if self.suspended => "needs-attention",
            SyncState::Idle if self.dirty => "pending",
            SyncState::Idle => "synced",
        }
    }
}

/// Element counts seen on the remote for one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RemoteCounts {
    pub customers: usize,
    pub items: usize,
    pub deleted_ids: usize,
}

/// What a completed sync cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Records pulled per category (0 when the remote had nothing yet).
    pub pulled: RemoteCounts,
    /// Sizes of the merged collections that were pushed back.
    pub pushed: RemoteCounts,
    /// Remote elements this build could not read, written back unchanged.
    pub carried: RemoteCounts,
    pub merge: MergeStats,
    /// Merged records stamped suspiciously far in the future.
    pub skewed_records: usize,
    pub synced_at: Option<DateTime<Utc>>,
}

/// Result of asking the orchestrator to sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Synced(SyncReport),
    /// No remote configured; the cache is the only store.
    LocalOnly,
    /// A cycle was already running; it will pick this request up.
    Coalesced,
    /// Background sync is suspended after an auth failure.
    Suspended,
    /// This device was signed out from another one; nothing syncs until
    /// the next login.
    SignedOut,
    Failed(SyncErrorKind),
}

impl SyncOutcome {
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_) | Self::Suspended | Self::SignedOut)
    }
}
