//! Device sessions: which devices are signed in to an account, and whether
//! this one has been signed out from elsewhere.
//!
//! Each device keeps a row in the remote session table, refreshed by a
//! heartbeat while the user is active. Another device removes that row to
//! sign this one out. [`SessionTracker`] holds the local half of that
//! protocol; the remote half is [`crate::remote::SessionStore`].

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Timing for heartbeats and revocation checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Period of the background session check.
    pub heartbeat: Duration,
    /// Without activity for this long the heartbeat stops, and other
    /// devices list this one as idle.
    pub idle_after: Duration,
    /// No revocation verdict this soon after login.
    pub grace: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            heartbeat: Duration::from_secs(30),
            idle_after: Duration::from_secs(5 * 60),
            grace: Duration::from_secs(5 * 60),
        }
    }
}

/// One device's row in the remote session table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceSession {
    pub device_id: String,
    pub last_seen: DateTime<Utc>,
}

impl DeviceSession {
    #[must_use]
    pub fn is_idle(&self, now: DateTime<Utc>, idle_after: Duration) -> bool {
        elapsed(self.last_seen, now) > idle_after
    }
}

/// Result of one session check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCheck {
    /// No remote, a backend without session tracking, or a failed request.
    Unavailable,
    /// Still signed in. `pinged` is false while the user is idle.
    Active { pinged: bool },
    /// Signed out from another device.
    Revoked,
}

/// Local session state for the active account on this device.
#[derive(Debug, Clone)]
pub struct SessionTracker {
    device_id: String,
    started_at: DateTime<Utc>,
    last_ping: Option<DateTime<Utc>>,
    last_activity: DateTime<Utc>,
    config: SessionConfig,
}

fn elapsed(since: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    // A stamp in the future counts as zero elapsed.
    (now - since).to_std().unwrap_or_default()
}

impl SessionTracker {
    /// Opening the account counts as activity.
    #[must_use]
    pub fn new(
        device_id: String,
        started_at: DateTime<Utc>,
        last_ping: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        config: SessionConfig,
    ) -> Self {
        Self {
            device_id,
            started_at,
            last_ping,
            last_activity: now,
            config,
        }
    }

    #[must_use]
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    #[must_use]
    pub const fn config(&self) -> SessionConfig {
        self.config
    }

    #[must_use]
    pub const fn last_ping(&self) -> Option<DateTime<Utc>> {
        self.last_ping
    }

    pub fn record_activity(&mut self, at: DateTime<Utc>) {
        self.last_activity = self.last_activity.max(at);
    }

    pub fn record_ping(&mut self, at: DateTime<Utc>) {
        self.last_ping = Some(at);
    }

    /// Heartbeat only while the user was active recently, or before the
    /// first successful ping.
    #[must_use]
    pub fn should_ping(&self, now: DateTime<Utc>) -> bool {
        self.last_ping.is_none() || elapsed(self.last_activity, now) <= self.config.idle_after
    }

    #[must_use]
    pub fn in_grace(&self, now: DateTime<Utc>) -> bool {
        elapsed(self.started_at, now) < self.config.grace
    }

    /// Signed out from elsewhere: past the grace period, registered by an
    /// earlier ping, and no longer listed.
    #[must_use]
    pub fn is_revoked(&self, listed: &[DeviceSession], now: DateTime<Utc>) -> bool {
        !self.in_grace(now)
            && self.last_ping.is_some()
            && !listed.iter().any(|s| s.device_id == self.device_id)
    }
}
