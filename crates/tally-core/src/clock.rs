//! Wall-clock source for `updatedAt` stamps, plus clock-skew detection.
//!
//! Last-write-wins ordering relies on device wall clocks. Nothing here
//! corrects skew; [`check_clock_skew`] only reports records that claim to
//! come from the future so the condition shows up in logs.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

/// Source of "now" for mutations and sync bookkeeping.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The system wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to. Used by tests and simulations.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    #[must_use]
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move the clock forward by `step`.
    pub fn advance(&self, step: Duration) {
        let mut now = self.now.lock();
        *now += step;
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock() = at;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Default skew threshold in seconds (5 minutes).
pub const DEFAULT_SKEW_THRESHOLD_SECS: i64 = 300;

/// Warning emitted when a record's stamp is too far from the local clock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClockSkewWarning {
    /// The record timestamp that triggered the warning.
    pub record_ts: DateTime<Utc>,
    /// The local wall-clock time.
    pub wall_ts: DateTime<Utc>,
    /// Detected skew in seconds (positive = record is in the future).
    pub skew_secs: i64,
    /// Human-readable warning message.
    pub message: String,
}

/// Check whether `record_ts` lies more than `threshold_secs` in the future.
///
/// Records stamped in the past are normal (they were written earlier), so
/// only future-dated stamps are reported: they win every last-write-wins
/// comparison until the local clock catches up.
#[must_use]
pub fn check_clock_skew(
    record_ts: DateTime<Utc>,
    wall_ts: DateTime<Utc>,
    threshold_secs: i64,
) -> Option<ClockSkewWarning> {
    let skew_secs = (record_ts - wall_ts).num_seconds();
    if skew_secs <= threshold_secs {
        return None;
    }

    Some(ClockSkewWarning {
        record_ts,
        wall_ts,
        skew_secs,
        message: format!(
            "Clock skew detected: record is {skew_secs} seconds in the future, threshold is {threshold_secs} seconds"
        ),
    })
}
