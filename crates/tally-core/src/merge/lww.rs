//! Last-write-wins selection between two versions of the same record.
//!
//! # Tie-Breaking Chain
//!
//! Given a local and a remote version with the same ID:
//!
//! 1. **`updatedAt`**: the strictly greater stamp wins. A missing stamp ranks
//!    as epoch 0, below any stamped write.
//! 2. **Side**: on equal stamps the local version wins. The rule does not
//!    look at record contents, so repeated merges of the same inputs always
//!    pick the same side.
//!
//! Stamps come from device wall clocks. Two devices with skewed clocks can
//! make an older edit win; see [`crate::clock::check_clock_skew`].

use chrono::{DateTime, Utc};

use crate::model::stamp::priority;

/// Which input a merged record was taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Local,
    Remote,
}

/// Anything the merge engine can reconcile by ID and `updatedAt`.
pub trait Stamped {
    fn id(&self) -> &str;
    fn updated_at(&self) -> Option<&DateTime<Utc>>;
}

/// Pick the winning side for two versions of one record.
#[must_use]
pub fn pick<T: Stamped + ?Sized>(local: &T, remote: &T) -> Side {
    if priority(remote.updated_at()) > priority(local.updated_at()) {
        Side::Remote
    } else {
        Side::Local
    }
}
