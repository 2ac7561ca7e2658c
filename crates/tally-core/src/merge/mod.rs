//! Merge engine: reconcile a local and a remote snapshot of one collection.
//!
//! # Merge Semantics
//!
//! 1. The tombstone set passed in is already the union of both sides'
//!    deletions. Any record whose ID is in it is dropped, at every level,
//!    whatever its `updatedAt`.
//! 2. Remote records seed the result.
//! 3. Local records overlay it: new IDs are appended, shared IDs go through
//!    [`lww::pick`] and then [`Reconcile::reconcile`].
//! 4. Customers reconcile their ledgers recursively: scalar fields come from
//!    the winning side, `transactions` is the merge of both ledgers.
//!    Transactions themselves are whole-record last-write-wins.
//!
//! The output order is remote order followed by local-only additions. It
//! carries no meaning; presentation sorts on its own.
//!
//! Merging is pure and cannot fail. Line-item totals are not re-validated.

pub mod lww;
mod records;

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use serde::Serialize;

use crate::tombstone::TombstoneSet;
pub use lww::{Side, Stamped};

/// A record type the merge engine can reconcile.
pub trait Reconcile: Stamped + Clone {
    /// Build the merged version of a record present on both sides.
    ///
    /// `winner` is the side chosen by last-write-wins. The default takes
    /// the winner wholesale. Types with nested collections add what their
    /// nested merge did to `stats`.
    #[must_use]
    fn reconcile(
        local: &Self,
        remote: &Self,
        winner: Side,
        _tombstones: &TombstoneSet,
        _stats: &mut MergeStats,
    ) -> Self {
        match winner {
            Side::Local => local.clone(),
            Side::Remote => remote.clone(),
        }
    }

    /// Remove tombstoned nested records. Returns how many were removed.
    fn purge(&mut self, _tombstones: &TombstoneSet) -> usize {
        0
    }
}

/// Counters describing what a merge did, for logging and tests. Nested
/// records (a customer's transactions) are counted alongside top-level ones.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeStats {
    /// Records only the local side had.
    pub local_only: usize,
    /// Records only the remote side had.
    pub remote_only: usize,
    /// Shared records where the local version won.
    pub local_won: usize,
    /// Shared records where the remote version won.
    pub remote_won: usize,
    /// Records (top-level or nested) dropped because their ID is tombstoned.
    pub purged: usize,
}

impl MergeStats {
    /// Fold another collection's counters into this one.
    pub fn absorb(&mut self, other: Self) {
        self.local_only += other.local_only;
        self.remote_only += other.remote_only;
        self.local_won += other.local_won;
        self.remote_won += other.remote_won;
        self.purged += other.purged;
    }
}

/// The reconciled collection plus counters.
#[derive(Debug, Clone)]
pub struct Merged<T> {
    pub records: Vec<T>,
    pub stats: MergeStats,
}

#[derive(Clone, Copy)]
enum Origin {
    Remote,
    Local,
    Both,
}

/// Merge a local and a remote snapshot of one collection.
///
/// # Examples
///
/// ```
/// use tally_core::merge::merge_collection;
/// use tally_core::model::Item;
/// use tally_core::tombstone::TombstoneSet;
///
/// let merged = merge_collection::<Item>(&[], &[], &TombstoneSet::new());
/// assert!(merged.records.is_empty());
/// ```
#[must_use]
pub fn merge_collection<T: Reconcile>(
    local: &[T],
    remote: &[T],
    tombstones: &TombstoneSet,
) -> Merged<T> {
    let mut stats = MergeStats::default();
    let mut index: HashMap<String, usize> = HashMap::with_capacity(local.len() + remote.len());
    let mut records: Vec<T> = Vec::with_capacity(local.len() + remote.len());
    let mut origins: Vec<Origin> = Vec::with_capacity(local.len() + remote.len());

    for record in remote {
        if tombstones.contains(record.id()) {
            stats.purged += 1;
            continue;
        }
        match index.entry(record.id().to_string()) {
            Entry::Occupied(slot) => {
                // Duplicate ID inside one snapshot: the newer copy supplies
                // the scalars, nested records from both copies are kept.
                let pos = *slot.get();
                records[pos] = collapse(&records[pos], record, tombstones);
            }
            Entry::Vacant(slot) => {
                slot.insert(records.len());
                records.push(record.clone());
                origins.push(Origin::Remote);
            }
        }
    }

    let mut local_seen: HashMap<&str, usize> = HashMap::with_capacity(local.len());
    for record in local {
        if tombstones.contains(record.id()) {
            stats.purged += 1;
            continue;
        }
        if let Some(&pos) = local_seen.get(record.id()) {
            // Duplicate local ID: fold it into the merge result the first
            // copy already produced, which may hold remote data too.
            records[pos] = collapse(&records[pos], record, tombstones);
            continue;
        }
        match index.get(record.id()) {
            None => {
                local_seen.insert(record.id(), records.len());
                records.push(record.clone());
                origins.push(Origin::Local);
            }
            Some(&pos) => {
                local_seen.insert(record.id(), pos);
                let remote_version = &records[pos];
                let winner = lww::pick(record, remote_version);
                match winner {
                    Side::Local => stats.local_won += 1,
                    Side::Remote => stats.remote_won += 1,
                }
                let merged = T::reconcile(record, remote_version, winner, tombstones, &mut stats);
                records[pos] = merged;
                origins[pos] = Origin::Both;
            }
        }
    }

    for origin in &origins {
        match origin {
            Origin::Remote => stats.remote_only += 1,
            Origin::Local => stats.local_only += 1,
            Origin::Both => {}
        }
    }

    for record in &mut records {
        stats.purged += record.purge(tombstones);
    }

    Merged { records, stats }
}

/// Combine two copies of one record found on the same side. The earlier
/// copy wins ties.
fn collapse<T: Reconcile>(earlier: &T, later: &T, tombstones: &TombstoneSet) -> T {
    let winner = lww::pick(earlier, later);
    T::reconcile(earlier, later, winner, tombstones, &mut MergeStats::default())
}

/// Drop tombstoned records (and tombstoned nested records) from a snapshot
/// without merging it against anything.
#[must_use]
pub fn purge_collection<T: Reconcile>(records: &[T], tombstones: &TombstoneSet) -> Vec<T> {
    records
        .iter()
        .filter(|record| !tombstones.contains(record.id()))
        .cloned()
        .map(|mut record| {
            record.purge(tombstones);
            record
        })
        .collect()
}
