use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Grow-only set of deleted entity IDs.
///
/// Customer, item and transaction IDs share one set: IDs are UUIDs, so there
/// is no collision between collections. Once an ID is in the set it is
/// suppressed from every snapshot the merge engine processes. The set only
/// grows; merge is set union.
///
/// Satisfies semilattice properties:
/// - Commutative: a ∪ b = b ∪ a
/// - Associative: (a ∪ b) ∪ c = a ∪ (b ∪ c)
/// - Idempotent: a ∪ a = a
///
/// Serialized as a plain JSON array of IDs, the `deleted_ids` wire shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct TombstoneSet {
    ids: BTreeSet<String>,
}

impl TombstoneSet {
    /// Create a new empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ids: BTreeSet::new(),
        }
    }

    /// Record a deletion. Returns `true` if the ID was not already recorded.
    pub fn insert(&mut self, id: impl Into<String>) -> bool {
        self.ids.insert(id.into())
    }

    /// Merge another set into this one (set union).
    pub fn merge(&mut self, other: &Self) {
        for id in &other.ids {
            if !self.ids.contains(id) {
                self.ids.insert(id.clone());
            }
        }
    }

    /// Union of two sets without mutating either.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        let mut merged = self.clone();
        merged.merge(other);
        merged
    }

    /// Returns true if `id` has been deleted.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }

    /// IDs in sorted order, the shape pushed to the remote store.
    #[must_use]
    pub fn to_vec(&self) -> Vec<String> {
        self.ids.iter().cloned().collect()
    }
}

impl FromIterator<String> for TombstoneSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}
