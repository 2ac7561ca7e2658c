use chrono::{DateTime, Utc};

use super::lww::{Side, Stamped};
use super::{MergeStats, Reconcile, merge_collection};
use crate::model::{Customer, Item, Transaction};
use crate::tombstone::TombstoneSet;

impl Stamped for Item {
    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> Option<&DateTime<Utc>> {
        self.updated_at.as_ref()
    }
}

impl Reconcile for Item {}

impl Stamped for Transaction {
    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> Option<&DateTime<Utc>> {
        self.updated_at.as_ref()
    }
}

impl Reconcile for Transaction {}

impl Stamped for Customer {
    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> Option<&DateTime<Utc>> {
        self.updated_at.as_ref()
    }
}

impl Reconcile for Customer {
    fn reconcile(
        local: &Self,
        remote: &Self,
        winner: Side,
        tombstones: &TombstoneSet,
        stats: &mut MergeStats,
    ) -> Self {
        let base = match winner {
            Side::Local => local,
            Side::Remote => remote,
        };
        let ledger = merge_collection(&local.transactions, &remote.transactions, tombstones);
        stats.absorb(ledger.stats);
        Self {
            transactions: ledger.records,
            ..base.clone()
        }
    }

    fn purge(&mut self, tombstones: &TombstoneSet) -> usize {
        let before = self.transactions.len();
        self.transactions.retain(|tx| !tombstones.contains(&tx.id));
        before - self.transactions.len()
    }
}
