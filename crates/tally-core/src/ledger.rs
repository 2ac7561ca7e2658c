//! The active-account context.
//!
//! A [`Ledger`] owns everything the app knows about one logged-in account:
//! the live collections, the tombstone set, and the sync bookkeeping. Login
//! builds one from the Local Cache; logout drops it. The mutation API lives
//! in [`crate::mutation`] as methods on this type.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::account::AccountKey;
use crate::cache::{LocalCache, SyncMeta};
use crate::clock::Clock;
use crate::error::CacheError;
use crate::model::{Customer, Item};
use crate::snapshot::{Category, SnapshotSource, resolve};
use crate::tombstone::TombstoneSet;

pub struct Ledger {
    account: AccountKey,
    pub(crate) customers: Vec<Customer>,
    pub(crate) items: Vec<Item>,
    pub(crate) tombstones: TombstoneSet,
    dirty: bool,
    generation: u64,
    last_synced_at: Option<DateTime<Utc>>,
    pub(crate) clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("account", &self.account)
            .field("customers", &self.customers.len())
            .field("items", &self.items.len())
            .field("tombstones", &self.tombstones.len())
            .field("dirty", &self.dirty)
            .field("generation", &self.generation)
            .field("last_synced_at", &self.last_synced_at)
            .finish_non_exhaustive()
    }
}

impl Ledger {
    /// An empty context for `account`, as on a brand-new device.
    #[must_use]
    pub fn new(account: AccountKey, clock: Arc<dyn Clock>) -> Self {
        Self {
            account,
            customers: Vec::new(),
            items: Vec::new(),
            tombstones: TombstoneSet::new(),
            dirty: false,
            generation: 0,
            last_synced_at: None,
            clock,
        }
    }

    /// Build the context for `account` from the Local Cache.
    ///
    /// Missing or corrupt entries resolve to empty collections, so login
    /// never fails because of cache state.
    #[must_use]
    pub fn load(account: AccountKey, cache: &LocalCache, clock: Arc<dyn Clock>) -> Self {
        let (customers, customers_from) = resolve(None, cache.read(&account, Category::Customers));
        let (items, items_from) = resolve(None, cache.read(&account, Category::Items));
        let (deleted, deleted_from) =
            resolve(None, cache.read::<String>(&account, Category::DeletedIds));
        let meta = cache.read_meta(&account);

        debug!(
            account = %account,
            customers = customers.len(),
            items = items.len(),
            tombstones = deleted.len(),
            from_cache = customers_from == SnapshotSource::Cache,
            items_from_cache = items_from == SnapshotSource::Cache,
            tombstones_from_cache = deleted_from == SnapshotSource::Cache,
            "loaded account context"
        );

        Self {
            account,
            customers,
            items,
            tombstones: deleted.into_iter().collect(),
            dirty: meta.dirty,
            generation: 0,
            last_synced_at: meta.last_synced_at,
            clock,
        }
    }

    #[must_use]
    pub const fn account(&self) -> &AccountKey {
        &self.account
    }

    #[must_use]
    pub fn customers(&self) -> &[Customer] {
        &self.customers
    }

    #[must_use]
    pub fn items(&self) -> &[Item] {
        &self.items
    }

    #[must_use]
    pub const fn tombstones(&self) -> &TombstoneSet {
        &self.tombstones
    }

    #[must_use]
    pub fn customer(&self, id: &str) -> Option<&Customer> {
        self.customers.iter().find(|c| c.id == id)
    }

    #[must_use]
    pub fn item(&self, id: &str) -> Option<&Item> {
        self.items.iter().find(|i| i.id == id)
    }

    /// True when local edits have not been pushed yet.
    #[must_use]
    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Counter bumped by every mutation. A sync cycle compares it before and
    /// after pushing to know whether it pushed everything.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub const fn last_synced_at(&self) -> Option<DateTime<Utc>> {
        self.last_synced_at
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub(crate) const fn mark_dirty(&mut self) {
        self.dirty = true;
        self.generation += 1;
    }

    /// Adopt the result of a sync merge. Does not touch the dirty flag.
    pub(crate) fn replace_collections(
        &mut self,
        customers: Vec<Customer>,
        items: Vec<Item>,
        tombstones: TombstoneSet,
    ) {
        self.customers = customers;
        self.items = items;
        self.tombstones = tombstones;
    }

    /// Record a completed push. Dirty is cleared only if nothing was mutated
    /// after the pushed snapshot was taken.
    pub(crate) fn mark_synced(&mut self, pushed_generation: u64, at: DateTime<Utc>) {
        if self.generation == pushed_generation {
            self.dirty = false;
        }
        self.last_synced_at = Some(at);
    }

    /// Write all three collections to the cache.
    ///
    /// # Errors
    ///
    /// Returns the first cache write failure.
    pub fn persist(&self, cache: &LocalCache) -> Result<(), CacheError> {
        cache.write(&self.account, Category::Customers, &self.customers)?;
        cache.write(&self.account, Category::Items, &self.items)?;
        cache.write(&self.account, Category::DeletedIds, &self.tombstones.to_vec())?;
        Ok(())
    }

    /// [`Ledger::persist`], logging instead of returning failures.
    pub fn persist_or_warn(&self, cache: &LocalCache) {
        if let Err(err) = self.persist(cache) {
            warn!(account = %self.account, error = %err, "local cache write failed");
        }
    }

    /// Sync bookkeeping to persist alongside the collections.
    #[must_use]
    pub fn meta(&self, suspended: bool, last_error: Option<String>) -> SyncMeta {
        SyncMeta {
            dirty: self.dirty,
            last_synced_at: self.last_synced_at,
            suspended,
            last_error,
        }
    }
}
