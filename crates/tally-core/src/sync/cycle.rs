//! One full pull → merge → persist → push cycle.
//!
//! The ledger lock is taken only for the synchronous merge step and the
//! final bookkeeping, never across a network call. Mutations that land
//! while the cycle is waiting on the network are kept: the merge runs
//! against the ledger as it is after the pull, and the dirty flag is only
//! cleared if nothing changed after the merge.
//!
//! Remote elements that do not decode are carried through to the push
//! unchanged (unless their id was deleted or a readable copy with the same
//! id won the merge). Pushing overwrites the whole cloud row, so dropping
//! them here would erase them for every device.

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use super::status::{RemoteCounts, SyncReport};
use crate::account::AccountKey;
use crate::cache::LocalCache;
use crate::clock::{DEFAULT_SKEW_THRESHOLD_SECS, check_clock_skew};
use crate::error::RemoteError;
use crate::ledger::Ledger;
use crate::merge::merge_collection;
use crate::model::{Customer, Item};
use crate::remote::RemoteStore;
use crate::snapshot::{self, Category, Decoded};
use crate::tombstone::TombstoneSet;

pub(crate) async fn bounded<T>(
    limit: Duration,
    call: impl Future<Output = Result<T, RemoteError>>,
) -> Result<T, RemoteError> {
    tokio::time::timeout(limit, call)
        .await
        .unwrap_or(Err(RemoteError::Timeout(limit)))
}

async fn pull<T: DeserializeOwned>(
    remote: &dyn RemoteStore,
    account: &AccountKey,
    category: Category,
    limit: Duration,
) -> Result<Decoded<T>, RemoteError> {
    Ok(bounded(limit, remote.fetch(account, category))
        .await?
        .map(|value| snapshot::decode(category, value))
        .transpose()?
        .unwrap_or_default())
}

/// Undecodable remote elements, per category, that go back out untouched.
#[derive(Debug, Default)]
struct Carried {
    customers: Vec<Value>,
    items: Vec<Value>,
    deleted_ids: Vec<Value>,
}

impl Carried {
    const fn counts(&self) -> RemoteCounts {
        RemoteCounts {
            customers: self.customers.len(),
            items: self.items.len(),
            deleted_ids: self.deleted_ids.len(),
        }
    }
}

/// Keep raw elements unless their id is deleted or already present in the
/// merged collection.
fn carry<'a>(
    rejected: Vec<Value>,
    merged_ids: impl IntoIterator<Item = &'a str>,
    tombstones: &TombstoneSet,
) -> Vec<Value> {
    let merged: HashSet<&str> = merged_ids.into_iter().collect();
    rejected
        .into_iter()
        .filter(|raw| {
            raw.get("id")
                .and_then(Value::as_str)
                .is_none_or(|id| !tombstones.contains(id) && !merged.contains(id))
        })
        .collect()
}

struct Outbound {
    customers: Value,
    items: Value,
    deleted_ids: Value,
    counts: RemoteCounts,
}

fn encode_all(ledger: &Ledger, carried: &Carried, at: DateTime<Utc>) -> Result<Outbound, RemoteError> {
    let encode_err = |err: serde_json::Error| RemoteError::Malformed(format!("encode failed: {err}"));
    Ok(Outbound {
        customers: snapshot::encode_with_raw(ledger.customers(), &carried.customers, at)
            .map_err(encode_err)?,
        items: snapshot::encode_with_raw(ledger.items(), &carried.items, at).map_err(encode_err)?,
        deleted_ids: snapshot::encode_with_raw(
            &ledger.tombstones().to_vec(),
            &carried.deleted_ids,
            at,
        )
        .map_err(encode_err)?,
        counts: RemoteCounts {
            customers: ledger.customers().len(),
            items: ledger.items().len(),
            deleted_ids: ledger.tombstones().len(),
        },
    })
}

fn count_skewed(customers: &[Customer], items: &[Item], now: DateTime<Utc>) -> usize {
    let stamps = customers
        .iter()
        .flat_map(|c| {
            std::iter::once(c.updated_at.as_ref())
                .chain(c.transactions.iter().map(|tx| tx.updated_at.as_ref()))
        })
        .chain(items.iter().map(|i| i.updated_at.as_ref()))
        .flatten();

    let mut skewed = 0;
    for stamp in stamps {
        if let Some(warning) = check_clock_skew(*stamp, now, DEFAULT_SKEW_THRESHOLD_SECS) {
            if skewed == 0 {
                warn!(skew_secs = warning.skew_secs, "{}", warning.message);
            }
            skewed += 1;
        }
    }
    if skewed > 1 {
        warn!(records = skewed, "multiple records are stamped in the future");
    }
    skewed
}

/// Run one cycle against `remote`.
///
/// # Errors
///
/// Returns the first remote failure. Local state merged before the failure
/// is kept and already written to the cache.
pub async fn run(
    remote: &dyn RemoteStore,
    ledger: &Mutex<Ledger>,
    cache: &Mutex<LocalCache>,
    request_timeout: Duration,
) -> Result<SyncReport, RemoteError> {
    let account = ledger.lock().account().clone();

    let (customers, items, deleted) = tokio::join!(
        pull::<Customer>(remote, &account, Category::Customers, request_timeout),
        pull::<Item>(remote, &account, Category::Items, request_timeout),
        pull::<String>(remote, &account, Category::DeletedIds, request_timeout),
    );
    let remote_customers = customers?;
    let remote_items = items?;
    let remote_deleted = deleted?;
    let remote_tombstones: TombstoneSet = remote_deleted.records.into_iter().collect();

    let mut report = SyncReport {
        pulled: RemoteCounts {
            customers: remote_customers.records.len(),
            items: remote_items.records.len(),
            deleted_ids: remote_tombstones.len(),
        },
        ..SyncReport::default()
    };

    let (outbound, generation) = {
        let mut ledger = ledger.lock();
        let now = ledger.now();
        let tombstones = ledger.tombstones().union(&remote_tombstones);
        let merged_customers =
            merge_collection(ledger.customers(), &remote_customers.records, &tombstones);
        let merged_items = merge_collection(ledger.items(), &remote_items.records, &tombstones);

        let carried = Carried {
            customers: carry(
                remote_customers.rejected,
                merged_customers.records.iter().map(|c| c.id.as_str()),
                &tombstones,
            ),
            items: carry(
                remote_items.rejected,
                merged_items.records.iter().map(|i| i.id.as_str()),
                &tombstones,
            ),
            deleted_ids: remote_deleted.rejected,
        };
        report.carried = carried.counts();
        if report.carried != RemoteCounts::default() {
            warn!(account = %account, carried = ?report.carried, "keeping unreadable remote records as-is");
        }

        report.merge = merged_customers.stats;
        report.merge.absorb(merged_items.stats);
        report.skewed_records = count_skewed(&merged_customers.records, &merged_items.records, now);

        ledger.replace_collections(merged_customers.records, merged_items.records, tombstones);
        ledger.persist_or_warn(&cache.lock());
        (encode_all(&ledger, &carried, now)?, ledger.generation())
    };
    debug!(account = %account, stats = ?report.merge, "merged remote snapshot");

    let (c, i, d) = tokio::join!(
        bounded(
            request_timeout,
            remote.save(&account, Category::Customers, &outbound.customers)
        ),
        bounded(
            request_timeout,
            remote.save(&account, Category::Items, &outbound.items)
        ),
        bounded(
            request_timeout,
            remote.save(&account, Category::DeletedIds, &outbound.deleted_ids)
        ),
    );
    c?;
    i?;
    d?;
    report.pushed = outbound.counts;

    let mut ledger = ledger.lock();
    let synced_at = ledger.now();
    ledger.mark_synced(generation, synced_at);
    report.synced_at = Some(synced_at);
    Ok(report)
}
