//! Remote store client: key-value fetch and upsert of whole snapshots,
//! partitioned by account.
//!
//! The store knows nothing about merging. It hands back whatever value was
//! last written under a partition key, and overwrites it on save. All
//! reconciliation happens client-side before a save.
//!
//! Backends that can also track signed-in devices expose a
//! [`SessionStore`] through [`RemoteStore::sessions`].

pub mod http;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::account::AccountKey;
use crate::error::RemoteError;
use crate::session::DeviceSession;
use crate::snapshot::Category;

pub use http::PostgrestStore;
pub use memory::{FaultMode, MemoryRemote};

/// Default prefix for partition keys.
pub const DEFAULT_KEY_PREFIX: &str = "tally_";

/// Network layer for snapshot exchange.
///
/// `fetch` distinguishes three answers:
///
/// - `Ok(Some(value))`: the store holds a value for this partition
/// - `Ok(None)`: nothing written yet (a fresh account)
/// - `Err(_)`: unreachable, timed out, rejected or malformed; see
///   [`RemoteError::kind`]
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn fetch(&self, account: &AccountKey, category: Category)
    -> Result<Option<Value>, RemoteError>;

    /// Upsert the value stored for this partition.
    async fn save(
        &self,
        account: &AccountKey,
        category: Category,
        value: &Value,
    ) -> Result<(), RemoteError>;

    /// Device session tracking, when the backend supports it.
    fn sessions(&self) -> Option<&dyn SessionStore> {
        None
    }
}

/// Remote table of devices signed in to each account.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Upsert this device's row with `last_seen = at`.
    async fn ping(
        &self,
        account: &AccountKey,
        device_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), RemoteError>;

    /// Every device row for the account. `Ok(None)` when the backend has
    /// no session table provisioned.
    async fn list_sessions(
        &self,
        account: &AccountKey,
    ) -> Result<Option<Vec<DeviceSession>>, RemoteError>;

    /// Delete the rows of `device_ids`. Unknown ids are ignored.
    async fn revoke(&self, account: &AccountKey, device_ids: &[String]) -> Result<(), RemoteError>;
}

/// Storage key for one account's collection: `{prefix}{category}_{account}`.
#[must_use]
pub fn partition_key(prefix: &str, account: &AccountKey, category: Category) -> String {
    format!("{prefix}{}_{}", category.as_str(), account.normalized())
}
