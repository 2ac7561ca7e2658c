//! In-process remote store with fault injection.
//!
//! Several orchestrators (one per simulated device) can share one
//! `MemoryRemote` through an `Arc` to exercise multi-device merges and
//! sign-outs.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;

use super::{DEFAULT_KEY_PREFIX, RemoteStore, SessionStore, partition_key};
use crate::account::AccountKey;
use crate::error::RemoteError;
use crate::session::DeviceSession;
use crate::snapshot::Category;

/// How the store misbehaves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FaultMode {
    #[default]
    Healthy,
    /// Every request fails as unreachable.
    Network,
    /// Every request is rejected as unauthorized.
    Auth,
    /// Every request hangs forever. Only a timeout ends it.
    Hang,
}

#[derive(Debug, Default)]
struct Inner {
    values: HashMap<String, Value>,
    fault: FaultMode,
    fetches: usize,
    saves: HashMap<Category, usize>,
    /// Normalized account -> device id -> last seen.
    sessions: HashMap<String, BTreeMap<String, DateTime<Utc>>>,
    no_session_table: bool,
}

#[derive(Debug, Default)]
pub struct MemoryRemote {
    inner: Mutex<Inner>,
}

impl MemoryRemote {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fault(&self, fault: FaultMode) {
        self.inner.lock().fault = fault;
    }

    /// Store a raw value as if another device had pushed it.
    pub fn put(&self, account: &AccountKey, category: Category, value: Value) {
        let key = partition_key(DEFAULT_KEY_PREFIX, account, category);
        self.inner.lock().values.insert(key, value);
    }

    /// Raw stored value, bypassing fault injection.
    #[must_use]
    pub fn get(&self, account: &AccountKey, category: Category) -> Option<Value> {
        let key = partition_key(DEFAULT_KEY_PREFIX, account, category);
        self.inner.lock().values.get(&key).cloned()
    }

    /// Successful saves for one category so far.
    #[must_use]
    pub fn save_count(&self, category: Category) -> usize {
        self.inner.lock().saves.get(&category).copied().unwrap_or(0)
    }

    /// Behave like a backend whose session table was never created.
    pub fn drop_session_table(&self) {
        let mut inner = self.inner.lock();
        inner.no_session_table = true;
        inner.sessions.clear();
    }

    /// Device ids with a session row, bypassing fault injection.
    #[must_use]
    pub fn session_devices(&self, account: &AccountKey) -> Vec<String> {
        self.inner
            .lock()
            .sessions
            .get(&account.normalized())
            .map(|rows| rows.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Fetch attempts so far, including failed ones.
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.inner.lock().fetches
    }

    async fn check_fault(&self) -> Result<(), RemoteError> {
        let fault = self.inner.lock().fault;
        match fault {
            FaultMode::Healthy => Ok(()),
            FaultMode::Network => Err(RemoteError::Network("connection refused".to_string())),
            FaultMode::Auth => Err(RemoteError::Auth("HTTP 401 Unauthorized".to_string())),
            FaultMode::Hang => {
                std::future::pending::<()>().await;
                Ok(())
            }
        }
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn fetch(
        &self,
        account: &AccountKey,
        category: Category,
    ) -> Result<Option<Value>, RemoteError> {
        self.inner.lock().fetches += 1;
        self.check_fault().await?;
        Ok(self.get(account, category))
    }

    async fn save(
        &self,
        account: &AccountKey,
        category: Category,
        value: &Value,
    ) -> Result<(), RemoteError> {
        self.check_fault().await?;
        let key = partition_key(DEFAULT_KEY_PREFIX, account, category);
        let mut inner = self.inner.lock();
        inner.values.insert(key, value.clone());
        *inner.saves.entry(category).or_default() += 1;
        Ok(())
    }

    fn sessions(&self) -> Option<&dyn SessionStore> {
        Some(self)
    }
}

#[async_trait]
impl SessionStore for MemoryRemote {
    async fn ping(
        &self,
        account: &AccountKey,
        device_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), RemoteError> {
        self.check_fault().await?;
        let mut inner = self.inner.lock();
        if !inner.no_session_table {
            inner
                .sessions
                .entry(account.normalized())
                .or_default()
                .insert(device_id.to_string(), at);
        }
        Ok(())
    }

    async fn list_sessions(
        &self,
        account: &AccountKey,
    ) -> Result<Option<Vec<DeviceSession>>, RemoteError> {
        self.check_fault().await?;
        let inner = self.inner.lock();
        if inner.no_session_table {
            return Ok(None);
        }
        let rows = inner
            .sessions
            .get(&account.normalized())
            .map(|rows| {
                rows.iter()
                    .map(|(device_id, last_seen)| DeviceSession {
                        device_id: device_id.clone(),
                        last_seen: *last_seen,
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(Some(rows))
    }

    async fn revoke(&self, account: &AccountKey, device_ids: &[String]) -> Result<(), RemoteError> {
        self.check_fault().await?;
        let mut inner = self.inner.lock();
        if let Some(rows) = inner.sessions.get_mut(&account.normalized()) {
            for id in device_ids {
                rows.remove(id);
            }
        }
        drop(inner);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn account() -> AccountKey {
        AccountKey::new("shop").unwrap()
    }

    #[tokio::test]
    async fn fresh_partition_fetches_none() {
        let remote = MemoryRemote::new();
        assert_eq!(remote.fetch(&account(), Category::Items).await, Ok(None));
        assert_eq!(remote.fetch_count(), 1);
    }

    #[tokio::test]
    async fn save_then_fetch() {
        let remote = MemoryRemote::new();
        let value = json!({"data": [], "timestamp": 1});
        remote.save(&account(), Category::Customers, &value).await.unwrap();
        assert_eq!(
            remote.fetch(&account(), Category::Customers).await,
            Ok(Some(value))
        );
        assert_eq!(remote.save_count(Category::Customers), 1);
        assert_eq!(remote.save_count(Category::Items), 0);
    }

    #[tokio::test]
    async fn injected_faults_surface_as_errors() {
        let remote = MemoryRemote::new();
        remote.set_fault(FaultMode::Auth);
        assert!(matches!(
            remote.fetch(&account(), Category::Items).await,
            Err(RemoteError::Auth(_))
        ));
        remote.set_fault(FaultMode::Network);
        assert!(matches!(
            remote.save(&account(), Category::Items, &json!([])).await,
            Err(RemoteError::Network(_))
        ));
        assert_eq!(remote.save_count(Category::Items), 0);
    }

    #[tokio::test]
    async fn sessions_are_tracked_per_account() {
        let remote = MemoryRemote::new();
        let store = remote.sessions().expect("memory remote tracks sessions");
        let other = AccountKey::new("other").unwrap();
        let at = Utc::now();
        store.ping(&account(), "dev-a", at).await.unwrap();
        store.ping(&account(), "dev-b", at).await.unwrap();
        store.ping(&other, "dev-c", at).await.unwrap();

        store.revoke(&account(), &["dev-a".to_string(), "ghost".to_string()]).await.unwrap();
        let listed = store.list_sessions(&account()).await.unwrap().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].device_id, "dev-b");
        assert_eq!(remote.session_devices(&other), vec!["dev-c".to_string()]);
    }

    #[tokio::test]
    async fn missing_session_table_lists_none() {
        let remote = MemoryRemote::new();
        remote.drop_session_table();
        let store = remote.sessions().unwrap();
        store.ping(&account(), "dev-a", Utc::now()).await.unwrap();
        assert_eq!(store.list_sessions(&account()).await, Ok(None));
    }

    #[tokio::test]
    async fn session_requests_honor_faults() {
        let remote = MemoryRemote::new();
        remote.set_fault(FaultMode::Network);
        let store = remote.sessions().unwrap();
        assert!(store.ping(&account(), "dev-a", Utc::now()).await.is_err());
        assert!(remote.session_devices(&account()).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn hang_never_resolves() {
        let remote = MemoryRemote::new();
        remote.set_fault(FaultMode::Hang);
        let result = tokio::time::timeout(
            Duration::from_secs(60),
            remote.fetch(&account(), Category::Items),
        )
        .await;
        assert!(result.is_err());
    }
}
