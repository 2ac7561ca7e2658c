//! PostgREST-style `kv_store` backend over HTTP.
//!
//! Table layout on the server: `kv_store(id text primary key, value jsonb)`.
//! Reads select `value` by `id`; writes upsert with
//! `Prefer: resolution=merge-duplicates`.
//!
//! Device sessions live in `active_sessions(username, device_id, last_seen)`
//! with a unique `(username, device_id)`. That table is optional: a 404 on it
//! turns session tracking off instead of failing.
//!
//! `ureq` is blocking, so each request runs on the blocking pool and is
//! bounded twice: by the agent timeout and by a `tokio::time::timeout` around
//! the join, so a wedged socket cannot hold up a sync cycle.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::{DEFAULT_KEY_PREFIX, RemoteStore, SessionStore, partition_key};
use crate::account::AccountKey;
use crate::error::RemoteError;
use crate::model::stamp::{parse_iso, to_iso};
use crate::session::DeviceSession;
use crate::snapshot::Category;

const TABLE_PATH: &str = "/rest/v1/kv_store";
const SESSIONS_PATH: &str = "/rest/v1/active_sessions";

/// HTTP client for a hosted PostgREST `kv_store` table.
#[derive(Clone)]
pub struct PostgrestStore {
    agent: ureq::Agent,
    base_url: String,
    api_key: String,
    key_prefix: String,
    timeout: Duration,
}

impl std::fmt::Debug for PostgrestStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgrestStore")
            .field("base_url", &self.base_url)
            .field("key_prefix", &self.key_prefix)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl PostgrestStore {
    #[must_use]
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .user_agent(concat!("tally/", env!("CARGO_PKG_VERSION")))
            .build();
        Self {
            agent,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            timeout,
        }
    }

    #[must_use]
    pub fn with_key_prefix(mut self, prefix: &str) -> Self {
        self.key_prefix = prefix.to_string();
        self
    }

    fn table_url(&self) -> String {
        format!("{}{TABLE_PATH}", self.base_url)
    }

    fn sessions_url(&self) -> String {
        format!("{}{SESSIONS_PATH}", self.base_url)
    }

    fn authorize(&self, request: ureq::Request) -> ureq::Request {
        request
            .set("apikey", &self.api_key)
            .set("Authorization", &format!("Bearer {}", self.api_key))
    }

    fn get_blocking(&self, key: &str) -> Result<Option<Value>, RemoteError> {
        let request = self
            .agent
            .get(&self.table_url())
            .query("id", &format!("eq.{key}"))
            .query("select", "value")
            .set("Accept", "application/json");
        let response = self.authorize(request).call().map_err(classify)?;
        let rows: Value = response
            .into_json()
            .map_err(|err| RemoteError::Malformed(format!("response is not JSON: {err}")))?;
        value_from_rows(rows)
    }

    fn upsert_blocking(&self, key: &str, value: &Value) -> Result<(), RemoteError> {
        let request = self
            .agent
            .post(&self.table_url())
            .set("Content-Type", "application/json")
            .set("Prefer", "resolution=merge-duplicates");
        self.authorize(request)
            .send_json(json!({ "id": key, "value": value }))
            .map_err(classify)?;
        Ok(())
    }

    fn ping_blocking(&self, username: &str, device_id: &str, at: &str) -> Result<(), RemoteError> {
        let request = self
            .agent
            .post(&self.sessions_url())
            .query("on_conflict", "username,device_id")
            .set("Content-Type", "application/json")
            .set("Prefer", "resolution=merge-duplicates");
        let sent = self.authorize(request).send_json(json!({
            "username": username,
            "device_id": device_id,
            "last_seen": at,
        }));
        match sent {
            Ok(_) => Ok(()),
            Err(ureq::Error::Status(404, _)) => {
                debug!("no session table, heartbeat skipped");
                Ok(())
            }
            Err(err) => Err(classify(err)),
        }
    }

    fn list_sessions_blocking(&self, username: &str) -> Result<Option<Vec<DeviceSession>>, RemoteError> {
        let request = self
            .agent
            .get(&self.sessions_url())
            .query("username", &format!("eq.{username}"))
            .query("select", "device_id,last_seen")
            .set("Accept", "application/json");
        let response = match self.authorize(request).call() {
            Ok(response) => response,
            Err(ureq::Error::Status(404, _)) => return Ok(None),
            Err(err) => return Err(classify(err)),
        };
        let rows: Value = response
            .into_json()
            .map_err(|err| RemoteError::Malformed(format!("response is not JSON: {err}")))?;
        sessions_from_rows(rows).map(Some)
    }

    fn revoke_blocking(&self, username: &str, device_ids: &[String]) -> Result<(), RemoteError> {
        let quoted: Vec<String> = device_ids.iter().map(|id| format!("\"{id}\"")).collect();
        let request = self
            .agent
            .delete(&self.sessions_url())
            .query("username", &format!("eq.{username}"))
            .query("device_id", &format!("in.({})", quoted.join(",")));
        match self.authorize(request).call() {
            Ok(_) | Err(ureq::Error::Status(404, _)) => Ok(()),
            Err(err) => Err(classify(err)),
        }
    }

    async fn run_blocking<T, F>(&self, op: F) -> Result<T, RemoteError>
    where
        T: Send + 'static,
        F: FnOnce(Self) -> Result<T, RemoteError> + Send + 'static,
    {
        let store = self.clone();
        let handle = tokio::task::spawn_blocking(move || op(store));
        match tokio::time::timeout(self.timeout, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(RemoteError::Network(format!(
                "request task failed: {join_err}"
            ))),
            Err(_) => Err(RemoteError::Timeout(self.timeout)),
        }
    }
}

/// Map a `ureq` failure onto the sync error taxonomy.
///
/// 401 and 403 are rejected credentials. 404 means the table or project
/// does not exist, which is a misconfiguration rather than a blip.
fn classify(err: ureq::Error) -> RemoteError {
    match err {
        ureq::Error::Status(code @ (401 | 403 | 404), response) => RemoteError::Auth(format!(
            "HTTP {code} {}",
            response.status_text()
        )),
        ureq::Error::Status(code, response) => {
            RemoteError::Network(format!("HTTP {code} {}", response.status_text()))
        }
        ureq::Error::Transport(transport) => RemoteError::Network(transport.to_string()),
    }
}

/// Extract `value` from a PostgREST row list.
fn value_from_rows(rows: Value) -> Result<Option<Value>, RemoteError> {
    let Value::Array(rows) = rows else {
        return Err(RemoteError::Malformed(
            "expected a JSON array of rows".to_string(),
        ));
    };
    let Some(row) = rows.into_iter().next() else {
        return Ok(None);
    };
    match row {
        Value::Object(mut fields) => match fields.remove("value") {
            None | Some(Value::Null) => Ok(None),
            Some(value) => Ok(Some(value)),
        },
        _ => Err(RemoteError::Malformed(
            "row is not a JSON object".to_string(),
        )),
    }
}

/// Session rows from a PostgREST row list. Rows without a device id or a
/// readable `last_seen` are skipped.
fn sessions_from_rows(rows: Value) -> Result<Vec<DeviceSession>, RemoteError> {
    let Value::Array(rows) = rows else {
        return Err(RemoteError::Malformed(
            "expected a JSON array of session rows".to_string(),
        ));
    };
    let mut sessions = Vec::with_capacity(rows.len());
    for row in rows {
        let device_id = row.get("device_id").and_then(Value::as_str);
        let last_seen = row.get("last_seen").and_then(Value::as_str).and_then(parse_iso);
        match (device_id, last_seen) {
            (Some(device_id), Some(last_seen)) => sessions.push(DeviceSession {
                device_id: device_id.to_string(),
                last_seen,
            }),
            _ => warn!(%row, "skipping unreadable session row"),
        }
    }
    Ok(sessions)
}

#[async_trait]
impl RemoteStore for PostgrestStore {
    async fn fetch(
        &self,
        account: &AccountKey,
        category: Category,
    ) -> Result<Option<Value>, RemoteError> {
        let key = partition_key(&self.key_prefix, account, category);
        debug!(%key, "remote fetch");
        self.run_blocking(move |store| store.get_blocking(&key))
            .await
    }

    async fn save(
        &self,
        account: &AccountKey,
        category: Category,
        value: &Value,
    ) -> Result<(), RemoteError> {
        let key = partition_key(&self.key_prefix, account, category);
        debug!(%key, "remote save");
        let value = value.clone();
        self.run_blocking(move |store| store.upsert_blocking(&key, &value))
            .await
    }

    fn sessions(&self) -> Option<&dyn SessionStore> {
        Some(self)
    }
}

#[async_trait]
impl SessionStore for PostgrestStore {
    async fn ping(
        &self,
        account: &AccountKey,
        device_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), RemoteError> {
        let username = account.normalized();
        let device_id = device_id.to_string();
        let at = to_iso(&at);
        debug!(%username, %device_id, "session heartbeat");
        self.run_blocking(move |store| store.ping_blocking(&username, &device_id, &at))
            .await
    }

    async fn list_sessions(
        &self,
        account: &AccountKey,
    ) -> Result<Option<Vec<DeviceSession>>, RemoteError> {
        let username = account.normalized();
        self.run_blocking(move |store| store.list_sessions_blocking(&username))
            .await
    }

    async fn revoke(&self, account: &AccountKey, device_ids: &[String]) -> Result<(), RemoteError> {
        if device_ids.is_empty() {
            return Ok(());
        }
        let username = account.normalized();
        let device_ids = device_ids.to_vec();
        debug!(%username, count = device_ids.len(), "revoking sessions");
        self.run_blocking(move |store| store.revoke_blocking(&username, &device_ids))
            .await
    }
}
