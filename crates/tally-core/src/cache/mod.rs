//! Local cache: the on-device mirror of the last-known-good state.
//!
//! One SQLite database holds every account's collections, the sync
//! bookkeeping and the active session. Connection defaults:
//! - `journal_mode = WAL` so `tally status` can read while `tally watch` writes
//! - `busy_timeout = 5s` to ride out short lock contention between processes
//!
//! Reads never fail from the caller's point of view: a missing or corrupt
//! entry reads as `None` and the caller falls back to an empty collection.
//! Writes return an error so callers can log it, but a failed write never
//! rolls back an in-memory mutation.

pub mod schema;

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::account::AccountKey;
use crate::error::CacheError;
use crate::model::stamp::{parse_iso, to_iso};
use crate::snapshot::{Category, decode_elements};

/// Busy timeout for cache connections.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// File name of the cache database inside the data directory.
pub const CACHE_FILE_NAME: &str = "tally.sqlite3";

/// Sync bookkeeping persisted per account.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncMeta {
    pub dirty: bool,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub suspended: bool,
    pub last_error: Option<String>,
}

/// When the current session began and when this device last reached the
/// remote session table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionTimes {
    pub started_at: Option<DateTime<Utc>>,
    pub last_ping_at: Option<DateTime<Utc>>,
}

pub struct LocalCache {
    conn: Connection,
}

impl std::fmt::Debug for LocalCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalCache")
            .field("path", &self.conn.path())
            .finish()
    }
}

impl LocalCache {
    /// Open (or create) the cache database, apply pragmas, and migrate.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the database
    /// cannot be opened, configured or migrated.
    pub fn open(path: &Path) -> Result<Self, CacheError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut conn = Connection::open(path)?;
        configure_connection(&conn)?;
        schema::migrate(&mut conn)?;
        Ok(Self { conn })
    }

    /// Private in-memory cache, for tests and embedders without a disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be migrated.
    pub fn open_in_memory() -> Result<Self, CacheError> {
        let mut conn = Connection::open_in_memory()?;
        schema::migrate(&mut conn)?;
        Ok(Self { conn })
    }

    /// Cached collection, or `None` when absent or undecodable.
    #[must_use]
    pub fn read<T: DeserializeOwned>(&self, account: &AccountKey, category: Category) -> Option<Vec<T>> {
        let raw = match self.read_raw(account, category) {
            Ok(raw) => raw?,
            Err(err) => {
                warn!(%category, error = %err, "cache read failed");
                return None;
            }
        };
        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Array(elements)) => Some(decode_elements(category, elements)),
            Ok(_) => {
                warn!(%category, "cache entry is not an array, ignoring it");
                None
            }
            Err(err) => {
                warn!(%category, error = %err, "cache entry is not valid JSON, ignoring it");
                None
            }
        }
    }

    fn read_raw(&self, account: &AccountKey, category: Category) -> Result<Option<String>, CacheError> {
        let raw = self
            .conn
            .query_row(
                "SELECT value FROM cache_entries WHERE account = ?1 AND category = ?2",
                params![account.normalized(), category.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(raw)
    }

    /// Replace a cached collection.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or the SQLite write fails.
    pub fn write<T: Serialize>(
        &self,
        account: &AccountKey,
        category: Category,
        records: &[T],
    ) -> Result<(), CacheError> {
        let value = serde_json::to_string(records)?;
        self.conn.execute(
            "INSERT INTO cache_entries (account, category, value, written_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (account, category)
             DO UPDATE SET value = excluded.value, written_at = excluded.written_at",
            params![
                account.normalized(),
                category.as_str(),
                value,
                to_iso(&Utc::now())
            ],
        )?;
        Ok(())
    }

    /// Persisted sync bookkeeping; defaults when never written.
    #[must_use]
    pub fn read_meta(&self, account: &AccountKey) -> SyncMeta {
        match self.try_read_meta(account) {
            Ok(meta) => meta.unwrap_or_default(),
            Err(err) => {
                warn!(error = %err, "sync metadata read failed");
                SyncMeta::default()
            }
        }
    }

    fn try_read_meta(&self, account: &AccountKey) -> Result<Option<SyncMeta>, CacheError> {
        let meta = self
            .conn
            .query_row(
                "SELECT dirty, last_synced_at, suspended, last_error
                 FROM sync_meta WHERE account = ?1",
                [account.normalized()],
                |row| {
                    let last_synced: Option<String> = row.get(1)?;
                    Ok(SyncMeta {
                        dirty: row.get(0)?,
                        last_synced_at: last_synced.as_deref().and_then(parse_iso),
                        suspended: row.get(2)?,
                        last_error: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(meta)
    }

    /// # Errors
    ///
    /// Returns an error if the SQLite write fails.
    pub fn write_meta(&self, account: &AccountKey, meta: &SyncMeta) -> Result<(), CacheError> {
        self.conn.execute(
            "INSERT INTO sync_meta (account, dirty, last_synced_at, suspended, last_error)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (account) DO UPDATE SET
                dirty = excluded.dirty,
                last_synced_at = excluded.last_synced_at,
                suspended = excluded.suspended,
                last_error = excluded.last_error",
            params![
                account.normalized(),
                meta.dirty,
                meta.last_synced_at.as_ref().map(to_iso),
                meta.suspended,
                meta.last_error,
            ],
        )?;
        Ok(())
    }

    /// The account the CLI is logged in as, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the SQLite read fails.
    pub fn session_account(&self) -> Result<Option<AccountKey>, CacheError> {
        let raw: Option<String> = self
            .conn
            .query_row("SELECT account FROM session WHERE id = 1", [], |row| {
                row.get::<_, Option<String>>(0)
            })
            .optional()?
            .flatten();
        Ok(raw.and_then(|raw| AccountKey::new(&raw).ok()))
    }

    /// Set or clear the active account. Either way the session timing
    /// starts over; the device id is kept.
    ///
    /// # Errors
    ///
    /// Returns an error if the SQLite write fails.
    pub fn set_session_account(&self, account: Option<&AccountKey>) -> Result<(), CacheError> {
        self.conn.execute(
            "INSERT INTO session (id, account) VALUES (1, ?1)
             ON CONFLICT (id) DO UPDATE SET
                account = excluded.account,
                started_at = NULL,
                last_ping_at = NULL",
            [account.map(AccountKey::as_str)],
        )?;
        Ok(())
    }

    /// This device's id, generated and stored on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the SQLite read or write fails.
    pub fn device_id(&self) -> Result<String, CacheError> {
        let existing: Option<String> = self
            .conn
            .query_row("SELECT device_id FROM session WHERE id = 1", [], |row| {
                row.get::<_, Option<String>>(0)
            })
            .optional()?
            .flatten();
        if let Some(id) = existing.filter(|id| !id.trim().is_empty()) {
            return Ok(id);
        }
        let id = Uuid::new_v4().to_string();
        self.conn.execute(
            "INSERT INTO session (id, device_id) VALUES (1, ?1)
             ON CONFLICT (id) DO UPDATE SET device_id = excluded.device_id",
            [&id],
        )?;
        Ok(id)
    }

    /// # Errors
    ///
    /// Returns an error if the SQLite read fails.
    pub fn session_times(&self) -> Result<SessionTimes, CacheError> {
        let times = self
            .conn
            .query_row(
                "SELECT started_at, last_ping_at FROM session WHERE id = 1",
                [],
                |row| {
                    let started: Option<String> = row.get(0)?;
                    let pinged: Option<String> = row.get(1)?;
                    Ok(SessionTimes {
                        started_at: started.as_deref().and_then(parse_iso),
                        last_ping_at: pinged.as_deref().and_then(parse_iso),
                    })
                },
            )
            .optional()?;
        Ok(times.unwrap_or_default())
    }

    /// # Errors
    ///
    /// Returns an error if the SQLite write fails.
    pub fn set_session_started(&self, at: DateTime<Utc>) -> Result<(), CacheError> {
        self.conn.execute(
            "UPDATE session SET started_at = ?1 WHERE id = 1",
            [to_iso(&at)],
        )?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the SQLite write fails.
    pub fn record_ping(&self, at: DateTime<Utc>) -> Result<(), CacheError> {
        self.conn.execute(
            "UPDATE session SET last_ping_at = ?1 WHERE id = 1",
            [to_iso(&at)],
        )?;
        Ok(())
    }
}

fn configure_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    let _journal_mode: String =
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;
    Ok(())
}
