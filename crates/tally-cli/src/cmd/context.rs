//! Per-invocation application context: config, data directory, session.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tally_core::cache::{CACHE_FILE_NAME, LocalCache};
use tally_core::clock::SystemClock;
use tally_core::config::{self, Config};
use tally_core::error::ErrorCode;
use tally_core::remote::{PostgrestStore, RemoteStore};
use tally_core::sync::SyncOrchestrator;
use tally_core::{AccountKey, Ledger};
use tracing::debug;

use crate::output::{CodedError, OutputMode, report_sync};

pub struct AppContext {
    pub config: Config,
    pub data_dir: PathBuf,
    pub output: OutputMode,
    /// Skip the remote for this invocation.
    pub offline: bool,
}

impl AppContext {
    /// # Errors
    ///
    /// Returns an error when no data directory can be determined.
    pub fn new(config: Config, output: OutputMode, offline: bool) -> Result<Self> {
        Ok(Self {
            config,
            data_dir: config::data_dir()?,
            output,
            offline,
        })
    }

    pub fn cache_path(&self) -> PathBuf {
        self.data_dir.join(CACHE_FILE_NAME)
    }

    /// Open (creating if needed) the Local Cache database.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the database
    /// cannot be opened or migrated.
    pub fn open_cache(&self) -> Result<LocalCache> {
        std::fs::create_dir_all(&self.data_dir)
            .with_context(|| format!("failed to create {}", self.data_dir.display()))?;
        let path = self.cache_path();
        LocalCache::open(&path).with_context(|| format!("failed to open {}", path.display()))
    }

    /// Cloud backend for this invocation, if configured and not offline.
    pub fn remote(&self) -> Option<Arc<dyn RemoteStore>> {
        if self.offline {
            debug!("offline flag set, cloud sync disabled for this run");
            return None;
        }
        let (url, key) = self.config.cloud.credentials()?;
        let timeout = Duration::from_secs(self.config.sync.request_timeout_secs.max(1));
        let store =
            PostgrestStore::new(url, key, timeout).with_key_prefix(&self.config.cloud.key_prefix);
        Some(Arc::new(store))
    }

    /// Build the orchestrator for `account` from the Local Cache.
    pub fn open_account(&self, account: AccountKey, cache: LocalCache) -> SyncOrchestrator {
        let ledger = Ledger::load(account, &cache, Arc::new(SystemClock));
        SyncOrchestrator::new(
            ledger,
            cache,
            self.remote(),
            self.config.sync.to_sync_config(),
        )
    }

    /// The orchestrator for the logged-in account.
    ///
    /// # Errors
    ///
    /// [`ErrorCode::NotLoggedIn`] without an active session, or a cache
    /// failure.
    pub fn session(&self) -> Result<SyncOrchestrator> {
        let cache = self.open_cache()?;
        let account = cache.session_account()?.ok_or_else(|| {
            CodedError::new(ErrorCode::NotLoggedIn, "no account is logged in")
        })?;
        Ok(self.open_account(account, cache))
    }

    /// Push a just-applied mutation: one immediate sync unless offline.
    ///
    /// A failed sync is reported on stderr and is not a command failure;
    /// the change is already in the Local Cache.
    pub async fn finish_mutation(&self, orch: &SyncOrchestrator) {
        if !self.offline {
            let outcome = orch.flush().await;
            report_sync(self.output, &outcome, &orch.status());
        }
        orch.shutdown();
    }
}
