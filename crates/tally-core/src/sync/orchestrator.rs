//! Sync scheduling: when to run a cycle, and what state to report.
//!
//! Triggers:
//! - local mutation: mark dirty, restart the debounce timer; when it fires
//!   and the ledger is still dirty, run a cycle
//! - periodic tick and app foreground: run a cycle regardless of dirty, to
//!   pull other devices' edits
//! - manual refresh: clear an auth suspension, then run a cycle
//! - flush: drop the pending debounce and run a cycle now
//!
//! At most one cycle runs at a time. A request that arrives while one is
//! running returns [`SyncOutcome::Coalesced`] and the running cycle does one
//! follow-up pass if the ledger is still dirty when it finishes.
//!
//! The orchestrator also keeps this device's session alive (see
//! [`crate::session`]). Once another device signs this one out, every sync
//! request answers [`SyncOutcome::SignedOut`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use uuid::Uuid;

use super::cycle::{self, bounded};
use super::status::{SyncErrorKind, SyncOutcome, SyncState, SyncStatus};
use crate::cache::{LocalCache, SessionTimes};
use crate::error::RemoteError;
use crate::ledger::Ledger;
use crate::remote::RemoteStore;
use crate::session::{DeviceSession, SessionCheck, SessionConfig, SessionTracker};

/// Timing knobs for the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    /// Quiet period after the last mutation before pushing.
    pub debounce: Duration,
    /// Period of the background pull.
    pub interval: Duration,
    /// Bound on each remote request.
    pub request_timeout: Duration,
    /// Bound on a whole cycle; clears `Syncing` even if a request never
    /// resolves. A cycle is a pull round then a push round, each bounded by
    /// `request_timeout`, so keep this at least twice that or a slow but
    /// working network gets cut off mid-push.
    pub failsafe: Duration,
    pub session: SessionConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(2000),
            interval: Duration::from_secs(30),
            request_timeout: Duration::from_secs(7),
            failsafe: Duration::from_secs(15),
            session: SessionConfig::default(),
        }
    }
}

struct Inner {
    ledger: Mutex<Ledger>,
    cache: Mutex<LocalCache>,
    remote: Option<Arc<dyn RemoteStore>>,
    config: SyncConfig,
    gate: tokio::sync::Mutex<()>,
    rerun: AtomicBool,
    suspended: AtomicBool,
    signed_out: AtomicBool,
    session: Mutex<SessionTracker>,
    last_error: Mutex<Option<String>>,
    debounce: Mutex<Option<JoinHandle<()>>>,
    status: watch::Sender<SyncStatus>,
}

/// Owns the active account context and drives its synchronization.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SyncOrchestrator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SyncOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncOrchestrator")
            .field("config", &self.inner.config)
            .field("status", &*self.inner.status.borrow())
            .finish_non_exhaustive()
    }
}

impl SyncOrchestrator {
    /// `remote: None` runs Local-Cache-only: every sync request returns
    /// [`SyncOutcome::LocalOnly`] without error.
    #[must_use]
    pub fn new(
        ledger: Ledger,
        cache: LocalCache,
        remote: Option<Arc<dyn RemoteStore>>,
        config: SyncConfig,
    ) -> Self {
        let meta = cache.read_meta(ledger.account());
        let status = SyncStatus {
            state: if meta.suspended {
                SyncState::Error(SyncErrorKind::Auth)
            } else {
                SyncState::Idle
            },
            dirty: ledger.is_dirty(),
            last_synced_at: ledger.last_synced_at(),
            suspended: meta.suspended,
            last_error: meta.last_error.clone(),
            cloud_enabled: remote.is_some(),
            signed_out: false,
        };
        let session = open_session(&ledger, &cache, config.session);
        let (status_tx, _) = watch::channel(status);
        Self {
            inner: Arc::new(Inner {
                ledger: Mutex::new(ledger),
                cache: Mutex::new(cache),
                remote,
                config,
                gate: tokio::sync::Mutex::new(()),
                rerun: AtomicBool::new(false),
                suspended: AtomicBool::new(meta.suspended),
                signed_out: AtomicBool::new(false),
                session: Mutex::new(session),
                last_error: Mutex::new(meta.last_error),
                debounce: Mutex::new(None),
                status: status_tx,
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> SyncConfig {
        self.inner.config
    }

    #[must_use]
    pub fn status(&self) -> SyncStatus {
        self.inner.status.borrow().clone()
    }

    /// Receiver that observes every status change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.inner.status.subscribe()
    }

    #[must_use]
    pub fn is_suspended(&self) -> bool {
        self.inner.suspended.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_signed_out(&self) -> bool {
        self.inner.signed_out.load(Ordering::SeqCst)
    }

    /// This device's id in the remote session table.
    #[must_use]
    pub fn device_id(&self) -> String {
        self.inner.session.lock().device_id().to_string()
    }

    /// Read access to the ledger.
    pub fn read<R>(&self, f: impl FnOnce(&Ledger) -> R) -> R {
        f(&*self.inner.ledger.lock())
    }

    /// Read access to the cache, for session bookkeeping.
    pub fn with_cache<R>(&self, f: impl FnOnce(&LocalCache) -> R) -> R {
        f(&*self.inner.cache.lock())
    }

    /// Apply a mutation to the ledger.
    ///
    /// On success the new state is written to the Local Cache (a write
    /// failure is logged, not returned) and the debounce timer restarts.
    /// On failure nothing changed and nothing is scheduled.
    ///
    /// # Errors
    ///
    /// Whatever `f` returns.
    pub fn mutate<R, E>(&self, f: impl FnOnce(&mut Ledger) -> Result<R, E>) -> Result<R, E> {
        let result = {
            let mut ledger = self.inner.ledger.lock();
            let before = ledger.generation();
            let result = f(&mut *ledger);
            if result.is_ok() && ledger.generation() != before {
                ledger.persist_or_warn(&self.inner.cache.lock());
            }
            result
        };
        if result.is_ok() {
            let now = self.read(Ledger::now);
            self.inner.session.lock().record_activity(now);
            self.notify_local_change();
        }
        result
    }

    /// Mark dirty and restart the debounce timer.
    ///
    /// Outside a Tokio runtime the timer is not started; the change is
    /// still in the cache and goes out with the next sync.
    pub fn notify_local_change(&self) {
        let dirty = self.inner.ledger.lock().is_dirty();
        self.inner.status.send_modify(|s| s.dirty = dirty);
        self.persist_meta();

        if self.inner.remote.is_none() || self.is_suspended() || self.is_signed_out() {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("no runtime, debounced sync not scheduled");
            return;
        };

        let this = self.clone();
        let delay = self.inner.config.debounce;
        let timer = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if this.read(Ledger::is_dirty) && !this.is_suspended() {
                // Detached so a later restart of the timer cannot abort a
                // cycle that is already talking to the remote.
                tokio::spawn(async move {
                    this.request_sync().await;
                });
            }
        });
        if let Some(previous) = self.inner.debounce.lock().replace(timer) {
            previous.abort();
        }
    }

    /// Periodic pull. Does nothing while suspended.
    pub async fn tick(&self) -> SyncOutcome {
        if self.inner.remote.is_none() {
            return SyncOutcome::LocalOnly;
        }
        if self.is_signed_out() {
            return SyncOutcome::SignedOut;
        }
        if self.is_suspended() {
            debug!("sync suspended, skipping tick");
            return SyncOutcome::Suspended;
        }
        self.request_sync().await
    }

    /// App returned to the foreground.
    pub async fn on_foreground(&self) -> SyncOutcome {
        self.tick().await
    }

    /// Manual sync. Lifts an auth suspension first.
    pub async fn refresh(&self) -> SyncOutcome {
        if self.is_signed_out() {
            return SyncOutcome::SignedOut;
        }
        if self.inner.suspended.swap(false, Ordering::SeqCst) {
            info!("manual refresh, resuming suspended sync");
            self.inner.status.send_modify(|s| s.suspended = false);
        }
        self.request_sync().await
    }

    /// Drop the pending debounce and sync now.
    pub async fn flush(&self) -> SyncOutcome {
        self.cancel_debounce();
        self.tick().await
    }

    /// Run [`Self::tick`] every `interval` and [`Self::check_session`]
    /// every heartbeat until `cancel` fires or the device is signed out.
    #[must_use]
    pub fn spawn_background(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(this.inner.config.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut heartbeat = tokio::time::interval(this.inner.config.session.heartbeat);
            heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = heartbeat.tick() => {
                        let check = this.check_session().await;
                        debug!(?check, "session heartbeat");
                        if check == SessionCheck::Revoked {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        let outcome = this.tick().await;
                        debug!(?outcome, "background tick");
                    }
                }
            }
            debug!("background sync stopped");
        })
    }

    /// Verify this device is still signed in, then send a heartbeat if the
    /// user was active recently.
    ///
    /// Failures are logged and reported as [`SessionCheck::Unavailable`];
    /// they never change the sync status.
    pub async fn check_session(&self) -> SessionCheck {
        if self.is_signed_out() {
            return SessionCheck::Revoked;
        }
        let Some(remote) = self.inner.remote.clone() else {
            return SessionCheck::Unavailable;
        };
        let Some(store) = remote.sessions() else {
            return SessionCheck::Unavailable;
        };
        let limit = self.inner.config.request_timeout;
        let (account, now) = self.read(|l| (l.account().clone(), l.now()));
        let (device_id, verify, ping) = {
            let tracker = self.inner.session.lock();
            (
                tracker.device_id().to_string(),
                !tracker.in_grace(now),
                tracker.should_ping(now),
            )
        };

        if verify {
            match bounded(limit, store.list_sessions(&account)).await {
                Ok(Some(listed)) => {
                    let revoked = self.inner.session.lock().is_revoked(&listed, now);
                    if revoked {
                        self.sign_out_locally();
                        return SessionCheck::Revoked;
                    }
                }
                Ok(None) => {
                    debug!("remote has no session table, tracking disabled");
                    return SessionCheck::Unavailable;
                }
                Err(err) => {
                    warn!(error = %err, "session check failed");
                    return SessionCheck::Unavailable;
                }
            }
        }

        if !ping {
            return SessionCheck::Active { pinged: false };
        }
        match bounded(limit, store.ping(&account, &device_id, now)).await {
            Ok(()) => {
                self.inner.session.lock().record_ping(now);
                if let Err(err) = self.inner.cache.lock().record_ping(now) {
                    warn!(error = %err, "session ping time not saved");
                }
                SessionCheck::Active { pinged: true }
            }
            Err(err) => {
                warn!(error = %err, "session heartbeat failed");
                SessionCheck::Unavailable
            }
        }
    }

    /// Devices signed in to this account, as the remote lists them.
    /// `Ok(None)` when the backend does not track sessions.
    ///
    /// # Errors
    ///
    /// The remote request failed or timed out.
    pub async fn list_sessions(&self) -> Result<Option<Vec<DeviceSession>>, RemoteError> {
        let Some(remote) = self.inner.remote.clone() else {
            return Ok(None);
        };
        let Some(store) = remote.sessions() else {
            return Ok(None);
        };
        let account = self.read(|l| l.account().clone());
        bounded(self.inner.config.request_timeout, store.list_sessions(&account)).await
    }

    /// Sign other devices out. Returns `false` when the backend does not
    /// track sessions.
    ///
    /// # Errors
    ///
    /// The remote request failed or timed out.
    pub async fn revoke_sessions(&self, device_ids: &[String]) -> Result<bool, RemoteError> {
        let Some(remote) = self.inner.remote.clone() else {
            return Ok(false);
        };
        let Some(store) = remote.sessions() else {
            return Ok(false);
        };
        let account = self.read(|l| l.account().clone());
        bounded(
            self.inner.config.request_timeout,
            store.revoke(&account, device_ids),
        )
        .await?;
        info!(count = device_ids.len(), "signed out other devices");
        Ok(true)
    }

    /// Remove this device from the session table at logout. Best effort.
    pub async fn end_session(&self) {
        let device_id = self.device_id();
        match self.revoke_sessions(std::slice::from_ref(&device_id)).await {
            Ok(_) => debug!(%device_id, "session ended"),
            Err(err) => warn!(error = %err, "could not remove this device's session"),
        }
    }

    fn sign_out_locally(&self) {
        if self.inner.signed_out.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cancel_debounce();
        let device_id = self.device_id();
        warn!(%device_id, "this device was signed out from another device");
        if let Err(err) = self.inner.cache.lock().set_session_account(None) {
            warn!(error = %err, "could not clear the cached session");
        }
        self.inner.status.send_modify(|s| s.signed_out = true);
    }

    /// Cancel the pending debounce timer.
    pub fn shutdown(&self) {
        self.cancel_debounce();
    }

    fn cancel_debounce(&self) {
        if let Some(timer) = self.inner.debounce.lock().take() {
            timer.abort();
        }
    }

    async fn request_sync(&self) -> SyncOutcome {
        let Some(remote) = self.inner.remote.clone() else {
            return SyncOutcome::LocalOnly;
        };
        if self.is_signed_out() {
            return SyncOutcome::SignedOut;
        }
        let Ok(_gate) = self.inner.gate.try_lock() else {
            self.inner.rerun.store(true, Ordering::SeqCst);
            debug!("sync already in flight, coalescing");
            return SyncOutcome::Coalesced;
        };

        loop {
            self.inner.rerun.store(false, Ordering::SeqCst);
            let outcome = self.run_once(remote.as_ref()).await;
            let again = matches!(outcome, SyncOutcome::Synced(_))
                && self.inner.rerun.swap(false, Ordering::SeqCst)
                && self.read(Ledger::is_dirty);
            if !again {
                return outcome;
            }
            debug!("running follow-up cycle for coalesced request");
        }
    }

    async fn run_once(&self, remote: &dyn RemoteStore) -> SyncOutcome {
        self.inner.status.send_modify(|s| s.state = SyncState::Syncing);
        let config = self.inner.config;
        let result = tokio::time::timeout(
            config.failsafe,
            cycle::run(
                remote,
                &self.inner.ledger,
                &self.inner.cache,
                config.request_timeout,
            ),
        )
        .await;

        let outcome = match result {
            Ok(Ok(report)) => {
                info!(
                    pulled = ?report.pulled,
                    pushed = ?report.pushed,
                    "sync complete"
                );
                *self.inner.last_error.lock() = None;
                SyncOutcome::Synced(report)
            }
            Ok(Err(err)) => {
                let kind = err.kind();
                if kind == SyncErrorKind::Auth {
                    self.inner.suspended.store(true, Ordering::SeqCst);
                    warn!(error = %err, "sync rejected, background sync suspended until refresh");
                } else {
                    warn!(error = %err, "sync failed, will retry");
                }
                *self.inner.last_error.lock() = Some(err.to_string());
                SyncOutcome::Failed(kind)
            }
            Err(_) => {
                warn!(failsafe = ?config.failsafe, "sync cycle exceeded failsafe, abandoning it");
                *self.inner.last_error.lock() =
                    Some(format!("sync timed out after {:?}", config.failsafe));
                SyncOutcome::Failed(SyncErrorKind::Network)
            }
        };

        let (dirty, last_synced_at) = self.read(|l| (l.is_dirty(), l.last_synced_at()));
        let suspended = self.is_suspended();
        let last_error = self.inner.last_error.lock().clone();
        self.inner.status.send_modify(|s| {
            s.state = match &outcome {
                SyncOutcome::Failed(kind) => SyncState::Error(*kind),
                _ => SyncState::Idle,
            };
            s.dirty = dirty;
            s.last_synced_at = last_synced_at;
            s.suspended = suspended;
            s.last_error = last_error;
        });
        self.persist_meta();
        outcome
    }

    fn persist_meta(&self) {
        let ledger = self.inner.ledger.lock();
        let meta = ledger.meta(self.is_suspended(), self.inner.last_error.lock().clone());
        if let Err(err) = self.inner.cache.lock().write_meta(ledger.account(), &meta) {
            warn!(error = %err, "sync metadata write failed");
        }
    }
}

/// Session state from the cache. The first open after login stamps the
/// session start.
fn open_session(ledger: &Ledger, cache: &LocalCache, config: SessionConfig) -> SessionTracker {
    let now = ledger.now();
    let device_id = cache.device_id().unwrap_or_else(|err| {
        warn!(error = %err, "device id unavailable, using a temporary one");
        Uuid::new_v4().to_string()
    });
    let times = cache.session_times().unwrap_or_else(|err| {
        warn!(error = %err, "session times unavailable");
        SessionTimes::default()
    });
    let started_at = times.started_at.unwrap_or_else(|| {
        if let Err(err) = cache.set_session_started(now) {
            warn!(error = %err, "session start not saved");
        }
        now
    });
    SessionTracker::new(device_id, started_at, times.last_ping_at, now, config)
}
