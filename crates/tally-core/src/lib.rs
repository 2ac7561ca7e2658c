//! tally-core library: customer ledger data model, merge engine, local
//! cache, the offline-first sync orchestrator and device sessions.
//!
//! # Conventions
//!
//! - **Errors**: typed `thiserror` enums ([`error::ValidationError`],
//!   [`error::RemoteError`], [`error::CacheError`]) inside the library,
//!   `anyhow::Result` at application boundaries such as config loading.
//! - **Logging**: `tracing` macros. `warn!` for anything recovered from
//!   (dropped records, cache write failures, failed sync cycles),
//!   `debug!` for per-cycle details.
//! - **Local first**: mutations never wait on the network. Only the
//!   background sync can fail, and it reports through [`sync::SyncStatus`].

pub mod account;
pub mod backup;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod ledger;
pub mod merge;
pub mod model;
pub mod mutation;
pub mod remote;
pub mod session;
pub mod snapshot;
pub mod sync;
pub mod tombstone;

pub use account::AccountKey;
pub use ledger::Ledger;
pub use tombstone::TombstoneSet;
