//! Sync engine: the pull/merge/push cycle and the orchestrator that decides
//! when to run it.

pub mod cycle;
pub mod orchestrator;
pub mod status;

pub use orchestrator::{SyncConfig, SyncOrchestrator};
pub use status::{RemoteCounts, SyncErrorKind, SyncOutcome, SyncReport, SyncState, SyncStatus};
