//! `tally sync`, `tally status`, `tally watch`.

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use std::io::Write;
use std::time::Duration;
use tally_core::error::ErrorCode;
use tally_core::sync::{SyncErrorKind, SyncOutcome, SyncReport, SyncStatus};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::context::AppContext;
use crate::output::{CodedError, outcome_line, pretty_kv, render};

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Stop after this many seconds instead of waiting for Ctrl-C.
    #[arg(long, value_name = "SECS")]
    pub duration: Option<u64>,
}

#[derive(Debug, Serialize)]
struct SyncView<'a> {
    account: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<&'a SyncReport>,
    label: &'static str,
    detail: String,
    status: &'a SyncStatus,
}

fn failure_code(kind: SyncErrorKind) -> ErrorCode {
    match kind {
        SyncErrorKind::Network => ErrorCode::RemoteUnreachable,
        SyncErrorKind::Auth => ErrorCode::RemoteRejected,
    }
}

/// Manual refresh. Lifts an auth suspension and runs one cycle.
///
/// # Errors
///
/// Exits non-zero when the cycle fails. Local-only mode is not a failure.
pub async fn run_sync(ctx: &AppContext) -> Result<()> {
    let orch = ctx.session()?;
    let outcome = orch.refresh().await;
    orch.shutdown();
    let status = orch.status();
    let detail = outcome_line(&outcome, &status);

    if let SyncOutcome::Failed(kind) = outcome {
        return Err(CodedError::new(failure_code(kind), detail).into());
    }

    let report = match &outcome {
        SyncOutcome::Synced(report) => Some(report),
        _ => None,
    };
    let view = SyncView {
        account: orch.read(|l| l.account().to_string()),
        report,
        label: status.label(),
        detail,
        status: &status,
    };
    render(ctx.output, &view, |v, w| {
        writeln!(w, "{}", v.detail)?;
        if let Some(report) = v.report
            && report.skewed_records > 0
        {
            writeln!(
                w,
                "warning: {} records are stamped in the future; check this device's clock",
                report.skewed_records
            )?;
        }
        Ok(())
    })
}

#[derive(Debug, Serialize)]
struct StatusView<'a> {
    account: String,
    label: &'static str,
    customers: usize,
    items: usize,
    deleted_ids: usize,
    #[serde(flatten)]
    status: &'a SyncStatus,
}

/// Persisted sync status for the active account. Never touches the network.
///
/// # Errors
///
/// No active session, or a cache failure.
pub fn run_status(ctx: &AppContext) -> Result<()> {
    let orch = ctx.session()?;
    let status = orch.status();
    let view = orch.read(|l| StatusView {
        account: l.account().to_string(),
        label: status.label(),
        customers: l.customers().len(),
        items: l.items().len(),
        deleted_ids: l.tombstones().len(),
        status: &status,
    });
    render(ctx.output, &view, |v, w| {
        pretty_kv(w, "account", &v.account)?;
        pretty_kv(w, "sync", v.label)?;
        pretty_kv(w, "pending", if v.status.dirty { "yes" } else { "no" })?;
        pretty_kv(
            w,
            "last synced",
            v.status
                .last_synced_at
                .map_or_else(|| "never".to_string(), |at| at.to_rfc3339()),
        )?;
        if let Some(err) = &v.status.last_error {
            pretty_kv(w, "last error", err)?;
        }
        pretty_kv(
            w,
            "records",
            format!(
                "{} customers, {} items, {} deleted",
                v.customers, v.items, v.deleted_ids
            ),
        )
    })
}

/// Run the background sync loop and session heartbeat until Ctrl-C (or
/// `--duration`), printing each status change.
///
/// # Errors
///
/// No active session, this device was signed out from another one, or the
/// loop task panicked.
pub async fn run_watch(args: &WatchArgs, ctx: &AppContext) -> Result<()> {
    let orch = ctx.session()?;
    let cancel = CancellationToken::new();
    let mut status_rx = orch.subscribe();
    let background = orch.spawn_background(cancel.clone());
    info!(interval = ?orch.config().interval, "watching for changes");

    let limit = args.duration.map(Duration::from_secs);
    let stop = async move {
        let ctrl_c = async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = %err, "ctrl-c handler unavailable");
                std::future::pending::<()>().await;
            }
        };
        match limit {
            Some(limit) => {
                tokio::select! {
                    () = ctrl_c => {}
                    () = tokio::time::sleep(limit) => {}
                }
            }
            None => ctrl_c.await,
        }
    };
    tokio::pin!(stop);

    let mut last_label = "";
    loop {
        tokio::select! {
            () = &mut stop => break,
            changed = status_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let status = status_rx.borrow_and_update().clone();
                if status.label() != last_label {
                    last_label = status.label();
                    print_status_change(ctx, &status)?;
                }
                if status.signed_out {
                    break;
                }
            }
        }
    }

    cancel.cancel();
    background.await?;
    if orch.is_signed_out() {
        orch.shutdown();
        return Err(CodedError::new(
            ErrorCode::SignedOut,
            "this device was signed out from another device; local changes are kept in the cache",
        )
        .into());
    }
    let outcome = orch.flush().await;
    info!(?outcome, "watch stopped");
    orch.shutdown();
    Ok(())
}

fn print_status_change(ctx: &AppContext, status: &SyncStatus) -> Result<()> {
    render(ctx.output, status, |s, w| {
        let when = s
            .last_synced_at
            .map_or_else(|| "never".to_string(), |at| at.to_rfc3339());
        writeln!(w, "[{}] last synced {when}", s.label())
    })
}
