//! `tally sessions ...`

use anyhow::Result;
use clap::{Args, Subcommand};
use serde::Serialize;
use std::cmp::Reverse;
use std::io::Write;
use tally_core::Ledger;
use tally_core::error::ErrorCode;
use tally_core::model::stamp::to_iso;
use tally_core::session::{DeviceSession, SessionCheck};
use tally_core::sync::SyncOrchestrator;

use super::context::AppContext;
use crate::output::{CodedError, render};

#[derive(Subcommand, Debug)]
pub enum SessionsCommand {
    /// List devices signed in to the active account.
    List,
    /// Sign other devices out of the active account.
    Revoke(RevokeArgs),
}

#[derive(Args, Debug)]
pub struct RevokeArgs {
    /// Devices to sign out, as shown by `tally sessions list`.
    #[arg(value_name = "DEVICE_ID", required_unless_present = "idle")]
    pub device_ids: Vec<String>,
    /// Also sign out every device that has been idle for five minutes.
    #[arg(long)]
    pub idle: bool,
}

#[derive(Debug, Serialize)]
struct SessionRow {
    device_id: String,
    last_seen: String,
    this_device: bool,
    idle: bool,
}

/// # Errors
///
/// No active session, no session tracking on the cloud, a failed remote
/// request, or this device was signed out.
pub async fn run_sessions(command: &SessionsCommand, ctx: &AppContext) -> Result<()> {
    let orch = ctx.session()?;
    let result = match command {
        SessionsCommand::List => run_list(&orch, ctx).await,
        SessionsCommand::Revoke(args) => run_revoke(args, &orch, ctx).await,
    };
    orch.shutdown();
    result
}

/// Heartbeat first, so this device is listed and a sign-out is noticed.
async fn tracked_sessions(orch: &SyncOrchestrator, ctx: &AppContext) -> Result<Vec<DeviceSession>> {
    if orch.check_session().await == SessionCheck::Revoked {
        return Err(CodedError::new(
            ErrorCode::SignedOut,
            "this device was signed out from another device",
        )
        .into());
    }
    match orch.list_sessions().await {
        Ok(Some(sessions)) => Ok(sessions),
        Ok(None) if ctx.offline || ctx.config.cloud.credentials().is_none() => Err(CodedError::new(
            ErrorCode::InvalidInput,
            "device sessions need cloud sync; configure [cloud] and drop --offline",
        )
        .into()),
        Ok(None) => Err(CodedError::new(
            ErrorCode::InvalidInput,
            "the cloud store does not track device sessions",
        )
        .into()),
        Err(err) => Err(CodedError::new(err.code(), err.to_string()).into()),
    }
}

fn rows(orch: &SyncOrchestrator, mut sessions: Vec<DeviceSession>) -> Vec<SessionRow> {
    let this = orch.device_id();
    let now = orch.read(Ledger::now);
    let idle_after = orch.config().session.idle_after;
    sessions.sort_by_key(|s| Reverse(s.last_seen));
    sessions
        .into_iter()
        .map(|s| SessionRow {
            this_device: s.device_id == this,
            idle: s.device_id != this && s.is_idle(now, idle_after),
            last_seen: to_iso(&s.last_seen),
            device_id: s.device_id,
        })
        .collect()
}

async fn run_list(orch: &SyncOrchestrator, ctx: &AppContext) -> Result<()> {
    let sessions = tracked_sessions(orch, ctx).await?;
    let rows = rows(orch, sessions);
    render(ctx.output, &rows, |rows, w| {
        if rows.is_empty() {
            return writeln!(w, "No devices are signed in.");
        }
        for row in rows {
            let marker = if row.this_device {
                "  (this device)"
            } else if row.idle {
                "  (idle)"
            } else {
                ""
            };
            writeln!(w, "{}  last seen {}{marker}", row.device_id, row.last_seen)?;
        }
        Ok(())
    })
}

async fn run_revoke(args: &RevokeArgs, orch: &SyncOrchestrator, ctx: &AppContext) -> Result<()> {
    let this = orch.device_id();
    if args.device_ids.contains(&this) {
        return Err(CodedError::new(
            ErrorCode::InvalidInput,
            "that is this device; use `tally logout` instead",
        )
        .into());
    }

    let sessions = tracked_sessions(orch, ctx).await?;
    let mut targets = args.device_ids.clone();
    if args.idle {
        targets.extend(
            rows(orch, sessions)
                .into_iter()
                .filter(|row| row.idle)
                .map(|row| row.device_id),
        );
    }
    targets.sort();
    targets.dedup();

    if !targets.is_empty() {
        orch.revoke_sessions(&targets)
            .await
            .map_err(|err| CodedError::new(err.code(), err.to_string()))?;
    }
    render(
        ctx.output,
        &serde_json::json!({ "revoked": targets }),
        |_, w| {
            if targets.is_empty() {
                writeln!(w, "No devices to sign out.")
            } else {
                writeln!(w, "Signed out {} device(s): {}", targets.len(), targets.join(", "))
            }
        },
    )
}
