//! `tally login`, `tally logout`, `tally whoami`.

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use std::io::Write;
use tally_core::AccountKey;
use tally_core::error::ErrorCode;
use tally_core::sync::SyncOutcome;
use tracing::{debug, info};

use super::context::AppContext;
use crate::output::{CodedError, pretty_kv, render, report_sync};

#[derive(Args, Debug)]
pub struct LoginArgs {
    /// Account identifier (for example an email address).
    pub account: String,
}

#[derive(Args, Debug)]
pub struct LogoutArgs {
    /// Log out even if local changes have not reached the cloud.
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Serialize)]
struct SessionView {
    account: String,
    customers: usize,
    items: usize,
    sync: &'static str,
}

/// Activate an account context: load it from the cache, then pull.
///
/// # Errors
///
/// Blank account, or the cache cannot be opened.
pub async fn run_login(args: &LoginArgs, ctx: &AppContext) -> Result<()> {
    let account = AccountKey::new(&args.account)?;
    let cache = ctx.open_cache()?;
    if let Some(previous) = cache.session_account()?
        && previous != account
    {
        info!(from = %previous, to = %account, "switching account");
    }
    cache.set_session_account(Some(&account))?;
    info!(account = %account, "logged in");

    let orch = ctx.open_account(account, cache);
    let outcome = if ctx.offline {
        SyncOutcome::LocalOnly
    } else {
        let check = orch.check_session().await;
        debug!(?check, device_id = %orch.device_id(), "session registered");
        orch.on_foreground().await
    };
    let status = orch.status();
    if !ctx.offline {
        report_sync(ctx.output, &outcome, &status);
    }

    let view = orch.read(|ledger| SessionView {
        account: ledger.account().to_string(),
        customers: ledger.customers().len(),
        items: ledger.items().len(),
        sync: status.label(),
    });
    orch.shutdown();
    render(ctx.output, &view, |v, w| {
        writeln!(w, "Logged in as {}", v.account)?;
        pretty_kv(w, "customers", v.customers.to_string())?;
        pretty_kv(w, "items", v.items.to_string())?;
        pretty_kv(w, "sync", v.sync)
    })
}

/// Clear the session and remove this device from the cloud's session
/// list. With a cloud configured, refuses while local changes are unsynced
/// unless `--force`; a sync is attempted first.
///
/// # Errors
///
/// Not logged in, unsynced changes without `--force`, or a cache failure.
pub async fn run_logout(args: &LogoutArgs, ctx: &AppContext) -> Result<()> {
    let orch = ctx.session()?;
    if orch.status().dirty && !ctx.offline {
        let outcome = orch.flush().await;
        report_sync(ctx.output, &outcome, &orch.status());
    }
    orch.shutdown();

    let (account, dirty) = orch.read(|l| (l.account().to_string(), l.is_dirty()));
    // Without a cloud the cache is the only copy and nothing can be lost.
    let cloud_configured = ctx.config.cloud.credentials().is_some();
    if dirty && cloud_configured && !args.force {
        return Err(CodedError::new(
            ErrorCode::InvalidInput,
            format!(
                "{account} has changes that have not reached the cloud; run `tally sync` or pass --force"
            ),
        )
        .into());
    }

    if !ctx.offline {
        orch.end_session().await;
    }
    orch.with_cache(|cache| cache.set_session_account(None))?;
    info!(account = %account, unsynced = dirty, "logged out");
    render(
        ctx.output,
        &serde_json::json!({ "logged_out": account, "unsynced_changes": dirty }),
        |_, w| writeln!(w, "Logged out of {account}"),
    )
}

/// # Errors
///
/// [`ErrorCode::NotLoggedIn`] without an active session.
pub fn run_whoami(ctx: &AppContext) -> Result<()> {
    let cache = ctx.open_cache()?;
    let account = cache
        .session_account()?
        .ok_or_else(|| CodedError::new(ErrorCode::NotLoggedIn, "no account is logged in"))?;
    render(
        ctx.output,
        &serde_json::json!({ "account": account.as_str(), "key": account.normalized() }),
        |_, w| writeln!(w, "{account}"),
    )
}
