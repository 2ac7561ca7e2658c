//! `tally export` and `tally import`.

use anyhow::{Context, Result};
use clap::Args;
use std::io::Write;
use std::path::PathBuf;
use tally_core::backup::{default_file_name, export, parse_backup};

use super::context::AppContext;
use crate::output::render;

#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Destination file, or `-` for stdout. Defaults to
    /// `backup_<account>_<date>.json` in the current directory.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Backup file written by `tally export`.
    pub file: PathBuf,
}

/// # Errors
///
/// No active session, or the file cannot be written.
pub fn run_export(args: &ExportArgs, ctx: &AppContext) -> Result<()> {
    let orch = ctx.session()?;
    let backup = orch.read(export);
    let text = serde_json::to_string_pretty(&backup)?;

    if args.output.as_deref().is_some_and(|p| p.as_os_str() == "-") {
        println!("{text}");
        return Ok(());
    }
    let path = args
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(default_file_name(&backup)));
    std::fs::write(&path, text).with_context(|| format!("failed to write {}", path.display()))?;

    render(
        ctx.output,
        &serde_json::json!({
            "path": path,
            "customers": backup.customers.len(),
            "items": backup.items.len(),
        }),
        |_, w| {
            writeln!(
                w,
                "Exported {} customers and {} items to {}",
                backup.customers.len(),
                backup.items.len(),
                path.display()
            )
        },
    )
}

/// Merge a backup into the active account.
///
/// # Errors
///
/// Unreadable or invalid backup file, or no active session.
pub async fn run_import(args: &ImportArgs, ctx: &AppContext) -> Result<()> {
    let text = std::fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    let imported = parse_backup(&text)?;
    let orch = ctx.session()?;

    let stats = orch.mutate(|l| {
        Ok::<_, std::convert::Infallible>(l.apply_import(&imported.customers, &imported.items))
    })?;
    let (customers, items) = orch.read(|l| (l.customers().len(), l.items().len()));
    render(
        ctx.output,
        &serde_json::json!({
            "version": imported.version,
            "merge": stats,
            "customers": customers,
            "items": items,
        }),
        |_, w| {
            writeln!(
                w,
                "Imported {} customers and {} items; ledger now has {customers} customers and {items} items",
                imported.customers.len(),
                imported.items.len()
            )
        },
    )?;
    ctx.finish_mutation(&orch).await;
    Ok(())
}
