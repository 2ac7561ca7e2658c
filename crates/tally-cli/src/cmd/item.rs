//! `tally item ...`

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use std::io::{Read, Write};
use std::path::PathBuf;
use tally_core::error::{ErrorCode, ValidationError};
use tally_core::model::item::list_items;
use tally_core::mutation::{ItemPatch, NewItem, parse_bulk_items};

use super::context::AppContext;
use crate::output::{CodedError, money, pretty_section, render};

#[derive(Subcommand, Debug)]
pub enum ItemCommand {
    /// Add a catalog item.
    Add(AddArgs),
    /// Change an item's name, price or unit.
    Edit(EditArgs),
    /// Delete an item. Transactions keep their copies.
    Delete(IdArgs),
    /// List the catalog.
    List(ListArgs),
    /// Add many items from `name, price[, unit]` lines.
    BulkAdd(BulkAddArgs),
}

#[derive(Args, Debug)]
pub struct AddArgs {
    pub name: String,
    #[arg(short, long)]
    pub price: f64,
    #[arg(short, long)]
    pub unit: Option<String>,
}

#[derive(Args, Debug)]
pub struct EditArgs {
    pub id: String,
    #[arg(long)]
    pub name: Option<String>,
    #[arg(short, long)]
    pub price: Option<f64>,
    /// New unit; an empty string clears it.
    #[arg(short, long)]
    pub unit: Option<String>,
}

#[derive(Args, Debug)]
pub struct IdArgs {
    pub id: String,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    #[arg(short, long, default_value = "")]
    pub search: String,
}

#[derive(Args, Debug)]
pub struct BulkAddArgs {
    /// Read lines from this file instead of stdin.
    #[arg(short, long)]
    pub file: Option<PathBuf>,
}

fn read_bulk_input(args: &BulkAddArgs) -> Result<String> {
    match &args.file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display())),
        None => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("failed to read stdin")?;
            Ok(text)
        }
    }
}

/// # Errors
///
/// Validation failures, unknown ids, or no active session.
pub async fn run_item(command: &ItemCommand, ctx: &AppContext) -> Result<()> {
    let orch = ctx.session()?;
    let out = ctx.output;
    match command {
        ItemCommand::Add(args) => {
            let new = NewItem {
                name: args.name.clone(),
                price: args.price,
                unit: args.unit.clone(),
            };
            let item = orch.mutate(|l| l.add_item(&new))?;
            render(out, &item, |i, w| writeln!(w, "Added item {} ({})", i.name, i.id))?;
            ctx.finish_mutation(&orch).await;
        }
        ItemCommand::Edit(args) => {
            let patch = ItemPatch {
                name: args.name.clone(),
                price: args.price,
                unit: args.unit.clone(),
            };
            let item = orch.mutate(|l| l.edit_item(&args.id, &patch))?;
            render(out, &item, |i, w| writeln!(w, "Updated item {} ({})", i.name, i.id))?;
            ctx.finish_mutation(&orch).await;
        }
        ItemCommand::Delete(args) => {
            let removed = orch.mutate(|l| l.delete_item(&args.id))?;
            render(out, &serde_json::json!({ "deleted": removed.id }), |_, w| {
                writeln!(w, "Deleted item {}", removed.name)
            })?;
            ctx.finish_mutation(&orch).await;
        }
        ItemCommand::List(args) => {
            orch.read(|ledger| {
                let rows = list_items(ledger.items(), &args.search);
                render(out, &rows, |rows, w| {
                    if out.is_pretty() {
                        pretty_section(w, &format!("Items ({})", rows.len()))?;
                    }
                    for item in rows {
                        let unit = item.unit.as_deref().unwrap_or("");
                        if out.is_pretty() {
                            writeln!(w, "{:<28} {:>10} {:<6} {}", item.name, money(item.price), unit, item.id)?;
                        } else {
                            writeln!(w, "{}\t{}\t{}\t{}", item.id, item.name, money(item.price), unit)?;
                        }
                    }
                    Ok(())
                })
            })?;
        }
        ItemCommand::BulkAdd(args) => {
            let text = read_bulk_input(args)?;
            let lines = parse_bulk_items(&text);
            let rejected: Vec<String> = lines
                .iter()
                .filter_map(|l| l.parsed.as_ref().err().map(|e| format!("line {}: {e}: {}", l.line, l.text)))
                .collect();
            if !rejected.is_empty() {
                return Err(CodedError::new(
                    ErrorCode::InvalidInput,
                    format!("nothing added; fix these lines:\n  {}", rejected.join("\n  ")),
                )
                .into());
            }
            let batch: Vec<NewItem> = lines.into_iter().filter_map(|l| l.parsed.ok()).collect();
            if batch.is_empty() {
                return Err(ValidationError::EmptyField { field: "items" }.into());
            }
            let added = orch.mutate(|l| l.add_items(&batch))?;
            render(out, &added, |added, w| writeln!(w, "Added {} items", added.len()))?;
            ctx.finish_mutation(&orch).await;
        }
    }
    Ok(())
}
