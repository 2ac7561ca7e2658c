//! `tally tx ...`: ledger entries.

use anyhow::Result;
use clap::{Args, Subcommand};
use std::io::Write;
use tally_core::Ledger;
use tally_core::error::ValidationError;
use tally_core::model::summary::{TransactionQuery, TransactionSort, list_transactions};
use tally_core::model::{TransactionItem, TransactionType};
use tally_core::mutation::{TransactionDraft, TransactionPatch};

use super::context::AppContext;
use crate::output::{money, pretty_section, render};

#[derive(Subcommand, Debug)]
pub enum TxCommand {
    /// Record an entry on a customer's ledger.
    Add(AddArgs),
    /// Change an existing entry.
    Edit(EditArgs),
    /// Delete an entry.
    Delete(TxRef),
    /// List entries across all customers.
    List(ListArgs),
}

#[derive(Args, Debug)]
pub struct AddArgs {
    pub customer: String,
    /// `gave` (they owe you) or `got` (they paid you).
    pub kind: TransactionType,
    /// Required unless `--item` is given; then it must match the items total.
    pub amount: Option<f64>,
    #[arg(short, long, default_value = "")]
    pub description: String,
    /// ISO-8601 date or `YYYY-MM-DD`; defaults to now.
    #[arg(long)]
    pub date: Option<String>,
    /// Catalog item as `ITEM_ID[:QTY]`; repeatable.
    #[arg(short, long = "item", value_name = "ITEM_ID[:QTY]")]
    pub items: Vec<String>,
}

#[derive(Args, Debug)]
pub struct EditArgs {
    pub customer: String,
    pub id: String,
    #[arg(long)]
    pub kind: Option<TransactionType>,
    #[arg(long)]
    pub amount: Option<f64>,
    #[arg(short, long)]
    pub description: Option<String>,
    #[arg(long)]
    pub date: Option<String>,
    /// Replace the line items; repeatable.
    #[arg(short, long = "item", value_name = "ITEM_ID[:QTY]", conflicts_with = "clear_items")]
    pub items: Vec<String>,
    /// Remove all line items.
    #[arg(long)]
    pub clear_items: bool,
}

#[derive(Args, Debug)]
pub struct TxRef {
    pub customer: String,
    pub id: String,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Match on customer name, description or item names.
    #[arg(short, long)]
    pub search: Option<String>,
    /// First day to include (`YYYY-MM-DD`).
    #[arg(long)]
    pub from: Option<String>,
    /// Last day to include (`YYYY-MM-DD`).
    #[arg(long)]
    pub to: Option<String>,
    #[arg(long)]
    pub kind: Option<TransactionType>,
    /// date-desc, amount-desc or amount-asc.
    #[arg(long, default_value = "date-desc", value_parser = parse_sort)]
    pub sort: TransactionSort,
}

fn parse_sort(raw: &str) -> Result<TransactionSort, String> {
    raw.parse()
}

/// Resolve `ITEM_ID[:QTY]` arguments against the catalog, snapshotting name,
/// price and unit as they are now.
fn line_items(ledger: &Ledger, entries: &[String]) -> Result<Vec<TransactionItem>, ValidationError> {
    entries
        .iter()
        .map(|entry| {
            let (id, quantity) = match entry.split_once(':') {
                Some((id, qty)) => {
                    let quantity = qty.trim().parse::<u32>().map_err(|_| {
                        ValidationError::InvalidQuantity {
                            item: id.to_string(),
                        }
                    })?;
                    (id.trim(), quantity)
                }
                None => (entry.trim(), 1),
            };
            let item = ledger
                .item(id)
                .ok_or_else(|| ValidationError::ItemNotFound(id.to_string()))?;
            Ok(TransactionItem {
                item_id: item.id.clone(),
                name: item.name.clone(),
                price: item.price,
                quantity,
                unit: item.unit.clone(),
            })
        })
        .collect()
}

/// # Errors
///
/// Validation failures, unknown ids, or no active session.
pub async fn run_tx(command: &TxCommand, ctx: &AppContext) -> Result<()> {
    let orch = ctx.session()?;
    let out = ctx.output;
    match command {
        TxCommand::Add(args) => {
            let tx = orch.mutate(|l| {
                let draft = TransactionDraft {
                    kind: args.kind,
                    amount: args.amount,
                    description: args.description.clone(),
                    date: args.date.clone(),
                    items: line_items(l, &args.items)?,
                };
                l.add_transaction(&args.customer, draft)
            })?;
            render(out, &tx, |tx, w| {
                writeln!(w, "Recorded {} {} ({})", tx.kind, money(tx.amount), tx.id)
            })?;
            ctx.finish_mutation(&orch).await;
        }
        TxCommand::Edit(args) => {
            let tx = orch.mutate(|l| {
                let items = if args.clear_items {
                    Some(Vec::new())
                } else if args.items.is_empty() {
                    None
                } else {
                    Some(line_items(l, &args.items)?)
                };
                let patch = TransactionPatch {
                    kind: args.kind,
                    amount: args.amount,
                    description: args.description.clone(),
                    date: args.date.clone(),
                    items,
                };
                l.edit_transaction(&args.customer, &args.id, patch)
            })?;
            render(out, &tx, |tx, w| {
                writeln!(w, "Updated {} {} ({})", tx.kind, money(tx.amount), tx.id)
            })?;
            ctx.finish_mutation(&orch).await;
        }
        TxCommand::Delete(args) => {
            let removed = orch.mutate(|l| l.delete_transaction(&args.customer, &args.id))?;
            render(out, &serde_json::json!({ "deleted": removed.id }), |_, w| {
                writeln!(w, "Deleted {} {}", removed.kind, money(removed.amount))
            })?;
            ctx.finish_mutation(&orch).await;
        }
        TxCommand::List(args) => {
            let query = TransactionQuery {
                search: args.search.clone(),
                start_date: args.from.clone(),
                end_date: args.to.clone(),
                kind: args.kind,
                sort: args.sort,
            };
            orch.read(|ledger| {
                let rows = list_transactions(ledger.customers(), &query);
                render(out, &rows, |rows, w| {
                    if out.is_pretty() {
                        pretty_section(w, &format!("Transactions ({})", rows.len()))?;
                        for row in rows {
                            let tx = row.transaction;
                            writeln!(
                                w,
                                "{}  {:<20} {:<4} {:>10}  {}",
                                tx.day(),
                                row.customer_name,
                                tx.kind,
                                money(tx.amount),
                                tx.description
                            )?;
                        }
                    } else {
                        for row in rows {
                            let tx = row.transaction;
                            writeln!(
                                w,
                                "{}\t{}\t{}\t{}\t{}\t{}",
                                tx.id,
                                row.customer_id,
                                tx.day(),
                                tx.kind,
                                money(tx.amount),
                                tx.description
                            )?;
                        }
                    }
                    Ok(())
                })
            })?;
        }
    }
    Ok(())
}
