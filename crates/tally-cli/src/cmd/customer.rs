//! `tally customer ...`

use anyhow::{Result, anyhow};
use clap::{Args, Subcommand};
use serde::Serialize;
use std::io::Write;
use tally_core::error::ValidationError;
use tally_core::model::summary::{CustomerSort, CustomerTotals, balance, list_customers, totals};
use tally_core::model::{Customer, Transaction};
use tally_core::mutation::CustomerPatch;

use super::context::AppContext;
use crate::output::{OutputMode, money, pretty_kv, pretty_section, render};

#[derive(Subcommand, Debug)]
pub enum CustomerCommand {
    /// Add a customer.
    Add(AddArgs),
    /// Change a customer's name or phone.
    Edit(EditArgs),
    /// Delete a customer and their whole ledger.
    Delete(IdArgs),
    /// List customers with balances.
    List(ListArgs),
    /// Show one customer's ledger.
    Show(IdArgs),
}

#[derive(Args, Debug)]
pub struct AddArgs {
    pub name: String,
    #[arg(short, long)]
    pub phone: String,
}

#[derive(Args, Debug)]
pub struct EditArgs {
    pub id: String,
    #[arg(long)]
    pub name: Option<String>,
    #[arg(short, long)]
    pub phone: Option<String>,
}

#[derive(Args, Debug)]
pub struct IdArgs {
    pub id: String,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Case-insensitive match on name or phone.
    #[arg(short, long, default_value = "")]
    pub search: String,

    /// activity-desc, name-asc, name-desc, balance-asc or balance-desc.
    #[arg(long, default_value = "activity-desc", value_parser = parse_sort)]
    pub sort: CustomerSort,
}

fn parse_sort(raw: &str) -> Result<CustomerSort, String> {
    raw.parse()
}

#[derive(Debug, Serialize)]
struct CustomerRow<'a> {
    id: &'a str,
    name: &'a str,
    phone: &'a str,
    balance: f64,
    transactions: usize,
}

impl<'a> From<&'a Customer> for CustomerRow<'a> {
    fn from(c: &'a Customer) -> Self {
        Self {
            id: &c.id,
            name: &c.name,
            phone: &c.phone,
            balance: balance(c),
            transactions: c.transactions.len(),
        }
    }
}

#[derive(Debug, Serialize)]
struct CustomerDetail<'a> {
    #[serde(flatten)]
    customer: &'a Customer,
    balance: f64,
    #[serde(flatten)]
    totals: CustomerTotals,
}

/// Who owes whom, in words.
pub fn balance_note(balance: f64) -> String {
    if balance < 0.0 {
        format!("owes you {}", money(balance.abs()))
    } else if balance > 0.0 {
        format!("you owe {}", money(balance))
    } else {
        "settled".to_string()
    }
}

pub fn write_transaction(w: &mut dyn Write, tx: &Transaction, mode: OutputMode) -> std::io::Result<()> {
    if mode.is_pretty() {
        writeln!(
            w,
            "  {}  {:<4} {:>10}  {}  ({})",
            tx.day(),
            tx.kind,
            money(tx.amount),
            tx.description,
            tx.id
        )?;
        for line in &tx.items {
            writeln!(
                w,
                "      {} x{} @ {}{}",
                line.name,
                line.quantity,
                money(line.price),
                line.unit.as_deref().map(|u| format!("/{u}")).unwrap_or_default()
            )?;
        }
        Ok(())
    } else {
        writeln!(
            w,
            "{}\t{}\t{}\t{}\t{}",
            tx.id,
            tx.day(),
            tx.kind,
            money(tx.amount),
            tx.description
        )
    }
}

/// # Errors
///
/// Validation failures, unknown ids, or no active session.
pub async fn run_customer(command: &CustomerCommand, ctx: &AppContext) -> Result<()> {
    let orch = ctx.session()?;
    let out = ctx.output;
    match command {
        CustomerCommand::Add(args) => {
            let customer = orch.mutate(|l| l.add_customer(&args.name, &args.phone))?;
            render(out, &customer, |c, w| writeln!(w, "Added customer {} ({})", c.name, c.id))?;
            ctx.finish_mutation(&orch).await;
        }
        CustomerCommand::Edit(args) => {
            if args.name.is_none() && args.phone.is_none() {
                return Err(anyhow!(ValidationError::EmptyField {
                    field: "--name or --phone"
                }));
            }
            let patch = CustomerPatch {
                name: args.name.clone(),
                phone: args.phone.clone(),
            };
            let customer = orch.mutate(|l| l.edit_customer(&args.id, &patch))?;
            render(out, &customer, |c, w| writeln!(w, "Updated customer {} ({})", c.name, c.id))?;
            ctx.finish_mutation(&orch).await;
        }
        CustomerCommand::Delete(args) => {
            let removed = orch.mutate(|l| l.delete_customer(&args.id))?;
            render(
                out,
                &serde_json::json!({
                    "deleted": removed.id,
                    "transactions": removed.transactions.len(),
                }),
                |_, w| {
                    writeln!(
                        w,
                        "Deleted customer {} and {} transactions",
                        removed.name,
                        removed.transactions.len()
                    )
                },
            )?;
            ctx.finish_mutation(&orch).await;
        }
        CustomerCommand::List(args) => {
            orch.read(|ledger| {
                let rows: Vec<CustomerRow<'_>> =
                    list_customers(ledger.customers(), &args.search, args.sort)
                        .into_iter()
                        .map(CustomerRow::from)
                        .collect();
                render(out, &rows, |rows, w| {
                    if out.is_pretty() {
                        pretty_section(w, &format!("Customers ({})", rows.len()))?;
                        for r in rows {
                            writeln!(
                                w,
                                "{:<24} {:<14} {:>10}  {}",
                                r.name,
                                r.phone,
                                money(r.balance),
                                balance_note(r.balance)
                            )?;
                        }
                    } else {
                        for r in rows {
                            writeln!(
                                w,
                                "{}\t{}\t{}\t{}\t{}",
                                r.id,
                                r.name,
                                r.phone,
                                money(r.balance),
                                r.transactions
                            )?;
                        }
                    }
                    Ok(())
                })
            })?;
        }
        CustomerCommand::Show(args) => {
            orch.read(|ledger| {
                let customer = ledger
                    .customer(&args.id)
                    .ok_or_else(|| ValidationError::CustomerNotFound(args.id.clone()))?;
                let detail = CustomerDetail {
                    customer,
                    balance: balance(customer),
                    totals: totals(customer),
                };
                render(out, &detail, |d, w| {
                    pretty_section(w, &d.customer.name)?;
                    pretty_kv(w, "id", &d.customer.id)?;
                    pretty_kv(w, "phone", &d.customer.phone)?;
                    pretty_kv(w, "balance", format!("{} ({})", money(d.balance), balance_note(d.balance)))?;
                    pretty_kv(w, "total gave", money(d.totals.total_gave))?;
                    pretty_kv(w, "total got", money(d.totals.total_got))?;
                    writeln!(w)?;
                    for tx in &d.customer.transactions {
                        write_transaction(w, tx, out)?;
                    }
                    Ok(())
                })
            })?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balance_note_reads_from_the_shop_side() {
        assert_eq!(balance_note(-12.5), "owes you 12.50");
        assert_eq!(balance_note(3.0), "you owe 3.00");
        assert_eq!(balance_note(0.0), "settled");
    }
}
