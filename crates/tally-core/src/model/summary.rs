//! Derived ledger views: balances, dashboard totals and listings.
//!
//! Nothing here is stored. Balances are recomputed from the ledger every time
//! so a merged ledger can never disagree with its balance.

use serde::Serialize;
use std::cmp::Ordering;
use std::str::FromStr;

use super::customer::{Customer, Transaction, TransactionType};

/// Round to cents, nudging by epsilon so `1.005` rounds up.
#[must_use]
pub fn round_cents(value: f64) -> f64 {
    ((value + f64::EPSILON) * 100.0).round() / 100.0
}

/// Σ GOT − Σ GAVE, rounded to 2 decimals.
///
/// A negative balance means the customer owes you; a positive balance means
/// you owe the customer.
#[must_use]
pub fn balance(customer: &Customer) -> f64 {
    let raw = customer.transactions.iter().fold(0.0, |acc, tx| match tx.kind {
        TransactionType::Gave => acc - tx.amount,
        TransactionType::Got => acc + tx.amount,
    });
    round_cents(raw)
}

/// Per-customer totals in each direction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CustomerTotals {
    pub total_gave: f64,
    pub total_got: f64,
}

#[must_use]
pub fn totals(customer: &Customer) -> CustomerTotals {
    let (gave, got) = customer
        .transactions
        .iter()
        .fold((0.0, 0.0), |(gave, got), tx| match tx.kind {
            TransactionType::Gave => (gave + tx.amount, got),
            TransactionType::Got => (gave, got + tx.amount),
        });
    CustomerTotals {
        total_gave: round_cents(gave),
        total_got: round_cents(got),
    }
}

/// Totals across every customer, as shown on the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DashboardSummary {
    /// What customers owe you in total.
    pub to_get: f64,
    /// What you owe customers in total.
    pub to_give: f64,
    pub customers: usize,
}

#[must_use]
pub fn dashboard(customers: &[Customer]) -> DashboardSummary {
    let (to_get, to_give) = customers.iter().fold((0.0, 0.0), |(get, give), customer| {
        let b = balance(customer);
        if b < 0.0 {
            (get + b.abs(), give)
        } else {
            (get, give + b)
        }
    });
    DashboardSummary {
        to_get: round_cents(to_get),
        to_give: round_cents(to_give),
        customers: customers.len(),
    }
}

// ---------------------------------------------------------------------------
// Customer listing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CustomerSort {
    #[default]
    ActivityDesc,
    NameAsc,
    NameDesc,
    BalanceAsc,
    BalanceDesc,
}

impl FromStr for CustomerSort {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "activity-desc" => Ok(Self::ActivityDesc),
            "name-asc" => Ok(Self::NameAsc),
            "name-desc" => Ok(Self::NameDesc),
            "balance-asc" => Ok(Self::BalanceAsc),
            "balance-desc" => Ok(Self::BalanceDesc),
            other => Err(format!(
                "unknown sort '{other}' (expected activity-desc, name-asc, name-desc, balance-asc, balance-desc)"
            )),
        }
    }
}

/// Filter customers by name/phone and sort them for presentation.
#[must_use]
pub fn list_customers<'a>(
    customers: &'a [Customer],
    term: &str,
    sort: CustomerSort,
) -> Vec<&'a Customer> {
    let mut rows: Vec<&Customer> = customers.iter().filter(|c| c.matches(term)).collect();
    match sort {
        CustomerSort::ActivityDesc => {
            rows.sort_by_key(|c| std::cmp::Reverse(c.last_activity()));
        }
        CustomerSort::NameAsc => rows.sort_by_key(|c| c.name.to_lowercase()),
        CustomerSort::NameDesc => {
            rows.sort_by_key(|c| std::cmp::Reverse(c.name.to_lowercase()));
        }
        CustomerSort::BalanceAsc => rows.sort_by(|a, b| cmp_f64(balance(a), balance(b))),
        CustomerSort::BalanceDesc => rows.sort_by(|a, b| cmp_f64(balance(b), balance(a))),
    }
    rows
}

fn cmp_f64(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

// ---------------------------------------------------------------------------
// All-transactions listing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionSort {
    #[default]
    DateDesc,
    AmountDesc,
    AmountAsc,
}

impl FromStr for TransactionSort {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "date-desc" => Ok(Self::DateDesc),
            "amount-desc" => Ok(Self::AmountDesc),
            "amount-asc" => Ok(Self::AmountAsc),
            other => Err(format!(
                "unknown sort '{other}' (expected date-desc, amount-desc, amount-asc)"
            )),
        }
    }
}

/// Filters for the cross-customer transaction list.
#[derive(Debug, Clone, Default)]
pub struct TransactionQuery {
    pub search: Option<String>,
    /// Inclusive lower bound on the `YYYY-MM-DD` day.
    pub start_date: Option<String>,
    /// Inclusive upper bound on the `YYYY-MM-DD` day.
    pub end_date: Option<String>,
    pub kind: Option<TransactionType>,
    pub sort: TransactionSort,
}

/// A transaction together with the customer it belongs to.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRow<'a> {
    pub customer_id: &'a str,
    pub customer_name: &'a str,
    #[serde(flatten)]
    pub transaction: &'a Transaction,
}

impl TransactionQuery {
    fn accepts(&self, customer: &Customer, tx: &Transaction) -> bool {
        if let Some(term) = self.search.as_deref().map(str::to_lowercase)
            && !term.is_empty()
        {
            let hit = customer.name.to_lowercase().contains(&term)
                || tx.description.to_lowercase().contains(&term)
                || tx.items.iter().any(|i| i.name.to_lowercase().contains(&term));
            if !hit {
                return false;
            }
        }
        if let Some(start) = self.start_date.as_deref()
            && tx.day() < start
        {
            return false;
        }
        if let Some(end) = self.end_date.as_deref()
            && tx.day() > end
        {
            return false;
        }
        self.kind.is_none_or(|kind| tx.kind == kind)
    }
}

#[must_use]
pub fn list_transactions<'a>(
    customers: &'a [Customer],
    query: &TransactionQuery,
) -> Vec<TransactionRow<'a>> {
    let mut rows: Vec<TransactionRow<'a>> = customers
        .iter()
        .flat_map(|customer| {
            customer
                .transactions
                .iter()
                .filter(|tx| query.accepts(customer, tx))
                .map(move |tx| TransactionRow {
                    customer_id: &customer.id,
                    customer_name: &customer.name,
                    transaction: tx,
                })
        })
        .collect();

    match query.sort {
        TransactionSort::DateDesc => {
            rows.sort_by_key(|row| std::cmp::Reverse(row.transaction.date_ts()));
        }
        TransactionSort::AmountDesc => {
            rows.sort_by(|a, b| cmp_f64(b.transaction.amount, a.transaction.amount));
        }
        TransactionSort::AmountAsc => {
            rows.sort_by(|a, b| cmp_f64(a.transaction.amount, b.transaction.amount));
        }
    }
    rows
}
