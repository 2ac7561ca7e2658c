use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use super::number;
use super::stamp::parse_iso;

/// Direction of money on a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionType {
    /// You gave money or goods to the customer; they owe you.
    Gave,
    /// You received money from the customer.
    Got,
}

impl TransactionType {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Gave => "GAVE",
            Self::Got => "GOT",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown transaction type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown transaction type '{0}' (expected gave or got)")]
pub struct ParseTransactionTypeError(pub String);

impl FromStr for TransactionType {
    type Err = ParseTransactionTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gave" => Ok(Self::Gave),
            "got" => Ok(Self::Got),
            other => Err(ParseTransactionTypeError(other.to_string())),
        }
    }
}

/// Denormalized copy of an [`Item`](super::Item) taken when the transaction
/// was recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionItem {
    pub item_id: String,
    pub name: String,
    #[serde(default, deserialize_with = "number::amount")]
    pub price: f64,
    #[serde(default = "default_quantity", deserialize_with = "number::quantity")]
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

const fn default_quantity() -> u32 {
    1
}

impl TransactionItem {
    #[must_use]
    pub fn line_total(&self) -> f64 {
        self.price * f64::from(self.quantity)
    }
}

/// One entry in a customer's ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    #[serde(default, deserialize_with = "number::amount")]
    pub amount: f64,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    #[serde(default, deserialize_with = "number::text")]
    pub description: String,
    /// ISO-8601 date of the entry as entered by the user.
    #[serde(default, deserialize_with = "number::text")]
    pub date: String,
    #[serde(default)]
    pub items: Vec<TransactionItem>,
    #[serde(
        default,
        with = "crate::model::stamp::lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Transaction {
    /// Parsed `date`, if it is a valid ISO-8601 value.
    #[must_use]
    pub fn date_ts(&self) -> Option<DateTime<Utc>> {
        parse_iso(&self.date)
    }

    /// The `YYYY-MM-DD` prefix of `date`, used for date-range filters.
    #[must_use]
    pub fn day(&self) -> &str {
        self.date.get(..10).unwrap_or(&self.date)
    }

    /// Σ price × quantity over the line items.
    #[must_use]
    pub fn items_total(&self) -> f64 {
        self.items.iter().map(TransactionItem::line_total).sum()
    }
}

/// A customer and their ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: String,
    pub name: String,
    #[serde(default, deserialize_with = "number::text")]
    pub phone: String,
    #[serde(default)]
    pub transactions: Vec<Transaction>,
    #[serde(
        default,
        with = "crate::model::stamp::lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Customer {
    #[must_use]
    pub fn transaction(&self, id: &str) -> Option<&Transaction> {
        self.transactions.iter().find(|tx| tx.id == id)
    }

    /// Case-insensitive substring match on name or phone.
    #[must_use]
    pub fn matches(&self, term: &str) -> bool {
        let term = term.trim().to_lowercase();
        term.is_empty()
            || self.name.to_lowercase().contains(&term)
            || self.phone.to_lowercase().contains(&term)
    }

    /// Date of the most recent ledger entry.
    #[must_use]
    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.transactions.iter().filter_map(Transaction::date_ts).max()
    }
}
