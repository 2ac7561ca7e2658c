//! Domain Mutation API.
//!
//! Every operation validates first and touches nothing on failure. On
//! success it stamps `updatedAt` on the entity it changed (and on the owning
//! customer for ledger entries), bumps the ledger generation and sets the
//! dirty flag. Nothing here talks to the network; scheduling the push is the
//! orchestrator's job.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::ledger::Ledger;
use crate::merge::{MergeStats, merge_collection};
use crate::model::stamp::{parse_iso, to_iso};
use crate::model::summary::round_cents;
use crate::model::{Customer, Item, Transaction, TransactionItem, TransactionType};

/// Largest accepted gap between an entered amount and the line-item total.
pub const AMOUNT_TOLERANCE: f64 = 0.005;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomerPatch {
    pub name: Option<String>,
    pub phone: Option<String>,
}

/// Input for a new catalog item.
#[derive(Debug, Clone, PartialEq)]
pub struct NewItem {
    pub name: String,
    pub price: f64,
    pub unit: Option<String>,
}

/// Fields to change on an item. `unit: Some("")` clears the unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemPatch {
    pub name: Option<String>,
    pub price: Option<f64>,
    pub unit: Option<String>,
}

/// Input for a new ledger entry.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionDraft {
    pub kind: TransactionType,
    /// Required without line items; derived (and cross-checked) with them.
    pub amount: Option<f64>,
    pub description: String,
    /// ISO-8601 date; defaults to now.
    pub date: Option<String>,
    pub items: Vec<TransactionItem>,
}

impl TransactionDraft {
    #[must_use]
    pub fn new(kind: TransactionType, amount: f64) -> Self {
        Self {
            kind,
            amount: Some(amount),
            description: String::new(),
            date: None,
            items: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionPatch {
    pub kind: Option<TransactionType>,
    pub amount: Option<f64>,
    pub description: Option<String>,
    pub date: Option<String>,
    /// Replaces the line items. `Some(vec![])` removes them.
    pub items: Option<Vec<TransactionItem>>,
}

/// Why one line of bulk item input was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BulkLineError {
    #[error("item name is missing")]
    MissingName,
    #[error("price is missing")]
    MissingPrice,
    #[error("invalid price '{0}': must be a non-negative number")]
    InvalidPrice(String),
}

/// One non-blank line of bulk item input.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkLine {
    /// 1-based line number in the input.
    pub line: usize,
    pub text: String,
    pub parsed: Result<NewItem, BulkLineError>,
}

/// Parse `name, price[, unit]` lines. Blank lines are skipped.
#[must_use]
pub fn parse_bulk_items(text: &str) -> Vec<BulkLine> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| BulkLine {
            line: index + 1,
            text: line.to_string(),
            parsed: parse_bulk_line(line),
        })
        .collect()
}

fn parse_bulk_line(line: &str) -> Result<NewItem, BulkLineError> {
    let mut parts = line.split(',').map(str::trim);
    let name = parts.next().unwrap_or_default();
    if name.is_empty() {
        return Err(BulkLineError::MissingName);
    }
    let Some(raw_price) = parts.next() else {
        return Err(BulkLineError::MissingPrice);
    };
    let price = raw_price
        .parse::<f64>()
        .ok()
        .filter(|p| p.is_finite() && *p >= 0.0)
        .ok_or_else(|| BulkLineError::InvalidPrice(raw_price.to_string()))?;
    Ok(NewItem {
        name: name.to_string(),
        price,
        unit: normalize_unit(parts.next()),
    })
}

fn required(field: &'static str, value: &str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(ValidationError::EmptyField { field })
    } else {
        Ok(trimmed.to_string())
    }
}

fn money(field: &'static str, value: f64) -> Result<f64, ValidationError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(ValidationError::InvalidAmount { field, value })
    }
}

fn normalize_unit(unit: Option<&str>) -> Option<String> {
    unit.map(str::trim)
        .filter(|u| !u.is_empty())
        .map(str::to_string)
}

fn normalize_date(raw: Option<&str>, now: DateTime<Utc>) -> Result<String, ValidationError> {
    match raw.map(str::trim).filter(|d| !d.is_empty()) {
        None => Ok(to_iso(&now)),
        Some(raw) => parse_iso(raw)
            .map(|ts| to_iso(&ts))
            .ok_or_else(|| ValidationError::InvalidDate(raw.to_string())),
    }
}

/// Validate line items and settle the transaction amount.
///
/// With items, the amount is their total and an explicit amount must agree
/// with it. Without items, the explicit amount is required.
fn settle_amount(
    explicit: Option<f64>,
    items: &mut [TransactionItem],
) -> Result<f64, ValidationError> {
    if items.is_empty() {
        let amount = explicit.ok_or(ValidationError::MissingAmount)?;
        return money("amount", amount);
    }
    for item in items.iter_mut() {
        if item.quantity == 0 {
            return Err(ValidationError::InvalidQuantity {
                item: item.name.clone(),
            });
        }
        money("price", item.price)?;
        item.unit = normalize_unit(item.unit.as_deref());
    }
    let expected = round_cents(items.iter().map(TransactionItem::line_total).sum());
    if let Some(given) = explicit {
        money("amount", given)?;
        if (given - expected).abs() > AMOUNT_TOLERANCE {
            return Err(ValidationError::AmountMismatch { given, expected });
        }
    }
    Ok(expected)
}

impl Ledger {
    fn customer_index(&self, id: &str) -> Result<usize, ValidationError> {
        self.customers
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| ValidationError::CustomerNotFound(id.to_string()))
    }

    fn item_index(&self, id: &str) -> Result<usize, ValidationError> {
        self.items
            .iter()
            .position(|i| i.id == id)
            .ok_or_else(|| ValidationError::ItemNotFound(id.to_string()))
    }

    /// # Errors
    ///
    /// [`ValidationError::EmptyField`] when name or phone is blank.
    pub fn add_customer(&mut self, name: &str, phone: &str) -> Result<Customer, ValidationError> {
        let customer = Customer {
            id: Uuid::new_v4().to_string(),
            name: required("name", name)?,
            phone: required("phone", phone)?,
            transactions: Vec::new(),
            updated_at: Some(self.now()),
        };
        self.customers.push(customer.clone());
        self.mark_dirty();
        Ok(customer)
    }

    /// # Errors
    ///
    /// Unknown id, or a provided field is blank.
    pub fn edit_customer(
        &mut self,
        id: &str,
        patch: &CustomerPatch,
    ) -> Result<Customer, ValidationError> {
        let index = self.customer_index(id)?;
        let name = patch.name.as_deref().map(|n| required("name", n)).transpose()?;
        let phone = patch.phone.as_deref().map(|p| required("phone", p)).transpose()?;
        let now = self.now();

        let customer = &mut self.customers[index];
        if let Some(name) = name {
            customer.name = name;
        }
        if let Some(phone) = phone {
            customer.phone = phone;
        }
        customer.updated_at = Some(now);
        let updated = customer.clone();
        self.mark_dirty();
        Ok(updated)
    }

    /// Remove a customer and tombstone it together with its whole ledger.
    ///
    /// # Errors
    ///
    /// [`ValidationError::CustomerNotFound`] for an unknown id.
    pub fn delete_customer(&mut self, id: &str) -> Result<Customer, ValidationError> {
        let index = self.customer_index(id)?;
        let removed = self.customers.remove(index);
        self.tombstones.insert(removed.id.clone());
        for tx in &removed.transactions {
            self.tombstones.insert(tx.id.clone());
        }
        self.mark_dirty();
        Ok(removed)
    }

    /// # Errors
    ///
    /// Blank name or a negative / non-finite price.
    pub fn add_item(&mut self, new: &NewItem) -> Result<Item, ValidationError> {
        let mut added = self.add_items(std::slice::from_ref(new))?;
        added.pop().ok_or(ValidationError::EmptyField { field: "items" })
    }

    /// Add several items at once. Every entry is validated before any is
    /// added.
    ///
    /// # Errors
    ///
    /// The first invalid entry's error; nothing is added.
    pub fn add_items(&mut self, batch: &[NewItem]) -> Result<Vec<Item>, ValidationError> {
        let now = self.now();
        let items = batch
            .iter()
            .map(|new| {
                Ok(Item {
                    id: Uuid::new_v4().to_string(),
                    name: required("name", &new.name)?,
                    price: money("price", new.price)?,
                    unit: normalize_unit(new.unit.as_deref()),
                    updated_at: Some(now),
                })
            })
            .collect::<Result<Vec<_>, ValidationError>>()?;
        if items.is_empty() {
            return Ok(items);
        }
        self.items.extend(items.iter().cloned());
        self.mark_dirty();
        Ok(items)
    }

    /// # Errors
    ///
    /// Unknown id, blank name, or invalid price.
    pub fn edit_item(&mut self, id: &str, patch: &ItemPatch) -> Result<Item, ValidationError> {
        let index = self.item_index(id)?;
        let name = patch.name.as_deref().map(|n| required("name", n)).transpose()?;
        let price = patch.price.map(|p| money("price", p)).transpose()?;
        let now = self.now();

        let item = &mut self.items[index];
        if let Some(name) = name {
            item.name = name;
        }
        if let Some(price) = price {
            item.price = price;
        }
        if let Some(unit) = &patch.unit {
            item.unit = normalize_unit(Some(unit));
        }
        item.updated_at = Some(now);
        let updated = item.clone();
        self.mark_dirty();
        Ok(updated)
    }

    /// # Errors
    ///
    /// [`ValidationError::ItemNotFound`] for an unknown id.
    pub fn delete_item(&mut self, id: &str) -> Result<Item, ValidationError> {
        let index = self.item_index(id)?;
        let removed = self.items.remove(index);
        self.tombstones.insert(removed.id.clone());
        self.mark_dirty();
        Ok(removed)
    }

    /// Record a new entry at the top of a customer's ledger.
    ///
    /// # Errors
    ///
    /// Unknown customer, bad date, or amount / line-item rule violations.
    pub fn add_transaction(
        &mut self,
        customer_id: &str,
        draft: TransactionDraft,
    ) -> Result<Transaction, ValidationError> {
        let index = self.customer_index(customer_id)?;
        let now = self.now();
        let mut items = draft.items;
        let amount = settle_amount(draft.amount, &mut items)?;
        let tx = Transaction {
            id: Uuid::new_v4().to_string(),
            amount,
            kind: draft.kind,
            description: draft.description.trim().to_string(),
            date: normalize_date(draft.date.as_deref(), now)?,
            items,
            updated_at: Some(now),
        };

        let customer = &mut self.customers[index];
        customer.transactions.insert(0, tx.clone());
        customer.updated_at = Some(now);
        self.mark_dirty();
        Ok(tx)
    }

    /// # Errors
    ///
    /// Unknown customer or transaction, or the edited record breaks the
    /// amount / line-item rules.
    pub fn edit_transaction(
        &mut self,
        customer_id: &str,
        tx_id: &str,
        patch: TransactionPatch,
    ) -> Result<Transaction, ValidationError> {
        let index = self.customer_index(customer_id)?;
        let now = self.now();
        let current = self.customers[index]
            .transaction(tx_id)
            .ok_or_else(|| ValidationError::TransactionNotFound(tx_id.to_string()))?;

        let mut items = patch.items.unwrap_or_else(|| current.items.clone());
        // Without an explicit amount, an itemless entry keeps its old amount
        // and an itemized one is re-derived from its items.
        let explicit = patch
            .amount
            .or_else(|| items.is_empty().then_some(current.amount));
        let amount = settle_amount(explicit, &mut items)?;
        let date = match patch.date.as_deref() {
            Some(raw) => normalize_date(Some(raw), now)?,
            None => current.date.clone(),
        };
        let edited = Transaction {
            id: current.id.clone(),
            amount,
            kind: patch.kind.unwrap_or(current.kind),
            description: patch
                .description
                .map_or_else(|| current.description.clone(), |d| d.trim().to_string()),
            date,
            items,
            updated_at: Some(now),
        };

        let customer = &mut self.customers[index];
        if let Some(slot) = customer.transactions.iter_mut().find(|tx| tx.id == tx_id) {
            *slot = edited.clone();
        }
        customer.updated_at = Some(now);
        self.mark_dirty();
        Ok(edited)
    }

    /// # Errors
    ///
    /// Unknown customer or transaction.
    pub fn delete_transaction(
        &mut self,
        customer_id: &str,
        tx_id: &str,
    ) -> Result<Transaction, ValidationError> {
        let index = self.customer_index(customer_id)?;
        let now = self.now();
        let customer = &mut self.customers[index];
        let position = customer
            .transactions
            .iter()
            .position(|tx| tx.id == tx_id)
            .ok_or_else(|| ValidationError::TransactionNotFound(tx_id.to_string()))?;
        let removed = customer.transactions.remove(position);
        customer.updated_at = Some(now);
        self.tombstones.insert(removed.id.clone());
        self.mark_dirty();
        Ok(removed)
    }

    /// Merge imported collections into the current state.
    ///
    /// The import plays the local side, so it wins timestamp ties against
    /// what is already here. Tombstoned IDs stay deleted.
    pub fn apply_import(&mut self, customers: &[Customer], items: &[Item]) -> MergeStats {
        let merged_customers = merge_collection(customers, &self.customers, &self.tombstones);
        let merged_items = merge_collection(items, &self.items, &self.tombstones);
        let mut stats = merged_customers.stats;
        stats.absorb(merged_items.stats);
        self.customers = merged_customers.records;
        self.items = merged_items.records;
        self.mark_dirty();
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::AccountKey;
    use crate::clock::{Clock, ManualClock};
    use crate::model::summary::balance;
    use std::sync::Arc;

    fn ledger() -> (Ledger, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            parse_iso("2024-06-01T09:00:00Z").unwrap(),
        ));
        let dyn_clock: Arc<dyn Clock> = clock.clone();
        (
            Ledger::new(AccountKey::new("shop").unwrap(), dyn_clock),
            clock,
        )
    }

    fn line(name: &str, price: f64, quantity: u32) -> TransactionItem {
        TransactionItem {
            item_id: format!("item-{name}"),
            name: name.to_string(),
            price,
            quantity,
            unit: None,
        }
    }

    // === Customers ===

    #[test]
    fn add_customer_trims_stamps_and_marks_dirty() {
        let (mut ledger, _) = ledger();
        let c = ledger.add_customer("  Asha ", " 555 ").unwrap();
        assert_eq!(c.name, "Asha");
        assert_eq!(c.phone, "555");
        assert!(c.updated_at.is_some());
        assert!(ledger.is_dirty());
        assert_eq!(ledger.generation(), 1);
    }

    #[test]
    fn add_customer_rejects_blank_fields_without_mutating() {
        let (mut ledger, _) = ledger();
        assert_eq!(
            ledger.add_customer("Asha", "  "),
            Err(ValidationError::EmptyField { field: "phone" })
        );
        assert!(ledger.customers().is_empty());
        assert!(!ledger.is_dirty());
    }

    #[test]
    fn edit_customer_bumps_updated_at() {
        let (mut ledger, clock) = ledger();
        let c = ledger.add_customer("Asha", "1").unwrap();
        clock.advance(chrono::Duration::seconds(5));
        let patch = CustomerPatch {
            phone: Some("2".into()),
            ..CustomerPatch::default()
        };
        let edited = ledger.edit_customer(&c.id, &patch).unwrap();
        assert_eq!(edited.phone, "2");
        assert_eq!(edited.name, "Asha");
        assert!(edited.updated_at > c.updated_at);
    }

    #[test]
    fn edit_unknown_customer_fails() {
        let (mut ledger, _) = ledger();
        assert!(matches!(
            ledger.edit_customer("nope", &CustomerPatch::default()),
            Err(ValidationError::CustomerNotFound(_))
        ));
    }

    #[test]
    fn delete_customer_tombstones_customer_and_ledger() {
        let (mut ledger, _) = ledger();
        let c = ledger.add_customer("Asha", "1").unwrap();
        let tx = ledger
            .add_transaction(&c.id, TransactionDraft::new(TransactionType::Gave, 10.0))
            .unwrap();
        ledger.delete_customer(&c.id).unwrap();
        assert!(ledger.customers().is_empty());
        assert!(ledger.tombstones().contains(&c.id));
        assert!(ledger.tombstones().contains(&tx.id));
    }

    // === Items ===

    #[test]
    fn add_items_is_all_or_nothing() {
        let (mut ledger, _) = ledger();
        let batch = vec![
            NewItem {
                name: "Rice".into(),
                price: 2.0,
                unit: Some("kg".into()),
            },
            NewItem {
                name: "Oil".into(),
                price: -1.0,
                unit: None,
            },
        ];
        assert!(matches!(
            ledger.add_items(&batch),
            Err(ValidationError::InvalidAmount { field: "price", .. })
        ));
        assert!(ledger.items().is_empty());
        assert_eq!(ledger.generation(), 0);
    }

    #[test]
    fn add_item_normalizes_empty_unit() {
        let (mut ledger, _) = ledger();
        let item = ledger
            .add_item(&NewItem {
                name: "Milk".into(),
                price: 1.5,
                unit: Some("  ".into()),
            })
            .unwrap();
        assert_eq!(item.unit, None);
    }

    #[test]
    fn edit_and_delete_item() {
        let (mut ledger, _) = ledger();
        let item = ledger
            .add_item(&NewItem {
                name: "Milk".into(),
                price: 1.5,
                unit: Some("l".into()),
            })
            .unwrap();
        let patch = ItemPatch {
            price: Some(1.75),
            unit: Some(String::new()),
            ..ItemPatch::default()
        };
        let edited = ledger.edit_item(&item.id, &patch).unwrap();
        assert!((edited.price - 1.75).abs() < f64::EPSILON);
        assert_eq!(edited.unit, None);

        ledger.delete_item(&item.id).unwrap();
        assert!(ledger.items().is_empty());
        assert!(ledger.tombstones().contains(&item.id));
    }

    #[test]
    fn bulk_parse_reports_each_line() {
        let lines = parse_bulk_items("Milk, 1.50, litre\n\n, 2\nBread\nEggs, -3\nTea, 4");
        let lines: Vec<(usize, Result<NewItem, BulkLineError>)> =
            lines.into_iter().map(|l| (l.line, l.parsed)).collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(
            lines[0],
            (
                1,
                Ok(NewItem {
                    name: "Milk".into(),
                    price: 1.5,
                    unit: Some("litre".into())
                })
            )
        );
        assert_eq!(lines[1], (3, Err(BulkLineError::MissingName)));
        assert_eq!(lines[2], (4, Err(BulkLineError::MissingPrice)));
        assert_eq!(lines[3], (5, Err(BulkLineError::InvalidPrice("-3".into()))));
        assert!(matches!(&lines[4], (6, Ok(item)) if item.unit.is_none()));
    }

    // === Transactions ===

    #[test]
    fn add_transaction_places_entry_first_and_touches_customer() {
        let (mut ledger, clock) = ledger();
        let c = ledger.add_customer("Asha", "1").unwrap();
        ledger
            .add_transaction(&c.id, TransactionDraft::new(TransactionType::Gave, 10.0))
            .unwrap();
        clock.advance(chrono::Duration::seconds(1));
        let second = ledger
            .add_transaction(&c.id, TransactionDraft::new(TransactionType::Got, 4.0))
            .unwrap();
        let customer = ledger.customer(&c.id).unwrap();
        assert_eq!(customer.transactions[0].id, second.id);
        assert_eq!(customer.updated_at, second.updated_at);
        assert!((balance(customer) - -6.0).abs() < 1e-9);
    }

    #[test]
    fn itemized_transaction_derives_amount() {
        let (mut ledger, _) = ledger();
        let c = ledger.add_customer("Asha", "1").unwrap();
        let draft = TransactionDraft {
            kind: TransactionType::Gave,
            amount: None,
            description: "groceries".into(),
            date: Some("2024-05-02".into()),
            items: vec![line("rice", 2.5, 2), line("tea", 0.1, 3)],
        };
        let tx = ledger.add_transaction(&c.id, draft).unwrap();
        assert!((tx.amount - 5.3).abs() < 1e-9);
        assert_eq!(tx.date, "2024-05-02T00:00:00.000Z");
    }

    #[test]
    fn itemized_transaction_rejects_mismatched_amount() {
        let (mut ledger, _) = ledger();
        let c = ledger.add_customer("Asha", "1").unwrap();
        let draft = TransactionDraft {
            amount: Some(6.0),
            items: vec![line("rice", 2.5, 2)],
            ..TransactionDraft::new(TransactionType::Gave, 0.0)
        };
        assert!(matches!(
            ledger.add_transaction(&c.id, draft),
            Err(ValidationError::AmountMismatch { .. })
        ));
        assert!(ledger.customer(&c.id).unwrap().transactions.is_empty());
    }

    #[test]
    fn zero_quantity_is_rejected() {
        let (mut ledger, _) = ledger();
        let c = ledger.add_customer("Asha", "1").unwrap();
        let draft = TransactionDraft {
            amount: None,
            items: vec![line("rice", 2.5, 0)],
            ..TransactionDraft::new(TransactionType::Gave, 0.0)
        };
        assert_eq!(
            ledger.add_transaction(&c.id, draft),
            Err(ValidationError::InvalidQuantity {
                item: "rice".into()
            })
        );
    }

    #[test]
    fn plain_transaction_needs_valid_amount() {
        let (mut ledger, _) = ledger();
        let c = ledger.add_customer("Asha", "1").unwrap();
        let mut draft = TransactionDraft::new(TransactionType::Got, f64::NAN);
        assert!(matches!(
            ledger.add_transaction(&c.id, draft.clone()),
            Err(ValidationError::InvalidAmount { .. })
        ));
        draft.amount = None;
        assert_eq!(
            ledger.add_transaction(&c.id, draft.clone()),
            Err(ValidationError::MissingAmount)
        );
        draft.amount = Some(0.0);
        assert!(ledger.add_transaction(&c.id, draft).is_ok());
    }

    #[test]
    fn bad_date_is_rejected() {
        let (mut ledger, _) = ledger();
        let c = ledger.add_customer("Asha", "1").unwrap();
        let draft = TransactionDraft {
            date: Some("next tuesday".into()),
            ..TransactionDraft::new(TransactionType::Got, 1.0)
        };
        assert!(matches!(
            ledger.add_transaction(&c.id, draft),
            Err(ValidationError::InvalidDate(_))
        ));
    }

    #[test]
    fn edit_transaction_keeps_unpatched_fields() {
        let (mut ledger, clock) = ledger();
        let c = ledger.add_customer("Asha", "1").unwrap();
        let tx = ledger
            .add_transaction(&c.id, TransactionDraft::new(TransactionType::Gave, 10.0))
            .unwrap();
        clock.advance(chrono::Duration::minutes(1));
        let patch = TransactionPatch {
            description: Some("fixed".into()),
            ..TransactionPatch::default()
        };
        let edited = ledger.edit_transaction(&c.id, &tx.id, patch).unwrap();
        assert!((edited.amount - 10.0).abs() < f64::EPSILON);
        assert_eq!(edited.description, "fixed");
        assert_eq!(edited.date, tx.date);
        assert!(edited.updated_at > tx.updated_at);
        assert_eq!(
            ledger.customer(&c.id).unwrap().updated_at,
            edited.updated_at
        );
    }

    #[test]
    fn edit_transaction_rederives_amount_from_new_items() {
        let (mut ledger, _) = ledger();
        let c = ledger.add_customer("Asha", "1").unwrap();
        let tx = ledger
            .add_transaction(&c.id, TransactionDraft::new(TransactionType::Gave, 10.0))
            .unwrap();
        let patch = TransactionPatch {
            items: Some(vec![line("rice", 3.0, 2)]),
            ..TransactionPatch::default()
        };
        let edited = ledger.edit_transaction(&c.id, &tx.id, patch).unwrap();
        assert!((edited.amount - 6.0).abs() < 1e-9);
    }

    #[test]
    fn delete_transaction_tombstones_it() {
        let (mut ledger, _) = ledger();
        let c = ledger.add_customer("Asha", "1").unwrap();
        let tx = ledger
            .add_transaction(&c.id, TransactionDraft::new(TransactionType::Gave, 10.0))
            .unwrap();
        ledger.delete_transaction(&c.id, &tx.id).unwrap();
        assert!(ledger.customer(&c.id).unwrap().transactions.is_empty());
        assert!(ledger.tombstones().contains(&tx.id));
        assert!(matches!(
            ledger.delete_transaction(&c.id, &tx.id),
            Err(ValidationError::TransactionNotFound(_))
        ));
    }

    // === Import ===

    #[test]
    fn import_merges_instead_of_overwriting() {
        let (mut ledger, _) = ledger();
        let kept = ledger
            .add_item(&NewItem {
                name: "Local only".into(),
                price: 1.0,
                unit: None,
            })
            .unwrap();
        let gone = ledger.add_customer("Deleted", "0").unwrap();
        ledger.delete_customer(&gone.id).unwrap();

        let imported = vec![
            Customer {
                id: "imported".into(),
                name: "Bilal".into(),
                phone: "9".into(),
                transactions: vec![],
                updated_at: None,
            },
            gone.clone(),
        ];
        ledger.apply_import(&imported, &[]);

        let ids: Vec<&str> = ledger.customers().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["imported"]);
        assert_eq!(ledger.items().len(), 1);
        assert_eq!(ledger.items()[0].id, kept.id);
        assert!(ledger.is_dirty());
    }
}
