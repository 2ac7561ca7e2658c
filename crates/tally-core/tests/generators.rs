#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;
use std::collections::BTreeMap;
use tally_core::TombstoneSet;
use tally_core::model::{Customer, Item, Transaction, TransactionType};

/// Stamps drawn from a handful of values so ties and missing stamps are
/// common.
pub fn arb_stamp() -> impl Strategy<Value = Option<DateTime<Utc>>> {
    prop_oneof![
        1 => Just(None::<DateTime<Utc>>),
        4 => (0i64..6).prop_map(|day| Utc.timestamp_opt(1_700_000_000 + day * 86_400, 0).single()),
    ]
}

/// IDs from a small pool so local and remote overlap often.
pub fn arb_id(prefix: &'static str) -> impl Strategy<Value = String> {
    (0u8..6).prop_map(move |n| format!("{prefix}{n}"))
}

pub fn arb_item() -> impl Strategy<Value = Item> {
    (arb_id("i"), "[a-z]{1,6}", 0u32..10_000, arb_stamp()).prop_map(|(id, name, cents, at)| Item {
        id,
        name,
        price: f64::from(cents) / 100.0,
        unit: None,
        updated_at: at,
    })
}

pub fn arb_transaction() -> impl Strategy<Value = Transaction> {
    (arb_id("t"), 0u32..100_000, any::<bool>(), arb_stamp()).prop_map(|(id, cents, gave, at)| {
        Transaction {
            id,
            amount: f64::from(cents) / 100.0,
            kind: if gave {
                TransactionType::Gave
            } else {
                TransactionType::Got
            },
            description: String::new(),
            date: "2024-01-01T00:00:00.000Z".to_string(),
            items: Vec::new(),
            updated_at: at,
        }
    })
}

pub fn arb_customer() -> impl Strategy<Value = Customer> {
    (
        arb_id("c"),
        "[0-9]{3}",
        prop::collection::vec(arb_transaction(), 0..6),
        arb_stamp(),
    )
        .prop_map(|(id, phone, txs, at)| Customer {
            id,
            name: "n".to_string(),
            phone,
            transactions: unique_by_id(txs, |tx| tx.id.clone()),
            updated_at: at,
        })
}

/// A snapshot never holds the same ID twice.
pub fn unique_by_id<T>(records: Vec<T>, id: impl Fn(&T) -> String) -> Vec<T> {
    let mut seen = BTreeMap::new();
    for record in records {
        seen.entry(id(&record)).or_insert(record);
    }
    seen.into_values().collect()
}

pub fn arb_items() -> impl Strategy<Value = Vec<Item>> {
    prop::collection::vec(arb_item(), 0..8).prop_map(|v| unique_by_id(v, |i| i.id.clone()))
}

pub fn arb_customers() -> impl Strategy<Value = Vec<Customer>> {
    prop::collection::vec(arb_customer(), 0..6).prop_map(|v| unique_by_id(v, |c| c.id.clone()))
}

pub fn arb_tombstones() -> impl Strategy<Value = TombstoneSet> {
    prop::collection::vec(
        prop_oneof![arb_id("c"), arb_id("i"), arb_id("t")],
        0..5,
    )
    .prop_map(|ids| ids.into_iter().collect())
}
