//! Ledger data model: customers, their transactions, and the item catalog.

pub mod customer;
pub mod item;
pub mod number;
pub mod stamp;
pub mod summary;

pub use customer::{Customer, Transaction, TransactionItem, TransactionType};
pub use item::Item;
