pub mod account;
pub mod backup;
pub mod completions;
pub mod context;
pub mod customer;
pub mod item;
pub mod sessions;
pub mod summary;
pub mod sync;
pub mod tx;
