#![no_main]

use libfuzzer_sys::fuzz_target;
use tally_core::TombstoneSet;
use tally_core::merge::merge_collection;
use tally_core::model::{Customer, Item};
use tally_core::snapshot::{Category, decode};

// Arbitrary remote payloads must decode or be rejected, never panic, and
// whatever decodes must merge with itself unchanged.
fuzz_target!(|data: &[u8]| {
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(data) else {
        return;
    };
    if let Ok(decoded) = decode::<Customer>(Category::Customers, value.clone()) {
        let customers = decoded.records;
        let none = TombstoneSet::new();
        let merged = merge_collection(&customers, &customers, &none).records;
        assert_eq!(merged.len(), {
            let mut ids: Vec<&str> = customers.iter().map(|c| c.id.as_str()).collect();
            ids.sort_unstable();
            ids.dedup();
            ids.len()
        });
    }
    let _ = decode::<Item>(Category::Items, value.clone());
    let _ = decode::<String>(Category::DeletedIds, value);
});
