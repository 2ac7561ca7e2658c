//! Full-state JSON backup.
//!
//! Export shape: `{version, user, exportedAt, customers, items}`. Import only
//! requires `customers` to be an array; the result goes through the merge
//! engine via [`Ledger::apply_import`], never a raw overwrite.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ValidationError;
use crate::ledger::Ledger;
use crate::model::stamp::to_iso;
use crate::model::{Customer, Item};
use crate::snapshot::{Category, decode_elements};

/// Format version written into exports.
pub const BACKUP_VERSION: &str = "4.5";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Backup {
    pub version: String,
    pub user: String,
    pub exported_at: String,
    pub customers: Vec<Customer>,
    pub items: Vec<Item>,
}

/// Snapshot the ledger for export.
#[must_use]
pub fn export(ledger: &Ledger) -> Backup {
    Backup {
        version: BACKUP_VERSION.to_string(),
        user: ledger.account().to_string(),
        exported_at: to_iso(&ledger.now()),
        customers: ledger.customers().to_vec(),
        items: ledger.items().to_vec(),
    }
}

/// Default file name, e.g. `backup_shop_2024-06-01.json`.
#[must_use]
pub fn default_file_name(backup: &Backup) -> String {
    let day = backup.exported_at.get(..10).unwrap_or(&backup.exported_at);
    format!("backup_{}_{day}.json", backup.user.replace(['/', '\\'], "_"))
}

/// Collections read from a backup file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportedBackup {
    pub version: Option<String>,
    pub customers: Vec<Customer>,
    pub items: Vec<Item>,
}

/// Validate and decode a backup file.
///
/// # Errors
///
/// [`ValidationError::InvalidBackup`] when the text is not JSON, not an
/// object, or has no `customers` array.
pub fn parse_backup(text: &str) -> Result<ImportedBackup, ValidationError> {
    let value: Value = serde_json::from_str(text)
        .map_err(|err| ValidationError::InvalidBackup(format!("not valid JSON: {err}")))?;
    let Value::Object(mut fields) = value else {
        return Err(ValidationError::InvalidBackup(
            "expected a JSON object".to_string(),
        ));
    };
    let Some(Value::Array(customers)) = fields.remove("customers") else {
        return Err(ValidationError::InvalidBackup(
            "missing customers data".to_string(),
        ));
    };
    let items = match fields.remove("items") {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    };
    let version = match fields.remove("version") {
        Some(Value::String(v)) => Some(v),
        _ => None,
    };
    Ok(ImportedBackup {
        version,
        customers: decode_elements(Category::Customers, customers),
        items: decode_elements(Category::Items, items),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::AccountKey;
    use crate::clock::{Clock, ManualClock};
    use crate::model::stamp::parse_iso;
    use std::sync::Arc;

    #[test]
    fn export_carries_version_user_and_collections() {
        let clock: Arc<dyn Clock> =
            Arc::new(ManualClock::new(parse_iso("2024-06-01T12:00:00Z").unwrap()));
        let mut ledger = Ledger::new(AccountKey::new("shop").unwrap(), clock);
        ledger.add_customer("Asha", "1").unwrap();
        let backup = export(&ledger);
        let json = serde_json::to_value(&backup).unwrap();
        assert_eq!(json["version"], "4.5");
        assert_eq!(json["user"], "shop");
        assert_eq!(json["exportedAt"], "2024-06-01T12:00:00.000Z");
        assert_eq!(json["customers"].as_array().unwrap().len(), 1);
        assert_eq!(default_file_name(&backup), "backup_shop_2024-06-01.json");
    }

    #[test]
    fn items_default_to_empty() {
        let parsed = parse_backup(r#"{"customers": [{"id": "c1", "name": "Asha"}]}"#).unwrap();
        assert_eq!(parsed.customers.len(), 1);
        assert!(parsed.items.is_empty());
        assert_eq!(parsed.version, None);
    }

    #[test]
    fn rejects_missing_or_non_array_customers() {
        for text in [
            r#"{"items": []}"#,
            r#"{"customers": {"c1": {}}}"#,
            "[]",
            "not json",
        ] {
            assert!(
                matches!(parse_backup(text), Err(ValidationError::InvalidBackup(_))),
                "accepted {text}"
            );
        }
    }

    #[test]
    fn exported_file_imports_back() {
        let clock: Arc<dyn Clock> =
            Arc::new(ManualClock::new(parse_iso("2024-06-01T12:00:00Z").unwrap()));
        let mut ledger = Ledger::new(AccountKey::new("shop").unwrap(), clock);
        ledger.add_customer("Asha", "1").unwrap();
        let text = serde_json::to_string_pretty(&export(&ledger)).unwrap();
        let parsed = parse_backup(&text).unwrap();
        assert_eq!(parsed.version.as_deref(), Some(BACKUP_VERSION));
        assert_eq!(parsed.customers, ledger.customers());
    }
}
