use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A catalog entry that can be sold on a transaction.
///
/// Items have their own lifecycle: editing an item never rewrites the
/// [`TransactionItem`](super::TransactionItem) snapshots already recorded on
/// transactions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: String,
    pub name: String,
    #[serde(default, deserialize_with = "super::number::amount")]
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(
        default,
        with = "crate::model::stamp::lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Item {
    /// Case-insensitive substring match on the name, as used by the items list.
    #[must_use]
    pub fn matches(&self, term: &str) -> bool {
        let term = term.trim().to_lowercase();
        term.is_empty() || self.name.to_lowercase().contains(&term)
    }
}

/// Filter the catalog by name and sort it alphabetically.
#[must_use]
pub fn list_items<'a>(items: &'a [Item], term: &str) -> Vec<&'a Item> {
    let mut rows: Vec<&Item> = items.iter().filter(|item| item.matches(term)).collect();
    rows.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, name: &str) -> Item {
        Item {
            id: id.to_string(),
            name: name.to_string(),
            price: 1.0,
            unit: None,
            updated_at: None,
        }
    }

    #[test]
    fn decodes_legacy_item_without_unit_or_stamp() {
        let parsed: Item =
            serde_json::from_str(r#"{"id":"i1","name":"Rice","price":2.5}"#).unwrap();
        assert_eq!(parsed.unit, None);
        assert_eq!(parsed.updated_at, None);
        assert!((parsed.price - 2.5).abs() < f64::EPSILON);
    }

    #[test]
    fn encodes_camel_case() {
        let mut it = item("i1", "Rice");
        it.updated_at = crate::model::stamp::parse_iso("2024-01-01T00:00:00Z");
        let json = serde_json::to_value(&it).unwrap();
        assert_eq!(json["updatedAt"], "2024-01-01T00:00:00.000Z");
        assert!(json.get("unit").is_none());
    }

    #[test]
    fn list_filters_and_sorts_by_name() {
        let items = vec![item("1", "sugar"), item("2", "Rice"), item("3", "Brown rice")];
        let names: Vec<&str> = list_items(&items, "rice")
            .into_iter()
            .map(|i| i.name.as_str())
            .collect();
        assert_eq!(names, vec!["Brown rice", "Rice"]);
        assert_eq!(list_items(&items, "  ").len(), 3);
    }
}
