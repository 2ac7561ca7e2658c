//! Wire shape of a synced collection and the precedence rules for picking
//! which copy of a collection to start from.
//!
//! Remote values come in two shapes:
//!
//! - canonical: `{"data": [...], "timestamp": 1700000000000}`
//! - legacy: a bare JSON array
//!
//! Both normalize to a `Vec<T>` here. Anything else is
//! [`RemoteError::Malformed`]. Individual elements that fail to decode are
//! set aside with a warning and the rest of the snapshot is kept. The sync
//! cycle writes set-aside elements back untouched, so a record this build
//! cannot read is never erased from the cloud by a push.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::RemoteError;

/// One of the three synced collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Customers,
    Items,
    DeletedIds,
}

impl Category {
    pub const ALL: [Self; 3] = [Self::Customers, Self::Items, Self::DeletedIds];

    /// Name used in partition keys and cache rows.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Customers => "customers",
            Self::Items => "items",
            Self::DeletedIds => "deleted_ids",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customers" => Ok(Self::Customers),
            "items" => Ok(Self::Items),
            "deleted_ids" => Ok(Self::DeletedIds),
            other => Err(format!("unknown category '{other}'")),
        }
    }
}

/// Canonical snapshot envelope as pushed to the remote store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot<T> {
    pub data: Vec<T>,
    /// Push time in epoch milliseconds.
    pub timestamp: i64,
}

impl<T: Serialize> Snapshot<T> {
    #[must_use]
    pub fn new(data: Vec<T>, at: DateTime<Utc>) -> Self {
        Self {
            data,
            timestamp: at.timestamp_millis(),
        }
    }
}

/// Encode records in the canonical `{data, timestamp}` shape.
///
/// # Errors
///
/// Returns an error if a record fails to serialize, which cannot happen for
/// the model types.
pub fn encode<T: Serialize>(records: &[T], at: DateTime<Utc>) -> serde_json::Result<Value> {
    Ok(serde_json::json!({
        "data": serde_json::to_value(records)?,
        "timestamp": at.timestamp_millis(),
    }))
}

/// Records decoded from a snapshot, plus the raw elements that did not
/// decode.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded<T> {
    pub records: Vec<T>,
    pub rejected: Vec<Value>,
}

impl<T> Default for Decoded<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            rejected: Vec::new(),
        }
    }
}

/// Encode records in the canonical shape, followed by `raw` elements that
/// are passed through as-is.
///
/// # Errors
///
/// Same as [`encode`].
pub fn encode_with_raw<T: Serialize>(
    records: &[T],
    raw: &[Value],
    at: DateTime<Utc>,
) -> serde_json::Result<Value> {
    let mut data = Vec::with_capacity(records.len() + raw.len());
    for record in records {
        data.push(serde_json::to_value(record)?);
    }
    data.extend_from_slice(raw);
    Ok(serde_json::json!({
        "data": data,
        "timestamp": at.timestamp_millis(),
    }))
}

/// Decode a remote value into records.
///
/// # Errors
///
/// Returns [`RemoteError::Malformed`] when the value is neither a bare array
/// nor an object carrying a `data` array.
pub fn decode<T: DeserializeOwned>(
    category: Category,
    value: Value,
) -> Result<Decoded<T>, RemoteError> {
    let elements = match value {
        Value::Array(elements) => elements,
        Value::Object(mut map) => match map.remove("data") {
            Some(Value::Array(elements)) => elements,
            Some(Value::Null) | None => {
                return Err(RemoteError::Malformed(format!(
                    "{category} snapshot has no data array"
                )));
            }
            Some(other) => {
                return Err(RemoteError::Malformed(format!(
                    "{category} snapshot data is {}, expected an array",
                    json_kind(&other)
                )));
            }
        },
        other => {
            return Err(RemoteError::Malformed(format!(
                "{category} snapshot is {}, expected an array or object",
                json_kind(&other)
            )));
        }
    };
    Ok(partition_elements(category, elements))
}

/// Decode each element independently, setting aside the ones that do not
/// parse.
pub fn partition_elements<T: DeserializeOwned>(
    category: Category,
    elements: Vec<Value>,
) -> Decoded<T> {
    let total = elements.len();
    let mut decoded = Decoded::default();
    for (index, element) in elements.into_iter().enumerate() {
        match T::deserialize(&element) {
            Ok(record) => decoded.records.push(record),
            Err(err) => {
                warn!(%category, index, error = %err, "skipping malformed record");
                decoded.rejected.push(element);
            }
        }
    }
    if !decoded.rejected.is_empty() {
        warn!(
            %category,
            kept = decoded.records.len(),
            rejected = decoded.rejected.len(),
            total,
            "snapshot contained malformed records"
        );
    }
    decoded
}

/// Decode each element independently, dropping the ones that do not parse.
pub fn decode_elements<T: DeserializeOwned>(category: Category, elements: Vec<Value>) -> Vec<T> {
    partition_elements(category, elements).records
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Where a resolved collection came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotSource {
    Remote,
    Cache,
    Empty,
}

/// Pick the starting copy of a collection.
///
/// Precedence, first match wins:
///
/// 1. the remote snapshot, when the remote answered with data
/// 2. the local cache entry, when one exists and decoded
/// 3. an empty collection
///
/// A remote that answered "no data yet" counts as absent, so a fresh cloud
/// account never wipes a populated cache.
#[must_use]
pub fn resolve<T>(remote: Option<Vec<T>>, cached: Option<Vec<T>>) -> (Vec<T>, SnapshotSource) {
    if let Some(records) = remote {
        return (records, SnapshotSource::Remote);
    }
    if let Some(records) = cached {
        return (records, SnapshotSource::Cache);
    }
    (Vec::new(), SnapshotSource::Empty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Item;
    use serde_json::json;

    #[test]
    fn decodes_wrapped_snapshot() {
        let value = json!({"data": [{"id": "i1", "name": "Rice", "price": 2.5}], "timestamp": 1});
        let items: Vec<Item> = decode(Category::Items, value).unwrap().records;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "Rice");
    }

    #[test]
    fn decodes_legacy_bare_array() {
        let value = json!(["c1", "tx-7"]);
        let ids: Vec<String> = decode(Category::DeletedIds, value).unwrap().records;
        assert_eq!(ids, vec!["c1", "tx-7"]);
    }

    #[test]
    fn rejects_unrecognized_shapes() {
        for value in [json!("nope"), json!(42), json!({"rows": []}), json!({"data": "x"})] {
            let result: Result<Decoded<Item>, _> = decode(Category::Items, value);
            assert!(matches!(result, Err(RemoteError::Malformed(_))));
        }
    }

    #[test]
    fn drops_malformed_elements_and_keeps_the_rest() {
        let value = json!([
            {"id": "i1", "name": "Rice"},
            {"name": "no id"},
            17,
            {"id": "i2", "name": "Dal"}
        ]);
        let decoded: Decoded<Item> = decode(Category::Items, value).unwrap();
        let ids: Vec<&str> = decoded.records.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["i1", "i2"]);
        assert_eq!(decoded.rejected, vec![json!({"name": "no id"}), json!(17)]);
    }

    #[test]
    fn raw_elements_are_appended_after_records() {
        let at = DateTime::from_timestamp_millis(5).unwrap();
        let value = encode_with_raw(&["a".to_string()], &[json!({"id": 7})], at).unwrap();
        assert_eq!(value, json!({"data": ["a", {"id": 7}], "timestamp": 5}));
    }

    #[test]
    fn encodes_canonical_envelope() {
        let at = DateTime::from_timestamp_millis(1_700_000_000_123).unwrap();
        let value = encode(&["a".to_string()], at).unwrap();
        assert_eq!(value, json!({"data": ["a"], "timestamp": 1_700_000_000_123_i64}));
        let envelope: Snapshot<String> = serde_json::from_value(value).unwrap();
        assert_eq!(envelope, Snapshot::new(vec!["a".to_string()], at));
    }

    #[test]
    fn resolve_prefers_remote_then_cache_then_empty() {
        assert_eq!(
            resolve(Some(vec![1]), Some(vec![2])),
            (vec![1], SnapshotSource::Remote)
        );
        assert_eq!(resolve(None, Some(vec![2])), (vec![2], SnapshotSource::Cache));
        assert_eq!(resolve::<i32>(None, None), (vec![], SnapshotSource::Empty));
    }

    #[test]
    fn category_names_round_trip() {
        for category in Category::ALL {
            assert_eq!(category.as_str().parse::<Category>(), Ok(category));
        }
    }
}
