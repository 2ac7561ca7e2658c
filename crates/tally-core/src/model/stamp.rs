//! `updatedAt` stamps and their lenient wire encoding.
//!
//! Stamps travel as ISO-8601 strings. Older snapshots carry no stamp at all,
//! and some hand-edited backups carry epoch milliseconds instead. All of these
//! are accepted; anything unparseable decodes as "no stamp", which is the
//! lowest merge priority.

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serializer};
use serde_json::Value;

/// Merge priority of a stamp in epoch milliseconds. Missing stamps rank as
/// epoch 0, below every real write.
#[must_use]
pub fn priority(stamp: Option<&DateTime<Utc>>) -> i64 {
    stamp.map_or(0, DateTime::timestamp_millis)
}

/// Render a timestamp the way the stored snapshots do
/// (`2024-03-01T10:15:00.000Z`).
#[must_use]
pub fn to_iso(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse an ISO-8601 / RFC 3339 string, or a bare `YYYY-MM-DD` date
/// (interpreted as midnight UTC).
#[must_use]
pub fn parse_iso(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn from_value(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(raw) => parse_iso(raw),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| {
                #[allow(clippy::cast_possible_truncation)]
                n.as_f64().map(|f| f as i64)
            })
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    }
}

/// Serde adapter for `Option<DateTime<Utc>>` fields named `updatedAt`.
pub mod lenient {
    use super::{DateTime, Deserialize, Deserializer, Serializer, Utc, Value, from_value, to_iso};

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(
        stamp: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match stamp {
            Some(ts) => serializer.serialize_str(&to_iso(ts)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(value.as_ref().and_then(from_value))
    }
}
