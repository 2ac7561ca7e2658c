//! Lenient decoding for money, quantity and free-text fields.
//!
//! Older clients and hand-edited backups store amounts as strings
//! (`"250"`), leave them `null`, or write fractional quantities. A single
//! odd field must not reject the whole customer, so these coerce instead:
//! unusable amounts read as `0`, quantities are rounded, text fields accept
//! numbers.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

fn finite(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(raw) => raw.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|f| f.is_finite())
}

/// Money: numbers and numeric strings are taken as-is, anything else is `0`.
///
/// # Errors
///
/// Only when the input is not valid JSON at all.
pub fn amount<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(finite).unwrap_or(0.0))
}

/// Line-item quantity, rounded to the nearest whole unit and clamped to
/// `u32`. Unusable values read as `1`, the quantity a line is created with.
///
/// # Errors
///
/// Only when the input is not valid JSON at all.
pub fn quantity<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(finite).map_or(1, |q| {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let rounded = q.round().clamp(0.0, f64::from(u32::MAX)) as u32;
        rounded
    }))
}

/// Free text: strings pass through, numbers and booleans are rendered,
/// `null` and containers read as empty.
///
/// # Errors
///
/// Only when the input is not valid JSON at all.
pub fn text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => s,
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Line {
        #[serde(default, deserialize_with = "amount")]
        price: f64,
        #[serde(default = "one", deserialize_with = "quantity")]
        quantity: u32,
        #[serde(default, deserialize_with = "text")]
        note: String,
    }

    const fn one() -> u32 {
        1
    }

    fn line(raw: &str) -> Line {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn numeric_strings_are_amounts() {
        assert!((line(r#"{"price":"250"}"#).price - 250.0).abs() < f64::EPSILON);
        assert!((line(r#"{"price":" 2.5 "}"#).price - 2.5).abs() < f64::EPSILON);
    }

    #[test]
    fn unusable_amounts_read_as_zero() {
        for raw in [r#"{"price":null}"#, r#"{"price":"abc"}"#, r#"{"price":[1]}"#, "{}"] {
            assert!(line(raw).price.abs() < f64::EPSILON, "{raw}");
        }
    }

    #[test]
    fn quantities_are_rounded_and_clamped() {
        assert_eq!(line(r#"{"quantity":2.6}"#).quantity, 3);
        assert_eq!(line(r#"{"quantity":"4"}"#).quantity, 4);
        assert_eq!(line(r#"{"quantity":-3}"#).quantity, 0);
        assert_eq!(line(r#"{"quantity":null}"#).quantity, 1);
        assert_eq!(line("{}").quantity, 1);
    }

    #[test]
    fn text_accepts_numbers() {
        assert_eq!(line(r#"{"note":5550100}"#).note, "5550100");
        assert_eq!(line(r#"{"note":null}"#).note, "");
    }
}
