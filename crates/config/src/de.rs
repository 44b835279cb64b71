//! Lenient field deserializers for host-supplied configuration.
//!
//! Dashboard hosts are loose about scalar types: booleans arrive as `"TRUE"`,
//! ids as numbers, widths as strings. These helpers accept the common shapes,
//! and [`field`] keeps a value that still does not fit from rejecting the
//! rest of its group.

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

/// Reads `key` out of a configuration group with `read`.
///
/// Missing and `null` keys yield `None`. So does a value `read` rejects,
/// after a warning; the caller substitutes its default for that one field.
pub fn field<'a, T>(
    map: &'a Map<String, Value>,
    group: &str,
    key: &str,
    read: impl FnOnce(&'a Value) -> Result<T, serde_json::Error>,
) -> Option<T> {
    let raw = map.get(key).filter(|v| !v.is_null())?;
    match read(raw) {
        Ok(v) => Some(v),
        Err(err) => {
            tracing::warn!(group, key, %err, "configuration field malformed; using default");
            None
        }
    }
}

/// Truthiness in the host's sense: `true`, non-zero numbers, and the strings
/// `true`/`yes`/`1` (any case). Everything else, `null` included, is `false`.
pub fn truthy<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;
    Ok(match v {
        Value::Bool(b) => b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "yes" | "1"),
        _ => false,
    })
}

/// An id that must keep its exact textual form. Numbers are stringified;
/// `null`, empty strings and empty arrays mean "no id".
pub fn opaque_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;
    Ok(match v {
        Value::String(s) if !s.is_empty() => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// A palette key; numbers are compared in their string form.
pub fn string_key<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;
    match v {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number key, got {other}"
        ))),
    }
}

/// A number that may arrive as a string.
pub fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;
    match &v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .ok_or_else(|| serde::de::Error::custom(format!("expected a number, got {v}")))
}
