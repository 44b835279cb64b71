//! Raw host configuration → fully parsed tree.
//!
//! Hosts push configuration as loosely typed JSON in which any value may
//! itself be a JSON-encoded string. Strings are decoded recursively; objects
//! are walked; arrays are left alone because they carry engine expressions
//! whose string literals must not be reinterpreted.

use serde_json::{Map, Value};

/// Keys whose values keep exact string identity and are never decoded.
pub const OPAQUE_KEYS: &[&str] = &["select_id", "tileset", "stories"];

fn is_opaque(key: &str) -> bool {
    OPAQUE_KEYS.contains(&key)
}

/// Normalizes a whole configuration object.
///
/// A top-level value that is not an object (after decoding) yields `None`.
pub fn normalize(raw: &Value) -> Option<Map<String, Value>> {
    match decode_value(raw) {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

fn normalize_map(map: &Map<String, Value>) -> Map<String, Value> {
    map.iter()
        .map(|(key, value)| (key.clone(), normalize_entry(key, value)))
        .collect()
}

fn normalize_entry(key: &str, value: &Value) -> Value {
    if is_opaque(key) {
        return match value {
            Value::Number(n) => Value::String(n.to_string()),
            other => other.clone(),
        };
    }
    decode_value(value)
}

fn decode_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(normalize_map(map)),
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            // Doubly encoded strings unwrap one layer per pass.
            Ok(inner @ (Value::String(_) | Value::Object(_))) => decode_value(&inner),
            Ok(parsed) => parsed,
            Err(_) => value.clone(),
        },
        other => other.clone(),
    }
}

/// Merges `incoming` onto `base` key by key.
///
/// Nested objects merge recursively; every other value, arrays included,
/// replaces what was there. Keys absent from `incoming` persist.
pub fn merge_into(base: &mut Map<String, Value>, incoming: Map<String, Value>) {
    for (key, value) in incoming {
        if let Value::Object(incoming_obj) = value {
            if let Some(Value::Object(existing)) = base.get_mut(&key) {
                merge_into(existing, incoming_obj);
                continue;
            }
            base.insert(key, Value::Object(incoming_obj));
        } else {
            base.insert(key, value);
        }
    }
}
