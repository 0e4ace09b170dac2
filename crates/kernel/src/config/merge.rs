//! Deep merging of configuration layers.
//!
//! Tables merge key by key, recursively; any other value in the overlay
//! replaces the base value outright (arrays included).

use serde_json::{Map, Value as JsonValue};
use toml::{Table, Value};

/// Merge `overlay` into `base`, with `overlay` winning.
pub fn deep_merge(base: &mut Table, overlay: Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(Value::Table(existing)), Value::Table(incoming)) => {
                deep_merge(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// JSON counterpart of [`deep_merge`], used for template locals.
pub fn deep_merge_json(base: &mut Map<String, JsonValue>, overlay: Map<String, JsonValue>) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(JsonValue::Object(existing)), JsonValue::Object(incoming)) => {
                deep_merge_json(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Insert `value` under `key` only when the key is absent.
pub fn set_default(map: &mut Map<String, JsonValue>, key: &str, value: impl Into<JsonValue>) {
    if !map.contains_key(key) {
        map.insert(key.to_string(), value.into());
    }
}

/// Convert a TOML table into a JSON object.
pub fn to_json_map(table: Table) -> Map<String, JsonValue> {
    table
        .into_iter()
        .map(|(k, v)| (k, toml_to_json(v)))
        .collect()
}

fn toml_to_json(value: Value) -> JsonValue {
    match value {
        Value::String(s) => JsonValue::String(s),
        Value::Integer(i) => JsonValue::from(i),
        Value::Float(f) => JsonValue::from(f),
        Value::Boolean(b) => JsonValue::Bool(b),
        Value::Datetime(dt) => JsonValue::String(dt.to_string()),
        Value::Array(items) => JsonValue::Array(items.into_iter().map(toml_to_json).collect()),
        Value::Table(table) => JsonValue::Object(to_json_map(table)),
    }
}
