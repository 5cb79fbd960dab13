//! Flattening of nested records into a flat column space.
//!
//! Hierarchical records (JSON, YAML, XML, Avro, documents, message
//! payloads) are folded depth-first into `_`-joined, sanitized keys.
//! Arrays are kept as JSON text rather than exploded into rows. The
//! output map is sorted, so the derived column order is deterministic
//! regardless of the source's own key order.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::sanitize::sanitize_name;

/// A flattened record: sorted map from sanitized column name to scalar.
pub type FlatRecord = BTreeMap<String, Value>;

/// Flatten a map-shaped record.
pub fn flatten_record(record: &Map<String, Value>) -> FlatRecord {
    let mut out = FlatRecord::new();
    for (key, value) in record {
        flatten_into(&mut out, "", key, value);
    }
    out
}

/// Flatten an arbitrary value. Non-map values land under `fallback_key`.
pub fn flatten_value(value: &Value, fallback_key: &str) -> FlatRecord {
    match value {
        Value::Object(map) => flatten_record(map),
        other => {
            let mut out = FlatRecord::new();
            flatten_into(&mut out, "", fallback_key, other);
            out
        }
    }
}

fn flatten_into(out: &mut FlatRecord, prefix: &str, key: &str, value: &Value) {
    let composed = if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}_{key}")
    };

    match value {
        Value::Object(map) => {
            for (child_key, child) in map {
                flatten_into(out, &composed, child_key, child);
            }
        }
        Value::Array(_) => {
            let serialized = serde_json::to_string(value).unwrap_or_default();
            out.insert(flat_key(&composed), Value::String(serialized));
        }
        Value::Null => {
            out.insert(flat_key(&composed), Value::String(String::new()));
        }
        scalar => {
            out.insert(flat_key(&composed), scalar.clone());
        }
    }
}

fn flat_key(composed: &str) -> String {
    let key = sanitize_name(composed);
    if key.is_empty() {
        "field".to_string()
    } else {
        key
    }
}

/// Render a scalar value the way the importers and exporters print it:
/// nulls become empty strings, booleans are literal, and a float equal to
/// its integer truncation is rendered without a decimal point.
pub fn stringify_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.to_string()
            } else if let Some(u) = n.as_u64() {
                u.to_string()
            } else if let Some(f) = n.as_f64() {
                if f.is_finite() && f.fract() == 0.0 && f.abs() < 9e15 {
                    format!("{}", f as i64)
                } else {
                    f.to_string()
                }
            } else {
                n.to_string()
            }
        }
        Value::String(s) => s.clone(),
        composite => serde_json::to_string(composite).unwrap_or_default(),
    }
}
