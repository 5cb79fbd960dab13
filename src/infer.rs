//! Type inference and coercion for imported columns.
//!
//! Columns are inferred from a sample of records using a small lattice:
//! `BIGINT < DOUBLE < VARCHAR`, with `BOOLEAN` as a parallel lane that
//! collapses to `VARCHAR` on contact with anything non-boolean. At insert
//! time every value is coerced to the chosen column type; a failed
//! coercion becomes NULL instead of aborting the import.

use serde_json::Value;

use crate::flatten::stringify_value;

/// Number of records sampled per column before the type is fixed.
pub const SAMPLE_SIZE: usize = 100;

/// The column types the analytical engine is asked to materialize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Bigint,
    Double,
    Boolean,
    Varchar,
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColumnType::Bigint => write!(f, "BIGINT"),
            ColumnType::Double => write!(f, "DOUBLE"),
            ColumnType::Boolean => write!(f, "BOOLEAN"),
            ColumnType::Varchar => write!(f, "VARCHAR"),
        }
    }
}

/// A named, typed column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub column_type: ColumnType,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }

    pub fn varchar(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Varchar)
    }
}

/// A value after coercion, ready to be written to the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bigint(i64),
    Double(f64),
    Boolean(bool),
    Text(String),
}

/// Infer the type contributed by a single runtime value.
///
/// Returns `None` when the value makes no contribution (null, or a string
/// that is empty after trimming).
pub fn infer_value_type(value: &Value) -> Option<ColumnType> {
    match value {
        Value::Null => None,
        Value::Bool(_) => Some(ColumnType::Boolean),
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                Some(ColumnType::Bigint)
            } else {
                Some(ColumnType::Double)
            }
        }
        Value::String(s) => infer_str_type(s),
        // Arrays and objects should already be flattened away; anything
        // left is stored as text.
        Value::Array(_) | Value::Object(_) => Some(ColumnType::Varchar),
    }
}

fn infer_str_type(s: &str) -> Option<ColumnType> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.eq_ignore_ascii_case("true") || trimmed.eq_ignore_ascii_case("false") {
        return Some(ColumnType::Boolean);
    }
    if trimmed.parse::<i64>().is_ok() {
        return Some(ColumnType::Bigint);
    }
    // Finite only: "inf" and "NaN" parse as f64 but are not numbers a
    // user meant to store in a numeric column.
    if trimmed.parse::<f64>().map(|f| f.is_finite()).unwrap_or(false) {
        return Some(ColumnType::Double);
    }
    Some(ColumnType::Varchar)
}

/// Widen an accumulated column type with a new observation.
pub fn widen(current: Option<ColumnType>, observed: ColumnType) -> ColumnType {
    match current {
        None => observed,
        Some(cur) if cur == observed => cur,
        // BOOLEAN mixes with nothing else.
        Some(ColumnType::Boolean) => ColumnType::Varchar,
        Some(_) if observed == ColumnType::Boolean => ColumnType::Varchar,
        Some(ColumnType::Varchar) => ColumnType::Varchar,
        Some(_) if observed == ColumnType::Varchar => ColumnType::Varchar,
        // Only BIGINT/DOUBLE combinations remain.
        Some(_) => ColumnType::Double,
    }
}

/// Infer every column's type from a sample of rows.
///
/// `columns` fixes the order; rows hold values aligned with it. Only the
/// first [`SAMPLE_SIZE`] rows contribute. A column with no non-null
/// observation defaults to VARCHAR.
pub fn infer_columns(columns: &[String], sample: &[Vec<Value>]) -> Vec<ColumnDef> {
    columns
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let mut acc: Option<ColumnType> = None;
            for row in sample.iter().take(SAMPLE_SIZE) {
                if let Some(observed) = row.get(i).and_then(infer_value_type) {
                    acc = Some(widen(acc, observed));
                    if acc == Some(ColumnType::Varchar) {
                        break;
                    }
                }
            }
            ColumnDef::new(name.clone(), acc.unwrap_or(ColumnType::Varchar))
        })
        .collect()
}

/// Coerce a runtime value to a column type, producing NULL on failure.
pub fn coerce(value: &Value, target: ColumnType) -> SqlValue {
    match target {
        ColumnType::Bigint => coerce_bigint(value),
        ColumnType::Double => coerce_double(value),
        ColumnType::Boolean => coerce_boolean(value),
        ColumnType::Varchar => match value {
            Value::Null => SqlValue::Null,
            other => SqlValue::Text(stringify_value(other)),
        },
    }
}

fn coerce_bigint(value: &Value) -> SqlValue {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                SqlValue::Bigint(i)
            } else if let Some(f) = n.as_f64() {
                float_to_bigint(f)
            } else {
                SqlValue::Null
            }
        }
        Value::Bool(b) => SqlValue::Bigint(i64::from(*b)),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return SqlValue::Null;
            }
            if let Ok(i) = trimmed.parse::<i64>() {
                return SqlValue::Bigint(i);
            }
            match trimmed.parse::<f64>() {
                Ok(f) => float_to_bigint(f),
                Err(_) => SqlValue::Null,
            }
        }
        _ => SqlValue::Null,
    }
}

fn float_to_bigint(f: f64) -> SqlValue {
    if f.is_finite() && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
        SqlValue::Bigint(f.trunc() as i64)
    } else {
        SqlValue::Null
    }
}

fn coerce_double(value: &Value) -> SqlValue {
    match value {
        Value::Number(n) => n.as_f64().map(SqlValue::Double).unwrap_or(SqlValue::Null),
        Value::Bool(b) => SqlValue::Double(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return SqlValue::Null;
            }
            match trimmed.parse::<f64>() {
                Ok(f) if f.is_finite() => SqlValue::Double(f),
                _ => SqlValue::Null,
            }
        }
        _ => SqlValue::Null,
    }
}

fn coerce_boolean(value: &Value) -> SqlValue {
    match value {
        Value::Bool(b) => SqlValue::Boolean(*b),
        Value::Number(n) => {
            let truthy = n.as_f64().map(|f| f != 0.0).unwrap_or(false);
            SqlValue::Boolean(truthy)
        }
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return SqlValue::Null;
            }
            // Strings match the literal set only; the non-zero rule is
            // reserved for native numbers.
            match trimmed.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" | "t" | "y" => SqlValue::Boolean(true),
                "false" | "0" | "no" | "off" | "f" | "n" => SqlValue::Boolean(false),
                _ => SqlValue::Null,
            }
        }
        _ => SqlValue::Null,
    }
}
