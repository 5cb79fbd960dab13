//! Storage contract over the embedded analytical engine.
//!
//! Two tiers: the base tier creates all-text tables and inserts
//! stringified rows; the typed tier (probed via [`Storage::typed`])
//! creates typed tables and coerces each value on insert, substituting
//! NULL when a value cannot be represented. A companion table
//! `schemas(id, name, columns, total_columns)` is maintained next to the
//! user tables so meta-commands can enumerate them without relying on
//! `information_schema`.

use anyhow::Result;
use serde_json::Value;

use crate::infer::{ColumnDef, SqlValue};

#[cfg(feature = "duckdb")]
mod duckdb;
#[cfg(feature = "duckdb")]
pub use duckdb::DuckDbStorage;

#[cfg(not(feature = "duckdb"))]
mod stub;
#[cfg(not(feature = "duckdb"))]
pub use stub::DuckDbStorage;

/// Name of the companion schema table.
pub const SCHEMAS_TABLE: &str = "schemas";

/// Placeholder column created for tables with no rows, so that
/// `SELECT * FROM t` still succeeds on an empty source.
pub const EMPTY_PLACEHOLDER_COLUMN: &str = "_empty";

/// A table known to the engine, as recorded in the companion table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<String>,
}

/// A fully materialized query result. Cells are `None` for SQL NULL.
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub column_types: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
    pub execution_time_secs: f64,
}

impl QueryResult {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }
}

/// Base storage tier. Implementations must be safe to share across the
/// loader worker threads; DDL/DML is serialized internally.
pub trait Storage: Send + Sync {
    /// Create a table where every column is text. Idempotent within a run.
    fn create_table(&self, table: &str, columns: &[String]) -> Result<()>;

    /// Insert one row of raw values, stringified.
    fn insert_row(&self, table: &str, columns: &[String], values: &[Value]) -> Result<()>;

    /// Insert many rows. The default just loops; implementations may batch.
    fn insert_rows(&self, table: &str, columns: &[String], rows: &[Vec<Value>]) -> Result<()> {
        for row in rows {
            self.insert_row(table, columns, row)?;
        }
        Ok(())
    }

    /// Execute arbitrary SQL and materialize the result.
    fn query(&self, sql: &str) -> Result<QueryResult>;

    /// Enumerate the tables recorded in the companion schema table.
    fn tables(&self) -> Result<Vec<TableSchema>>;

    /// Flush and release the engine.
    fn close(&self) -> Result<()>;

    /// Probe for the typed tier. `None` means only all-text tables are
    /// available.
    fn typed(&self) -> Option<&dyn TypedStorage> {
        None
    }
}

/// Typed storage tier: typed DDL plus coercing inserts.
pub trait TypedStorage: Send + Sync {
    fn create_table_typed(&self, table: &str, defs: &[ColumnDef]) -> Result<()>;

    /// Insert rows, coercing each value to its column's type. A value
    /// that cannot be coerced becomes NULL.
    fn insert_rows_typed(&self, table: &str, defs: &[ColumnDef], rows: &[Vec<Value>]) -> Result<()>;
}

/// Quote an identifier for DDL/DML, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Render a coerced value as a SQL literal.
pub fn sql_literal(value: &SqlValue) -> String {
    match value {
        SqlValue::Null => "NULL".to_string(),
        SqlValue::Bigint(n) => n.to_string(),
        SqlValue::Double(f) => {
            if f.is_finite() {
                // Keep a decimal marker so the engine parses a DOUBLE.
                if f.fract() == 0.0 && f.abs() < 9e15 {
                    format!("{f:.1}")
                } else {
                    f.to_string()
                }
            } else {
                "NULL".to_string()
            }
        }
        SqlValue::Boolean(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        SqlValue::Text(s) => format!("'{}'", s.replace('\'', "''")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("users"), "\"users\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_sql_literal() {
        assert_eq!(sql_literal(&SqlValue::Null), "NULL");
        assert_eq!(sql_literal(&SqlValue::Bigint(-3)), "-3");
        assert_eq!(sql_literal(&SqlValue::Double(1.0)), "1.0");
        assert_eq!(sql_literal(&SqlValue::Double(1.25)), "1.25");
        assert_eq!(sql_literal(&SqlValue::Boolean(true)), "TRUE");
        assert_eq!(
            sql_literal(&SqlValue::Text("O'Brien".to_string())),
            "'O''Brien'"
        );
    }
}
