//! DuckDB implementation of the storage contract.
//!
//! The connection lives behind a mutex so loader workers can share one
//! engine; DuckDB serializes statements per connection anyway. Inserts
//! are issued as multi-row `INSERT ... VALUES` statements built from SQL
//! literals, which keeps the loader path free of per-row prepare costs.

use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use duckdb::Connection;
use serde_json::Value;

use super::{
    quote_ident, sql_literal, QueryResult, Storage, TableSchema, TypedStorage, SCHEMAS_TABLE,
};
use crate::error::DataqlError;
use crate::flatten::stringify_value;
use crate::infer::{coerce, ColumnDef, SqlValue};

/// Rows per generated INSERT statement.
const INSERT_CHUNK: usize = 500;

pub struct DuckDbStorage {
    conn: Mutex<Connection>,
    persistent: bool,
    schema_seq: AtomicI64,
}

impl DuckDbStorage {
    /// Open the engine: a file-backed database when `store_path` is
    /// given, otherwise in-memory. The `schemas` companion table is
    /// created up front, before any user table exists.
    pub fn open(store_path: Option<&Path>) -> Result<Self> {
        let (conn, persistent) = match store_path {
            Some(path) => {
                let conn = Connection::open(path).with_context(|| {
                    format!("failed to open storage file {}", path.display())
                })?;
                (conn, true)
            }
            None => {
                let conn = Connection::open_in_memory()
                    .context("failed to create in-memory database")?;
                (conn, false)
            }
        };

        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {} (id BIGINT, name VARCHAR, columns VARCHAR, total_columns BIGINT)",
                quote_ident(SCHEMAS_TABLE)
            ),
            [],
        )
        .context("failed to create schema companion table")?;

        Ok(Self {
            conn: Mutex::new(conn),
            persistent,
            schema_seq: AtomicI64::new(1),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| DataqlError::Internal("storage mutex poisoned".to_string()).into())
    }

    /// Record (or re-record) a table in the companion schema table.
    fn register_schema(&self, conn: &Connection, table: &str, columns: &[String]) -> Result<()> {
        if table == SCHEMAS_TABLE {
            return Ok(());
        }
        conn.execute(
            &format!(
                "DELETE FROM {} WHERE name = '{}'",
                quote_ident(SCHEMAS_TABLE),
                table.replace('\'', "''")
            ),
            [],
        )?;
        let id = self.schema_seq.fetch_add(1, Ordering::SeqCst);
        let joined = columns.join(",").replace('\'', "''");
        conn.execute(
            &format!(
                "INSERT INTO {} VALUES ({}, '{}', '{}', {})",
                quote_ident(SCHEMAS_TABLE),
                id,
                table.replace('\'', "''"),
                joined,
                columns.len()
            ),
            [],
        )?;
        Ok(())
    }

    fn create(&self, table: &str, defs: &[ColumnDef]) -> Result<()> {
        let conn = self.conn()?;
        let column_sql: Vec<String> = defs
            .iter()
            .map(|d| format!("{} {}", quote_ident(&d.name), d.column_type))
            .collect();
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote_ident(table),
            column_sql.join(", ")
        );
        conn.execute(&sql, [])
            .with_context(|| format!("failed to create table {table}"))?;

        let names: Vec<String> = defs.iter().map(|d| d.name.clone()).collect();
        self.register_schema(&conn, table, &names)
    }

    fn insert_chunked(&self, table: &str, columns: &[String], rows: &[Vec<String>]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let conn = self.conn()?;
        let column_list: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
        for chunk in rows.chunks(INSERT_CHUNK) {
            let values: Vec<String> = chunk.iter().map(|row| format!("({})", row.join(", "))).collect();
            let sql = format!(
                "INSERT INTO {} ({}) VALUES {}",
                quote_ident(table),
                column_list.join(", "),
                values.join(", ")
            );
            conn.execute(&sql, [])
                .with_context(|| format!("failed to insert into table {table}"))?;
        }
        Ok(())
    }
}

impl Storage for DuckDbStorage {
    fn create_table(&self, table: &str, columns: &[String]) -> Result<()> {
        let defs: Vec<ColumnDef> = columns.iter().map(ColumnDef::varchar).collect();
        self.create(table, &defs)
    }

    fn insert_row(&self, table: &str, columns: &[String], values: &[Value]) -> Result<()> {
        self.insert_rows(table, columns, std::slice::from_ref(&values.to_vec()))
    }

    fn insert_rows(&self, table: &str, columns: &[String], rows: &[Vec<Value>]) -> Result<()> {
        let rendered: Vec<Vec<String>> = rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|v| match v {
                        Value::Null => "NULL".to_string(),
                        other => sql_literal(&SqlValue::Text(stringify_value(other))),
                    })
                    .collect()
            })
            .collect();
        self.insert_chunked(table, columns, &rendered)
    }

    fn query(&self, sql: &str) -> Result<QueryResult> {
        let start = std::time::Instant::now();
        let conn = self.conn()?;

        let mut stmt = conn
            .prepare(sql)
            .with_context(|| format!("failed to prepare query: {sql}"))?;

        let mut rows_result = stmt
            .query([])
            .with_context(|| format!("failed to execute query: {sql}"))?;

        let mut rows: Vec<Vec<Option<String>>> = Vec::new();
        let mut column_count = 0;

        while let Some(row) = rows_result.next()? {
            if column_count == 0 {
                column_count = row.as_ref().column_count();
            }
            let mut values = Vec::with_capacity(column_count);
            for i in 0..column_count {
                values.push(render_cell(row.get_ref(i)));
            }
            rows.push(values);
        }

        // Drop the rows iterator to release the mutable borrow on stmt.
        drop(rows_result);

        let column_count = stmt.column_count();
        let columns: Vec<String> = (0..column_count)
            .map(|i| {
                stmt.column_name(i)
                    .map(|s| s.to_string())
                    .unwrap_or_else(|_| format!("col{i}"))
            })
            .collect();
        let column_types: Vec<String> = (0..column_count)
            .map(|i| format!("{:?}", stmt.column_type(i)))
            .collect();

        Ok(QueryResult {
            columns,
            column_types,
            rows,
            execution_time_secs: start.elapsed().as_secs_f64(),
        })
    }

    fn tables(&self) -> Result<Vec<TableSchema>> {
        let result = self.query(&format!(
            "SELECT name, columns FROM {} ORDER BY id",
            quote_ident(SCHEMAS_TABLE)
        ))?;
        Ok(result
            .rows
            .into_iter()
            .map(|row| TableSchema {
                name: row.first().cloned().flatten().unwrap_or_default(),
                columns: row
                    .get(1)
                    .cloned()
                    .flatten()
                    .map(|c| c.split(',').map(str::to_string).collect())
                    .unwrap_or_default(),
            })
            .collect())
    }

    fn close(&self) -> Result<()> {
        if self.persistent {
            let conn = self.conn()?;
            // Make sure the WAL is folded into the storage file.
            let _ = conn.execute("CHECKPOINT", []);
        }
        Ok(())
    }

    fn typed(&self) -> Option<&dyn TypedStorage> {
        Some(self)
    }
}

impl TypedStorage for DuckDbStorage {
    fn create_table_typed(&self, table: &str, defs: &[ColumnDef]) -> Result<()> {
        self.create(table, defs)
    }

    fn insert_rows_typed(&self, table: &str, defs: &[ColumnDef], rows: &[Vec<Value>]) -> Result<()> {
        let columns: Vec<String> = defs.iter().map(|d| d.name.clone()).collect();
        let rendered: Vec<Vec<String>> = rows
            .iter()
            .map(|row| {
                defs.iter()
                    .enumerate()
                    .map(|(i, def)| {
                        let value = row.get(i).unwrap_or(&Value::Null);
                        sql_literal(&coerce(value, def.column_type))
                    })
                    .collect()
            })
            .collect();
        self.insert_chunked(table, &columns, &rendered)
    }
}

/// Render one engine cell as an optional string, NULL-aware.
fn render_cell(cell: duckdb::Result<duckdb::types::ValueRef<'_>>) -> Option<String> {
    use duckdb::types::ValueRef;

    match cell {
        Ok(ValueRef::Null) => None,
        Ok(ValueRef::Boolean(b)) => Some(b.to_string()),
        Ok(ValueRef::TinyInt(n)) => Some(n.to_string()),
        Ok(ValueRef::SmallInt(n)) => Some(n.to_string()),
        Ok(ValueRef::Int(n)) => Some(n.to_string()),
        Ok(ValueRef::BigInt(n)) => Some(n.to_string()),
        Ok(ValueRef::HugeInt(n)) => Some(n.to_string()),
        Ok(ValueRef::UTinyInt(n)) => Some(n.to_string()),
        Ok(ValueRef::USmallInt(n)) => Some(n.to_string()),
        Ok(ValueRef::UInt(n)) => Some(n.to_string()),
        Ok(ValueRef::UBigInt(n)) => Some(n.to_string()),
        Ok(ValueRef::Float(f)) => Some(f.to_string()),
        Ok(ValueRef::Double(f)) => Some(f.to_string()),
        Ok(ValueRef::Text(s)) => Some(String::from_utf8_lossy(s).to_string()),
        Ok(ValueRef::Blob(b)) => Some(format!("<blob {} bytes>", b.len())),
        Ok(ValueRef::Decimal(d)) => Some(d.to_string()),
        Ok(ValueRef::Timestamp(_, ts)) => {
            // DuckDB timestamps are microseconds since epoch.
            let secs = ts / 1_000_000;
            let nanos = ((ts % 1_000_000) * 1000) as u32;
            Some(
                chrono::DateTime::from_timestamp(secs, nanos)
                    .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| ts.to_string()),
            )
        }
        Ok(ValueRef::Date32(days)) => Some(
            // 719163 = days from 0001-01-01 to 1970-01-01.
            chrono::NaiveDate::from_num_days_from_ce_opt(719163 + days)
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| days.to_string()),
        ),
        Ok(ValueRef::Time64(_, micros)) => {
            let secs = (micros / 1_000_000) as u32;
            let nanos = ((micros % 1_000_000) * 1000) as u32;
            Some(
                chrono::NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos)
                    .map(|t| t.format("%H:%M:%S").to_string())
                    .unwrap_or_else(|| micros.to_string()),
            )
        }
        Ok(other) => Some(format!("{other:?}")),
        Err(_) => Some("ERROR".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infer::ColumnType;
    use serde_json::json;

    #[test]
    fn test_open_create_insert_query() {
        let storage = DuckDbStorage::open(None).unwrap();
        let defs = vec![
            ColumnDef::new("id", ColumnType::Bigint),
            ColumnDef::new("name", ColumnType::Varchar),
        ];
        storage.create_table_typed("users", &defs).unwrap();
        storage
            .insert_rows_typed(
                "users",
                &defs,
                &[
                    vec![json!("1"), json!("Alice")],
                    vec![json!("2"), json!("Bob")],
                ],
            )
            .unwrap();

        let result = storage
            .query("SELECT name FROM users WHERE id > 1 ORDER BY id")
            .unwrap();
        assert_eq!(result.rows, vec![vec![Some("Bob".to_string())]]);
    }

    #[test]
    fn test_coercion_failure_becomes_null() {
        let storage = DuckDbStorage::open(None).unwrap();
        let defs = vec![ColumnDef::new("n", ColumnType::Bigint)];
        storage.create_table_typed("t", &defs).unwrap();
        storage
            .insert_rows_typed("t", &defs, &[vec![json!("oops")], vec![json!("7")]])
            .unwrap();

        let result = storage.query("SELECT n FROM t ORDER BY n NULLS FIRST").unwrap();
        assert_eq!(result.rows[0][0], None);
        assert_eq!(result.rows[1][0], Some("7".to_string()));
    }

    #[test]
    fn test_schema_companion_registration() {
        let storage = DuckDbStorage::open(None).unwrap();
        storage
            .create_table("a", &["x".to_string(), "y".to_string()])
            .unwrap();
        storage.create_table("b", &["z".to_string()]).unwrap();

        let tables = storage.tables().unwrap();
        let names: Vec<&str> = tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(tables[0].columns, vec!["x", "y"]);
    }

    #[test]
    fn test_create_table_idempotent() {
        let storage = DuckDbStorage::open(None).unwrap();
        storage.create_table("t", &["a".to_string()]).unwrap();
        storage.create_table("t", &["a".to_string()]).unwrap();
        assert_eq!(storage.tables().unwrap().len(), 1);
    }

    #[test]
    fn test_quoted_identifiers_survive() {
        let storage = DuckDbStorage::open(None).unwrap();
        storage
            .create_table("select", &["from".to_string()])
            .unwrap();
        storage
            .insert_rows("select", &["from".to_string()], &[vec![json!("x")]])
            .unwrap();
        let result = storage.query("SELECT \"from\" FROM \"select\"").unwrap();
        assert_eq!(result.rows[0][0], Some("x".to_string()));
    }
}
