//! SQLite-file loader.
//!
//! Every user table in the source database is imported as its own table
//! in the engine; source column types map through SQLite's affinity
//! rules into the inference lattice.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value;

use super::{table_name_for, LoadOptions, Loader};
use crate::infer::{ColumnDef, ColumnType};
use crate::sanitize::{column_name, sanitize_name};
use crate::storage::{Storage, EMPTY_PLACEHOLDER_COLUMN};

/// Rows buffered per insert batch.
const BATCH_ROWS: usize = 500;

pub struct SqliteLoader {
    files: Vec<String>,
    storage: Arc<dyn Storage>,
    opts: LoadOptions,
    lines: u64,
}

impl SqliteLoader {
    pub fn new(files: Vec<String>, storage: Arc<dyn Storage>, opts: LoadOptions) -> Self {
        Self {
            files,
            storage,
            opts,
            lines: 0,
        }
    }

    fn import_file(&mut self, path: &str) -> Result<()> {
        let conn = rusqlite::Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY,
        )
        .with_context(|| format!("failed to open SQLite database {path}"))?;

        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )?;
        let table_names: Vec<String> = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<_, _>>()?;
        drop(stmt);

        if table_names.is_empty() {
            let table = table_name_for(path, &self.opts);
            self.storage
                .create_table(&table, &[EMPTY_PLACEHOLDER_COLUMN.to_string()])?;
            return Ok(());
        }

        // An explicit alias or collection override applies when the
        // source holds a single table; otherwise each table keeps its
        // own (sanitized) name.
        let single = table_names.len() == 1;
        for source_table in &table_names {
            let target = if single {
                table_name_for(path, &self.opts)
            } else {
                sanitize_name(source_table)
            };
            self.import_table(&conn, source_table, &target)?;
        }
        Ok(())
    }

    fn import_table(
        &mut self,
        conn: &rusqlite::Connection,
        source_table: &str,
        target: &str,
    ) -> Result<()> {
        let quoted = format!("\"{}\"", source_table.replace('"', "\"\""));

        let mut stmt = conn.prepare(&format!("PRAGMA table_info({quoted})"))?;
        let schema: Vec<(String, String)> = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(1)?, row.get::<_, String>(2)?))
            })?
            .collect::<std::result::Result<_, _>>()?;
        drop(stmt);

        if schema.is_empty() {
            self.storage
                .create_table(target, &[EMPTY_PLACEHOLDER_COLUMN.to_string()])?;
            return Ok(());
        }

        let defs: Vec<ColumnDef> = schema
            .iter()
            .enumerate()
            .map(|(i, (name, declared))| {
                ColumnDef::new(column_name(name, i), affinity_type(declared))
            })
            .collect();
        let columns: Vec<String> = defs.iter().map(|d| d.name.clone()).collect();

        let typed = self.storage.typed().filter(|_| !self.opts.no_schema);
        match typed {
            Some(t) => t.create_table_typed(target, &defs)?,
            None => self.storage.create_table(target, &columns)?,
        }

        let mut stmt = conn.prepare(&format!("SELECT * FROM {quoted}"))?;
        let mut rows = stmt.query([])?;
        let mut batch: Vec<Vec<Value>> = Vec::with_capacity(BATCH_ROWS);
        let mut inserted: u64 = 0;

        while let Some(row) = rows.next()? {
            let values: Vec<Value> = (0..columns.len())
                .map(|i| cell_value(row.get_ref(i)))
                .collect();
            batch.push(values);
            inserted += 1;

            if batch.len() >= BATCH_ROWS {
                match typed {
                    Some(t) => t.insert_rows_typed(target, &defs, &batch)?,
                    None => self.storage.insert_rows(target, &columns, &batch)?,
                }
                batch.clear();
            }
            if self.opts.line_limit > 0 && inserted >= self.opts.line_limit {
                break;
            }
        }

        if !batch.is_empty() {
            match typed {
                Some(t) => t.insert_rows_typed(target, &defs, &batch)?,
                None => self.storage.insert_rows(target, &columns, &batch)?,
            }
        }

        self.lines += inserted;
        Ok(())
    }
}

impl Loader for SqliteLoader {
    fn import(&mut self) -> Result<()> {
        for file in self.files.clone() {
            self.import_file(&file)?;
        }
        Ok(())
    }

    fn lines(&self) -> u64 {
        self.lines
    }
}

/// SQLite type affinity into the inference lattice.
fn affinity_type(declared: &str) -> ColumnType {
    let upper = declared.to_uppercase();
    if upper.contains("INT") {
        ColumnType::Bigint
    } else if upper.contains("BOOL") {
        ColumnType::Boolean
    } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
        ColumnType::Double
    } else {
        ColumnType::Varchar
    }
}

fn cell_value(cell: std::result::Result<rusqlite::types::ValueRef<'_>, rusqlite::Error>) -> Value {
    use rusqlite::types::ValueRef;

    match cell {
        Ok(ValueRef::Null) => Value::Null,
        Ok(ValueRef::Integer(i)) => Value::from(i),
        Ok(ValueRef::Real(f)) => Value::from(f),
        Ok(ValueRef::Text(bytes)) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        Ok(ValueRef::Blob(bytes)) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        Err(_) => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_affinity_mapping() {
        assert_eq!(affinity_type("INTEGER"), ColumnType::Bigint);
        assert_eq!(affinity_type("int"), ColumnType::Bigint);
        assert_eq!(affinity_type("BIGINT"), ColumnType::Bigint);
        assert_eq!(affinity_type("BOOLEAN"), ColumnType::Boolean);
        assert_eq!(affinity_type("REAL"), ColumnType::Double);
        assert_eq!(affinity_type("DOUBLE PRECISION"), ColumnType::Double);
        assert_eq!(affinity_type("TEXT"), ColumnType::Varchar);
        assert_eq!(affinity_type(""), ColumnType::Varchar);
    }
}
