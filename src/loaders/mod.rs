//! Format loaders: import resolved local inputs into engine tables.
//!
//! Every loader implements the same small capability set (`import`,
//! `lines`, `close`) and honors the shared rules: table names resolve
//! alias > collection override > filename stem; a zero-row source still
//! creates its table with a placeholder column; types are inferred from a
//! bounded sample and coerced on insert; `line_limit` caps rows per file.
//! The composite loader dispatches a mixed-format batch to the leaf
//! loaders, grouped so each still sees a same-format batch.

mod columnar;
mod csv;
mod database;
mod document;
mod excel;
mod json;
mod queue;
mod sqlite;
mod xml;
mod yaml;

pub use self::csv::CsvLoader;
pub use columnar::{AvroLoader, OrcLoader, ParquetLoader};
pub use database::DatabaseLoader;
pub use document::{DynamoLoader, MongoLoader};
pub use excel::ExcelLoader;
pub use json::{JsonLoader, JsonlLoader};
pub use queue::QueueLoader;
pub use sqlite::SqliteLoader;
pub use xml::XmlLoader;
pub use yaml::YamlLoader;

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;

use crate::detect::{self, Format};
use crate::error::DataqlError;
use crate::flatten::FlatRecord;
use crate::infer::{infer_columns, SAMPLE_SIZE};
use crate::resolve::AliasMap;
use crate::sanitize::{sanitize_name, table_name_from_path};
use crate::storage::{Storage, EMPTY_PLACEHOLDER_COLUMN};

/// Options shared by every loader, frozen before import starts.
#[derive(Clone)]
pub struct LoadOptions {
    pub delimiter: u8,
    /// Per-file row cap; 0 = unlimited.
    pub line_limit: u64,
    pub collection: Option<String>,
    /// Final resolved path -> table name.
    pub aliases: AliasMap,
    /// Skip inference; import everything as VARCHAR through the base tier.
    pub no_schema: bool,
    pub quiet: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            line_limit: 0,
            collection: None,
            aliases: AliasMap::default(),
            no_schema: false,
            quiet: true,
        }
    }
}

/// Capability set every format loader implements.
pub trait Loader {
    /// Import every source into the engine.
    fn import(&mut self) -> Result<()>;

    /// Rows inserted so far.
    fn lines(&self) -> u64;

    /// Release per-loader resources. Idempotent.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Resolve the table name for one source path:
/// alias map > collection override > sanitized filename stem.
pub fn table_name_for(path: &str, opts: &LoadOptions) -> String {
    if let Some(alias) = opts.aliases.get(path) {
        let name = sanitize_name(alias);
        if !name.is_empty() {
            return name;
        }
    }
    if let Some(collection) = &opts.collection {
        let name = sanitize_name(collection);
        if !name.is_empty() {
            return name;
        }
    }
    let name = table_name_from_path(Path::new(path));
    if name.is_empty() {
        "data".to_string()
    } else {
        name
    }
}

/// Materialize a batch of flattened records as one table.
///
/// The column set is the sorted union of the records' keys unless the
/// caller fixes it. Types come from a sample of up to 100 records and
/// every value is coerced on insert; with `no_schema` (or an engine
/// without the typed tier) everything imports as text. A source with no
/// rows still creates the table, with a single placeholder column.
pub(crate) fn import_flat_records(
    storage: &dyn Storage,
    table: &str,
    records: &[FlatRecord],
    fixed_columns: Option<Vec<String>>,
    opts: &LoadOptions,
) -> Result<u64> {
    let limited = if opts.line_limit > 0 && records.len() as u64 > opts.line_limit {
        &records[..opts.line_limit as usize]
    } else {
        records
    };

    let columns: Vec<String> = match fixed_columns {
        Some(columns) => columns,
        None => {
            let mut set = BTreeSet::new();
            for record in limited {
                set.extend(record.keys().cloned());
            }
            set.into_iter().collect()
        }
    };

    if limited.is_empty() || columns.is_empty() {
        storage.create_table(table, &[EMPTY_PLACEHOLDER_COLUMN.to_string()])?;
        return Ok(0);
    }

    let rows: Vec<Vec<Value>> = limited
        .iter()
        .map(|record| {
            columns
                .iter()
                .map(|c| record.get(c).cloned().unwrap_or(Value::Null))
                .collect()
        })
        .collect();

    insert_typed_or_plain(storage, table, &columns, rows, opts)
}

/// Create the table (typed when possible) and insert the rows.
pub(crate) fn insert_typed_or_plain(
    storage: &dyn Storage,
    table: &str,
    columns: &[String],
    rows: Vec<Vec<Value>>,
    opts: &LoadOptions,
) -> Result<u64> {
    if rows.is_empty() {
        storage.create_table(table, &[EMPTY_PLACEHOLDER_COLUMN.to_string()])?;
        return Ok(0);
    }

    match storage.typed().filter(|_| !opts.no_schema) {
        Some(typed) => {
            let sample: Vec<Vec<Value>> = rows.iter().take(SAMPLE_SIZE).cloned().collect();
            let defs = infer_columns(columns, &sample);
            typed.create_table_typed(table, &defs)?;
            typed.insert_rows_typed(table, &defs, &rows)?;
        }
        None => {
            storage.create_table(table, columns)?;
            storage.insert_rows(table, columns, &rows)?;
        }
    }
    Ok(rows.len() as u64)
}

/// Instantiate the loader for a detected format.
pub fn loader_for(
    format: Format,
    files: Vec<String>,
    storage: Arc<dyn Storage>,
    opts: LoadOptions,
) -> Result<Box<dyn Loader>> {
    Ok(match format {
        Format::Csv => Box::new(CsvLoader::new(files, storage, opts)),
        Format::Json => Box::new(JsonLoader::new(files, storage, opts)),
        Format::Jsonl => Box::new(JsonlLoader::new(files, storage, opts)),
        Format::Xml => Box::new(XmlLoader::new(files, storage, opts)),
        Format::Yaml => Box::new(YamlLoader::new(files, storage, opts)),
        Format::Excel => Box::new(ExcelLoader::new(files, storage, opts)),
        Format::Parquet => Box::new(ParquetLoader::new(files, storage, opts)),
        Format::Avro => Box::new(AvroLoader::new(files, storage, opts)),
        Format::Orc => Box::new(OrcLoader::new(files, storage, opts)),
        Format::Sqlite => Box::new(SqliteLoader::new(files, storage, opts)),
        Format::Database(kind) => Box::new(DatabaseLoader::new(kind, files, storage, opts)),
        Format::Mongo => Box::new(MongoLoader::new(files, storage, opts)),
        Format::Dynamo => Box::new(DynamoLoader::new(files, storage, opts)),
        Format::Queue(kind) => Box::new(QueueLoader::new(kind, files, storage, opts)),
        Format::Mixed => Box::new(CompositeLoader::new(files, storage, opts)?),
    })
}

/// Dispatches a heterogeneous batch to per-format loaders while keeping
/// same-format files batched together.
pub struct CompositeLoader {
    loaders: Vec<Box<dyn Loader>>,
}

impl CompositeLoader {
    pub fn new(files: Vec<String>, storage: Arc<dyn Storage>, opts: LoadOptions) -> Result<Self> {
        // Group by format, preserving first-seen order.
        let mut order: Vec<Format> = Vec::new();
        let mut groups: ahash::AHashMap<Format, Vec<String>> = ahash::AHashMap::new();
        for file in files {
            let format = detect::detect(&file)?;
            if format == Format::Mixed {
                return Err(DataqlError::Internal(
                    "composite loader received a nested mixed batch".to_string(),
                )
                .into());
            }
            if !groups.contains_key(&format) {
                order.push(format);
            }
            groups.entry(format).or_default().push(file);
        }

        let mut loaders = Vec::with_capacity(order.len());
        for format in order {
            let group = groups.remove(&format).unwrap_or_default();
            loaders.push(loader_for(format, group, Arc::clone(&storage), opts.clone())?);
        }
        Ok(Self { loaders })
    }
}

impl Loader for CompositeLoader {
    fn import(&mut self) -> Result<()> {
        for loader in &mut self.loaders {
            loader.import()?;
        }
        Ok(())
    }

    fn lines(&self) -> u64 {
        self.loaders.iter().map(|l| l.lines()).sum()
    }

    fn close(&mut self) -> Result<()> {
        for loader in &mut self.loaders {
            loader.close()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_name_precedence() {
        let mut opts = LoadOptions::default();
        assert_eq!(table_name_for("/tmp/data.csv", &opts), "data");

        opts.collection = Some("Override Me".to_string());
        assert_eq!(table_name_for("/tmp/data.csv", &opts), "override_me");

        opts.aliases
            .insert("/tmp/data.csv".to_string(), "People".to_string());
        assert_eq!(table_name_for("/tmp/data.csv", &opts), "people");
    }
}
