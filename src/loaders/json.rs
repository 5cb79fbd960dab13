//! JSON and JSONL loaders.
//!
//! JSON files are parsed as an array of records first, then as a single
//! object; either way the records run through the flattener and the
//! column set is the sorted union of the flattened keys. JSONL is
//! streamed in two passes: the first counts lines and samples up to 100
//! valid records for the column superset and types, the second inserts.
//! An invalid line is skipped while sampling but fatal while inserting,
//! with the line number in the error.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value;

use super::{import_flat_records, table_name_for, LoadOptions, Loader};
use crate::error::DataqlError;
use crate::flatten::{flatten_value, FlatRecord};
use crate::infer::{infer_columns, ColumnDef, SAMPLE_SIZE};
use crate::storage::{Storage, EMPTY_PLACEHOLDER_COLUMN};

/// Rows buffered per insert batch.
const BATCH_ROWS: usize = 500;

pub struct JsonLoader {
    files: Vec<String>,
    storage: Arc<dyn Storage>,
    opts: LoadOptions,
    lines: u64,
}

impl JsonLoader {
    pub fn new(files: Vec<String>, storage: Arc<dyn Storage>, opts: LoadOptions) -> Self {
        Self {
            files,
            storage,
            opts,
            lines: 0,
        }
    }
}

impl Loader for JsonLoader {
    fn import(&mut self) -> Result<()> {
        for file in &self.files {
            let table = table_name_for(file, &self.opts);
            let reader = BufReader::new(
                File::open(file).with_context(|| format!("failed to open {file}"))?,
            );
            let value: Value = serde_json::from_reader(reader)
                .map_err(|e| DataqlError::Format(format!("invalid JSON in {file}: {e}")))?;

            // Array of records first; a single object is one record.
            let records: Vec<FlatRecord> = match value {
                Value::Array(items) => items
                    .iter()
                    .map(|item| flatten_value(item, "value"))
                    .collect(),
                other => vec![flatten_value(&other, "value")],
            };

            self.lines +=
                import_flat_records(self.storage.as_ref(), &table, &records, None, &self.opts)?;
        }
        Ok(())
    }

    fn lines(&self) -> u64 {
        self.lines
    }
}

pub struct JsonlLoader {
    files: Vec<String>,
    storage: Arc<dyn Storage>,
    opts: LoadOptions,
    lines: u64,
}

impl JsonlLoader {
    pub fn new(files: Vec<String>, storage: Arc<dyn Storage>, opts: LoadOptions) -> Self {
        Self {
            files,
            storage,
            opts,
            lines: 0,
        }
    }

    fn import_file(&mut self, path: &str) -> Result<()> {
        let table = table_name_for(path, &self.opts);

        // Pass 1: sample valid records for the column superset and types.
        let mut sample: Vec<FlatRecord> = Vec::new();
        {
            let reader = BufReader::new(
                File::open(path).with_context(|| format!("failed to open {path}"))?,
            );
            for line in reader.lines() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                if let Ok(value) = serde_json::from_str::<Value>(&line) {
                    sample.push(flatten_value(&value, "value"));
                    if sample.len() >= SAMPLE_SIZE {
                        break;
                    }
                }
            }
        }

        if sample.is_empty() {
            self.storage
                .create_table(&table, &[EMPTY_PLACEHOLDER_COLUMN.to_string()])?;
            return Ok(());
        }

        let columns: Vec<String> = {
            let mut set = std::collections::BTreeSet::new();
            for record in &sample {
                set.extend(record.keys().cloned());
            }
            set.into_iter().collect()
        };

        let typed = self.storage.typed().filter(|_| !self.opts.no_schema);
        let sample_rows: Vec<Vec<Value>> = sample
            .iter()
            .map(|record| {
                columns
                    .iter()
                    .map(|c| record.get(c).cloned().unwrap_or(Value::Null))
                    .collect()
            })
            .collect();
        let defs: Vec<ColumnDef> = infer_columns(&columns, &sample_rows);
        match typed {
            Some(t) => t.create_table_typed(&table, &defs)?,
            None => self.storage.create_table(&table, &columns)?,
        }

        // Pass 2: insert every line; malformed lines are now fatal.
        let reader =
            BufReader::new(File::open(path).with_context(|| format!("failed to open {path}"))?);
        let mut batch: Vec<Vec<Value>> = Vec::with_capacity(BATCH_ROWS);
        let mut inserted: u64 = 0;

        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let value: Value = serde_json::from_str(&line).map_err(|e| {
                DataqlError::Format(format!(
                    "invalid JSON at {path}:{}: {e}",
                    index + 1
                ))
            })?;
            let record = flatten_value(&value, "value");
            batch.push(
                columns
                    .iter()
                    .map(|c| record.get(c).cloned().unwrap_or(Value::Null))
                    .collect(),
            );
            inserted += 1;

            if batch.len() >= BATCH_ROWS {
                match typed {
                    Some(t) => t.insert_rows_typed(&table, &defs, &batch)?,
                    None => self.storage.insert_rows(&table, &columns, &batch)?,
                }
                batch.clear();
            }
            if self.opts.line_limit > 0 && inserted >= self.opts.line_limit {
                break;
            }
        }

        if !batch.is_empty() {
            match typed {
                Some(t) => t.insert_rows_typed(&table, &defs, &batch)?,
                None => self.storage.insert_rows(&table, &columns, &batch)?,
            }
        }

        self.lines += inserted;
        Ok(())
    }
}

impl Loader for JsonlLoader {
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
