//! CSV loader.
//!
//! Files are pre-counted in parallel (one worker per file) to size the
//! progress bar, then loaded in parallel against the shared storage. The
//! first row is the header; the per-column types come from a sample of
//! the leading rows and every later value is coerced on insert.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;

use super::{table_name_for, LoadOptions, Loader};
use crate::error::DataqlError;
use crate::infer::{infer_columns, ColumnDef, SAMPLE_SIZE};
use crate::sanitize::column_name;
use crate::storage::{Storage, EMPTY_PLACEHOLDER_COLUMN};

/// Rows buffered per insert batch.
const BATCH_ROWS: usize = 500;

pub struct CsvLoader {
    files: Vec<String>,
    storage: Arc<dyn Storage>,
    opts: LoadOptions,
    lines: Arc<AtomicU64>,
}

impl CsvLoader {
    pub fn new(files: Vec<String>, storage: Arc<dyn Storage>, opts: LoadOptions) -> Self {
        Self {
            files,
            storage,
            opts,
            lines: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl Loader for CsvLoader {
    fn import(&mut self) -> Result<()> {
        // Pre-count data rows in parallel so the bar has a total.
        let total: u64 = thread::scope(|scope| {
            let handles: Vec<_> = self
                .files
                .iter()
                .map(|file| scope.spawn(move || count_data_rows(file).unwrap_or(0)))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap_or(0)).sum()
        });

        let bar = if self.opts.quiet {
            ProgressBar::hidden()
        } else {
            let bar = ProgressBar::new(total);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} rows")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("=>-"),
            );
            bar
        };

        thread::scope(|scope| -> Result<()> {
            let mut handles = Vec::with_capacity(self.files.len());
            for file in &self.files {
                let storage = Arc::clone(&self.storage);
                let opts = self.opts.clone();
                let lines = Arc::clone(&self.lines);
                let bar = bar.clone();
                handles.push(scope.spawn(move || {
                    import_file(file, storage.as_ref(), &opts, &lines, &bar)
                }));
            }
            for handle in handles {
                handle
                    .join()
                    .map_err(|_| DataqlError::Internal("csv worker panicked".to_string()))??;
            }
            Ok(())
        })?;

        bar.finish_and_clear();
        Ok(())
    }

    fn lines(&self) -> u64 {
        self.lines.load(Ordering::SeqCst)
    }
}

/// Number of data rows (newlines minus the header). An estimate for the
/// progress bar only; quoted embedded newlines over-count slightly.
fn count_data_rows(path: &str) -> Result<u64> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let lines = reader.lines().count() as u64;
    Ok(lines.saturating_sub(1))
}

fn import_file(
    path: &str,
    storage: &dyn Storage,
    opts: &LoadOptions,
    lines: &AtomicU64,
    bar: &ProgressBar,
) -> Result<()> {
    let table = table_name_for(path, opts);

    let file = File::open(path).with_context(|| format!("failed to open {path}"))?;
    let mut reader = ::csv::ReaderBuilder::new()
        .delimiter(opts.delimiter)
        .flexible(true)
        .from_reader(BufReader::new(file));

    let headers = reader
        .headers()
        .with_context(|| format!("failed to read CSV header of {path}"))?
        .clone();
    let columns = dedupe_columns(headers.iter());

    // Sample leading rows for inference before anything is written.
    let mut sample: Vec<Vec<Value>> = Vec::new();
    let mut records = reader.records();
    while sample.len() < SAMPLE_SIZE {
        match records.next() {
            Some(record) => {
                let record =
                    record.with_context(|| format!("malformed CSV record in {path}"))?;
                sample.push(record_values(&record, columns.len()));
            }
            None => break,
        }
    }

    if sample.is_empty() {
        storage.create_table(&table, &[EMPTY_PLACEHOLDER_COLUMN.to_string()])?;
        return Ok(());
    }

    let typed = storage.typed().filter(|_| !opts.no_schema);
    let defs: Vec<ColumnDef> = infer_columns(&columns, &sample);
    match typed {
        Some(t) => t.create_table_typed(&table, &defs)?,
        None => storage.create_table(&table, &columns)?,
    }

    let mut inserted: u64 = 0;
    let mut batch: Vec<Vec<Value>> = Vec::with_capacity(BATCH_ROWS);

    let mut push_row = |row: Vec<Value>, batch: &mut Vec<Vec<Value>>| -> Result<bool> {
        batch.push(row);
        inserted += 1;
        lines.fetch_add(1, Ordering::SeqCst);
        bar.inc(1);
        if batch.len() >= BATCH_ROWS {
            flush(storage, typed, &table, &columns, &defs, batch)?;
        }
        Ok(opts.line_limit > 0 && inserted >= opts.line_limit)
    };

    let mut limit_reached = false;
    for row in sample {
        if push_row(row, &mut batch)? {
            limit_reached = true;
            break;
        }
    }

    if !limit_reached {
        for record in records {
            let record = record.with_context(|| format!("malformed CSV record in {path}"))?;
            let row = record_values(&record, columns.len());
            if push_row(row, &mut batch)? {
                break;
            }
        }
    }

    flush(storage, typed, &table, &columns, &defs, &mut batch)?;
    Ok(())
}

fn flush(
    storage: &dyn Storage,
    typed: Option<&dyn crate::storage::TypedStorage>,
    table: &str,
    columns: &[String],
    defs: &[ColumnDef],
    batch: &mut Vec<Vec<Value>>,
) -> Result<()> {
    if batch.is_empty() {
        return Ok(());
    }
    match typed {
        Some(t) => t.insert_rows_typed(table, defs, batch)?,
        None => storage.insert_rows(table, columns, batch)?,
    }
    batch.clear();
    Ok(())
}

/// Row values aligned with the header; missing trailing cells are empty.
fn record_values(record: &::csv::StringRecord, width: usize) -> Vec<Value> {
    (0..width)
        .map(|i| Value::String(record.get(i).unwrap_or("").to_string()))
        .collect()
}

/// Sanitize headers, substituting `column_N` for empty ones and
/// suffixing duplicates so the DDL stays valid.
fn dedupe_columns<'a>(headers: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen: ahash::AHashMap<String, usize> = ahash::AHashMap::new();
    headers
        .enumerate()
        .map(|(i, raw)| {
            let base = column_name(raw, i);
            let count = seen.entry(base.clone()).or_insert(0);
            *count += 1;
            if *count == 1 {
                base
            } else {
                format!("{base}_{count}")
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedupe_columns() {
        let columns = dedupe_columns(["id", "Name", "name", ""].into_iter());
        assert_eq!(columns, vec!["id", "name", "name_2", "column_3"]);
    }

    #[test]
    fn test_count_data_rows() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("x.csv");
        std::fs::write(&path, "a,b\n1,2\n3,4\n").unwrap();
        assert_eq!(count_data_rows(path.to_str().unwrap()).unwrap(), 2);
    }
}
