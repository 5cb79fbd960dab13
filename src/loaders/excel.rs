//! Excel loader.
//!
//! Only the first sheet is loaded; the first row is the header and
//! missing cells are treated as empty strings.

use std::sync::Arc;

use anyhow::Result;
use calamine::{open_workbook_auto, Data, Reader};
use serde_json::Value;

use super::{insert_typed_or_plain, table_name_for, LoadOptions, Loader};
use crate::error::DataqlError;
use crate::sanitize::column_name;
use crate::storage::{Storage, EMPTY_PLACEHOLDER_COLUMN};

pub struct ExcelLoader {
    files: Vec<String>,
    storage: Arc<dyn Storage>,
    opts: LoadOptions,
    lines: u64,
}

impl ExcelLoader {
    pub fn new(files: Vec<String>, storage: Arc<dyn Storage>, opts: LoadOptions) -> Self {
        Self {
            files,
            storage,
            opts,
            lines: 0,
        }
    }
}

impl Loader for ExcelLoader {
    fn import(&mut self) -> Result<()> {
        for file in &self.files {
            let table = table_name_for(file, &self.opts);

            let mut workbook = open_workbook_auto(file)
                .map_err(|e| DataqlError::Format(format!("failed to open workbook {file}: {e}")))?;
            let sheet_names = workbook.sheet_names().to_owned();
            let Some(first_sheet) = sheet_names.first() else {
                self.storage
                    .create_table(&table, &[EMPTY_PLACEHOLDER_COLUMN.to_string()])?;
                continue;
            };

            let range = workbook.worksheet_range(first_sheet).map_err(|e| {
                DataqlError::Format(format!("failed to read sheet {first_sheet} of {file}: {e}"))
            })?;

            let mut rows = range.rows();
            let Some(header) = rows.next() else {
                self.storage
                    .create_table(&table, &[EMPTY_PLACEHOLDER_COLUMN.to_string()])?;
                continue;
            };
            let columns: Vec<String> = header
                .iter()
                .enumerate()
                .map(|(i, cell)| column_name(&cell.to_string(), i))
                .collect();

            let mut data: Vec<Vec<Value>> = Vec::new();
            for row in rows {
                let values: Vec<Value> = (0..columns.len())
                    .map(|i| row.get(i).map(cell_value).unwrap_or(Value::String(String::new())))
                    .collect();
                data.push(values);
                if self.opts.line_limit > 0 && data.len() as u64 >= self.opts.line_limit {
                    break;
                }
            }

            self.lines += insert_typed_or_plain(
                self.storage.as_ref(),
                &table,
                &columns,
                data,
                &self.opts,
            )?;
        }
        Ok(())
    }

    fn lines(&self) -> u64 {
        self.lines
    }
}

fn cell_value(cell: &Data) -> Value {
    match cell {
        Data::Empty => Value::String(String::new()),
        Data::String(s) => Value::String(s.clone()),
        Data::Bool(b) => Value::Bool(*b),
        Data::Int(i) => Value::from(*i),
        Data::Float(f) => {
            // Excel stores integers as floats; keep whole values integral
            // so inference can still pick BIGINT.
            if f.fract() == 0.0 && f.abs() < 9e15 {
                Value::from(*f as i64)
            } else {
                Value::from(*f)
            }
        }
        other => Value::String(other.to_string()),
    }
}
