//! Columnar-file loaders: Parquet, Avro, and ORC.
//!
//! All three read the schema from the file, turn leaf columns into table
//! columns, and push the values through the flattener so nested
//! structures fold the same way they do for JSON.

use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::{Map, Value};

use super::{import_flat_records, table_name_for, LoadOptions, Loader};
use crate::error::DataqlError;
use crate::flatten::{flatten_value, FlatRecord};
use crate::sanitize::column_name;
use crate::storage::Storage;

// ---------------------------------------------------------------------------
// Parquet
// ---------------------------------------------------------------------------

pub struct ParquetLoader {
    files: Vec<String>,
    storage: Arc<dyn Storage>,
    opts: LoadOptions,
    lines: u64,
}

impl ParquetLoader {
    pub fn new(files: Vec<String>, storage: Arc<dyn Storage>, opts: LoadOptions) -> Self {
        Self {
            files,
            storage,
            opts,
            lines: 0,
        }
    }
}

impl Loader for ParquetLoader {
    fn import(&mut self) -> Result<()> {
        use parquet::file::reader::{FileReader, SerializedFileReader};

        for file in &self.files {
            let table = table_name_for(file, &self.opts);
            let handle = File::open(file).with_context(|| format!("failed to open {file}"))?;
            let reader = SerializedFileReader::new(handle)
                .map_err(|e| DataqlError::Format(format!("invalid Parquet file {file}: {e}")))?;

            let mut records: Vec<FlatRecord> = Vec::new();
            let rows = reader
                .get_row_iter(None)
                .map_err(|e| DataqlError::Format(format!("invalid Parquet file {file}: {e}")))?;
            for row in rows {
                let row = row
                    .map_err(|e| DataqlError::Format(format!("invalid Parquet row in {file}: {e}")))?;
                records.push(flatten_value(&row.to_json_value(), "value"));
                if self.opts.line_limit > 0 && records.len() as u64 >= self.opts.line_limit {
                    break;
                }
            }

            self.lines +=
                import_flat_records(self.storage.as_ref(), &table, &records, None, &self.opts)?;
        }
        Ok(())
    }

    fn lines(&self) -> u64 {
        self.lines
    }
}

// ---------------------------------------------------------------------------
// Avro
// ---------------------------------------------------------------------------

pub struct AvroLoader {
    files: Vec<String>,
    storage: Arc<dyn Storage>,
    opts: LoadOptions,
    lines: u64,
}

impl AvroLoader {
    pub fn new(files: Vec<String>, storage: Arc<dyn Storage>, opts: LoadOptions) -> Self {
        Self {
            files,
            storage,
            opts,
            lines: 0,
        }
    }
}

impl Loader for AvroLoader {
    fn import(&mut self) -> Result<()> {
        for file in &self.files {
            let table = table_name_for(file, &self.opts);
            let handle = File::open(file).with_context(|| format!("failed to open {file}"))?;
            let reader = apache_avro::Reader::new(BufReader::new(handle))
                .map_err(|e| DataqlError::Format(format!("invalid Avro file {file}: {e}")))?;

            let mut records: Vec<FlatRecord> = Vec::new();
            for value in reader {
                let value = value
                    .map_err(|e| DataqlError::Format(format!("invalid Avro record in {file}: {e}")))?;
                records.push(flatten_value(&avro_to_json(value), "value"));
                if self.opts.line_limit > 0 && records.len() as u64 >= self.opts.line_limit {
                    break;
                }
            }

            self.lines +=
                import_flat_records(self.storage.as_ref(), &table, &records, None, &self.opts)?;
        }
        Ok(())
    }

    fn lines(&self) -> u64 {
        self.lines
    }
}

/// Convert an Avro value into JSON for the flattener. Logical types fall
/// back to their debug rendering rather than failing the import.
fn avro_to_json(value: apache_avro::types::Value) -> Value {
    use apache_avro::types::Value as Avro;

    match value {
        Avro::Null => Value::Null,
        Avro::Boolean(b) => Value::Bool(b),
        Avro::Int(i) => Value::from(i),
        Avro::Long(l) => Value::from(l),
        Avro::Float(f) => Value::from(f as f64),
        Avro::Double(d) => Value::from(d),
        Avro::String(s) => Value::String(s),
        Avro::Bytes(bytes) | Avro::Fixed(_, bytes) => {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        }
        Avro::Enum(_, symbol) => Value::String(symbol),
        Avro::Union(_, inner) => avro_to_json(*inner),
        Avro::Array(items) => Value::Array(items.into_iter().map(avro_to_json).collect()),
        Avro::Map(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, avro_to_json(v)))
                .collect::<Map<String, Value>>(),
        ),
        Avro::Record(fields) => Value::Object(
            fields
                .into_iter()
                .map(|(k, v)| (k, avro_to_json(v)))
                .collect::<Map<String, Value>>(),
        ),
        Avro::Date(days) => Value::from(days),
        Avro::TimeMillis(t) => Value::from(t),
        Avro::TimeMicros(t) => Value::from(t),
        Avro::TimestampMillis(t) => Value::from(t),
        Avro::TimestampMicros(t) => Value::from(t),
        Avro::Uuid(u) => Value::String(u.to_string()),
        other => Value::String(format!("{other:?}")),
    }
}

// ---------------------------------------------------------------------------
// ORC
// ---------------------------------------------------------------------------

pub struct OrcLoader {
    files: Vec<String>,
    storage: Arc<dyn Storage>,
    opts: LoadOptions,
    lines: u64,
}

impl OrcLoader {
    pub fn new(files: Vec<String>, storage: Arc<dyn Storage>, opts: LoadOptions) -> Self {
        Self {
            files,
            storage,
            opts,
            lines: 0,
        }
    }
}

impl Loader for OrcLoader {
    fn import(&mut self) -> Result<()> {
        use arrow::array::Array;
        use arrow_cast::display::{ArrayFormatter, FormatOptions};

        for file in &self.files {
            let table = table_name_for(file, &self.opts);
            let handle = File::open(file).with_context(|| format!("failed to open {file}"))?;
            let reader = orc_rust::ArrowReaderBuilder::try_new(handle)
                .map_err(|e| DataqlError::Format(format!("invalid ORC file {file}: {e}")))?
                .build();

            let mut records: Vec<FlatRecord> = Vec::new();
            let options = FormatOptions::default();

            'batches: for batch in reader {
                let batch = batch
                    .map_err(|e| DataqlError::Format(format!("invalid ORC data in {file}: {e}")))?;
                let schema = batch.schema();
                let columns: Vec<String> = schema
                    .fields()
                    .iter()
                    .enumerate()
                    .map(|(i, field)| column_name(field.name(), i))
                    .collect();

                let formatters: Vec<ArrayFormatter<'_>> = batch
                    .columns()
                    .iter()
                    .map(|array| ArrayFormatter::try_new(array.as_ref(), &options))
                    .collect::<std::result::Result<_, _>>()
                    .map_err(|e| {
                        DataqlError::Format(format!("unreadable ORC column in {file}: {e}"))
                    })?;

                for row in 0..batch.num_rows() {
                    let mut record = FlatRecord::new();
                    for (i, name) in columns.iter().enumerate() {
                        let value = if batch.column(i).is_null(row) {
                            Value::Null
                        } else {
                            Value::String(formatters[i].value(row).to_string())
                        };
                        record.insert(name.clone(), value);
                    }
                    records.push(record);
                    if self.opts.line_limit > 0 && records.len() as u64 >= self.opts.line_limit {
                        break 'batches;
                    }
                }
            }

            self.lines +=
                import_flat_records(self.storage.as_ref(), &table, &records, None, &self.opts)?;
        }
        Ok(())
    }

    fn lines(&self) -> u64 {
        self.lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apache_avro::types::Value as Avro;

    #[test]
    fn test_avro_scalars() {
        assert_eq!(avro_to_json(Avro::Long(7)), Value::from(7));
        assert_eq!(avro_to_json(Avro::Boolean(true)), Value::Bool(true));
        assert_eq!(
            avro_to_json(Avro::String("x".to_string())),
            Value::String("x".to_string())
        );
        assert_eq!(avro_to_json(Avro::Null), Value::Null);
    }

    #[test]
    fn test_avro_record_and_union() {
        let record = Avro::Record(vec![
            ("id".to_string(), Avro::Int(1)),
            (
                "name".to_string(),
                Avro::Union(1, Box::new(Avro::String("Alice".to_string()))),
            ),
        ]);
        let json = avro_to_json(record);
        assert_eq!(json["id"], Value::from(1));
        assert_eq!(json["name"], Value::String("Alice".to_string()));
    }
}
