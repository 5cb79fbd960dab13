//! YAML loader.
//!
//! A top-level array of maps is a record set; a map with exactly one
//! array-valued child unwraps to that array; anything else imports as a
//! single record.

use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value;

use super::{import_flat_records, table_name_for, LoadOptions, Loader};
use crate::error::DataqlError;
use crate::flatten::{flatten_value, FlatRecord};
use crate::storage::Storage;

pub struct YamlLoader {
    files: Vec<String>,
    storage: Arc<dyn Storage>,
    opts: LoadOptions,
    lines: u64,
}

impl YamlLoader {
    pub fn new(files: Vec<String>, storage: Arc<dyn Storage>, opts: LoadOptions) -> Self {
        Self {
            files,
            storage,
            opts,
            lines: 0,
        }
    }
}

impl Loader for YamlLoader {
    fn import(&mut self) -> Result<()> {
        for file in &self.files {
            let table = table_name_for(file, &self.opts);
            let reader = BufReader::new(
                File::open(file).with_context(|| format!("failed to open {file}"))?,
            );
            let parsed: serde_yaml_ng::Value = serde_yaml_ng::from_reader(reader)
                .map_err(|e| DataqlError::Format(format!("invalid YAML in {file}: {e}")))?;
            let value: Value = serde_json::to_value(&parsed).map_err(|e| {
                DataqlError::Format(format!("unsupported YAML structure in {file}: {e}"))
            })?;

            let records = records_from(value);
            self.lines +=
                import_flat_records(self.storage.as_ref(), &table, &records, None, &self.opts)?;
        }
        Ok(())
    }

    fn lines(&self) -> u64 {
        self.lines
    }
}

fn records_from(value: Value) -> Vec<FlatRecord> {
    let items: Vec<Value> = match value {
        Value::Array(items) => items,
        Value::Object(map) => {
            // A map with exactly one array-valued child is a wrapper
            // around the record set; scalar siblings do not count.
            let array_children: Vec<&Value> =
                map.values().filter(|v| v.is_array()).collect();
            match array_children.as_slice() {
                [Value::Array(items)] => items.clone(),
                _ => vec![Value::Object(map)],
            }
        }
        Value::Null => Vec::new(),
        other => vec![other],
    };

    items
        .iter()
        .map(|item| flatten_value(item, "value"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_array_of_maps() {
        let records = records_from(json!([{"a": 1}, {"a": 2}]));
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].get("a"), Some(&json!(2)));
    }

    #[test]
    fn test_single_array_child_unwraps() {
        let records = records_from(json!({"users": [{"name": "Alice"}, {"name": "Bob"}]}));
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("name"), Some(&json!("Alice")));
    }

    #[test]
    fn test_plain_map_is_single_record() {
        let records = records_from(json!({"host": "db1", "port": 5432}));
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("port"), Some(&json!(5432)));
    }

    #[test]
    fn test_scalar_siblings_do_not_block_unwrap() {
        let records = records_from(json!({"users": [{"name": "Alice"}, {"name": "Bob"}], "count": 2}));
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].get("name"), Some(&json!("Bob")));
    }

    #[test]
    fn test_two_array_children_stay_a_single_record() {
        let records = records_from(json!({"users": [1, 2], "groups": [3]}));
        assert_eq!(records.len(), 1);
    }
}
