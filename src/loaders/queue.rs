//! Message-queue loader.
//!
//! Peeks a bounded number of messages (never consuming them) and imports
//! each as one row: the reserved columns, a `meta_*` column per metadata
//! entry, and a flattened `body_*` expansion when the body parses as
//! JSON.

use std::sync::Arc;

use anyhow::Result;
use serde_json::{json, Map, Value};

use super::{import_flat_records, LoadOptions, Loader};
use crate::detect::QueueKind;
use crate::flatten::{flatten_record, FlatRecord};
use crate::queue::{open_reader, QueueMessage};
use crate::sanitize::sanitize_name;
use crate::storage::Storage;

/// Messages peeked when no line limit is given.
const DEFAULT_PEEK: u64 = 100;

pub struct QueueLoader {
    kind: QueueKind,
    urls: Vec<String>,
    storage: Arc<dyn Storage>,
    opts: LoadOptions,
    lines: u64,
}

impl QueueLoader {
    pub fn new(
        kind: QueueKind,
        urls: Vec<String>,
        storage: Arc<dyn Storage>,
        opts: LoadOptions,
    ) -> Self {
        Self {
            kind,
            urls,
            storage,
            opts,
            lines: 0,
        }
    }

    fn import_url(&mut self, url: &str) -> Result<()> {
        let mut reader = open_reader(self.kind, url)?;
        let max = if self.opts.line_limit > 0 {
            self.opts.line_limit
        } else {
            DEFAULT_PEEK
        };
        let messages = reader.peek(max as usize)?;
        reader.close();

        let records: Vec<FlatRecord> = messages.iter().map(message_record).collect();

        let table = {
            let source = messages.first().map(|m| m.source.clone()).unwrap_or_default();
            let mut opts = self.opts.clone();
            if !opts.aliases.contains_key(url) && opts.collection.is_none() {
                let name = sanitize_name(&source);
                opts.collection = Some(if name.is_empty() {
                    "messages".to_string()
                } else {
                    name
                });
            }
            super::table_name_for(url, &opts)
        };

        self.lines +=
            import_flat_records(self.storage.as_ref(), &table, &records, None, &self.opts)?;
        Ok(())
    }
}

impl Loader for QueueLoader {
    fn import(&mut self) -> Result<()> {
        for url in self.urls.clone() {
            self.import_url(&url)?;
        }
        Ok(())
    }

    fn lines(&self) -> u64 {
        self.lines
    }
}

/// Flatten one message into its row shape.
fn message_record(message: &QueueMessage) -> FlatRecord {
    let mut object = Map::new();
    object.insert("message_id".to_string(), json!(message.id));
    object.insert("source".to_string(), json!(message.source));
    object.insert("receive_count".to_string(), json!(message.receive_count));
    object.insert(
        "timestamp".to_string(),
        match message.timestamp {
            Some(ts) => json!(ts.format("%Y-%m-%d %H:%M:%S").to_string()),
            None => Value::String(String::new()),
        },
    );
    object.insert(
        "timestamp_unix".to_string(),
        match message.timestamp {
            Some(ts) => json!(ts.timestamp()),
            None => Value::Null,
        },
    );
    object.insert("body".to_string(), json!(message.body));

    let mut meta = Map::new();
    for (key, value) in &message.metadata {
        meta.insert(key.clone(), json!(value));
    }
    if !meta.is_empty() {
        object.insert("meta".to_string(), Value::Object(meta));
    }

    // A JSON body additionally expands under body_*.
    if let Ok(parsed) = serde_json::from_str::<Value>(&message.body) {
        if parsed.is_object() {
            let mut wrapper = Map::new();
            wrapper.insert("body".to_string(), parsed);
            let flattened = flatten_record(&wrapper);
            let mut record = flatten_record(&object);
            for (key, value) in flattened {
                // Do not clobber the raw body column.
                if key != "body" {
                    record.insert(key, value);
                }
            }
            return record;
        }
    }

    flatten_record(&object)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::BTreeMap;

    fn sample_message(body: &str) -> QueueMessage {
        let mut metadata = BTreeMap::new();
        metadata.insert("partition".to_string(), "0".to_string());
        QueueMessage {
            id: "m-1".to_string(),
            body: body.to_string(),
            timestamp: Some(chrono::Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()),
            metadata,
            source: "events".to_string(),
            receive_count: 2,
        }
    }

    #[test]
    fn test_reserved_columns() {
        let record = message_record(&sample_message("plain text"));
        assert_eq!(record.get("message_id"), Some(&json!("m-1")));
        assert_eq!(record.get("source"), Some(&json!("events")));
        assert_eq!(record.get("receive_count"), Some(&json!(2)));
        assert_eq!(record.get("body"), Some(&json!("plain text")));
        assert_eq!(record.get("timestamp"), Some(&json!("2024-06-01 12:00:00")));
        assert_eq!(record.get("timestamp_unix"), Some(&json!(1717243200)));
        assert_eq!(record.get("meta_partition"), Some(&json!("0")));
    }

    #[test]
    fn test_json_body_expands() {
        let record = message_record(&sample_message(r#"{"event":"click","count":3}"#));
        assert_eq!(record.get("body_event"), Some(&json!("click")));
        assert_eq!(record.get("body_count"), Some(&json!(3)));
        // The raw body column is preserved.
        assert_eq!(
            record.get("body"),
            Some(&json!(r#"{"event":"click","count":3}"#))
        );
    }

    #[test]
    fn test_non_json_body_has_no_expansion() {
        let record = message_record(&sample_message("hello"));
        assert!(record.keys().all(|k| !k.starts_with("body_")));
    }
}
