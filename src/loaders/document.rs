//! Document-store loaders: MongoDB collections and DynamoDB tables.
//!
//! The column set comes from the first document; later documents with a
//! different shape produce sparse rows (missing fields insert as NULL,
//! extra fields are dropped). Values run through the flattener like any
//! other nested record.

use std::sync::Arc;

use anyhow::Result;
use serde_json::{Map, Value};

use super::{import_flat_records, table_name_for, LoadOptions, Loader};
use crate::error::DataqlError;
use crate::flatten::{flatten_value, FlatRecord};
use crate::runtime;
use crate::storage::Storage;

// ---------------------------------------------------------------------------
// MongoDB
// ---------------------------------------------------------------------------

pub struct MongoLoader {
    urls: Vec<String>,
    storage: Arc<dyn Storage>,
    opts: LoadOptions,
    lines: u64,
}

impl MongoLoader {
    pub fn new(urls: Vec<String>, storage: Arc<dyn Storage>, opts: LoadOptions) -> Self {
        Self {
            urls,
            storage,
            opts,
            lines: 0,
        }
    }

    fn import_url(&mut self, url: &str) -> Result<()> {
        let (connect_url, database, collection) = split_collection(url)?;

        let client = mongodb::sync::Client::with_uri_str(&connect_url)
            .map_err(|e| DataqlError::Connect(format!("mongodb connect failed: {e}")))?;
        let coll = client
            .database(&database)
            .collection::<mongodb::bson::Document>(&collection);

        let options = (self.opts.line_limit > 0).then(|| {
            mongodb::options::FindOptions::builder()
                .limit(self.opts.line_limit as i64)
                .build()
        });
        let cursor = coll
            .find(mongodb::bson::doc! {}, options)
            .map_err(|e| DataqlError::Connect(format!("mongodb read failed: {e}")))?;

        let mut records: Vec<FlatRecord> = Vec::new();
        for document in cursor {
            let document =
                document.map_err(|e| DataqlError::Connect(format!("mongodb read failed: {e}")))?;
            let value = serde_json::to_value(&document).map_err(|e| {
                DataqlError::Format(format!("unsupported document in {collection}: {e}"))
            })?;
            records.push(flatten_value(&value, "value"));
            if self.opts.line_limit > 0 && records.len() as u64 >= self.opts.line_limit {
                break;
            }
        }

        let table = {
            let mut opts = self.opts.clone();
            if !opts.aliases.contains_key(url) && opts.collection.is_none() {
                opts.collection = Some(collection.clone());
            }
            table_name_for(url, &opts)
        };

        // Column set from the first document; sparse fields on later
        // documents are not discovered.
        let fixed_columns = records
            .first()
            .map(|first| first.keys().cloned().collect::<Vec<_>>());

        self.lines += import_flat_records(
            self.storage.as_ref(),
            &table,
            &records,
            fixed_columns,
            &self.opts,
        )?;
        Ok(())
    }
}

impl Loader for MongoLoader {
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

/// Split `mongodb://.../database/collection` into the connection URL and
/// its last two path segments.
fn split_collection(url: &str) -> Result<(String, String, String)> {
    let mut parsed = url::Url::parse(url)
        .map_err(|e| DataqlError::Resolution(format!("malformed MongoDB URL {url}: {e}")))?;
    let segments: Vec<String> = parsed
        .path_segments()
        .map(|s| s.filter(|p| !p.is_empty()).map(str::to_string).collect())
        .unwrap_or_default();
    if segments.len() < 2 {
        return Err(DataqlError::Resolution(format!(
            "malformed MongoDB URL {url}: expected mongodb://host/database/collection"
        ))
        .into());
    }
    let collection = segments[segments.len() - 1].clone();
    let database = segments[segments.len() - 2].clone();
    parsed.set_path("");
    Ok((parsed.to_string(), database, collection))
}

// ---------------------------------------------------------------------------
// DynamoDB
// ---------------------------------------------------------------------------

pub struct DynamoLoader {
    urls: Vec<String>,
    storage: Arc<dyn Storage>,
    opts: LoadOptions,
    lines: u64,
}

impl DynamoLoader {
    pub fn new(urls: Vec<String>, storage: Arc<dyn Storage>, opts: LoadOptions) -> Self {
        Self {
            urls,
            storage,
            opts,
            lines: 0,
        }
    }

    fn import_url(&mut self, url: &str) -> Result<()> {
        let source_table = url.trim_start_matches("dynamodb://").trim_matches('/');
        if source_table.is_empty() {
            return Err(DataqlError::Resolution(format!(
                "malformed DynamoDB URL {url}: expected dynamodb://table"
            ))
            .into());
        }

        let limit = self.opts.line_limit;
        let items = runtime::block_on(scan_table(source_table, limit))?;

        let mut records: Vec<FlatRecord> = Vec::new();
        for item in &items {
            records.push(flatten_value(item, "value"));
        }

        let table = {
            let mut opts = self.opts.clone();
            if !opts.aliases.contains_key(url) && opts.collection.is_none() {
                opts.collection = Some(source_table.to_string());
            }
            table_name_for(url, &opts)
        };

        let fixed_columns = records
            .first()
            .map(|first| first.keys().cloned().collect::<Vec<_>>());

        self.lines += import_flat_records(
            self.storage.as_ref(),
            &table,
            &records,
            fixed_columns,
            &self.opts,
        )?;
        Ok(())
    }
}

impl Loader for DynamoLoader {
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

async fn scan_table(table: &str, limit: u64) -> Result<Vec<Value>> {
    let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let client = aws_sdk_dynamodb::Client::new(&config);

    let mut items: Vec<Value> = Vec::new();
    let mut start_key = None;

    loop {
        let response = client
            .scan()
            .table_name(table)
            .set_exclusive_start_key(start_key.clone())
            .send()
            .await
            .map_err(|e| DataqlError::Connect(format!("DynamoDB scan of {table} failed: {e}")))?;

        for item in response.items() {
            let mut object = Map::new();
            for (key, attribute) in item {
                object.insert(key.clone(), attribute_value(attribute));
            }
            items.push(Value::Object(object));
            if limit > 0 && items.len() as u64 >= limit {
                return Ok(items);
            }
        }

        start_key = response.last_evaluated_key().cloned();
        if start_key.is_none() {
            break;
        }
    }

    Ok(items)
}

/// Convert a DynamoDB attribute into JSON.
fn attribute_value(attribute: &aws_sdk_dynamodb::types::AttributeValue) -> Value {
    use aws_sdk_dynamodb::types::AttributeValue as Attr;

    match attribute {
        Attr::S(s) => Value::String(s.clone()),
        Attr::N(n) => serde_json::from_str(n).unwrap_or_else(|_| Value::String(n.clone())),
        Attr::Bool(b) => Value::Bool(*b),
        Attr::Null(_) => Value::Null,
        Attr::L(list) => Value::Array(list.iter().map(attribute_value).collect()),
        Attr::M(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), attribute_value(v)))
                .collect(),
        ),
        Attr::Ss(set) => Value::Array(set.iter().map(|s| Value::String(s.clone())).collect()),
        Attr::Ns(set) => Value::Array(
            set.iter()
                .map(|n| serde_json::from_str(n).unwrap_or_else(|_| Value::String(n.clone())))
                .collect(),
        ),
        Attr::B(blob) => Value::String(String::from_utf8_lossy(blob.as_ref()).into_owned()),
        other => Value::String(format!("{other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_collection() {
        let (conn, db, coll) =
            split_collection("mongodb://user:pw@localhost:27017/shop/orders").unwrap();
        assert_eq!(db, "shop");
        assert_eq!(coll, "orders");
        assert!(conn.starts_with("mongodb://user:pw@localhost:27017"), "{conn}");
    }

    #[test]
    fn test_split_collection_requires_both_segments() {
        assert!(split_collection("mongodb://localhost/only_db").is_err());
    }

    #[test]
    fn test_attribute_value_scalars() {
        use aws_sdk_dynamodb::types::AttributeValue as Attr;

        assert_eq!(
            attribute_value(&Attr::S("x".to_string())),
            Value::String("x".to_string())
        );
        assert_eq!(attribute_value(&Attr::N("42".to_string())), Value::from(42));
        assert_eq!(
            attribute_value(&Attr::N("1.5".to_string())),
            Value::from(1.5)
        );
        assert_eq!(attribute_value(&Attr::Bool(true)), Value::Bool(true));
        assert_eq!(attribute_value(&Attr::Null(true)), Value::Null);
    }
}
