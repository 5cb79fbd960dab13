//! XML loader.
//!
//! The first direct child of the root element is taken as the item
//! element; each item becomes one record, with attributes and nested
//! elements captured as flattened keys. A document whose children have
//! mixed names imports only the elements matching the first child's
//! name. A document with no items imports the root as a single record.

use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use anyhow::{Context, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_json::{Map, Value};

use super::{import_flat_records, table_name_for, LoadOptions, Loader};
use crate::error::DataqlError;
use crate::flatten::{flatten_value, FlatRecord};
use crate::storage::Storage;

pub struct XmlLoader {
    files: Vec<String>,
    storage: Arc<dyn Storage>,
    opts: LoadOptions,
    lines: u64,
}

impl XmlLoader {
    pub fn new(files: Vec<String>, storage: Arc<dyn Storage>, opts: LoadOptions) -> Self {
        Self {
            files,
            storage,
            opts,
            lines: 0,
        }
    }
}

impl Loader for XmlLoader {
    fn import(&mut self) -> Result<()> {
        for file in &self.files {
            let table = table_name_for(file, &self.opts);
            let records = read_records(file)?;
            self.lines +=
                import_flat_records(self.storage.as_ref(), &table, &records, None, &self.opts)?;
        }
        Ok(())
    }

    fn lines(&self) -> u64 {
        self.lines
    }
}

fn read_records(path: &str) -> Result<Vec<FlatRecord>> {
    let file = File::open(path).with_context(|| format!("failed to open {path}"))?;
    let mut reader = Reader::from_reader(BufReader::new(file));
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();

    // Find the root element.
    let root = loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => break e.to_owned(),
            Ok(Event::Empty(_)) | Ok(Event::Eof) => return Ok(Vec::new()),
            Ok(_) => {}
            Err(e) => {
                return Err(
                    DataqlError::Format(format!("invalid XML in {path}: {e}")).into()
                )
            }
        }
        buf.clear();
    };
    buf.clear();

    // The first direct child of the root decides the item element.
    let mut item_name: Option<Vec<u8>> = None;
    let mut items: Vec<Value> = Vec::new();
    let mut root_value: Map<String, Value> = attributes_of(&root)?;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let start = e.to_owned();
                buf.clear();
                let name = start.name().as_ref().to_vec();
                let value = read_element(&mut reader, &start, path)?;
                match &item_name {
                    None => {
                        item_name = Some(name);
                        items.push(value);
                    }
                    Some(item) if *item == name => items.push(value),
                    Some(_) => {
                        // Not an item; keep it on the root record.
                        insert_child(&mut root_value, &element_key(&name), value);
                    }
                }
            }
            Ok(Event::Empty(e)) => {
                let name = e.name().as_ref().to_vec();
                let value = Value::Object(attributes_of(&e.to_owned())?);
                match &item_name {
                    None => {
                        item_name = Some(name);
                        items.push(value);
                    }
                    Some(item) if *item == name => items.push(value),
                    Some(_) => insert_child(&mut root_value, &element_key(&name), value),
                }
                buf.clear();
            }
            Ok(Event::Text(t)) => {
                let text = t
                    .unescape()
                    .map_err(|e| DataqlError::Format(format!("invalid XML in {path}: {e}")))?;
                if !text.trim().is_empty() {
                    root_value.insert("value".to_string(), Value::String(text.into_owned()));
                }
                buf.clear();
            }
            Ok(Event::End(_)) | Ok(Event::Eof) => break,
            Ok(_) => {
                buf.clear();
            }
            Err(e) => {
                return Err(
                    DataqlError::Format(format!("invalid XML in {path}: {e}")).into()
                )
            }
        }
    }

    if items.is_empty() {
        // No items: the root itself is the single record.
        return Ok(vec![flatten_value(&Value::Object(root_value), "value")]);
    }

    Ok(items
        .iter()
        .map(|item| flatten_value(item, "value"))
        .collect())
}

/// Read one element (after its Start event) into a JSON value:
/// attributes and children become keys, text-only elements collapse to
/// their string content.
fn read_element<R: std::io::BufRead>(
    reader: &mut Reader<R>,
    start: &BytesStart<'_>,
    path: &str,
) -> Result<Value> {
    let mut object = attributes_of(start)?;
    let mut text = String::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let child_start = e.to_owned();
                buf.clear();
                let key = element_key(child_start.name().as_ref());
                let child = read_element(reader, &child_start, path)?;
                insert_child(&mut object, &key, child);
            }
            Ok(Event::Empty(e)) => {
                let key = element_key(e.name().as_ref());
                let child = Value::Object(attributes_of(&e.to_owned())?);
                insert_child(&mut object, &key, child);
                buf.clear();
            }
            Ok(Event::Text(t)) => {
                let unescaped = t
                    .unescape()
                    .map_err(|e| DataqlError::Format(format!("invalid XML in {path}: {e}")))?;
                text.push_str(&unescaped);
                buf.clear();
            }
            Ok(Event::End(_)) => break,
            Ok(Event::Eof) => {
                return Err(DataqlError::Format(format!(
                    "invalid XML in {path}: unexpected end of document"
                ))
                .into())
            }
            Ok(_) => {
                buf.clear();
            }
            Err(e) => {
                return Err(
                    DataqlError::Format(format!("invalid XML in {path}: {e}")).into()
                )
            }
        }
    }

    let trimmed = text.trim();
    if object.is_empty() {
        return Ok(Value::String(trimmed.to_string()));
    }
    if !trimmed.is_empty() {
        object.insert("value".to_string(), Value::String(trimmed.to_string()));
    }
    Ok(Value::Object(object))
}

fn attributes_of(element: &BytesStart<'_>) -> Result<Map<String, Value>> {
    let mut object = Map::new();
    for attribute in element.attributes() {
        let attribute =
            attribute.map_err(|e| DataqlError::Format(format!("invalid XML attribute: {e}")))?;
        let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
        let value = attribute
            .unescape_value()
            .map_err(|e| DataqlError::Format(format!("invalid XML attribute: {e}")))?
            .into_owned();
        object.insert(key, Value::String(value));
    }
    Ok(object)
}

fn element_key(name: &[u8]) -> String {
    String::from_utf8_lossy(name).into_owned()
}

/// Repeated child elements under the same key fold into an array; the
/// flattener later serializes arrays as JSON text.
fn insert_child(object: &mut Map<String, Value>, key: &str, value: Value) {
    match object.get_mut(key) {
        Some(Value::Array(existing)) => existing.push(value),
        Some(_) => {
            let previous = object
                .remove(key)
                .unwrap_or(Value::Null);
            object.insert(key.to_string(), Value::Array(vec![previous, value]));
        }
        None => {
            object.insert(key.to_string(), value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn records_from(xml: &str) -> Vec<FlatRecord> {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("t.xml");
        let mut file = File::create(&path).unwrap();
        file.write_all(xml.as_bytes()).unwrap();
        read_records(path.to_str().unwrap()).unwrap()
    }

    #[test]
    fn test_items_from_first_child() {
        let records = records_from(
            "<users><user id=\"1\"><name>Alice</name></user><user id=\"2\"><name>Bob</name></user></users>",
        );
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("id"), Some(&Value::String("1".into())));
        assert_eq!(records[0].get("name"), Some(&Value::String("Alice".into())));
        assert_eq!(records[1].get("name"), Some(&Value::String("Bob".into())));
    }

    #[test]
    fn test_nested_elements_flatten() {
        let records = records_from(
            "<rows><row><user><address><city>Oslo</city></address></user></row></rows>",
        );
        assert_eq!(
            records[0].get("user_address_city"),
            Some(&Value::String("Oslo".into()))
        );
    }

    #[test]
    fn test_root_without_items_is_single_record() {
        let records = records_from("<config version=\"2\">text</config>");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("version"), Some(&Value::String("2".into())));
    }

    #[test]
    fn test_repeated_children_become_array_text() {
        let records = records_from(
            "<list><item><tag>a</tag><tag>b</tag></item></list>",
        );
        let tags = records[0].get("tag").unwrap();
        assert_eq!(tags, &Value::String("[\"a\",\"b\"]".to_string()));
    }
}
