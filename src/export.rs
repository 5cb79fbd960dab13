//! Export engine: stream a query result into a file.
//!
//! CSV and JSONL write row-by-row; JSON, XML, and YAML buffer the full
//! set before encoding; Parquet goes through the arrow writer with every
//! column typed UTF-8; Excel writes a single sheet named from the file.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use serde_json::{Map, Value};

use crate::error::DataqlError;
use crate::sanitize::column_name;
use crate::storage::QueryResult;

/// Output formats accepted by `--type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
    Jsonl,
    Xml,
    Yaml,
    Excel,
    Parquet,
}

impl std::str::FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            "jsonl" | "ndjson" => Ok(ExportFormat::Jsonl),
            "xml" => Ok(ExportFormat::Xml),
            "yaml" | "yml" => Ok(ExportFormat::Yaml),
            "excel" | "xlsx" => Ok(ExportFormat::Excel),
            "parquet" => Ok(ExportFormat::Parquet),
            _ => Err(format!(
                "unknown export type: {s}. Valid: csv, json, jsonl, xml, yaml, excel, parquet"
            )),
        }
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportFormat::Csv => write!(f, "csv"),
            ExportFormat::Json => write!(f, "json"),
            ExportFormat::Jsonl => write!(f, "jsonl"),
            ExportFormat::Xml => write!(f, "xml"),
            ExportFormat::Yaml => write!(f, "yaml"),
            ExportFormat::Excel => write!(f, "excel"),
            ExportFormat::Parquet => write!(f, "parquet"),
        }
    }
}

/// Write the result to `path` in the requested format.
pub fn export(result: &QueryResult, path: &Path, format: ExportFormat) -> Result<()> {
    match format {
        ExportFormat::Csv => export_csv(result, path),
        ExportFormat::Json => export_json(result, path),
        ExportFormat::Jsonl => export_jsonl(result, path),
        ExportFormat::Xml => export_xml(result, path),
        ExportFormat::Yaml => export_yaml(result, path),
        ExportFormat::Excel => export_excel(result, path),
        ExportFormat::Parquet => export_parquet(result, path),
    }
}

fn export_csv(result: &QueryResult, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    writer.write_record(&result.columns)?;
    for row in &result.rows {
        writer.write_record(row.iter().map(|c| c.as_deref().unwrap_or("")))?;
    }
    writer.flush()?;
    Ok(())
}

fn export_jsonl(result: &QueryResult, path: &Path) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    for row in &result.rows {
        let object = row_object(result, row);
        serde_json::to_writer(&mut writer, &object)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

fn export_json(result: &QueryResult, path: &Path) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let rows: Vec<Value> = result
        .rows
        .iter()
        .map(|row| Value::Object(row_object(result, row)))
        .collect();
    serde_json::to_writer_pretty(BufWriter::new(file), &rows)?;
    Ok(())
}

fn export_yaml(result: &QueryResult, path: &Path) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let rows: Vec<Value> = result
        .rows
        .iter()
        .map(|row| Value::Object(row_object(result, row)))
        .collect();
    serde_yaml_ng::to_writer(BufWriter::new(file), &rows)
        .map_err(|e| DataqlError::Format(format!("YAML export failed: {e}")))?;
    Ok(())
}

fn export_xml(result: &QueryResult, path: &Path) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = quick_xml::Writer::new_with_indent(BufWriter::new(file), b' ', 2);

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    writer.write_event(Event::Start(BytesStart::new("results")))?;

    // Column names can be arbitrary SQL expressions; element names cannot.
    let elements: Vec<String> = result
        .columns
        .iter()
        .enumerate()
        .map(|(i, c)| column_name(c, i))
        .collect();

    for row in &result.rows {
        writer.write_event(Event::Start(BytesStart::new("row")))?;
        for (element, cell) in elements.iter().zip(row.iter()) {
            writer.write_event(Event::Start(BytesStart::new(element.as_str())))?;
            if let Some(text) = cell {
                writer.write_event(Event::Text(BytesText::new(text)))?;
            }
            writer.write_event(Event::End(BytesEnd::new(element.as_str())))?;
        }
        writer.write_event(Event::End(BytesEnd::new("row")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("results")))?;
    writer.into_inner().flush()?;
    Ok(())
}

fn export_excel(result: &QueryResult, path: &Path) -> Result<()> {
    let mut workbook = rust_xlsxwriter::Workbook::new();
    let worksheet = workbook.add_worksheet();

    let sheet_name = sheet_name_for(path);
    worksheet
        .set_name(&sheet_name)
        .map_err(|e| DataqlError::Format(format!("Excel export failed: {e}")))?;

    for (col, name) in result.columns.iter().enumerate() {
        worksheet
            .write_string(0, col as u16, name)
            .map_err(|e| DataqlError::Format(format!("Excel export failed: {e}")))?;
    }
    for (r, row) in result.rows.iter().enumerate() {
        for (c, cell) in row.iter().enumerate() {
            worksheet
                .write_string((r + 1) as u32, c as u16, cell.as_deref().unwrap_or(""))
                .map_err(|e| DataqlError::Format(format!("Excel export failed: {e}")))?;
        }
    }

    workbook
        .save(path)
        .map_err(|e| DataqlError::Format(format!("Excel export failed: {e}")))?;
    Ok(())
}

/// Excel limits sheet names to 31 characters.
fn sheet_name_for(path: &Path) -> String {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("results");
    let mut name: String = stem.chars().take(31).collect();
    if name.is_empty() {
        name = "results".to_string();
    }
    name
}

fn export_parquet(result: &QueryResult, path: &Path) -> Result<()> {
    use arrow::array::{ArrayRef, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use arrow::record_batch::RecordBatch;
    use parquet::arrow::ArrowWriter;

    let fields: Vec<Field> = result
        .columns
        .iter()
        .map(|c| Field::new(c, DataType::Utf8, true))
        .collect();
    let schema = Arc::new(Schema::new(fields));

    let arrays: Vec<ArrayRef> = (0..result.columns.len())
        .map(|i| {
            let values: Vec<Option<&str>> = result
                .rows
                .iter()
                .map(|row| row.get(i).and_then(|c| c.as_deref()))
                .collect();
            Arc::new(StringArray::from(values)) as ArrayRef
        })
        .collect();

    let batch = RecordBatch::try_new(Arc::clone(&schema), arrays)
        .map_err(|e| DataqlError::Format(format!("Parquet export failed: {e}")))?;

    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = ArrowWriter::try_new(file, schema, None)
        .map_err(|e| DataqlError::Format(format!("Parquet export failed: {e}")))?;
    writer
        .write(&batch)
        .map_err(|e| DataqlError::Format(format!("Parquet export failed: {e}")))?;
    writer
        .close()
        .map_err(|e| DataqlError::Format(format!("Parquet export failed: {e}")))?;
    Ok(())
}

/// One result row as a JSON object, re-typing numeric and boolean text.
fn row_object(result: &QueryResult, row: &[Option<String>]) -> Map<String, Value> {
    result
        .columns
        .iter()
        .zip(row.iter())
        .map(|(column, cell)| (column.clone(), json_cell(cell)))
        .collect()
}

/// Convert a rendered cell back to a typed JSON value.
fn json_cell(cell: &Option<String>) -> Value {
    let Some(text) = cell else {
        return Value::Null;
    };
    if let Ok(n) = text.parse::<i64>() {
        return Value::from(n);
    }
    if let Ok(f) = text.parse::<f64>() {
        if f.is_finite() && text.chars().any(|c| c.is_ascii_digit()) {
            if let Some(number) = serde_json::Number::from_f64(f) {
                return Value::Number(number);
            }
        }
    }
    if text.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if text.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }
    Value::String(text.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn sample_result() -> QueryResult {
        QueryResult {
            columns: vec!["id".to_string(), "name".to_string()],
            column_types: vec!["BIGINT".to_string(), "VARCHAR".to_string()],
            rows: vec![
                vec![Some("1".to_string()), Some("Alice".to_string())],
                vec![Some("2".to_string()), None],
            ],
            execution_time_secs: 0.0,
        }
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!(ExportFormat::from_str("CSV").unwrap(), ExportFormat::Csv);
        assert_eq!(ExportFormat::from_str("xlsx").unwrap(), ExportFormat::Excel);
        assert_eq!(ExportFormat::from_str("ndjson").unwrap(), ExportFormat::Jsonl);
        assert!(ExportFormat::from_str("bmp").is_err());
    }

    #[test]
    fn test_csv_export() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        export_csv(&sample_result(), &path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("id,name\n"));
        assert!(content.contains("1,Alice"));
    }

    #[test]
    fn test_jsonl_export_types_cells() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("out.jsonl");
        export_jsonl(&sample_result(), &path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        let first: Value = serde_json::from_str(content.lines().next().unwrap()).unwrap();
        assert_eq!(first["id"], Value::from(1));
        assert_eq!(first["name"], Value::from("Alice"));
        let second: Value = serde_json::from_str(content.lines().nth(1).unwrap()).unwrap();
        assert_eq!(second["name"], Value::Null);
    }

    #[test]
    fn test_xml_export() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("out.xml");
        export_xml(&sample_result(), &path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("<results>"));
        assert!(content.contains("<name>Alice</name>"));
    }

    #[test]
    fn test_sheet_name_is_bounded() {
        let long = "a".repeat(64);
        let path = std::path::PathBuf::from(format!("{long}.xlsx"));
        assert_eq!(sheet_name_for(&path).len(), 31);
    }

    #[test]
    fn test_json_cell() {
        assert_eq!(json_cell(&None), Value::Null);
        assert_eq!(json_cell(&Some("42".to_string())), Value::from(42));
        assert_eq!(json_cell(&Some("1.5".to_string())), Value::from(1.5));
        assert_eq!(json_cell(&Some("true".to_string())), Value::Bool(true));
        assert_eq!(
            json_cell(&Some("hello".to_string())),
            Value::from("hello")
        );
    }
}
