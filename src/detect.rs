//! Format detection from paths and URL schemes.
//!
//! URL schemes take precedence over file extensions; compression
//! extensions are transparent (the wrapped extension decides). A batch of
//! inputs with differing formats detects as [`Format::Mixed`] and is
//! dispatched through the composite loader.

use anyhow::Result;
use std::path::Path;

use crate::error::DataqlError;

/// Relational engines reachable through a connection URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DbKind {
    Postgres,
    Mysql,
    Duckdb,
}

/// Message brokers reachable through a connection URL. Only SQS and Kafka
/// have peek readers; the rest are recognized so they can be rejected
/// with a message naming the scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueKind {
    Sqs,
    Kafka,
    Rabbitmq,
    Amqp,
    Pulsar,
    Pubsub,
}

impl QueueKind {
    pub fn scheme(&self) -> &'static str {
        match self {
            QueueKind::Sqs => "sqs",
            QueueKind::Kafka => "kafka",
            QueueKind::Rabbitmq => "rabbitmq",
            QueueKind::Amqp => "amqp",
            QueueKind::Pulsar => "pulsar",
            QueueKind::Pubsub => "pubsub",
        }
    }
}

/// Input formats the loaders understand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    Csv,
    Json,
    Jsonl,
    Xml,
    Yaml,
    Excel,
    Parquet,
    Avro,
    Orc,
    Sqlite,
    Database(DbKind),
    Mongo,
    Dynamo,
    Queue(QueueKind),
    /// Sentinel for a heterogeneous batch; resolved per file by the
    /// composite loader.
    Mixed,
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Format::Csv => "csv",
            Format::Json => "json",
            Format::Jsonl => "jsonl",
            Format::Xml => "xml",
            Format::Yaml => "yaml",
            Format::Excel => "excel",
            Format::Parquet => "parquet",
            Format::Avro => "avro",
            Format::Orc => "orc",
            Format::Sqlite => "sqlite",
            Format::Database(DbKind::Postgres) => "postgres",
            Format::Database(DbKind::Mysql) => "mysql",
            Format::Database(DbKind::Duckdb) => "duckdb",
            Format::Mongo => "mongodb",
            Format::Dynamo => "dynamodb",
            Format::Queue(kind) => kind.scheme(),
            Format::Mixed => "mixed",
        };
        write!(f, "{name}")
    }
}

const COMPRESSION_EXTENSIONS: &[&str] = &["gz", "gzip", "bz2", "xz", "zst", "zstd"];

/// Whether the path carries a compression extension handled by the
/// decompression resolver.
pub fn is_compressed(path: &str) -> bool {
    extension_of(path)
        .map(|ext| COMPRESSION_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

fn extension_of(path: &str) -> Option<String> {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}

/// Detect the format of a single input (local path or connection URL).
pub fn detect(input: &str) -> Result<Format> {
    if let Some(format) = detect_scheme(input) {
        return Ok(format);
    }

    // Compression wrappers are transparent: data.csv.gz detects as CSV.
    let mut path = input.to_string();
    while is_compressed(&path) {
        match Path::new(&path).file_stem().and_then(|s| s.to_str()) {
            Some(stem) => {
                let parent = Path::new(&path).parent().map(|p| p.to_path_buf());
                path = match parent {
                    Some(p) if !p.as_os_str().is_empty() => {
                        p.join(stem).to_string_lossy().into_owned()
                    }
                    _ => stem.to_string(),
                };
            }
            None => break,
        }
    }

    match extension_of(&path).as_deref() {
        Some("csv") => Ok(Format::Csv),
        Some("json") => Ok(Format::Json),
        Some("jsonl" | "ndjson") => Ok(Format::Jsonl),
        Some("xml") => Ok(Format::Xml),
        Some("yaml" | "yml") => Ok(Format::Yaml),
        Some("xlsx" | "xls" | "xlsm") => Ok(Format::Excel),
        Some("parquet" | "pq") => Ok(Format::Parquet),
        Some("avro") => Ok(Format::Avro),
        Some("orc") => Ok(Format::Orc),
        Some("db" | "sqlite" | "sqlite3") => Ok(Format::Sqlite),
        _ => Err(DataqlError::Format(format!(
            "unsupported input format: {input}"
        ))
        .into()),
    }
}

fn detect_scheme(input: &str) -> Option<Format> {
    let scheme = input.split_once("://").map(|(s, _)| s.to_lowercase())?;
    match scheme.as_str() {
        "postgres" | "postgresql" => Some(Format::Database(DbKind::Postgres)),
        "mysql" => Some(Format::Database(DbKind::Mysql)),
        "duckdb" => Some(Format::Database(DbKind::Duckdb)),
        "mongodb" | "mongodb+srv" => Some(Format::Mongo),
        "dynamodb" => Some(Format::Dynamo),
        "sqs" => Some(Format::Queue(QueueKind::Sqs)),
        "kafka" => Some(Format::Queue(QueueKind::Kafka)),
        "rabbitmq" => Some(Format::Queue(QueueKind::Rabbitmq)),
        "amqp" => Some(Format::Queue(QueueKind::Amqp)),
        "pulsar" => Some(Format::Queue(QueueKind::Pulsar)),
        "pubsub" => Some(Format::Queue(QueueKind::Pubsub)),
        _ => None,
    }
}

/// Detect the format for a whole batch: a single shared format, or
/// [`Format::Mixed`] when the inputs disagree.
pub fn detect_batch(inputs: &[String]) -> Result<Format> {
    let mut detected: Option<Format> = None;
    for input in inputs {
        let format = detect(input)?;
        match detected {
            None => detected = Some(format),
            Some(prev) if prev == format => {}
            Some(_) => return Ok(Format::Mixed),
        }
    }
    detected.ok_or_else(|| DataqlError::Config("no inputs supplied".to_string()).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_extensions() {
        assert_eq!(detect("data.csv").unwrap(), Format::Csv);
        assert_eq!(detect("/tmp/Data.JSON").unwrap(), Format::Json);
        assert_eq!(detect("x.ndjson").unwrap(), Format::Jsonl);
        assert_eq!(detect("report.xlsx").unwrap(), Format::Excel);
        assert_eq!(detect("part-0001.pq").unwrap(), Format::Parquet);
        assert_eq!(detect("app.sqlite3").unwrap(), Format::Sqlite);
    }

    #[test]
    fn test_detect_compression_transparent() {
        assert_eq!(detect("data.csv.gz").unwrap(), Format::Csv);
        assert_eq!(detect("logs.jsonl.zst").unwrap(), Format::Jsonl);
        assert_eq!(detect("dump.xml.bz2").unwrap(), Format::Xml);
    }

    #[test]
    fn test_detect_schemes() {
        assert_eq!(
            detect("postgres://u:p@localhost:5432/db/users").unwrap(),
            Format::Database(DbKind::Postgres)
        );
        assert_eq!(
            detect("postgresql://localhost/db/t").unwrap(),
            Format::Database(DbKind::Postgres)
        );
        assert_eq!(detect("mongodb+srv://c/db/coll").unwrap(), Format::Mongo);
        assert_eq!(detect("dynamodb://events").unwrap(), Format::Dynamo);
        assert_eq!(detect("sqs://my-queue").unwrap(), Format::Queue(QueueKind::Sqs));
        assert_eq!(
            detect("kafka://localhost:9092/topic").unwrap(),
            Format::Queue(QueueKind::Kafka)
        );
        assert_eq!(
            detect("pulsar://host/topic").unwrap(),
            Format::Queue(QueueKind::Pulsar)
        );
    }

    #[test]
    fn test_detect_unknown_is_error() {
        assert!(detect("data.bin").is_err());
        assert!(detect("noextension").is_err());
    }

    #[test]
    fn test_detect_batch() {
        let same = vec!["a.csv".to_string(), "b.csv".to_string()];
        assert_eq!(detect_batch(&same).unwrap(), Format::Csv);

        let mixed = vec!["a.csv".to_string(), "b.json".to_string()];
        assert_eq!(detect_batch(&mixed).unwrap(), Format::Mixed);
    }
}
