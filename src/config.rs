//! Run configuration and input-token parsing.
//!
//! The CLI layer owns flag parsing; everything downstream consumes this
//! record. Input tokens arrive as `path` or `path:alias`, where the alias
//! is only split off when the tail after the last `:` contains neither
//! `/` nor `\`, which keeps Windows drive letters and URL schemes intact.

use std::path::PathBuf;

use anyhow::Result;

use crate::error::DataqlError;
use crate::export::ExportFormat;

/// The stdin sentinel accepted as an input path.
pub const STDIN_SENTINEL: &str = "-";

/// Everything a run needs, constructed once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Raw input tokens (`path` or `path:alias`).
    pub inputs: Vec<String>,
    /// CSV field delimiter.
    pub delimiter: u8,
    /// One-shot SQL; empty means interactive.
    pub query: Option<String>,
    pub export_path: Option<PathBuf>,
    pub export_type: Option<ExportFormat>,
    /// Persistent engine file; `None` means ephemeral in-memory.
    pub store_path: Option<PathBuf>,
    /// Per-file row cap; 0 = unlimited.
    pub line_limit: u64,
    /// Table-name override.
    pub collection: Option<String>,
    /// Format assumed for stdin input.
    pub stdin_format: String,
    /// Truncate rendered cells at this many characters; 0 disables.
    pub truncate: usize,
    pub vertical: bool,
    pub paging: bool,
    pub page_size: usize,
    pub timing: bool,
    /// Ordered `name=value` query parameters.
    pub query_params: Vec<(String, String)>,
    pub verbose: bool,
    pub quiet: bool,
    /// Skip type inference: every column is imported as VARCHAR.
    pub no_schema: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            inputs: Vec::new(),
            delimiter: b',',
            query: None,
            export_path: None,
            export_type: None,
            store_path: None,
            line_limit: 0,
            collection: None,
            stdin_format: "csv".to_string(),
            truncate: 0,
            vertical: false,
            paging: false,
            page_size: 100,
            timing: false,
            query_params: Vec::new(),
            verbose: false,
            quiet: false,
            no_schema: false,
        }
    }
}

/// Split an input token into `(path, alias)`.
///
/// The alias is the portion after the last `:` iff it is non-empty and
/// contains no path separator. `C:\data.csv` and `s3://bucket/key` stay
/// whole; `data.csv:people` splits.
pub fn parse_input_token(token: &str) -> (String, Option<String>) {
    if let Some(idx) = token.rfind(':') {
        let (path, tail) = (&token[..idx], &token[idx + 1..]);
        if !path.is_empty()
            && !tail.is_empty()
            && !tail.contains('/')
            && !tail.contains('\\')
        {
            return (path.to_string(), Some(tail.to_string()));
        }
    }
    (token.to_string(), None)
}

/// Parse a `name=value` query parameter.
pub fn parse_query_param(raw: &str) -> Result<(String, String)> {
    match raw.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.to_string()))
        }
        _ => Err(DataqlError::Config(format!(
            "invalid query parameter {raw:?}: expected name=value"
        ))
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_with_alias() {
        assert_eq!(
            parse_input_token("data.csv:people"),
            ("data.csv".to_string(), Some("people".to_string()))
        );
    }

    #[test]
    fn test_token_without_alias() {
        assert_eq!(parse_input_token("data.csv"), ("data.csv".to_string(), None));
    }

    #[test]
    fn test_windows_path_is_not_split() {
        assert_eq!(
            parse_input_token(r"C:\data\users.csv"),
            (r"C:\data\users.csv".to_string(), None)
        );
        assert_eq!(
            parse_input_token(r"C:\data\users.csv:people"),
            (r"C:\data\users.csv".to_string(), Some("people".to_string()))
        );
    }

    #[test]
    fn test_url_is_not_split() {
        assert_eq!(
            parse_input_token("s3://bucket/key.csv"),
            ("s3://bucket/key.csv".to_string(), None)
        );
        assert_eq!(
            parse_input_token("s3://bucket/key.csv:orders"),
            ("s3://bucket/key.csv".to_string(), Some("orders".to_string()))
        );
        assert_eq!(
            parse_input_token("postgres://u:p@host:5432/db/t"),
            ("postgres://u:p@host:5432/db/t".to_string(), None)
        );
    }

    #[test]
    fn test_trailing_colon_is_kept() {
        assert_eq!(parse_input_token("data.csv:"), ("data.csv:".to_string(), None));
    }

    #[test]
    fn test_stdin_with_alias() {
        assert_eq!(
            parse_input_token("-:events"),
            ("-".to_string(), Some("events".to_string()))
        );
    }

    #[test]
    fn test_query_param_parsing() {
        assert_eq!(
            parse_query_param("n=O'Brien").unwrap(),
            ("n".to_string(), "O'Brien".to_string())
        );
        assert_eq!(
            parse_query_param("empty=").unwrap(),
            ("empty".to_string(), String::new())
        );
        assert!(parse_query_param("novalue").is_err());
        assert!(parse_query_param("=x").is_err());
    }
}
