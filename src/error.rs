//! User-facing error kinds and exit-code mapping.
//!
//! Internal plumbing uses `anyhow` with context; the variants here mark
//! the points where an error crosses into user territory and decide the
//! process exit code. The query classifier appends a hint when the engine
//! rejects a statement that looks like a misspelled table reference.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DataqlError {
    #[error("invalid arguments: {0}")]
    Config(String),

    #[error("resolution failed: {0}")]
    Resolution(String),

    #[error("format error: {0}")]
    Format(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("file not found: {0}")]
    NotFound(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl DataqlError {
    /// Process exit code for this error kind.
    pub fn exit_code(&self) -> i32 {
        match self {
            DataqlError::Config(_) => 2,
            DataqlError::NotFound(_) => 3,
            DataqlError::Resolution(_) | DataqlError::Connect(_) => 4,
            DataqlError::Query(_) | DataqlError::Schema(_) => 5,
            DataqlError::Format(_) | DataqlError::Io(_) | DataqlError::Internal(_) => 1,
        }
    }
}

/// Exit code for an arbitrary error chain: the first `DataqlError` in the
/// chain decides; anything else is a general failure.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<DataqlError>() {
            return e.exit_code();
        }
    }
    1
}

/// Wrap an engine error message with a hint when it names a missing
/// table, listing the tables that are actually loaded.
pub fn classify_query_error(message: &str, known_tables: &[String]) -> String {
    let lowered = message.to_lowercase();
    let looks_like_missing =
        lowered.contains("does not exist") || lowered.contains("not found") || lowered.contains("catalog");

    if !looks_like_missing || known_tables.is_empty() {
        return message.to_string();
    }

    let mut hint = String::new();
    if let Some(missing) = quoted_identifier(message) {
        if let Some(closest) = closest_table(&missing, known_tables) {
            hint = format!(" Did you mean table \"{closest}\"?");
        }
    }

    format!(
        "{message}{hint} Loaded tables: {}.",
        known_tables.join(", ")
    )
}

/// Extract the first quoted identifier out of an engine error message.
fn quoted_identifier(message: &str) -> Option<String> {
    let start = message.find('"')?;
    let rest = &message[start + 1..];
    let end = rest.find('"')?;
    let name = &rest[..end];
    (!name.is_empty()).then(|| name.to_string())
}

fn closest_table(missing: &str, tables: &[String]) -> Option<String> {
    let needle = missing.to_lowercase();
    tables
        .iter()
        .find(|t| {
            let hay = t.to_lowercase();
            hay.contains(&needle) || needle.contains(&hay)
        })
        .cloned()
}
