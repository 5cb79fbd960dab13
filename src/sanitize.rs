//! Deterministic mapping from filesystem, collection, and alias names to
//! safe SQL identifiers.

use std::path::Path;

/// Sanitize a raw name into a safe SQL identifier: trim, lowercase,
/// replace `.`/` `/`-` with `_`, strip everything else outside
/// `[a-z0-9_]`. Idempotent.
pub fn sanitize_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.trim().chars() {
        match c {
            '.' | ' ' | '-' => out.push('_'),
            c if c.is_ascii_alphanumeric() || c == '_' => out.push(c.to_ascii_lowercase()),
            _ => {}
        }
    }
    out
}

/// Sanitized stem of a file path (`/tmp/Data-2024.csv` -> `data_2024`).
pub fn table_name_from_path(path: &Path) -> String {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
    sanitize_name(stem)
}

/// Fallback name for a column whose header is empty after sanitization.
pub fn column_fallback(index: usize) -> String {
    format!("column_{index}")
}

/// Sanitize a column header, substituting `column_N` when nothing survives.
pub fn column_name(raw: &str, index: usize) -> String {
    let name = sanitize_name(raw);
    if name.is_empty() {
        column_fallback(index)
    } else {
        name
    }
}
