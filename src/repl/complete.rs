//! SQL autocompletion for the interactive loop.
//!
//! The dictionary is built once after import: SQL keywords,
//! meta-commands, table names, and column names. Context decides what is
//! offered: tables after FROM/JOIN/INTO/UPDATE/TABLE, columns after
//! SELECT/WHERE/AND/OR/BY/ON/SET or a comma, and `table.` prefixes
//! restrict columns to that table.

use ahash::AHashMap;
use rustyline::completion::{Completer, Pair};
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{Context, Helper};

use crate::storage::TableSchema;

const SQL_KEYWORDS: &[&str] = &[
    "SELECT", "FROM", "WHERE", "GROUP BY", "ORDER BY", "HAVING", "LIMIT", "OFFSET", "JOIN",
    "LEFT JOIN", "RIGHT JOIN", "INNER JOIN", "OUTER JOIN", "ON", "AS", "AND", "OR", "NOT", "IN",
    "IS", "NULL", "LIKE", "BETWEEN", "CASE", "WHEN", "THEN", "ELSE", "END", "DISTINCT", "COUNT",
    "SUM", "AVG", "MIN", "MAX", "UNION", "EXCEPT", "INTERSECT", "WITH", "INSERT", "INTO",
    "VALUES", "UPDATE", "SET", "DELETE", "CREATE", "TABLE", "DROP", "DESC", "ASC",
];

const META_COMMANDS: &[&str] = &[
    ".quit", ".exit", ".help", ".tables", ".schema", ".count", ".clear", ".version", ".pagesize",
    ".paging", ".timing", ".truncate", ".vertical",
];

const TABLE_CONTEXT: &[&str] = &["FROM", "JOIN", "INTO", "UPDATE", "TABLE"];
const COLUMN_CONTEXT: &[&str] = &["SELECT", "WHERE", "AND", "OR", "BY", "ON", "SET", ","];

/// The completion dictionary.
#[derive(Default)]
pub struct SqlCompleter {
    tables: Vec<String>,
    columns_by_table: AHashMap<String, Vec<String>>,
    all_columns: Vec<String>,
}

impl SqlCompleter {
    /// Build the dictionary from the engine's recorded schemas.
    pub fn from_schemas(schemas: &[TableSchema]) -> Self {
        let mut tables = Vec::new();
        let mut columns_by_table = AHashMap::new();
        let mut all_columns: Vec<String> = Vec::new();

        for schema in schemas {
            tables.push(schema.name.clone());
            columns_by_table.insert(schema.name.clone(), schema.columns.clone());
            for column in &schema.columns {
                if !all_columns.contains(column) {
                    all_columns.push(column.clone());
                }
            }
        }

        Self {
            tables,
            columns_by_table,
            all_columns,
        }
    }

    /// Complete the token ending at `pos`, returning the token start and
    /// the candidates.
    pub fn complete_at(&self, line: &str, pos: usize) -> (usize, Vec<Pair>) {
        let head = &line[..pos];
        let start = head
            .char_indices()
            .rev()
            .find(|(_, c)| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '.'))
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
        let token = &head[start..];

        // Meta-commands complete only as the first token of the line.
        let leading_ws = head.len() - head.trim_start().len();
        let first_token = &head[leading_ws..];
        if first_token.starts_with('.') && !first_token.contains(char::is_whitespace) {
            return (
                leading_ws,
                matching(META_COMMANDS.iter().copied(), first_token),
            );
        }

        // table.column restricts to that table's columns.
        if let Some((table, column_prefix)) = token.rsplit_once('.') {
            if let Some(columns) = self.columns_by_table.get(table) {
                let candidates = matching(columns.iter().map(String::as_str), column_prefix);
                return (start + table.len() + 1, candidates);
            }
        }

        let context = previous_word(head, start).map(|w| w.to_uppercase());
        let candidates: Vec<Pair> = match context.as_deref() {
            Some(word) if TABLE_CONTEXT.contains(&word) => {
                matching(self.tables.iter().map(String::as_str), token)
            }
            Some(word) if COLUMN_CONTEXT.contains(&word) => {
                matching(self.all_columns.iter().map(String::as_str), token)
            }
            _ => {
                let mut out = matching(SQL_KEYWORDS.iter().copied(), token);
                out.extend(matching(self.tables.iter().map(String::as_str), token));
                out
            }
        };

        (start, candidates)
    }
}

/// Last complete word before the current token; a trailing comma counts
/// as a word of its own so `SELECT a, b` keeps offering columns.
fn previous_word(head: &str, token_start: usize) -> Option<&str> {
    let before = head[..token_start].trim_end();
    if before.ends_with(',') {
        return Some(",");
    }
    before
        .rsplit(|c: char| c.is_whitespace() || c == '(')
        .find(|w| !w.is_empty())
}

fn matching<'a>(candidates: impl Iterator<Item = &'a str>, prefix: &str) -> Vec<Pair> {
    let lowered = prefix.to_lowercase();
    candidates
        .filter(|c| lowered.is_empty() || c.to_lowercase().starts_with(&lowered))
        .map(|c| Pair {
            display: c.to_string(),
            replacement: c.to_string(),
        })
        .collect()
}

/// rustyline helper wrapping the completer.
pub struct SqlHelper {
    pub completer: SqlCompleter,
}

impl Completer for SqlHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        Ok(self.completer.complete_at(line, pos))
    }
}

impl Hinter for SqlHelper {
    type Hint = String;
}

impl Highlighter for SqlHelper {}
impl Validator for SqlHelper {}
impl Helper for SqlHelper {}

#[cfg(test)]
mod tests {
    use super::*;

    fn completer() -> SqlCompleter {
        SqlCompleter::from_schemas(&[
            TableSchema {
                name: "users".to_string(),
                columns: vec!["id".to_string(), "name".to_string()],
            },
            TableSchema {
                name: "orders".to_string(),
                columns: vec!["id".to_string(), "total".to_string()],
            },
        ])
    }

    fn replacements(pairs: Vec<Pair>) -> Vec<String> {
        pairs.into_iter().map(|p| p.replacement).collect()
    }

    #[test]
    fn test_tables_after_from() {
        let c = completer();
        let (_, pairs) = c.complete_at("SELECT * FROM us", 16);
        assert_eq!(replacements(pairs), vec!["users".to_string()]);
    }

    #[test]
    fn test_columns_after_select() {
        let c = completer();
        let (_, pairs) = c.complete_at("SELECT na", 9);
        assert_eq!(replacements(pairs), vec!["name".to_string()]);
    }

    #[test]
    fn test_columns_after_comma() {
        let c = completer();
        let (_, pairs) = c.complete_at("SELECT id, to", 13);
        assert_eq!(replacements(pairs), vec!["total".to_string()]);
    }

    #[test]
    fn test_dotted_prefix_restricts_table() {
        let c = completer();
        let (start, pairs) = c.complete_at("SELECT users.na", 15);
        assert_eq!(replacements(pairs), vec!["name".to_string()]);
        assert_eq!(start, 13);
    }

    #[test]
    fn test_keywords_at_start() {
        let c = completer();
        let (_, pairs) = c.complete_at("SEL", 3);
        assert_eq!(replacements(pairs), vec!["SELECT".to_string()]);
    }
}
