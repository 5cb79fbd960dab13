//! Interactive query loop.
//!
//! Reads lines with history and autocompletion, dispatches meta-commands
//! (both the dotted and backslash spellings), substitutes query
//! parameters, and renders results either whole or through the paging
//! state machine. Errors never leave the loop; they print to stderr and
//! the prompt returns.

mod complete;
mod render;

pub use complete::{SqlCompleter, SqlHelper};
pub use render::{render_result, render_table, render_vertical, truncate_cell, RenderOptions};

use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::Result;
use rustyline::error::ReadlineError;
use rustyline::history::FileHistory;
use rustyline::{CompletionType, Config as LineConfig, Editor};

use crate::config::Config;
use crate::error::classify_query_error;
use crate::params;
use crate::storage::Storage;

/// The four paging states; `Prompt` only fires when the one-row
/// lookahead proves another page exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PageState {
    AccumulatePage,
    FlushPage,
    Prompt,
    Done,
}

pub struct Repl<'a> {
    storage: &'a dyn Storage,
    options: RenderOptions,
    query_params: Vec<(String, String)>,
}

impl<'a> Repl<'a> {
    pub fn new(storage: &'a dyn Storage, config: &Config) -> Self {
        Self {
            storage,
            options: RenderOptions {
                truncate: config.truncate,
                vertical: config.vertical,
                paging: config.paging,
                page_size: config.page_size.max(1),
                timing: config.timing,
            },
            query_params: config.query_params.clone(),
        }
    }

    /// Run the loop until `.exit`, `\q`, or EOF.
    pub fn run(&mut self) -> Result<()> {
        let line_config = LineConfig::builder()
            .completion_type(CompletionType::List)
            .build();
        let mut editor: Editor<SqlHelper, FileHistory> = Editor::with_config(line_config)?;

        // A failed dictionary build only costs completion, not the REPL.
        match self.storage.tables() {
            Ok(schemas) => editor.set_helper(Some(SqlHelper {
                completer: SqlCompleter::from_schemas(&schemas),
            })),
            Err(e) => eprintln!("Warning: autocomplete unavailable: {e}"),
        }

        let history_path = history_path();
        let _ = editor.load_history(&history_path);

        println!("dataql {} interactive SQL", env!("CARGO_PKG_VERSION"));
        println!("Type .help for commands, .exit to quit");
        println!();

        loop {
            match editor.readline("dataql> ") {
                Ok(line) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    let _ = editor.add_history_entry(trimmed);

                    if trimmed.starts_with('.') || trimmed.starts_with('\\') {
                        if self.handle_meta(trimmed)? {
                            break;
                        }
                        continue;
                    }

                    self.execute(trimmed);
                }
                Err(ReadlineError::Interrupted) => {
                    // ^C discards the current buffer.
                    println!("^C");
                    continue;
                }
                Err(ReadlineError::Eof) => break,
                Err(e) => {
                    eprintln!("Error: {e}");
                    break;
                }
            }
        }

        if let Some(parent) = history_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let _ = editor.save_history(&history_path);
        Ok(())
    }

    /// Execute one SQL statement; errors print and the loop continues.
    fn execute(&self, sql: &str) {
        let substituted = params::substitute(sql, &self.query_params);
        match self.storage.query(&substituted) {
            Ok(result) => {
                let stdout = std::io::stdout();
                let stdin = std::io::stdin();
                if let Err(e) = render_paged(
                    &result.columns,
                    result.rows.clone(),
                    &self.options,
                    &mut stdout.lock(),
                    &mut stdin.lock(),
                ) {
                    eprintln!("Error: {e}");
                }
                if self.options.timing {
                    eprintln!("({:.3}s)", result.execution_time_secs);
                }
            }
            Err(e) => {
                let tables: Vec<String> = self
                    .storage
                    .tables()
                    .map(|ts| ts.into_iter().map(|t| t.name).collect())
                    .unwrap_or_default();
                eprintln!("Error: {}", classify_query_error(&format!("{e:#}"), &tables));
            }
        }
    }

    /// Handle a meta-command; returns true when the loop should exit.
    fn handle_meta(&mut self, input: &str) -> Result<bool> {
        let parts: Vec<&str> = input.split_whitespace().collect();
        let command = parts.first().map(|c| c.to_lowercase()).unwrap_or_default();

        match command.as_str() {
            "\\q" | ".quit" | ".exit" => return Ok(true),
            "\\h" | ".help" | "\\?" => self.print_help(),
            "\\d" | ".tables" => self.list_tables(),
            "\\dt" | ".schema" => match parts.get(1) {
                Some(table) => self.describe_table(table),
                None => eprintln!("Usage: .schema <table>"),
            },
            "\\c" | ".count" => match parts.get(1) {
                Some(table) => self.count_table(table),
                None => eprintln!("Usage: .count <table>"),
            },
            ".clear" => print!("\x1b[2J\x1b[H"),
            ".version" => println!("dataql {}", env!("CARGO_PKG_VERSION")),
            ".pagesize" => match parts.get(1).and_then(|v| v.parse::<usize>().ok()) {
                Some(size) if size > 0 => {
                    self.options.page_size = size;
                    println!("Page size set to {size}");
                }
                _ => eprintln!("Usage: .pagesize <positive integer>"),
            },
            ".paging" => match parts.get(1).map(|v| v.to_lowercase()).as_deref() {
                Some("on") => self.options.paging = true,
                Some("off") => self.options.paging = false,
                _ => eprintln!("Usage: .paging on|off"),
            },
            ".timing" => match parts.get(1).map(|v| v.to_lowercase()).as_deref() {
                Some("on") => self.options.timing = true,
                Some("off") => self.options.timing = false,
                _ => eprintln!("Usage: .timing on|off"),
            },
            ".truncate" => match parts.get(1).and_then(|v| v.parse::<usize>().ok()) {
                Some(limit) => {
                    self.options.truncate = limit;
                    if limit == 0 {
                        println!("Truncation disabled");
                    } else {
                        println!("Truncating cells at {limit} characters");
                    }
                }
                None => eprintln!("Usage: .truncate <n> (0 disables)"),
            },
            ".vertical" => match parts.get(1).map(|v| v.to_lowercase()).as_deref() {
                Some("on") => self.options.vertical = true,
                Some("off") => self.options.vertical = false,
                _ => eprintln!("Usage: .vertical on|off"),
            },
            "\\g" => {
                self.options.vertical = !self.options.vertical;
                println!(
                    "Rendering: {}",
                    if self.options.vertical { "vertical" } else { "tabular" }
                );
            }
            other => {
                eprintln!("Unknown command: {other}. Type .help for available commands.");
            }
        }

        Ok(false)
    }

    fn print_help(&self) {
        println!("Available commands:");
        println!("  \\d, .tables           List loaded tables");
        println!("  \\dt, .schema <table>  Describe a table");
        println!("  \\c, .count <table>    Count rows in a table");
        println!("  .pagesize <n>         Set rows per page");
        println!("  .paging on|off        Toggle pagination");
        println!("  .timing on|off        Toggle elapsed-time reporting");
        println!("  .truncate <n>         Truncate cells at n chars (0 disables)");
        println!("  .vertical on|off, \\G  Tabular or key-per-line rendering");
        println!("  .clear                Clear the terminal");
        println!("  .version              Print version");
        println!("  \\q, .quit, .exit      Exit");
        println!();
    }

    fn list_tables(&self) {
        match self.storage.tables() {
            Ok(schemas) if schemas.is_empty() => println!("No tables loaded."),
            Ok(schemas) => {
                for schema in schemas {
                    println!("  {} ({} columns)", schema.name, schema.columns.len());
                }
            }
            Err(e) => eprintln!("Error: {e:#}"),
        }
    }

    fn describe_table(&self, table: &str) {
        let escaped = table.replace('\'', "''");
        let sql = format!(
            "SELECT column_name, data_type FROM information_schema.columns WHERE table_name = '{escaped}' ORDER BY ordinal_position"
        );
        match self.storage.query(&sql) {
            Ok(result) if result.is_empty() => eprintln!("Unknown table: {table}"),
            Ok(result) => print!("{}", render_table(&result.columns, &result.rows, 0)),
            Err(e) => eprintln!("Error: {e:#}"),
        }
    }

    fn count_table(&self, table: &str) {
        let sql = format!(
            "SELECT COUNT(*) AS count FROM {}",
            crate::storage::quote_ident(table)
        );
        match self.storage.query(&sql) {
            Ok(result) => {
                if let Some(cell) = result.rows.first().and_then(|r| r.first()) {
                    println!("{}", cell.as_deref().unwrap_or("0"));
                }
            }
            Err(e) => eprintln!("Error: {e:#}"),
        }
    }
}

/// REPL history lives under `$HOME/.dataql/`, falling back to the OS
/// temp directory.
fn history_path() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".dataql").join("history"))
        .unwrap_or_else(|| std::env::temp_dir().join("dataql_history"))
}

/// Render rows, paging when enabled.
///
/// The paging machine accumulates a page, renders it, then fetches one
/// more row before prompting: if the lookahead comes back empty the
/// prompt is skipped entirely, otherwise the fetched row seeds the next
/// page.
pub fn render_paged<W: Write, R: BufRead>(
    columns: &[String],
    rows: Vec<Vec<Option<String>>>,
    options: &RenderOptions,
    out: &mut W,
    input: &mut R,
) -> Result<()> {
    if !options.paging {
        let rendered = if options.vertical {
            render_vertical(columns, &rows, options.truncate, 0)
        } else {
            render_table(columns, &rows, options.truncate)
        };
        write!(out, "{rendered}")?;
        return Ok(());
    }

    let mut iter = rows.into_iter();
    let mut page: Vec<Vec<Option<String>>> = Vec::with_capacity(options.page_size);
    let mut lookahead: Option<Vec<Option<String>>> = None;
    let mut rendered_rows = 0usize;
    let mut page_number = 0usize;
    let mut state = PageState::AccumulatePage;

    loop {
        match state {
            PageState::AccumulatePage => {
                if let Some(seed) = lookahead.take() {
                    page.push(seed);
                }
                while page.len() < options.page_size {
                    match iter.next() {
                        Some(row) => page.push(row),
                        None => break,
                    }
                }
                state = PageState::FlushPage;
            }
            PageState::FlushPage => {
                page_number += 1;
                let rendered = if options.vertical {
                    render_vertical(columns, &page, options.truncate, rendered_rows)
                } else {
                    render_table(columns, &page, options.truncate)
                };
                write!(out, "{rendered}")?;
                rendered_rows += page.len();
                page.clear();

                // One-row lookahead decides whether to prompt at all.
                lookahead = iter.next();
                state = if lookahead.is_some() {
                    PageState::Prompt
                } else {
                    PageState::Done
                };
            }
            PageState::Prompt => {
                write!(out, "-- Page {page_number} -- Enter=more, q=quit -- ")?;
                out.flush()?;
                let mut answer = String::new();
                input.read_line(&mut answer)?;
                state = if answer.trim().eq_ignore_ascii_case("q") {
                    PageState::Done
                } else {
                    PageState::AccumulatePage
                };
            }
            PageState::Done => return Ok(()),
        }
    }
}
