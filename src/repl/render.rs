//! Result rendering: tabular and vertical modes, cell truncation.

use crate::storage::QueryResult;

/// Render settings shared by the REPL and the one-shot query path.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Truncate cells at this many characters; 0 disables.
    pub truncate: usize,
    pub vertical: bool,
    pub paging: bool,
    pub page_size: usize,
    pub timing: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            truncate: 0,
            vertical: false,
            paging: false,
            page_size: 100,
            timing: false,
        }
    }
}

const NULL_TEXT: &str = "NULL";
/// Hard cap on a rendered column's width.
const MAX_COLUMN_WIDTH: usize = 50;
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// Replace the suffix of a cell exceeding `limit` characters with `...`.
pub fn truncate_cell(text: &str, limit: usize) -> String {
    if limit == 0 || text.chars().count() <= limit {
        return text.to_string();
    }
    let kept: String = text.chars().take(limit).collect();
    format!("{kept}...")
}

fn cell_text(cell: &Option<String>, truncate: usize) -> String {
    match cell {
        Some(text) => truncate_cell(text, truncate),
        None => NULL_TEXT.to_string(),
    }
}

/// Clip to the rendering width cap, char-safe.
fn clip(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let mut kept: String = text.chars().take(width.saturating_sub(1)).collect();
    kept.push('…');
    kept
}

/// Render rows as an ASCII table with a bold header.
pub fn render_table(columns: &[String], rows: &[Vec<Option<String>>], truncate: usize) -> String {
    if columns.is_empty() {
        return String::new();
    }

    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| row.iter().map(|c| cell_text(c, truncate)).collect())
        .collect();

    let mut widths: Vec<usize> = columns.iter().map(|c| c.chars().count()).collect();
    for row in &cells {
        for (i, value) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(value.chars().count());
            }
        }
    }
    widths.iter_mut().for_each(|w| *w = (*w).min(MAX_COLUMN_WIDTH));

    let mut output = String::new();
    border(&mut output, &widths, '┌', '┬', '┐');

    // Header row, bold.
    output.push('│');
    for (i, column) in columns.iter().enumerate() {
        let clipped = clip(column, widths[i]);
        let padding = widths[i].saturating_sub(clipped.chars().count());
        output.push_str(&format!(
            " {BOLD}{clipped}{RESET}{} │",
            " ".repeat(padding)
        ));
    }
    output.push('\n');

    border(&mut output, &widths, '├', '┼', '┤');

    for row in &cells {
        output.push('│');
        for (i, value) in row.iter().enumerate() {
            if i < widths.len() {
                let clipped = clip(value, widths[i]);
                let padding = widths[i].saturating_sub(clipped.chars().count());
                output.push_str(&format!(" {clipped}{} │", " ".repeat(padding)));
            }
        }
        output.push('\n');
    }

    border(&mut output, &widths, '└', '┴', '┘');

    output.push_str(&format!(
        "{} row{}\n",
        rows.len(),
        if rows.len() == 1 { "" } else { "s" }
    ));
    output
}

fn border(output: &mut String, widths: &[usize], left: char, middle: char, right: char) {
    output.push(left);
    for (i, width) in widths.iter().enumerate() {
        output.push_str(&"─".repeat(*width + 2));
        if i < widths.len() - 1 {
            output.push(middle);
        }
    }
    output.push(right);
    output.push('\n');
}

/// Render rows one key per line, with a `*** N. row ***` separator.
/// `start_index` keeps row numbers continuous across pages.
pub fn render_vertical(
    columns: &[String],
    rows: &[Vec<Option<String>>],
    truncate: usize,
    start_index: usize,
) -> String {
    let label_width = columns.iter().map(|c| c.chars().count()).max().unwrap_or(0);
    let mut output = String::new();

    for (n, row) in rows.iter().enumerate() {
        output.push_str(&format!(
            "{BOLD}*** {}. row ***{RESET}\n",
            start_index + n + 1
        ));
        for (i, column) in columns.iter().enumerate() {
            let value = row
                .get(i)
                .map(|c| cell_text(c, truncate))
                .unwrap_or_else(|| NULL_TEXT.to_string());
            output.push_str(&format!("{column:>label_width$}: {value}\n"));
        }
    }
    output
}

/// Render a whole result without paging.
pub fn render_result(result: &QueryResult, opts: &RenderOptions) -> String {
    if opts.vertical {
        render_vertical(&result.columns, &result.rows, opts.truncate, 0)
    } else {
        render_table(&result.columns, &result.rows, opts.truncate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(data: &[&[&str]]) -> Vec<Vec<Option<String>>> {
        data.iter()
            .map(|r| r.iter().map(|c| Some(c.to_string())).collect())
            .collect()
    }

    #[test]
    fn test_truncate_cell() {
        assert_eq!(truncate_cell("hello", 0), "hello");
        assert_eq!(truncate_cell("hello", 10), "hello");
        assert_eq!(truncate_cell("hello world", 5), "hello...");
    }

    #[test]
    fn test_render_table_contains_values() {
        let columns = vec!["id".to_string(), "name".to_string()];
        let output = render_table(&columns, &rows(&[&["1", "Alice"], &["2", "Bob"]]), 0);
        assert!(output.contains("Alice"));
        assert!(output.contains("2 rows"));
        assert!(output.contains(BOLD));
    }

    #[test]
    fn test_render_table_null() {
        let columns = vec!["x".to_string()];
        let output = render_table(&columns, &[vec![None]], 0);
        assert!(output.contains("NULL"));
        assert!(output.contains("1 row\n"));
    }

    #[test]
    fn test_render_vertical() {
        let columns = vec!["id".to_string(), "name".to_string()];
        let output = render_vertical(&columns, &rows(&[&["1", "Alice"]]), 0, 2);
        assert!(output.contains("*** 3. row ***"));
        assert!(output.contains("name: Alice"));
    }
}
