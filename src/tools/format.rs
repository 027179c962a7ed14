//! Output formatting utilities for MCP tools.
//!
//! This module provides the output format type and the renderers used by
//! the query, explain and schema tools. Columns appear in the order the
//! database returned them.

use crate::db::Row;
use serde_json::Value as JsonValue;
use unicode_width::UnicodeWidthStr;

/// Text shown instead of an empty rendering.
pub const NO_RESULTS: &str = "No results";

/// Output format for query/explain results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Pretty-printed JSON array
    Json,
    /// ASCII table format (like MySQL CLI)
    Table,
    /// Comma-separated values with a header line
    Csv,
    /// Markdown table format
    Markdown,
}

impl OutputFormat {
    /// Resolve a requested format name. Missing means `table`; anything
    /// unrecognized falls back to `json`.
    pub fn from_name(name: Option<&str>) -> Self {
        let Some(name) = name else {
            return Self::Table;
        };
        match name.trim().to_ascii_lowercase().as_str() {
            "table" => Self::Table,
            "csv" => Self::Csv,
            "markdown" | "md" => Self::Markdown,
            _ => Self::Json,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Table => "table",
            Self::Csv => "csv",
            Self::Markdown => "markdown",
        }
    }
}

/// Render rows in the requested format.
pub fn render(rows: &[Row], format: OutputFormat) -> String {
    if rows.is_empty() {
        return NO_RESULTS.to_string();
    }
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(rows).unwrap_or_default(),
        OutputFormat::Table => format_as_table(rows),
        OutputFormat::Csv => format_as_csv(rows),
        OutputFormat::Markdown => format_as_markdown(rows),
    }
}

pub fn format_value(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => "NULL".to_string(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::String(s) => s.clone(),
        JsonValue::Array(arr) => serde_json::to_string(arr).unwrap_or_default(),
        JsonValue::Object(obj) => serde_json::to_string(obj).unwrap_or_default(),
    }
}

fn column_names(rows: &[Row]) -> Vec<&str> {
    rows.first()
        .map(|row| row.keys().map(String::as_str).collect())
        .unwrap_or_default()
}

fn cell<'a>(row: &'a Row, column: &str) -> &'a JsonValue {
    row.get(column).unwrap_or(&JsonValue::Null)
}

/// Pad `text` to `width` display columns.
fn pad(text: &str, width: usize, right_align: bool) -> String {
    let fill = " ".repeat(width.saturating_sub(text.width()));
    if right_align {
        format!("{}{}", fill, text)
    } else {
        format!("{}{}", text, fill)
    }
}

/// Format rows as an ASCII table (MySQL CLI style).
pub fn format_as_table(rows: &[Row]) -> String {
    let columns = column_names(rows);
    if columns.is_empty() {
        return NO_RESULTS.to_string();
    }

    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| columns.iter().map(|c| format_value(cell(row, c))).collect())
        .collect();

    let mut widths: Vec<usize> = columns.iter().map(|c| c.width()).collect();
    for row in &cells {
        for (i, value) in row.iter().enumerate() {
            widths[i] = widths[i].max(value.width());
        }
    }

    let separator: String = widths
        .iter()
        .map(|w| format!("+{}", "-".repeat(w + 2)))
        .collect::<String>()
        + "+\n";

    let mut output = String::new();
    output.push_str(&separator);
    let header: String = columns
        .iter()
        .zip(&widths)
        .map(|(name, w)| format!("| {} ", pad(name, *w, false)))
        .collect::<String>()
        + "|\n";
    output.push_str(&header);
    output.push_str(&separator);

    for (row, values) in rows.iter().zip(&cells) {
        let line: String = columns
            .iter()
            .zip(values)
            .zip(&widths)
            .map(|((column, value), w)| {
                // Right-align numbers, left-align others
                let numeric = matches!(cell(row, column), JsonValue::Number(_));
                format!("| {} ", pad(value, *w, numeric))
            })
            .collect::<String>()
            + "|\n";
        output.push_str(&line);
    }

    output.push_str(&separator);
    output
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Format rows as CSV with a header line.
pub fn format_as_csv(rows: &[Row]) -> String {
    let columns = column_names(rows);
    let mut output = String::new();

    let header: Vec<String> = columns.iter().map(|c| csv_field(c)).collect();
    output.push_str(&header.join(","));
    output.push('\n');

    for row in rows {
        let record: Vec<String> = columns
            .iter()
            .map(|c| csv_field(&format_value(cell(row, c))))
            .collect();
        output.push_str(&record.join(","));
        output.push('\n');
    }
    output
}

/// Format rows as a Markdown table.
pub fn format_as_markdown(rows: &[Row]) -> String {
    let columns = column_names(rows);
    if columns.is_empty() {
        return NO_RESULTS.to_string();
    }

    let escape = |s: &str| s.replace('|', "\\|").replace('\n', " ");
    let mut output = String::new();

    let header: String = columns
        .iter()
        .map(|c| format!("| {} ", escape(c)))
        .collect::<String>()
        + "|\n";
    output.push_str(&header);

    let sep: String = columns.iter().map(|_| "| --- ").collect::<String>() + "|\n";
    output.push_str(&sep);

    for row in rows {
        let line: String = columns
            .iter()
            .map(|c| format!("| {} ", escape(&format_value(cell(row, c)))))
            .collect::<String>()
            + "|\n";
        output.push_str(&line);
    }
    output
}
