//! Delimited-text persistence for series and result tables.
//!
//! The first column named `DateTime` holds right-closed half-hour stamps;
//! every other column is numeric with `NA`, `nan` or an empty field meaning
//! missing.

use chrono::NaiveDateTime;
use std::fmt::Write as _;
use std::path::Path;
use tracing::info;

use super::{is_missing, SeriesError, TimeSeries};

/// Header of the timestamp column.
pub const DATETIME_COLUMN: &str = "DateTime";

/// Written for missing values.
pub const MISSING_TOKEN: &str = "NA";

const STAMP_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M:%S"];

/// Split a delimited line, honouring double quotes (`""` escapes a quote).
pub fn split_fields(line: &str, separator: char) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            c if c == separator && !in_quotes => fields.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }
    fields.push(current);
    fields
}

fn quote_if_needed(field: &str, separator: char) -> String {
    if field.contains(separator) || field.contains('"') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

pub fn parse_stamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim().trim_matches('"');
    STAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
}

pub fn format_stamp(stamp: NaiveDateTime) -> String {
    stamp.format(STAMP_FORMATS[0]).to_string()
}

/// Parse one numeric cell; `None` when the text is not a number.
pub fn parse_value(s: &str) -> Option<f64> {
    let s = s.trim().trim_matches('"');
    if s.is_empty()
        || s.eq_ignore_ascii_case("na")
        || s.eq_ignore_ascii_case("nan")
        || s.eq_ignore_ascii_case("null")
    {
        return Some(f64::NAN);
    }
    s.parse::<f64>().ok()
}

pub fn format_value(value: f64) -> String {
    if is_missing(value) {
        MISSING_TOKEN.to_string()
    } else {
        format!("{value}")
    }
}

// ============================================================================
// Generic Table
// ============================================================================

/// Header plus string rows; typed readers interpret the cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new<S: Into<String>>(header: impl IntoIterator<Item = S>) -> Self {
        Self {
            header: header.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.header.iter().position(|h| h == name)
    }

    pub fn read(path: &Path, separator: char) -> Result<Self, SeriesError> {
        let text = std::fs::read_to_string(path).map_err(|source| SeriesError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut lines = text.lines().filter(|l| !l.trim().is_empty());
        let header_line = lines.next().ok_or_else(|| SeriesError::Parse {
            path: path.to_path_buf(),
            line: 1,
            message: "empty file".to_string(),
        })?;
        let header_line = header_line.trim_start_matches('\u{feff}');
        let header: Vec<String> = split_fields(header_line, separator)
            .into_iter()
            .map(|h| h.trim().to_string())
            .collect();

        let mut table = Self::new(header);
        for (i, line) in lines.enumerate() {
            let row = split_fields(line, separator);
            if row.len() != table.header.len() {
                return Err(SeriesError::Parse {
                    path: path.to_path_buf(),
                    line: i + 2,
                    message: format!("expected {} fields, found {}", table.header.len(), row.len()),
                });
            }
            table.rows.push(row);
        }
        Ok(table)
    }

    pub fn write(&self, path: &Path, separator: char) -> Result<(), SeriesError> {
        let mut out = String::new();
        let sep = separator.to_string();
        let join = |cells: &[String]| {
            cells
                .iter()
                .map(|c| quote_if_needed(c, separator))
                .collect::<Vec<_>>()
                .join(&sep)
        };
        let _ = writeln!(out, "{}", join(&self.header));
        for row in &self.rows {
            let _ = writeln!(out, "{}", join(row));
        }
        std::fs::write(path, out).map_err(|source| SeriesError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

// ============================================================================
// Series I/O
// ============================================================================

/// Read a series; every non-`DateTime` column becomes a channel.
pub fn read_series(path: &Path, separator: char) -> Result<TimeSeries, SeriesError> {
    let table = Table::read(path, separator)?;
    let parse_err = |line: usize, message: String| SeriesError::Parse {
        path: path.to_path_buf(),
        line,
        message,
    };

    let stamp_col = table
        .column(DATETIME_COLUMN)
        .ok_or_else(|| parse_err(1, format!("no '{DATETIME_COLUMN}' column")))?;

    let mut stamps = Vec::with_capacity(table.rows.len());
    for (i, row) in table.rows.iter().enumerate() {
        let cell = &row[stamp_col];
        let stamp = parse_stamp(cell)
            .ok_or_else(|| parse_err(i + 2, format!("cannot parse timestamp '{cell}'")))?;
        stamps.push(stamp);
    }

    let mut series = TimeSeries::new(stamps)?;
    for (col, name) in table.header.iter().enumerate() {
        if col == stamp_col {
            continue;
        }
        let mut values = Vec::with_capacity(table.rows.len());
        for (i, row) in table.rows.iter().enumerate() {
            let cell = &row[col];
            let value = parse_value(cell).ok_or_else(|| {
                parse_err(i + 2, format!("column '{name}': cannot parse '{cell}'"))
            })?;
            values.push(value);
        }
        series.insert_channel(name.clone(), values)?;
    }

    info!(
        path = %path.display(),
        rows = series.len(),
        days = series.num_days(),
        channels = series.channels().len(),
        "Series loaded"
    );
    Ok(series)
}

/// Write a series with all its channels.
pub fn write_series(series: &TimeSeries, path: &Path, separator: char) -> Result<(), SeriesError> {
    let mut table = Table::new(
        std::iter::once(DATETIME_COLUMN.to_string())
            .chain(series.channel_names().map(str::to_string)),
    );
    for row in 0..series.len() {
        let mut cells = Vec::with_capacity(series.channels().len() + 1);
        cells.push(format_stamp(series.timestamp(row)));
        cells.extend(series.channels().iter().map(|c| format_value(c.values[row])));
        table.push_row(cells);
    }
    table.write(path, separator)
}
