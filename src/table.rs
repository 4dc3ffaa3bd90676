//! Delimited-text tables and positional column layouts.
//!
//! Source files arrive with inconsistent header labels (`id;grp`,
//! `student_id`, ...), so every table kind declares a [`ColumnLayout`]
//! once and rows are decoded by column index. Headers are kept only for
//! diagnostics.

use std::io::Read;
use std::path::Path;

use csv::{ReaderBuilder, Trim};
use tracing::debug;

use crate::error::{MetricsError, Result};
use crate::models::{ActiveUser, Group, GroupAssignment, PaymentEvent};

/// A fully materialized table of string cells.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(name: impl Into<String>, headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self {
            name: name.into(),
            headers,
            rows,
        }
    }

    /// Parse delimited text with a header line.
    pub fn from_reader<R: Read>(name: &str, reader: R, delimiter: char) -> Result<Self> {
        let delimiter = delimiter_byte(name, delimiter)?;
        let parse_err = |e: csv::Error| MetricsError::Parse {
            table: name.to_string(),
            reason: e.to_string(),
        };

        let mut rdr = ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .trim(Trim::All)
            .from_reader(reader);

        let headers: Vec<String> = rdr
            .headers()
            .map_err(parse_err)?
            .iter()
            .map(|h| h.to_string())
            .collect();

        let mut rows = Vec::new();
        for result in rdr.records() {
            let record = result.map_err(parse_err)?;
            rows.push(record.iter().map(|field| field.to_string()).collect());
        }

        debug!(table = name, columns = headers.len(), rows = rows.len(), "parsed table");
        Ok(Self::new(name, headers, rows))
    }

    pub fn from_text(name: &str, text: &str, delimiter: char) -> Result<Self> {
        Self::from_reader(name, text.as_bytes(), delimiter)
    }

    pub fn from_path(name: &str, path: &Path, delimiter: char) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| MetricsError::ResourceUnavailable {
            source_name: name.to_string(),
            reason: format!("{}: {}", path.display(), e),
        })?;
        Self::from_reader(name, file, delimiter)
    }

    pub fn width(&self) -> usize {
        self.headers.len()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn delimiter_byte(table: &str, delimiter: char) -> Result<u8> {
    if delimiter.is_ascii() {
        Ok(delimiter as u8)
    } else {
        Err(MetricsError::Parse {
            table: table.to_string(),
            reason: format!("delimiter '{}' is not a single ASCII character", delimiter),
        })
    }
}

/// Positional mapping from a table's columns to logical fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnLayout {
    /// Exact number of columns the table must have
    pub width: usize,
    /// Index of the user identifier column
    pub user_id: usize,
    /// Index of the value column (group label or revenue), if any
    pub value: Option<usize>,
}

impl ColumnLayout {
    /// `id, group` — both assignment files, whatever their labels
    pub const GROUPS: ColumnLayout = ColumnLayout {
        width: 2,
        user_id: 0,
        value: Some(1),
    };

    /// `user_id`
    pub const ACTIVE: ColumnLayout = ColumnLayout {
        width: 1,
        user_id: 0,
        value: None,
    };

    /// `user_id, revenue`
    pub const PAYMENTS: ColumnLayout = ColumnLayout {
        width: 2,
        user_id: 0,
        value: Some(1),
    };

    /// Fail loudly if the table's shape drifted from this layout.
    pub fn validate(&self, table: &Table) -> Result<()> {
        if table.width() != self.width {
            return Err(MetricsError::SchemaMismatch {
                table: table.name.clone(),
                expected: self.width,
                found: table.width(),
            });
        }
        Ok(())
    }

    fn value_index(&self, table: &Table) -> Result<usize> {
        self.value.ok_or_else(|| MetricsError::SchemaMismatch {
            table: table.name.clone(),
            expected: self.width + 1,
            found: self.width,
        })
    }
}

fn cell<'a>(table: &'a Table, row: usize, column: usize) -> Result<&'a str> {
    table
        .rows
        .get(row)
        .and_then(|r| r.get(column))
        .map(String::as_str)
        .ok_or_else(|| MetricsError::SchemaMismatch {
            table: table.name.clone(),
            expected: column + 1,
            found: table.rows.get(row).map(Vec::len).unwrap_or(0),
        })
}

fn user_id(table: &Table, layout: &ColumnLayout, row: usize) -> Result<String> {
    let raw = cell(table, row, layout.user_id)?;
    if raw.is_empty() {
        return Err(MetricsError::InvalidField {
            table: table.name.clone(),
            row,
            column: layout.user_id,
            value: raw.to_string(),
        });
    }
    Ok(raw.to_string())
}

pub fn decode_assignments(table: &Table, layout: &ColumnLayout) -> Result<Vec<GroupAssignment>> {
    layout.validate(table)?;
    let value = layout.value_index(table)?;

    (0..table.len())
        .map(|row| {
            let raw = cell(table, row, value)?;
            let group = Group::parse(raw).ok_or_else(|| MetricsError::InvalidField {
                table: table.name.clone(),
                row,
                column: value,
                value: raw.to_string(),
            })?;
            Ok(GroupAssignment {
                user_id: user_id(table, layout, row)?,
                group,
            })
        })
        .collect()
}

pub fn decode_active(table: &Table, layout: &ColumnLayout) -> Result<Vec<ActiveUser>> {
    layout.validate(table)?;
    (0..table.len())
        .map(|row| {
            Ok(ActiveUser {
                user_id: user_id(table, layout, row)?,
            })
        })
        .collect()
}

/// Empty revenue cells decode to `None`; anything else must be a finite number.
pub fn decode_payments(table: &Table, layout: &ColumnLayout) -> Result<Vec<PaymentEvent>> {
    layout.validate(table)?;
    let value = layout.value_index(table)?;

    (0..table.len())
        .map(|row| {
            let raw = cell(table, row, value)?;
            let revenue = if raw.is_empty() {
                None
            } else {
                let parsed = raw
                    .parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| MetricsError::InvalidField {
                        table: table.name.clone(),
                        row,
                        column: value,
                        value: raw.to_string(),
                    })?;
                Some(parsed)
            };
            Ok(PaymentEvent {
                user_id: user_id(table, layout, row)?,
                revenue,
            })
        })
        .collect()
}
