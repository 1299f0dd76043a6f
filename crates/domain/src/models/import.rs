//! Bulk roster import models.
//!
//! The admin client converts the first sheet of a spreadsheet into one JSON
//! object per data row, keyed by the header row. This module turns those
//! loosely-typed rows into [`NewGraduate`] values.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use validator::Validate;

use super::graduate::NewGraduate;

/// Request to bulk import roster rows.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRequest {
    /// Header-keyed rows from the first sheet.
    pub rows: Vec<Value>,
}

/// Response from a bulk import.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    /// Number of rows inserted by this batch.
    pub inserted: usize,
    /// Roster size after the batch.
    pub total: i64,
}

/// Error raised while converting sheet rows. Any error rejects the whole batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImportError {
    #[error("Row {row}: expected an object keyed by column headers")]
    NotAnObject { row: usize },

    #[error("Row {row}: missing required column '{column}'")]
    MissingColumn { row: usize, column: &'static str },

    #[error("Row {row}: {message}")]
    InvalidRow { row: usize, message: String },

    #[error("Import contains no rows")]
    Empty,

    #[error("Import of {count} rows exceeds the limit of {limit}")]
    TooManyRows { count: usize, limit: usize },
}

/// Canonical column names after header normalization.
const STUDENT_ID: &str = "studentid";
const FULLNAME: &str = "fullname";
const FACULTY: &str = "faculty";
const DEGREE: &str = "degree";

/// Normalizes a header so `student_id`, `Student ID` and `studentId` match.
fn normalize_header(header: &str) -> String {
    header
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Renders a cell as text. Spreadsheets hand numeric student IDs over as
/// numbers, so integral floats are printed without a fractional part.
fn cell_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(i.to_string())
            } else if let Some(u) = n.as_u64() {
                Some(u.to_string())
            } else {
                n.as_f64().map(|f| {
                    if f.fract() == 0.0 && f.abs() < 1e15 {
                        format!("{}", f as i64)
                    } else {
                        f.to_string()
                    }
                })
            }
        }
        Value::Bool(_) | Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn lookup(columns: &Map<String, Value>, canonical: &str) -> Option<String> {
    columns
        .iter()
        .find(|(header, _)| normalize_header(header) == canonical)
        .and_then(|(_, value)| cell_text(value))
}

/// Converts one header-keyed row. `row` is the 1-indexed data row number.
pub fn parse_row(row: usize, value: &Value) -> Result<NewGraduate, ImportError> {
    let columns = value.as_object().ok_or(ImportError::NotAnObject { row })?;

    let student_id = lookup(columns, STUDENT_ID).ok_or(ImportError::MissingColumn {
        row,
        column: "student_id",
    })?;
    let fullname = lookup(columns, FULLNAME).ok_or(ImportError::MissingColumn {
        row,
        column: "fullname",
    })?;

    let graduate = NewGraduate {
        student_id,
        fullname,
        faculty: lookup(columns, FACULTY).unwrap_or_default(),
        degree: lookup(columns, DEGREE),
    };

    graduate.validate().map_err(|e| ImportError::InvalidRow {
        row,
        message: e.to_string(),
    })?;

    Ok(graduate)
}

/// Converts a whole sheet, failing on the first bad row.
pub fn parse_rows(rows: &[Value], limit: usize) -> Result<Vec<NewGraduate>, ImportError> {
    if rows.is_empty() {
        return Err(ImportError::Empty);
    }
    if rows.len() > limit {
        return Err(ImportError::TooManyRows {
            count: rows.len(),
            limit,
        });
    }

    rows.iter()
        .enumerate()
        .map(|(idx, value)| parse_row(idx + 1, value))
        .collect()
}
