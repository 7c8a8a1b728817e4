mod schema;

pub use schema::Database;

use crate::error::{AppError, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::types::Value;
use std::collections::BTreeMap;

/// One result row: column name to SQLite value.
pub type RowData = BTreeMap<String, Value>;

/// Read a required integer column.
pub fn column_i64(row: &RowData, name: &str) -> Result<i64> {
    match row.get(name) {
        Some(Value::Integer(v)) => Ok(*v),
        Some(Value::Real(v)) => Ok(*v as i64),
        Some(Value::Text(v)) => v
            .trim()
            .parse()
            .map_err(|_| AppError::InvalidFormat(format!("Column {} is not an integer", name))),
        Some(_) => Err(AppError::InvalidFormat(format!(
            "Column {} is not an integer",
            name
        ))),
        None => Err(AppError::InvalidFormat(format!("Missing column {}", name))),
    }
}

/// Read a required text column.
pub fn column_string(row: &RowData, name: &str) -> Result<String> {
    column_opt_string(row, name)?
        .ok_or_else(|| AppError::InvalidFormat(format!("Column {} is null", name)))
}

/// Read an optional text column. A missing column is an error, NULL is not.
pub fn column_opt_string(row: &RowData, name: &str) -> Result<Option<String>> {
    match row.get(name) {
        Some(Value::Null) => Ok(None),
        Some(Value::Text(v)) => Ok(Some(v.clone())),
        Some(Value::Integer(v)) => Ok(Some(v.to_string())),
        Some(Value::Real(v)) => Ok(Some(v.to_string())),
        Some(Value::Blob(_)) => Err(AppError::InvalidFormat(format!(
            "Column {} is a blob",
            name
        ))),
        None => Err(AppError::InvalidFormat(format!("Missing column {}", name))),
    }
}

/// Read an optional real column.
pub fn column_opt_f64(row: &RowData, name: &str) -> Result<Option<f64>> {
    match row.get(name) {
        Some(Value::Null) => Ok(None),
        Some(Value::Real(v)) => Ok(Some(*v)),
        Some(Value::Integer(v)) => Ok(Some(*v as f64)),
        Some(Value::Text(v)) => Ok(v.trim().parse().ok()),
        Some(Value::Blob(_)) => Err(AppError::InvalidFormat(format!(
            "Column {} is a blob",
            name
        ))),
        None => Err(AppError::InvalidFormat(format!("Missing column {}", name))),
    }
}

/// Read a boolean column (SQLite stores them as integers). NULL reads as false.
pub fn column_bool(row: &RowData, name: &str) -> Result<bool> {
    match row.get(name) {
        Some(Value::Null) => Ok(false),
        Some(_) => Ok(column_i64(row, name)? != 0),
        None => Err(AppError::InvalidFormat(format!("Missing column {}", name))),
    }
}

/// Read an optional Calibre timestamp column.
///
/// Calibre writes `2013-01-01 10:00:00+00:00`, sometimes with fractional
/// seconds; unparseable values read as `None`.
pub fn column_opt_datetime(row: &RowData, name: &str) -> Result<Option<DateTime<Utc>>> {
    Ok(column_opt_string(row, name)?.and_then(|raw| parse_calibre_timestamp(&raw)))
}

/// Parse a Calibre timestamp.
pub fn parse_calibre_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%:z")
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        })
}
