//! SQL value types moved between the warehouse and the artifact files.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

use super::identifier::normalize_column;

/// Format used for timestamps in exported artifacts.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// A single cell value.
///
/// Values read from the warehouse keep their type so the exporter can render
/// them consistently. Values read back from a CSV artifact are always
/// [`SqlValue::Text`] or [`SqlValue::Null`]; the artifact carries no types.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SqlValue {
    /// NULL.
    Null,

    /// Boolean value.
    Bool(bool),

    /// Integral number (NUMBER with scale 0).
    Int(i64),

    /// Floating point number.
    Float(f64),

    /// Text, and any type without a dedicated variant (decimals, variants, binary).
    Text(String),

    /// Calendar date.
    Date(NaiveDate),

    /// Timestamp without time zone.
    Timestamp(NaiveDateTime),
}

impl SqlValue {
    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Stable textual representation, `None` for NULL.
    ///
    /// This is what lands in a CSV field. An empty string and NULL both end up
    /// as an empty field, so the representation is lossy for that pair.
    #[must_use]
    pub fn to_text(&self) -> Option<String> {
        match self {
            SqlValue::Null => None,
            SqlValue::Bool(v) => Some(if *v { "True" } else { "False" }.to_string()),
            SqlValue::Int(v) => Some(v.to_string()),
            SqlValue::Float(v) => Some(v.to_string()),
            SqlValue::Text(v) => Some(v.clone()),
            SqlValue::Date(v) => Some(v.format("%Y-%m-%d").to_string()),
            SqlValue::Timestamp(v) => Some(v.format(TIMESTAMP_FORMAT).to_string()),
        }
    }

    /// Build a value from a CSV field. Empty fields are read back as NULL.
    #[must_use]
    pub fn from_field(field: &str) -> Self {
        if field.is_empty() {
            SqlValue::Null
        } else {
            SqlValue::Text(field.to_string())
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_text() {
            Some(text) => f.write_str(&text),
            None => f.write_str("NULL"),
        }
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Float(v)
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

/// Rows bound for one table, with the column list they are positioned against.
///
/// Column names are normalized to upper case on construction, matching how the
/// warehouse resolves unquoted identifiers. Every row has exactly one value per
/// column; the loader addresses values by position only.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    columns: Vec<String>,
    rows: Vec<Vec<SqlValue>>,
}

impl Batch {
    /// Create a batch. Rows shorter than the header are padded with NULL;
    /// rows must not be wider than the header.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<SqlValue>>) -> Self {
        let columns: Vec<String> = columns.iter().map(|c| normalize_column(c)).collect();
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                debug_assert!(row.len() <= width, "row wider than header");
                row.resize(width, SqlValue::Null);
                row
            })
            .collect();
        Self { columns, rows }
    }

    /// Column names in header order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Rows in file order.
    pub fn rows(&self) -> &[Vec<SqlValue>] {
        &self.rows
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the batch holds no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Values of one column, top to bottom.
    pub fn column(&self, idx: usize) -> impl Iterator<Item = &SqlValue> + '_ {
        self.rows.iter().map(move |row| &row[idx])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_and_empty_text_render_the_same() {
        let null = SqlValue::Null.to_text().unwrap_or_default();
        let empty = SqlValue::Text(String::new()).to_text().unwrap_or_default();
        assert_eq!(null, empty);
    }

    #[test]
    fn test_typed_rendering() {
        assert_eq!(SqlValue::Int(42).to_text().unwrap(), "42");
        assert_eq!(SqlValue::Bool(true).to_text().unwrap(), "True");
        assert_eq!(SqlValue::Float(1.5).to_text().unwrap(), "1.5");
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(SqlValue::Date(date).to_text().unwrap(), "2024-02-29");
        let ts = date.and_hms_opt(13, 5, 0).unwrap();
        assert_eq!(SqlValue::Timestamp(ts).to_text().unwrap(), "2024-02-29 13:05:00");
    }

    #[test]
    fn test_from_field() {
        assert!(SqlValue::from_field("").is_null());
        assert_eq!(SqlValue::from_field("x"), SqlValue::Text("x".into()));
    }

    #[test]
    fn test_batch_normalizes_columns_and_pads_rows() {
        let batch = Batch::new(
            vec!["id".into(), "Name".into()],
            vec![vec![SqlValue::from("1")]],
        );
        assert_eq!(batch.columns(), &["ID", "NAME"]);
        assert_eq!(batch.rows()[0], vec![SqlValue::from("1"), SqlValue::Null]);
        assert_eq!(batch.column(1).count(), 1);
    }
}
