//! Common types used across backends.

use crate::error::BackendError;
use chrono::NaiveDate;
use std::fmt;

/// A value bound to a `?` placeholder in a query.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    /// A calendar date. Queries cast the placeholder: `CAST(? AS DATE)`.
    Date(NaiveDate),
    Int(i64),
    Text(String),
}

impl SqlParam {
    /// Render the parameter as a SQL literal, for printing queries only.
    pub fn to_literal(&self) -> String {
        match self {
            SqlParam::Date(date) => format!("'{}'", date.format("%Y-%m-%d")),
            SqlParam::Int(value) => value.to_string(),
            SqlParam::Text(text) => format!("'{}'", text.replace('\'', "''")),
        }
    }
}

impl From<NaiveDate> for SqlParam {
    fn from(date: NaiveDate) -> Self {
        SqlParam::Date(date)
    }
}

impl From<i64> for SqlParam {
    fn from(value: i64) -> Self {
        SqlParam::Int(value)
    }
}

/// A single decoded value from a result set.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
}

impl SqlValue {
    fn type_name(&self) -> &'static str {
        match self {
            SqlValue::Null => "NULL",
            SqlValue::Bool(_) => "a boolean",
            SqlValue::Int(_) => "an integer",
            SqlValue::Float(_) => "a float",
            SqlValue::Text(_) => "text",
            SqlValue::Date(_) => "a date",
        }
    }
}

/// Renders the value as a delimited-text field. `NULL` renders as the empty string.
impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => Ok(()),
            SqlValue::Bool(value) => write!(f, "{}", value),
            SqlValue::Int(value) => write!(f, "{}", value),
            SqlValue::Float(value) => write!(f, "{}", value),
            SqlValue::Text(text) => f.write_str(text),
            SqlValue::Date(date) => write!(f, "{}", date.format("%Y-%m-%d")),
        }
    }
}

/// Rows returned by a query, with columns addressable by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    columns: Vec<String>,
    rows: Vec<Vec<SqlValue>>,
}

impl ResultSet {
    /// Build a result set. Rows shorter than the column list fail on access to
    /// the missing columns.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<SqlValue>>) -> Self {
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column, case-insensitively.
    pub fn column_index(&self, name: &str) -> Result<usize, BackendError> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
            .ok_or_else(|| BackendError::missing_column(name))
    }

    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        self.rows.iter().map(move |values| Row { set: self, values })
    }
}

/// A borrowed row of a [`ResultSet`].
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    set: &'a ResultSet,
    values: &'a [SqlValue],
}

impl<'a> Row<'a> {
    pub fn values(&self) -> &'a [SqlValue] {
        self.values
    }

    pub fn get(&self, column: &str) -> Result<&'a SqlValue, BackendError> {
        let index = self.set.column_index(column)?;
        self.values
            .get(index)
            .ok_or_else(|| BackendError::decode_failed(column, "row has no value for column"))
    }

    /// Textual value of a column; `NULL` becomes the empty string.
    pub fn text(&self, column: &str) -> Result<String, BackendError> {
        Ok(self.get(column)?.to_string())
    }

    /// Integer value of a column; `NULL` becomes zero.
    pub fn int(&self, column: &str) -> Result<i64, BackendError> {
        match self.get(column)? {
            SqlValue::Null => Ok(0),
            SqlValue::Int(value) => Ok(*value),
            SqlValue::Bool(value) => Ok(i64::from(*value)),
            other => Err(BackendError::TypeMismatch {
                column: column.to_string(),
                expected: "an integer",
                found: other.type_name(),
            }),
        }
    }

    /// Floating point value of a column; `NULL` becomes zero.
    pub fn float(&self, column: &str) -> Result<f64, BackendError> {
        match self.get(column)? {
            SqlValue::Null => Ok(0.0),
            SqlValue::Float(value) => Ok(*value),
            SqlValue::Int(value) => Ok(*value as f64),
            other => Err(BackendError::TypeMismatch {
                column: column.to_string(),
                expected: "a number",
                found: other.type_name(),
            }),
        }
    }
}
