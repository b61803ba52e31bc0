//! Backend error types.

use thiserror::Error;

/// Errors that can occur during backend operations.
#[derive(Error, Debug)]
pub enum BackendError {
    /// Failed to open or connect to the warehouse.
    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    /// Failed to execute a SQL statement.
    #[error("Execution failed for '{query}': {message}")]
    ExecutionFailed { query: String, message: String },

    /// A result column could not be converted into a row value.
    #[error("Failed to decode column '{column}': {message}")]
    DecodeFailed { column: String, message: String },

    /// A result set does not carry a column the caller asked for.
    #[error("Column not found in result set: {column}")]
    MissingColumn { column: String },

    /// A value has a type the caller cannot interpret.
    #[error("Column '{column}' holds {found}, expected {expected}")]
    TypeMismatch {
        column: String,
        expected: &'static str,
        found: &'static str,
    },

    /// Generic backend error.
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl BackendError {
    /// Create a connection failed error.
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            message: message.into(),
        }
    }

    /// Create an execution failed error.
    pub fn execution_failed(query: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExecutionFailed {
            query: query.into(),
            message: message.into(),
        }
    }

    /// Create a decode failed error.
    pub fn decode_failed(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DecodeFailed {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a missing column error.
    pub fn missing_column(column: impl Into<String>) -> Self {
        Self::MissingColumn {
            column: column.into(),
        }
    }
}
