//! Backend trait and types for tally warehouse engines.
//!
//! This crate defines the database boundary the report tooling depends on:
//! parameterized queries returning row sets addressable by column name, plain
//! statement execution, and partition table discovery.

mod error;
mod types;

pub use error::BackendError;
pub use types::{ResultSet, Row, SqlParam, SqlValue};

use std::collections::BTreeSet;

/// Abstract interface for warehouse backends.
///
/// Backends are responsible for:
/// - Executing parameterized queries and decoding their rows
/// - Executing statements that return no rows
/// - Listing the tables that currently exist
///
/// Calls are blocking; a run issues them one after another.
pub trait Backend {
    /// Human-readable engine name, for logging.
    fn name(&self) -> &'static str;

    /// Execute a query, binding `params` to its `?` placeholders in order.
    fn query(&self, sql: &str, params: &[SqlParam]) -> Result<ResultSet, BackendError>;

    /// Execute one or more statements that return no rows.
    fn execute_batch(&self, sql: &str) -> Result<(), BackendError>;

    /// Names of existing tables and views starting with `prefix`.
    fn list_tables(&self, prefix: &str) -> Result<BTreeSet<String>, BackendError>;

    /// Check if a table or view exists.
    fn table_exists(&self, name: &str) -> Result<bool, BackendError> {
        Ok(self.list_tables(name)?.contains(name))
    }
}
