//! DuckDB backend implementation for tally.

use anyhow::Context;
use chrono::NaiveDate;
use duckdb::arrow::array::{Array, ArrayRef, AsArray, RecordBatch};
use duckdb::arrow::compute::cast;
use duckdb::arrow::datatypes::{DataType, Date32Type, Float64Type, Int64Type};
use duckdb::types::Value;
use duckdb::Connection;
use std::collections::BTreeSet;
use std::path::Path;
use tally_backend::{Backend, BackendError, ResultSet, SqlParam, SqlValue};
use tracing::debug;

/// Connection string that selects an in-memory database.
pub const IN_MEMORY: &str = ":memory:";

/// Days from 0001-01-01 (CE) to 1970-01-01, the Arrow `Date32` epoch.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// DuckDB backend for tally.
///
/// Wraps a single DuckDB connection. The connection is closed when the
/// backend is dropped.
pub struct DuckDbBackend {
    connection: Connection,
}

impl DuckDbBackend {
    /// Open a backend from a connection string: a database file path, or
    /// `:memory:` for a throwaway in-memory database.
    pub fn connect(connection_string: &str) -> Result<Self, BackendError> {
        if connection_string == IN_MEMORY {
            Self::in_memory()
        } else {
            Self::open(Path::new(connection_string))
        }
    }

    /// Open or create a database file at the given path.
    pub fn open(database_path: &Path) -> Result<Self, BackendError> {
        let connection = open_connection(database_path)
            .map_err(|e| BackendError::connection_failed(format!("{:#}", e)))?;

        debug!(path = %database_path.display(), "opened DuckDB database");
        Ok(Self { connection })
    }

    /// Open an in-memory database.
    pub fn in_memory() -> Result<Self, BackendError> {
        let connection = Connection::open_in_memory()
            .map_err(|e| BackendError::connection_failed(e.to_string()))?;
        Ok(Self { connection })
    }
}

impl Backend for DuckDbBackend {
    fn name(&self) -> &'static str {
        "DuckDB"
    }

    fn query(&self, sql: &str, params: &[SqlParam]) -> Result<ResultSet, BackendError> {
        let mut stmt = self
            .connection
            .prepare(sql)
            .map_err(|e| BackendError::execution_failed(summarize(sql), e.to_string()))?;

        let values: Vec<Value> = params.iter().map(to_duckdb_value).collect();
        let batches: Vec<RecordBatch> = stmt
            .query_arrow(duckdb::params_from_iter(values.iter()))
            .map_err(|e| BackendError::execution_failed(summarize(sql), e.to_string()))?
            .collect();

        decode_batches(&batches)
    }

    fn execute_batch(&self, sql: &str) -> Result<(), BackendError> {
        self.connection
            .execute_batch(sql)
            .map_err(|e| BackendError::execution_failed(summarize(sql), e.to_string()))
    }

    fn list_tables(&self, prefix: &str) -> Result<BTreeSet<String>, BackendError> {
        let sql = "SELECT table_name FROM information_schema.tables";
        let mut stmt = self
            .connection
            .prepare(sql)
            .map_err(|e| BackendError::execution_failed(sql, e.to_string()))?;

        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| BackendError::execution_failed(sql, e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| BackendError::execution_failed(sql, e.to_string()))?;

        Ok(names
            .into_iter()
            .filter(|name| name.starts_with(prefix))
            .collect())
    }
}

fn to_duckdb_value(param: &SqlParam) -> Value {
    match param {
        SqlParam::Date(date) => Value::Text(date.format("%Y-%m-%d").to_string()),
        SqlParam::Int(value) => Value::BigInt(*value),
        SqlParam::Text(text) => Value::Text(text.clone()),
    }
}

fn open_connection(database_path: &Path) -> anyhow::Result<Connection> {
    // Create parent directory if needed
    if let Some(parent) = database_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {:?}", parent))?;
        }
    }

    Connection::open(database_path)
        .with_context(|| format!("Failed to open DuckDB database: {:?}", database_path))
}

/// First line of a statement, for error messages.
fn summarize(sql: &str) -> String {
    let line = sql.trim().lines().next().unwrap_or_default();
    if line.chars().count() > 80 {
        format!("{}...", line.chars().take(77).collect::<String>())
    } else {
        line.to_string()
    }
}

fn decode_batches(batches: &[RecordBatch]) -> Result<ResultSet, BackendError> {
    let columns: Vec<String> = batches
        .first()
        .map(|batch| {
            batch
                .schema()
                .fields()
                .iter()
                .map(|field| field.name().clone())
                .collect()
        })
        .unwrap_or_default();

    let mut rows = Vec::new();
    for batch in batches {
        let decoded = batch
            .columns()
            .iter()
            .zip(&columns)
            .map(|(array, name)| decode_column(name, array))
            .collect::<Result<Vec<_>, _>>()?;

        for index in 0..batch.num_rows() {
            rows.push(decoded.iter().map(|column| column[index].clone()).collect());
        }
    }

    Ok(ResultSet::new(columns, rows))
}

fn decode_column(name: &str, array: &ArrayRef) -> Result<Vec<SqlValue>, BackendError> {
    let cast_to = |data_type: &DataType| {
        cast(array, data_type).map_err(|e| BackendError::decode_failed(name, e.to_string()))
    };

    let values = match array.data_type() {
        DataType::Null => vec![SqlValue::Null; array.len()],
        DataType::Boolean => {
            let values = array.as_boolean();
            (0..values.len())
                .map(|i| nullable(values, i, || SqlValue::Bool(values.value(i))))
                .collect()
        }
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64
        | DataType::Decimal128(_, 0) => {
            let converted = cast_to(&DataType::Int64)?;
            let values = converted.as_primitive::<Int64Type>();
            (0..values.len())
                .map(|i| nullable(values, i, || SqlValue::Int(values.value(i))))
                .collect()
        }
        DataType::Float16 | DataType::Float32 | DataType::Float64 | DataType::Decimal128(_, _) => {
            let converted = cast_to(&DataType::Float64)?;
            let values = converted.as_primitive::<Float64Type>();
            (0..values.len())
                .map(|i| nullable(values, i, || SqlValue::Float(values.value(i))))
                .collect()
        }
        DataType::Date32 => {
            let values = array.as_primitive::<Date32Type>();
            (0..values.len())
                .map(|i| {
                    if values.is_null(i) {
                        return Ok(SqlValue::Null);
                    }
                    values
                        .value(i)
                        .checked_add(UNIX_EPOCH_DAYS_FROM_CE)
                        .and_then(NaiveDate::from_num_days_from_ce_opt)
                        .map(SqlValue::Date)
                        .ok_or_else(|| BackendError::decode_failed(name, "date out of range"))
                })
                .collect::<Result<_, _>>()?
        }
        _ => {
            let converted = cast_to(&DataType::Utf8)?;
            let values = converted.as_string::<i32>();
            (0..values.len())
                .map(|i| nullable(values, i, || SqlValue::Text(values.value(i).to_string())))
                .collect()
        }
    };

    Ok(values)
}

fn nullable(array: &dyn Array, index: usize, value: impl FnOnce() -> SqlValue) -> SqlValue {
    if array.is_null(index) {
        SqlValue::Null
    } else {
        value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duckdb::arrow::array::Date32Array;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_backend_creation() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.duckdb");

        let _backend = DuckDbBackend::open(&db_path).unwrap();
        assert!(db_path.exists());
    }

    #[test]
    fn test_query_decodes_types() {
        let backend = DuckDbBackend::in_memory().unwrap();

        let result = backend
            .query(
                "SELECT 'US' AS geo, CAST(3 AS INTEGER) AS small, SUM(x) AS total, \
                 CAST(1.5 AS DOUBLE) AS hours, DATE '2015-11-02' AS \"date\", \
                 TRUE AS flag, CAST(NULL AS VARCHAR) AS missing \
                 FROM (VALUES (1), (2)) t(x)",
                &[],
            )
            .unwrap();

        assert_eq!(result.len(), 1);
        let row = result.rows().next().unwrap();
        assert_eq!(row.text("geo").unwrap(), "US");
        assert_eq!(row.int("small").unwrap(), 3);
        assert_eq!(row.int("total").unwrap(), 3);
        assert_eq!(row.float("hours").unwrap(), 1.5);
        assert_eq!(row.text("date").unwrap(), "2015-11-02");
        assert_eq!(row.get("flag").unwrap(), &SqlValue::Bool(true));
        assert_eq!(row.text("missing").unwrap(), "");
    }

    #[test]
    fn test_infinite_date_is_a_decode_error() {
        let array: ArrayRef = Arc::new(Date32Array::from(vec![Some(0), None, Some(i32::MAX)]));
        let result = decode_column("date", &array);
        assert!(matches!(result, Err(BackendError::DecodeFailed { .. })));

        let array: ArrayRef = Arc::new(Date32Array::from(vec![Some(0), None]));
        let values = decode_column("date", &array).unwrap();
        assert_eq!(
            values,
            vec![
                SqlValue::Date(NaiveDate::from_ymd_opt(1970, 1, 1).unwrap()),
                SqlValue::Null
            ]
        );
    }

    #[test]
    fn test_query_binds_params() {
        let backend = DuckDbBackend::in_memory().unwrap();
        let date = NaiveDate::from_ymd_opt(2015, 11, 2).unwrap();

        let result = backend
            .query(
                "SELECT CAST(? AS DATE) + 1 AS next_day, CAST(? AS BIGINT) AS threshold",
                &[SqlParam::Date(date), SqlParam::Int(5)],
            )
            .unwrap();

        let row = result.rows().next().unwrap();
        assert_eq!(row.text("next_day").unwrap(), "2015-11-03");
        assert_eq!(row.int("threshold").unwrap(), 5);
    }

    #[test]
    fn test_list_tables_by_prefix() {
        let backend = DuckDbBackend::in_memory().unwrap();
        backend
            .execute_batch(
                "CREATE TABLE executive_summary_20151102 (x INTEGER);
                 CREATE TABLE executive_summary_20151103 (x INTEGER);
                 CREATE TABLE main_summary_20151102 (x INTEGER);",
            )
            .unwrap();

        let tables = backend.list_tables("executive_summary_").unwrap();
        assert_eq!(tables.len(), 2);
        assert!(tables.contains("executive_summary_20151103"));
        assert!(backend.table_exists("main_summary_20151102").unwrap());
        assert!(!backend.table_exists("main_summary_20151103").unwrap());
    }

    #[test]
    fn test_missing_table_fails() {
        let backend = DuckDbBackend::in_memory().unwrap();
        let result = backend.query("SELECT * FROM executive_summary_20151102", &[]);
        assert!(matches!(result, Err(BackendError::ExecutionFailed { .. })));
    }
}
