//! Parameterized SQL text.
//!
//! Values always travel as bound parameters. The only text spliced into a
//! query is static SQL and [`PartitionTable`] names.

use crate::partitions::PartitionTable;
use chrono::NaiveDate;
use tally_backend::{Backend, BackendError, ResultSet, SqlParam};

/// SQL text plus the values for its `?` placeholders, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

impl Query {
    pub fn execute(&self, backend: &dyn Backend) -> Result<ResultSet, BackendError> {
        backend.query(&self.sql, &self.params)
    }

    /// The query with its parameters written in as literals, for dry runs.
    pub fn inline(&self) -> String {
        let mut params = self.params.iter();
        let mut out = String::with_capacity(self.sql.len());
        for ch in self.sql.chars() {
            if ch == '?' {
                if let Some(param) = params.next() {
                    out.push_str(&param.to_literal());
                    continue;
                }
            }
            out.push(ch);
        }
        out
    }
}

/// Incrementally assembles a [`Query`], keeping placeholders and parameters in step.
#[derive(Debug, Default)]
pub struct QueryBuilder {
    sql: String,
    params: Vec<SqlParam>,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sql: &str) -> &mut Self {
        self.sql.push_str(sql);
        self
    }

    pub fn bind(&mut self, param: impl Into<SqlParam>) -> &mut Self {
        self.sql.push('?');
        self.params.push(param.into());
        self
    }

    pub fn bind_date(&mut self, date: NaiveDate) -> &mut Self {
        self.push("CAST(").bind(date).push(" AS DATE)")
    }

    /// `member` for each table, joined with `UNION ALL`.
    pub fn union_all(
        &mut self,
        tables: &[PartitionTable],
        mut member: impl FnMut(&mut Self, &PartitionTable),
    ) -> &mut Self {
        for (i, table) in tables.iter().enumerate() {
            if i > 0 {
                self.push(" UNION ALL ");
            }
            member(self, table);
        }
        self
    }

    pub fn build(self) -> Query {
        Query {
            sql: self.sql,
            params: self.params,
        }
    }
}
