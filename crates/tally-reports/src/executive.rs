//! SQL for the four executive report passes.
//!
//! Every pass reads the union of the daily `executive_summary_YYYYMMDD`
//! partitions of a window and returns one row per
//! `(geo, channel, os, date)` key. Dimension columns are `COALESCE`d to the
//! empty string so that `NULL` never takes part in a key comparison.
//!
//! Per-entity passes keep only the most recent observation of each client:
//! `ROW_NUMBER()` rather than `RANK()`, since ties under `RANK()` would all
//! be numbered 1 and the client would be counted more than once.

use crate::partitions::{resolve_partitions, PartitionTable, EXECUTIVE_SUMMARY_PREFIX};
use crate::query::{Query, QueryBuilder};
use crate::window::ReportWindow;
use std::collections::BTreeSet;
use std::fmt;
use tracing::warn;

const KEY_COLUMNS: &str =
    "COALESCE(country, '') AS geo, COALESCE(channel, '') AS channel, COALESCE(os, '') AS os";

const RECENCY_RANK: &str =
    "ROW_NUMBER() OVER (PARTITION BY clientid ORDER BY \"timestamp\" DESC) AS clientid_rank";

/// One of the aggregate queries merged into the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReportPass {
    /// Summed counters: hours, crashes, search referrals.
    Simple,
    /// Deduplicated clients: actives, new profiles, default browser.
    Client,
    /// Clients seen last period but not this one.
    Inactive,
    /// Clients active on enough distinct days.
    Frequency,
}

impl ReportPass {
    /// Passes in the order they run and merge.
    pub const ALL: [ReportPass; 4] = [
        ReportPass::Simple,
        ReportPass::Client,
        ReportPass::Inactive,
        ReportPass::Frequency,
    ];

    pub fn description(self) -> &'static str {
        match self {
            ReportPass::Simple => "simple aggregates",
            ReportPass::Client => "per-client aggregates",
            ReportPass::Inactive => "inactives",
            ReportPass::Frequency => "five-of-seven",
        }
    }
}

impl fmt::Display for ReportPass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Partition tables of both periods of a window, after the existence filter.
#[derive(Debug, Clone)]
pub struct WindowPartitions<'w> {
    window: &'w ReportWindow,
    this_period: Vec<PartitionTable>,
    last_period: Vec<PartitionTable>,
}

impl<'w> WindowPartitions<'w> {
    pub fn resolve(window: &'w ReportWindow, known_tables: Option<&BTreeSet<String>>) -> Self {
        Self {
            window,
            this_period: resolve_partitions(
                EXECUTIVE_SUMMARY_PREFIX,
                window.this_period(),
                known_tables,
            ),
            last_period: resolve_partitions(
                EXECUTIVE_SUMMARY_PREFIX,
                window.last_period(),
                known_tables,
            ),
        }
    }

    pub fn this_period(&self) -> &[PartitionTable] {
        &self.this_period
    }

    pub fn last_period(&self) -> &[PartitionTable] {
        &self.last_period
    }

    /// The SQL for a pass, or `None` when the partitions it reads are all
    /// missing and it can only produce zero rows.
    pub fn query(&self, pass: ReportPass) -> Option<Query> {
        let query = match pass {
            ReportPass::Simple => self.simple_aggregates(),
            ReportPass::Client => self.client_aggregates(),
            ReportPass::Inactive => self.inactives(),
            ReportPass::Frequency => self.frequency(),
        };
        if query.is_none() {
            warn!(pass = %pass, anchor = %self.window.anchor(), "no partitions available, skipping pass");
        }
        query
    }

    fn simple_aggregates(&self) -> Option<Query> {
        if self.this_period.is_empty() {
            return None;
        }

        let mut q = QueryBuilder::new();
        q.push("SELECT geo, channel, os, ")
            .bind_date(self.window.anchor())
            .push(
                " AS \"date\", hours, crashes, google, bing, yahoo, other FROM (\n SELECT\n  ",
            )
            .push(KEY_COLUMNS)
            .push(
                ",
  CAST(COALESCE(SUM(hours), 0) AS DOUBLE) AS hours,
  -- Count the number of crash documents
  CAST(SUM(CASE WHEN doctype = 'crash' THEN 1 ELSE 0 END) AS BIGINT) AS crashes,
  CAST(COALESCE(SUM(google), 0) AS BIGINT) AS google,
  CAST(COALESCE(SUM(bing), 0) AS BIGINT) AS bing,
  CAST(COALESCE(SUM(yahoo), 0) AS BIGINT) AS yahoo,
  CAST(COALESCE(SUM(other), 0) AS BIGINT) AS other
 FROM ",
            );
        push_period(&mut q, &self.this_period, "this_period");
        q.push("\n GROUP BY 1, 2, 3\n) aggregates");
        Some(q.build())
    }

    fn client_aggregates(&self) -> Option<Query> {
        if self.this_period.is_empty() {
            return None;
        }

        let mut q = QueryBuilder::new();
        q.push("SELECT geo, channel, os, ")
            .bind_date(self.window.anchor())
            .push(
                " AS \"date\", actives, new_records, default_count FROM (
 SELECT geo, channel, os,
  CAST(COUNT(*) AS BIGINT) AS actives,
  CAST(SUM(new_client) AS BIGINT) AS new_records,
  CAST(SUM(default_client) AS BIGINT) AS default_count
 FROM (
  SELECT
   ",
            )
            .push(KEY_COLUMNS)
            .push(",\n   CASE WHEN profilecreationtimestamp >= ")
            .bind_date(self.window.anchor())
            .push(" AND profilecreationtimestamp < ")
            .bind_date(self.window.period_end())
            .push(
                " THEN 1 ELSE 0 END AS new_client,
   CASE WHEN \"default\" THEN 1 ELSE 0 END AS default_client,
   ",
            )
            .push(RECENCY_RANK)
            .push("\n  FROM ");
        push_period(&mut q, &self.this_period, "this_period");
        q.push(
            "
 ) ranked
 WHERE clientid_rank = 1
 GROUP BY 1, 2, 3
) client_values",
        );
        Some(q.build())
    }

    fn inactives(&self) -> Option<Query> {
        if self.last_period.is_empty() {
            return None;
        }

        let mut q = QueryBuilder::new();
        q.push("SELECT geo, channel, os, ")
            .bind_date(self.window.anchor())
            .push(
                " AS \"date\", inactives FROM (
 SELECT geo, channel, os, CAST(COUNT(*) AS BIGINT) AS inactives
 FROM (
  SELECT
   ",
            )
            .push(KEY_COLUMNS)
            .push(",\n   ")
            .push(RECENCY_RANK)
            .push("\n  FROM ");
        push_period(&mut q, &self.last_period, "last_period");
        q.push("\n  WHERE clientid IN (SELECT clientid FROM ");
        push_period(&mut q, &self.last_period, "last_ids");
        // With no partitions this period, every client of last period is inactive.
        if !self.this_period.is_empty() {
            q.push(" EXCEPT SELECT clientid FROM ");
            push_period(&mut q, &self.this_period, "this_ids");
        }
        q.push(
            ")
 ) ranked
 WHERE clientid_rank = 1
 GROUP BY 1, 2, 3
) inactive_counts",
        );
        Some(q.build())
    }

    fn frequency(&self) -> Option<Query> {
        if self.this_period.is_empty() {
            return None;
        }

        let mut q = QueryBuilder::new();
        q.push("SELECT geo, channel, os, ")
            .bind_date(self.window.anchor())
            .push(
                " AS \"date\", five_of_seven FROM (
 SELECT latest.geo, latest.channel, latest.os,
  CAST(SUM(CASE WHEN activity.num_days >= ",
            )
            .bind(self.window.frequency_threshold())
            .push(
                " THEN 1 ELSE 0 END) AS BIGINT) AS five_of_seven
 FROM (
  SELECT clientid, ",
            )
            .push(KEY_COLUMNS)
            .push(",\n   ")
            .push(RECENCY_RANK)
            .push("\n  FROM ");
        push_period(&mut q, &self.this_period, "this_period");
        q.push(
            "
 ) latest
 JOIN (
  -- Number of days on which we received submissions from this client
  SELECT clientid, COUNT(DISTINCT CAST(\"timestamp\" AS DATE)) AS num_days
  FROM ",
        );
        push_period(&mut q, &self.this_period, "this_days");
        q.push(
            "
  GROUP BY clientid
 ) activity ON latest.clientid = activity.clientid
 WHERE latest.clientid_rank = 1
 GROUP BY 1, 2, 3
) frequent",
        );
        Some(q.build())
    }
}

/// `(SELECT * FROM p1 UNION ALL SELECT * FROM p2 ...) alias`
fn push_period(q: &mut QueryBuilder, tables: &[PartitionTable], alias: &str) {
    q.push("(");
    q.union_all(tables, |q, table| {
        q.push("SELECT * FROM ").push(&table.name());
    });
    q.push(") ").push(alias);
}
