//! Stability rollups: per-day aggregates of main and crash pings written as
//! gzip CSV to object storage.
//!
//! Pings for day `D` keep arriving for a while after `D`, so each rollup
//! reads the partitions `D-1 ..= D-1+latency_interval` and filters on the
//! activity date recorded in the ping itself.

use crate::delimited::write_record;
use crate::errors::ReportError;
use crate::partitions::{
    resolve_partitions, PartitionTable, CRASH_SUMMARY_PREFIX, MAIN_SUMMARY_PREFIX,
};
use crate::query::{Query, QueryBuilder};
use crate::store::{BlobStore, CompressedWriter, DEFAULT_BUCKET};
use crate::summarize::summarize;
use crate::window::date_range;
use chrono::{Datelike, Days, NaiveDate};
use std::collections::BTreeSet;
use std::io::Write;
use tally_backend::{Backend, ResultSet};
use tracing::{info, warn};

/// How many days after an activity date its pings may still arrive.
pub const DEFAULT_LATENCY_INTERVAL: u32 = 10;

/// Session lengths are clamped to `[0, 25h]` seconds.
const MAX_SESSION_LENGTH: &str = "90000";

const DIMENSIONS: [&str; 12] = [
    "buildversion",
    "buildid",
    "buildarchitecture",
    "channel",
    "os",
    "osversion",
    "osservicepackmajor",
    "osservicepackminor",
    "locale",
    "activeexperimentid",
    "activeexperimentbranch",
    "country",
];

/// Summed as-is by the counts rollup.
const COUNTERS: [&str; 13] = [
    "abortsplugin",
    "abortscontent",
    "abortsgmplugin",
    "crashesdetectedplugin",
    "pluginhangs",
    "crashesdetectedcontent",
    "crashesdetectedgmplugin",
    "crashsubmitattemptmain",
    "crashsubmitattemptcontent",
    "crashsubmitattemptplugin",
    "crashsubmitsuccessmain",
    "crashsubmitsuccesscontent",
    "crashsubmitsuccessplugin",
];

/// Object path of a day's rollup artifact, e.g. `stability-rollups/2015/20151102-main.csv.gz`.
pub fn object_path(day: NaiveDate, suffix: &str) -> String {
    format!(
        "stability-rollups/{}/{}-{}",
        day.year(),
        day.format("%Y%m%d"),
        suffix
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivesSegment {
    Daily,
    Weekly,
}

impl ActivesSegment {
    pub fn as_str(self) -> &'static str {
        match self {
            ActivesSegment::Daily => "daily",
            ActivesSegment::Weekly => "weekly",
        }
    }
}

/// Dimensions of the actives rollup: everything but the build id.
fn active_dimensions() -> impl Iterator<Item = &'static str> {
    DIMENSIONS.into_iter().filter(|column| *column != "buildid")
}

pub fn counts_header() -> Vec<&'static str> {
    let mut header = DIMENSIONS.to_vec();
    header.extend(["abortedsessioncount", "subsessionlengths"]);
    header.extend(COUNTERS);
    header
}

pub fn actives_header() -> Vec<&'static str> {
    let mut header: Vec<&str> = active_dimensions().collect();
    header.extend(["active_days", "active_users"]);
    header
}

pub fn crashes_header() -> Vec<&'static str> {
    let mut header = DIMENSIONS.to_vec();
    header.extend(["hascrashenvironment", "crashes"]);
    header
}

/// Session counters per build and platform for pings active on `day`.
pub fn counts_query(day: NaiveDate, tables: &[PartitionTable]) -> Query {
    let dimensions = DIMENSIONS.join(", ");
    let sums: Vec<String> = COUNTERS
        .iter()
        .map(|column| format!("CAST(SUM({column}) AS BIGINT) AS {column}"))
        .collect();

    let mut q = QueryBuilder::new();
    q.push("SELECT ")
        .push(&dimensions)
        .push(
            ",
  CAST(SUM(CASE WHEN reason = 'aborted-session' THEN 1 ELSE 0 END) AS BIGINT) AS abortedsessioncount,
  CAST(SUM(subsessionlength) AS BIGINT) AS subsessionlengths,
  ",
        )
        .push(&sums.join(",\n  "))
        .push("\nFROM (");
    q.union_all(tables, |q, table| {
        q.push("\n  SELECT ")
            .push(&dimensions)
            .push(", reason, CASE WHEN subsessionlength < 0 THEN 0 WHEN subsessionlength > ")
            .push(MAX_SESSION_LENGTH)
            .push(" THEN ")
            .push(MAX_SESSION_LENGTH)
            .push(" ELSE subsessionlength END AS subsessionlength, ")
            .push(&COUNTERS.join(", "))
            .push(" FROM ")
            .push(&table.name())
            .push(" WHERE subsessiondate = ")
            .bind_date(day);
    });
    q.push("\n) submissions\nGROUP BY ").push(&dimensions);
    q.build()
}

/// Clients active on `day` (or in the week ending on it), counted by their
/// latest platform and the number of distinct days they were active.
pub fn actives_query(day: NaiveDate, segment: ActivesSegment, tables: &[PartitionTable]) -> Query {
    let dimensions = active_dimensions().collect::<Vec<_>>().join(", ");
    let week_start = day.checked_sub_days(Days::new(7)).unwrap_or(NaiveDate::MIN);

    let mut q = QueryBuilder::new();
    q.push("SELECT ")
        .push(&dimensions)
        .push(
            ", activedays AS active_days, CAST(COUNT(*) AS BIGINT) AS active_users
FROM (
  SELECT ",
        )
        .push(&dimensions)
        .push(
            ",
    DENSE_RANK() OVER (PARTITION BY clientid ORDER BY subsessiondate ASC) AS activedays,
    ROW_NUMBER() OVER (PARTITION BY clientid ORDER BY subsessiondate DESC) AS rownumber
  FROM (",
        );
    q.union_all(tables, |q, table| {
        q.push("\n    SELECT subsessiondate, clientid, ")
            .push(&dimensions)
            .push(" FROM ")
            .push(&table.name());
        match segment {
            ActivesSegment::Daily => {
                q.push(" WHERE subsessiondate = ").bind_date(day);
            }
            ActivesSegment::Weekly => {
                q.push(" WHERE subsessiondate <= ")
                    .bind_date(day)
                    .push(" AND subsessiondate > ")
                    .bind_date(week_start);
            }
        }
    });
    q.push("\n  ) submissions\n) ranked\nWHERE rownumber = 1\nGROUP BY ")
        .push(&dimensions)
        .push(", activedays");
    q.build()
}

/// Crash pings for `day` per build, platform and crash environment presence.
pub fn crashes_query(day: NaiveDate, tables: &[PartitionTable]) -> Query {
    let dimensions = DIMENSIONS.join(", ");

    let mut q = QueryBuilder::new();
    q.push("SELECT ")
        .push(&dimensions)
        .push(", hascrashenvironment, CAST(COUNT(*) AS BIGINT) AS crashes\nFROM (");
    q.union_all(tables, |q, table| {
        q.push("\n  SELECT ")
            .push(&dimensions)
            .push(", hascrashenvironment FROM ")
            .push(&table.name())
            .push(" WHERE crashdate = ")
            .bind_date(day);
    });
    q.push("\n) submissions\nGROUP BY ")
        .push(&dimensions)
        .push(", hascrashenvironment");
    q.build()
}

/// Days to roll up for an operator-supplied range.
///
/// The end is clamped to the cutoff. With a latency interval, the start moves
/// back so that days whose late pings have since arrived are recomputed.
pub fn plan_days(
    start: NaiveDate,
    end: NaiveDate,
    cutoff: NaiveDate,
    latency_interval: Option<u32>,
) -> Result<Vec<NaiveDate>, ReportError> {
    let end = end.min(cutoff);
    if start > end {
        return Err(ReportError::EmptyDateRange { start, end });
    }
    let first = latency_interval
        .and_then(|days| start.checked_sub_days(Days::new(u64::from(days))))
        .unwrap_or(start);
    Ok(first.iter_days().take_while(|day| *day <= end).collect())
}

#[derive(Debug, Clone)]
pub struct RollupSettings {
    pub bucket: String,
    pub latency_interval: u32,
    /// Last day with complete partitions.
    pub cutoff: NaiveDate,
    pub check_partitions: bool,
    /// Also write the weekly actives rollup from [`StabilityRollup::put_daily`].
    pub weekly_actives: bool,
}

impl RollupSettings {
    pub fn new(cutoff: NaiveDate) -> Self {
        Self {
            bucket: DEFAULT_BUCKET.to_string(),
            latency_interval: DEFAULT_LATENCY_INTERVAL,
            cutoff,
            check_partitions: false,
            weekly_actives: false,
        }
    }
}

/// Produces the rollup artifacts for single days.
pub struct StabilityRollup<'a> {
    backend: &'a dyn Backend,
    store: &'a dyn BlobStore,
    settings: RollupSettings,
    known_tables: Option<BTreeSet<String>>,
}

impl<'a> StabilityRollup<'a> {
    pub fn new(
        backend: &'a dyn Backend,
        store: &'a dyn BlobStore,
        settings: RollupSettings,
    ) -> Result<Self, ReportError> {
        let known_tables = if settings.check_partitions {
            let mut known = backend.list_tables(MAIN_SUMMARY_PREFIX)?;
            known.extend(backend.list_tables(CRASH_SUMMARY_PREFIX)?);
            Some(known)
        } else {
            None
        };
        Ok(Self {
            backend,
            store,
            settings,
            known_tables,
        })
    }

    pub fn settings(&self) -> &RollupSettings {
        &self.settings
    }

    /// Counts, daily actives and crashes for `day`, then the summary built from them.
    /// Weekly actives are written too when the settings ask for them.
    pub fn put_daily(&self, day: NaiveDate) -> Result<(), ReportError> {
        info!(%day, "generating rollups");
        self.put_counts(day)?;
        self.put_actives(day, ActivesSegment::Daily)?;
        if self.settings.weekly_actives {
            self.put_actives(day, ActivesSegment::Weekly)?;
        }
        self.put_crashes(day)?;
        summarize(self.store, &self.settings.bucket, day)
    }

    pub fn put_counts(&self, day: NaiveDate) -> Result<(), ReportError> {
        let tables = self.partitions(MAIN_SUMMARY_PREFIX, self.latency_dates(day));
        let rows = self.run(&tables, || counts_query(day, &tables))?;
        self.upload(day, "main.csv.gz", &counts_header(), rows.as_ref())
    }

    pub fn put_actives(&self, day: NaiveDate, segment: ActivesSegment) -> Result<(), ReportError> {
        let dates = match segment {
            ActivesSegment::Daily => self.latency_dates(day),
            ActivesSegment::Weekly => self.dates_from(day, 8, self.settings.latency_interval + 8),
        };
        let tables = self.partitions(MAIN_SUMMARY_PREFIX, dates);
        let rows = self.run(&tables, || actives_query(day, segment, &tables))?;
        let suffix = format!("active-{}.csv.gz", segment.as_str());
        self.upload(day, &suffix, &actives_header(), rows.as_ref())
    }

    pub fn put_crashes(&self, day: NaiveDate) -> Result<(), ReportError> {
        let tables = self.partitions(CRASH_SUMMARY_PREFIX, self.latency_dates(day));
        let rows = self.run(&tables, || crashes_query(day, &tables))?;
        self.upload(day, "crashes.csv.gz", &crashes_header(), rows.as_ref())
    }

    fn latency_dates(&self, day: NaiveDate) -> Vec<NaiveDate> {
        self.dates_from(day, 1, self.settings.latency_interval + 1)
    }

    fn dates_from(&self, day: NaiveDate, days_before: u64, count: u32) -> Vec<NaiveDate> {
        let start = day
            .checked_sub_days(Days::new(days_before))
            .unwrap_or(NaiveDate::MIN);
        date_range(start, count as usize, Some(self.settings.cutoff)).collect()
    }

    fn partitions(&self, prefix: &'static str, dates: Vec<NaiveDate>) -> Vec<PartitionTable> {
        resolve_partitions(prefix, &dates, self.known_tables.as_ref())
    }

    fn run(
        &self,
        tables: &[PartitionTable],
        query: impl FnOnce() -> Query,
    ) -> Result<Option<ResultSet>, ReportError> {
        if tables.is_empty() {
            warn!("no partitions available, writing an empty rollup");
            return Ok(None);
        }
        Ok(Some(query().execute(self.backend)?))
    }

    fn upload(
        &self,
        day: NaiveDate,
        suffix: &str,
        header: &[&str],
        rows: Option<&ResultSet>,
    ) -> Result<(), ReportError> {
        let path = object_path(day, suffix);
        let mut writer = CompressedWriter::new(self.store, &self.settings.bucket, &path);
        let storage_error = |source| ReportError::Storage {
            bucket: self.settings.bucket.clone(),
            path: path.clone(),
            source,
        };

        write_record(&mut writer, header).map_err(storage_error)?;
        for row in rows.into_iter().flat_map(|rows| rows.rows()) {
            write_record(&mut writer, row.values().iter().map(|value| value.to_string()))
                .map_err(storage_error)?;
        }
        writer.flush().map_err(storage_error)?;
        writer.finish()?;

        info!(path = %path, rows = rows.map_or(0, ResultSet::len), "wrote rollup");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn tables(prefix: &'static str, first: NaiveDate, n: usize) -> Vec<PartitionTable> {
        first
            .iter_days()
            .take(n)
            .map(|day| PartitionTable::new(prefix, day))
            .collect()
    }

    #[test]
    fn test_object_path() {
        assert_eq!(
            object_path(date(2015, 11, 2), "main.csv.gz"),
            "stability-rollups/2015/20151102-main.csv.gz"
        );
    }

    #[test]
    fn test_counts_query_binds_day_per_partition() {
        let day = date(2015, 11, 2);
        let query = counts_query(day, &tables(MAIN_SUMMARY_PREFIX, date(2015, 11, 1), 3));

        assert_eq!(query.params.len(), 3);
        assert_eq!(query.sql.matches("UNION ALL").count(), 2);
        assert!(query.sql.contains("FROM main_summary_20151103 WHERE subsessiondate = CAST(? AS DATE)"));
        assert!(query.sql.contains("WHEN subsessionlength > 90000 THEN 90000"));
        assert!(query.sql.contains("AS crashsubmitsuccessplugin"));
    }

    #[test]
    fn test_weekly_actives_bounds() {
        let day = date(2015, 11, 8);
        let query = actives_query(
            day,
            ActivesSegment::Weekly,
            &tables(MAIN_SUMMARY_PREFIX, date(2015, 10, 31), 1),
        );
        let inlined = query.inline();

        assert!(inlined.contains("subsessiondate <= CAST('2015-11-08' AS DATE)"));
        assert!(inlined.contains("subsessiondate > CAST('2015-11-01' AS DATE)"));
        assert!(!query.sql.contains("buildid"));
    }

    #[test]
    fn test_headers() {
        assert_eq!(counts_header().len(), 27);
        assert_eq!(actives_header().len(), 13);
        assert_eq!(crashes_header().last(), Some(&"crashes"));
    }

    #[test]
    fn test_plan_days_with_latency() {
        let days = plan_days(date(2015, 11, 20), date(2015, 11, 30), date(2015, 11, 21), Some(10)).unwrap();
        assert_eq!(days.first(), Some(&date(2015, 11, 10)));
        assert_eq!(days.last(), Some(&date(2015, 11, 21)));
    }

    #[test]
    fn test_plan_days_without_latency() {
        let days = plan_days(date(2015, 11, 20), date(2015, 11, 20), date(2015, 11, 30), None).unwrap();
        assert_eq!(days, vec![date(2015, 11, 20)]);
    }

    #[test]
    fn test_plan_days_empty_range() {
        let result = plan_days(date(2015, 11, 25), date(2015, 11, 30), date(2015, 11, 21), Some(10));
        assert!(matches!(result, Err(ReportError::EmptyDateRange { .. })));
    }
}
