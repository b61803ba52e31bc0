//! Date-partitioned table references and the optional existence filter.

use chrono::NaiveDate;
use std::collections::BTreeSet;
use std::fmt;
use tracing::warn;

/// Daily partitions of the executive summary data.
pub const EXECUTIVE_SUMMARY_PREFIX: &str = "executive_summary_";
/// Daily partitions of the main ping summary data.
pub const MAIN_SUMMARY_PREFIX: &str = "main_summary_";
/// Daily partitions of the crash ping summary data.
pub const CRASH_SUMMARY_PREFIX: &str = "crash_summary_";

/// A table holding one day of raw observations, named `<prefix>YYYYMMDD`.
///
/// Names are only ever built from a static prefix and a date, which is what
/// makes it acceptable to splice them into SQL text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PartitionTable {
    prefix: &'static str,
    date: NaiveDate,
}

impl PartitionTable {
    pub fn new(prefix: &'static str, date: NaiveDate) -> Self {
        Self { prefix, date }
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn name(&self) -> String {
        format!("{}{}", self.prefix, self.date.format("%Y%m%d"))
    }
}

impl fmt::Display for PartitionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.prefix, self.date.format("%Y%m%d"))
    }
}

/// Resolve dates to partition tables.
///
/// With `known_tables`, partitions missing from the set are dropped with a
/// warning. Without it every date is kept, and a missing table surfaces as a
/// query failure when the SQL runs.
pub fn resolve_partitions(
    prefix: &'static str,
    dates: &[NaiveDate],
    known_tables: Option<&BTreeSet<String>>,
) -> Vec<PartitionTable> {
    dates
        .iter()
        .map(|date| PartitionTable::new(prefix, *date))
        .filter(|table| match known_tables {
            Some(known) if !known.contains(&table.name()) => {
                warn!(table = %table, "partition not found, skipping");
                false
            }
            _ => true,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dates() -> Vec<NaiveDate> {
        NaiveDate::from_ymd_opt(2015, 11, 2)
            .unwrap()
            .iter_days()
            .take(3)
            .collect()
    }

    #[test]
    fn test_partition_name() {
        let table = PartitionTable::new(MAIN_SUMMARY_PREFIX, dates()[0]);
        assert_eq!(table.name(), "main_summary_20151102");
        assert_eq!(table.to_string(), table.name());
    }

    #[test]
    fn test_unchecked_keeps_everything() {
        let tables = resolve_partitions(EXECUTIVE_SUMMARY_PREFIX, &dates(), None);
        assert_eq!(tables.len(), 3);
    }

    #[test]
    fn test_known_tables_filter() {
        let known: BTreeSet<String> = ["executive_summary_20151103".to_string()].into();
        let tables = resolve_partitions(EXECUTIVE_SUMMARY_PREFIX, &dates(), Some(&known));
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].name(), "executive_summary_20151103");
    }
}
