//! The executive report mapping: one record of measures per composite key.

use std::collections::BTreeMap;

/// `(geography, channel, operating system, report date)`.
///
/// Components are never `NULL`: missing values are stored as empty strings.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CompositeKey {
    pub geo: String,
    pub channel: String,
    pub os: String,
    pub date: String,
}

impl CompositeKey {
    pub fn new(
        geo: impl Into<String>,
        channel: impl Into<String>,
        os: impl Into<String>,
        date: impl Into<String>,
    ) -> Self {
        Self {
            geo: geo.into(),
            channel: channel.into(),
            os: os.into(),
            date: date.into(),
        }
    }
}

/// The twelve measures of one report row.
///
/// Each pass fills only its own fields; the rest keep their values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportRecord {
    pub actives: i64,
    pub hours: f64,
    pub inactives: i64,
    pub new_records: i64,
    pub five_of_seven: i64,
    /// `actives + inactives`, once both passes have merged.
    pub total_records: i64,
    pub crashes: i64,
    pub default_count: i64,
    pub google: i64,
    pub bing: i64,
    pub yahoo: i64,
    pub other: i64,
}

/// Report records for a single run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Report {
    records: BTreeMap<CompositeKey, ReportRecord>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    /// The record for `key`, created all-zero on first reference.
    pub fn record_mut(&mut self, key: CompositeKey) -> &mut ReportRecord {
        self.records.entry(key).or_default()
    }

    pub fn get(&self, key: &CompositeKey) -> Option<&ReportRecord> {
        self.records.get(key)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CompositeKey, &ReportRecord)> {
        self.records.iter()
    }
}
