//! Compact JSON summary of a day's counts and crashes rollups.

use crate::delimited::parse_records;
use crate::errors::ReportError;
use crate::rollup::object_path;
use crate::store::{read_compressed, BlobStore, CompressedWriter};
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::io::Write;
use tracing::{debug, info};

/// Counters carried over from the counts rollup, in output order.
pub const SUMMARY_COUNTERS: [&str; 15] = [
    "abortedsessioncount",
    "subsessionlengths",
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

const KEY_COLUMNS: [&str; 3] = ["channel", "buildid", "os"];

type SummaryKey = (String, String, String);

#[derive(Debug, Clone, Default, PartialEq)]
struct Counts {
    counters: [i64; SUMMARY_COUNTERS.len()],
    crashes: i64,
}

/// One entry of the summary array.
#[derive(Debug, Serialize)]
struct SummaryEntry {
    channel: String,
    buildid: String,
    os: String,
    #[serde(flatten)]
    counters: Map<String, Value>,
    crashesdetectedmain: i64,
}

/// Read `-main.csv.gz` and `-crashes.csv.gz` for `day` and write
/// `-summary.json.gz` next to them.
pub fn summarize(store: &dyn BlobStore, bucket: &str, day: NaiveDate) -> Result<(), ReportError> {
    let mut counts: BTreeMap<SummaryKey, Counts> = BTreeMap::new();

    let main_path = object_path(day, "main.csv.gz");
    let table = HeaderTable::parse(&read_compressed(store, bucket, &main_path)?, &main_path)?;
    let keys = table.indexes(&KEY_COLUMNS)?;
    let counters = table.indexes(&SUMMARY_COUNTERS)?;
    for row in &table.rows {
        let entry = counts.entry(summary_key(row, &keys)).or_default();
        for (slot, index) in counters.iter().enumerate() {
            entry.counters[slot] += nullint(field(row, *index), &main_path)?;
        }
    }

    let crashes_path = object_path(day, "crashes.csv.gz");
    let table = HeaderTable::parse(&read_compressed(store, bucket, &crashes_path)?, &crashes_path)?;
    let keys = table.indexes(&KEY_COLUMNS)?;
    for row in &table.rows {
        let crashes = nullint(row.last().map_or("", String::as_str), &crashes_path)?;
        counts.entry(summary_key(row, &keys)).or_default().crashes += crashes;
    }

    let entries: Vec<SummaryEntry> = counts
        .into_iter()
        .map(|((channel, buildid, os), c)| SummaryEntry {
            channel,
            buildid,
            os,
            counters: SUMMARY_COUNTERS
                .iter()
                .zip(c.counters)
                .map(|(name, value)| (name.to_string(), Value::from(value)))
                .collect(),
            crashesdetectedmain: c.crashes,
        })
        .collect();

    let summary_path = object_path(day, "summary.json.gz");
    let mut writer = CompressedWriter::new(store, bucket, &summary_path);
    serde_json::to_writer(&mut writer, &entries)
        .map_err(|e| ReportError::Storage {
            bucket: bucket.to_string(),
            path: summary_path.clone(),
            source: e.into(),
        })?;
    writer.flush().map_err(|e| ReportError::Storage {
        bucket: bucket.to_string(),
        path: summary_path.clone(),
        source: e,
    })?;
    writer.finish()?;

    info!(path = %summary_path, entries = entries.len(), "wrote summary");
    Ok(())
}

/// Delimited text split into its header and data rows.
struct HeaderTable<'p> {
    path: &'p str,
    header: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl<'p> HeaderTable<'p> {
    fn parse(text: &str, path: &'p str) -> Result<Self, ReportError> {
        let mut records = parse_records(text).into_iter();
        let header = records
            .next()
            .ok_or_else(|| ReportError::data_shape(format!("{path} has no header row")))?;
        let rows: Vec<Vec<String>> = records.collect();
        debug!(path, rows = rows.len(), "read rollup");
        Ok(Self { path, header, rows })
    }

    fn indexes(&self, columns: &[&str]) -> Result<Vec<usize>, ReportError> {
        columns
            .iter()
            .map(|column| {
                self.header
                    .iter()
                    .position(|name| name.as_str() == *column)
                    .ok_or_else(|| {
                        ReportError::data_shape(format!(
                            "{} has no column '{}'",
                            self.path, column
                        ))
                    })
            })
            .collect()
    }
}

fn field(row: &[String], index: usize) -> &str {
    row.get(index).map_or("", String::as_str)
}

fn summary_key(row: &[String], keys: &[usize]) -> SummaryKey {
    (
        field(row, keys[0]).to_string(),
        field(row, keys[1]).to_string(),
        field(row, keys[2]).to_string(),
    )
}

/// Empty fields count as zero.
fn nullint(value: &str, path: &str) -> Result<i64, ReportError> {
    if value.is_empty() {
        return Ok(0);
    }
    value
        .parse()
        .map_err(|_| ReportError::data_shape(format!("{path}: '{value}' is not an integer")))
}
