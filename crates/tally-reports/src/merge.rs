//! Runs the executive report passes and folds their rows into a [`Report`].

use crate::errors::ReportError;
use crate::executive::{ReportPass, WindowPartitions};
use crate::record::{CompositeKey, Report};
use crate::window::ReportWindow;
use std::collections::BTreeSet;
use tally_backend::{Backend, BackendError, ResultSet, Row};
use tracing::{debug, info};

/// Which passes a run executes. All of them by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassSelection {
    pub simple: bool,
    pub client: bool,
    pub inactive: bool,
    pub frequency: bool,
}

impl Default for PassSelection {
    fn default() -> Self {
        Self {
            simple: true,
            client: true,
            inactive: true,
            frequency: true,
        }
    }
}

impl PassSelection {
    pub fn includes(&self, pass: ReportPass) -> bool {
        match pass {
            ReportPass::Simple => self.simple,
            ReportPass::Client => self.client,
            ReportPass::Inactive => self.inactive,
            ReportPass::Frequency => self.frequency,
        }
    }
}

/// Execute the selected passes in order and merge every row they return.
///
/// A failing query aborts the run; nothing partial is returned.
pub fn run_report(
    backend: &dyn Backend,
    window: &ReportWindow,
    known_tables: Option<&BTreeSet<String>>,
    selection: PassSelection,
) -> Result<Report, ReportError> {
    let partitions = WindowPartitions::resolve(window, known_tables);
    let mut report = Report::new();

    for pass in ReportPass::ALL {
        if !selection.includes(pass) {
            debug!(pass = %pass, "pass disabled, skipping");
            continue;
        }
        let Some(query) = partitions.query(pass) else {
            continue;
        };

        info!(pass = %pass, backend = backend.name(), "running query");
        let rows = query.execute(backend)?;
        let merged = merge_pass(pass, &rows, &mut report)?;
        debug!(pass = %pass, rows = merged, "merged rows");
    }

    Ok(report)
}

/// Merge the rows of one pass into the report, returning how many were merged.
pub fn merge_pass(
    pass: ReportPass,
    rows: &ResultSet,
    report: &mut Report,
) -> Result<usize, BackendError> {
    for row in rows.rows() {
        let record = report.record_mut(key_of(&row)?);
        match pass {
            ReportPass::Simple => {
                record.hours = row.float("hours")?;
                record.crashes = row.int("crashes")?;
                record.google = row.int("google")?;
                record.bing = row.int("bing")?;
                record.yahoo = row.int("yahoo")?;
                record.other = row.int("other")?;
            }
            ReportPass::Client => {
                record.actives = row.int("actives")?;
                record.new_records = row.int("new_records")?;
                record.default_count = row.int("default_count")?;
                record.total_records = record.actives + record.inactives;
            }
            ReportPass::Inactive => {
                record.inactives = row.int("inactives")?;
                record.total_records = record.actives + record.inactives;
            }
            ReportPass::Frequency => {
                record.five_of_seven = row.int("five_of_seven")?;
            }
        }
    }
    Ok(rows.len())
}

fn key_of(row: &Row<'_>) -> Result<CompositeKey, BackendError> {
    Ok(CompositeKey::new(
        row.text("geo")?,
        row.text("channel")?,
        row.text("os")?,
        row.text("date")?,
    ))
}
