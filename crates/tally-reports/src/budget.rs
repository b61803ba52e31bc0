//! Daily submission volume checks against budget targets.
//!
//! Targets give, per channel, the expected client count and per document
//! type the expected bytes per document and documents per client. Observed
//! volumes are compared with `size * count * clients`.

use crate::alert::AlertEmail;
use crate::errors::ReportError;
use serde_json::Value;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::{debug, warn};

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Target key holding the expected client count rather than a document type.
const CLIENTS_KEY: &str = "clients";

/// Outcome of scoring one day.
#[derive(Debug, Default)]
pub struct BudgetReport {
    /// Sorted alert lines, one per breached target.
    pub alerts: Vec<String>,
    /// Set when scoring stopped early on data of the wrong shape. Alerts
    /// found before that point are kept.
    pub data_error: Option<ReportError>,
}

impl BudgetReport {
    pub fn exit_code(&self) -> u8 {
        self.data_error.as_ref().map_or(0, ReportError::exit_code)
    }
}

/// Load a JSON document, failing with an input error if it is unreadable or malformed.
pub fn load_json(path: &Path) -> Result<Value, ReportError> {
    let file = File::open(path).map_err(|source| ReportError::ReadInput {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_reader(BufReader::new(file)).map_err(|source| ReportError::MalformedJson {
        path: path.to_path_buf(),
        source,
    })
}

/// Compare observed volume for `day` (`YYYYMMDD`) with the targets.
pub fn check_targets(day: &str, targets: &Value, observed: &Value) -> BudgetReport {
    let mut alerts = Vec::new();
    let data_error = score(day, targets, observed, &mut alerts).err();
    if let Some(error) = &data_error {
        warn!(%error, "stopped scoring budget targets");
    }
    alerts.sort();
    BudgetReport { alerts, data_error }
}

fn score(
    day: &str,
    targets: &Value,
    observed: &Value,
    alerts: &mut Vec<String>,
) -> Result<(), ReportError> {
    let submission = object(field(observed, "submission", "observed data")?, "submission")?;

    for (channel, target) in object(targets, "targets")? {
        let Some(by_day) = submission.get(channel) else {
            debug!(%channel, "channel not found in data");
            continue;
        };
        let Some(observed_day) = object(by_day, channel)?.get(day) else {
            debug!(%channel, %day, "day not found in data");
            continue;
        };
        let observed_day = object(observed_day, &format!("{channel}/{day}"))?;

        let clients = number(field(target, CLIENTS_KEY, channel)?, &format!("{channel}/clients"))?;
        for (doc_type, doc_target) in object(target, channel)? {
            if doc_type == CLIENTS_KEY {
                continue;
            }
            let Some(actual) = observed_day.get(doc_type) else {
                debug!(%channel, %day, %doc_type, "document type not found in data");
                continue;
            };

            let path = format!("{channel}/{doc_type}");
            let size = number(field(doc_target, "size", &path)?, &format!("{path}/size"))?;
            let count = number(field(doc_target, "count", &path)?, &format!("{path}/count"))?;
            let expected = size * count * clients;
            let actual = number(
                field(actual, "size", &format!("{channel}/{day}/{doc_type}"))?,
                &format!("{channel}/{day}/{doc_type}/size"),
            )?;
            if actual <= expected {
                debug!(%channel, %doc_type, actual, expected, "within budget");
                continue;
            }
            if expected == 0.0 {
                return Err(ReportError::data_shape(format!(
                    "expected size for {path} is zero"
                )));
            }
            alerts.push(format_breach(channel, doc_type, actual, expected));
        }
    }
    Ok(())
}

/// `Channel nightly, Type main: Actual 0.00GB > Expected 0.00GB (150.0%)`
pub fn format_breach(channel: &str, doc_type: &str, actual: f64, expected: f64) -> String {
    let sign = if actual < expected { "<" } else { ">" };
    format!(
        "Channel {}, Type {}: Actual {:.2}GB {} Expected {:.2}GB ({:.1}%)",
        channel,
        doc_type,
        actual / BYTES_PER_GB,
        sign,
        expected / BYTES_PER_GB,
        actual / expected * 100.0
    )
}

/// The alert for a day's breaches, or `None` when every target was met.
pub fn compose_email(day: &str, from: &str, to: &[String], alerts: &[String]) -> Option<AlertEmail> {
    if alerts.is_empty() {
        return None;
    }
    Some(AlertEmail {
        from: from.to_string(),
        to: to.to_vec(),
        subject: format!("Incoming Telemetry data exceeded budget targets for {day}"),
        body: format!(
            "Incoming data for {day} exceeded budget targets:\n{}",
            alerts.join("\n")
        ),
    })
}

fn field<'v>(value: &'v Value, key: &str, context: &str) -> Result<&'v Value, ReportError> {
    value
        .get(key)
        .ok_or_else(|| ReportError::data_shape(format!("'{key}' missing from {context}")))
}

fn object<'v>(
    value: &'v Value,
    context: &str,
) -> Result<&'v serde_json::Map<String, Value>, ReportError> {
    value
        .as_object()
        .ok_or_else(|| ReportError::data_shape(format!("{context} is not an object")))
}

fn number(value: &Value, context: &str) -> Result<f64, ReportError> {
    value
        .as_f64()
        .ok_or_else(|| ReportError::data_shape(format!("{context} is not a number: {value}")))
}
