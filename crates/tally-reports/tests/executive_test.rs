//! Integration tests for the executive report against DuckDB partitions

use chrono::NaiveDate;
use tally_backend::Backend;
use tally_backend_duckdb::DuckDbBackend;
use tally_reports::partitions::EXECUTIVE_SUMMARY_PREFIX;
use tally_reports::{
    run_report, write_report, CompositeKey, PassSelection, Report, ReportError, ReportMode,
    ReportWindow,
};
use tempfile::TempDir;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Create a daily partition and fill it with `rows`, each a parenthesized VALUES tuple.
fn seed_partition(backend: &DuckDbBackend, table: &str, rows: &[&str]) -> anyhow::Result<()> {
    backend.execute_batch(&format!(
        r#"
        CREATE TABLE {table} (
            clientid VARCHAR,
            "timestamp" TIMESTAMP,
            country VARCHAR,
            channel VARCHAR,
            os VARCHAR,
            profilecreationtimestamp TIMESTAMP,
            "default" BOOLEAN,
            hours DOUBLE,
            doctype VARCHAR,
            google INTEGER,
            bing INTEGER,
            yahoo INTEGER,
            other INTEGER
        );
        INSERT INTO {table} VALUES {values};
        "#,
        values = rows.join(",\n")
    ))?;
    Ok(())
}

fn open(dir: &TempDir) -> DuckDbBackend {
    DuckDbBackend::open(&dir.path().join("warehouse.duckdb")).unwrap()
}

fn weekly(anchor: NaiveDate) -> ReportWindow {
    ReportWindow::resolve(anchor, ReportMode::Weekly, None)
}

fn seed_single_week(backend: &DuckDbBackend) {
    seed_partition(
        backend,
        "executive_summary_20151102",
        &[
            "('A', '2015-11-02 10:00:00', 'US', 'release', 'Linux', '2015-11-02 09:00:00', true, 1.5, 'main', 1, 0, 0, 0)",
            "('A', '2015-11-05 10:00:00', 'US', 'release', 'Linux', '2015-11-02 09:00:00', true, 2.0, 'crash', 0, 1, 0, 0)",
            "('B', '2015-11-03 12:00:00', 'DE', NULL, 'Linux', '2015-01-01 00:00:00', false, 0.5, 'main', 0, 0, 2, 0)",
        ],
    )
    .unwrap();
}

#[test]
fn test_weekly_report_with_partition_check() {
    let dir = TempDir::new().unwrap();
    let backend = open(&dir);
    seed_single_week(&backend);

    let window = weekly(date(2015, 11, 2));
    let known = backend.list_tables(EXECUTIVE_SUMMARY_PREFIX).unwrap();
    let report = run_report(&backend, &window, Some(&known), PassSelection::default()).unwrap();

    assert_eq!(report.len(), 2);

    let us = report
        .get(&CompositeKey::new("US", "release", "Linux", "2015-11-02"))
        .unwrap();
    // A has two rows but is one client.
    assert_eq!(us.actives, 1);
    assert_eq!(us.hours, 3.5);
    assert_eq!(us.crashes, 1);
    assert_eq!(us.new_records, 1);
    assert_eq!(us.default_count, 1);
    assert_eq!(us.google, 1);
    assert_eq!(us.bing, 1);
    assert_eq!(us.inactives, 0);
    assert_eq!(us.total_records, 1);
    // Two distinct days is below the weekly threshold of five.
    assert_eq!(us.five_of_seven, 0);

    let de = report
        .get(&CompositeKey::new("DE", "", "Linux", "2015-11-02"))
        .unwrap();
    assert_eq!(de.actives, 1);
    assert_eq!(de.new_records, 0);
    assert_eq!(de.yahoo, 2);
    assert_eq!(de.five_of_seven, 0);
}

#[test]
fn test_missing_partitions_fail_without_check() {
    let dir = TempDir::new().unwrap();
    let backend = open(&dir);
    seed_single_week(&backend);

    let result = run_report(&backend, &weekly(date(2015, 11, 2)), None, PassSelection::default());
    assert!(matches!(result, Err(ReportError::Backend(_))));
}

#[test]
fn test_latest_observation_decides_key() {
    let dir = TempDir::new().unwrap();
    let backend = open(&dir);
    seed_partition(
        &backend,
        "executive_summary_20151102",
        &[
            "('A', '2015-11-02 10:00:00', 'US', 'release', 'Windows_NT', NULL, false, 1.0, 'main', 0, 0, 0, 0)",
            "('A', '2015-11-06 10:00:00', 'US', 'release', 'Linux', NULL, false, 1.0, 'main', 0, 0, 0, 0)",
        ],
    )
    .unwrap();

    let known = backend.list_tables(EXECUTIVE_SUMMARY_PREFIX).unwrap();
    let report = run_report(
        &backend,
        &weekly(date(2015, 11, 2)),
        Some(&known),
        PassSelection::default(),
    )
    .unwrap();

    let windows = report
        .get(&CompositeKey::new("US", "release", "Windows_NT", "2015-11-02"))
        .unwrap();
    let linux = report
        .get(&CompositeKey::new("US", "release", "Linux", "2015-11-02"))
        .unwrap();
    assert_eq!(windows.actives, 0);
    assert_eq!(windows.hours, 1.0);
    assert_eq!(linux.actives, 1);
}

#[test]
fn test_inactives_and_totals() {
    let dir = TempDir::new().unwrap();
    let backend = open(&dir);
    seed_partition(
        &backend,
        "executive_summary_20151026",
        &[
            "('A', '2015-10-26 10:00:00', 'US', 'release', 'Linux', NULL, false, 1.0, 'main', 0, 0, 0, 0)",
            "('C', '2015-10-27 10:00:00', 'US', 'release', 'Linux', NULL, false, 1.0, 'main', 0, 0, 0, 0)",
            "('C', '2015-10-30 10:00:00', 'FR', 'beta', 'Darwin', NULL, false, 1.0, 'main', 0, 0, 0, 0)",
        ],
    )
    .unwrap();
    seed_partition(
        &backend,
        "executive_summary_20151103",
        &["('A', '2015-11-03 10:00:00', 'US', 'release', 'Linux', NULL, false, 1.0, 'main', 0, 0, 0, 0)"],
    )
    .unwrap();

    let known = backend.list_tables(EXECUTIVE_SUMMARY_PREFIX).unwrap();
    let report = run_report(
        &backend,
        &weekly(date(2015, 11, 2)),
        Some(&known),
        PassSelection::default(),
    )
    .unwrap();

    // C was last seen on FR/beta/Darwin and is missing this week.
    let inactive = report
        .get(&CompositeKey::new("FR", "beta", "Darwin", "2015-11-02"))
        .unwrap();
    assert_eq!(inactive.inactives, 1);
    assert_eq!(inactive.actives, 0);
    assert_eq!(inactive.total_records, 1);

    let active = report
        .get(&CompositeKey::new("US", "release", "Linux", "2015-11-02"))
        .unwrap();
    assert_eq!(active.actives, 1);
    assert_eq!(active.inactives, 0);
    assert_eq!(active.total_records, 1);
}

#[test]
fn test_skipped_passes_leave_fields_zero() {
    let dir = TempDir::new().unwrap();
    let backend = open(&dir);
    seed_single_week(&backend);

    let known = backend.list_tables(EXECUTIVE_SUMMARY_PREFIX).unwrap();
    let selection = PassSelection {
        client: false,
        frequency: false,
        ..PassSelection::default()
    };
    let report = run_report(&backend, &weekly(date(2015, 11, 2)), Some(&known), selection).unwrap();

    let us = report
        .get(&CompositeKey::new("US", "release", "Linux", "2015-11-02"))
        .unwrap();
    assert_eq!(us.hours, 3.5);
    assert_eq!(us.actives, 0);
    assert_eq!(us.total_records, 0);
}

#[test]
fn test_report_csv() {
    let dir = TempDir::new().unwrap();
    let backend = open(&dir);
    seed_single_week(&backend);

    let known = backend.list_tables(EXECUTIVE_SUMMARY_PREFIX).unwrap();
    let report = run_report(
        &backend,
        &weekly(date(2015, 11, 2)),
        Some(&known),
        PassSelection::default(),
    )
    .unwrap();

    let mut out = Vec::new();
    write_report(&mut out, &report).unwrap();
    let text = String::from_utf8(out).unwrap();

    assert_eq!(
        text,
        "geo,channel,os,date,actives,hours,inactives,new_records,five_of_seven,total_records,crashes,default,google,bing,yahoo,other\n\
         DE,,Linux,2015-11-02,1,0.5,0,0,0,1,0,0,0,0,2,0\n\
         US,release,Linux,2015-11-02,1,3.5,0,1,0,1,1,1,1,1,0,0\n"
    );
}

/// One `US/release/Linux` observation for `client` at noon on `day`.
fn observation(client: &str, day: NaiveDate, profile_created: &str) -> String {
    format!(
        "('{client}', '{day} 12:00:00', 'US', 'release', 'Linux', '{profile_created}', false, 1.0, 'main', 0, 0, 0, 0)"
    )
}

fn observations(client: &str, first: NaiveDate, days: usize, profile_created: &str) -> Vec<String> {
    first
        .iter_days()
        .take(days)
        .map(|day| observation(client, day, profile_created))
        .collect()
}

fn report_for(backend: &DuckDbBackend, window: &ReportWindow) -> Report {
    let known = backend.list_tables(EXECUTIVE_SUMMARY_PREFIX).unwrap();
    run_report(backend, window, Some(&known), PassSelection::default()).unwrap()
}

#[test]
fn test_weekly_frequency_threshold_and_new_profiles() {
    let dir = TempDir::new().unwrap();
    let backend = open(&dir);
    let anchor = date(2015, 11, 2);

    // F is seen on five days with a profile created at the end of the period;
    // G on four days with a profile created in its last second.
    let mut rows = observations("F", anchor, 5, "2015-11-09 00:00:00");
    rows.extend(observations("G", anchor, 4, "2015-11-08 23:59:59"));
    let rows: Vec<&str> = rows.iter().map(String::as_str).collect();
    seed_partition(&backend, "executive_summary_20151102", &rows).unwrap();

    let report = report_for(&backend, &weekly(anchor));
    let record = report
        .get(&CompositeKey::new("US", "release", "Linux", "2015-11-02"))
        .unwrap();

    assert_eq!(record.actives, 2);
    assert_eq!(record.five_of_seven, 1);
    assert_eq!(record.new_records, 1);
    assert_eq!(record.total_records, 2);
}

#[test]
fn test_monthly_frequency_threshold() {
    let dir = TempDir::new().unwrap();
    let backend = open(&dir);
    let anchor = date(2015, 11, 1);

    let mut rows = observations("M", anchor, 21, "2015-01-01 00:00:00");
    rows.extend(observations("N", anchor, 20, "2015-01-01 00:00:00"));
    let rows: Vec<&str> = rows.iter().map(String::as_str).collect();
    seed_partition(&backend, "executive_summary_20151101", &rows).unwrap();

    let window = ReportWindow::resolve(anchor, ReportMode::Monthly, None);
    let report = report_for(&backend, &window);
    let record = report
        .get(&CompositeKey::new("US", "release", "Linux", "2015-11-01"))
        .unwrap();

    assert_eq!(record.actives, 2);
    // 21 distinct days meets the monthly threshold, 20 does not.
    assert_eq!(record.five_of_seven, 1);
    assert_eq!(record.new_records, 0);
    assert_eq!(record.hours, 41.0);
}
