//! Reporting windows: which daily partitions make up "this period" and the
//! comparison "last period" for a report anchored at a start date.

use crate::errors::ReportError;
use chrono::{Datelike, Days, Months, NaiveDate};
use std::fmt;
use std::str::FromStr;

/// Active days in a week needed to count as a frequent user.
pub const WEEKLY_FREQUENCY_THRESHOLD: i64 = 5;
/// Active days in a month needed to count as a frequent user.
pub const MONTHLY_FREQUENCY_THRESHOLD: i64 = 21;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportMode {
    Weekly,
    Monthly,
}

impl ReportMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ReportMode::Weekly => "weekly",
            ReportMode::Monthly => "monthly",
        }
    }

    /// Distinct active days an entity needs within the window to count as
    /// frequently active (5 of 7, scaled to 21 for a month).
    pub fn frequency_threshold(self) -> i64 {
        match self {
            ReportMode::Weekly => WEEKLY_FREQUENCY_THRESHOLD,
            ReportMode::Monthly => MONTHLY_FREQUENCY_THRESHOLD,
        }
    }
}

impl fmt::Display for ReportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportMode {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "weekly" => Ok(ReportMode::Weekly),
            "monthly" => Ok(ReportMode::Monthly),
            _ => Err(ReportError::UnknownMode {
                mode: s.to_string(),
            }),
        }
    }
}

/// A resolved reporting window.
///
/// Both periods are ascending lists of partition dates. Dates after the
/// cutoff (the last day of complete data) are never included, so either
/// list may be truncated or empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportWindow {
    anchor: NaiveDate,
    mode: ReportMode,
    period_end: NaiveDate,
    this_period: Vec<NaiveDate>,
    last_period: Vec<NaiveDate>,
}

impl ReportWindow {
    pub fn resolve(anchor: NaiveDate, mode: ReportMode, cutoff: Option<NaiveDate>) -> Self {
        let (period_end, last_start) = match mode {
            ReportMode::Weekly => (
                anchor.checked_add_days(Days::new(7)).unwrap_or(NaiveDate::MAX),
                anchor.checked_sub_days(Days::new(7)).unwrap_or(NaiveDate::MIN),
            ),
            ReportMode::Monthly => (month_after(anchor), previous_month_start(anchor)),
        };

        let this_len = days_between(anchor, period_end);
        let last_len = days_between(last_start, anchor);

        Self {
            anchor,
            mode,
            period_end,
            this_period: date_range(anchor, this_len, cutoff).collect(),
            last_period: date_range(last_start, last_len, cutoff).collect(),
        }
    }

    pub fn anchor(&self) -> NaiveDate {
        self.anchor
    }

    pub fn mode(&self) -> ReportMode {
        self.mode
    }

    /// First day after the nominal end of this period, ignoring the cutoff.
    pub fn period_end(&self) -> NaiveDate {
        self.period_end
    }

    pub fn this_period(&self) -> &[NaiveDate] {
        &self.this_period
    }

    pub fn last_period(&self) -> &[NaiveDate] {
        &self.last_period
    }

    pub fn frequency_threshold(&self) -> i64 {
        self.mode.frequency_threshold()
    }
}

/// Iterate from `start` for the next `days` days, stopping after `cutoff`.
pub fn date_range(
    start: NaiveDate,
    days: usize,
    cutoff: Option<NaiveDate>,
) -> impl Iterator<Item = NaiveDate> {
    start
        .iter_days()
        .take(days)
        .take_while(move |day| cutoff.map_or(true, |cutoff| *day <= cutoff))
}

fn days_between(start: NaiveDate, end: NaiveDate) -> usize {
    usize::try_from((end - start).num_days()).unwrap_or(0)
}

/// Same day-of-month one month later, clamped to the end of shorter months
/// (Jan 31 -> Feb 28), so a monthly period always spans 28 to 31 days.
fn month_after(anchor: NaiveDate) -> NaiveDate {
    anchor
        .checked_add_months(Months::new(1))
        .unwrap_or(NaiveDate::MAX)
}

/// Walk backward from the day before `anchor` to the previous date with the
/// same day-of-month. Months without that day (the 31st in a 30-day month,
/// the 29th in a common-year February) are skipped, not treated as errors.
fn previous_month_start(anchor: NaiveDate) -> NaiveDate {
    let day = anchor.day();
    let mut current = anchor;
    while let Some(previous) = current.pred_opt() {
        current = previous;
        if current.day() == day {
            break;
        }
    }
    current
}
