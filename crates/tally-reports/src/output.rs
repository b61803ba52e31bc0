//! Executive report serialization.

use crate::delimited::write_record;
use crate::record::Report;
use std::io::{self, Write};

pub const REPORT_HEADER: [&str; 16] = [
    "geo",
    "channel",
    "os",
    "date",
    "actives",
    "hours",
    "inactives",
    "new_records",
    "five_of_seven",
    "total_records",
    "crashes",
    "default",
    "google",
    "bing",
    "yahoo",
    "other",
];

/// Write the header and one row per key, in key order.
pub fn write_report<W: Write + ?Sized>(out: &mut W, report: &Report) -> io::Result<()> {
    write_record(out, REPORT_HEADER)?;
    for (key, record) in report.iter() {
        write_record(
            out,
            [
                key.geo.clone(),
                key.channel.clone(),
                key.os.clone(),
                key.date.clone(),
                record.actives.to_string(),
                record.hours.to_string(),
                record.inactives.to_string(),
                record.new_records.to_string(),
                record.five_of_seven.to_string(),
                record.total_records.to_string(),
                record.crashes.to_string(),
                record.default_count.to_string(),
                record.google.to_string(),
                record.bing.to_string(),
                record.yahoo.to_string(),
                record.other.to_string(),
            ],
        )?;
    }
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::CompositeKey;

    #[test]
    fn test_header_only_for_empty_report() {
        let mut out = Vec::new();
        write_report(&mut out, &Report::new()).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "geo,channel,os,date,actives,hours,inactives,new_records,five_of_seven,total_records,crashes,default,google,bing,yahoo,other\n"
        );
    }

    #[test]
    fn test_rows_follow_key_order() {
        let mut report = Report::new();
        let record = report.record_mut(CompositeKey::new("US", "release", "Linux", "2015-11-02"));
        record.actives = 2;
        record.hours = 1.5;
        report.record_mut(CompositeKey::new("", "beta", "Darwin, 15", "2015-11-02"));

        let mut out = Vec::new();
        write_report(&mut out, &report).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], ",beta,\"Darwin, 15\",2015-11-02,0,0,0,0,0,0,0,0,0,0,0,0");
        assert_eq!(lines[2], "US,release,Linux,2015-11-02,2,1.5,0,0,0,0,0,0,0,0,0,0");
    }
}
