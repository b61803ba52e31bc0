//! Comma-delimited text, quoted only where a field needs it.

use std::io::{self, Write};

const DELIMITER: char = ',';

fn needs_quotes(field: &str) -> bool {
    field.contains([DELIMITER, '"', '\n', '\r'])
}

/// Write one record followed by a newline.
pub fn write_record<W, I, S>(out: &mut W, fields: I) -> io::Result<()>
where
    W: Write + ?Sized,
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut line = String::new();
    for (i, field) in fields.into_iter().enumerate() {
        if i > 0 {
            line.push(DELIMITER);
        }
        let field = field.as_ref();
        if needs_quotes(field) {
            line.push('"');
            line.push_str(&field.replace('"', "\"\""));
            line.push('"');
        } else {
            line.push_str(field);
        }
    }
    line.push('\n');
    out.write_all(line.as_bytes())
}

/// Split delimited text into records. Quoted fields may span lines.
pub fn parse_records(text: &str) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        if quoted {
            match ch {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => quoted = false,
                _ => field.push(ch),
            }
            continue;
        }
        match ch {
            '"' => quoted = true,
            DELIMITER => record.push(std::mem::take(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            _ => field.push(ch),
        }
    }

    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;

    fn written(fields: &[&str]) -> String {
        let mut out = Vec::new();
        write_record(&mut out, fields).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_plain_fields() {
        assert_eq!(written(&["US", "", "release"]), "US,,release\n");
    }

    #[test]
    fn test_quoting() {
        assert_eq!(
            written(&["a,b", "say \"hi\"", "two\nlines"]),
            "\"a,b\",\"say \"\"hi\"\"\",\"two\nlines\"\n"
        );
    }

    #[test]
    fn test_parse_quoted_and_empty() {
        let records = parse_records("geo,os\n\"a,b\",\n\"x\"\"y\",\"multi\nline\"\r\nlast,1");
        assert_eq!(
            records,
            vec![
                vec!["geo".to_string(), "os".to_string()],
                vec!["a,b".to_string(), String::new()],
                vec!["x\"y".to_string(), "multi\nline".to_string()],
                vec!["last".to_string(), "1".to_string()],
            ]
        );
    }

    #[test]
    fn test_parse_reads_what_was_written() {
        let fields = ["Windows, 10", "", "\"quoted\""];
        let records = parse_records(&written(&fields));
        assert_eq!(records, vec![fields.map(String::from).to_vec()]);
    }
}
