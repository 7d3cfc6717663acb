//! On-disk record format
//!
//! The log is newline-delimited text. The first line is a human-readable
//! creation marker, every following line is one JSON object:
//!
//! ```text
//! ---Created: Tuesday, 14-Oct-25 09:30:00 UTC---
//! {"Time":"Tuesday, 14-Oct-25 09:30:01 UTC","Verb":"add","Key":"x","Value":"1","TTL":"60"}
//! ```
//!
//! `TTL` holds whole seconds as a string, `"-1"` meaning no TTL.

use crate::entry::{LogEntry, Verb};
use crate::errors::{AofError, RecoveryHint, Result};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const HEADER_PREFIX: &str = "---Created: ";
pub const HEADER_SUFFIX: &str = "---";

/// RFC 850 layout with a fixed UTC zone
pub const TIMESTAMP_FORMAT: &str = "%A, %d-%b-%y %H:%M:%S UTC";
const TIMESTAMP_FORMAT_NO_ZONE: &str = "%A, %d-%b-%y %H:%M:%S";

/// TTL marker for entries that never expire
pub const NO_TTL: &str = "-1";

/// Wire shape of a data line
#[derive(Debug, Serialize, Deserialize)]
struct RawRecord<'a> {
    #[serde(rename = "Time", borrow)]
    time: std::borrow::Cow<'a, str>,
    #[serde(rename = "Verb", borrow)]
    verb: std::borrow::Cow<'a, str>,
    #[serde(rename = "Key", borrow)]
    key: std::borrow::Cow<'a, str>,
    #[serde(rename = "Value", borrow)]
    value: std::borrow::Cow<'a, str>,
    #[serde(rename = "TTL", borrow)]
    ttl: std::borrow::Cow<'a, str>,
}

/// A parsed line of the log
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Header { created: String },
    Entry(LogEntry),
}

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a record timestamp.
///
/// Accepts the RFC 850 layout written by this crate, the same layout with any
/// trailing zone abbreviation (read as UTC), and RFC 3339.
pub fn parse_timestamp(raw: &str) -> std::result::Result<DateTime<Utc>, String> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT) {
        return Ok(Utc.from_utc_datetime(&naive));
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    if let Some((head, _zone)) = raw.rsplit_once(' ') {
        if let Ok(naive) = NaiveDateTime::parse_from_str(head, TIMESTAMP_FORMAT_NO_ZONE) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }
    Err(format!("unrecognised timestamp '{raw}'"))
}

/// Whole seconds, rounded up
pub fn format_ttl(ttl: Option<Duration>) -> String {
    match ttl {
        Some(ttl) => (ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0)).to_string(),
        None => NO_TTL.to_string(),
    }
}

pub fn parse_ttl(raw: &str) -> std::result::Result<Option<Duration>, String> {
    let raw = raw.trim();
    if raw.is_empty() || raw == NO_TTL {
        return Ok(None);
    }
    raw.parse::<u64>()
        .map(|secs| Some(Duration::from_secs(secs)))
        .map_err(|e| format!("invalid TTL '{raw}': {e}"))
}

/// The creation marker line, without its newline
pub fn header_line(created: &DateTime<Utc>) -> String {
    format!("{HEADER_PREFIX}{}{HEADER_SUFFIX}", format_timestamp(created))
}

pub fn is_header(line: &str) -> bool {
    let line = line.trim_end_matches(['\r', '\n']);
    line.len() >= HEADER_PREFIX.len() + HEADER_SUFFIX.len()
        && line.starts_with(HEADER_PREFIX)
        && line.ends_with(HEADER_SUFFIX)
}

/// Encode one entry as a complete line, newline included
pub fn encode_entry(entry: &LogEntry) -> Result<String> {
    let raw = RawRecord {
        time: format_timestamp(&entry.timestamp).into(),
        verb: entry.verb.as_str().into(),
        key: entry.key.as_str().into(),
        value: entry.value.as_str().into(),
        ttl: format_ttl(entry.ttl).into(),
    };

    let mut line = serde_json::to_string(&raw).map_err(|e| AofError::Serialization {
        key: entry.key.clone(),
        source: e,
        recovery_hint: RecoveryHint::Manual {
            instructions: "Check that the key and value are valid UTF-8".to_string(),
        },
    })?;
    line.push('\n');
    Ok(line)
}

/// Encode a batch into one contiguous buffer
pub fn encode_batch(entries: &[LogEntry]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(entries.len() * 96);
    for entry in entries {
        out.extend_from_slice(encode_entry(entry)?.as_bytes());
    }
    Ok(out)
}

/// Decode a data line. The error is a human-readable reason.
pub fn decode_entry(line: &str) -> std::result::Result<LogEntry, String> {
    let line = line.trim_end_matches(['\r', '\n']);
    let raw: RawRecord<'_> =
        serde_json::from_str(line).map_err(|e| format!("malformed record: {e}"))?;

    let verb = raw.verb.parse::<Verb>()?;
    let timestamp = parse_timestamp(&raw.time)?;
    let ttl = parse_ttl(&raw.ttl)?;

    Ok(LogEntry {
        timestamp,
        verb,
        key: raw.key.into_owned(),
        value: raw.value.into_owned(),
        ttl,
    })
}

/// Decode any line, header or data
pub fn decode_line(line: &str) -> std::result::Result<Record, String> {
    if is_header(line) {
        let line = line.trim_end_matches(['\r', '\n']);
        let created = &line[HEADER_PREFIX.len()..line.len() - HEADER_SUFFIX.len()];
        return Ok(Record::Header {
            created: created.to_string(),
        });
    }
    decode_entry(line).map(Record::Entry)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 14, 9, 30, 0).unwrap()
    }

    #[test]
    fn test_header_line() {
        let header = header_line(&fixed_time());
        assert_eq!(header, "---Created: Tuesday, 14-Oct-25 09:30:00 UTC---");
        assert!(is_header(&header));
        assert!(is_header(&format!("{header}\n")));
        assert!(!is_header("---Created: "));
        assert!(!is_header(r#"{"Time":"x"}"#));
    }

    #[test]
    fn test_encode_entry_layout() {
        let entry = LogEntry {
            timestamp: fixed_time(),
            verb: Verb::Add,
            key: "x".to_string(),
            value: "1".to_string(),
            ttl: Some(Duration::from_secs(60)),
        };
        let line = encode_entry(&entry).unwrap();
        assert_eq!(
            line,
            "{\"Time\":\"Tuesday, 14-Oct-25 09:30:00 UTC\",\"Verb\":\"add\",\"Key\":\"x\",\"Value\":\"1\",\"TTL\":\"60\"}\n"
        );
        assert_eq!(decode_entry(&line).unwrap(), entry);
    }

    #[test]
    fn test_values_with_quotes_and_newlines_stay_on_one_line() {
        let entry = LogEntry {
            timestamp: fixed_time(),
            verb: Verb::Add,
            key: "quote\"key".to_string(),
            value: "multi\nline".to_string(),
            ttl: None,
        };
        let line = encode_entry(&entry).unwrap();
        assert_eq!(line.matches('\n').count(), 1);
        assert!(line.contains("\"TTL\":\"-1\""));
        assert_eq!(decode_entry(&line).unwrap(), entry);
    }

    #[test]
    fn test_decode_spaced_original_layout() {
        let line = r#"{"Time":"Monday, 02-Jan-06 15:04:05 MST", "Verb":"add", "Key":"a", "Value":"b", "TTL":"10"}"#;
        let entry = decode_entry(line).unwrap();
        assert_eq!(entry.key, "a");
        assert_eq!(entry.value, "b");
        assert_eq!(entry.ttl, Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_entry("{\"Time\":").is_err());
        assert!(decode_entry(
            r#"{"Time":"Tuesday, 14-Oct-25 09:30:00 UTC","Verb":"upsert","Key":"a","Value":"","TTL":"-1"}"#
        )
        .unwrap_err()
        .contains("unknown verb"));
        assert!(decode_entry(
            r#"{"Time":"Tuesday, 14-Oct-25 09:30:00 UTC","Verb":"add","Key":"a","Value":"","TTL":"soon"}"#
        )
        .unwrap_err()
        .contains("invalid TTL"));
    }

    #[test]
    fn test_ttl_markers() {
        assert_eq!(parse_ttl("-1"), Ok(None));
        assert_eq!(parse_ttl(""), Ok(None));
        assert_eq!(parse_ttl("0"), Ok(Some(Duration::ZERO)));
        assert_eq!(format_ttl(None), "-1");
    }

    #[test]
    fn test_format_ttl_rounds_up() {
        assert_eq!(format_ttl(Some(Duration::from_secs(60))), "60");
        assert_eq!(format_ttl(Some(Duration::from_millis(1900))), "2");
        assert_eq!(format_ttl(Some(Duration::from_millis(300))), "1");
        assert_eq!(format_ttl(Some(Duration::ZERO)), "0");
    }

    #[test]
    fn test_parse_timestamp_rfc3339() {
        let ts = parse_timestamp("2025-10-14T09:30:00Z").unwrap();
        assert_eq!(ts, fixed_time());
    }

    #[test]
    fn test_decode_line_header() {
        let record = decode_line("---Created: Tuesday, 14-Oct-25 09:30:00 UTC---\n").unwrap();
        assert_eq!(
            record,
            Record::Header {
                created: "Tuesday, 14-Oct-25 09:30:00 UTC".to_string()
            }
        );
    }
}
