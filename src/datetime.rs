//! Date/time helpers for timestamps stored by SQLite.

use chrono::{DateTime, NaiveDateTime, Utc};

/// Format produced by SQLite's `datetime('now')`.
const SQLITE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parse a stored timestamp (SQLite format or RFC 3339) as UTC.
pub fn parse_utc(datetime_str: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(datetime_str) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(datetime_str, SQLITE_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// Convert a stored timestamp to RFC 3339 (e.g. `2024-01-15T10:30:00Z`).
///
/// Returns the input unchanged if it cannot be parsed.
pub fn to_rfc3339(datetime_str: &str) -> String {
    match parse_utc(datetime_str) {
        Some(dt) => dt.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        None => datetime_str.to_string(),
    }
}
