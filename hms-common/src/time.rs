//! Timestamp utilities

use chrono::{DateTime, NaiveDateTime, Utc};

/// Convert milliseconds to duration
pub fn millis_to_duration(millis: u64) -> std::time::Duration {
    std::time::Duration::from_millis(millis)
}

/// Parse an ISO-8601 timestamp.
///
/// Accepts RFC 3339 (`2025-01-02T03:04:05Z`, `+02:00` offsets) and the
/// offset-less forms database triggers commonly emit
/// (`2025-01-02T03:04:05.123456`, `2025-01-02 03:04:05`), which are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    // Postgres style "+00" offset without minutes
    if let Ok(ts) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Some(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};
    use std::time::Duration;

    #[test]
    fn test_millis_to_duration() {
        assert_eq!(millis_to_duration(0), Duration::ZERO);
        assert_eq!(millis_to_duration(2000), Duration::from_secs(2));
    }

    #[test]
    fn test_parse_rfc3339_with_offset() {
        let ts = parse_timestamp("2025-03-01T10:00:00+02:00").unwrap();
        assert_eq!(ts.hour(), 8);
        assert_eq!(ts.day(), 1);
    }

    #[test]
    fn test_parse_zulu() {
        let ts = parse_timestamp("2025-03-01T10:00:00.250Z").unwrap();
        assert_eq!(ts.timestamp_subsec_millis(), 250);
    }

    #[test]
    fn test_parse_naive_is_utc() {
        let ts = parse_timestamp("2025-03-01T10:00:00.123456").unwrap();
        assert_eq!(ts.hour(), 10);
        let ts = parse_timestamp("2025-03-01 10:00:00").unwrap();
        assert_eq!(ts.minute(), 0);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_timestamp("yesterday").is_none());
        assert!(parse_timestamp("").is_none());
    }
}
