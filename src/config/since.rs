//! `--modified-since` parsing.

use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};

/// Parse a lower bound for pulled modification times.
/// Supports:
/// - RFC 3339 timestamps: "2024-03-01T08:30:00+02:00"
/// - Plain dates, taken as UTC midnight: "2024-03-01"
pub fn parse_modified_since(s: &str) -> anyhow::Result<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        anyhow::bail!("Empty --modified-since value");
    }

    if let Ok(timestamp) = DateTime::parse_from_rfc3339(s) {
        return Ok(timestamp.with_timezone(&Utc));
    }

    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| {
        format!("Invalid --modified-since value '{s}': expected RFC 3339 or YYYY-MM-DD")
    })?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .with_context(|| format!("Invalid date: {s}"))?;
    Ok(midnight.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_rfc3339_is_converted_to_utc() {
        assert_eq!(
            parse_modified_since("2024-03-01T08:30:00+02:00").unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 1, 6, 30, 0).unwrap()
        );
    }

    #[test]
    fn test_plain_date_is_utc_midnight() {
        assert_eq!(
            parse_modified_since(" 2024-03-01 ").unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_invalid_values() {
        assert!(parse_modified_since("").is_err());
        assert!(parse_modified_since("yesterday").is_err());
        assert!(parse_modified_since("2024-13-01").is_err());
        assert!(parse_modified_since("2024-03-01 08:30").is_err());
    }
}
