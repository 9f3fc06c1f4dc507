use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use thiserror::Error;
use tracing::warn;

/// Format every history entry is displayed with.
pub const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M";

const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%:z",
    "%Y-%m-%dT%H:%M:%S%z",
    "%Y-%m-%dT%H:%M%:z",
    "%Y-%m-%d %H:%M:%S%:z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimestampError {
    #[error("timestamp is empty")]
    Empty,

    #[error("unrecognized timestamp '{0}'")]
    Unrecognized(String),
}

/// `YYYY-MM-DD HH:MM`: sixteen bytes with a space at index 10.
pub fn is_canonical(raw: &str) -> bool {
    raw.len() == 16 && raw.as_bytes()[10] == b' '
}

/// Converts an ISO-like timestamp into [`DISPLAY_FORMAT`].
///
/// When a `T` separator is present, everything from the first `.` onwards
/// (fractional seconds and any trailing offset) is discarded before parsing.
/// Canonical input is returned untouched.
pub fn normalize(raw: &str) -> Result<String, TimestampError> {
    if raw.trim().is_empty() {
        return Err(TimestampError::Empty);
    }

    if raw.contains('T') {
        let whole_seconds = raw.split('.').next().unwrap_or(raw);
        return parse(whole_seconds).map(|dt| dt.format(DISPLAY_FORMAT).to_string());
    }

    if is_canonical(raw) {
        return Ok(raw.to_string());
    }

    parse(raw).map(|dt| dt.format(DISPLAY_FORMAT).to_string())
}

/// Never-failing wrapper around [`normalize`]: unparseable input comes back as-is.
pub fn display_or_original(raw: &str) -> String {
    normalize(raw).unwrap_or_else(|e| {
        warn!("Error formatting timestamp '{raw}': {e}");
        raw.to_string()
    })
}

/// Parses into the wall-clock time of whatever offset the string carried.
fn parse(raw: &str) -> Result<NaiveDateTime, TimestampError> {
    let raw = raw.trim();
    let zulu;
    let candidate = match raw.strip_suffix('Z') {
        Some(stripped) => {
            zulu = format!("{stripped}+00:00");
            zulu.as_str()
        }
        None => raw,
    };

    if let Ok(dt) = DateTime::<FixedOffset>::parse_from_rfc3339(candidate) {
        return Ok(dt.naive_local());
    }

    let with_offset = OFFSET_FORMATS
        .iter()
        .find_map(|fmt| DateTime::<FixedOffset>::parse_from_str(candidate, fmt).ok())
        .map(|dt| dt.naive_local());

    with_offset
        .or_else(|| {
            NAIVE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(candidate, fmt).ok())
        })
        .or_else(|| {
            NaiveDate::parse_from_str(candidate, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| TimestampError::Unrecognized(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn iso_with_microseconds() {
        assert_eq!(
            normalize("2025-06-16T12:02:12.899211").unwrap(),
            "2025-06-16 12:02"
        );
    }

    #[test]
    fn iso_without_fraction() {
        assert_eq!(normalize("2025-06-16T08:15:00").unwrap(), "2025-06-16 08:15");
    }

    #[test]
    fn iso_minutes_only() {
        assert_eq!(normalize("2025-06-16T08:15").unwrap(), "2025-06-16 08:15");
    }

    #[test]
    fn zulu_suffix_is_accepted() {
        assert_eq!(normalize("2025-01-02T03:04:05Z").unwrap(), "2025-01-02 03:04");
    }

    #[test]
    fn explicit_offset_keeps_its_wall_clock() {
        assert_eq!(
            normalize("2025-01-02T23:59:00+05:30").unwrap(),
            "2025-01-02 23:59"
        );
    }

    #[test]
    fn fraction_and_offset_are_dropped_together() {
        assert_eq!(
            normalize("2025-01-02T23:59:00.5+05:30").unwrap(),
            "2025-01-02 23:59"
        );
    }

    #[test]
    fn space_separated_seconds() {
        assert_eq!(normalize("2024-12-31 18:30:45").unwrap(), "2024-12-31 18:30");
    }

    #[test]
    fn date_only_is_midnight() {
        assert_eq!(normalize("2024-12-31").unwrap(), "2024-12-31 00:00");
    }

    #[test]
    fn canonical_is_identity() {
        let canonical = "2025-06-16 12:02";
        assert!(is_canonical(canonical));
        assert_eq!(normalize(canonical).unwrap(), canonical);
        assert_eq!(normalize(&normalize(canonical).unwrap()).unwrap(), canonical);
    }

    #[test]
    fn canonical_shape_is_trusted_without_parsing() {
        assert_eq!(normalize("abcdefghij klmno").unwrap(), "abcdefghij klmno");
    }

    #[test]
    fn garbage_is_an_error() {
        assert_matches!(normalize("yesterday"), Err(TimestampError::Unrecognized(_)));
        assert_matches!(normalize("T-minus 10"), Err(TimestampError::Unrecognized(_)));
        assert_matches!(normalize("   "), Err(TimestampError::Empty));
    }

    #[test]
    fn fallback_returns_original() {
        for garbage in ["yesterday", "", "2025-13-45T99:99", "12:00"] {
            assert_eq!(display_or_original(garbage), garbage);
        }
    }

    #[test]
    fn fallback_formats_when_possible() {
        assert_eq!(
            display_or_original("2025-06-16T12:02:12.899211"),
            "2025-06-16 12:02"
        );
    }
}
