//! Time Scalars and Conversions
//!
//! Nanoseconds since Unix epoch (1970-01-01 00:00:00 UTC) is the canonical
//! timestamp representation across the runtime. Everything else (seconds,
//! millis, micros, `DateTime`, RFC 3339 strings) converts through here.

use chrono::{DateTime, TimeZone, Utc};

/// Nanoseconds since Unix epoch. u64 covers years 1970-2554, sufficient
/// for any trading timestamp.
pub type UnixNanos = u64;

/// Conversion constants
pub const NANOS_PER_MICRO: u64 = 1_000;
pub const NANOS_PER_MILLI: u64 = 1_000_000;
pub const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Values below this magnitude are interpreted as seconds, above as
/// nanoseconds, when converting untyped floats (see [`f64_to_unix_nanos`]).
const SECS_NANOS_CUTOVER: f64 = 1e12;

/// Convert fractional seconds to nanoseconds (multiply then truncate).
#[inline]
pub fn secs_to_nanos(secs: f64) -> u64 {
    (secs * NANOS_PER_SEC as f64) as u64
}

/// Convert fractional milliseconds to nanoseconds (multiply then truncate).
#[inline]
pub fn millis_to_nanos(millis: f64) -> u64 {
    (millis * NANOS_PER_MILLI as f64) as u64
}

/// Convert fractional microseconds to nanoseconds (multiply then truncate).
#[inline]
pub fn micros_to_nanos(micros: f64) -> u64 {
    (micros * NANOS_PER_MICRO as f64) as u64
}

/// Convert nanoseconds to fractional seconds.
#[inline]
pub fn nanos_to_secs(nanos: UnixNanos) -> f64 {
    nanos as f64 / NANOS_PER_SEC as f64
}

/// Convert nanoseconds to whole milliseconds.
#[inline]
pub fn nanos_to_millis(nanos: UnixNanos) -> u64 {
    nanos / NANOS_PER_MILLI
}

/// Convert nanoseconds to whole microseconds.
#[inline]
pub fn nanos_to_micros(nanos: UnixNanos) -> u64 {
    nanos / NANOS_PER_MICRO
}

/// Convert a chrono UTC datetime to Unix nanoseconds.
///
/// Dates before the epoch or beyond the chrono nanosecond range clamp to 0.
#[inline]
pub fn datetime_to_unix_nanos(dt: &DateTime<Utc>) -> UnixNanos {
    dt.timestamp_nanos_opt().unwrap_or(0).max(0) as u64
}

/// Convert Unix nanoseconds to a chrono UTC datetime.
#[inline]
pub fn unix_nanos_to_datetime(nanos: UnixNanos) -> DateTime<Utc> {
    let secs = (nanos / NANOS_PER_SEC) as i64;
    let nsecs = (nanos % NANOS_PER_SEC) as u32;
    Utc.timestamp_opt(secs, nsecs).unwrap()
}

/// Convert an untyped numeric timestamp to Unix nanoseconds.
///
/// Magnitudes below 1e12 are treated as seconds (no real wall-clock
/// second count reaches 1e12 before the year 33658); anything larger is
/// already nanoseconds.
#[inline]
pub fn f64_to_unix_nanos(value: f64) -> UnixNanos {
    if value.abs() < SECS_NANOS_CUTOVER {
        secs_to_nanos(value)
    } else {
        value as u64
    }
}

/// Format Unix nanoseconds as RFC 3339 / ISO 8601, always UTC (`Z` suffix).
///
/// With `nanos_precision` the fractional part carries 9 digits, otherwise 3.
pub fn unix_nanos_to_iso8601(nanos: UnixNanos, nanos_precision: bool) -> String {
    let dt = unix_nanos_to_datetime(nanos);
    if nanos_precision {
        dt.format("%Y-%m-%dT%H:%M:%S%.9fZ").to_string()
    } else {
        dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
    }
}

/// Parse an RFC 3339 / ISO 8601 timestamp into Unix nanoseconds.
pub fn iso8601_to_unix_nanos(value: &str) -> Result<UnixNanos, chrono::ParseError> {
    let dt = DateTime::parse_from_rfc3339(value)?;
    Ok(datetime_to_unix_nanos(&dt.with_timezone(&Utc)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_conversions() {
        assert_eq!(secs_to_nanos(1.5), 1_500_000_000);
        assert_eq!(millis_to_nanos(2.5), 2_500_000);
        assert_eq!(micros_to_nanos(3.0), 3_000);
        assert_eq!(nanos_to_millis(1_500_000_000), 1_500);
        assert_eq!(nanos_to_micros(1_500_000_000), 1_500_000);
        assert!((nanos_to_secs(1_500_000_000) - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_secs_to_nanos_truncates() {
        // Multiply-then-truncate, not round
        assert_eq!(secs_to_nanos(0.000_000_000_9), 0);
    }

    #[test]
    fn test_f64_heuristic() {
        // Small magnitudes are seconds
        assert_eq!(f64_to_unix_nanos(1_700_000_000.0), 1_700_000_000 * NANOS_PER_SEC);
        // Large magnitudes are already nanoseconds
        assert_eq!(f64_to_unix_nanos(1_700_000_000_000_000_000.0), 1_700_000_000_000_000_000);
    }

    #[test]
    fn test_iso8601_nanos_precision() {
        let nanos = 1_700_000_000 * NANOS_PER_SEC + 123_456_789;
        let formatted = unix_nanos_to_iso8601(nanos, true);
        assert_eq!(formatted, "2023-11-14T22:13:20.123456789Z");
    }

    #[test]
    fn test_iso8601_millis_precision() {
        let nanos = 1_700_000_000 * NANOS_PER_SEC + 123_456_789;
        let formatted = unix_nanos_to_iso8601(nanos, false);
        assert_eq!(formatted, "2023-11-14T22:13:20.123Z");
    }

    #[test]
    fn test_iso8601_roundtrip() {
        let cases = [
            0,
            1,
            999_999_999,
            1_700_000_000 * NANOS_PER_SEC + 123_456_789,
            u32::MAX as u64 * NANOS_PER_SEC,
        ];
        for nanos in cases {
            let formatted = unix_nanos_to_iso8601(nanos, true);
            let parsed = iso8601_to_unix_nanos(&formatted).unwrap();
            assert_eq!(parsed, nanos, "roundtrip failed for {nanos}");
        }
    }

    #[test]
    fn test_iso8601_parse_rejects_garbage() {
        assert!(iso8601_to_unix_nanos("not-a-timestamp").is_err());
        assert!(iso8601_to_unix_nanos("").is_err());
    }

    #[test]
    fn test_datetime_roundtrip() {
        let original = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
        let nanos = datetime_to_unix_nanos(&original);
        let recovered = unix_nanos_to_datetime(nanos);
        assert_eq!(original, recovered);
    }
}
