//! Datetime handling for XMLTV timestamps and the match store.
//!
//! XMLTV carries `YYYYMMDDHHMMSS +hhmm`; everything is normalised to UTC at
//! the parse boundary. The store persists `YYYY-MM-DD HH:MM:SS` (UTC
//! implied), which compares chronologically under SQLite's text ordering.

use chrono::{DateTime, NaiveDateTime, TimeZone, Timelike, Utc};
use chrono_tz::OffsetComponents;

use crate::errors::SourceError;

const XMLTV_FORMAT: &str = "%Y%m%d%H%M%S %z";
const STORAGE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parse an XMLTV `start`/`stop` attribute into UTC.
pub fn parse_xmltv(input: &str) -> Result<DateTime<Utc>, SourceError> {
    DateTime::parse_from_str(input.trim(), XMLTV_FORMAT)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| SourceError::InvalidDateTime {
            input: input.to_string(),
        })
}

/// Format an instant the way emitted XMLTV expects it: UTC with an explicit
/// `+0000` suffix.
pub fn format_xmltv(dt: &DateTime<Utc>) -> String {
    dt.format("%Y%m%d%H%M%S +0000").to_string()
}

pub fn format_for_storage(dt: &DateTime<Utc>) -> String {
    dt.format(STORAGE_FORMAT).to_string()
}

pub fn parse_storage(input: &str) -> Result<DateTime<Utc>, SourceError> {
    NaiveDateTime::parse_from_str(input.trim(), STORAGE_FORMAT)
        .map(|naive| DateTime::from_naive_utc_and_offset(naive, Utc))
        .map_err(|_| SourceError::InvalidDateTime {
            input: input.to_string(),
        })
}

/// Absolute number of seconds between two instants.
pub fn absolute_delta_seconds(a: DateTime<Utc>, b: DateTime<Utc>) -> i64 {
    (b - a).num_seconds().abs()
}

/// The instant truncated to 00:00:00 of its UTC day.
pub fn midnight_of(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.with_hour(0)
        .and_then(|dt| dt.with_minute(0))
        .and_then(|dt| dt.with_second(0))
        .and_then(|dt| dt.with_nanosecond(0))
        .expect("midnight is always a valid time of day")
}

/// Whether `zone` is observing daylight saving time at `at`.
pub fn is_observing_dst(zone: chrono_tz::Tz, at: DateTime<Utc>) -> bool {
    zone.offset_from_utc_datetime(&at.naive_utc())
        .dst_offset()
        .num_seconds()
        != 0
}

/// Truncate to whole seconds; run timestamps are second-granular like the
/// XMLTV data they are compared against.
pub fn truncate_subseconds(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.with_nanosecond(0)
        .expect("zero nanoseconds is always valid")
}
