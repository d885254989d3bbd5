//! Calendar-day handling.
//!
//! Every place that needs "which day does this belong to" goes through
//! [`day_of`]; every place that reads or writes a `YYYY-MM-DD` key goes
//! through [`parse_day`] / [`format_day`]. Timestamps are naive local wall
//! time, so there is exactly one implicit timezone in the system.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Local, NaiveDate, NaiveDateTime};

pub const DAY_FORMAT: &str = "%Y-%m-%d";

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
];

/// The calendar day an event timestamp belongs to.
#[must_use]
pub fn day_of(timestamp: &NaiveDateTime) -> NaiveDate {
    timestamp.date()
}

pub fn parse_day(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DAY_FORMAT)
        .with_context(|| format!("Invalid date '{s}'. Use YYYY-MM-DD"))
}

#[must_use]
pub fn format_day(date: NaiveDate) -> String {
    date.format(DAY_FORMAT).to_string()
}

/// Parse an event timestamp.
///
/// Accepts naive date-times, RFC 3339 strings with an offset (converted to
/// local wall time), and bare dates (taken as midnight).
pub fn parse_timestamp(s: &str) -> Result<NaiveDateTime> {
    let s = s.trim();
    for fmt in TIMESTAMP_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(ts);
        }
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Ok(ts.with_timezone(&Local).naive_local());
    }
    if let Ok(day) = NaiveDate::parse_from_str(s, DAY_FORMAT) {
        return Ok(day.and_time(chrono::NaiveTime::MIN));
    }
    anyhow::bail!("Invalid timestamp '{s}'. Use YYYY-MM-DDTHH:MM:SS or YYYY-MM-DD")
}

/// The last `n` calendar days ending at `end`, oldest first.
#[must_use]
#[allow(clippy::cast_possible_wrap)]
pub fn trailing_days(end: NaiveDate, n: usize) -> Vec<NaiveDate> {
    (0..n)
        .rev()
        .map(|back| end - Duration::days(back as i64))
        .collect()
}

/// Source of "now" for the sync engine and the store's default dates.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;

    fn today(&self) -> NaiveDate {
        day_of(&self.now())
    }
}

/// Local wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// A clock frozen at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl FixedClock {
    /// Noon on the given day.
    #[must_use]
    pub fn at_noon(day: NaiveDate) -> Self {
        Self(day.and_hms_opt(12, 0, 0).unwrap_or_default())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        parse_day(s).unwrap()
    }

    #[test]
    fn test_day_of_truncates_at_midnight() {
        let late = parse_timestamp("2024-03-01T23:59:59").unwrap();
        let early = parse_timestamp("2024-03-02T00:00:00").unwrap();
        assert_eq!(day_of(&late), day("2024-03-01"));
        assert_eq!(day_of(&early), day("2024-03-02"));
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let a = parse_timestamp("2024-01-15T09:30:00").unwrap();
        let b = parse_timestamp("2024-01-15 09:30:00").unwrap();
        let c = parse_timestamp("2024-01-15T09:30").unwrap();
        let d = parse_timestamp("2024-01-15T09:30:00.250").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_eq!(day_of(&d), day("2024-01-15"));

        let midnight = parse_timestamp("2024-01-15").unwrap();
        assert_eq!(midnight, day("2024-01-15").and_hms_opt(0, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_timestamp_rfc3339_converts_to_local() {
        let ts = parse_timestamp("2024-01-15T12:00:00Z").unwrap();
        let expected = DateTime::parse_from_rfc3339("2024-01-15T12:00:00Z")
            .unwrap()
            .with_timezone(&Local)
            .naive_local();
        assert_eq!(ts, expected);
    }

    #[test]
    fn test_parse_timestamp_rejects_garbage() {
        assert!(parse_timestamp("yesterday-ish").is_err());
        assert!(parse_day("2024-13-01").is_err());
    }

    #[test]
    fn test_format_day_round_trips() {
        assert_eq!(format_day(day("2024-02-29")), "2024-02-29");
    }

    #[test]
    fn test_trailing_days_oldest_first() {
        let days = trailing_days(day("2024-03-02"), 7);
        assert_eq!(days.len(), 7);
        assert_eq!(days[0], day("2024-02-25"));
        assert_eq!(days[6], day("2024-03-02"));
        assert!(trailing_days(day("2024-03-02"), 0).is_empty());
    }

    #[test]
    fn test_fixed_clock_today() {
        let clock = FixedClock::at_noon(day("2024-06-15"));
        assert_eq!(clock.today(), day("2024-06-15"));
    }
}
