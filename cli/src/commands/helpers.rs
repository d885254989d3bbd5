use anyhow::{Context, Result};
use chrono::{Duration, Local, NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::process;

use stride_core::calendar::{DAY_FORMAT, parse_timestamp};

pub(crate) fn parse_date(date_str: Option<String>) -> Result<NaiveDate> {
    match date_str {
        None => Ok(Local::now().date_naive()),
        Some(s) => match s.as_str() {
            "today" => Ok(Local::now().date_naive()),
            "yesterday" => Ok(Local::now().date_naive() - Duration::days(1)),
            "tomorrow" => Ok(Local::now().date_naive() + Duration::days(1)),
            _ => NaiveDate::parse_from_str(&s, DAY_FORMAT).with_context(|| {
                format!("Invalid date '{s}'. Use YYYY-MM-DD or today/yesterday/tomorrow")
            }),
        },
    }
}

/// When an event happened. `None` leaves it to the store (now).
///
/// Day keywords keep the current time of day; a bare date means midnight.
pub(crate) fn parse_when(when: Option<String>) -> Result<Option<NaiveDateTime>> {
    let Some(s) = when else {
        return Ok(None);
    };
    let now = Local::now().naive_local();
    let shift = match s.as_str() {
        "now" | "today" => Some(0),
        "yesterday" => Some(-1),
        "tomorrow" => Some(1),
        _ => None,
    };
    if let Some(days) = shift {
        return Ok(Some(now + Duration::days(days)));
    }
    parse_timestamp(&s)
        .map(Some)
        .with_context(|| format!("Invalid time '{s}'. Use YYYY-MM-DD, YYYY-MM-DDTHH:MM:SS or today/yesterday"))
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

/// Report a missing record and exit with status 2.
pub(crate) fn exit_not_found(message: &str, json: bool) -> ! {
    if json {
        println!("{}", json_error(message));
    } else {
        eprintln!("{message}");
    }
    process::exit(2);
}

pub(crate) fn no_neg_zero(v: f64) -> f64 {
    if v == 0.0 { 0.0 } else { v }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}

/// Whole-percent rendering of a 0..=1 progress ratio.
pub(crate) fn percent(ratio: f64) -> String {
    let pct = no_neg_zero((ratio * 100.0).round());
    format!("{pct:.0}%")
}
