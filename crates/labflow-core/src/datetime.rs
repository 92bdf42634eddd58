//! Locale-tolerant date and date-time normalization.
//!
//! Lab reports print timestamps in whatever shape the issuing lab prefers:
//! ISO dates, day-first Brazilian dates, `"03/12/2025 às 08h00"`, and so
//! on. Both entry points try a fixed, ordered list of layouts and return the
//! first successful parse as a UTC instant. Layouts without an offset are
//! read as UTC.
//!
//! # Layout precedence
//!
//! | Kind | Layouts (in order) |
//! |------|--------------------|
//! | date | `YYYY-MM-DD`, `DD/MM/YYYY`, `YYYY/MM/DD` |
//! | date-time | RFC 3339, `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DD HH:MM`, `YYYY-MM-DD HH:MM:SS±HH:MM`, `DD/MM/YYYY HH:MM:SS`, `DD/MM/YYYY HH:MM`, `DD/MM/YYYY HH:MM:SS ±HHMM`, `DD/MM/YYYY HH:MM ±HHMM` |
//!
//! A date-time string that matches no date-time layout falls back to the
//! date layouts (midnight UTC).

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::{Captures, Regex};

use crate::error::IngestError;

const DATE_LAYOUTS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%Y/%m/%d"];

#[derive(Debug, Clone, Copy)]
enum Layout {
    Rfc3339,
    /// No offset in the text; interpreted as UTC.
    Naive(&'static str),
    /// Offset present in the text; converted to UTC.
    Offset(&'static str),
}

const DATETIME_LAYOUTS: &[Layout] = &[
    Layout::Rfc3339,
    Layout::Naive("%Y-%m-%d %H:%M:%S"),
    Layout::Naive("%Y-%m-%d %H:%M"),
    Layout::Offset("%Y-%m-%d %H:%M:%S%:z"),
    Layout::Naive("%d/%m/%Y %H:%M:%S"),
    Layout::Naive("%d/%m/%Y %H:%M"),
    Layout::Offset("%d/%m/%Y %H:%M:%S %z"),
    Layout::Offset("%d/%m/%Y %H:%M %z"),
];

/// Portuguese connector between date and clock, e.g. `"03/12/2025 às 08:00"`.
static CONNECTOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:às|as)\b").expect("connector pattern is valid"));

/// Informal clock notation: `14h30`, `8h`, `08H00`.
static HOUR_MARK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,2})[hH](\d{2})?\b").expect("hour mark pattern is valid")
});

/// Parse a calendar date.
///
/// # Errors
///
/// [`IngestError::InvalidDateFormat`] when no date layout matches.
pub fn parse_date(raw: &str) -> Result<DateTime<Utc>, IngestError> {
    let trimmed = raw.trim();
    DATE_LAYOUTS
        .iter()
        .find_map(|layout| NaiveDate::parse_from_str(trimmed, layout).ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| IngestError::InvalidDateFormat(raw.to_string()))
}

/// Parse a date-time, falling back to a plain date.
///
/// The input is cleansed first: the `às`/`as` connector is dropped,
/// `14h30` style clock marks become `14:30` (a bare `8h` becomes `8:00`),
/// and runs of whitespace are collapsed.
///
/// # Errors
///
/// [`IngestError::InvalidDateFormat`] when neither a date-time nor a date
/// layout matches.
pub fn parse_datetime(raw: &str) -> Result<DateTime<Utc>, IngestError> {
    let cleansed = cleanse(raw);

    if let Some(parsed) = DATETIME_LAYOUTS
        .iter()
        .find_map(|layout| try_layout(&cleansed, *layout))
    {
        return Ok(parsed);
    }

    parse_date(&cleansed).map_err(|_| IngestError::InvalidDateFormat(raw.to_string()))
}

fn try_layout(input: &str, layout: Layout) -> Option<DateTime<Utc>> {
    match layout {
        Layout::Rfc3339 => DateTime::parse_from_rfc3339(input)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Layout::Naive(fmt) => NaiveDateTime::parse_from_str(input, fmt)
            .ok()
            .map(|naive| naive.and_utc()),
        Layout::Offset(fmt) => DateTime::parse_from_str(input, fmt)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
    }
}

fn cleanse(raw: &str) -> String {
    let without_connector = CONNECTOR.replace_all(raw.trim(), " ");
    let clock = HOUR_MARK.replace_all(&without_connector, |caps: &Captures| {
        let minutes = caps.get(2).map_or("00", |m| m.as_str());
        format!("{}:{}", &caps[1], minutes)
    });
    clock.split_whitespace().collect::<Vec<_>>().join(" ")
}
