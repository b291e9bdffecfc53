//! Date and time parsing for text scraped off the booking page.
//!
//! Numeric dates are always read day-first (`15/02/2026` is 15 February), the
//! convention of the Brazilian booking sites this tool targets. No attempt is
//! made to guess month-first input. Dates without a year are placed in
//! `today`'s year, or in the next year when their month has already passed.

use std::sync::LazyLock;

use chrono::{Datelike as _, NaiveDate, NaiveTime};
use regex::Regex;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unrecognized date: {0:?}")]
    Date(String),
    #[error("unrecognized time: {0:?}")]
    Time(String),
}

static DAY_MONTH_YEAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,2})[/-](\d{1,2})[/-](\d{4}|\d{2})$").expect("valid day/month/year regex")
});
static ISO_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4})-(\d{1,2})-(\d{1,2})$").expect("valid iso date regex")
});
static DAY_MONTH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,2})[/-](\d{1,2})$").expect("valid day/month regex"));
static TEXTUAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{1,2})\s+(?:de\s+)?(\p{L}+)(?:\.?\s+(?:de\s+)?(\d{4}))?")
        .expect("valid textual date regex")
});
static EMBEDDED_NUMERIC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d{4}-\d{1,2}-\d{1,2}|\b\d{1,2}[/-]\d{1,2}(?:[/-](?:\d{4}|\d{2}))?\b")
        .expect("valid embedded date regex")
});
static TIME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,2})\s*[:h]\s*(\d{2})").expect("valid time regex"));

const MONTH_ABBREVIATIONS: [&str; 12] = [
    "jan", "fev", "mar", "abr", "mai", "jun", "jul", "ago", "set", "out", "nov", "dez",
];

/// Formats tried in order; the first that yields a valid date wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DateFormat {
    DayMonthYear,
    Iso,
    DayMonth,
    Textual,
    /// Numeric date somewhere inside surrounding words ("qui 15/02").
    Embedded,
}

const DATE_FORMATS: [DateFormat; 5] = [
    DateFormat::DayMonthYear,
    DateFormat::Iso,
    DateFormat::DayMonth,
    DateFormat::Textual,
    DateFormat::Embedded,
];

pub fn parse_date(text: &str, today: NaiveDate) -> Result<NaiveDate, ParseError> {
    let normalized = text.trim().to_lowercase();
    DATE_FORMATS
        .iter()
        .find_map(|format| try_format(*format, &normalized, today))
        .ok_or_else(|| ParseError::Date(text.trim().to_owned()))
}

pub fn parse_time(text: &str) -> Result<NaiveTime, ParseError> {
    let caps = TIME
        .captures(text)
        .ok_or_else(|| ParseError::Time(text.trim().to_owned()))?;
    let hour = caps[1].parse::<u32>().ok();
    let minute = caps[2].parse::<u32>().ok();
    hour.zip(minute)
        .and_then(|(h, m)| NaiveTime::from_hms_opt(h, m, 0))
        .ok_or_else(|| ParseError::Time(text.trim().to_owned()))
}

/// Maps a Portuguese month name or abbreviation (`mar`, `Março`, `Out`) to 1..=12.
pub fn month_from_name(name: &str) -> Option<u32> {
    let lower = name.trim().to_lowercase();
    let prefix: String = lower.chars().take(3).collect();
    MONTH_ABBREVIATIONS
        .iter()
        .position(|abbr| *abbr == prefix)
        .and_then(|idx| u32::try_from(idx + 1).ok())
}

pub fn infer_year(month: u32, today: NaiveDate) -> i32 {
    if month < today.month() {
        today.year() + 1
    } else {
        today.year()
    }
}

fn try_format(format: DateFormat, text: &str, today: NaiveDate) -> Option<NaiveDate> {
    match format {
        DateFormat::DayMonthYear => {
            let caps = DAY_MONTH_YEAR.captures(text)?;
            let year_text = &caps[3];
            let mut year = year_text.parse::<i32>().ok()?;
            if year_text.len() == 2 {
                year += 2000;
            }
            NaiveDate::from_ymd_opt(year, caps[2].parse().ok()?, caps[1].parse().ok()?)
        }
        DateFormat::Iso => {
            let caps = ISO_DATE.captures(text)?;
            NaiveDate::from_ymd_opt(
                caps[1].parse().ok()?,
                caps[2].parse().ok()?,
                caps[3].parse().ok()?,
            )
        }
        DateFormat::DayMonth => {
            let caps = DAY_MONTH.captures(text)?;
            let month: u32 = caps[2].parse().ok()?;
            NaiveDate::from_ymd_opt(infer_year(month, today), month, caps[1].parse().ok()?)
        }
        DateFormat::Textual => {
            // "segunda, 20 de outubro" -> "20 de outubro"
            let text = match text.split_once(',') {
                Some((_, rest)) => rest.trim(),
                None => text,
            };
            let caps = TEXTUAL.captures(text)?;
            let day: u32 = caps[1].parse().ok()?;
            let month = month_from_name(&caps[2])?;
            let year = match caps.get(3) {
                Some(year) => year.as_str().parse().ok()?,
                None => infer_year(month, today),
            };
            NaiveDate::from_ymd_opt(year, month, day)
        }
        DateFormat::Embedded => {
            let found = EMBEDDED_NUMERIC.find(text)?.as_str();
            try_format(DateFormat::Iso, found, today)
                .or_else(|| try_format(DateFormat::DayMonthYear, found, today))
                .or_else(|| try_format(DateFormat::DayMonth, found, today))
        }
    }
}
