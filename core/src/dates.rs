//! Date normalization for values sent to the API.
//!
//! Every date crosses the wire as an RFC 3339 UTC timestamp with second
//! precision (`2015-02-02T09:13:20Z`). Inputs may be structured `chrono`
//! values or free-form strings; strings that cannot be understood are an
//! error, never a silent epoch.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};

use crate::error::{Error, ErrorCode, Result};

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// A date-like input: either text to parse or an instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateInput {
    Text(String),
    Instant(DateTime<Utc>),
}

impl From<&str> for DateInput {
    fn from(value: &str) -> Self {
        DateInput::Text(value.to_string())
    }
}

impl From<String> for DateInput {
    fn from(value: String) -> Self {
        DateInput::Text(value)
    }
}

impl<Tz: TimeZone> From<DateTime<Tz>> for DateInput {
    fn from(value: DateTime<Tz>) -> Self {
        DateInput::Instant(value.with_timezone(&Utc))
    }
}

impl DateInput {
    pub fn to_utc(&self) -> Result<DateTime<Utc>> {
        match self {
            DateInput::Text(text) => parse(text),
            DateInput::Instant(instant) => Ok(*instant),
        }
    }
}

/// Normalize a date-like input to an RFC 3339 UTC timestamp.
pub fn to_rfc3339(input: impl Into<DateInput>) -> Result<String> {
    input.into().to_utc().map(|instant| format(&instant))
}

pub fn format(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse free-form date text. Offsets are honored; text without one is
/// taken as UTC.
pub fn parse(text: &str) -> Result<DateTime<Utc>> {
    let text = text.trim();

    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Ok(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = DateTime::parse_from_rfc2822(text) {
        return Ok(parsed.with_timezone(&Utc));
    }
    for format in NAIVE_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(parsed.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc());
        }
    }
    if let Some(seconds) = text.strip_prefix('@') {
        if let Some(instant) = seconds
            .parse::<i64>()
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
        {
            return Ok(instant);
        }
    }

    Err(Error::new(
        ErrorCode::InvalidDate,
        format!("could not parse {text:?} as a date"),
    ))
}
