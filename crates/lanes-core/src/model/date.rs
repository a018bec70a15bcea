//! Lenient due-date decoding.
//!
//! Rows may carry a due date as a plain `date` (`2024-05-01`) or as a
//! timestamp (`2024-05-01T00:00:00+00:00`) depending on the column type and
//! on what the tool bridge was handed. Both decode to the calendar date.

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Deserializer};

/// Parse a due date from either a date or an RFC 3339 timestamp.
#[must_use]
pub fn parse_due_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|ts| ts.date_naive())
        .or_else(|| raw.get(..10).and_then(|head| NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()))
}

pub fn deserialize_opt<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref() {
        None | Some("") => Ok(None),
        Some(text) => parse_due_date(text)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid due date '{text}'"))),
    }
}
