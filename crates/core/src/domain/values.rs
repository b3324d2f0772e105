//! Shared value rules: decimal rounding scales, date parsing and id validation.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use uuid::Uuid;

use crate::errors::DomainError;

/// Rates and per-ton adjustments are kept at four decimal places.
pub fn round_rate(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(4, RoundingStrategy::MidpointAwayFromZero)
}

/// Tonnage totals are kept at three decimal places.
pub fn round_qty(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(3, RoundingStrategy::MidpointAwayFromZero)
}

/// Money is kept at two decimal places.
pub fn round_amount(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Accepts a calendar date (`2026-02-23`, read as midnight UTC) or an RFC 3339 timestamp.
pub fn parse_date(field: &str, raw: &str) -> Result<DateTime<Utc>, DomainError> {
    let trimmed = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc());
        }
    }

    DateTime::parse_from_rfc3339(trimmed)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|_| DomainError::validation(format!("{field} must be a valid date")))
}

/// Reads an inclusive upper bound. A calendar date means the last millisecond
/// of that day; a timestamp is taken as given.
pub fn parse_end_date(field: &str, raw: &str) -> Result<DateTime<Utc>, DomainError> {
    let trimmed = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        if let Some(last) = date.and_hms_milli_opt(23, 59, 59, 999) {
            return Ok(last.and_utc());
        }
    }
    parse_date(field, trimmed)
}

pub fn parse_optional_date(
    field: &str,
    raw: Option<&str>,
) -> Result<Option<DateTime<Utc>>, DomainError> {
    raw.filter(|value| !value.trim().is_empty()).map(|value| parse_date(field, value)).transpose()
}

/// Validates an id-typed field and returns its canonical lowercase form.
pub fn parse_id(field: &str, raw: &str) -> Result<String, DomainError> {
    Uuid::parse_str(raw.trim())
        .map(|id| id.to_string())
        .map_err(|_| DomainError::validation(format!("{field} must be a valid id")))
}

pub fn parse_optional_id(field: &str, raw: Option<&str>) -> Result<Option<String>, DomainError> {
    raw.filter(|value| !value.trim().is_empty()).map(|value| parse_id(field, value)).transpose()
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn trimmed(raw: Option<String>) -> Option<String> {
    raw.map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}
