//! Column codecs shared by the SQL repositories.

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;

use super::RepositoryError;

/// Fixed-width UTC text so that lexical order matches time order.
pub(crate) fn timestamp_text(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

/// Normalized so equal values always compare equal as text.
pub(crate) fn decimal_text(value: Decimal) -> String {
    value.normalize().to_string()
}

pub(crate) fn optional_decimal_text(value: Option<Decimal>) -> Option<String> {
    value.map(decimal_text)
}

pub(crate) fn parse_decimal(column: &str, value: String) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(&value).map_err(|error| {
        RepositoryError::Decode(format!("invalid decimal in `{column}`: `{value}` ({error})"))
    })
}

pub(crate) fn parse_optional_decimal(
    column: &str,
    value: Option<String>,
) -> Result<Option<Decimal>, RepositoryError> {
    value.map(|raw| parse_decimal(column, raw)).transpose()
}

/// Parses an enum column through its `FromStr` impl.
pub(crate) fn parse_enum<T>(column: &str, value: String) -> Result<T, RepositoryError>
where
    T: FromStr,
{
    value
        .parse::<T>()
        .map_err(|_| RepositoryError::Decode(format!("unknown value in `{column}`: `{value}`")))
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;

    use super::{decimal_text, parse_decimal, parse_timestamp, timestamp_text};

    #[test]
    fn timestamps_are_fixed_width_and_round_trip() {
        let at = Utc.with_ymd_and_hms(2026, 2, 23, 7, 5, 0).single().expect("date");
        let text = timestamp_text(at);

        assert_eq!(text, "2026-02-23T07:05:00.000Z");
        assert_eq!(parse_timestamp("created_at", text).expect("parse"), at);
    }

    #[test]
    fn equal_decimals_share_one_text_form() {
        assert_eq!(decimal_text(Decimal::new(1700, 2)), decimal_text(Decimal::new(17, 0)));
        assert_eq!(parse_decimal("qty_ton", "13175.00".to_string()).expect("parse"), Decimal::new(13175, 0));
        assert!(parse_decimal("qty_ton", "abc".to_string()).is_err());
    }
}
