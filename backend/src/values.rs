//! Conversions between JSON values and typed column values
//!
//! Temporal columns travel as ISO 8601 strings: `2024-05-01`, `13:45:00`,
//! `2024-05-01T13:45:00` and, with an offset, RFC 3339. Binary columns come back
//! as a string when they hold UTF-8 and as an array of bytes otherwise.

use crate::errors::BackendError;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde_json::{Number, Value};
use std::str::FromStr;

const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

pub(crate) fn float(value: f64) -> Result<Value, BackendError> {
    Number::from_f64(value)
        .map(Value::Number)
        .ok_or_else(|| BackendError::Decode(format!("{value} has no JSON representation")))
}

/// A decimal rendered by the driver, as a JSON number
pub(crate) fn decimal(text: &str) -> Result<Value, BackendError> {
    Number::from_str(text)
        .map(Value::Number)
        .map_err(|e| BackendError::Decode(format!("decimal {text}: {e}")))
}

pub(crate) fn bytes(raw: Vec<u8>) -> Value {
    match String::from_utf8(raw) {
        Ok(text) => Value::String(text),
        Err(e) => Value::from(e.into_bytes()),
    }
}

pub(crate) fn date(value: NaiveDate) -> Value {
    Value::String(value.format("%Y-%m-%d").to_string())
}

pub(crate) fn time(value: NaiveTime) -> Value {
    Value::String(value.format("%H:%M:%S%.f").to_string())
}

pub(crate) fn datetime(value: NaiveDateTime) -> Value {
    Value::String(value.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
}

pub(crate) fn datetime_tz<Tz: TimeZone>(value: DateTime<Tz>) -> Value
where
    Tz::Offset: std::fmt::Display,
{
    Value::String(value.to_rfc3339())
}

pub(crate) fn parse_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text, "%Y-%m-%d").ok()
}

pub(crate) fn parse_time(text: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(text, "%H:%M:%S%.f").ok()
}

pub(crate) fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
}

/// RFC 3339, or a naive timestamp taken as UTC
pub(crate) fn parse_datetime_tz(text: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(text)
        .ok()
        .or_else(|| parse_datetime(text).map(|naive| Utc.from_utc_datetime(&naive).fixed_offset()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_temporal_round_trip() {
        let stamp = parse_datetime("2024-05-01T13:45:00").unwrap();
        assert_eq!(datetime(stamp), json!("2024-05-01T13:45:00"));
        assert_eq!(parse_datetime("2024-05-01 13:45:00.250"), parse_datetime("2024-05-01T13:45:00.250"));

        let day = parse_date("2024-05-01").unwrap();
        assert_eq!(date(day), json!("2024-05-01"));
        assert_eq!(time(parse_time("07:30:15").unwrap()), json!("07:30:15"));

        let aware = parse_datetime_tz("2024-05-01T13:45:00+02:00").unwrap();
        assert_eq!(datetime_tz(aware), json!("2024-05-01T13:45:00+02:00"));
        let naive_utc = parse_datetime_tz("2024-05-01T13:45:00").unwrap();
        assert_eq!(datetime_tz(naive_utc), json!("2024-05-01T13:45:00+00:00"));
        assert!(parse_datetime("yesterday").is_none());
    }

    #[test]
    fn test_numbers_and_bytes() {
        assert_eq!(decimal("12.50").unwrap(), json!(12.5));
        assert_eq!(decimal("42").unwrap(), json!(42));
        assert!(float(f64::NAN).is_err());
        assert_eq!(bytes(b"abc".to_vec()), json!("abc"));
        assert_eq!(bytes(vec![0xff, 0x00]), json!([255, 0]));
    }
}
