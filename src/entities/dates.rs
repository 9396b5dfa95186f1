//! Timestamp coercion.
//!
//! Stored documents carry dates in several encodings depending on which client wrote them:
//!
//! - native timestamp objects: `{"seconds": 1700000000, "nanoseconds": 0}`
//! - serialized timestamps: `{"_seconds": 1700000000, "_nanoseconds": 0}`
//! - RFC 3339 / ISO-8601 strings, with or without offset (naive strings are UTC)
//! - epoch milliseconds as a plain number
//!
//! All of them coerce to a single `DateTime<Utc>`.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DateCoercionError {
    #[error("Unsupported date encoding: {0}")]
    Unsupported(String),

    #[error("Date out of range: {0}")]
    OutOfRange(String),
}

fn from_parts(seconds: i64, nanos: i64, raw: &Value) -> Result<DateTime<Utc>, DateCoercionError> {
    let nanos = u32::try_from(nanos)
        .ok()
        .filter(|n| *n < 1_000_000_000)
        .ok_or_else(|| DateCoercionError::OutOfRange(raw.to_string()))?;
    Utc.timestamp_opt(seconds, nanos)
        .single()
        .ok_or_else(|| DateCoercionError::OutOfRange(raw.to_string()))
}

fn integer(value: Option<&Value>) -> Option<i64> {
    let value = value?;
    value.as_i64().or_else(|| value.as_f64().map(|f| f as i64))
}

fn from_object(map: &serde_json::Map<String, Value>, raw: &Value) -> Option<Result<DateTime<Utc>, DateCoercionError>> {
    for (seconds_key, nanos_key) in [("seconds", "nanoseconds"), ("_seconds", "_nanoseconds")] {
        if let Some(seconds) = integer(map.get(seconds_key)) {
            let nanos = integer(map.get(nanos_key)).unwrap_or(0);
            return Some(from_parts(seconds, nanos, raw));
        }
    }
    None
}

fn from_string(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Coerce any supported raw date encoding into the canonical representation.
pub fn coerce_timestamp(value: &Value) -> Result<DateTime<Utc>, DateCoercionError> {
    match value {
        Value::Object(map) => from_object(map, value)
            .unwrap_or_else(|| Err(DateCoercionError::Unsupported(value.to_string()))),
        Value::String(s) => {
            from_string(s).ok_or_else(|| DateCoercionError::Unsupported(value.to_string()))
        }
        Value::Number(n) => {
            let millis = n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .ok_or_else(|| DateCoercionError::OutOfRange(value.to_string()))?;
            Utc.timestamp_millis_opt(millis)
                .single()
                .ok_or_else(|| DateCoercionError::OutOfRange(value.to_string()))
        }
        _ => Err(DateCoercionError::Unsupported(value.to_string())),
    }
}

/// Encoding used when this crate writes a date back to the store.
pub fn to_stored_timestamp(dt: &DateTime<Utc>) -> Value {
    json!({
        "seconds": dt.timestamp(),
        "nanoseconds": dt.timestamp_subsec_nanos(),
    })
}
