//! Forward conversion: UniversalValue → remote JSON value.
//!
//! This is the inverse coercion applied by the push engine. Values typed by
//! the local column are accepted as well as the string spellings a local
//! application may have written (`03/20/2019`, `2019-03-20 10:15:00`).

use crate::reverse::parse_datetime_string;
use crate::{ConversionError, MULTI_VALUE_SEPARATOR};
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::prelude::ToPrimitive;
use serde_json::{json, Value};
use sync_core::{RemoteFieldType, UniversalValue};

/// Wrapper for JSON values.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonValue(pub Value);

impl JsonValue {
    /// Get the inner JSON value.
    pub fn into_inner(self) -> Value {
        self.0
    }

    /// Get a reference to the inner JSON value.
    pub fn as_inner(&self) -> &Value {
        &self.0
    }
}

/// Date formats accepted from local string values.
const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%m/%d/%Y"];

/// Convert a mirror value to the JSON the remote service expects for a field.
pub fn universal_to_json(
    value: &UniversalValue,
    remote_type: RemoteFieldType,
) -> Result<Value, ConversionError> {
    use RemoteFieldType as R;

    if value.is_null() {
        return Ok(Value::Null);
    }

    match remote_type {
        R::Date => to_date(value).map(|d| json!(d.format("%Y-%m-%d").to_string())),
        R::DateTime => to_datetime(value)
            .map(|dt| json!(dt.format("%Y-%m-%dT%H:%M:%S+00:00").to_string())),
        R::Boolean => to_bool(value).map(Value::Bool),
        R::Integer | R::BigInt | R::Percent => to_i64(value).map(|i| json!(i)),
        R::Double | R::Currency | R::Decimal => to_f64(value).and_then(float_json),
        R::MultiSelectPicklist | R::MultiSelectLookup | R::MultiUserLookup => {
            let text = value.to_string();
            Ok(Value::Array(
                text.split(MULTI_VALUE_SEPARATOR)
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(|s| Value::String(s.to_string()))
                    .collect(),
            ))
        }
        _ => Ok(match value {
            UniversalValue::String(s) => Value::String(s.clone()),
            other => Value::String(other.to_string()),
        }),
    }
}

impl TryFrom<(&UniversalValue, RemoteFieldType)> for JsonValue {
    type Error = ConversionError;

    fn try_from(
        (value, remote_type): (&UniversalValue, RemoteFieldType),
    ) -> Result<Self, Self::Error> {
        universal_to_json(value, remote_type).map(JsonValue)
    }
}

fn to_date(value: &UniversalValue) -> Result<NaiveDate, ConversionError> {
    match value {
        UniversalValue::Date(d) => Ok(*d),
        UniversalValue::DateTime(dt) => Ok(dt.date()),
        UniversalValue::String(s) => {
            let s = s.trim();
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
                .or_else(|| parse_datetime_string(s).map(|dt| dt.date()))
                .ok_or_else(|| ConversionError::InvalidDate(s.to_string()))
        }
        other => Err(ConversionError::mismatch("date", other)),
    }
}

fn to_datetime(value: &UniversalValue) -> Result<NaiveDateTime, ConversionError> {
    match value {
        UniversalValue::DateTime(dt) => Ok(*dt),
        UniversalValue::Date(d) => d
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| ConversionError::InvalidDateTime(d.to_string())),
        UniversalValue::String(s) => {
            let s = s.trim();
            parse_datetime_string(s)
                .or_else(|| {
                    DATE_FORMATS
                        .iter()
                        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
                        .and_then(|d| d.and_hms_opt(0, 0, 0))
                })
                .ok_or_else(|| ConversionError::InvalidDateTime(s.to_string()))
        }
        other => Err(ConversionError::mismatch("date/time", other)),
    }
}

fn to_bool(value: &UniversalValue) -> Result<bool, ConversionError> {
    match value {
        UniversalValue::Bool(b) => Ok(*b),
        UniversalValue::Int32(i) => Ok(*i != 0),
        UniversalValue::Int64(i) => Ok(*i != 0),
        UniversalValue::Float64(f) => Ok(*f != 0.0),
        UniversalValue::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(true),
            "0" | "false" | "no" | "" => Ok(false),
            _ => Err(ConversionError::InvalidBool(s.clone())),
        },
        other => Err(ConversionError::mismatch("boolean", other)),
    }
}

fn to_i64(value: &UniversalValue) -> Result<i64, ConversionError> {
    match value {
        UniversalValue::Int32(i) => Ok(i64::from(*i)),
        UniversalValue::Int64(i) => Ok(*i),
        UniversalValue::Bool(b) => Ok(i64::from(*b)),
        UniversalValue::Float64(f) if f.is_finite() => Ok(f.round() as i64),
        UniversalValue::Decimal(d) => d
            .round()
            .to_i64()
            .ok_or_else(|| ConversionError::InvalidNumber(d.to_string())),
        UniversalValue::String(s) => {
            let t = s.trim();
            t.parse::<i64>()
                .ok()
                .or_else(|| {
                    t.parse::<f64>()
                        .ok()
                        .filter(|f| f.is_finite())
                        .map(|f| f.round() as i64)
                })
                .ok_or_else(|| ConversionError::InvalidNumber(s.clone()))
        }
        other => Err(ConversionError::mismatch("integer", other)),
    }
}

fn to_f64(value: &UniversalValue) -> Result<f64, ConversionError> {
    match value {
        UniversalValue::Float64(f) => Ok(*f),
        UniversalValue::Int32(i) => Ok(f64::from(*i)),
        UniversalValue::Int64(i) => Ok(*i as f64),
        UniversalValue::Decimal(d) => d
            .to_f64()
            .ok_or_else(|| ConversionError::InvalidNumber(d.to_string())),
        UniversalValue::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| ConversionError::InvalidNumber(s.clone())),
        other => Err(ConversionError::mismatch("number", other)),
    }
}

fn float_json(f: f64) -> Result<Value, ConversionError> {
    serde_json::Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| ConversionError::InvalidNumber(f.to_string()))
}
