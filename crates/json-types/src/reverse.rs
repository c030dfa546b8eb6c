//! Reverse conversion: remote JSON value → UniversalValue.
//!
//! Used by the pull engine to turn remote records into mirror row values.

use crate::{ConversionError, MULTI_VALUE_SEPARATOR};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use sync_core::{
    FieldBindings, FieldValues, RemoteFieldType, RemoteRecord, UniversalType, UniversalValue,
};

/// Parse a remote date/time string into a UTC wall-clock timestamp.
///
/// Supports:
/// - RFC 3339 with offset: "2019-03-20T10:15:00+05:30"
/// - MySQL timestamp: "2019-03-20 10:15:00"
/// - Naive ISO 8601: "2019-03-20T10:15:00"
/// - US order: "03/20/2019 10:15:00"
pub fn parse_datetime_string(s: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc).naive_utc());
    }

    [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%m/%d/%Y %H:%M:%S",
        "%m/%d/%Y %H:%M",
    ]
    .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
}

/// Parse a remote date string ("2019-03-20" or "03/20/2019").
///
/// A full timestamp is accepted and truncated to its date.
pub fn parse_date_string(s: &str) -> Option<NaiveDate> {
    ["%Y-%m-%d", "%m/%d/%Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .or_else(|| parse_datetime_string(s).map(|dt| dt.date()))
}

/// JSON value paired with field information for type-aware conversion.
#[derive(Debug, Clone)]
pub struct JsonValueWithSchema<'a> {
    /// The JSON value.
    pub value: &'a Value,
    /// Remote type tag of the field.
    pub remote_type: RemoteFieldType,
    /// Local column type the value is stored in.
    pub column_type: &'a UniversalType,
}

impl<'a> JsonValueWithSchema<'a> {
    /// Create a new JsonValueWithSchema.
    pub fn new(
        value: &'a Value,
        remote_type: RemoteFieldType,
        column_type: &'a UniversalType,
    ) -> Self {
        Self {
            value,
            remote_type,
            column_type,
        }
    }

    /// Convert to the value stored in the mirror column.
    pub fn to_universal_value(&self) -> Result<UniversalValue, ConversionError> {
        let value = self.value;
        if value.is_null() {
            return Ok(UniversalValue::Null);
        }

        if self.remote_type.is_multi_valued() {
            let joined = self.multi_value_text(value);
            return Ok(if joined.is_empty() {
                UniversalValue::Null
            } else {
                UniversalValue::String(joined)
            });
        }

        match self.column_type {
            UniversalType::Bool => json_to_bool(value).map(UniversalValue::Bool),
            UniversalType::Int32 => {
                let i = json_to_i64(value)?;
                i32::try_from(i)
                    .map(UniversalValue::Int32)
                    .map_err(|_| ConversionError::InvalidNumber(i.to_string()))
            }
            UniversalType::Int64 => json_to_i64(value).map(UniversalValue::Int64),
            UniversalType::Float64 => json_to_f64(value).map(UniversalValue::Float64),
            UniversalType::Decimal { .. } => json_to_decimal(value).map(UniversalValue::Decimal),
            UniversalType::Date => {
                let s = expect_str(value, "date")?;
                parse_date_string(s)
                    .map(UniversalValue::Date)
                    .ok_or_else(|| ConversionError::InvalidDate(s.to_string()))
            }
            UniversalType::LocalDateTime => {
                let s = expect_str(value, "date/time")?;
                parse_datetime_string(s)
                    .map(UniversalValue::DateTime)
                    .ok_or_else(|| ConversionError::InvalidDateTime(s.to_string()))
            }
            UniversalType::VarChar { .. } | UniversalType::Text | UniversalType::Unknown { .. } => {
                Ok(UniversalValue::String(self.scalar_text(value)))
            }
        }
    }

    fn scalar_text(&self, value: &Value) -> String {
        match value {
            Value::String(s) => s.clone(),
            Value::Object(obj) => {
                // Lookups carry {"name": ..., "id": ...}; the id is what links records.
                let keys: &[&str] = if self.remote_type.is_lookup() {
                    &["id", "name"]
                } else {
                    &["name", "id"]
                };
                keys.iter()
                    .find_map(|k| obj.get(*k).map(plain_text))
                    .unwrap_or_else(|| value.to_string())
            }
            Value::Array(items) => join_items(items, &["id", "name"]),
            other => plain_text(other),
        }
    }

    fn multi_value_text(&self, value: &Value) -> String {
        match value {
            Value::Array(items) => join_items(items, &["id", "name"]),
            other => self.scalar_text(other),
        }
    }
}

fn join_items(items: &[Value], object_keys: &[&str]) -> String {
    items
        .iter()
        .filter(|v| !v.is_null())
        .map(|v| match v {
            Value::Object(obj) => object_keys
                .iter()
                .find_map(|k| obj.get(*k).map(plain_text))
                .unwrap_or_else(|| v.to_string()),
            other => plain_text(other),
        })
        .collect::<Vec<_>>()
        .join(&MULTI_VALUE_SEPARATOR.to_string())
}

fn plain_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn expect_str<'v>(value: &'v Value, expected: &str) -> Result<&'v str, ConversionError> {
    value
        .as_str()
        .ok_or_else(|| ConversionError::mismatch(expected, value))
}

fn json_to_bool(value: &Value) -> Result<bool, ConversionError> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) => Ok(n.as_f64().is_some_and(|f| f != 0.0)),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" | "" => Ok(false),
            _ => Err(ConversionError::InvalidBool(s.clone())),
        },
        other => Err(ConversionError::mismatch("boolean", other)),
    }
}

fn json_to_i64(value: &Value) -> Result<i64, ConversionError> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
            .ok_or_else(|| ConversionError::InvalidNumber(n.to_string())),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| ConversionError::InvalidNumber(s.clone())),
        Value::Bool(b) => Ok(i64::from(*b)),
        other => Err(ConversionError::mismatch("integer", other)),
    }
}

fn json_to_f64(value: &Value) -> Result<f64, ConversionError> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| ConversionError::InvalidNumber(n.to_string())),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| ConversionError::InvalidNumber(s.clone())),
        other => Err(ConversionError::mismatch("number", other)),
    }
}

fn json_to_decimal(value: &Value) -> Result<Decimal, ConversionError> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        other => return Err(ConversionError::mismatch("decimal", other)),
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|_| ConversionError::InvalidNumber(text))
}

/// Convert the fields of a remote record into mirror column values.
///
/// Only bound fields with a getter whose key is present in the record are
/// returned. Fields that fail to convert are reported separately so the
/// caller can log them; they are left out of the returned values.
pub fn record_to_field_values(
    record: &RemoteRecord,
    bindings: &FieldBindings,
) -> (FieldValues, Vec<(String, ConversionError)>) {
    let mut values = FieldValues::new();
    let mut errors = Vec::new();

    for binding in bindings.iter() {
        let Some(getter) = binding.getter.as_deref() else {
            continue;
        };
        let Some(raw) = record.get(getter) else {
            continue;
        };
        match JsonValueWithSchema::new(raw, binding.remote_type, &binding.column_type)
            .to_universal_value()
        {
            Ok(v) => {
                values.insert(binding.name.clone(), v);
            }
            Err(e) => errors.push((binding.name.clone(), e)),
        }
    }

    (values, errors)
}
