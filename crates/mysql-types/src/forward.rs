//! Forward conversion: UniversalValue → MySQLValue
//!
//! Converts mirror values into `mysql_async` parameters for INSERT and
//! UPDATE statements.

use chrono::{Datelike, NaiveDateTime, NaiveTime, Timelike};
use mysql_async::Value;
use sync_core::UniversalValue;

/// MySQL value wrapper for type-safe conversions.
#[derive(Debug, Clone, PartialEq)]
pub struct MySQLValue(pub Value);

impl MySQLValue {
    /// Get the inner mysql_async::Value.
    pub fn into_inner(self) -> Value {
        self.0
    }

    /// Get a reference to the inner value.
    pub fn as_inner(&self) -> &Value {
        &self.0
    }
}

fn datetime_value(dt: &NaiveDateTime) -> Value {
    Value::Date(
        dt.year() as u16,
        dt.month() as u8,
        dt.day() as u8,
        dt.hour() as u8,
        dt.minute() as u8,
        dt.second() as u8,
        0,
    )
}

impl From<&UniversalValue> for MySQLValue {
    fn from(value: &UniversalValue) -> Self {
        let inner = match value {
            UniversalValue::Null => Value::NULL,
            // Boolean - MySQL uses TINYINT(1)
            UniversalValue::Bool(b) => Value::Int(i64::from(*b)),
            UniversalValue::Int32(i) => Value::Int(i64::from(*i)),
            UniversalValue::Int64(i) => Value::Int(*i),
            UniversalValue::Float64(f) => Value::Double(*f),
            // Decimal - sent as its string form to keep precision
            UniversalValue::Decimal(d) => Value::Bytes(d.to_string().into_bytes()),
            UniversalValue::String(s) => Value::Bytes(s.clone().into_bytes()),
            UniversalValue::Date(d) => datetime_value(&d.and_time(NaiveTime::MIN)),
            UniversalValue::DateTime(dt) => datetime_value(dt),
        };
        MySQLValue(inner)
    }
}

impl From<UniversalValue> for MySQLValue {
    fn from(value: UniversalValue) -> Self {
        MySQLValue::from(&value)
    }
}

/// Convert a timestamp into a MySQL parameter.
pub fn datetime_param(dt: &NaiveDateTime) -> Value {
    datetime_value(dt)
}
