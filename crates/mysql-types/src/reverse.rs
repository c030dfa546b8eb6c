//! Reverse conversion: MySQL values → UniversalValue
//!
//! Mirror rows are always selected with an explicit column list, so the
//! expected type of every value is known from the table definition.

use chrono::{NaiveDate, NaiveDateTime};
use mysql_async::Value;
use rust_decimal::Decimal;
use std::str::FromStr;
use sync_core::{ColumnDefinition, FieldValues, UniversalType, UniversalValue};
use thiserror::Error;

/// MySQL value with schema information for type-aware conversion.
#[derive(Debug, Clone)]
pub struct MySQLValueWithSchema<'a> {
    /// The raw MySQL value.
    pub value: Value,
    /// The column type the value was read from.
    pub column_type: &'a UniversalType,
}

/// Error during MySQL value conversion.
#[derive(Debug, Error, PartialEq)]
pub enum ConversionError {
    #[error("Type mismatch: expected {expected}, got {actual:?}")]
    TypeMismatch { expected: String, actual: Value },
    #[error("Invalid UTF-8 in string: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
    #[error("Invalid date/time value")]
    InvalidDateTime,
    #[error("Invalid numeric value '{0}'")]
    InvalidNumber(String),
    #[error("Row has {actual} values, expected {expected}")]
    ColumnCount { expected: usize, actual: usize },
}

impl<'a> MySQLValueWithSchema<'a> {
    /// Create a new MySQLValueWithSchema.
    pub fn new(value: Value, column_type: &'a UniversalType) -> Self {
        Self { value, column_type }
    }

    /// Convert to a UniversalValue.
    pub fn to_universal_value(self) -> Result<UniversalValue, ConversionError> {
        let column_type = self.column_type;
        match (column_type, self.value) {
            (_, Value::NULL) => Ok(UniversalValue::Null),

            (UniversalType::Bool, v) => Ok(UniversalValue::Bool(value_to_i64(v)? != 0)),
            (UniversalType::Int32, v) => {
                let i = value_to_i64(v)?;
                i32::try_from(i)
                    .map(UniversalValue::Int32)
                    .map_err(|_| ConversionError::InvalidNumber(i.to_string()))
            }
            (UniversalType::Int64, v) => value_to_i64(v).map(UniversalValue::Int64),

            (UniversalType::Float64, Value::Double(f)) => Ok(UniversalValue::Float64(f)),
            (UniversalType::Float64, Value::Float(f)) => {
                Ok(UniversalValue::Float64(f64::from(f)))
            }
            (UniversalType::Float64, Value::Int(i)) => Ok(UniversalValue::Float64(i as f64)),
            (UniversalType::Float64, Value::Bytes(b)) => {
                let s = String::from_utf8(b)?;
                s.parse::<f64>()
                    .map(UniversalValue::Float64)
                    .map_err(|_| ConversionError::InvalidNumber(s))
            }

            (UniversalType::Decimal { .. }, Value::Bytes(b)) => {
                let s = String::from_utf8(b)?;
                Decimal::from_str(&s)
                    .map(UniversalValue::Decimal)
                    .map_err(|_| ConversionError::InvalidNumber(s))
            }
            (UniversalType::Decimal { .. }, Value::Int(i)) => {
                Ok(UniversalValue::Decimal(Decimal::from(i)))
            }

            (UniversalType::Date, Value::Date(y, m, d, _, _, _, _)) => {
                NaiveDate::from_ymd_opt(i32::from(y), u32::from(m), u32::from(d))
                    .map(UniversalValue::Date)
                    .ok_or(ConversionError::InvalidDateTime)
            }
            (UniversalType::Date, Value::Bytes(b)) => {
                let s = String::from_utf8(b)?;
                NaiveDate::parse_from_str(&s, "%Y-%m-%d")
                    .map(UniversalValue::Date)
                    .map_err(|_| ConversionError::InvalidDateTime)
            }

            (UniversalType::LocalDateTime, Value::Date(y, m, d, h, i, s, us)) => {
                NaiveDate::from_ymd_opt(i32::from(y), u32::from(m), u32::from(d))
                    .and_then(|date| {
                        date.and_hms_micro_opt(u32::from(h), u32::from(i), u32::from(s), us)
                    })
                    .map(UniversalValue::DateTime)
                    .ok_or(ConversionError::InvalidDateTime)
            }
            (UniversalType::LocalDateTime, Value::Bytes(b)) => {
                let s = String::from_utf8(b)?;
                NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S%.f")
                    .map(UniversalValue::DateTime)
                    .map_err(|_| ConversionError::InvalidDateTime)
            }

            (UniversalType::VarChar { .. } | UniversalType::Text, Value::Bytes(b))
            | (UniversalType::Unknown { .. }, Value::Bytes(b)) => {
                Ok(UniversalValue::String(String::from_utf8(b)?))
            }
            (UniversalType::VarChar { .. } | UniversalType::Text, Value::Int(i)) => {
                Ok(UniversalValue::String(i.to_string()))
            }

            (_, other) => Err(ConversionError::TypeMismatch {
                expected: column_type.to_string(),
                actual: other,
            }),
        }
    }
}

fn value_to_i64(value: Value) -> Result<i64, ConversionError> {
    match value {
        Value::Int(i) => Ok(i),
        Value::UInt(u) => {
            i64::try_from(u).map_err(|_| ConversionError::InvalidNumber(u.to_string()))
        }
        Value::Bytes(b) => {
            let s = String::from_utf8(b)?;
            s.trim()
                .parse::<i64>()
                .map_err(|_| ConversionError::InvalidNumber(s))
        }
        other => Err(ConversionError::TypeMismatch {
            expected: "integer".to_string(),
            actual: other,
        }),
    }
}

/// Read a string value (`id` column and shadow table columns).
pub fn value_to_string(value: Value) -> Result<Option<String>, ConversionError> {
    match value {
        Value::NULL => Ok(None),
        Value::Bytes(b) => Ok(Some(String::from_utf8(b)?)),
        Value::Int(i) => Ok(Some(i.to_string())),
        Value::UInt(u) => Ok(Some(u.to_string())),
        other => Err(ConversionError::TypeMismatch {
            expected: "string".to_string(),
            actual: other,
        }),
    }
}

/// Read a `uid` value.
pub fn value_to_uid(value: Value) -> Result<i64, ConversionError> {
    value_to_i64(value)
}

/// Convert the raw values of a row into mirror column values.
///
/// `values` must be in the order of `columns`.
pub fn row_to_field_values(
    values: Vec<Value>,
    columns: &[ColumnDefinition],
) -> Result<FieldValues, ConversionError> {
    if values.len() != columns.len() {
        return Err(ConversionError::ColumnCount {
            expected: columns.len(),
            actual: values.len(),
        });
    }

    values
        .into_iter()
        .zip(columns)
        .map(|(value, column)| {
            MySQLValueWithSchema::new(value, &column.column_type)
                .to_universal_value()
                .map(|v| (column.name.clone(), v))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn convert(value: Value, ty: UniversalType) -> UniversalValue {
        MySQLValueWithSchema::new(value, &ty)
            .to_universal_value()
            .unwrap()
    }

    #[test]
    fn test_null_conversion() {
        assert_eq!(convert(Value::NULL, UniversalType::Int32), UniversalValue::Null);
    }

    #[test]
    fn test_bool_from_int() {
        assert_eq!(
            convert(Value::Int(1), UniversalType::Bool),
            UniversalValue::Bool(true)
        );
        assert_eq!(
            convert(Value::Bytes(b"0".to_vec()), UniversalType::Bool),
            UniversalValue::Bool(false)
        );
    }

    #[test]
    fn test_decimal_from_text_protocol() {
        assert_eq!(
            convert(
                Value::Bytes(b"1999.5000".to_vec()),
                UniversalType::Decimal {
                    precision: 20,
                    scale: 4
                }
            ),
            UniversalValue::Decimal(Decimal::from_str("1999.5000").unwrap())
        );
    }

    #[test]
    fn test_datetime_both_protocols() {
        let expected = NaiveDate::from_ymd_opt(2019, 3, 20)
            .unwrap()
            .and_hms_opt(10, 15, 0)
            .unwrap();
        assert_eq!(
            convert(
                Value::Date(2019, 3, 20, 10, 15, 0, 0),
                UniversalType::LocalDateTime
            ),
            UniversalValue::DateTime(expected)
        );
        assert_eq!(
            convert(
                Value::Bytes(b"2019-03-20 10:15:00".to_vec()),
                UniversalType::LocalDateTime
            ),
            UniversalValue::DateTime(expected)
        );
    }

    #[test]
    fn test_int32_out_of_range() {
        let ty = UniversalType::Int32;
        let err = MySQLValueWithSchema::new(Value::Int(1 << 40), &ty)
            .to_universal_value()
            .unwrap_err();
        assert!(matches!(err, ConversionError::InvalidNumber(_)));
    }

    #[test]
    fn test_row_to_field_values() {
        let columns = vec![
            ColumnDefinition::nullable("lastName", UniversalType::VarChar { length: 80 }),
            ColumnDefinition::nullable("age", UniversalType::Int32),
        ];
        let values =
            row_to_field_values(vec![Value::Bytes(b"Smith".to_vec()), Value::NULL], &columns)
                .unwrap();
        assert_eq!(values["lastName"], UniversalValue::String("Smith".into()));
        assert_eq!(values["age"], UniversalValue::Null);

        let err = row_to_field_values(vec![Value::NULL], &columns).unwrap_err();
        assert_eq!(
            err,
            ConversionError::ColumnCount {
                expected: 2,
                actual: 1
            }
        );
    }

    #[test]
    fn test_value_to_string() {
        assert_eq!(value_to_string(Value::NULL).unwrap(), None);
        assert_eq!(
            value_to_string(Value::Bytes(b"abc".to_vec())).unwrap(),
            Some("abc".to_string())
        );
    }
}
