//! Values stored in mirror tables.
//!
//! Pull converts remote JSON into [`UniversalValue`]s, the stores persist them
//! and push converts them back into JSON.

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Column values of one mirror row, keyed by column name.
///
/// The `uid` and `id` key columns are never part of this map.
pub type FieldValues = BTreeMap<String, UniversalValue>;

/// A single column value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UniversalValue {
    /// SQL NULL
    Null,

    /// Boolean value
    Bool(bool),

    /// 32-bit signed integer
    Int32(i32),

    /// 64-bit signed integer
    Int64(i64),

    /// 64-bit floating point
    Float64(f64),

    /// Exact decimal
    Decimal(Decimal),

    /// String value
    String(String),

    /// Calendar date
    Date(NaiveDate),

    /// Date and time, UTC wall clock
    DateTime(NaiveDateTime),
}

impl UniversalValue {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Try to get this value as a string slice.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get this value as a timestamp.
    ///
    /// Dates are widened to midnight.
    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Self::DateTime(dt) => Some(*dt),
            Self::Date(d) => d.and_hms_opt(0, 0, 0),
            _ => None,
        }
    }
}

impl fmt::Display for UniversalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int32(i) => write!(f, "{i}"),
            Self::Int64(i) => write!(f, "{i}"),
            Self::Float64(v) => write!(f, "{v}"),
            Self::Decimal(d) => write!(f, "{d}"),
            Self::String(s) => f.write_str(s),
            Self::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Self::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

impl From<&str> for UniversalValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for UniversalValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<bool> for UniversalValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for UniversalValue {
    fn from(i: i64) -> Self {
        Self::Int64(i)
    }
}

impl From<NaiveDateTime> for UniversalValue {
    fn from(dt: NaiveDateTime) -> Self {
        Self::DateTime(dt)
    }
}

impl<T: Into<UniversalValue>> From<Option<T>> for UniversalValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}

/// One row of a mirror table.
#[derive(Debug, Clone, PartialEq)]
pub struct MirrorRow {
    /// Local surrogate key
    pub uid: i64,
    /// Remote identifier, `None` until the remote side confirmed the row
    pub id: Option<String>,
    /// Mapped column values
    pub values: FieldValues,
}

impl MirrorRow {
    /// Value of a column, `Null` when the column is absent.
    pub fn get(&self, column: &str) -> &UniversalValue {
        self.values.get(column).unwrap_or(&UniversalValue::Null)
    }

    /// Whether the row has a confirmed remote counterpart.
    pub fn is_synced(&self) -> bool {
        self.id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_option_into_value() {
        let none: Option<&str> = None;
        assert_eq!(UniversalValue::from(none), UniversalValue::Null);
        assert_eq!(
            UniversalValue::from(Some("x")),
            UniversalValue::String("x".to_string())
        );
    }

    #[test]
    fn test_date_widens_to_datetime() {
        let d = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let v = UniversalValue::Date(d);
        assert_eq!(v.as_datetime(), d.and_hms_opt(0, 0, 0));
        assert_eq!(v.to_string(), "2024-03-01");
    }

    #[test]
    fn test_mirror_row_missing_column_is_null() {
        let row = MirrorRow {
            uid: 1,
            id: None,
            values: FieldValues::new(),
        };
        assert!(row.get("lastName").is_null());
        assert!(!row.is_synced());
    }
}
