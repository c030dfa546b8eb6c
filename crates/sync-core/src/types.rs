//! Column types of the local mirror tables.
//!
//! `UniversalType` is the database-neutral description of a mirror column.
//! The Type Mapper produces it from remote field descriptors, the MySQL type
//! crate renders it as DDL and parses it back from `INFORMATION_SCHEMA`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Largest VARCHAR length before a text-like field falls back to TEXT.
pub const MAX_VARCHAR_LENGTH: u32 = 255;

/// Column type of a mirror table.
///
/// Only the types the Type Mapper can produce are represented, plus
/// [`UniversalType::Unknown`] for live columns that no remote field maps to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UniversalType {
    /// TINYINT(1)
    Bool,

    /// 32-bit signed integer
    Int32,

    /// 64-bit signed integer
    Int64,

    /// 64-bit floating point
    Float64,

    /// Exact numeric with fixed precision and scale
    Decimal {
        /// Total number of digits
        precision: u8,
        /// Digits after the decimal point
        scale: u8,
    },

    /// Variable-length string with a maximum length
    VarChar {
        /// Maximum length in characters
        length: u32,
    },

    /// Unbounded text
    Text,

    /// Calendar date
    Date,

    /// Date and time without zone information
    LocalDateTime,

    /// A live column type that does not correspond to any mapped type.
    ///
    /// Never produced by the Type Mapper, so a diff against a desired
    /// definition always reports the column as changed.
    Unknown {
        /// Raw column type as reported by the database
        raw: String,
    },
}

impl UniversalType {
    /// Whether values of this type are stored as strings locally.
    pub fn is_textual(&self) -> bool {
        matches!(self, Self::VarChar { .. } | Self::Text)
    }

    /// Whether values of this type carry a date or a timestamp.
    pub fn is_temporal(&self) -> bool {
        matches!(self, Self::Date | Self::LocalDateTime)
    }
}

impl fmt::Display for UniversalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool => f.write_str("bool"),
            Self::Int32 => f.write_str("int"),
            Self::Int64 => f.write_str("big_int"),
            Self::Float64 => f.write_str("double"),
            Self::Decimal { precision, scale } => write!(f, "decimal({precision},{scale})"),
            Self::VarChar { length } => write!(f, "var_char({length})"),
            Self::Text => f.write_str("text"),
            Self::Date => f.write_str("date"),
            Self::LocalDateTime => f.write_str("date_time"),
            Self::Unknown { raw } => write!(f, "unknown({raw})"),
        }
    }
}
