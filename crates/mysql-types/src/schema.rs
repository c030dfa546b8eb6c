//! MySQL schema column type conversion.
//!
//! This module provides conversion from MySQL INFORMATION_SCHEMA column types
//! to `UniversalType`, so a live mirror table can be diffed against the table
//! its field descriptors describe.

use sync_core::UniversalType;

/// Convert MySQL INFORMATION_SCHEMA column type to UniversalType.
///
/// # Arguments
///
/// * `data_type` - The MySQL data type name (e.g., "INT", "VARCHAR", "DATETIME")
/// * `column_type` - The full column type string (e.g., "int", "varchar(255)", "tinyint(1)")
/// * `precision` - Optional numeric precision
/// * `scale` - Optional numeric scale
///
/// Types the mirror never creates come back as [`UniversalType::Unknown`]
/// carrying the raw `column_type`.
///
/// # Example
///
/// ```
/// use mysql_types::mysql_column_to_universal_type;
/// use sync_core::UniversalType;
///
/// let ut = mysql_column_to_universal_type("INT", "int(11)", None, None);
/// assert_eq!(ut, UniversalType::Int32);
///
/// // TINYINT(1) is treated as boolean in MySQL
/// let ut = mysql_column_to_universal_type("TINYINT", "tinyint(1)", None, None);
/// assert_eq!(ut, UniversalType::Bool);
/// ```
pub fn mysql_column_to_universal_type(
    data_type: &str,
    column_type: &str,
    precision: Option<u32>,
    scale: Option<u32>,
) -> UniversalType {
    let unknown = || UniversalType::Unknown {
        raw: column_type.to_lowercase(),
    };

    match data_type.to_uppercase().as_str() {
        "TINYINT" if column_type.to_lowercase().starts_with("tinyint(1)") => UniversalType::Bool,
        "BOOLEAN" | "BOOL" => UniversalType::Bool,
        "INT" | "INTEGER" if !is_unsigned(column_type) => UniversalType::Int32,
        "BIGINT" if !is_unsigned(column_type) => UniversalType::Int64,
        "DOUBLE" | "REAL" => UniversalType::Float64,
        "DECIMAL" | "NUMERIC" => match (precision, scale) {
            (Some(p), Some(s)) if p <= u32::from(u8::MAX) && s <= u32::from(u8::MAX) => {
                UniversalType::Decimal {
                    precision: p as u8,
                    scale: s as u8,
                }
            }
            _ => unknown(),
        },
        "VARCHAR" => match extract_length_from_column_type(column_type) {
            Some(length) => UniversalType::VarChar { length },
            None => unknown(),
        },
        "TEXT" => UniversalType::Text,
        "DATE" => UniversalType::Date,
        "DATETIME" => UniversalType::LocalDateTime,
        _ => unknown(),
    }
}

fn is_unsigned(column_type: &str) -> bool {
    column_type.to_lowercase().contains("unsigned")
}

/// Extract length from a MySQL column type string.
///
/// E.g., "varchar(255)" -> Some(255), "int(11)" -> Some(11)
fn extract_length_from_column_type(column_type: &str) -> Option<u32> {
    let start = column_type.find('(')?;
    let end = column_type.find(')')?;
    if start >= end {
        return None;
    }
    let inner = &column_type[start + 1..end];
    // DECIMAL(10,2) style
    let first_part = inner.split(',').next().unwrap_or(inner);
    first_part.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mysql_int_types() {
        assert_eq!(
            mysql_column_to_universal_type("INT", "int", None, None),
            UniversalType::Int32
        );
        assert_eq!(
            mysql_column_to_universal_type("int", "int(11)", None, None),
            UniversalType::Int32
        );
        assert_eq!(
            mysql_column_to_universal_type("BIGINT", "bigint(20)", None, None),
            UniversalType::Int64
        );
        assert_eq!(
            mysql_column_to_universal_type("bigint", "bigint unsigned", None, None),
            UniversalType::Unknown {
                raw: "bigint unsigned".into()
            }
        );
    }

    #[test]
    fn test_mysql_tinyint1_bool() {
        assert_eq!(
            mysql_column_to_universal_type("tinyint", "tinyint(1)", None, None),
            UniversalType::Bool
        );
        assert!(matches!(
            mysql_column_to_universal_type("tinyint", "tinyint(4)", None, None),
            UniversalType::Unknown { .. }
        ));
    }

    #[test]
    fn test_mysql_decimal() {
        assert_eq!(
            mysql_column_to_universal_type("decimal", "decimal(20,4)", Some(20), Some(4)),
            UniversalType::Decimal {
                precision: 20,
                scale: 4
            }
        );
    }

    #[test]
    fn test_mysql_strings() {
        assert_eq!(
            mysql_column_to_universal_type("varchar", "varchar(100)", None, None),
            UniversalType::VarChar { length: 100 }
        );
        assert_eq!(
            mysql_column_to_universal_type("text", "text", None, None),
            UniversalType::Text
        );
        assert_eq!(
            mysql_column_to_universal_type("mediumtext", "mediumtext", None, None),
            UniversalType::Unknown {
                raw: "mediumtext".into()
            }
        );
    }

    #[test]
    fn test_mysql_temporal() {
        assert_eq!(
            mysql_column_to_universal_type("date", "date", None, None),
            UniversalType::Date
        );
        assert_eq!(
            mysql_column_to_universal_type("datetime", "datetime", None, None),
            UniversalType::LocalDateTime
        );
        assert!(matches!(
            mysql_column_to_universal_type("timestamp", "timestamp", None, None),
            UniversalType::Unknown { .. }
        ));
    }

    #[test]
    fn test_extract_length() {
        assert_eq!(extract_length_from_column_type("varchar(255)"), Some(255));
        assert_eq!(extract_length_from_column_type("decimal(10,2)"), Some(10));
        assert_eq!(extract_length_from_column_type("text"), None);
    }
}
