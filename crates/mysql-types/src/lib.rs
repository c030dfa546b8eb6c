//! MySQL type conversions for sync-core types.
//!
//! This crate provides the MySQL side of the mirror: DDL generation for
//! mirror tables and bidirectional conversions between sync-core's
//! `UniversalValue` and `mysql_async` values.
//!
//! # Structure
//!
//! - `forward`: Convert `UniversalValue` → `MySQLValue` (statement parameters)
//! - `reverse`: Convert MySQL values → `UniversalValue` (reading mirror rows)
//! - `ddl`: Generate MySQL DDL from `TableDefinition` / `TableDiff`
//! - `schema`: MySQL column type to UniversalType conversion
//!
//! # Example
//!
//! ```rust
//! use mysql_types::{mysql_column_to_universal_type, MySQLDdl, MySQLValue, ToDdl};
//! use sync_core::{UniversalType, UniversalValue};
//!
//! // Forward conversion
//! let mysql_value = MySQLValue::from(&UniversalValue::Bool(true));
//! assert_eq!(mysql_value.into_inner(), mysql_async::Value::Int(1));
//!
//! // DDL generation
//! assert_eq!(MySQLDdl.to_ddl(&UniversalType::Bool), "TINYINT(1)");
//!
//! // Column type conversion
//! let ut = mysql_column_to_universal_type("INT", "int(11)", None, None);
//! assert_eq!(ut, UniversalType::Int32);
//! ```

pub mod ddl;
pub mod forward;
pub mod reverse;
pub mod schema;

pub use ddl::{quote_identifier, MySQLDdl, ToDdl};
pub use forward::{datetime_param, MySQLValue};
pub use reverse::{
    row_to_field_values, value_to_string, value_to_uid, ConversionError, MySQLValueWithSchema,
};
pub use schema::mysql_column_to_universal_type;
