//! JSON type conversions for sync-core values.
//!
//! This crate converts between the JSON values exchanged with the remote CRM
//! service and sync-core's `UniversalValue`.
//!
//! # Modules
//!
//! - [`reverse`] - remote JSON → UniversalValue (pull)
//! - [`forward`] - UniversalValue → remote JSON (push, inverse coercion)
//!
//! # Example
//!
//! ```
//! use json_types::{universal_to_json, JsonValueWithSchema};
//! use sync_core::{RemoteFieldType, UniversalType, UniversalValue};
//!
//! // Reverse: a lookup object becomes its id
//! let json = serde_json::json!({"name": "Acme", "id": "4150868000000224005"});
//! let value = JsonValueWithSchema::new(
//!     &json,
//!     RemoteFieldType::Lookup,
//!     &UniversalType::VarChar { length: 100 },
//! )
//! .to_universal_value()
//! .unwrap();
//! assert_eq!(value, UniversalValue::String("4150868000000224005".into()));
//!
//! // Forward: multi-select values are split on ';'
//! let out = universal_to_json(
//!     &UniversalValue::String("A;B".into()),
//!     RemoteFieldType::MultiSelectPicklist,
//! )
//! .unwrap();
//! assert_eq!(out, serde_json::json!(["A", "B"]));
//! ```

pub mod forward;
pub mod reverse;

pub use forward::{universal_to_json, JsonValue};
pub use reverse::{record_to_field_values, JsonValueWithSchema};

/// Error during JSON value conversion.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConversionError {
    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },
    #[error("Invalid date '{0}'")]
    InvalidDate(String),
    #[error("Invalid date/time '{0}'")]
    InvalidDateTime(String),
    #[error("Invalid number '{0}'")]
    InvalidNumber(String),
    #[error("Invalid boolean '{0}'")]
    InvalidBool(String),
}

impl ConversionError {
    pub(crate) fn mismatch(
        expected: impl std::fmt::Display,
        actual: impl std::fmt::Display,
    ) -> Self {
        Self::TypeMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}

/// Separator of multi-valued fields in their local TEXT column.
pub const MULTI_VALUE_SEPARATOR: char = ';';
