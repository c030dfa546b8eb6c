//! Core types for crm-sync.
//!
//! This crate provides the foundational types shared by the sync engine and
//! the store and client crates:
//!
//! - [`FieldDescriptor`] / [`RemoteFieldType`] - remote field metadata
//! - [`map_field_type`] - the Type Mapper (remote field → local column)
//! - [`FieldBindings`] - static per-module field accessors
//! - [`UniversalType`] / [`UniversalValue`] - database-neutral columns and values
//! - [`TableDefinition`] / [`TableDiff`] - mirror table schemas and patches
//! - [`RemoteClient`] - the remote CRM service interface
//!
//! # Architecture
//!
//! ```text
//! sync-core (this crate)
//!    │
//!    ├─── json-types            (remote JSON ⇄ UniversalValue)
//!    ├─── mysql-types           (UniversalType → DDL, mysql_async values)
//!    ├─── crm-sync-mirror       (schema sync, pull and push engines)
//!    ├─── crm-sync-mysql        (MySQL mirror store, triggers, progress)
//!    └─── crm-sync-remote-client (HTTP RemoteClient)
//! ```
//!
//! # Example
//!
//! ```rust
//! use sync_core::{map_field_type, FieldDescriptor, UniversalType};
//!
//! let field = FieldDescriptor::new("accountID", "Lookup");
//! let mapping = map_field_type(&field).unwrap();
//! assert_eq!(mapping.column_type, UniversalType::VarChar { length: 100 });
//! assert!(mapping.indexed);
//! ```

pub mod bindings;
pub mod descriptor;
pub mod mapping;
pub mod remote;
pub mod schema;
pub mod types;
pub mod values;

// Re-exports for convenience
pub use bindings::{FieldBinding, FieldBindings};
pub use descriptor::{FieldDescriptor, ModuleSpec, RemoteFieldType, UnsupportedFieldType};
pub use mapping::{map_field_type, table_name_for_module, ColumnMapping};
pub use remote::{
    DeletedPage, ListQuery, OutgoingRecord, RecordPage, RemoteClient, RemoteRecord, SaveResult,
    SortOrder,
};
pub use schema::{
    diff_tables, fit_identifier, is_key_column, ColumnDefinition, IndexDefinition,
    TableDefinition, TableDiff, ID_COLUMN, ID_INDEX, ID_LENGTH, MAX_IDENTIFIER_LENGTH,
    UID_COLUMN,
};
pub use types::{UniversalType, MAX_VARCHAR_LENGTH};
pub use values::{FieldValues, MirrorRow, UniversalValue};
