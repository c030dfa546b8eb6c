//! Mirror table definitions and schema diffs.
//!
//! ## Type Hierarchy
//!
//! - `ColumnDefinition` - one mapped column
//! - `IndexDefinition` - one secondary index
//! - `TableDefinition` - a mirror table (key columns are implicit)
//! - `TableDiff` - the minimal patch turning a live table into a desired one
//!
//! Every mirror table carries the key columns [`UID_COLUMN`] and
//! [`ID_COLUMN`]; they are never part of `columns` and never diffed.

use crate::bindings::FieldBindings;
use crate::types::UniversalType;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Local surrogate key, `BIGINT AUTO_INCREMENT PRIMARY KEY`.
pub const UID_COLUMN: &str = "uid";

/// Remote identifier, `VARCHAR(100) NULL` with a unique index.
pub const ID_COLUMN: &str = "id";

/// Length of the remote identifier column.
pub const ID_LENGTH: u32 = 100;

/// Name of the unique index on [`ID_COLUMN`].
pub const ID_INDEX: &str = "uniq_id";

/// Whether a column name is one of the key columns.
pub fn is_key_column(name: &str) -> bool {
    name == UID_COLUMN || name == ID_COLUMN
}

/// Longest table, column, index or trigger name MySQL accepts.
pub const MAX_IDENTIFIER_LENGTH: usize = 64;

/// Shorten a generated identifier to [`MAX_IDENTIFIER_LENGTH`].
///
/// Names that fit are returned unchanged. Longer ones keep a prefix followed
/// by `_` and 8 hex digits of the SHA-256 of the full name, so the result is
/// stable across runs and distinct long names stay distinct.
pub fn fit_identifier(name: &str) -> String {
    if name.len() <= MAX_IDENTIFIER_LENGTH {
        return name.to_string();
    }
    let digest = Sha256::digest(name.as_bytes());
    let hash: String = digest.iter().take(4).map(|b| format!("{b:02x}")).collect();

    let mut end = MAX_IDENTIFIER_LENGTH - hash.len() - 1;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}_{hash}", &name[..end])
}

// ============================================================================
// Definitions
// ============================================================================

/// A mapped column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub name: String,
    pub column_type: UniversalType,
    pub nullable: bool,
}

impl ColumnDefinition {
    /// A nullable column, the only kind the mapper produces.
    pub fn nullable(name: impl Into<String>, column_type: UniversalType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: true,
        }
    }
}

/// A single-column secondary index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDefinition {
    pub name: String,
    pub column: String,
    pub unique: bool,
}

impl IndexDefinition {
    /// Non-unique index named `idx_<column>`, shortened by [`fit_identifier`].
    pub fn for_column(column: &str) -> Self {
        Self {
            name: fit_identifier(&format!("idx_{column}")),
            column: column.to_string(),
            unique: false,
        }
    }

    /// Unique index on the remote identifier.
    pub fn natural_id() -> Self {
        Self {
            name: ID_INDEX.to_string(),
            column: ID_COLUMN.to_string(),
            unique: true,
        }
    }
}

/// A mirror table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDefinition {
    pub name: String,
    /// Mapped columns, in field order
    pub columns: Vec<ColumnDefinition>,
    /// Secondary indexes, including the unique index on `id`
    pub indexes: Vec<IndexDefinition>,
}

impl TableDefinition {
    /// Build the desired definition of a mirror table from its bindings.
    pub fn from_bindings(name: impl Into<String>, bindings: &FieldBindings) -> Self {
        let mut columns = Vec::with_capacity(bindings.len());
        let mut indexes = vec![IndexDefinition::natural_id()];

        for binding in bindings.iter() {
            columns.push(ColumnDefinition::nullable(
                binding.name.clone(),
                binding.column_type.clone(),
            ));
            if binding.indexed {
                indexes.push(IndexDefinition::for_column(&binding.name));
            }
        }

        Self {
            name: name.into(),
            columns,
            indexes,
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }
}

// ============================================================================
// Diff
// ============================================================================

/// Changes turning a live table into the desired one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableDiff {
    pub table: String,
    pub added_columns: Vec<ColumnDefinition>,
    pub changed_columns: Vec<ColumnDefinition>,
    pub removed_columns: Vec<String>,
    pub added_indexes: Vec<IndexDefinition>,
    pub dropped_indexes: Vec<String>,
}

impl TableDiff {
    pub fn is_empty(&self) -> bool {
        self.added_columns.is_empty()
            && self.changed_columns.is_empty()
            && self.removed_columns.is_empty()
            && self.added_indexes.is_empty()
            && self.dropped_indexes.is_empty()
    }

    /// Apply the diff to a definition in place.
    ///
    /// Used by stores that keep definitions in memory.
    pub fn apply_to(&self, table: &mut TableDefinition) {
        table
            .columns
            .retain(|c| !self.removed_columns.contains(&c.name));
        for changed in &self.changed_columns {
            if let Some(column) = table.columns.iter_mut().find(|c| c.name == changed.name) {
                *column = changed.clone();
            }
        }
        table.columns.extend(self.added_columns.iter().cloned());

        table.indexes.retain(|i| {
            !self.dropped_indexes.contains(&i.name) && !self.removed_columns.contains(&i.column)
        });
        table.indexes.extend(self.added_indexes.iter().cloned());
    }
}

/// Compute the diff between a live and a desired table definition.
///
/// An index whose column or uniqueness changed is dropped and re-added.
/// Indexes on removed columns disappear with their column.
pub fn diff_tables(live: &TableDefinition, desired: &TableDefinition) -> TableDiff {
    let live_columns: HashMap<&str, &ColumnDefinition> =
        live.columns.iter().map(|c| (c.name.as_str(), c)).collect();

    let mut diff = TableDiff {
        table: desired.name.clone(),
        ..Default::default()
    };

    for column in &desired.columns {
        match live_columns.get(column.name.as_str()) {
            None => diff.added_columns.push(column.clone()),
            Some(existing) if *existing != column => diff.changed_columns.push(column.clone()),
            Some(_) => {}
        }
    }

    diff.removed_columns = live
        .columns
        .iter()
        .filter(|c| !desired.has_column(&c.name))
        .map(|c| c.name.clone())
        .collect();

    let live_indexes: HashMap<&str, &IndexDefinition> =
        live.indexes.iter().map(|i| (i.name.as_str(), i)).collect();
    let desired_indexes: HashMap<&str, &IndexDefinition> =
        desired.indexes.iter().map(|i| (i.name.as_str(), i)).collect();

    for index in &live.indexes {
        let dropped_with_column = diff.removed_columns.contains(&index.column);
        let keep = desired_indexes
            .get(index.name.as_str())
            .is_some_and(|d| *d == index);
        if !keep && !dropped_with_column {
            diff.dropped_indexes.push(index.name.clone());
        }
    }

    for index in &desired.indexes {
        let exists = live_indexes
            .get(index.name.as_str())
            .is_some_and(|l| *l == index);
        if !exists {
            diff.added_indexes.push(index.clone());
        }
    }

    diff
}
