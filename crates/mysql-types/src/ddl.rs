//! MySQL DDL generation for mirror tables.
//!
//! This module renders sync-core's `TableDefinition` and `TableDiff` as
//! MySQL `CREATE TABLE` / `ALTER TABLE` statements.

use sync_core::{
    ColumnDefinition, IndexDefinition, TableDefinition, TableDiff, UniversalType, ID_COLUMN,
    ID_LENGTH, UID_COLUMN,
};

/// Quote a MySQL identifier with backticks.
pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Trait for generating DDL type strings.
pub trait ToDdl {
    /// Convert a UniversalType to a DDL type string.
    fn to_ddl(&self, ext_type: &UniversalType) -> String;

    /// Generate a complete CREATE TABLE statement for a mirror table.
    fn to_create_table(&self, table: &TableDefinition) -> String;
}

/// MySQL DDL generator.
pub struct MySQLDdl;

impl ToDdl for MySQLDdl {
    fn to_ddl(&self, ext_type: &UniversalType) -> String {
        match ext_type {
            // Boolean - MySQL uses TINYINT(1)
            UniversalType::Bool => "TINYINT(1)".to_string(),

            // Integer types
            UniversalType::Int32 => "INT".to_string(),
            UniversalType::Int64 => "BIGINT".to_string(),

            // Floating point
            UniversalType::Float64 => "DOUBLE".to_string(),

            // Exact numeric
            UniversalType::Decimal { precision, scale } => {
                format!("DECIMAL({precision},{scale})")
            }

            // String types
            UniversalType::VarChar { length } => format!("VARCHAR({length})"),
            UniversalType::Text => "TEXT".to_string(),

            // Date/time types
            UniversalType::Date => "DATE".to_string(),
            UniversalType::LocalDateTime => "DATETIME".to_string(),

            // Never produced for desired tables; keep whatever the database reported.
            UniversalType::Unknown { raw } => raw.to_uppercase(),
        }
    }

    fn to_create_table(&self, table: &TableDefinition) -> String {
        let mut lines = vec![
            format!(
                "  {} BIGINT NOT NULL AUTO_INCREMENT",
                quote_identifier(UID_COLUMN)
            ),
            format!("  {} VARCHAR({ID_LENGTH}) NULL", quote_identifier(ID_COLUMN)),
        ];
        lines.extend(
            table
                .columns
                .iter()
                .map(|c| format!("  {}", self.column_clause(c))),
        );
        lines.push(format!("  PRIMARY KEY ({})", quote_identifier(UID_COLUMN)));
        lines.extend(
            table
                .indexes
                .iter()
                .map(|i| format!("  {}", self.index_clause(i))),
        );

        format!(
            "CREATE TABLE {} (\n{}\n) DEFAULT CHARACTER SET utf8mb4",
            quote_identifier(&table.name),
            lines.join(",\n")
        )
    }
}

impl MySQLDdl {
    /// Column definition clause, e.g. `` `lastName` VARCHAR(80) NULL ``.
    pub fn column_clause(&self, column: &ColumnDefinition) -> String {
        let null_clause = if column.nullable { "NULL" } else { "NOT NULL" };
        format!(
            "{} {} {}",
            quote_identifier(&column.name),
            self.to_ddl(&column.column_type),
            null_clause
        )
    }

    /// Index clause usable inside CREATE TABLE and after ALTER TABLE ADD.
    pub fn index_clause(&self, index: &IndexDefinition) -> String {
        let kind = if index.unique { "UNIQUE INDEX" } else { "INDEX" };
        format!(
            "{kind} {} ({})",
            quote_identifier(&index.name),
            quote_identifier(&index.column)
        )
    }

    /// Generate the ALTER TABLE statement applying a diff.
    ///
    /// Returns `None` for an empty diff. Indexes are dropped before columns
    /// change and added after.
    pub fn to_alter_table(&self, diff: &TableDiff) -> Option<String> {
        if diff.is_empty() {
            return None;
        }

        let mut clauses = Vec::new();
        clauses.extend(
            diff.dropped_indexes
                .iter()
                .map(|name| format!("DROP INDEX {}", quote_identifier(name))),
        );
        clauses.extend(
            diff.removed_columns
                .iter()
                .map(|name| format!("DROP COLUMN {}", quote_identifier(name))),
        );
        clauses.extend(
            diff.changed_columns
                .iter()
                .map(|c| format!("MODIFY COLUMN {}", self.column_clause(c))),
        );
        clauses.extend(
            diff.added_columns
                .iter()
                .map(|c| format!("ADD COLUMN {}", self.column_clause(c))),
        );
        clauses.extend(
            diff.added_indexes
                .iter()
                .map(|i| format!("ADD {}", self.index_clause(i))),
        );

        Some(format!(
            "ALTER TABLE {}\n  {}",
            quote_identifier(&diff.table),
            clauses.join(",\n  ")
        ))
    }

    /// Generate an INSERT statement template.
    pub fn to_insert(&self, table_name: &str, columns: &[&str]) -> String {
        let placeholders: Vec<&str> = columns.iter().map(|_| "?").collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_identifier(table_name),
            columns
                .iter()
                .map(|c| quote_identifier(c))
                .collect::<Vec<_>>()
                .join(", "),
            placeholders.join(", ")
        )
    }

    /// Generate an UPDATE ... WHERE `uid` = ? statement template.
    pub fn to_update_by_uid(&self, table_name: &str, columns: &[&str]) -> String {
        let assignments: Vec<String> = columns
            .iter()
            .map(|c| format!("{} = ?", quote_identifier(c)))
            .collect();
        format!(
            "UPDATE {} SET {} WHERE {} = ?",
            quote_identifier(table_name),
            assignments.join(", "),
            quote_identifier(UID_COLUMN)
        )
    }
}
