//! A module prepared for syncing.

use sync_core::{
    table_name_for_module, FieldBindings, ModuleSpec, TableDefinition, MAX_IDENTIFIER_LENGTH,
};
use tracing::warn;

use crate::config::MirrorConfig;
use crate::error::SyncError;
use crate::listener::ModuleContext;

/// Bindings and desired table of one remote module.
///
/// Built once per run from the module's descriptors; every engine works off
/// this instead of re-deriving types.
#[derive(Debug, Clone)]
pub struct MirrorModule {
    /// Remote module name
    pub name: String,
    pub bindings: FieldBindings,
    /// Desired mirror table
    pub table: TableDefinition,
    /// Mirror column holding the remote modification time
    pub modified_column: String,
}

impl MirrorModule {
    /// Map a module's descriptors.
    ///
    /// Fails on unsupported field types, on table or column names MySQL
    /// would reject as too long, and when the modification timestamp column
    /// is missing or has no remote key to read it from.
    pub fn new(spec: &ModuleSpec, config: &MirrorConfig) -> Result<Self, SyncError> {
        let bindings = FieldBindings::from_descriptors(&spec.fields)?;
        let table_name = table_name_for_module(&config.table_prefix, &spec.plural_name);

        for duplicate in bindings.duplicates() {
            warn!("Ignoring duplicate field '{duplicate}' of module {}", spec.module);
        }

        let too_long = std::iter::once(table_name.as_str())
            .chain(bindings.iter().map(|b| b.name.as_str()))
            .find(|name| name.chars().count() > MAX_IDENTIFIER_LENGTH);
        if let Some(name) = too_long {
            return Err(SyncError::IdentifierTooLong {
                table: table_name.clone(),
                name: name.to_string(),
                max: MAX_IDENTIFIER_LENGTH,
            });
        }

        let readable = bindings
            .get(&config.modified_column)
            .is_some_and(|b| b.getter.is_some() && b.column_type.is_temporal());
        if !readable {
            return Err(SyncError::MissingModifiedColumn {
                table: table_name,
                column: config.modified_column.clone(),
            });
        }

        let table = TableDefinition::from_bindings(table_name, &bindings);

        Ok(Self {
            name: spec.module.clone(),
            bindings,
            table,
            modified_column: config.modified_column.clone(),
        })
    }

    pub fn table_name(&self) -> &str {
        &self.table.name
    }

    /// Remote key of the modification timestamp.
    pub fn modified_key(&self) -> &str {
        self.bindings
            .get(&self.modified_column)
            .and_then(|b| b.getter.as_deref())
            .unwrap_or(&self.modified_column)
    }

    pub fn context(&self) -> ModuleContext<'_> {
        ModuleContext {
            module: &self.name,
            table: &self.table.name,
        }
    }
}
