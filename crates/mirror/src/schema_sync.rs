//! Keeps mirror tables in line with module descriptors.

use sync_core::diff_tables;
use tracing::{debug, info};

use crate::config::MirrorConfig;
use crate::error::SyncError;
use crate::module::MirrorModule;
use crate::store::MirrorStore;

/// Creates or alters mirror tables and provisions change-capture triggers.
pub struct SchemaSynchronizer<'a> {
    store: &'a dyn MirrorStore,
    config: &'a MirrorConfig,
}

impl<'a> SchemaSynchronizer<'a> {
    pub fn new(store: &'a dyn MirrorStore, config: &'a MirrorConfig) -> Self {
        Self { store, config }
    }

    /// Bring the module's table in line with its descriptors.
    ///
    /// Returns whether any DDL was issued. With two-way sync enabled the
    /// triggers are re-installed whenever the table changed, or always when
    /// `force_triggers` is set, since they list every column.
    pub async fn synchronize(
        &self,
        module: &MirrorModule,
        force_triggers: bool,
    ) -> Result<bool, SyncError> {
        let desired = &module.table;
        let table = desired.name.as_str();

        let live = self
            .store
            .describe_table(table)
            .await
            .map_err(SyncError::schema(table))?;

        let changed = match live {
            None => {
                self.store
                    .create_table(desired)
                    .await
                    .map_err(SyncError::schema(table))?;
                info!("Created table {table} for module {}", module.name);
                true
            }
            Some(live) => {
                let diff = diff_tables(&live, desired);
                if diff.is_empty() {
                    debug!("Table {table} is up to date");
                    false
                } else {
                    self.store
                        .alter_table(&diff)
                        .await
                        .map_err(SyncError::schema(table))?;
                    info!(
                        "Altered table {table}: {} added, {} changed, {} removed columns",
                        diff.added_columns.len(),
                        diff.changed_columns.len(),
                        diff.removed_columns.len()
                    );
                    true
                }
            }
        };

        if self.config.two_way && (changed || force_triggers) {
            self.store
                .create_tracking_tables()
                .await
                .map_err(SyncError::schema(table))?;
            self.store
                .install_triggers(desired, &module.modified_column)
                .await
                .map_err(SyncError::schema(table))?;
            info!("Installed change-capture triggers on {table}");
        }

        Ok(changed)
    }
}
