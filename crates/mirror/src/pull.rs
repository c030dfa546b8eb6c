//! Pull engine: applies remote changes to the mirror tables.
//!
//! Records are listed page by page, sorted by modification time ascending,
//! starting from a persisted [`PullCheckpoint`]. Each record is applied in its
//! own transaction. In incremental mode a second pass over the remote deletion
//! log removes rows deleted remotely.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use checkpoint::{CheckpointID, CheckpointManager, CheckpointStore};
use json_types::record_to_field_values;
use std::sync::Arc;
use sync_core::{ListQuery, MirrorRow, RemoteClient, RemoteRecord, SortOrder, UniversalValue};
use tracing::{debug, info, warn};

use crate::config::MirrorConfig;
use crate::error::SyncError;
use crate::listener::ChangeListener;
use crate::module::MirrorModule;
use crate::progress::PullCheckpoint;
use crate::store::{finish, MirrorStore, MirrorTransaction, ShadowKind};

/// Where a pull starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PullMode {
    /// Resume from the persisted checkpoint and replay remote deletions
    #[default]
    Incremental,
    /// Re-read every record from page 1, without a lower bound
    Full,
}

/// Rows touched by one pull.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PullCounts {
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
    /// Updates left unapplied because their modification time was unusable
    pub skipped: usize,
    /// Pages fetched, deleted-id pages included
    pub pages: u32,
}

enum Applied {
    Inserted,
    Updated,
    Skipped,
}

pub struct PullEngine<'a> {
    store: &'a dyn MirrorStore,
    remote: &'a dyn RemoteClient,
    checkpoints: CheckpointManager<'a>,
    config: &'a MirrorConfig,
    listeners: &'a [Arc<dyn ChangeListener>],
}

impl<'a> PullEngine<'a> {
    pub fn new(
        store: &'a dyn MirrorStore,
        remote: &'a dyn RemoteClient,
        checkpoints: &'a dyn CheckpointStore,
        config: &'a MirrorConfig,
        listeners: &'a [Arc<dyn ChangeListener>],
    ) -> Self {
        Self {
            store,
            remote,
            checkpoints: CheckpointManager::new(checkpoints),
            config,
            listeners,
        }
    }

    /// Pull remote changes of one module into its mirror table.
    pub async fn pull(&self, module: &MirrorModule, mode: PullMode) -> Result<PullCounts, SyncError> {
        let table = module.table_name();
        let records_id = PullCheckpoint::records_id(table);
        let start = self.starting_point(module, mode, &records_id).await?;

        info!(
            "Pulling {} into {table} from page {} ({})",
            module.name,
            start.page,
            match start.modified_since {
                Some(since) => format!("modified since {}", since.to_rfc3339()),
                None => "all records".to_string(),
            }
        );

        let mut counts = PullCounts::default();
        let freshest = self
            .pull_records(module, &records_id, start.clone(), &mut counts)
            .await?;

        if mode == PullMode::Incremental {
            self.pull_deletions(module, start.modified_since, freshest, &mut counts)
                .await?;
        }

        info!(
            "Pulled {}: {} inserted, {} updated, {} deleted, {} skipped",
            module.name, counts.inserted, counts.updated, counts.deleted, counts.skipped
        );
        Ok(counts)
    }

    async fn starting_point(
        &self,
        module: &MirrorModule,
        mode: PullMode,
        id: &CheckpointID,
    ) -> Result<PullCheckpoint, SyncError> {
        if let Some(since) = self.config.modified_since {
            return Ok(PullCheckpoint::first_page(Some(since)));
        }
        if mode == PullMode::Full {
            return Ok(PullCheckpoint::first_page(None));
        }

        let table = module.table_name();
        if let Some(checkpoint) = self
            .checkpoints
            .load::<PullCheckpoint>(id)
            .await
            .map_err(SyncError::store(table))?
        {
            debug!("Resuming {id} at {}", checkpoint.page);
            return Ok(checkpoint);
        }

        Ok(PullCheckpoint::first_page(self.derived_since(module).await?))
    }

    /// Latest local modification (or creation) time plus one second.
    async fn derived_since(&self, module: &MirrorModule) -> Result<Option<DateTime<Utc>>, SyncError> {
        let table = module.table_name();
        let mut latest = self
            .store
            .max_timestamp(table, &module.modified_column)
            .await
            .map_err(SyncError::store(table))?;

        if latest.is_none() && module.table.has_column(&self.config.created_column) {
            latest = self
                .store
                .max_timestamp(table, &self.config.created_column)
                .await
                .map_err(SyncError::store(table))?;
        }

        Ok(latest.map(|t| (t + Duration::seconds(1)).and_utc()))
    }

    /// Returns the freshest modification time seen.
    async fn pull_records(
        &self,
        module: &MirrorModule,
        id: &CheckpointID,
        mut cursor: PullCheckpoint,
        counts: &mut PullCounts,
    ) -> Result<Option<DateTime<Utc>>, SyncError> {
        let table = module.table_name();
        let mut freshest: Option<NaiveDateTime> = None;

        loop {
            self.checkpoints
                .save(id, &cursor)
                .await
                .map_err(SyncError::store(table))?;

            let query = ListQuery {
                sort_by: module.modified_key().to_string(),
                order: SortOrder::Asc,
                modified_since: cursor.modified_since,
                page: cursor.page,
                page_size: self.config.page_size,
            };
            let page = self
                .remote
                .list_records(&module.name, &query)
                .await
                .map_err(|source| SyncError::RemoteFetch {
                    module: module.name.clone(),
                    source,
                })?;
            counts.pages += 1;
            debug!(
                "Fetched page {} of {} with {} records",
                cursor.page,
                module.name,
                page.records.len()
            );

            for record in &page.records {
                let (applied, modified) = self.apply_record(module, record).await?;
                match applied {
                    Applied::Inserted => counts.inserted += 1,
                    Applied::Updated => counts.updated += 1,
                    Applied::Skipped => counts.skipped += 1,
                }
                freshest = freshest.max(modified);
            }

            if !page.more_records {
                break;
            }
            cursor.page += 1;
        }

        let freshest = freshest.map(|t| t.and_utc());
        let done = PullCheckpoint::first_page(freshest.or(cursor.modified_since));
        self.checkpoints
            .save(id, &done)
            .await
            .map_err(SyncError::store(table))?;
        Ok(freshest)
    }

    async fn apply_record(
        &self,
        module: &MirrorModule,
        record: &RemoteRecord,
    ) -> Result<(Applied, Option<NaiveDateTime>), SyncError> {
        let table = module.table_name();
        let (values, errors) = record_to_field_values(record, &module.bindings);
        for (field, error) in errors {
            warn!(
                "Skipping field {field} of {} record {}: {error}",
                module.name, record.id
            );
        }
        let modified = values
            .get(&module.modified_column)
            .and_then(UniversalValue::as_datetime);

        let mut tx = self.store.begin().await.map_err(SyncError::store(table))?;
        let result = self.write_record(&mut *tx, module, record, values).await;
        let applied = finish(tx, table, result).await?;
        Ok((applied, modified))
    }

    async fn write_record(
        &self,
        tx: &mut (dyn MirrorTransaction + '_),
        module: &MirrorModule,
        record: &RemoteRecord,
        mut values: sync_core::FieldValues,
    ) -> Result<Applied, SyncError> {
        let table = module.table_name();
        let ctx = module.context();
        let listener_error = |source| SyncError::Listener {
            table: table.to_string(),
            source,
        };

        let existing = tx
            .find_by_id(&module.table, &record.id)
            .await
            .map_err(SyncError::store(table))?;

        let Some(old) = existing else {
            let uid = tx
                .insert_row(&module.table, Some(&record.id), &values)
                .await
                .map_err(SyncError::store(table))?;
            let row = MirrorRow {
                uid,
                id: Some(record.id.clone()),
                values,
            };
            for listener in self.listeners {
                listener.on_insert(&row, &ctx).map_err(listener_error)?;
            }
            return Ok(Applied::Inserted);
        };

        if self.config.two_way {
            // The update trigger only tells pulled writes from local edits by
            // a changed modification time.
            let modified = values
                .get(&module.modified_column)
                .and_then(UniversalValue::as_datetime);
            if modified.is_none() {
                warn!(
                    "Skipping update of {} record {}: no usable {}",
                    module.name,
                    record.id,
                    module.modified_key()
                );
                return Ok(Applied::Skipped);
            }

            let pending = tx
                .pending_update_fields(table, old.uid)
                .await
                .map_err(SyncError::store(table))?;
            if !pending.is_empty() {
                debug!(
                    "Keeping {} unpushed local fields of {table} uid {}",
                    pending.len(),
                    old.uid
                );
                values.retain(|column, _| !pending.contains(column));
            }
        }

        tx.update_row(&module.table, old.uid, &values)
            .await
            .map_err(SyncError::store(table))?;

        let mut new = old.clone();
        new.values.extend(values);
        for listener in self.listeners {
            listener.on_update(&new, &old, &ctx).map_err(listener_error)?;
        }
        Ok(Applied::Updated)
    }

    async fn pull_deletions(
        &self,
        module: &MirrorModule,
        records_since: Option<DateTime<Utc>>,
        freshest: Option<DateTime<Utc>>,
        counts: &mut PullCounts,
    ) -> Result<(), SyncError> {
        let table = module.table_name();
        let id = PullCheckpoint::deleted_id(table);

        let mut cursor = match self.config.modified_since {
            Some(since) => PullCheckpoint::first_page(Some(since)),
            None => self
                .checkpoints
                .load::<PullCheckpoint>(&id)
                .await
                .map_err(SyncError::store(table))?
                .unwrap_or_else(|| PullCheckpoint::first_page(records_since)),
        };

        loop {
            self.checkpoints
                .save(&id, &cursor)
                .await
                .map_err(SyncError::store(table))?;

            let page = self
                .remote
                .list_deleted_ids(
                    &module.name,
                    cursor.modified_since,
                    cursor.page,
                    self.config.page_size,
                )
                .await
                .map_err(|source| SyncError::RemoteFetch {
                    module: module.name.clone(),
                    source,
                })?;
            counts.pages += 1;

            for remote_id in &page.ids {
                if self.apply_deletion(module, remote_id).await? {
                    counts.deleted += 1;
                }
            }

            if !page.more_records {
                break;
            }
            cursor.page += 1;
        }

        // Deleted ids carry no timestamp; advance in the remote's clock.
        let done = PullCheckpoint::first_page(freshest.or(cursor.modified_since));
        self.checkpoints
            .save(&id, &done)
            .await
            .map_err(SyncError::store(table))
    }

    async fn apply_deletion(&self, module: &MirrorModule, remote_id: &str) -> Result<bool, SyncError> {
        let table = module.table_name();
        let mut tx = self.store.begin().await.map_err(SyncError::store(table))?;
        let result = self.delete_record(&mut *tx, table, remote_id).await;
        finish(tx, table, result).await
    }

    async fn delete_record(
        &self,
        tx: &mut (dyn MirrorTransaction + '_),
        table: &str,
        remote_id: &str,
    ) -> Result<bool, SyncError> {
        let Some(uid) = tx
            .uid_for_id(table, remote_id)
            .await
            .map_err(SyncError::store(table))?
        else {
            return Ok(false);
        };

        tx.delete_row(table, uid)
            .await
            .map_err(SyncError::store(table))?;

        if self.config.two_way {
            for kind in [ShadowKind::Insert, ShadowKind::Update] {
                tx.remove_shadow(kind, table, uid)
                    .await
                    .map_err(SyncError::store(table))?;
            }
            tx.remove_delete_by_id(table, remote_id)
                .await
                .map_err(SyncError::store(table))?;
        }

        debug!("Deleted {table} uid {uid} (remote {remote_id})");
        Ok(true)
    }
}
