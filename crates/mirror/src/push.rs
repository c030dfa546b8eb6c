//! Push engine: sends captured local changes to the remote service.
//!
//! Inserts and updates are drained from the shadow tables in batches until no
//! eligible row is left. Each remote result is reconciled on its own: a
//! success removes the shadow rows, a rejection poisons them so they are
//! skipped by later batches.

use json_types::universal_to_json;
use serde_json::{Map, Value};
use sync_core::{MirrorRow, OutgoingRecord, RemoteClient, SaveResult, UniversalValue};
use tracing::{debug, info, warn};

use crate::config::MirrorConfig;
use crate::error::{RecordPushError, SyncError};
use crate::module::MirrorModule;
use crate::store::{finish, MirrorStore, MirrorTransaction, PendingUpdate, ShadowKind};

/// Which shadow table to drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushDirection {
    Insert,
    Update,
}

/// Outcome of draining one shadow table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushReport {
    /// Records the remote side accepted
    pub confirmed: usize,
    /// Inserts the remote side merged into an already mirrored record
    pub merged: usize,
    pub failed: Vec<RecordPushError>,
}

/// Reports of a full push of one module.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushSummary {
    pub inserts: PushReport,
    pub updates: PushReport,
    pub deletes: PushReport,
}

impl PushSummary {
    pub fn failed(&self) -> usize {
        self.inserts.failed.len() + self.updates.failed.len() + self.deletes.failed.len()
    }
}

/// A record of an update batch: its uid, changed fields and the values read
/// for them.
struct Sent {
    uid: i64,
    fields: Vec<String>,
    values: Vec<(String, UniversalValue)>,
}

impl Sent {
    fn new(row: &MirrorRow, fields: Vec<String>) -> Self {
        let values = fields
            .iter()
            .map(|name| (name.clone(), row.get(name).clone()))
            .collect();
        Self {
            uid: row.uid,
            fields,
            values,
        }
    }
}

pub struct PushEngine<'a> {
    store: &'a dyn MirrorStore,
    remote: &'a dyn RemoteClient,
    config: &'a MirrorConfig,
}

impl<'a> PushEngine<'a> {
    pub fn new(
        store: &'a dyn MirrorStore,
        remote: &'a dyn RemoteClient,
        config: &'a MirrorConfig,
    ) -> Self {
        Self {
            store,
            remote,
            config,
        }
    }

    /// Push inserts, then updates, then deletes.
    pub async fn push_all(&self, module: &MirrorModule) -> Result<PushSummary, SyncError> {
        let summary = PushSummary {
            inserts: self.push(module, PushDirection::Insert).await?,
            updates: self.push(module, PushDirection::Update).await?,
            deletes: self.push_deleted_rows(module).await?,
        };
        info!(
            "Pushed {}: {} inserted, {} merged, {} updated, {} deleted, {} failed",
            module.name,
            summary.inserts.confirmed,
            summary.inserts.merged,
            summary.updates.confirmed,
            summary.deletes.confirmed,
            summary.failed()
        );
        Ok(summary)
    }

    /// Drain `local_insert` or `local_update` of a module.
    pub async fn push(
        &self,
        module: &MirrorModule,
        direction: PushDirection,
    ) -> Result<PushReport, SyncError> {
        let mut report = PushReport::default();
        loop {
            let pushed = match direction {
                PushDirection::Insert => self.push_insert_batch(module, &mut report).await?,
                PushDirection::Update => self.push_update_batch(module, &mut report).await?,
            };
            if pushed == 0 {
                break;
            }
        }
        Ok(report)
    }

    /// Returns the number of pending rows handled.
    async fn push_insert_batch(
        &self,
        module: &MirrorModule,
        report: &mut PushReport,
    ) -> Result<usize, SyncError> {
        let table = module.table_name();
        let rows = self
            .store
            .pending_inserts(&module.table, self.config.batch_size)
            .await
            .map_err(SyncError::store(table))?;
        if rows.is_empty() {
            return Ok(0);
        }
        let handled = rows.len();

        let mut outgoing = Vec::with_capacity(rows.len());
        let mut sent = Vec::with_capacity(rows.len());
        let mut rejected = Vec::new();
        for row in &rows {
            match self.insert_payload(module, row) {
                Ok(fields) => {
                    outgoing.push(OutgoingRecord { id: None, fields });
                    sent.push(row.uid);
                }
                Err(message) => rejected.push((row.uid, message)),
            }
        }

        debug!("Sending {} new {} records", outgoing.len(), module.name);
        let results = self.save(module, outgoing).await?;

        let mut tx = self.store.begin().await.map_err(SyncError::store(table))?;
        let result = self
            .reconcile_inserts(&mut *tx, table, &sent, results, rejected, report)
            .await;
        finish(tx, table, result).await?;
        Ok(handled)
    }

    async fn reconcile_inserts(
        &self,
        tx: &mut (dyn MirrorTransaction + '_),
        table: &str,
        sent: &[i64],
        results: Vec<SaveResult>,
        rejected: Vec<(i64, String)>,
        report: &mut PushReport,
    ) -> Result<(), SyncError> {
        for (uid, message) in rejected {
            warn!("Cannot push {table} uid {uid}: {message}");
            tx.poison(ShadowKind::Insert, table, uid, &[], &message)
                .await
                .map_err(SyncError::store(table))?;
            report.failed.push(RecordPushError { uid, message });
        }

        for (&uid, result) in sent.iter().zip(results) {
            match result {
                SaveResult::Success { id } => {
                    let holder = tx
                        .uid_for_id(table, &id)
                        .await
                        .map_err(SyncError::store(table))?;
                    match holder {
                        Some(existing) if existing != uid => {
                            warn!(
                                "Remote merged {table} uid {uid} into record {id} already held by uid {existing}; dropping the local duplicate"
                            );
                            tx.delete_row(table, uid)
                                .await
                                .map_err(SyncError::store(table))?;
                            report.merged += 1;
                        }
                        _ => {
                            tx.set_natural_id(table, uid, &id)
                                .await
                                .map_err(SyncError::store(table))?;
                            report.confirmed += 1;
                        }
                    }
                    tx.remove_shadow(ShadowKind::Insert, table, uid)
                        .await
                        .map_err(SyncError::store(table))?;
                }
                SaveResult::Failure { message } => {
                    warn!("Remote rejected new {table} uid {uid}: {message}");
                    tx.poison(ShadowKind::Insert, table, uid, &[], &message)
                        .await
                        .map_err(SyncError::store(table))?;
                    report.failed.push(RecordPushError { uid, message });
                }
            }
        }
        Ok(())
    }

    /// Returns the number of pending rows handled.
    async fn push_update_batch(
        &self,
        module: &MirrorModule,
        report: &mut PushReport,
    ) -> Result<usize, SyncError> {
        let table = module.table_name();
        let pending = self
            .store
            .pending_updates(&module.table, self.config.batch_size)
            .await
            .map_err(SyncError::store(table))?;
        if pending.is_empty() {
            return Ok(0);
        }
        let handled = pending.len();

        let mut outgoing = Vec::new();
        let mut sent = Vec::new();
        let mut unsendable = Vec::new();
        let mut rejected = Vec::new();
        for update in pending {
            let PendingUpdate { row, fields } = update;
            match (row.id.clone(), self.update_payload(module, &row, &fields)) {
                (Some(id), Ok(payload)) if !payload.is_empty() => {
                    outgoing.push(OutgoingRecord {
                        id: Some(id),
                        fields: payload,
                    });
                    sent.push(Sent::new(&row, fields));
                }
                // Nothing writable changed, or the row was never pushed and
                // its insert carries the current values.
                (_, Ok(_)) => unsendable.push(Sent::new(&row, fields)),
                (_, Err(message)) => rejected.push((Sent::new(&row, fields), message)),
            }
        }

        debug!("Sending {} updated {} records", outgoing.len(), module.name);
        let results = self.save(module, outgoing).await?;

        let mut tx = self.store.begin().await.map_err(SyncError::store(table))?;
        let result = self
            .reconcile_updates(&mut *tx, module, &sent, results, unsendable, rejected, report)
            .await;
        finish(tx, table, result).await?;
        Ok(handled)
    }

    #[allow(clippy::too_many_arguments)]
    async fn reconcile_updates(
        &self,
        tx: &mut (dyn MirrorTransaction + '_),
        module: &MirrorModule,
        sent: &[Sent],
        results: Vec<SaveResult>,
        unsendable: Vec<Sent>,
        rejected: Vec<(Sent, String)>,
        report: &mut PushReport,
    ) -> Result<(), SyncError> {
        let table = module.table_name();
        for record in unsendable {
            tx.remove_update_fields(table, record.uid, &record.fields)
                .await
                .map_err(SyncError::store(table))?;
        }

        for (record, message) in rejected {
            warn!("Cannot push update of {table} uid {}: {message}", record.uid);
            tx.poison(ShadowKind::Update, table, record.uid, &record.fields, &message)
                .await
                .map_err(SyncError::store(table))?;
            report.failed.push(RecordPushError {
                uid: record.uid,
                message,
            });
        }

        for (record, result) in sent.iter().zip(results) {
            match result {
                SaveResult::Success { .. } => {
                    let settled = self.settled_fields(tx, module, record).await?;
                    tx.remove_update_fields(table, record.uid, &settled)
                        .await
                        .map_err(SyncError::store(table))?;
                    report.confirmed += 1;
                }
                SaveResult::Failure { message } => {
                    warn!("Remote rejected update of {table} uid {}: {message}", record.uid);
                    tx.poison(ShadowKind::Update, table, record.uid, &record.fields, &message)
                        .await
                        .map_err(SyncError::store(table))?;
                    report.failed.push(RecordPushError {
                        uid: record.uid,
                        message,
                    });
                }
            }
        }
        Ok(())
    }

    /// Fields of a pushed record that still hold the value that was sent.
    ///
    /// A field edited again while the batch was in flight keeps its
    /// `local_update` row and goes out with a later batch.
    async fn settled_fields(
        &self,
        tx: &mut (dyn MirrorTransaction + '_),
        module: &MirrorModule,
        record: &Sent,
    ) -> Result<Vec<String>, SyncError> {
        let table = module.table_name();
        let Some(current) = tx
            .find_by_uid(&module.table, record.uid)
            .await
            .map_err(SyncError::store(table))?
        else {
            // Deleted meanwhile; the delete already dropped its update rows.
            return Ok(record.fields.clone());
        };

        let mut settled = Vec::with_capacity(record.values.len());
        for (name, value) in &record.values {
            if current.get(name) == value {
                settled.push(name.clone());
            } else {
                debug!(
                    "Field {name} of {table} uid {} changed during push; keeping it queued",
                    record.uid
                );
            }
        }
        Ok(settled)
    }

    /// Send locally deleted rows, one call per record.
    ///
    /// A failed delete is logged and left queued for the next run.
    pub async fn push_deleted_rows(&self, module: &MirrorModule) -> Result<PushReport, SyncError> {
        let table = module.table_name();
        let pending = self
            .store
            .pending_deletes(table)
            .await
            .map_err(SyncError::store(table))?;

        let mut report = PushReport::default();
        for delete in pending {
            if let Err(e) = self.remote.delete_record(&module.name, &delete.id).await {
                warn!("Failed to delete {} record {}: {e:#}", module.name, delete.id);
                report.failed.push(RecordPushError {
                    uid: delete.uid,
                    message: format!("{e:#}"),
                });
                continue;
            }

            let mut tx = self.store.begin().await.map_err(SyncError::store(table))?;
            let result = tx
                .remove_shadow(ShadowKind::Delete, table, delete.uid)
                .await
                .map_err(SyncError::store(table));
            finish(tx, table, result).await?;
            report.confirmed += 1;
        }
        Ok(report)
    }

    async fn save(
        &self,
        module: &MirrorModule,
        records: Vec<OutgoingRecord>,
    ) -> Result<Vec<SaveResult>, SyncError> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let expected = records.len();
        let push_error = |source| SyncError::RemotePush {
            module: module.name.clone(),
            source,
        };

        let results = self
            .remote
            .save_records(&module.name, records)
            .await
            .map_err(push_error)?;
        if results.len() != expected {
            return Err(push_error(anyhow::anyhow!(
                "expected {expected} save results, got {}",
                results.len()
            )));
        }
        Ok(results)
    }

    /// Remote fields of a new record.
    ///
    /// Null columns, read-only columns, system timestamps and lookup display
    /// names are left out.
    fn insert_payload(
        &self,
        module: &MirrorModule,
        row: &MirrorRow,
    ) -> Result<Map<String, Value>, String> {
        let mut fields = Map::new();
        for binding in module.bindings.iter() {
            let Some(setter) = binding.setter.as_deref() else {
                continue;
            };
            if self.config.is_system_column(&binding.name)
                || module.bindings.is_derived_name_field(&binding.name)
            {
                continue;
            }
            let value = row.get(&binding.name);
            if value.is_null() {
                continue;
            }
            let json = universal_to_json(value, binding.remote_type)
                .map_err(|e| format!("{}: {e}", binding.name))?;
            fields.insert(setter.to_string(), json);
        }
        Ok(fields)
    }

    /// Remote fields of an update: only the changed, writable ones.
    ///
    /// System timestamps are never sent, as for inserts.
    fn update_payload(
        &self,
        module: &MirrorModule,
        row: &MirrorRow,
        changed: &[String],
    ) -> Result<Map<String, Value>, String> {
        let mut fields = Map::new();
        for name in changed {
            if self.config.is_system_column(name) {
                continue;
            }
            let Some(binding) = module.bindings.get(name) else {
                continue;
            };
            let Some(setter) = binding.setter.as_deref() else {
                continue;
            };
            let json = universal_to_json(row.get(name), binding.remote_type)
                .map_err(|e| format!("{name}: {e}"))?;
            fields.insert(setter.to_string(), json);
        }
        Ok(fields)
    }
}
