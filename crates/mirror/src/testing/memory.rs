//! In-memory mirror database.

use anyhow::{bail, Result};
use async_trait::async_trait;
use checkpoint::{CheckpointID, CheckpointStore, StoredCheckpoint};
use chrono::{NaiveDateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use sync_core::{FieldValues, MirrorRow, TableDefinition, TableDiff};
use tokio::sync::{Mutex, MutexGuard};

use crate::store::{
    MirrorStore, MirrorTransaction, PendingDelete, PendingUpdate, PoisonedEntry, ShadowKind,
};

#[derive(Debug, Clone, Default)]
struct Poison {
    error: Option<String>,
    error_time: Option<NaiveDateTime>,
}

impl Poison {
    fn set(&mut self, message: &str) {
        self.error = Some(message.to_string());
        self.error_time = Some(Utc::now().naive_utc());
    }

    fn clear(&mut self) -> bool {
        let was_set = self.error.is_some();
        self.error = None;
        self.error_time = None;
        was_set
    }

    fn entry(&self) -> Option<(String, NaiveDateTime)> {
        Some((self.error.clone()?, self.error_time?))
    }
}

#[derive(Debug, Clone)]
struct MemoryTable {
    def: TableDefinition,
    rows: BTreeMap<i64, MirrorRow>,
    /// Modification column guarding the update capture; `None` until
    /// triggers are installed
    capture: Option<String>,
}

impl MemoryTable {
    fn holder_of(&self, id: &str) -> Option<i64> {
        self.rows
            .values()
            .find(|row| row.id.as_deref() == Some(id))
            .map(|row| row.uid)
    }

    fn check_columns(&self, values: &FieldValues) -> Result<()> {
        for column in values.keys() {
            if !self.def.has_column(column) {
                bail!("Unknown column '{column}' in '{}'", self.def.name);
            }
        }
        Ok(())
    }
}

type UpdateKey = (String, i64, String);

#[derive(Debug, Clone, Default)]
struct MemoryState {
    tables: HashMap<String, MemoryTable>,
    last_uid: i64,
    tracking_tables: bool,
    inserts: BTreeMap<(String, i64), Poison>,
    updates: BTreeMap<UpdateKey, Poison>,
    deletes: BTreeMap<(String, i64), (String, Poison)>,
    checkpoints: HashMap<CheckpointID, StoredCheckpoint>,
    ddl: Vec<String>,
}

fn table_ref<'s>(tables: &'s HashMap<String, MemoryTable>, name: &str) -> Result<&'s MemoryTable> {
    match tables.get(name) {
        Some(table) => Ok(table),
        None => bail!("Table '{name}' doesn't exist"),
    }
}

fn table_mut<'s>(
    tables: &'s mut HashMap<String, MemoryTable>,
    name: &str,
) -> Result<&'s mut MemoryTable> {
    match tables.get_mut(name) {
        Some(table) => Ok(table),
        None => bail!("Table '{name}' doesn't exist"),
    }
}

impl MemoryState {
    fn insert(&mut self, table: &str, id: Option<&str>, values: &FieldValues) -> Result<i64> {
        let t = table_mut(&mut self.tables, table)?;
        t.check_columns(values)?;
        if let Some(id) = id {
            if t.holder_of(id).is_some() {
                bail!("Duplicate entry '{id}' for key '{table}.uniq_id'");
            }
        }

        self.last_uid += 1;
        let uid = self.last_uid;
        t.rows.insert(
            uid,
            MirrorRow {
                uid,
                id: id.map(str::to_string),
                values: values.clone(),
            },
        );

        if t.capture.is_some() && id.is_none() {
            self.inserts.insert((table.to_string(), uid), Poison::default());
            self.deletes.remove(&(table.to_string(), uid));
            self.updates.retain(|(t, u, _), _| !(t == table && *u == uid));
        }
        Ok(uid)
    }

    fn update(&mut self, table: &str, uid: i64, values: &FieldValues) -> Result<()> {
        let t = table_mut(&mut self.tables, table)?;
        t.check_columns(values)?;
        let Some(row) = t.rows.get_mut(&uid) else {
            return Ok(());
        };

        let old = row.clone();
        for (column, value) in values {
            row.values.insert(column.clone(), value.clone());
        }

        if let Some(modified) = &t.capture {
            if old.get(modified) == row.get(modified) {
                for column in t.def.column_names() {
                    if old.get(column) != row.get(column) {
                        self.updates.insert(
                            (table.to_string(), uid, column.to_string()),
                            Poison::default(),
                        );
                    }
                }
            }
        }
        Ok(())
    }

    fn set_id(&mut self, table: &str, uid: i64, id: &str) -> Result<()> {
        let t = table_mut(&mut self.tables, table)?;
        if t.holder_of(id).is_some_and(|holder| holder != uid) {
            bail!("Duplicate entry '{id}' for key '{table}.uniq_id'");
        }
        if let Some(row) = t.rows.get_mut(&uid) {
            row.id = Some(id.to_string());
        }
        Ok(())
    }

    fn delete(&mut self, table: &str, uid: i64) -> Result<()> {
        let t = table_mut(&mut self.tables, table)?;
        let Some(row) = t.rows.remove(&uid) else {
            return Ok(());
        };

        if t.capture.is_some() {
            if let Some(id) = row.id {
                self.deletes
                    .insert((table.to_string(), uid), (id, Poison::default()));
            }
            self.remove_shadow(ShadowKind::Insert, table, uid);
            self.remove_shadow(ShadowKind::Update, table, uid);
        }
        Ok(())
    }

    fn remove_shadow(&mut self, kind: ShadowKind, table: &str, uid: i64) {
        let key = (table.to_string(), uid);
        match kind {
            ShadowKind::Insert => {
                self.inserts.remove(&key);
            }
            ShadowKind::Update => self.updates.retain(|(t, u, _), _| !(t == table && *u == uid)),
            ShadowKind::Delete => {
                self.deletes.remove(&key);
            }
        }
    }

    fn update_fields(&self, table: &str, uid: i64) -> impl Iterator<Item = (&str, &Poison)> {
        let table = table.to_string();
        self.updates
            .iter()
            .filter(move |((t, u, _), _)| *t == table && *u == uid)
            .map(|((_, _, field), poison)| (field.as_str(), poison))
    }
}

/// In-memory [`MirrorStore`] and [`CheckpointStore`].
///
/// Application writes go through [`MemoryStore::local_insert`],
/// [`MemoryStore::local_update`] and [`MemoryStore::local_delete`] and are
/// captured exactly like the MySQL triggers would capture them.
///
/// A transaction holds the store lock until it is committed or dropped, so
/// store methods must not be awaited while a transaction is open.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Application writes
    // ------------------------------------------------------------------

    /// Insert a row the way the local application does: without an `id`.
    pub async fn local_insert(&self, table: &str, values: FieldValues) -> Result<i64> {
        self.state.lock().await.insert(table, None, &values)
    }

    pub async fn local_update(&self, table: &str, uid: i64, values: FieldValues) -> Result<()> {
        self.state.lock().await.update(table, uid, &values)
    }

    pub async fn local_delete(&self, table: &str, uid: i64) -> Result<()> {
        self.state.lock().await.delete(table, uid)
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    pub async fn rows(&self, table: &str) -> Vec<MirrorRow> {
        let state = self.state.lock().await;
        state
            .tables
            .get(table)
            .map(|t| t.rows.values().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn row(&self, table: &str, uid: i64) -> Option<MirrorRow> {
        let state = self.state.lock().await;
        state.tables.get(table)?.rows.get(&uid).cloned()
    }

    pub async fn row_by_id(&self, table: &str, id: &str) -> Option<MirrorRow> {
        let state = self.state.lock().await;
        let t = state.tables.get(table)?;
        t.rows.get(&t.holder_of(id)?).cloned()
    }

    /// Uids with a `local_insert` entry, poisoned or not.
    pub async fn pending_insert_uids(&self, table: &str) -> Vec<i64> {
        let state = self.state.lock().await;
        state
            .inserts
            .keys()
            .filter(|(t, _)| t == table)
            .map(|(_, uid)| *uid)
            .collect()
    }

    /// Fields of a uid with a `local_update` entry, poisoned or not.
    pub async fn pending_update_fields_of(&self, table: &str, uid: i64) -> Vec<String> {
        let state = self.state.lock().await;
        state
            .update_fields(table, uid)
            .map(|(field, _)| field.to_string())
            .collect()
    }

    /// Ids with a `local_delete` entry, poisoned or not.
    pub async fn pending_delete_ids(&self, table: &str) -> Vec<String> {
        let state = self.state.lock().await;
        state
            .deletes
            .iter()
            .filter(|((t, _), _)| t == table)
            .map(|(_, (id, _))| id.clone())
            .collect()
    }

    /// Error recorded on a uid's shadow rows of `kind`.
    pub async fn shadow_error(&self, kind: ShadowKind, table: &str, uid: i64) -> Option<String> {
        let state = self.state.lock().await;
        let key = (table.to_string(), uid);
        match kind {
            ShadowKind::Insert => state.inserts.get(&key)?.error.clone(),
            ShadowKind::Update => state
                .update_fields(table, uid)
                .find_map(|(_, poison)| poison.error.clone()),
            ShadowKind::Delete => state.deletes.get(&key)?.1.error.clone(),
        }
    }

    /// DDL issued so far, one entry per statement.
    pub async fn ddl_statements(&self) -> Vec<String> {
        self.state.lock().await.ddl.clone()
    }
}

#[async_trait]
impl MirrorStore for MemoryStore {
    async fn describe_table(&self, table: &str) -> Result<Option<TableDefinition>> {
        let state = self.state.lock().await;
        Ok(state.tables.get(table).map(|t| t.def.clone()))
    }

    async fn create_table(&self, table: &TableDefinition) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.tables.contains_key(&table.name) {
            bail!("Table '{}' already exists", table.name);
        }
        state.tables.insert(
            table.name.clone(),
            MemoryTable {
                def: table.clone(),
                rows: BTreeMap::new(),
                capture: None,
            },
        );
        state.ddl.push(format!("CREATE TABLE {}", table.name));
        Ok(())
    }

    async fn alter_table(&self, diff: &TableDiff) -> Result<()> {
        let mut state = self.state.lock().await;
        let t = table_mut(&mut state.tables, &diff.table)?;
        diff.apply_to(&mut t.def);
        for row in t.rows.values_mut() {
            row.values
                .retain(|column, _| !diff.removed_columns.contains(column));
        }
        state.ddl.push(format!("ALTER TABLE {}", diff.table));
        Ok(())
    }

    async fn create_tracking_tables(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.tracking_tables {
            state.tracking_tables = true;
            state.ddl.push("CREATE TRACKING TABLES".to_string());
        }
        Ok(())
    }

    async fn install_triggers(&self, table: &TableDefinition, modified_column: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.tracking_tables {
            bail!("Table 'local_insert' doesn't exist");
        }
        let t = table_mut(&mut state.tables, &table.name)?;
        t.capture = Some(modified_column.to_string());
        state.ddl.push(format!("CREATE TRIGGERS {}", table.name));
        Ok(())
    }

    async fn max_timestamp(&self, table: &str, column: &str) -> Result<Option<NaiveDateTime>> {
        let state = self.state.lock().await;
        let t = table_ref(&state.tables, table)?;
        Ok(t.rows.values().filter_map(|r| r.get(column).as_datetime()).max())
    }

    async fn pending_inserts(&self, table: &TableDefinition, limit: usize) -> Result<Vec<MirrorRow>> {
        let state = self.state.lock().await;
        let t = table_ref(&state.tables, &table.name)?;
        Ok(state
            .inserts
            .iter()
            .filter(|((name, _), poison)| *name == table.name && poison.error.is_none())
            .filter_map(|((_, uid), _)| t.rows.get(uid).cloned())
            .take(limit)
            .collect())
    }

    async fn pending_updates(
        &self,
        table: &TableDefinition,
        limit: usize,
    ) -> Result<Vec<PendingUpdate>> {
        let state = self.state.lock().await;
        let t = table_ref(&state.tables, &table.name)?;

        let mut pending: BTreeMap<i64, Vec<String>> = BTreeMap::new();
        for ((name, uid, field), poison) in &state.updates {
            if *name == table.name && poison.error.is_none() {
                pending.entry(*uid).or_default().push(field.clone());
            }
        }

        Ok(pending
            .into_iter()
            .filter_map(|(uid, fields)| {
                let row = t.rows.get(&uid).filter(|row| row.is_synced())?;
                Some(PendingUpdate {
                    row: row.clone(),
                    fields,
                })
            })
            .take(limit)
            .collect())
    }

    async fn pending_deletes(&self, table: &str) -> Result<Vec<PendingDelete>> {
        let state = self.state.lock().await;
        Ok(state
            .deletes
            .iter()
            .filter(|((name, _), (_, poison))| name == table && poison.error.is_none())
            .map(|((_, uid), (id, _))| PendingDelete {
                uid: *uid,
                id: id.clone(),
            })
            .collect())
    }

    async fn poisoned_entries(&self) -> Result<Vec<PoisonedEntry>> {
        let state = self.state.lock().await;
        let mut entries = Vec::new();

        for ((table, uid), poison) in &state.inserts {
            if let Some((error, error_time)) = poison.entry() {
                entries.push(PoisonedEntry {
                    kind: ShadowKind::Insert,
                    table_name: table.clone(),
                    uid: *uid,
                    field_name: None,
                    id: None,
                    error,
                    error_time,
                });
            }
        }
        for ((table, uid, field), poison) in &state.updates {
            if let Some((error, error_time)) = poison.entry() {
                entries.push(PoisonedEntry {
                    kind: ShadowKind::Update,
                    table_name: table.clone(),
                    uid: *uid,
                    field_name: Some(field.clone()),
                    id: None,
                    error,
                    error_time,
                });
            }
        }
        for ((table, uid), (id, poison)) in &state.deletes {
            if let Some((error, error_time)) = poison.entry() {
                entries.push(PoisonedEntry {
                    kind: ShadowKind::Delete,
                    table_name: table.clone(),
                    uid: *uid,
                    field_name: None,
                    id: Some(id.clone()),
                    error,
                    error_time,
                });
            }
        }
        Ok(entries)
    }

    async fn clear_poison(&self, table: Option<&str>) -> Result<u64> {
        let mut state = self.state.lock().await;
        let matches = |name: &str| table.map_or(true, |t| t == name);
        let mut cleared = 0;

        for ((name, _), poison) in state.inserts.iter_mut() {
            if matches(name) && poison.clear() {
                cleared += 1;
            }
        }
        for ((name, _, _), poison) in state.updates.iter_mut() {
            if matches(name) && poison.clear() {
                cleared += 1;
            }
        }
        for ((name, _), (_, poison)) in state.deletes.iter_mut() {
            if matches(name) && poison.clear() {
                cleared += 1;
            }
        }
        Ok(cleared)
    }

    async fn begin<'a>(&'a self) -> Result<Box<dyn MirrorTransaction + 'a>> {
        let guard = self.state.lock().await;
        let backup = guard.clone();
        Ok(Box::new(MemoryTransaction {
            guard,
            backup: Some(backup),
        }))
    }
}

#[async_trait]
impl CheckpointStore for MemoryStore {
    async fn store_checkpoint(
        &self,
        id: &CheckpointID,
        checkpoint_type: &str,
        checkpoint_data: String,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        state.checkpoints.insert(
            id.clone(),
            StoredCheckpoint {
                checkpoint_data,
                checkpoint_type: checkpoint_type.to_string(),
                updated_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn read_checkpoint(&self, id: &CheckpointID) -> Result<Option<StoredCheckpoint>> {
        Ok(self.state.lock().await.checkpoints.get(id).cloned())
    }
}

/// Holds the store lock; restores the snapshot unless committed.
struct MemoryTransaction<'a> {
    guard: MutexGuard<'a, MemoryState>,
    backup: Option<MemoryState>,
}

impl<'a> Drop for MemoryTransaction<'a> {
    fn drop(&mut self) {
        if let Some(backup) = self.backup.take() {
            *self.guard = backup;
        }
    }
}

#[async_trait]
impl<'a> MirrorTransaction for MemoryTransaction<'a> {
    async fn find_by_id(&mut self, table: &TableDefinition, id: &str) -> Result<Option<MirrorRow>> {
        let t = table_ref(&self.guard.tables, &table.name)?;
        Ok(t.holder_of(id).and_then(|uid| t.rows.get(&uid).cloned()))
    }

    async fn find_by_uid(&mut self, table: &TableDefinition, uid: i64) -> Result<Option<MirrorRow>> {
        Ok(table_ref(&self.guard.tables, &table.name)?.rows.get(&uid).cloned())
    }

    async fn uid_for_id(&mut self, table: &str, id: &str) -> Result<Option<i64>> {
        Ok(table_ref(&self.guard.tables, table)?.holder_of(id))
    }

    async fn insert_row(
        &mut self,
        table: &TableDefinition,
        id: Option<&str>,
        values: &FieldValues,
    ) -> Result<i64> {
        self.guard.insert(&table.name, id, values)
    }

    async fn update_row(
        &mut self,
        table: &TableDefinition,
        uid: i64,
        values: &FieldValues,
    ) -> Result<()> {
        self.guard.update(&table.name, uid, values)
    }

    async fn delete_row(&mut self, table: &str, uid: i64) -> Result<()> {
        self.guard.delete(table, uid)
    }

    async fn set_natural_id(&mut self, table: &str, uid: i64, id: &str) -> Result<()> {
        self.guard.set_id(table, uid, id)
    }

    async fn pending_update_fields(&mut self, table: &str, uid: i64) -> Result<BTreeSet<String>> {
        Ok(self
            .guard
            .update_fields(table, uid)
            .map(|(field, _)| field.to_string())
            .collect())
    }

    async fn remove_shadow(&mut self, kind: ShadowKind, table: &str, uid: i64) -> Result<()> {
        self.guard.remove_shadow(kind, table, uid);
        Ok(())
    }

    async fn remove_update_fields(
        &mut self,
        table: &str,
        uid: i64,
        fields: &[String],
    ) -> Result<()> {
        self.guard
            .updates
            .retain(|(t, u, f), _| !(t == table && *u == uid && fields.contains(f)));
        Ok(())
    }

    async fn remove_delete_by_id(&mut self, table: &str, id: &str) -> Result<()> {
        self.guard
            .deletes
            .retain(|(t, _), (deleted_id, _)| !(t == table && deleted_id == id));
        Ok(())
    }

    async fn poison(
        &mut self,
        kind: ShadowKind,
        table: &str,
        uid: i64,
        fields: &[String],
        message: &str,
    ) -> Result<()> {
        let key = (table.to_string(), uid);
        let state = &mut *self.guard;
        match kind {
            ShadowKind::Insert => {
                if let Some(poison) = state.inserts.get_mut(&key) {
                    poison.set(message);
                }
            }
            ShadowKind::Update => {
                for field in fields {
                    if let Some(poison) =
                        state
                            .updates
                            .get_mut(&(table.to_string(), uid, field.clone()))
                    {
                        poison.set(message);
                    }
                }
            }
            ShadowKind::Delete => {
                if let Some((_, poison)) = state.deletes.get_mut(&key) {
                    poison.set(message);
                }
            }
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let mut tx = self;
        tx.backup = None;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        // Drop restores the snapshot.
        Ok(())
    }
}
