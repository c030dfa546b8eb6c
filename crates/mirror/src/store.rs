//! Local store interface.
//!
//! The engines never issue SQL themselves. Everything they need from the
//! local database goes through [`MirrorStore`] (schema, reads of the shadow
//! tables) and [`MirrorTransaction`] (every write).
//!
//! Implementations must emulate the change-capture rules on writes made
//! outside the engines:
//!
//! - a row inserted with a NULL `id` is recorded in `local_insert`
//! - an update that leaves the modification timestamp unchanged records one
//!   `local_update` row per changed non-key column, clearing any poison
//! - deleting a row removes its `local_insert` / `local_update` rows and, if
//!   the row has an `id`, records it in `local_delete`
//!
//! Pull writes always come with a fresh modification timestamp or an `id`,
//! so they are never captured.

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use std::collections::BTreeSet;
use std::fmt;
use sync_core::{FieldValues, MirrorRow, TableDefinition, TableDiff};

/// Which shadow table a pending change lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShadowKind {
    Insert,
    Update,
    Delete,
}

impl ShadowKind {
    pub fn table_name(self) -> &'static str {
        match self {
            Self::Insert => "local_insert",
            Self::Update => "local_update",
            Self::Delete => "local_delete",
        }
    }
}

impl fmt::Display for ShadowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}

/// A row with locally changed fields awaiting push.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingUpdate {
    pub row: MirrorRow,
    /// Non-poisoned changed fields
    pub fields: Vec<String>,
}

/// A locally deleted row awaiting push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDelete {
    pub uid: i64,
    pub id: String,
}

/// A shadow row excluded from pushes because of a recorded error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoisonedEntry {
    pub kind: ShadowKind,
    pub table_name: String,
    pub uid: i64,
    /// Set for `local_update` rows
    pub field_name: Option<String>,
    /// Set for `local_delete` rows
    pub id: Option<String>,
    pub error: String,
    pub error_time: NaiveDateTime,
}

/// Local mirror database.
#[async_trait]
pub trait MirrorStore: Send + Sync {
    // ------------------------------------------------------------------
    // Schema
    // ------------------------------------------------------------------

    /// Live definition of a table, `None` if it does not exist.
    async fn describe_table(&self, table: &str) -> Result<Option<TableDefinition>>;

    async fn create_table(&self, table: &TableDefinition) -> Result<()>;

    async fn alter_table(&self, diff: &TableDiff) -> Result<()>;

    /// Create the three shadow tables if they do not exist yet.
    async fn create_tracking_tables(&self) -> Result<()>;

    /// (Re)install the insert, update and delete triggers of a table.
    async fn install_triggers(&self, table: &TableDefinition, modified_column: &str)
        -> Result<()>;

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// `MAX(column)` over a table.
    async fn max_timestamp(&self, table: &str, column: &str) -> Result<Option<NaiveDateTime>>;

    /// Rows with a non-poisoned `local_insert` entry, oldest uid first.
    async fn pending_inserts(&self, table: &TableDefinition, limit: usize)
        -> Result<Vec<MirrorRow>>;

    /// Rows with an `id` and at least one non-poisoned `local_update` entry,
    /// up to `limit` distinct uids.
    async fn pending_updates(
        &self,
        table: &TableDefinition,
        limit: usize,
    ) -> Result<Vec<PendingUpdate>>;

    /// Non-poisoned `local_delete` entries of a table.
    async fn pending_deletes(&self, table: &str) -> Result<Vec<PendingDelete>>;

    /// Every poisoned shadow row.
    async fn poisoned_entries(&self) -> Result<Vec<PoisonedEntry>>;

    /// Clear poison on every shadow row, or only on those of `table`.
    ///
    /// Returns the number of rows cleared.
    async fn clear_poison(&self, table: Option<&str>) -> Result<u64>;

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    async fn begin<'a>(&'a self) -> Result<Box<dyn MirrorTransaction + 'a>>;
}

/// A unit of local writes.
///
/// Dropping a transaction without committing rolls it back.
#[async_trait]
pub trait MirrorTransaction: Send {
    async fn find_by_id(&mut self, table: &TableDefinition, id: &str) -> Result<Option<MirrorRow>>;

    /// Read a row by uid, locking it until the transaction ends.
    async fn find_by_uid(&mut self, table: &TableDefinition, uid: i64) -> Result<Option<MirrorRow>>;

    async fn uid_for_id(&mut self, table: &str, id: &str) -> Result<Option<i64>>;

    /// Insert a row and return its uid.
    async fn insert_row(
        &mut self,
        table: &TableDefinition,
        id: Option<&str>,
        values: &FieldValues,
    ) -> Result<i64>;

    /// Overwrite the given columns of a row.
    async fn update_row(&mut self, table: &TableDefinition, uid: i64, values: &FieldValues)
        -> Result<()>;

    async fn delete_row(&mut self, table: &str, uid: i64) -> Result<()>;

    /// Stamp the remote id onto a locally created row.
    async fn set_natural_id(&mut self, table: &str, uid: i64, id: &str) -> Result<()>;

    /// Fields of a row with a `local_update` entry, poisoned or not.
    async fn pending_update_fields(&mut self, table: &str, uid: i64) -> Result<BTreeSet<String>>;

    /// Remove every shadow row of `kind` for a uid.
    async fn remove_shadow(&mut self, kind: ShadowKind, table: &str, uid: i64) -> Result<()>;

    /// Remove the `local_update` rows of the given fields.
    async fn remove_update_fields(&mut self, table: &str, uid: i64, fields: &[String])
        -> Result<()>;

    /// Remove a `local_delete` entry by remote id.
    async fn remove_delete_by_id(&mut self, table: &str, id: &str) -> Result<()>;

    /// Record an error on shadow rows of a uid.
    ///
    /// For [`ShadowKind::Update`] only the rows of `fields` are marked.
    async fn poison(
        &mut self,
        kind: ShadowKind,
        table: &str,
        uid: i64,
        fields: &[String],
        message: &str,
    ) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Commit `tx` if `result` is a success, roll it back otherwise.
pub(crate) async fn finish<T>(
    tx: Box<dyn MirrorTransaction + '_>,
    table: &str,
    result: Result<T, crate::error::SyncError>,
) -> Result<T, crate::error::SyncError> {
    match result {
        Ok(value) => {
            tx.commit()
                .await
                .map_err(crate::error::SyncError::store(table))?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback) = tx.rollback().await {
                tracing::warn!("Rollback on {table} failed: {rollback:#}");
            }
            Err(e)
        }
    }
}
