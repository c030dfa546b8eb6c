//! [`MirrorStore`] on a MySQL database.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use crm_sync_mirror::{
    MirrorStore, MirrorTransaction, PendingDelete, PendingUpdate, PoisonedEntry, ShadowKind,
};
use mysql_async::{prelude::*, Pool, Row, Transaction, TxOpts, Value};
use mysql_types::{
    quote_identifier, row_to_field_values, value_to_string, value_to_uid, MySQLDdl, MySQLValue,
    MySQLValueWithSchema, ToDdl,
};
use std::collections::{BTreeMap, BTreeSet};
use sync_core::{
    FieldValues, MirrorRow, TableDefinition, TableDiff, UniversalType, ID_COLUMN, UID_COLUMN,
};
use tracing::debug;

use crate::change_tracking;
use crate::client::SqlLog;
use crate::schema;

// ============================================================================
// Statement helpers
// ============================================================================

async fn exec_rows<Q: Queryable>(
    q: &mut Q,
    log: SqlLog,
    sql: &str,
    params: Vec<Value>,
) -> Result<Vec<Row>> {
    log.log(sql, &params);
    Ok(q.exec(sql, params).await?)
}

async fn exec_drop<Q: Queryable>(q: &mut Q, log: SqlLog, sql: &str, params: Vec<Value>) -> Result<()> {
    log.log(sql, &params);
    q.exec_drop(sql, params).await?;
    Ok(())
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

fn param(value: impl Into<Value>) -> Value {
    value.into()
}

fn into_values(mut row: Row) -> Vec<Value> {
    (0..row.len())
        .map(|i| row.take::<Value, _>(i).unwrap_or(Value::NULL))
        .collect()
}

fn to_datetime(value: Value) -> Result<Option<NaiveDateTime>> {
    Ok(MySQLValueWithSchema::new(value, &UniversalType::LocalDateTime)
        .to_universal_value()?
        .as_datetime())
}

fn required_string(value: Value, what: &str) -> Result<String> {
    value_to_string(value)?.ok_or_else(|| anyhow!("Missing {what}"))
}

/// `t.uid, t.id, t.<column>...` in table column order.
fn select_list(table: &TableDefinition) -> String {
    [UID_COLUMN, ID_COLUMN]
        .into_iter()
        .chain(table.column_names())
        .map(|c| format!("t.{}", quote_identifier(c)))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Read a row selected with [`select_list`].
fn read_row(row: Row, table: &TableDefinition) -> Result<MirrorRow> {
    let mut values = into_values(row);
    if values.len() < 2 {
        bail!("Row of {} is missing its key columns", table.name);
    }
    let columns = values.split_off(2);
    let id = value_to_string(values.pop().unwrap_or(Value::NULL))?;
    let uid = value_to_uid(values.pop().unwrap_or(Value::NULL))?;

    Ok(MirrorRow {
        uid,
        id,
        values: row_to_field_values(columns, &table.columns)
            .with_context(|| format!("Failed to read row {uid} of {}", table.name))?,
    })
}

/// Columns of `values` in table order, with their parameters.
fn assignments<'t>(
    table: &'t TableDefinition,
    values: &FieldValues,
) -> Result<(Vec<&'t str>, Vec<Value>)> {
    if let Some(unknown) = values.keys().find(|c| !table.has_column(c)) {
        bail!("Unknown column '{unknown}' in '{}'", table.name);
    }
    Ok(table
        .column_names()
        .filter_map(|c| values.get(c).map(|v| (c, MySQLValue::from(v).into_inner())))
        .unzip())
}

// ============================================================================
// Store
// ============================================================================

/// Mirror store backed by a MySQL connection pool.
pub struct MySqlStore {
    pool: Pool,
    log: SqlLog,
}

impl MySqlStore {
    pub fn new(pool: Pool) -> Self {
        Self {
            pool,
            log: SqlLog::default(),
        }
    }

    pub fn with_sql_log(mut self, log: SqlLog) -> Self {
        self.log = log;
        self
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    async fn conn(&self) -> Result<mysql_async::Conn> {
        self.pool
            .get_conn()
            .await
            .context("Failed to get MySQL connection")
    }

    async fn poisoned_rows(&self, kind: ShadowKind) -> Result<Vec<PoisonedEntry>> {
        let detail = match kind {
            ShadowKind::Insert => "NULL",
            ShadowKind::Update => "field_name",
            ShadowKind::Delete => "id",
        };
        let sql = format!(
            "SELECT table_name, uid, {detail}, error, error_time FROM {} WHERE error IS NOT NULL ORDER BY table_name, uid",
            kind.table_name()
        );
        let mut conn = self.conn().await?;
        let rows = exec_rows(&mut conn, self.log, &sql, Vec::new()).await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let mut values = into_values(row).into_iter();
            let mut next = || values.next().unwrap_or(Value::NULL);
            let table_name = required_string(next(), "table_name")?;
            let uid = value_to_uid(next())?;
            let detail = value_to_string(next())?;
            let error = required_string(next(), "error")?;
            let error_time = to_datetime(next())?.unwrap_or_default();

            entries.push(PoisonedEntry {
                kind,
                table_name,
                uid,
                field_name: detail.clone().filter(|_| kind == ShadowKind::Update),
                id: detail.filter(|_| kind == ShadowKind::Delete),
                error,
                error_time,
            });
        }
        Ok(entries)
    }
}

#[async_trait]
impl MirrorStore for MySqlStore {
    async fn describe_table(&self, table: &str) -> Result<Option<TableDefinition>> {
        let mut conn = self.conn().await?;
        schema::describe_table(&mut conn, table).await
    }

    async fn create_table(&self, table: &TableDefinition) -> Result<()> {
        let sql = MySQLDdl.to_create_table(table);
        self.log.log(&sql, &[]);
        self.conn().await?.query_drop(&sql).await?;
        Ok(())
    }

    async fn alter_table(&self, diff: &TableDiff) -> Result<()> {
        let Some(sql) = MySQLDdl.to_alter_table(diff) else {
            return Ok(());
        };
        self.log.log(&sql, &[]);
        self.conn().await?.query_drop(&sql).await?;
        Ok(())
    }

    async fn create_tracking_tables(&self) -> Result<()> {
        let mut conn = self.conn().await?;
        change_tracking::create_tracking_tables(&mut conn, self.log).await
    }

    async fn install_triggers(&self, table: &TableDefinition, modified_column: &str) -> Result<()> {
        let mut conn = self.conn().await?;
        change_tracking::install_triggers(&mut conn, table, modified_column, self.log).await
    }

    async fn max_timestamp(&self, table: &str, column: &str) -> Result<Option<NaiveDateTime>> {
        let sql = format!(
            "SELECT MAX({}) FROM {}",
            quote_identifier(column),
            quote_identifier(table)
        );
        let mut conn = self.conn().await?;
        let rows = exec_rows(&mut conn, self.log, &sql, Vec::new()).await?;
        match rows.into_iter().next() {
            Some(row) => to_datetime(into_values(row).into_iter().next().unwrap_or(Value::NULL)),
            None => Ok(None),
        }
    }

    async fn pending_inserts(&self, table: &TableDefinition, limit: usize) -> Result<Vec<MirrorRow>> {
        let sql = format!(
            "SELECT {} FROM {} s JOIN {} t ON t.{uid} = s.uid
             WHERE s.table_name = ? AND s.error IS NULL
             ORDER BY s.uid LIMIT ?",
            select_list(table),
            ShadowKind::Insert.table_name(),
            quote_identifier(&table.name),
            uid = quote_identifier(UID_COLUMN),
        );
        let mut conn = self.conn().await?;
        let rows = exec_rows(
            &mut conn,
            self.log,
            &sql,
            vec![param(table.name.as_str()), param(limit as u64)],
        )
        .await?;
        rows.into_iter().map(|row| read_row(row, table)).collect()
    }

    async fn pending_updates(
        &self,
        table: &TableDefinition,
        limit: usize,
    ) -> Result<Vec<PendingUpdate>> {
        let update_table = ShadowKind::Update.table_name();
        let name = quote_identifier(&table.name);
        let uid = quote_identifier(UID_COLUMN);
        let mut conn = self.conn().await?;

        let sql = format!(
            "SELECT DISTINCT s.uid FROM {update_table} s JOIN {name} t ON t.{uid} = s.uid
             WHERE s.table_name = ? AND s.error IS NULL AND t.{} IS NOT NULL
             ORDER BY s.uid LIMIT ?",
            quote_identifier(ID_COLUMN)
        );
        let uids: Vec<i64> = exec_rows(
            &mut conn,
            self.log,
            &sql,
            vec![param(table.name.as_str()), param(limit as u64)],
        )
        .await?
        .into_iter()
        .map(|row| value_to_uid(into_values(row).into_iter().next().unwrap_or(Value::NULL)))
        .collect::<Result<_, _>>()?;
        if uids.is_empty() {
            return Ok(Vec::new());
        }
        let uid_params: Vec<Value> = uids.iter().map(|&u| param(u)).collect();

        let sql = format!(
            "SELECT uid, field_name FROM {update_table}
             WHERE table_name = ? AND error IS NULL AND uid IN ({})
             ORDER BY uid, field_name",
            placeholders(uids.len())
        );
        let mut params = vec![param(table.name.as_str())];
        params.extend(uid_params.iter().cloned());
        let mut fields: BTreeMap<i64, Vec<String>> = BTreeMap::new();
        for row in exec_rows(&mut conn, self.log, &sql, params).await? {
            let mut values = into_values(row).into_iter();
            let uid = value_to_uid(values.next().unwrap_or(Value::NULL))?;
            let field = required_string(values.next().unwrap_or(Value::NULL), "field_name")?;
            fields.entry(uid).or_default().push(field);
        }

        let sql = format!(
            "SELECT {} FROM {name} t WHERE t.{uid} IN ({}) ORDER BY t.{uid}",
            select_list(table),
            placeholders(uids.len())
        );
        let mut pending = Vec::with_capacity(uids.len());
        for row in exec_rows(&mut conn, self.log, &sql, uid_params).await? {
            let row = read_row(row, table)?;
            if let Some(fields) = fields.remove(&row.uid) {
                pending.push(PendingUpdate { row, fields });
            }
        }
        Ok(pending)
    }

    async fn pending_deletes(&self, table: &str) -> Result<Vec<PendingDelete>> {
        let sql = format!(
            "SELECT uid, id FROM {} WHERE table_name = ? AND error IS NULL ORDER BY uid",
            ShadowKind::Delete.table_name()
        );
        let mut conn = self.conn().await?;
        exec_rows(&mut conn, self.log, &sql, vec![param(table)])
            .await?
            .into_iter()
            .map(|row| -> Result<PendingDelete> {
                let mut values = into_values(row).into_iter();
                Ok(PendingDelete {
                    uid: value_to_uid(values.next().unwrap_or(Value::NULL))?,
                    id: required_string(values.next().unwrap_or(Value::NULL), "id")?,
                })
            })
            .collect()
    }

    async fn poisoned_entries(&self) -> Result<Vec<PoisonedEntry>> {
        let mut entries = Vec::new();
        for kind in [ShadowKind::Insert, ShadowKind::Update, ShadowKind::Delete] {
            entries.extend(self.poisoned_rows(kind).await?);
        }
        Ok(entries)
    }

    async fn clear_poison(&self, table: Option<&str>) -> Result<u64> {
        let mut conn = self.conn().await?;
        let mut cleared = 0;
        for kind in [ShadowKind::Insert, ShadowKind::Update, ShadowKind::Delete] {
            let mut sql = format!(
                "UPDATE {} SET error = NULL, error_time = NULL WHERE error IS NOT NULL",
                kind.table_name()
            );
            let mut params = Vec::new();
            if let Some(table) = table {
                sql.push_str(" AND table_name = ?");
                params.push(param(table));
            }
            exec_drop(&mut conn, self.log, &sql, params).await?;
            cleared += conn.affected_rows();
        }
        Ok(cleared)
    }

    async fn begin<'a>(&'a self) -> Result<Box<dyn MirrorTransaction + 'a>> {
        let tx = self
            .pool
            .start_transaction(TxOpts::default())
            .await
            .context("Failed to start transaction")?;
        Ok(Box::new(MySqlTransaction { tx, log: self.log }))
    }
}

// ============================================================================
// Transaction
// ============================================================================

/// Rolled back by the server if dropped without commit.
struct MySqlTransaction {
    tx: Transaction<'static>,
    log: SqlLog,
}

#[async_trait]
impl MirrorTransaction for MySqlTransaction {
    async fn find_by_id(&mut self, table: &TableDefinition, id: &str) -> Result<Option<MirrorRow>> {
        let sql = format!(
            "SELECT {} FROM {} t WHERE t.{} = ?",
            select_list(table),
            quote_identifier(&table.name),
            quote_identifier(ID_COLUMN)
        );
        let rows = exec_rows(&mut self.tx, self.log, &sql, vec![param(id)]).await?;
        rows.into_iter().next().map(|row| read_row(row, table)).transpose()
    }

    async fn find_by_uid(&mut self, table: &TableDefinition, uid: i64) -> Result<Option<MirrorRow>> {
        let sql = format!(
            "SELECT {} FROM {} t WHERE t.{} = ? FOR UPDATE",
            select_list(table),
            quote_identifier(&table.name),
            quote_identifier(UID_COLUMN)
        );
        let rows = exec_rows(&mut self.tx, self.log, &sql, vec![param(uid)]).await?;
        rows.into_iter().next().map(|row| read_row(row, table)).transpose()
    }

    async fn uid_for_id(&mut self, table: &str, id: &str) -> Result<Option<i64>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = ?",
            quote_identifier(UID_COLUMN),
            quote_identifier(table),
            quote_identifier(ID_COLUMN)
        );
        let rows = exec_rows(&mut self.tx, self.log, &sql, vec![param(id)]).await?;
        match rows.into_iter().next() {
            Some(row) => Ok(Some(value_to_uid(
                into_values(row).into_iter().next().unwrap_or(Value::NULL),
            )?)),
            None => Ok(None),
        }
    }

    async fn insert_row(
        &mut self,
        table: &TableDefinition,
        id: Option<&str>,
        values: &FieldValues,
    ) -> Result<i64> {
        let (mut columns, mut params) = assignments(table, values)?;
        if let Some(id) = id {
            columns.insert(0, ID_COLUMN);
            params.insert(0, param(id));
        }
        let sql = MySQLDdl.to_insert(&table.name, &columns);
        exec_drop(&mut self.tx, self.log, &sql, params).await?;

        let uid = self
            .tx
            .last_insert_id()
            .ok_or_else(|| anyhow!("No uid generated for insert into {}", table.name))?;
        debug!("Inserted {} uid {uid}", table.name);
        Ok(uid as i64)
    }

    async fn update_row(
        &mut self,
        table: &TableDefinition,
        uid: i64,
        values: &FieldValues,
    ) -> Result<()> {
        let (columns, mut params) = assignments(table, values)?;
        if columns.is_empty() {
            return Ok(());
        }
        let sql = MySQLDdl.to_update_by_uid(&table.name, &columns);
        params.push(param(uid));
        exec_drop(&mut self.tx, self.log, &sql, params).await
    }

    async fn delete_row(&mut self, table: &str, uid: i64) -> Result<()> {
        let sql = format!(
            "DELETE FROM {} WHERE {} = ?",
            quote_identifier(table),
            quote_identifier(UID_COLUMN)
        );
        exec_drop(&mut self.tx, self.log, &sql, vec![param(uid)]).await
    }

    async fn set_natural_id(&mut self, table: &str, uid: i64, id: &str) -> Result<()> {
        let sql = format!(
            "UPDATE {} SET {} = ? WHERE {} = ?",
            quote_identifier(table),
            quote_identifier(ID_COLUMN),
            quote_identifier(UID_COLUMN)
        );
        exec_drop(&mut self.tx, self.log, &sql, vec![param(id), param(uid)]).await
    }

    async fn pending_update_fields(&mut self, table: &str, uid: i64) -> Result<BTreeSet<String>> {
        let sql = format!(
            "SELECT field_name FROM {} WHERE table_name = ? AND uid = ?",
            ShadowKind::Update.table_name()
        );
        exec_rows(&mut self.tx, self.log, &sql, vec![param(table), param(uid)])
            .await?
            .into_iter()
            .map(|row| {
                required_string(
                    into_values(row).into_iter().next().unwrap_or(Value::NULL),
                    "field_name",
                )
            })
            .collect()
    }

    async fn remove_shadow(&mut self, kind: ShadowKind, table: &str, uid: i64) -> Result<()> {
        let sql = format!(
            "DELETE FROM {} WHERE table_name = ? AND uid = ?",
            kind.table_name()
        );
        exec_drop(&mut self.tx, self.log, &sql, vec![param(table), param(uid)]).await
    }

    async fn remove_update_fields(
        &mut self,
        table: &str,
        uid: i64,
        fields: &[String],
    ) -> Result<()> {
        if fields.is_empty() {
            return Ok(());
        }
        let sql = format!(
            "DELETE FROM {} WHERE table_name = ? AND uid = ? AND field_name IN ({})",
            ShadowKind::Update.table_name(),
            placeholders(fields.len())
        );
        let mut params = vec![param(table), param(uid)];
        params.extend(fields.iter().map(|f| param(f.as_str())));
        exec_drop(&mut self.tx, self.log, &sql, params).await
    }

    async fn remove_delete_by_id(&mut self, table: &str, id: &str) -> Result<()> {
        let sql = format!(
            "DELETE FROM {} WHERE table_name = ? AND id = ?",
            ShadowKind::Delete.table_name()
        );
        exec_drop(&mut self.tx, self.log, &sql, vec![param(table), param(id)]).await
    }

    async fn poison(
        &mut self,
        kind: ShadowKind,
        table: &str,
        uid: i64,
        fields: &[String],
        message: &str,
    ) -> Result<()> {
        let mut sql = format!(
            "UPDATE {} SET error = ?, error_time = UTC_TIMESTAMP() WHERE table_name = ? AND uid = ?",
            kind.table_name()
        );
        let mut params = vec![param(message), param(table), param(uid)];
        if kind == ShadowKind::Update {
            if fields.is_empty() {
                return Ok(());
            }
            sql.push_str(&format!(" AND field_name IN ({})", placeholders(fields.len())));
            params.extend(fields.iter().map(|f| param(f.as_str())));
        }
        exec_drop(&mut self.tx, self.log, &sql, params).await
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sync_core::{FieldBindings, FieldDescriptor, UniversalValue};

    fn contacts() -> TableDefinition {
        let bindings = FieldBindings::from_descriptors(&[
            FieldDescriptor::new("lastName", "text"),
            FieldDescriptor::new("email", "email"),
        ])
        .unwrap();
        TableDefinition::from_bindings("zoho_contacts", &bindings)
    }

    #[test]
    fn test_select_list_starts_with_keys() {
        assert_eq!(
            select_list(&contacts()),
            "t.`uid`, t.`id`, t.`lastName`, t.`email`"
        );
    }

    #[test]
    fn test_assignments_follow_table_order() {
        let values: FieldValues = [
            ("email".to_string(), UniversalValue::from("a@b.c")),
            ("lastName".to_string(), UniversalValue::Null),
        ]
        .into_iter()
        .collect();
        let descriptor = contacts();
        let (columns, params) = assignments(&descriptor, &values).unwrap();
        assert_eq!(columns, ["lastName", "email"]);
        assert_eq!(params, [Value::NULL, Value::Bytes(b"a@b.c".to_vec())]);
    }

    #[test]
    fn test_assignments_reject_unknown_columns() {
        let values: FieldValues = [("phone".to_string(), UniversalValue::from("1"))]
            .into_iter()
            .collect();
        let err = assignments(&contacts(), &values).unwrap_err();
        assert_eq!(err.to_string(), "Unknown column 'phone' in 'zoho_contacts'");
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(placeholders(3), "?, ?, ?");
    }
}
