//! Trigger-based capture of local mutations.
//!
//! Three shadow tables are shared by every mirror table:
//!
//! - `local_insert(table_name, uid)`: rows created locally, not yet pushed
//! - `local_update(table_name, uid, field_name)`: one row per changed column
//! - `local_delete(table_name, uid, id)`: pushed rows deleted locally
//!
//! Each mirror table gets three triggers that fill them. Writes made by the
//! pull engine always carry a new modification timestamp, and the update
//! trigger only records changes when that timestamp is unchanged, so pulled
//! data is never pushed back.

use anyhow::{Context, Result};
use crm_sync_mirror::ShadowKind;
use mysql_async::prelude::*;
use mysql_types::quote_identifier;
use sync_core::{fit_identifier, TableDefinition, ID_COLUMN, ID_LENGTH, UID_COLUMN};
use tracing::info;

use crate::client::SqlLog;

/// Quote a MySQL string literal.
fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "''"))
}

/// `CREATE TABLE IF NOT EXISTS` statements for the shadow tables.
pub fn tracking_table_ddl() -> Vec<String> {
    let poison = "error TEXT NULL,\n  error_time DATETIME NULL";
    vec![
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n  table_name VARCHAR(64) NOT NULL,\n  uid BIGINT NOT NULL,\n  {poison},\n  PRIMARY KEY (table_name, uid)\n)",
            ShadowKind::Insert.table_name()
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n  table_name VARCHAR(64) NOT NULL,\n  uid BIGINT NOT NULL,\n  field_name VARCHAR(64) NOT NULL,\n  {poison},\n  PRIMARY KEY (table_name, uid, field_name)\n)",
            ShadowKind::Update.table_name()
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n  table_name VARCHAR(64) NOT NULL,\n  uid BIGINT NOT NULL,\n  id VARCHAR({ID_LENGTH}) NOT NULL,\n  {poison},\n  PRIMARY KEY (table_name, uid),\n  UNIQUE KEY uniq_table_id (table_name, id)\n)",
            ShadowKind::Delete.table_name()
        ),
    ]
}

/// Trigger names of a mirror table: insert, update, delete.
///
/// Names of long tables are shortened by [`fit_identifier`].
pub fn trigger_names(table_name: &str) -> [String; 3] {
    ["oninsert", "onupdate", "ondelete"]
        .map(|event| fit_identifier(&format!("trg_{table_name}_{event}")))
}

/// `DELETE FROM <shadow> WHERE ...` for one uid, as a trigger body line.
fn purge(kind: ShadowKind, table: &str, row: &str) -> String {
    format!(
        "DELETE FROM {} WHERE table_name = {table} AND uid = {row}.{};",
        kind.table_name(),
        quote_identifier(UID_COLUMN)
    )
}

/// `CREATE TRIGGER` statements for a mirror table.
///
/// `modified_column` guards the update trigger: only updates leaving it
/// unchanged are recorded.
pub fn trigger_ddl(table: &TableDefinition, modified_column: &str) -> [String; 3] {
    let [on_insert, on_update, on_delete] = trigger_names(&table.name);
    let name = quote_identifier(&table.name);
    let literal = quote_literal(&table.name);
    let uid = quote_identifier(UID_COLUMN);
    let id = quote_identifier(ID_COLUMN);

    let insert = format!(
        "CREATE TRIGGER {} AFTER INSERT ON {name}
FOR EACH ROW
BEGIN
  IF NEW.{id} IS NULL THEN
    REPLACE INTO {} (table_name, uid) VALUES ({literal}, NEW.{uid});
    {}
    {}
  END IF;
END",
        quote_identifier(&on_insert),
        ShadowKind::Insert.table_name(),
        purge(ShadowKind::Delete, &literal, "NEW"),
        purge(ShadowKind::Update, &literal, "NEW"),
    );

    let modified = quote_identifier(modified_column);
    let captures: Vec<String> = table
        .column_names()
        .map(|column| {
            let quoted = quote_identifier(column);
            format!(
                "    IF NOT (NEW.{quoted} <=> OLD.{quoted}) THEN\n      REPLACE INTO {} (table_name, uid, field_name) VALUES ({literal}, NEW.{uid}, {});\n    END IF;",
                ShadowKind::Update.table_name(),
                quote_literal(column)
            )
        })
        .collect();
    let update = format!(
        "CREATE TRIGGER {} AFTER UPDATE ON {name}
FOR EACH ROW
BEGIN
  IF NEW.{modified} <=> OLD.{modified} THEN
{}
  END IF;
END",
        quote_identifier(&on_update),
        captures.join("\n"),
    );

    let delete = format!(
        "CREATE TRIGGER {} BEFORE DELETE ON {name}
FOR EACH ROW
BEGIN
  IF OLD.{id} IS NOT NULL THEN
    REPLACE INTO {} (table_name, uid, id) VALUES ({literal}, OLD.{uid}, OLD.{id});
  END IF;
  {}
  {}
END",
        quote_identifier(&on_delete),
        ShadowKind::Delete.table_name(),
        purge(ShadowKind::Insert, &literal, "OLD"),
        purge(ShadowKind::Update, &literal, "OLD"),
    );

    [insert, update, delete]
}

/// Create the shadow tables if they do not exist.
pub async fn create_tracking_tables(conn: &mut mysql_async::Conn, log: SqlLog) -> Result<()> {
    for ddl in tracking_table_ddl() {
        log.log(&ddl, &[]);
        conn.query_drop(&ddl)
            .await
            .context("Failed to create shadow table")?;
    }
    Ok(())
}

/// Drop and recreate the three triggers of a mirror table.
pub async fn install_triggers(
    conn: &mut mysql_async::Conn,
    table: &TableDefinition,
    modified_column: &str,
    log: SqlLog,
) -> Result<()> {
    for name in trigger_names(&table.name) {
        let drop = format!("DROP TRIGGER IF EXISTS {}", quote_identifier(&name));
        log.log(&drop, &[]);
        conn.query_drop(&drop).await?;
    }

    for ddl in trigger_ddl(table, modified_column) {
        log.log(&ddl, &[]);
        conn.query_drop(&ddl)
            .await
            .with_context(|| format!("Failed to create trigger on {}", table.name))?;
    }

    info!("Installed change-capture triggers on {}", table.name);
    Ok(())
}
