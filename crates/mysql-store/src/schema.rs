//! Live mirror table definitions from INFORMATION_SCHEMA.

use anyhow::{anyhow, Result};
use mysql_async::{prelude::*, Row};
use mysql_types::mysql_column_to_universal_type;
use sync_core::{is_key_column, ColumnDefinition, IndexDefinition, TableDefinition};

/// Read the definition of a table in the current database.
///
/// Returns `None` when the table does not exist. Key columns and the primary
/// key are left out, matching [`TableDefinition::from_bindings`].
pub async fn describe_table(
    conn: &mut mysql_async::Conn,
    table_name: &str,
) -> Result<Option<TableDefinition>> {
    let column_rows: Vec<Row> = conn
        .exec(
            "SELECT COLUMN_NAME, DATA_TYPE, COLUMN_TYPE, NUMERIC_PRECISION, NUMERIC_SCALE, IS_NULLABLE
             FROM INFORMATION_SCHEMA.COLUMNS
             WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?
             ORDER BY ORDINAL_POSITION",
            (table_name,),
        )
        .await?;

    if column_rows.is_empty() {
        return Ok(None);
    }

    let mut columns = Vec::new();
    for row in column_rows {
        let name: String = row.get(0).ok_or_else(|| anyhow!("Missing column name"))?;
        if is_key_column(&name) {
            continue;
        }
        let data_type: String = row.get(1).ok_or_else(|| anyhow!("Missing data type"))?;
        let column_type: String = row.get(2).ok_or_else(|| anyhow!("Missing column type"))?;
        let precision: Option<u32> = row.get::<Option<u32>, _>(3).flatten();
        let scale: Option<u32> = row.get::<Option<u32>, _>(4).flatten();
        let nullable: String = row.get(5).unwrap_or_default();

        columns.push(ColumnDefinition {
            name,
            column_type: mysql_column_to_universal_type(&data_type, &column_type, precision, scale),
            nullable: nullable == "YES",
        });
    }

    let index_rows: Vec<Row> = conn
        .exec(
            "SELECT INDEX_NAME, COLUMN_NAME, NON_UNIQUE
             FROM INFORMATION_SCHEMA.STATISTICS
             WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? AND INDEX_NAME <> 'PRIMARY'
             ORDER BY INDEX_NAME, SEQ_IN_INDEX",
            (table_name,),
        )
        .await?;

    let mut indexes: Vec<IndexDefinition> = Vec::new();
    for row in index_rows {
        let name: String = row.get(0).ok_or_else(|| anyhow!("Missing index name"))?;
        // Mirror indexes cover one column; keep the first of composite ones.
        if indexes.iter().any(|i| i.name == name) {
            continue;
        }
        let column: String = row.get(1).ok_or_else(|| anyhow!("Missing index column"))?;
        let non_unique: i64 = row.get(2).unwrap_or(1);
        indexes.push(IndexDefinition {
            name,
            column,
            unique: non_unique == 0,
        });
    }

    Ok(Some(TableDefinition {
        name: table_name.to_string(),
        columns,
        indexes,
    }))
}
