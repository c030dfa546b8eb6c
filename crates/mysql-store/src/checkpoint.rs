//! Pull progress stored in the mirror database.
//!
//! One row per `(config_key, table_name)` in `sync_progress`, replaced on
//! every save.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use checkpoint::{CheckpointID, CheckpointStore, StoredCheckpoint};
use chrono::Utc;
use mysql_async::{prelude::*, Pool, Row};
use tracing::debug;

use crate::client::SqlLog;

pub const SYNC_PROGRESS_TABLE: &str = "sync_progress";

/// [`CheckpointStore`] on the `sync_progress` table.
pub struct MySqlCheckpointStore {
    pool: Pool,
    log: SqlLog,
}

impl MySqlCheckpointStore {
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

    /// Create `sync_progress` if it does not exist.
    pub async fn ensure_table(&self) -> Result<()> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {SYNC_PROGRESS_TABLE} (
  config_key VARCHAR(100) NOT NULL,
  table_name VARCHAR(64) NOT NULL,
  checkpoint_type VARCHAR(50) NOT NULL,
  checkpoint_data TEXT NOT NULL,
  updated_at DATETIME NOT NULL,
  PRIMARY KEY (config_key, table_name)
)"
        );
        self.log.log(&sql, &[]);
        let mut conn = self.pool.get_conn().await?;
        conn.query_drop(&sql)
            .await
            .context("Failed to create sync_progress table")?;
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for MySqlCheckpointStore {
    async fn store_checkpoint(
        &self,
        id: &CheckpointID,
        checkpoint_type: &str,
        checkpoint_data: String,
    ) -> Result<()> {
        let sql = format!(
            "REPLACE INTO {SYNC_PROGRESS_TABLE} (config_key, table_name, checkpoint_type, checkpoint_data, updated_at)
             VALUES (?, ?, ?, ?, UTC_TIMESTAMP())"
        );
        let params = (
            id.config_key.as_str(),
            id.table_name.as_str(),
            checkpoint_type,
            checkpoint_data.as_str(),
        );
        self.log.log(&sql, &[]);
        let mut conn = self.pool.get_conn().await?;
        conn.exec_drop(&sql, params).await?;

        debug!("Stored checkpoint {id}: {checkpoint_data}");
        Ok(())
    }

    async fn read_checkpoint(&self, id: &CheckpointID) -> Result<Option<StoredCheckpoint>> {
        let sql = format!(
            "SELECT checkpoint_type, checkpoint_data, DATE_FORMAT(updated_at, '%Y-%m-%dT%H:%i:%sZ')
             FROM {SYNC_PROGRESS_TABLE} WHERE config_key = ? AND table_name = ?"
        );
        self.log.log(&sql, &[]);
        let mut conn = self.pool.get_conn().await?;
        let row: Option<Row> = conn
            .exec_first(&sql, (id.config_key.as_str(), id.table_name.as_str()))
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let checkpoint_type: String = row.get(0).ok_or_else(|| anyhow!("Missing checkpoint_type"))?;
        let checkpoint_data: String = row.get(1).ok_or_else(|| anyhow!("Missing checkpoint_data"))?;
        let updated_at: String = row.get(2).ok_or_else(|| anyhow!("Missing updated_at"))?;

        Ok(Some(StoredCheckpoint {
            checkpoint_data,
            checkpoint_type,
            updated_at: chrono::DateTime::parse_from_rfc3339(&updated_at)?.with_timezone(&Utc),
        }))
    }
}
