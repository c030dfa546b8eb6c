//! Single-run guard on a MySQL advisory lock.

use anyhow::{Context, Result};
use mysql_async::{prelude::*, Conn, Pool};
use tracing::{debug, warn};

/// Default name of the advisory lock.
pub const DEFAULT_LOCK_NAME: &str = "crm_sync_run";

/// An acquired `GET_LOCK`.
///
/// The lock belongs to the session holding it, so the connection is kept
/// until [`RunLock::release`]. If the process dies the server frees it.
pub struct RunLock {
    conn: Conn,
    name: String,
}

impl RunLock {
    /// Try to take the lock without waiting.
    ///
    /// Returns `None` when another session holds it.
    pub async fn try_acquire(pool: &Pool, name: &str) -> Result<Option<Self>> {
        let mut conn = pool
            .get_conn()
            .await
            .context("Failed to get MySQL connection for run lock")?;
        let acquired: Option<Option<i64>> = conn
            .exec_first("SELECT GET_LOCK(?, 0)", (name,))
            .await?;

        if acquired.flatten() == Some(1) {
            debug!("Acquired run lock {name}");
            Ok(Some(Self {
                conn,
                name: name.to_string(),
            }))
        } else {
            Ok(None)
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn release(mut self) -> Result<()> {
        let released: Option<Option<i64>> = self
            .conn
            .exec_first("SELECT RELEASE_LOCK(?)", (self.name.as_str(),))
            .await?;
        if released.flatten() != Some(1) {
            warn!("Run lock {} was not held at release", self.name);
        }
        Ok(())
    }
}
