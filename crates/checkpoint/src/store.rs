//! Checkpoint storage trait and types
//!
//! This module defines the CheckpointStore trait for backend-agnostic
//! checkpoint storage operations, plus shared types.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Checkpoint identifier for storage
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CheckpointID {
    /// Cursor key within the table (e.g. "records", "deleted")
    pub config_key: String,
    /// Mirror table the cursor belongs to
    pub table_name: String,
}

impl CheckpointID {
    pub fn new(config_key: impl Into<String>, table_name: impl Into<String>) -> Self {
        Self {
            config_key: config_key.into(),
            table_name: table_name.into(),
        }
    }
}

impl fmt::Display for CheckpointID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.table_name, self.config_key)
    }
}

/// Checkpoint data stored in backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredCheckpoint {
    /// Serialized checkpoint (JSON)
    pub checkpoint_data: String,
    /// Checkpoint type for validation
    pub checkpoint_type: String,
    /// Timestamp when the checkpoint was last written
    pub updated_at: DateTime<Utc>,
}

/// Trait for checkpoint storage operations.
///
/// Storing under an existing id replaces the previous checkpoint.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Store a checkpoint in the storage backend.
    async fn store_checkpoint(
        &self,
        id: &CheckpointID,
        checkpoint_type: &str,
        checkpoint_data: String,
    ) -> Result<()>;

    /// Read a checkpoint from the storage backend.
    ///
    /// Returns None if the checkpoint doesn't exist.
    async fn read_checkpoint(&self, id: &CheckpointID) -> Result<Option<StoredCheckpoint>>;
}
