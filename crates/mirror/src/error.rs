//! Errors raised by the sync engines.

use std::error::Error as StdError;
use sync_core::UnsupportedFieldType;

/// A fatal error for one module.
///
/// Per-record push rejections are not errors at this level; they are
/// persisted on the shadow rows and reported as [`RecordPushError`].
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Schema synchronization failed for table '{table}'")]
    Schema {
        table: String,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    UnsupportedFieldType(#[from] UnsupportedFieldType),

    #[error("Table '{table}' has no readable modification timestamp column '{column}'")]
    MissingModifiedColumn { table: String, column: String },

    #[error("Name '{name}' of table '{table}' is longer than {max} characters")]
    IdentifierTooLong {
        table: String,
        name: String,
        max: usize,
    },

    #[error("Failed to fetch records of module '{module}'")]
    RemoteFetch {
        module: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to push records of module '{module}'")]
    RemotePush {
        module: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Local store operation failed on table '{table}'")]
    Store {
        table: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Change listener rejected a record of table '{table}'")]
    Listener {
        table: String,
        #[source]
        source: anyhow::Error,
    },
}

impl SyncError {
    pub(crate) fn store(table: &str) -> impl FnOnce(anyhow::Error) -> Self + '_ {
        move |source| Self::Store {
            table: table.to_string(),
            source,
        }
    }

    pub(crate) fn schema(table: &str) -> impl FnOnce(anyhow::Error) -> Self + '_ {
        move |source| Self::Schema {
            table: table.to_string(),
            source,
        }
    }

    /// The error and all of its causes, joined with `": "`.
    pub fn chain(&self) -> String {
        let mut out = self.to_string();
        let mut source = self.source();
        while let Some(cause) = source {
            out.push_str(": ");
            out.push_str(&cause.to_string());
            source = cause.source();
        }
        out
    }
}

/// A record the remote side rejected, or that could not be converted.
///
/// Persisted as `error` / `error_time` on the record's shadow rows, which
/// excludes them from later batches until the poison is cleared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordPushError {
    pub uid: i64,
    pub message: String,
}
