//! Pull progress persisted between runs.

use anyhow::Context;
use checkpoint::{Checkpoint, CheckpointID};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Cursor key of the record listing.
pub const RECORDS_CURSOR: &str = "records";

/// Cursor key of the deleted-id listing.
pub const DELETED_CURSOR: &str = "deleted";

/// Position of a paged listing: the lower modification bound and the next
/// page to fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullCheckpoint {
    pub modified_since: Option<DateTime<Utc>>,
    pub page: u32,
}

impl PullCheckpoint {
    pub fn first_page(modified_since: Option<DateTime<Utc>>) -> Self {
        Self {
            modified_since,
            page: 1,
        }
    }

    pub fn records_id(table: &str) -> CheckpointID {
        CheckpointID::new(RECORDS_CURSOR, table)
    }

    pub fn deleted_id(table: &str) -> CheckpointID {
        CheckpointID::new(DELETED_CURSOR, table)
    }
}

impl Checkpoint for PullCheckpoint {
    const CHECKPOINT_TYPE: &'static str = "crm-pull";

    /// `page@since`, with an empty `since` when there is no lower bound.
    fn to_cli_string(&self) -> String {
        match self.modified_since {
            Some(since) => format!("{}@{}", self.page, since.to_rfc3339()),
            None => format!("{}@", self.page),
        }
    }

    fn from_cli_string(s: &str) -> anyhow::Result<Self> {
        let (page, since) = s
            .split_once('@')
            .ok_or_else(|| anyhow::anyhow!("Invalid pull checkpoint '{s}': expected 'page@since'"))?;
        let page = page
            .parse()
            .with_context(|| format!("Invalid page in pull checkpoint '{s}'"))?;
        let modified_since = if since.is_empty() {
            None
        } else {
            Some(
                DateTime::parse_from_rfc3339(since)
                    .with_context(|| format!("Invalid timestamp in pull checkpoint '{s}'"))?
                    .with_timezone(&Utc),
            )
        };
        Ok(Self {
            modified_since,
            page,
        })
    }
}
