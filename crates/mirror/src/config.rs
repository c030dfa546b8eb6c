//! Engine configuration.

use chrono::{DateTime, Utc};

/// Default prefix of mirror table names.
pub const DEFAULT_TABLE_PREFIX: &str = "zoho_";

/// Default number of records per remote page.
pub const DEFAULT_PAGE_SIZE: u32 = 200;

/// Default number of records per push batch.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Configuration shared by the schema synchronizer, pull and push engines.
///
/// Passed explicitly to every component.
#[derive(Debug, Clone, PartialEq)]
pub struct MirrorConfig {
    /// Prefix of mirror table names
    pub table_prefix: String,
    /// Records per remote page
    pub page_size: u32,
    /// Distinct uids per push batch
    pub batch_size: usize,
    /// Column holding the remote modification time; guards the update trigger
    pub modified_column: String,
    /// Column holding the remote creation time; checkpoint fallback
    pub created_column: String,
    /// Remote-maintained timestamp columns, never sent on insert
    pub system_columns: Vec<String>,
    /// Capture local edits and push them
    pub two_way: bool,
    /// Keep going with the next module after a module failed
    pub continue_on_error: bool,
    /// Re-install triggers even when the table did not change
    pub force_triggers: bool,
    /// Overrides every pull checkpoint
    pub modified_since: Option<DateTime<Utc>>,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            table_prefix: DEFAULT_TABLE_PREFIX.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
            modified_column: "modifiedTime".to_string(),
            created_column: "createdTime".to_string(),
            system_columns: vec![
                "createdTime".to_string(),
                "modifiedTime".to_string(),
                "lastActivityTime".to_string(),
            ],
            two_way: true,
            continue_on_error: false,
            force_triggers: false,
            modified_since: None,
        }
    }
}

impl MirrorConfig {
    pub fn is_system_column(&self, name: &str) -> bool {
        self.system_columns.iter().any(|c| c == name)
    }
}
