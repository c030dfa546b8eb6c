//! Remote CRM service interface.
//!
//! The engines only talk to the remote side through [`RemoteClient`]. The
//! workspace ships an HTTP implementation in `crm-sync-remote-client`; tests
//! use an in-memory fake.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sort direction of a record listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

/// Parameters of one record page request.
#[derive(Debug, Clone, PartialEq)]
pub struct ListQuery {
    /// Remote key to sort by
    pub sort_by: String,
    pub order: SortOrder,
    /// Only records modified at or after this instant
    pub modified_since: Option<DateTime<Utc>>,
    /// 1-based page number
    pub page: u32,
    pub page_size: u32,
}

/// A record as returned by the remote service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRecord {
    pub id: String,
    /// Field values keyed by remote key
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl RemoteRecord {
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.fields.get(key)
    }
}

/// One page of records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordPage {
    pub records: Vec<RemoteRecord>,
    pub more_records: bool,
}

/// One page of deleted record ids.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeletedPage {
    pub ids: Vec<String>,
    pub more_records: bool,
}

/// A record to create or update remotely.
///
/// `id` is `None` for inserts and the remote id for updates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutgoingRecord {
    pub id: Option<String>,
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl OutgoingRecord {
    pub fn is_insert(&self) -> bool {
        self.id.is_none()
    }
}

/// Per-record outcome of a save call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveResult {
    /// The remote side stored the record under `id`.
    Success { id: String },
    /// The remote side rejected the record.
    Failure { message: String },
}

/// Remote CRM service.
///
/// Errors returned from these methods are transport-level: the whole call
/// failed. Per-record rejections of a save are reported as
/// [`SaveResult::Failure`].
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// List one page of records of a module.
    async fn list_records(&self, module: &str, query: &ListQuery) -> Result<RecordPage>;

    /// List one page of ids deleted remotely since `modified_since`.
    async fn list_deleted_ids(
        &self,
        module: &str,
        modified_since: Option<DateTime<Utc>>,
        page: u32,
        page_size: u32,
    ) -> Result<DeletedPage>;

    /// Create or update records.
    ///
    /// Returns exactly one result per input record, in input order.
    async fn save_records(
        &self,
        module: &str,
        records: Vec<OutgoingRecord>,
    ) -> Result<Vec<SaveResult>>;

    /// Delete one record.
    async fn delete_record(&self, module: &str, id: &str) -> Result<()>;
}
