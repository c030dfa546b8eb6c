//! Sync engines of crm-sync.
//!
//! This crate keeps local mirror tables and a remote CRM service in step:
//!
//! ```text
//! remote ──list──▶ PullEngine ──▶ mirror table ◀── local application
//!                                     │
//!                          triggers / write-path capture
//!                                     ▼
//! remote ◀─save─── PushEngine ◀── local_insert / local_update / local_delete
//! ```
//!
//! - [`SchemaSynchronizer`] creates and alters mirror tables from module
//!   descriptors and installs the change-capture triggers
//! - [`PullEngine`] applies remote changes since a persisted checkpoint
//! - [`PushEngine`] drains the shadow tables and reconciles remote results
//! - [`SyncRunner`] runs all of the above per module
//!
//! The local database is abstracted by [`MirrorStore`]; the remote service by
//! [`sync_core::RemoteClient`]. [`testing`] provides in-memory versions of
//! both.

pub mod config;
pub mod error;
pub mod listener;
pub mod module;
pub mod progress;
pub mod pull;
pub mod push;
pub mod runner;
pub mod schema_sync;
pub mod store;
pub mod testing;

pub use config::MirrorConfig;
pub use error::{RecordPushError, SyncError};
pub use listener::{ChangeListener, LoggingListener, ModuleContext};
pub use module::MirrorModule;
pub use progress::{PullCheckpoint, DELETED_CURSOR, RECORDS_CURSOR};
pub use pull::{PullCounts, PullEngine, PullMode};
pub use push::{PushDirection, PushEngine, PushReport, PushSummary};
pub use runner::{ModuleOutcome, ModuleReport, Operation, RunReport, SyncRunner};
pub use schema_sync::SchemaSynchronizer;
pub use store::{
    MirrorStore, MirrorTransaction, PendingDelete, PendingUpdate, PoisonedEntry, ShadowKind,
};
