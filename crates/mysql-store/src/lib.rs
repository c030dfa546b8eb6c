//! MySQL backend of crm-sync.
//!
//! Mirror tables, the shared shadow tables and their triggers, the
//! `sync_progress` checkpoint table and the run lock all live in one MySQL
//! database. Local mutations are captured by triggers (see
//! [`change_tracking`]), never by application code.

pub mod change_tracking;
pub mod checkpoint;
mod client;
pub mod lock;
mod schema;
mod store;
pub mod testing;

pub use checkpoint::MySqlCheckpointStore;
pub use client::{new_mysql_pool, sanitize_connection_string, SqlLog};
pub use lock::RunLock;
pub use schema::describe_table;
pub use store::MySqlStore;
