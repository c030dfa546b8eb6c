//! Checkpoint management for crm-sync
//!
//! Provides storage-agnostic persistence of sync progress so an interrupted
//! pull resumes at the page it stopped on.
//!
//! # Architecture
//!
//! - The `Checkpoint` trait is implemented by engine-specific checkpoint types
//! - `CheckpointStore` abstracts where serialized checkpoints live
//! - `CheckpointManager` saves and loads typed checkpoints through a store
//!
//! ## Storage Backends
//!
//! - `FilesystemStore` - one JSON file per checkpoint id
//! - `sync_progress` table - implemented in the MySQL store crate
//! - in-memory - implemented by the engine's test store

mod filesystem;
mod manager;
pub mod store;


pub use filesystem::FilesystemStore;
pub use manager::CheckpointManager;
pub use store::{CheckpointID, CheckpointStore, StoredCheckpoint};

/// Trait that engine-specific checkpoints must implement.
///
/// # Example
///
/// ```rust
/// use checkpoint::Checkpoint;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// pub struct OffsetCheckpoint {
///     pub offset: u64,
/// }
///
/// impl Checkpoint for OffsetCheckpoint {
///     const CHECKPOINT_TYPE: &'static str = "offset";
///
///     fn to_cli_string(&self) -> String {
///         self.offset.to_string()
///     }
///
///     fn from_cli_string(s: &str) -> anyhow::Result<Self> {
///         Ok(Self { offset: s.parse()? })
///     }
/// }
/// ```
pub trait Checkpoint: serde::Serialize + for<'de> serde::Deserialize<'de> + Clone {
    /// Checkpoint type identifier.
    ///
    /// Stored next to the serialized data and validated on load, so a
    /// checkpoint written by one engine is never parsed as another's.
    const CHECKPOINT_TYPE: &'static str;

    /// Convert to CLI-friendly string format.
    ///
    /// The returned string should be parseable by `from_cli_string()`.
    fn to_cli_string(&self) -> String;

    /// Parse from CLI string format.
    fn from_cli_string(s: &str) -> anyhow::Result<Self>
    where
        Self: Sized;
}
