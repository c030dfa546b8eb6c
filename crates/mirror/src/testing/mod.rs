//! Testing utilities for the sync engines
//!
//! In-memory stand-ins for the local database and the remote CRM service.
//! `MemoryStore` applies the same change-capture rules as the MySQL triggers
//! on its write path, so engine behaviour can be tested without a database.

pub mod memory;
pub mod remote;

pub use memory::MemoryStore;
pub use remote::FakeRemote;
