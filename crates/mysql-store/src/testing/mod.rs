//! Testing utilities for the MySQL store
//!
//! Docker container management for the integration tests.

pub mod container;

pub use container::MySQLContainer;
