//! Configuration inputs of the CLI.

pub mod modules;
pub mod since;

pub use modules::{FieldEntry, ModuleEntry, ModulesFile};
pub use since::parse_modified_since;
