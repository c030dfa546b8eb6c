//! The modules file: which remote modules are mirrored and their fields.
//!
//! ```yaml
//! modules:
//!   - module: Contacts
//!     plural_name: Contacts
//!     fields:
//!       - { name: firstName, type: Text, max_length: 40, remote_name: First_Name }
//!       - { name: modifiedTime, type: DateTime, remote_name: Modified_Time, read_only: true }
//! ```
//!
//! Field types are validated when the module's schema is synchronized, so a
//! module with an unknown type fails on its own without stopping the others.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use sync_core::{FieldDescriptor, ModuleSpec};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModulesFile {
    pub modules: Vec<ModuleEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleEntry {
    /// Module name as the API addresses it
    pub module: String,
    /// Used for the table name; defaults to `module`
    #[serde(default)]
    pub plural_name: Option<String>,
    pub fields: Vec<FieldEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldEntry {
    /// Local column name
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub max_length: Option<u32>,
    /// Remote API key when it differs from `name`
    #[serde(default)]
    pub remote_name: Option<String>,
    #[serde(default)]
    pub read_only: bool,
}

impl From<FieldEntry> for FieldDescriptor {
    fn from(entry: FieldEntry) -> Self {
        let mut descriptor = FieldDescriptor::new(entry.name, entry.field_type);
        if let Some(max_length) = entry.max_length {
            descriptor = descriptor.with_max_length(max_length);
        }
        if let Some(remote_name) = entry.remote_name {
            descriptor = descriptor.with_remote_name(remote_name);
        }
        if entry.read_only {
            descriptor = descriptor.read_only();
        }
        descriptor
    }
}

impl From<ModuleEntry> for ModuleSpec {
    fn from(entry: ModuleEntry) -> Self {
        ModuleSpec {
            plural_name: entry.plural_name.unwrap_or_else(|| entry.module.clone()),
            module: entry.module,
            fields: entry.fields.into_iter().map(FieldDescriptor::from).collect(),
        }
    }
}

impl ModulesFile {
    pub fn parse(yaml: &str) -> Result<Self> {
        let file: Self = serde_yaml::from_str(yaml).context("Invalid modules file")?;

        let mut seen = HashSet::new();
        for entry in &file.modules {
            if !seen.insert(entry.module.as_str()) {
                anyhow::bail!("Module {} is listed twice", entry.module);
            }
            if entry.fields.is_empty() {
                anyhow::bail!("Module {} has no fields", entry.module);
            }
        }
        Ok(file)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let yaml = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read modules file {}", path.display()))?;
        Self::parse(&yaml).with_context(|| format!("In {}", path.display()))
    }

    /// Module specs in file order, restricted to `only` unless it is empty.
    ///
    /// Fails when `only` names a module the file does not list.
    pub fn into_specs(self, only: &[String]) -> Result<Vec<ModuleSpec>> {
        for name in only {
            if !self.modules.iter().any(|m| &m.module == name) {
                anyhow::bail!("Module {name} is not in the modules file");
            }
        }

        Ok(self
            .modules
            .into_iter()
            .filter(|m| only.is_empty() || only.contains(&m.module))
            .map(ModuleSpec::from)
            .collect())
    }
}
