//! Static field accessors of a module.
//!
//! `FieldBindings` is built once per module from its descriptors and tells
//! the engines which remote key to read a column from, which remote key to
//! write it to, and how to convert it.

use crate::descriptor::{FieldDescriptor, RemoteFieldType, UnsupportedFieldType};
use crate::mapping::map_field_type;
use crate::types::UniversalType;
use std::collections::HashMap;

/// Accessors and types of one mapped column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldBinding {
    pub name: String,
    pub remote_type: RemoteFieldType,
    pub column_type: UniversalType,
    pub indexed: bool,
    pub getter: Option<String>,
    pub setter: Option<String>,
}

impl FieldBinding {
    /// Whether pushes may write this column.
    pub fn is_writable(&self) -> bool {
        self.setter.is_some()
    }
}

/// Ordered, name-indexed set of field bindings.
#[derive(Debug, Clone, Default)]
pub struct FieldBindings {
    fields: Vec<FieldBinding>,
    by_name: HashMap<String, usize>,
    duplicates: Vec<String>,
}

impl FieldBindings {
    /// Build bindings from descriptors.
    ///
    /// The first descriptor of a given name wins; later ones are recorded in
    /// [`FieldBindings::duplicates`] so the caller can warn about them.
    pub fn from_descriptors(
        descriptors: &[FieldDescriptor],
    ) -> Result<Self, UnsupportedFieldType> {
        let mut bindings = Self::default();

        for descriptor in descriptors {
            if bindings.by_name.contains_key(&descriptor.name) {
                bindings.duplicates.push(descriptor.name.clone());
                continue;
            }
            let mapping = map_field_type(descriptor)?;
            bindings
                .by_name
                .insert(descriptor.name.clone(), bindings.fields.len());
            bindings.fields.push(FieldBinding {
                name: descriptor.name.clone(),
                remote_type: mapping.remote_type,
                column_type: mapping.column_type,
                indexed: mapping.indexed,
                getter: descriptor.getter.clone(),
                setter: descriptor.setter.clone(),
            });
        }

        Ok(bindings)
    }

    pub fn get(&self, name: &str) -> Option<&FieldBinding> {
        self.by_name.get(name).map(|&i| &self.fields[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldBinding> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Names skipped because an earlier descriptor already used them.
    pub fn duplicates(&self) -> &[String] {
        &self.duplicates
    }

    /// Whether `name` is the display-name companion of a lookup field.
    ///
    /// The remote side derives `<prefix>Name` / `<prefix>_Name` from the
    /// lookup `<prefix>ID`, `<prefix>_ID` or `<prefix>Id`, so such fields are
    /// never written on insert.
    pub fn is_derived_name_field(&self, name: &str) -> bool {
        let prefixes = [name.strip_suffix("_Name"), name.strip_suffix("Name")];

        prefixes
            .into_iter()
            .flatten()
            .filter(|prefix| !prefix.is_empty())
            .flat_map(|prefix| {
                [
                    format!("{prefix}ID"),
                    format!("{prefix}_ID"),
                    format!("{prefix}Id"),
                ]
            })
            .any(|candidate| {
                self.get(&candidate)
                    .is_some_and(|binding| binding.remote_type.is_lookup())
            })
    }
}
