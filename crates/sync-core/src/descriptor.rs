//! Remote field metadata.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Remote field type tag.
///
/// Parsed case-insensitively with spaces and underscores ignored, so both the
/// display names of the CRM ("Pick List", "Multi Select Lookup") and its API
/// names ("picklist", "multiselectlookup") are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteFieldType {
    Lookup,
    OwnerLookup,
    UserLookup,
    Formula,
    DateTime,
    Date,
    Boolean,
    TextArea,
    BigInt,
    Integer,
    Text,
    Phone,
    Email,
    Url,
    Website,
    Picklist,
    AutoNumber,
    MultiSelectPicklist,
    MultiSelectLookup,
    MultiUserLookup,
    Double,
    Percent,
    Currency,
    Decimal,
}

impl RemoteFieldType {
    /// Lookup-like fields hold the remote id of another record.
    pub fn is_lookup(self) -> bool {
        matches!(self, Self::Lookup | Self::OwnerLookup | Self::UserLookup)
    }

    /// Multi-valued fields are stored joined with `;`.
    pub fn is_multi_valued(self) -> bool {
        matches!(
            self,
            Self::MultiSelectPicklist | Self::MultiSelectLookup | Self::MultiUserLookup
        )
    }

    /// Canonical lowercase tag.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lookup => "lookup",
            Self::OwnerLookup => "ownerlookup",
            Self::UserLookup => "userlookup",
            Self::Formula => "formula",
            Self::DateTime => "datetime",
            Self::Date => "date",
            Self::Boolean => "boolean",
            Self::TextArea => "textarea",
            Self::BigInt => "bigint",
            Self::Integer => "integer",
            Self::Text => "text",
            Self::Phone => "phone",
            Self::Email => "email",
            Self::Url => "url",
            Self::Website => "website",
            Self::Picklist => "picklist",
            Self::AutoNumber => "autonumber",
            Self::MultiSelectPicklist => "multiselectpicklist",
            Self::MultiSelectLookup => "multiselectlookup",
            Self::MultiUserLookup => "multiuserlookup",
            Self::Double => "double",
            Self::Percent => "percent",
            Self::Currency => "currency",
            Self::Decimal => "decimal",
        }
    }
}

impl fmt::Display for RemoteFieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A remote type tag the mapper does not know.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unsupported remote field type '{tag}'")]
pub struct UnsupportedFieldType {
    /// The tag as it appeared in the descriptor
    pub tag: String,
}

impl FromStr for RemoteFieldType {
    type Err = UnsupportedFieldType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '_')
            .flat_map(char::to_lowercase)
            .collect();

        let ty = match normalized.as_str() {
            "lookup" | "lookupid" => Self::Lookup,
            "ownerlookup" => Self::OwnerLookup,
            "userlookup" => Self::UserLookup,
            "formula" => Self::Formula,
            "datetime" => Self::DateTime,
            "date" => Self::Date,
            "boolean" => Self::Boolean,
            "textarea" => Self::TextArea,
            "bigint" => Self::BigInt,
            "integer" => Self::Integer,
            "text" => Self::Text,
            "phone" => Self::Phone,
            "email" => Self::Email,
            "url" => Self::Url,
            "website" => Self::Website,
            "picklist" => Self::Picklist,
            "autonumber" => Self::AutoNumber,
            "multiselectpicklist" => Self::MultiSelectPicklist,
            "multiselectlookup" => Self::MultiSelectLookup,
            "multiuserlookup" => Self::MultiUserLookup,
            "double" => Self::Double,
            "percent" => Self::Percent,
            "currency" => Self::Currency,
            "decimal" => Self::Decimal,
            _ => {
                return Err(UnsupportedFieldType { tag: s.to_string() });
            }
        };
        Ok(ty)
    }
}

/// Metadata of one remote field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Local column name
    pub name: String,
    /// Remote type tag, parsed by [`RemoteFieldType::from_str`]
    pub remote_type: String,
    /// Declared maximum length for text-like fields
    #[serde(default)]
    pub max_length: Option<u32>,
    /// Remote key the value is read from; `None` means the column is never
    /// filled by a pull.
    #[serde(default)]
    pub getter: Option<String>,
    /// Remote key the value is written to; `None` means read-only.
    #[serde(default)]
    pub setter: Option<String>,
}

impl FieldDescriptor {
    /// A read/write field whose remote key equals the column name.
    pub fn new(name: impl Into<String>, remote_type: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            getter: Some(name.clone()),
            setter: Some(name.clone()),
            name,
            remote_type: remote_type.into(),
            max_length: None,
        }
    }

    /// Set the declared maximum length.
    pub fn with_max_length(mut self, max_length: u32) -> Self {
        self.max_length = Some(max_length);
        self
    }

    /// Use a different remote key for reading and writing.
    pub fn with_remote_name(mut self, remote_name: impl Into<String>) -> Self {
        let remote_name = remote_name.into();
        if self.getter.is_some() {
            self.getter = Some(remote_name.clone());
        }
        if self.setter.is_some() {
            self.setter = Some(remote_name);
        }
        self
    }

    /// Mark the field as never pushed.
    pub fn read_only(mut self) -> Self {
        self.setter = None;
        self
    }
}

/// One remote module and the fields mirrored from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleSpec {
    /// Module name as the remote API addresses it (e.g. `Contacts`)
    pub module: String,
    /// Plural display name used to derive the table name (e.g. `SalesOrders`)
    pub plural_name: String,
    /// Field descriptors in remote order
    pub fields: Vec<FieldDescriptor>,
}
