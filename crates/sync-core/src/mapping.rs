//! Type Mapper: remote field descriptor → local column type.
//!
//! | Remote tag(s)                                        | Local type          | Indexed |
//! |------------------------------------------------------|---------------------|---------|
//! | lookup, lookupid                                     | VARCHAR(100)        | yes     |
//! | ownerlookup, userlookup                              | VARCHAR(25)         | yes     |
//! | formula                                              | VARCHAR(100)        | no      |
//! | datetime                                             | DATETIME            | no      |
//! | date                                                 | DATE                | no      |
//! | boolean                                              | TINYINT(1)          | no      |
//! | textarea                                             | TEXT                | no      |
//! | bigint                                               | BIGINT              | no      |
//! | integer                                              | INT                 | no      |
//! | text, phone, email, url, website, picklist, autonumber | VARCHAR(n) / TEXT | no      |
//! | multiselectpicklist, multiselectlookup, multiuserlookup | TEXT             | no      |
//! | double, percent                                      | DOUBLE              | no      |
//! | currency, decimal                                    | DECIMAL(20,4)       | no      |

use crate::descriptor::{FieldDescriptor, RemoteFieldType, UnsupportedFieldType};
use crate::types::{UniversalType, MAX_VARCHAR_LENGTH};

/// Length of lookup columns holding a remote record id.
pub const LOOKUP_ID_LENGTH: u32 = 100;

/// Length of owner/user lookup columns.
pub const USER_ID_LENGTH: u32 = 25;

/// Precision and scale of currency and decimal columns.
pub const DECIMAL_PRECISION: u8 = 20;
pub const DECIMAL_SCALE: u8 = 4;

/// Local column produced for a remote field.
///
/// Every mapped column is nullable; remote required-ness is never enforced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapping {
    pub remote_type: RemoteFieldType,
    pub column_type: UniversalType,
    pub indexed: bool,
}

/// Map a remote field descriptor to its local column.
pub fn map_field_type(
    descriptor: &FieldDescriptor,
) -> Result<ColumnMapping, UnsupportedFieldType> {
    let remote_type: RemoteFieldType = descriptor.remote_type.parse()?;
    let (column_type, indexed) = map_remote_type(remote_type, descriptor.max_length);
    Ok(ColumnMapping {
        remote_type,
        column_type,
        indexed,
    })
}

fn map_remote_type(
    remote_type: RemoteFieldType,
    max_length: Option<u32>,
) -> (UniversalType, bool) {
    use RemoteFieldType as R;

    match remote_type {
        R::Lookup => (
            UniversalType::VarChar {
                length: LOOKUP_ID_LENGTH,
            },
            true,
        ),
        R::OwnerLookup | R::UserLookup => (
            UniversalType::VarChar {
                length: USER_ID_LENGTH,
            },
            true,
        ),
        R::Formula => (
            UniversalType::VarChar {
                length: LOOKUP_ID_LENGTH,
            },
            false,
        ),
        R::DateTime => (UniversalType::LocalDateTime, false),
        R::Date => (UniversalType::Date, false),
        R::Boolean => (UniversalType::Bool, false),
        R::TextArea => (UniversalType::Text, false),
        R::BigInt => (UniversalType::Int64, false),
        R::Integer => (UniversalType::Int32, false),
        R::Text | R::Phone | R::Email | R::Url | R::Website | R::Picklist | R::AutoNumber => {
            (text_column(max_length), false)
        }
        R::MultiSelectPicklist | R::MultiSelectLookup | R::MultiUserLookup => {
            (UniversalType::Text, false)
        }
        R::Double | R::Percent => (UniversalType::Float64, false),
        R::Currency | R::Decimal => (
            UniversalType::Decimal {
                precision: DECIMAL_PRECISION,
                scale: DECIMAL_SCALE,
            },
            false,
        ),
    }
}

fn text_column(max_length: Option<u32>) -> UniversalType {
    match max_length {
        Some(length) if length > MAX_VARCHAR_LENGTH => UniversalType::Text,
        // A declared length of zero is as good as none.
        Some(0) | None => UniversalType::VarChar {
            length: MAX_VARCHAR_LENGTH,
        },
        Some(length) => UniversalType::VarChar { length },
    }
}

/// Local table name for a module: `snake_case(prefix + plural_name)`.
///
/// `table_name_for_module("zoho_", "SalesOrders")` is `zoho_sales_orders`.
pub fn table_name_for_module(prefix: &str, plural_name: &str) -> String {
    snake_case(&format!("{prefix}{plural_name}"))
}

fn snake_case(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c == ' ' || c == '-' || c == '_' {
            if !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
            continue;
        }
        if c.is_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            let boundary = prev.is_lowercase()
                || prev.is_ascii_digit()
                || (prev.is_uppercase() && next_is_lower);
            if boundary && !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
        }
        out.extend(c.to_lowercase());
    }

    out.trim_end_matches('_').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(tag: &str, max_length: Option<u32>) -> ColumnMapping {
        let mut d = FieldDescriptor::new("f", tag);
        d.max_length = max_length;
        map_field_type(&d).unwrap()
    }

    #[test]
    fn test_lookup_columns_are_indexed() {
        let m = map("lookup", None);
        assert_eq!(m.column_type, UniversalType::VarChar { length: 100 });
        assert!(m.indexed);

        let m = map("Owner Lookup", None);
        assert_eq!(m.column_type, UniversalType::VarChar { length: 25 });
        assert!(m.indexed);

        let m = map("userlookup", None);
        assert_eq!(m.column_type, UniversalType::VarChar { length: 25 });
        assert!(m.indexed);
    }

    #[test]
    fn test_scalar_columns() {
        assert_eq!(map("datetime", None).column_type, UniversalType::LocalDateTime);
        assert_eq!(map("date", None).column_type, UniversalType::Date);
        assert_eq!(map("boolean", None).column_type, UniversalType::Bool);
        assert_eq!(map("textarea", None).column_type, UniversalType::Text);
        assert_eq!(map("bigint", None).column_type, UniversalType::Int64);
        assert_eq!(map("integer", None).column_type, UniversalType::Int32);
        assert_eq!(map("double", None).column_type, UniversalType::Float64);
        assert_eq!(map("percent", None).column_type, UniversalType::Float64);
        assert_eq!(
            map("currency", None).column_type,
            UniversalType::Decimal {
                precision: 20,
                scale: 4
            }
        );
        assert_eq!(
            map("formula", None).column_type,
            UniversalType::VarChar { length: 100 }
        );
        assert!(!map("formula", None).indexed);
    }

    #[test]
    fn test_text_length_rules() {
        assert_eq!(
            map("text", Some(40)).column_type,
            UniversalType::VarChar { length: 40 }
        );
        assert_eq!(
            map("email", None).column_type,
            UniversalType::VarChar { length: 255 }
        );
        assert_eq!(
            map("website", Some(255)).column_type,
            UniversalType::VarChar { length: 255 }
        );
        assert_eq!(map("phone", Some(256)).column_type, UniversalType::Text);
        assert_eq!(
            map("autonumber", None).column_type,
            UniversalType::VarChar { length: 255 }
        );
    }

    #[test]
    fn test_multi_valued_columns_are_text() {
        for tag in ["multiselectpicklist", "Multi Select Lookup", "multiuserlookup"] {
            let m = map(tag, Some(40));
            assert_eq!(m.column_type, UniversalType::Text, "tag {tag}");
            assert!(m.remote_type.is_multi_valued());
        }
    }

    #[test]
    fn test_unknown_tag_fails_fast() {
        let d = FieldDescriptor::new("f", "subform");
        let err = map_field_type(&d).unwrap_err();
        assert_eq!(err.tag, "subform");
    }

    #[test]
    fn test_table_names() {
        assert_eq!(
            table_name_for_module("zoho_", "SalesOrders"),
            "zoho_sales_orders"
        );
        assert_eq!(table_name_for_module("zoho_", "Contacts"), "zoho_contacts");
        assert_eq!(
            table_name_for_module("crm_", "Price Books"),
            "crm_price_books"
        );
        assert_eq!(table_name_for_module("", "CRMAccounts"), "crm_accounts");
    }
}
