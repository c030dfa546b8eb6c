//! Shared fixtures for the engine tests.
#![allow(dead_code)]

use crm_sync_mirror::testing::{FakeRemote, MemoryStore};
use crm_sync_mirror::{MirrorConfig, MirrorModule, SchemaSynchronizer};
use serde_json::{json, Value};
use sync_core::{FieldDescriptor, FieldValues, ModuleSpec, UniversalValue};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub const MODULE: &str = "Contacts";
pub const TABLE: &str = "zoho_contacts";
pub const MODIFIED_KEY: &str = "Modified_Time";

/// Initialize logging for tests
pub fn init_logging() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

pub fn contacts_spec() -> ModuleSpec {
    ModuleSpec {
        module: MODULE.to_string(),
        plural_name: "Contacts".to_string(),
        fields: vec![
            FieldDescriptor::new("lastName", "text")
                .with_max_length(80)
                .with_remote_name("Last_Name"),
            FieldDescriptor::new("email", "email").with_remote_name("Email"),
            FieldDescriptor::new("accountID", "lookup").with_remote_name("Account_Name"),
            FieldDescriptor::new("accountName", "text").with_remote_name("Account_Label"),
            FieldDescriptor::new("birthDate", "date").with_remote_name("Date_of_Birth"),
            FieldDescriptor::new("createdTime", "datetime")
                .with_remote_name("Created_Time")
                .read_only(),
            FieldDescriptor::new("modifiedTime", "datetime")
                .with_remote_name(MODIFIED_KEY)
                .read_only(),
        ],
    }
}

/// A remote contact; the fake remote stamps `Modified_Time`.
pub fn contact(last_name: &str, email: &str) -> Value {
    json!({
        "Last_Name": last_name,
        "Email": email,
        "Account_Name": {"id": "acc-1", "name": "Acme"},
        "Created_Time": "2023-06-01T12:00:00+00:00",
    })
}

pub fn values(pairs: &[(&str, UniversalValue)]) -> FieldValues {
    pairs
        .iter()
        .map(|(column, value)| (column.to_string(), value.clone()))
        .collect()
}

pub struct Fixture {
    pub store: MemoryStore,
    pub remote: FakeRemote,
    pub config: MirrorConfig,
    pub module: MirrorModule,
}

/// Store with the contacts table created and triggers installed.
pub async fn fixture(config: MirrorConfig) -> Fixture {
    fixture_with(contacts_spec(), config).await
}

/// Store with the table of `spec` created and triggers installed.
pub async fn fixture_with(spec: ModuleSpec, config: MirrorConfig) -> Fixture {
    init_logging();
    let store = MemoryStore::new();
    let remote = FakeRemote::new(MODIFIED_KEY);
    let module = MirrorModule::new(&spec, &config).unwrap();
    SchemaSynchronizer::new(&store, &config)
        .synchronize(&module, false)
        .await
        .unwrap();
    Fixture {
        store,
        remote,
        config,
        module,
    }
}
