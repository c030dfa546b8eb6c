//! Schema synchronization against the in-memory store.

mod common;

use anyhow::Result;
use common::{contacts_spec, init_logging, TABLE};
use crm_sync_mirror::testing::MemoryStore;
use crm_sync_mirror::{MirrorConfig, MirrorModule, MirrorStore, SchemaSynchronizer};
use sync_core::FieldDescriptor;

#[tokio::test]
async fn test_first_synchronize_creates_table_and_triggers() -> Result<()> {
    init_logging();
    let store = MemoryStore::new();
    let config = MirrorConfig::default();
    let module = MirrorModule::new(&contacts_spec(), &config)?;

    let changed = SchemaSynchronizer::new(&store, &config)
        .synchronize(&module, false)
        .await?;

    assert!(changed);
    assert_eq!(
        store.ddl_statements().await,
        [
            "CREATE TABLE zoho_contacts",
            "CREATE TRACKING TABLES",
            "CREATE TRIGGERS zoho_contacts"
        ]
    );
    assert_eq!(store.describe_table(TABLE).await?, Some(module.table.clone()));
    Ok(())
}

#[tokio::test]
async fn test_second_synchronize_is_noop() -> Result<()> {
    init_logging();
    let store = MemoryStore::new();
    let config = MirrorConfig::default();
    let module = MirrorModule::new(&contacts_spec(), &config)?;
    let schema = SchemaSynchronizer::new(&store, &config);

    schema.synchronize(&module, false).await?;
    let ddl_before = store.ddl_statements().await.len();

    assert!(!schema.synchronize(&module, false).await?);
    assert_eq!(store.ddl_statements().await.len(), ddl_before);
    Ok(())
}

#[tokio::test]
async fn test_force_triggers_reinstalls_without_table_change() -> Result<()> {
    init_logging();
    let store = MemoryStore::new();
    let config = MirrorConfig::default();
    let module = MirrorModule::new(&contacts_spec(), &config)?;
    let schema = SchemaSynchronizer::new(&store, &config);

    schema.synchronize(&module, false).await?;
    assert!(!schema.synchronize(&module, true).await?);

    let ddl = store.ddl_statements().await;
    assert_eq!(ddl.last().map(String::as_str), Some("CREATE TRIGGERS zoho_contacts"));
    assert_eq!(ddl.iter().filter(|s| s.starts_with("CREATE TRIGGERS")).count(), 2);
    Ok(())
}

#[tokio::test]
async fn test_new_field_alters_table() -> Result<()> {
    init_logging();
    let store = MemoryStore::new();
    let config = MirrorConfig::default();
    let schema = SchemaSynchronizer::new(&store, &config);
    schema
        .synchronize(&MirrorModule::new(&contacts_spec(), &config)?, false)
        .await?;

    let mut spec = contacts_spec();
    spec.fields
        .push(FieldDescriptor::new("ownerID", "ownerlookup").with_remote_name("Owner"));
    let module = MirrorModule::new(&spec, &config)?;

    assert!(schema.synchronize(&module, false).await?);
    let live = store.describe_table(TABLE).await?.unwrap();
    assert!(live.has_column("ownerID"));
    assert!(live.indexes.iter().any(|i| i.column == "ownerID"));

    let ddl = store.ddl_statements().await;
    assert_eq!(
        &ddl[ddl.len() - 2..],
        ["ALTER TABLE zoho_contacts", "CREATE TRIGGERS zoho_contacts"]
    );
    Ok(())
}

#[tokio::test]
async fn test_one_way_sync_skips_triggers() -> Result<()> {
    init_logging();
    let store = MemoryStore::new();
    let config = MirrorConfig {
        two_way: false,
        ..Default::default()
    };
    let module = MirrorModule::new(&contacts_spec(), &config)?;

    SchemaSynchronizer::new(&store, &config)
        .synchronize(&module, true)
        .await?;

    assert_eq!(store.ddl_statements().await, ["CREATE TABLE zoho_contacts"]);
    Ok(())
}

#[tokio::test]
async fn test_memory_store_rejects_invalid_ddl() -> Result<()> {
    init_logging();
    let store = MemoryStore::new();
    let config = MirrorConfig::default();
    let module = MirrorModule::new(&contacts_spec(), &config)?;

    // Triggers need the shadow tables.
    let err = store
        .install_triggers(&module.table, "modifiedTime")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("doesn't exist"));

    store.create_table(&module.table).await?;
    let err = store.create_table(&module.table).await.unwrap_err();
    assert!(err.to_string().contains("already exists"));
    Ok(())
}
