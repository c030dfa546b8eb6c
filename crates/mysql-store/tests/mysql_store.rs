//! Integration tests against a MySQL 8 container.
//!
//! Run with `cargo test -p crm-sync-mysql -- --ignored` on a host with Docker.

use anyhow::Result;
use checkpoint::{CheckpointID, CheckpointStore};
use crm_sync_mirror::testing::FakeRemote;
use crm_sync_mirror::{
    MirrorConfig, MirrorModule, MirrorStore, Operation, PushDirection, PushEngine,
    SchemaSynchronizer, ShadowKind, SyncRunner,
};
use crm_sync_mysql::testing::MySQLContainer;
use crm_sync_mysql::{MySqlCheckpointStore, MySqlStore, RunLock, SqlLog};
use mysql_async::prelude::*;
use serde_json::json;
use sync_core::{diff_tables, FieldDescriptor, ModuleSpec};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize logging for tests
fn init_logging() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

fn contacts_spec() -> ModuleSpec {
    ModuleSpec {
        module: "Contacts".to_string(),
        plural_name: "Contacts".to_string(),
        fields: vec![
            FieldDescriptor::new("lastName", "text")
                .with_max_length(80)
                .with_remote_name("Last_Name"),
            FieldDescriptor::new("email", "email").with_remote_name("Email"),
            FieldDescriptor::new("modifiedTime", "datetime")
                .with_remote_name("Modified_Time")
                .read_only(),
        ],
    }
}

async fn started(name: &str, port: u16) -> Result<MySQLContainer> {
    init_logging();
    let container = MySQLContainer::new(name, port);
    container.start()?;
    container.wait_until_ready(90).await?;
    Ok(container)
}

fn store(container: &MySQLContainer) -> Result<MySqlStore> {
    Ok(MySqlStore::new(container.get_pool()?).with_sql_log(SqlLog {
        statements: true,
        params: true,
    }))
}

#[tokio::test]
#[ignore]
async fn test_schema_sync_is_idempotent() -> Result<()> {
    let container = started("crm-sync-schema", 13401).await?;
    let store = store(&container)?;
    let config = MirrorConfig::default();
    let module = MirrorModule::new(&contacts_spec(), &config)?;
    let schema = SchemaSynchronizer::new(&store, &config);

    assert!(schema.synchronize(&module, false).await?);
    let live = store.describe_table("zoho_contacts").await?.unwrap();
    assert!(diff_tables(&live, &module.table).is_empty());

    assert!(!schema.synchronize(&module, false).await?);

    let mut spec = contacts_spec();
    spec.fields
        .push(FieldDescriptor::new("ownerID", "ownerlookup").with_remote_name("Owner"));
    let widened = MirrorModule::new(&spec, &config)?;
    assert!(schema.synchronize(&widened, false).await?);
    let live = store.describe_table("zoho_contacts").await?.unwrap();
    assert!(diff_tables(&live, &widened.table).is_empty());
    assert!(live.indexes.iter().any(|i| i.name == "idx_ownerID"));
    Ok(())
}

#[tokio::test]
#[ignore]
async fn test_triggers_capture_local_writes_only() -> Result<()> {
    let container = started("crm-sync-triggers", 13402).await?;
    let store = store(&container)?;
    let remote = FakeRemote::new("Modified_Time");
    let config = MirrorConfig::default();
    let checkpoints = MySqlCheckpointStore::new(container.get_pool()?);
    checkpoints.ensure_table().await?;

    remote.put_record(
        "Contacts",
        "1001",
        json!({"Last_Name": "Smith", "Email": "smith@example.com"}),
    );
    let report = SyncRunner::new(&store, &remote, &checkpoints, &config)
        .run(&[contacts_spec()], Operation::Sync)
        .await;
    assert!(report.is_success());

    let mut conn = container.get_pool()?.get_conn().await?;
    let pending: Option<i64> = conn.query_first("SELECT COUNT(*) FROM local_update").await?;
    assert_eq!(pending, Some(0), "pulled rows must not be captured");

    conn.query_drop("UPDATE zoho_contacts SET email = 'new@example.com', lastName = 'Smythe' WHERE id = '1001'")
        .await?;
    conn.query_drop("UPDATE zoho_contacts SET email = 'new@example.com' WHERE id = '1001'")
        .await?;
    let fields: Vec<String> = conn
        .query("SELECT field_name FROM local_update ORDER BY field_name")
        .await?;
    assert_eq!(fields, ["email", "lastName"]);

    conn.query_drop("INSERT INTO zoho_contacts (lastName) VALUES ('Jones')")
        .await?;
    let inserted: Option<i64> = conn.query_first("SELECT COUNT(*) FROM local_insert").await?;
    assert_eq!(inserted, Some(1));

    conn.query_drop("DELETE FROM zoho_contacts WHERE id = '1001'").await?;
    let deleted: Vec<String> = conn.query("SELECT id FROM local_delete").await?;
    assert_eq!(deleted, ["1001"]);
    let pending: Option<i64> = conn.query_first("SELECT COUNT(*) FROM local_update").await?;
    assert_eq!(pending, Some(0));
    info!("Trigger capture verified");
    Ok(())
}

#[tokio::test]
#[ignore]
async fn test_push_and_poison_round_trip() -> Result<()> {
    let container = started("crm-sync-push", 13403).await?;
    let store = store(&container)?;
    let remote = FakeRemote::new("Modified_Time");
    remote.reject_when("Last_Name", json!("Bad"));
    let config = MirrorConfig::default();
    let module = MirrorModule::new(&contacts_spec(), &config)?;
    SchemaSynchronizer::new(&store, &config)
        .synchronize(&module, false)
        .await?;

    let mut conn = container.get_pool()?.get_conn().await?;
    conn.query_drop("INSERT INTO zoho_contacts (lastName) VALUES ('Alpha'), ('Bad'), ('Gamma')")
        .await?;

    let report = PushEngine::new(&store, &remote, &config)
        .push(&module, PushDirection::Insert)
        .await?;
    assert_eq!(report.confirmed, 2);
    assert_eq!(report.failed.len(), 1);

    let ids: Vec<Option<String>> = conn
        .query("SELECT id FROM zoho_contacts ORDER BY uid")
        .await?;
    assert!(ids[0].is_some() && ids[1].is_none() && ids[2].is_some());

    let poisoned = store.poisoned_entries().await?;
    assert_eq!(poisoned.len(), 1);
    assert_eq!(poisoned[0].kind, ShadowKind::Insert);
    assert!(poisoned[0].error.contains("INVALID_DATA"));

    assert_eq!(store.clear_poison(Some("zoho_contacts")).await?, 1);
    assert_eq!(store.pending_inserts(&module.table, 10).await?.len(), 1);
    Ok(())
}

#[tokio::test]
#[ignore]
async fn test_checkpoints_and_run_lock() -> Result<()> {
    let container = started("crm-sync-progress", 13404).await?;
    let pool = container.get_pool()?;
    let checkpoints = MySqlCheckpointStore::new(pool.clone());
    checkpoints.ensure_table().await?;

    let id = CheckpointID::new("records", "zoho_contacts");
    assert!(checkpoints.read_checkpoint(&id).await?.is_none());
    checkpoints
        .store_checkpoint(&id, "crm-pull", "first".to_string())
        .await?;
    checkpoints
        .store_checkpoint(&id, "crm-pull", "second".to_string())
        .await?;
    let stored = checkpoints.read_checkpoint(&id).await?.unwrap();
    assert_eq!(stored.checkpoint_data, "second");
    assert_eq!(stored.checkpoint_type, "crm-pull");

    let lock = RunLock::try_acquire(&pool, "crm_sync_test").await?.unwrap();
    assert!(RunLock::try_acquire(&pool, "crm_sync_test").await?.is_none());
    lock.release().await?;
    let again = RunLock::try_acquire(&pool, "crm_sync_test").await?;
    assert!(again.is_some());
    Ok(())
}
