//! Pull engine behaviour against the in-memory store and remote.

mod common;

use anyhow::{anyhow, Result};
use checkpoint::{CheckpointManager, CheckpointStore};
use chrono::{Duration, NaiveDate};
use common::{contact, fixture, values, Fixture, MODULE, TABLE};
use crm_sync_mirror::testing::MemoryStore;
use crm_sync_mirror::{
    ChangeListener, MirrorConfig, ModuleContext, PullCheckpoint, PullEngine, PullMode, SyncError,
};
use serde_json::json;
use std::sync::{Arc, Mutex};
use sync_core::{MirrorRow, UniversalValue};

fn engine<'a>(
    f: &'a Fixture,
    listeners: &'a [Arc<dyn ChangeListener>],
) -> PullEngine<'a> {
    PullEngine::new(&f.store, &f.remote, &f.store, &f.config, listeners)
}

async fn pull(f: &Fixture, mode: PullMode) -> Result<crm_sync_mirror::PullCounts, SyncError> {
    engine(f, &[]).pull(&f.module, mode).await
}

#[derive(Default)]
struct RecordingListener {
    events: Mutex<Vec<String>>,
}

impl ChangeListener for RecordingListener {
    fn on_insert(&self, row: &MirrorRow, ctx: &ModuleContext<'_>) -> anyhow::Result<()> {
        self.events
            .lock()
            .unwrap()
            .push(format!("insert {} {}", ctx.table, row.id.as_deref().unwrap_or("")));
        Ok(())
    }

    fn on_update(
        &self,
        new: &MirrorRow,
        old: &MirrorRow,
        _ctx: &ModuleContext<'_>,
    ) -> anyhow::Result<()> {
        self.events.lock().unwrap().push(format!(
            "update {} -> {}",
            old.get("lastName"),
            new.get("lastName")
        ));
        Ok(())
    }
}

struct RejectingListener;

impl ChangeListener for RejectingListener {
    fn on_insert(&self, _row: &MirrorRow, _ctx: &ModuleContext<'_>) -> anyhow::Result<()> {
        Err(anyhow!("not today"))
    }
}

// ============================================================================
// Applying records
// ============================================================================

#[tokio::test]
async fn test_pull_inserts_new_records() -> Result<()> {
    let f = fixture(MirrorConfig::default()).await;
    f.remote.put_record(MODULE, "1001", contact("Smith", "smith@example.com"));
    f.remote.put_record(MODULE, "1002", contact("Jones", "jones@example.com"));

    let counts = pull(&f, PullMode::Incremental).await?;
    assert_eq!(counts.inserted, 2);
    assert_eq!(counts.updated, 0);

    let row = f.store.row_by_id(TABLE, "1001").await.unwrap();
    assert_eq!(row.get("lastName"), &UniversalValue::from("Smith"));
    assert_eq!(row.get("accountID"), &UniversalValue::from("acc-1"));
    assert_eq!(
        row.get("modifiedTime"),
        &UniversalValue::DateTime(
            NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(0, 1, 0)
                .unwrap()
        )
    );

    // Rows arriving with an id are not local inserts.
    assert!(f.store.pending_insert_uids(TABLE).await.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_pulled_update_is_not_captured() -> Result<()> {
    let f = fixture(MirrorConfig::default()).await;
    f.remote.put_record(MODULE, "1001", contact("Smith", "smith@example.com"));
    pull(&f, PullMode::Incremental).await?;

    f.remote.put_record(MODULE, "1001", contact("Smythe", "smythe@example.com"));
    let counts = pull(&f, PullMode::Incremental).await?;
    assert_eq!(counts.updated, 1);

    let row = f.store.row_by_id(TABLE, "1001").await.unwrap();
    assert_eq!(row.get("lastName"), &UniversalValue::from("Smythe"));
    assert!(f.store.pending_update_fields_of(TABLE, row.uid).await.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_update_without_usable_modified_time_is_skipped() -> Result<()> {
    let f = fixture(MirrorConfig::default()).await;
    f.remote.put_record(MODULE, "1001", contact("Smith", "smith@example.com"));
    pull(&f, PullMode::Incremental).await?;

    let mut changed = contact("Smythe", "smythe@example.com");
    changed["Modified_Time"] = json!("soon");
    f.remote.put_record(MODULE, "1001", changed);
    let counts = pull(&f, PullMode::Full).await?;
    assert_eq!(counts.updated, 0);
    assert_eq!(counts.skipped, 1);

    // Applying it would have looked like a local edit.
    let row = f.store.row_by_id(TABLE, "1001").await.unwrap();
    assert_eq!(row.get("lastName"), &UniversalValue::from("Smith"));
    assert!(f.store.pending_update_fields_of(TABLE, row.uid).await.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_one_way_applies_update_without_modified_time() -> Result<()> {
    let config = MirrorConfig {
        two_way: false,
        ..MirrorConfig::default()
    };
    let f = fixture(config).await;
    f.remote.put_record(MODULE, "1001", contact("Smith", "smith@example.com"));
    pull(&f, PullMode::Incremental).await?;

    let mut changed = contact("Smythe", "smythe@example.com");
    changed["Modified_Time"] = json!("soon");
    f.remote.put_record(MODULE, "1001", changed);
    let counts = pull(&f, PullMode::Full).await?;
    assert_eq!(counts.updated, 1);
    assert_eq!(counts.skipped, 0);

    let row = f.store.row_by_id(TABLE, "1001").await.unwrap();
    assert_eq!(row.get("lastName"), &UniversalValue::from("Smythe"));
    Ok(())
}

#[tokio::test]
async fn test_local_edits_are_captured_per_column() -> Result<()> {
    let f = fixture(MirrorConfig::default()).await;
    f.remote.put_record(MODULE, "1001", contact("Smith", "smith@example.com"));
    f.remote.put_record(MODULE, "1002", contact("Jones", "jones@example.com"));
    pull(&f, PullMode::Incremental).await?;
    let smith = f.store.row_by_id(TABLE, "1001").await.unwrap();
    let jones = f.store.row_by_id(TABLE, "1002").await.unwrap();

    f.store
        .local_update(
            TABLE,
            smith.uid,
            values(&[
                ("lastName", "Smithers".into()),
                ("email", "smithers@example.com".into()),
            ]),
        )
        .await?;
    f.store
        .local_update(TABLE, jones.uid, values(&[("lastName", "Jones".into())]))
        .await?;

    assert_eq!(
        f.store.pending_update_fields_of(TABLE, smith.uid).await,
        ["email", "lastName"]
    );
    assert!(f.store.pending_update_fields_of(TABLE, jones.uid).await.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_pending_local_edit_survives_pull() -> Result<()> {
    let f = fixture(MirrorConfig::default()).await;
    f.remote.put_record(MODULE, "1001", contact("Smith", "smith@example.com"));
    pull(&f, PullMode::Incremental).await?;
    let uid = f.store.row_by_id(TABLE, "1001").await.unwrap().uid;

    f.store
        .local_update(TABLE, uid, values(&[("lastName", "Local".into())]))
        .await?;
    f.remote.put_record(MODULE, "1001", contact("Remote", "remote@example.com"));
    pull(&f, PullMode::Incremental).await?;

    let row = f.store.row(TABLE, uid).await.unwrap();
    assert_eq!(row.get("lastName"), &UniversalValue::from("Local"));
    assert_eq!(row.get("email"), &UniversalValue::from("remote@example.com"));
    assert_eq!(f.store.pending_update_fields_of(TABLE, uid).await, ["lastName"]);
    Ok(())
}

#[tokio::test]
async fn test_one_way_pull_overwrites_everything() -> Result<()> {
    let f = fixture(MirrorConfig::default()).await;
    f.remote.put_record(MODULE, "1001", contact("Smith", "smith@example.com"));
    pull(&f, PullMode::Incremental).await?;
    let uid = f.store.row_by_id(TABLE, "1001").await.unwrap().uid;
    f.store
        .local_update(TABLE, uid, values(&[("lastName", "Local".into())]))
        .await?;
    f.remote.put_record(MODULE, "1001", contact("Remote", "remote@example.com"));

    let config = MirrorConfig {
        two_way: false,
        ..Default::default()
    };
    PullEngine::new(&f.store, &f.remote, &f.store, &config, &[])
        .pull(&f.module, PullMode::Incremental)
        .await?;

    let row = f.store.row(TABLE, uid).await.unwrap();
    assert_eq!(row.get("lastName"), &UniversalValue::from("Remote"));
    Ok(())
}

// ============================================================================
// Checkpoints
// ============================================================================

#[tokio::test]
async fn test_fetch_failure_resumes_at_failed_page() -> Result<()> {
    let f = fixture(MirrorConfig {
        page_size: 2,
        ..Default::default()
    })
    .await;
    for i in 0..5 {
        f.remote.put_record(
            MODULE,
            &format!("10{i}"),
            contact(&format!("Name{i}"), "x@example.com"),
        );
    }
    f.remote.fail_list_page(MODULE, 3);

    let err = pull(&f, PullMode::Incremental).await.unwrap_err();
    assert!(matches!(err, SyncError::RemoteFetch { ref module, .. } if module == MODULE));
    assert_eq!(f.store.rows(TABLE).await.len(), 4);

    let saved: Option<PullCheckpoint> = CheckpointManager::new(&f.store)
        .load(&PullCheckpoint::records_id(TABLE))
        .await?;
    assert_eq!(saved, Some(PullCheckpoint { modified_since: None, page: 3 }));

    let calls_before = f.remote.list_calls().len();
    let counts = pull(&f, PullMode::Incremental).await?;
    assert_eq!(counts.inserted, 1);
    assert_eq!(f.store.rows(TABLE).await.len(), 5);

    let resumed = &f.remote.list_calls()[calls_before].1;
    assert_eq!(resumed.page, 3);
    assert_eq!(resumed.modified_since, None);
    Ok(())
}

#[tokio::test]
async fn test_freshest_time_is_persisted_after_exhaustion() -> Result<()> {
    let f = fixture(MirrorConfig::default()).await;
    f.remote.put_record(MODULE, "1001", contact("Smith", "smith@example.com"));
    f.remote.put_record(MODULE, "1002", contact("Jones", "jones@example.com"));
    let freshest = f.remote.now();

    pull(&f, PullMode::Incremental).await?;
    let saved: Option<PullCheckpoint> = CheckpointManager::new(&f.store)
        .load(&PullCheckpoint::records_id(TABLE))
        .await?;
    assert_eq!(saved, Some(PullCheckpoint::first_page(Some(freshest))));

    pull(&f, PullMode::Incremental).await?;
    let last = f.remote.list_calls().last().cloned().unwrap().1;
    assert_eq!(last.modified_since, Some(freshest));
    assert_eq!(last.page, 1);
    assert_eq!(last.sort_by, "Modified_Time");
    Ok(())
}

#[tokio::test]
async fn test_missing_checkpoint_derives_from_table() -> Result<()> {
    let f = fixture(MirrorConfig::default()).await;
    f.remote.put_record(MODULE, "1001", contact("Smith", "smith@example.com"));
    pull(&f, PullMode::Incremental).await?;
    let latest = f.remote.now();

    // Same table, no persisted progress.
    let empty = MemoryStore::new();
    assert!(empty
        .read_checkpoint(&PullCheckpoint::records_id(TABLE))
        .await?
        .is_none());
    PullEngine::new(&f.store, &f.remote, &empty, &f.config, &[])
        .pull(&f.module, PullMode::Incremental)
        .await?;

    let last = f.remote.list_calls().last().cloned().unwrap().1;
    assert_eq!(last.modified_since, Some(latest + Duration::seconds(1)));
    Ok(())
}

#[tokio::test]
async fn test_full_pull_ignores_checkpoint() -> Result<()> {
    let f = fixture(MirrorConfig::default()).await;
    f.remote.put_record(MODULE, "1001", contact("Smith", "smith@example.com"));
    pull(&f, PullMode::Incremental).await?;

    let counts = pull(&f, PullMode::Full).await?;
    assert_eq!(counts.updated, 1);
    let last = f.remote.list_calls().last().cloned().unwrap().1;
    assert_eq!(last.modified_since, None);
    Ok(())
}

#[tokio::test]
async fn test_modified_since_override_wins() -> Result<()> {
    let f = fixture(MirrorConfig::default()).await;
    f.remote.put_record(MODULE, "1001", contact("Smith", "smith@example.com"));
    let since = f.remote.now() + Duration::seconds(1);
    f.remote.put_record(MODULE, "1002", contact("Jones", "jones@example.com"));

    let config = MirrorConfig {
        modified_since: Some(since),
        ..Default::default()
    };
    let counts = PullEngine::new(&f.store, &f.remote, &f.store, &config, &[])
        .pull(&f.module, PullMode::Full)
        .await?;

    assert_eq!(counts.inserted, 1);
    assert!(f.store.row_by_id(TABLE, "1002").await.is_some());
    assert!(f.store.row_by_id(TABLE, "1001").await.is_none());
    Ok(())
}

// ============================================================================
// Deletions
// ============================================================================

#[tokio::test]
async fn test_remote_deletion_removes_row_without_echo() -> Result<()> {
    let f = fixture(MirrorConfig::default()).await;
    f.remote.put_record(MODULE, "1001", contact("Smith", "smith@example.com"));
    f.remote.put_record(MODULE, "1002", contact("Jones", "jones@example.com"));
    pull(&f, PullMode::Incremental).await?;
    let uid = f.store.row_by_id(TABLE, "1001").await.unwrap().uid;
    f.store
        .local_update(TABLE, uid, values(&[("email", "pending@example.com".into())]))
        .await?;

    f.remote.remove_record(MODULE, "1001");
    let counts = pull(&f, PullMode::Incremental).await?;

    assert_eq!(counts.deleted, 1);
    assert!(f.store.row_by_id(TABLE, "1001").await.is_none());
    assert!(f.store.row_by_id(TABLE, "1002").await.is_some());
    assert!(f.store.pending_delete_ids(TABLE).await.is_empty());
    assert!(f.store.pending_update_fields_of(TABLE, uid).await.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_full_pull_skips_deletions() -> Result<()> {
    let f = fixture(MirrorConfig::default()).await;
    f.remote.put_record(MODULE, "1001", contact("Smith", "smith@example.com"));
    pull(&f, PullMode::Incremental).await?;

    f.remote.remove_record(MODULE, "1001");
    let counts = pull(&f, PullMode::Full).await?;

    assert_eq!(counts.deleted, 0);
    assert!(f.store.row_by_id(TABLE, "1001").await.is_some());
    Ok(())
}

// ============================================================================
// Listeners
// ============================================================================

#[tokio::test]
async fn test_listener_sees_inserts_and_updates() -> Result<()> {
    let f = fixture(MirrorConfig::default()).await;
    let recorder = Arc::new(RecordingListener::default());
    let listeners: Vec<Arc<dyn ChangeListener>> = vec![recorder.clone()];

    f.remote.put_record(MODULE, "1001", contact("Smith", "smith@example.com"));
    engine(&f, &listeners)
        .pull(&f.module, PullMode::Incremental)
        .await?;
    f.remote.put_record(MODULE, "1001", json!({"Last_Name": "Smythe"}));
    engine(&f, &listeners)
        .pull(&f.module, PullMode::Incremental)
        .await?;

    assert_eq!(
        *recorder.events.lock().unwrap(),
        ["insert zoho_contacts 1001", "update Smith -> Smythe"]
    );
    Ok(())
}

#[tokio::test]
async fn test_listener_error_rolls_back_record() -> Result<()> {
    let f = fixture(MirrorConfig::default()).await;
    let listeners: Vec<Arc<dyn ChangeListener>> = vec![Arc::new(RejectingListener)];
    f.remote.put_record(MODULE, "1001", contact("Smith", "smith@example.com"));

    let err = engine(&f, &listeners)
        .pull(&f.module, PullMode::Incremental)
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Listener { ref table, .. } if table == TABLE));
    assert!(err.chain().ends_with("not today"));
    assert!(f.store.rows(TABLE).await.is_empty());
    Ok(())
}
