//! Runs configured through the CLI options and a modules file.

use anyhow::Result;
use checkpoint::{CheckpointStore, FilesystemStore};
use clap::Parser;
use crm_sync::config::ModulesFile;
use crm_sync::SyncOpts;
use crm_sync_mirror::testing::{FakeRemote, MemoryStore};
use crm_sync_mirror::{Operation, PullCheckpoint, PullMode, SyncRunner};
use serde_json::json;
use std::path::Path;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const MODULES: &str = r#"
modules:
  - module: Leads
    fields:
      - { name: company, type: Text, max_length: 120, remote_name: Company }
      - { name: status, type: Pick List, remote_name: Lead_Status }
      - { name: modifiedTime, type: DateTime, remote_name: Modified_Time, read_only: true }
  - module: Deals
    fields:
      - { name: dealName, type: Text, remote_name: Deal_Name }
      - { name: modifiedTime, type: DateTime, remote_name: Modified_Time, read_only: true }
"#;

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

fn opts(dir: &Path, extra: &[&str]) -> Result<SyncOpts> {
    let modules_file = dir.join("modules.yaml");
    std::fs::write(&modules_file, MODULES)?;
    let checkpoint_dir = dir.join("checkpoints");

    let mut args = vec![
        "crm-sync".to_string(),
        "--modules-file".to_string(),
        modules_file.display().to_string(),
        "--checkpoint-dir".to_string(),
        checkpoint_dir.display().to_string(),
    ];
    args.extend(extra.iter().map(|a| a.to_string()));
    Ok(SyncOpts::try_parse_from(args)?)
}

#[tokio::test]
async fn test_second_run_resumes_from_checkpoint_files() -> Result<()> {
    init_logging();
    let dir = tempfile::tempdir()?;
    let opts = opts(dir.path(), &["--module", "Leads"])?;
    let config = opts.mirror_config()?;
    let modules = ModulesFile::load(&opts.modules_file)?.into_specs(&opts.modules)?;
    let checkpoint_dir = opts.checkpoint_dir.clone().unwrap();

    let store = MemoryStore::new();
    let remote = FakeRemote::new("Modified_Time");
    remote.put_record("Leads", "1", json!({"Company": "Acme", "Lead_Status": "New"}));

    let checkpoints = FilesystemStore::new(checkpoint_dir.clone());
    let report = SyncRunner::new(&store, &remote, &checkpoints, &config)
        .run(&modules, Operation::Sync)
        .await;
    assert!(report.is_success());
    assert_eq!(store.rows("zoho_leads").await.len(), 1);

    let stored = checkpoints
        .read_checkpoint(&PullCheckpoint::records_id("zoho_leads"))
        .await?
        .unwrap();
    assert_eq!(stored.checkpoint_type, "crm-pull");

    // A new process reads the same directory.
    remote.put_record("Leads", "2", json!({"Company": "Globex", "Lead_Status": "New"}));
    let checkpoints = FilesystemStore::new(checkpoint_dir);
    let report = SyncRunner::new(&store, &remote, &checkpoints, &config)
        .run(&modules, Operation::Sync)
        .await;
    assert!(report.is_success());
    let outcome = report.modules[0].result.as_ref().unwrap();
    assert_eq!(outcome.pull.unwrap().inserted, 1);
    assert_eq!(store.rows("zoho_leads").await.len(), 2);

    let (_, last_query) = remote.list_calls().pop().unwrap();
    assert!(last_query.modified_since.is_some());
    Ok(())
}

#[tokio::test]
async fn test_module_filter_limits_the_run() -> Result<()> {
    init_logging();
    let dir = tempfile::tempdir()?;
    let opts = opts(dir.path(), &["--module", "Deals", "--one-way"])?;
    let config = opts.mirror_config()?;
    let modules = ModulesFile::load(&opts.modules_file)?.into_specs(&opts.modules)?;
    assert_eq!(modules.len(), 1);

    let store = MemoryStore::new();
    let remote = FakeRemote::new("Modified_Time");
    remote.put_record("Deals", "10", json!({"Deal_Name": "Renewal"}));
    remote.put_record("Leads", "1", json!({"Company": "Acme"}));

    let checkpoints = FilesystemStore::new(opts.checkpoint_dir.clone().unwrap());
    let report = SyncRunner::new(&store, &remote, &checkpoints, &config)
        .run(&modules, Operation::Pull(PullMode::Incremental))
        .await;
    assert!(report.is_success());
    assert_eq!(store.rows("zoho_deals").await.len(), 1);
    assert!(store.rows("zoho_leads").await.is_empty());
    assert!(remote.list_calls().iter().all(|(module, _)| module == "Deals"));
    Ok(())
}

#[tokio::test]
async fn test_unknown_field_type_fails_only_its_module() -> Result<()> {
    init_logging();
    let yaml = r#"
modules:
  - module: Notes
    fields:
      - { name: body, type: Rich Text }
      - { name: modifiedTime, type: DateTime, remote_name: Modified_Time, read_only: true }
  - module: Leads
    fields:
      - { name: company, type: Text, remote_name: Company }
      - { name: modifiedTime, type: DateTime, remote_name: Modified_Time, read_only: true }
"#;
    let modules = ModulesFile::parse(yaml)?.into_specs(&[])?;
    let dir = tempfile::tempdir()?;
    let opts = opts(dir.path(), &["--continue-on-error"])?;
    let config = opts.mirror_config()?;

    let store = MemoryStore::new();
    let remote = FakeRemote::new("Modified_Time");
    remote.put_record("Leads", "1", json!({"Company": "Acme"}));

    let report = SyncRunner::new(&store, &remote, &store, &config)
        .run(&modules, Operation::Sync)
        .await;
    assert!(!report.is_success());
    let failed: Vec<_> = report.failures().map(|(module, _)| module).collect();
    assert_eq!(failed, ["Notes"]);
    assert_eq!(store.rows("zoho_leads").await.len(), 1);
    Ok(())
}
