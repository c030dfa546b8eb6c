//! Subcommand implementations.

use anyhow::{Context, Result};
use checkpoint::{CheckpointStore, FilesystemStore};
use crm_sync_mirror::{
    LoggingListener, MirrorStore, ModuleOutcome, Operation, PoisonedEntry, RunReport, SyncRunner,
};
use crm_sync_mysql::{
    new_mysql_pool, sanitize_connection_string, MySqlCheckpointStore, MySqlStore, RunLock,
};
use crm_sync_remote_client::HttpRemoteClient;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::ModulesFile;
use crate::{MySqlOpts, RemoteOpts, SyncOpts};

/// Run `operation` over the configured modules while holding the run lock.
pub async fn run_operation(
    mysql: &MySqlOpts,
    remote: &RemoteOpts,
    sync: &SyncOpts,
    operation: Operation,
) -> Result<RunReport> {
    let config = sync.mirror_config()?;
    let modules = ModulesFile::load(&sync.modules_file)?.into_specs(&sync.modules)?;
    if modules.is_empty() {
        anyhow::bail!("No modules to process in {}", sync.modules_file.display());
    }

    let token = match (&remote.access_token, operation) {
        (Some(token), _) => token.as_str(),
        // Trigger provisioning never calls the remote API.
        (None, Operation::ProvisionTriggers) => "",
        (None, _) => anyhow::bail!("--access-token (or CRM_ACCESS_TOKEN) is required"),
    };
    let client = HttpRemoteClient::new(&remote.api_base_url, token)?;

    info!(
        "Connecting to MySQL at {}",
        sanitize_connection_string(&mysql.mysql_uri)
    );
    let pool = new_mysql_pool(&mysql.mysql_uri)?;
    let lock = RunLock::try_acquire(&pool, crm_sync_mysql::lock::DEFAULT_LOCK_NAME)
        .await?
        .context("Another crm-sync run is in progress")?;

    let store = MySqlStore::new(pool.clone()).with_sql_log(mysql.sql_log());
    let checkpoints: Box<dyn CheckpointStore> = match &sync.checkpoint_dir {
        Some(dir) => Box::new(FilesystemStore::new(dir.clone())),
        None => {
            let store = MySqlCheckpointStore::new(pool.clone()).with_sql_log(mysql.sql_log());
            if let Err(e) = store.ensure_table().await {
                lock.release().await?;
                return Err(e);
            }
            Box::new(store)
        }
    };

    let runner = SyncRunner::new(&store, &client, checkpoints.as_ref(), &config)
        .with_listener(Arc::new(LoggingListener));
    let report = runner.run(&modules, operation).await;
    log_report(&report);

    lock.release().await?;
    pool.disconnect().await?;
    Ok(report)
}

fn log_report(report: &RunReport) {
    for module in &report.modules {
        match &module.result {
            Ok(outcome) => info!("{}: {}", module.module, describe(outcome)),
            Err(e) => error!("{}: failed: {}", module.module, e.chain()),
        }
    }

    let failed = report.failed_records();
    if failed > 0 {
        warn!("{failed} records could not be pushed; see `crm-sync errors`");
    }
}

fn describe(outcome: &ModuleOutcome) -> String {
    let mut parts = Vec::new();
    if outcome.schema_changed {
        parts.push("schema updated".to_string());
    }
    if let Some(pull) = &outcome.pull {
        parts.push(format!(
            "pulled {} new, {} updated, {} deleted",
            pull.inserted, pull.updated, pull.deleted
        ));
        if pull.skipped > 0 {
            parts.push(format!("{} pulled updates skipped", pull.skipped));
        }
    }
    if let Some(push) = &outcome.push {
        parts.push(format!(
            "pushed {} inserts, {} updates, {} deletes ({} failed)",
            push.inserts.confirmed,
            push.updates.confirmed,
            push.deletes.confirmed,
            push.failed()
        ));
    }
    if parts.is_empty() {
        "nothing to do".to_string()
    } else {
        parts.join(", ")
    }
}

/// Print every poisoned shadow row. Returns how many there are.
pub async fn list_errors(mysql: &MySqlOpts) -> Result<usize> {
    let pool = new_mysql_pool(&mysql.mysql_uri)?;
    let store = MySqlStore::new(pool.clone()).with_sql_log(mysql.sql_log());
    let entries = store.poisoned_entries().await?;

    for entry in &entries {
        println!("{}", format_entry(entry));
    }
    if entries.is_empty() {
        println!("No failed records");
    }

    pool.disconnect().await?;
    Ok(entries.len())
}

/// Clear poison marks so the rows are pushed again on the next run.
pub async fn clear_errors(mysql: &MySqlOpts, table: Option<&str>) -> Result<u64> {
    let pool = new_mysql_pool(&mysql.mysql_uri)?;
    let store = MySqlStore::new(pool.clone()).with_sql_log(mysql.sql_log());
    let cleared = store.clear_poison(table).await?;

    match table {
        Some(table) => println!("Cleared {cleared} failed records of {table}"),
        None => println!("Cleared {cleared} failed records"),
    }

    pool.disconnect().await?;
    Ok(cleared)
}

pub fn format_entry(entry: &PoisonedEntry) -> String {
    let target = match (&entry.field_name, &entry.id) {
        (Some(field), _) => format!(" field={field}"),
        (None, Some(id)) => format!(" id={id}"),
        (None, None) => String::new(),
    };
    format!(
        "{}\t{} uid={}{}\t{}\t{}",
        entry.kind.table_name(),
        entry.table_name,
        entry.uid,
        target,
        entry.error_time.format("%Y-%m-%d %H:%M:%S"),
        entry.error
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use crm_sync_mirror::{PullCounts, ShadowKind};

    #[test]
    fn test_format_update_entry() {
        let entry = PoisonedEntry {
            kind: ShadowKind::Update,
            table_name: "zoho_contacts".to_string(),
            uid: 7,
            field_name: Some("email".to_string()),
            id: None,
            error: "INVALID_DATA: invalid email (Email)".to_string(),
            error_time: NaiveDate::from_ymd_opt(2024, 3, 1)
                .unwrap()
                .and_hms_opt(12, 0, 5)
                .unwrap(),
        };
        assert_eq!(
            format_entry(&entry),
            "local_update\tzoho_contacts uid=7 field=email\t2024-03-01 12:00:05\tINVALID_DATA: invalid email (Email)"
        );
    }

    #[test]
    fn test_describe_outcome() {
        assert_eq!(describe(&ModuleOutcome::default()), "nothing to do");

        let outcome = ModuleOutcome {
            schema_changed: true,
            pull: Some(PullCounts {
                inserted: 3,
                updated: 1,
                deleted: 0,
                skipped: 0,
                pages: 1,
            }),
            push: None,
        };
        assert_eq!(
            describe(&outcome),
            "schema updated, pulled 3 new, 1 updated, 0 deleted"
        );

        let outcome = ModuleOutcome {
            schema_changed: false,
            pull: Some(PullCounts {
                updated: 4,
                skipped: 2,
                pages: 1,
                ..Default::default()
            }),
            push: None,
        };
        assert_eq!(
            describe(&outcome),
            "pulled 0 new, 4 updated, 0 deleted, 2 pulled updates skipped"
        );
    }
}
