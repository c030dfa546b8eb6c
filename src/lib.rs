//! crm-sync library
//!
//! Command-line plumbing shared by the `crm-sync` binary and its tests: the
//! option groups, the modules file and the commands that wire the MySQL
//! store, the HTTP client and the sync runner together.

use clap::Parser;
use crm_sync_mirror::MirrorConfig;
use crm_sync_mysql::SqlLog;
use std::path::PathBuf;

pub mod commands;
pub mod config;

/// Mirror database connection options
#[derive(Parser, Clone, Debug)]
pub struct MySqlOpts {
    /// MySQL connection string of the mirror database
    #[arg(long, env = "CRM_SYNC_MYSQL_URI")]
    pub mysql_uri: String,

    /// Log executed SQL statements (debug level, target crm_sync::sql)
    #[arg(long)]
    pub log_sql: bool,

    /// Also log bound SQL parameters; implies --log-sql
    #[arg(long)]
    pub log_sql_params: bool,
}

impl MySqlOpts {
    pub fn sql_log(&self) -> SqlLog {
        SqlLog {
            statements: self.log_sql || self.log_sql_params,
            params: self.log_sql_params,
        }
    }
}

/// Remote CRM API options
#[derive(Parser, Clone, Debug)]
pub struct RemoteOpts {
    /// Base URL of the CRM REST API
    #[arg(
        long,
        default_value = "https://www.zohoapis.com/crm/v2",
        env = "CRM_API_BASE_URL"
    )]
    pub api_base_url: String,

    /// OAuth access token
    #[arg(long, env = "CRM_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,
}

/// Options controlling what is synced and how
#[derive(Parser, Clone, Debug)]
pub struct SyncOpts {
    /// YAML file describing the mirrored modules and their fields
    #[arg(long, default_value = "modules.yaml")]
    pub modules_file: PathBuf,

    /// Only process this module (repeatable)
    #[arg(long = "module")]
    pub modules: Vec<String>,

    /// Prefix of mirror table names
    #[arg(long, default_value = "zoho_")]
    pub table_prefix: String,

    /// Records per remote page
    #[arg(long, default_value = "200")]
    pub page_size: u32,

    /// Records per push batch
    #[arg(long, default_value = "100")]
    pub batch_size: usize,

    /// Pull records modified since this time, ignoring checkpoints
    /// (RFC 3339 or YYYY-MM-DD)
    #[arg(long)]
    pub modified_since: Option<String>,

    /// Keep processing the next module after a module failed
    #[arg(long)]
    pub continue_on_error: bool,

    /// Mirror only: no change capture and no push
    #[arg(long)]
    pub one_way: bool,

    /// Re-install change-capture triggers even when the schema is unchanged
    #[arg(long)]
    pub force_triggers: bool,

    /// Keep pull checkpoints in this directory instead of the sync_progress table
    #[arg(long)]
    pub checkpoint_dir: Option<PathBuf>,
}

impl SyncOpts {
    /// Engine configuration for these options.
    pub fn mirror_config(&self) -> anyhow::Result<MirrorConfig> {
        if self.page_size == 0 {
            anyhow::bail!("--page-size must be greater than zero");
        }
        if self.batch_size == 0 {
            anyhow::bail!("--batch-size must be greater than zero");
        }
        let modified_since = self
            .modified_since
            .as_deref()
            .map(config::parse_modified_since)
            .transpose()?;

        Ok(MirrorConfig {
            table_prefix: self.table_prefix.clone(),
            page_size: self.page_size,
            batch_size: self.batch_size,
            two_way: !self.one_way,
            continue_on_error: self.continue_on_error,
            force_triggers: self.force_triggers,
            modified_since,
            ..MirrorConfig::default()
        })
    }
}
