//! Runs the engines over every configured module.

use checkpoint::CheckpointStore;
use std::sync::Arc;
use sync_core::{ModuleSpec, RemoteClient};
use tracing::{error, info, warn};

use crate::config::MirrorConfig;
use crate::error::SyncError;
use crate::listener::ChangeListener;
use crate::module::MirrorModule;
use crate::pull::{PullCounts, PullEngine, PullMode};
use crate::push::{PushEngine, PushSummary};
use crate::schema_sync::SchemaSynchronizer;
use crate::store::MirrorStore;

/// What a run does with each module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Schema sync, incremental pull, then push
    Sync,
    /// Schema sync and pull
    Pull(PullMode),
    /// Push captured local changes only
    Push,
    /// Schema sync with forced trigger installation
    ProvisionTriggers,
}

/// What happened to one module.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleOutcome {
    pub schema_changed: bool,
    pub pull: Option<PullCounts>,
    pub push: Option<PushSummary>,
}

#[derive(Debug)]
pub struct ModuleReport {
    pub module: String,
    pub result: Result<ModuleOutcome, SyncError>,
}

/// Per-module results of a run, in processing order.
///
/// Modules after a failure are missing unless continue-on-error was set.
#[derive(Debug, Default)]
pub struct RunReport {
    pub modules: Vec<ModuleReport>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.modules.iter().all(|m| m.result.is_ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &SyncError)> {
        self.modules
            .iter()
            .filter_map(|m| m.result.as_ref().err().map(|e| (m.module.as_str(), e)))
    }

    /// Records rejected or not convertible during pushes.
    pub fn failed_records(&self) -> usize {
        self.modules
            .iter()
            .filter_map(|m| m.result.as_ref().ok())
            .filter_map(|o| o.push.as_ref())
            .map(PushSummary::failed)
            .sum()
    }
}

/// Processes modules one after another.
pub struct SyncRunner<'a> {
    store: &'a dyn MirrorStore,
    remote: &'a dyn RemoteClient,
    checkpoints: &'a dyn CheckpointStore,
    config: &'a MirrorConfig,
    listeners: Vec<Arc<dyn ChangeListener>>,
}

impl<'a> SyncRunner<'a> {
    pub fn new(
        store: &'a dyn MirrorStore,
        remote: &'a dyn RemoteClient,
        checkpoints: &'a dyn CheckpointStore,
        config: &'a MirrorConfig,
    ) -> Self {
        Self {
            store,
            remote,
            checkpoints,
            config,
            listeners: Vec::new(),
        }
    }

    pub fn with_listener(mut self, listener: Arc<dyn ChangeListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub async fn run(&self, modules: &[ModuleSpec], operation: Operation) -> RunReport {
        let mut report = RunReport::default();

        for (i, spec) in modules.iter().enumerate() {
            info!(
                "Processing module {} ({}/{})",
                spec.module,
                i + 1,
                modules.len()
            );
            let result = self.run_module(spec, operation).await;
            if let Err(e) = &result {
                error!("Module {} failed: {}", spec.module, e.chain());
            }

            let failed = result.is_err();
            report.modules.push(ModuleReport {
                module: spec.module.clone(),
                result,
            });

            if failed && !self.config.continue_on_error {
                let skipped = modules.len() - i - 1;
                if skipped > 0 {
                    warn!("Stopping run; {skipped} modules not processed");
                }
                break;
            }
        }

        report
    }

    async fn run_module(
        &self,
        spec: &ModuleSpec,
        operation: Operation,
    ) -> Result<ModuleOutcome, SyncError> {
        let module = MirrorModule::new(spec, self.config)?;
        let schema = SchemaSynchronizer::new(self.store, self.config);
        let mut outcome = ModuleOutcome::default();

        let pull_mode = match operation {
            Operation::Sync => Some(PullMode::Incremental),
            Operation::Pull(mode) => Some(mode),
            Operation::Push | Operation::ProvisionTriggers => None,
        };

        match operation {
            Operation::ProvisionTriggers => {
                outcome.schema_changed = schema.synchronize(&module, true).await?;
            }
            Operation::Sync | Operation::Pull(_) => {
                outcome.schema_changed = schema
                    .synchronize(&module, self.config.force_triggers)
                    .await?;
            }
            Operation::Push => {}
        }

        if let Some(mode) = pull_mode {
            let engine = PullEngine::new(
                self.store,
                self.remote,
                self.checkpoints,
                self.config,
                &self.listeners,
            );
            outcome.pull = Some(engine.pull(&module, mode).await?);
        }

        if matches!(operation, Operation::Sync | Operation::Push) {
            if self.config.two_way {
                let engine = PushEngine::new(self.store, self.remote, self.config);
                outcome.push = Some(engine.push_all(&module).await?);
            } else {
                info!("Two-way sync disabled; not pushing {}", module.name);
            }
        }

        Ok(outcome)
    }
}
