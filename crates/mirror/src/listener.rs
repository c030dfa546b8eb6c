//! Hooks invoked for every record the pull engine applies.

use sync_core::MirrorRow;

/// Identifies the module a pulled record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleContext<'a> {
    /// Remote module name
    pub module: &'a str,
    /// Mirror table name
    pub table: &'a str,
}

/// Observer of pulled records.
///
/// Called inside the record's transaction, after the row was written and
/// before commit. Returning an error rolls the record back and aborts the
/// module's pull.
pub trait ChangeListener: Send + Sync {
    fn on_insert(&self, _row: &MirrorRow, _ctx: &ModuleContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_update(
        &self,
        _new: &MirrorRow,
        _old: &MirrorRow,
        _ctx: &ModuleContext<'_>,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Logs every applied record at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingListener;

impl ChangeListener for LoggingListener {
    fn on_insert(&self, row: &MirrorRow, ctx: &ModuleContext<'_>) -> anyhow::Result<()> {
        tracing::debug!(
            "Pulled new {} record {} into {} (uid {})",
            ctx.module,
            row.id.as_deref().unwrap_or("-"),
            ctx.table,
            row.uid
        );
        Ok(())
    }

    fn on_update(
        &self,
        new: &MirrorRow,
        old: &MirrorRow,
        ctx: &ModuleContext<'_>,
    ) -> anyhow::Result<()> {
        let changed = new
            .values
            .iter()
            .filter(|(column, value)| old.get(column) != *value)
            .count();
        tracing::debug!(
            "Pulled update of {} record {} ({changed} columns changed)",
            ctx.module,
            new.id.as_deref().unwrap_or("-"),
        );
        Ok(())
    }
}
