//! Typed access to a checkpoint store.

use crate::{store::CheckpointStore, Checkpoint, CheckpointID};

/// Saves and loads typed checkpoints through a [`CheckpointStore`].
///
/// # Example
///
/// ```rust,ignore
/// let manager = CheckpointManager::new(&store);
/// let id = CheckpointID::new("records", "zoho_contacts");
///
/// manager.save(&id, &checkpoint).await?;
/// let loaded: Option<PullCheckpoint> = manager.load(&id).await?;
/// ```
pub struct CheckpointManager<'a> {
    store: &'a dyn CheckpointStore,
}

impl<'a> CheckpointManager<'a> {
    pub fn new(store: &'a dyn CheckpointStore) -> Self {
        Self { store }
    }

    /// Persist a checkpoint, replacing the previous one for `id`.
    pub async fn save<C: Checkpoint + Sync>(
        &self,
        id: &CheckpointID,
        checkpoint: &C,
    ) -> anyhow::Result<()> {
        let data = serde_json::to_string(checkpoint)?;
        self.store
            .store_checkpoint(id, C::CHECKPOINT_TYPE, data)
            .await?;
        tracing::debug!("Saved {id} checkpoint: {}", checkpoint.to_cli_string());
        Ok(())
    }

    /// Load the checkpoint stored for `id`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The stored checkpoint type doesn't match `C::CHECKPOINT_TYPE`
    /// - The checkpoint data can't be deserialized into type `C`
    pub async fn load<C: Checkpoint>(&self, id: &CheckpointID) -> anyhow::Result<Option<C>> {
        let Some(stored) = self.store.read_checkpoint(id).await? else {
            return Ok(None);
        };

        if stored.checkpoint_type != C::CHECKPOINT_TYPE {
            anyhow::bail!(
                "Checkpoint type mismatch for {id}: expected '{}', found '{}'",
                C::CHECKPOINT_TYPE,
                stored.checkpoint_type
            );
        }

        Ok(Some(serde_json::from_str(&stored.checkpoint_data)?))
    }
}
