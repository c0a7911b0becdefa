use super::*;

/// Drives checkpoints of one partition: snapshot at each barrier, restore
/// from the newest complete checkpoint after a restart.
pub struct CheckpointCoordinator<S: CheckpointStorage> {
    partition_id: PartitionId,
    storage: Arc<S>,
    retained_checkpoints: usize,
    last_checkpoint_id: Option<CheckpointId>,
}

impl<S: CheckpointStorage> CheckpointCoordinator<S> {
    pub fn new(partition_id: PartitionId, storage: Arc<S>) -> Self {
        Self {
            partition_id,
            storage,
            retained_checkpoints: 3,
            last_checkpoint_id: None,
        }
    }

    pub fn with_retained_checkpoints(mut self, retained_checkpoints: usize) -> Self {
        self.retained_checkpoints = retained_checkpoints.max(1);
        self
    }

    pub fn partition_id(&self) -> PartitionId {
        self.partition_id
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    /// Id of the last checkpoint taken or restored by this coordinator.
    pub fn last_checkpoint_id(&self) -> Option<CheckpointId> {
        self.last_checkpoint_id
    }

    /// Checkpoint `target` for `barrier`.
    ///
    /// Barriers must arrive with strictly increasing ids; a stale or
    /// duplicate barrier is rejected without touching `target`.
    pub fn on_barrier<T: Checkpointed>(
        &mut self,
        barrier: Barrier,
        target: &mut T,
    ) -> Result<CheckpointMetadata> {
        if let Some(last) = self.last_checkpoint_id {
            if barrier.checkpoint_id <= last {
                return Err(anyhow!(
                    "out-of-order barrier {} after checkpoint {}",
                    barrier.checkpoint_id,
                    last
                ));
            }
        }

        target.prepare_checkpoint()?;
        let state = target.snapshot_state()?;
        let metadata = CheckpointMetadata {
            checkpoint_id: barrier.checkpoint_id,
            timestamp: barrier.timestamp,
            partition_id: self.partition_id,
            progress: target.checkpoint_progress(),
            state_size: state.len(),
        };

        self.storage
            .save_partition_state(barrier.checkpoint_id, self.partition_id, state)?;
        self.storage.save_metadata(metadata.clone())?;
        self.storage
            .purge(self.partition_id, self.retained_checkpoints)?;
        self.last_checkpoint_id = Some(barrier.checkpoint_id);

        info!(
            checkpoint_id = metadata.checkpoint_id,
            partition_id = metadata.partition_id,
            state_size = metadata.state_size,
            "checkpoint completed"
        );
        Ok(metadata)
    }

    /// Restore `target` from the newest complete checkpoint, if any.
    pub fn restore_latest<T: Checkpointed>(&mut self, target: &mut T) -> Result<Option<CheckpointMetadata>> {
        let Some(checkpoint_id) = self.storage.latest_checkpoint(self.partition_id)? else {
            return Ok(None);
        };
        self.restore_from(checkpoint_id, target).map(Some)
    }

    /// Restore `target` from a specific checkpoint.
    pub fn restore_from<T: Checkpointed>(
        &mut self,
        checkpoint_id: CheckpointId,
        target: &mut T,
    ) -> Result<CheckpointMetadata> {
        let metadata = self.storage.load_metadata(checkpoint_id, self.partition_id)?;
        let state = self
            .storage
            .load_partition_state(checkpoint_id, self.partition_id)?;
        target
            .restore_state(&state)
            .with_context(|| format!("restore from checkpoint {checkpoint_id}"))?;
        self.last_checkpoint_id = Some(checkpoint_id);
        info!(
            checkpoint_id,
            partition_id = self.partition_id,
            "restored from checkpoint"
        );
        Ok(metadata)
    }

    pub fn completed_checkpoint_ids(&self) -> Result<Vec<CheckpointId>> {
        self.storage.list_checkpoints(self.partition_id)
    }
}
