use super::*;

/// Durable home of partition checkpoints.
///
/// A checkpoint is complete for a partition once its metadata is saved;
/// `list_checkpoints` only returns complete ones.
pub trait CheckpointStorage: Send + Sync {
    fn save_partition_state(
        &self,
        checkpoint_id: CheckpointId,
        partition_id: PartitionId,
        state: Vec<u8>,
    ) -> Result<()>;
    fn save_metadata(&self, metadata: CheckpointMetadata) -> Result<()>;
    fn load_metadata(
        &self,
        checkpoint_id: CheckpointId,
        partition_id: PartitionId,
    ) -> Result<CheckpointMetadata>;
    fn load_partition_state(
        &self,
        checkpoint_id: CheckpointId,
        partition_id: PartitionId,
    ) -> Result<Vec<u8>>;
    /// Complete checkpoints of `partition_id`, ascending.
    fn list_checkpoints(&self, partition_id: PartitionId) -> Result<Vec<CheckpointId>>;
    /// Drop all but the newest `keep_last_n` checkpoints of `partition_id`.
    fn purge(&self, partition_id: PartitionId, keep_last_n: usize) -> Result<()>;

    fn latest_checkpoint(&self, partition_id: PartitionId) -> Result<Option<CheckpointId>> {
        Ok(self.list_checkpoints(partition_id)?.last().copied())
    }
}

type Slot = (CheckpointId, PartitionId);

/// In-memory checkpoint storage for tests and local single-process execution.
#[derive(Default)]
pub struct InMemoryCheckpointStorage {
    metadata: Mutex<BTreeMap<Slot, CheckpointMetadata>>,
    states: Mutex<BTreeMap<Slot, Vec<u8>>>,
}

impl InMemoryCheckpointStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned(what: &str) -> anyhow::Error {
    anyhow!("checkpoint {what} lock poisoned")
}

impl CheckpointStorage for InMemoryCheckpointStorage {
    fn save_partition_state(
        &self,
        checkpoint_id: CheckpointId,
        partition_id: PartitionId,
        state: Vec<u8>,
    ) -> Result<()> {
        self.states
            .lock()
            .map_err(|_| poisoned("state"))?
            .insert((checkpoint_id, partition_id), state);
        Ok(())
    }

    fn save_metadata(&self, metadata: CheckpointMetadata) -> Result<()> {
        self.metadata
            .lock()
            .map_err(|_| poisoned("metadata"))?
            .insert((metadata.checkpoint_id, metadata.partition_id), metadata);
        Ok(())
    }

    fn load_metadata(
        &self,
        checkpoint_id: CheckpointId,
        partition_id: PartitionId,
    ) -> Result<CheckpointMetadata> {
        self.metadata
            .lock()
            .map_err(|_| poisoned("metadata"))?
            .get(&(checkpoint_id, partition_id))
            .cloned()
            .ok_or_else(|| {
                anyhow!("checkpoint {checkpoint_id} not found for partition {partition_id}")
            })
    }

    fn load_partition_state(
        &self,
        checkpoint_id: CheckpointId,
        partition_id: PartitionId,
    ) -> Result<Vec<u8>> {
        self.states
            .lock()
            .map_err(|_| poisoned("state"))?
            .get(&(checkpoint_id, partition_id))
            .cloned()
            .ok_or_else(|| {
                anyhow!("state of partition {partition_id} not found for checkpoint {checkpoint_id}")
            })
    }

    fn list_checkpoints(&self, partition_id: PartitionId) -> Result<Vec<CheckpointId>> {
        Ok(self
            .metadata
            .lock()
            .map_err(|_| poisoned("metadata"))?
            .keys()
            .filter(|(_, p)| *p == partition_id)
            .map(|(id, _)| *id)
            .collect())
    }

    fn purge(&self, partition_id: PartitionId, keep_last_n: usize) -> Result<()> {
        let ids = self.list_checkpoints(partition_id)?;
        if ids.len() <= keep_last_n {
            return Ok(());
        }
        let purge_count = ids.len() - keep_last_n;

        let mut meta_guard = self.metadata.lock().map_err(|_| poisoned("metadata"))?;
        let mut state_guard = self.states.lock().map_err(|_| poisoned("state"))?;
        for checkpoint_id in ids.into_iter().take(purge_count) {
            meta_guard.remove(&(checkpoint_id, partition_id));
            state_guard.remove(&(checkpoint_id, partition_id));
        }
        Ok(())
    }
}

/// File-system checkpoint storage.
///
/// Layout: `<base>/chk-<id>/partition-<p>.bin` for state and
/// `<base>/chk-<id>/partition-<p>.meta` for metadata. Files are written to a
/// temporary name and renamed into place.
pub struct FsCheckpointStorage {
    base_path: PathBuf,
}

impl FsCheckpointStorage {
    pub fn new(base_path: impl Into<PathBuf>) -> Result<Self> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path).with_context(|| {
            format!(
                "failed to create checkpoint storage directory {}",
                base_path.display()
            )
        })?;
        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn checkpoint_dir(&self, checkpoint_id: CheckpointId) -> PathBuf {
        self.base_path.join(format!("chk-{checkpoint_id}"))
    }

    fn state_path(&self, checkpoint_id: CheckpointId, partition_id: PartitionId) -> PathBuf {
        self.checkpoint_dir(checkpoint_id)
            .join(format!("partition-{partition_id}.bin"))
    }

    fn metadata_path(&self, checkpoint_id: CheckpointId, partition_id: PartitionId) -> PathBuf {
        self.checkpoint_dir(checkpoint_id)
            .join(format!("partition-{partition_id}.meta"))
    }

    fn write_atomically(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create checkpoint dir {}", dir.display()))?;
        }
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, bytes).with_context(|| format!("write {} failed", tmp.display()))?;
        fs::rename(&tmp, path).with_context(|| format!("rename to {} failed", path.display()))
    }

    fn checkpoint_ids(&self) -> Result<Vec<CheckpointId>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.base_path)
            .with_context(|| format!("read_dir failed for {}", self.base_path.display()))?
        {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(id) = name
                .strip_prefix("chk-")
                .and_then(|id| id.parse::<CheckpointId>().ok())
            {
                ids.push(id);
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }
}

impl CheckpointStorage for FsCheckpointStorage {
    fn save_partition_state(
        &self,
        checkpoint_id: CheckpointId,
        partition_id: PartitionId,
        state: Vec<u8>,
    ) -> Result<()> {
        self.write_atomically(&self.state_path(checkpoint_id, partition_id), &state)
            .context("write checkpoint partition state failed")
    }

    fn save_metadata(&self, metadata: CheckpointMetadata) -> Result<()> {
        let bytes =
            bincode::serialize(&metadata).context("serialize checkpoint metadata failed")?;
        self.write_atomically(
            &self.metadata_path(metadata.checkpoint_id, metadata.partition_id),
            &bytes,
        )
        .context("write checkpoint metadata failed")
    }

    fn load_metadata(
        &self,
        checkpoint_id: CheckpointId,
        partition_id: PartitionId,
    ) -> Result<CheckpointMetadata> {
        let bytes = fs::read(self.metadata_path(checkpoint_id, partition_id))
            .context("read checkpoint metadata failed")?;
        bincode::deserialize(&bytes).context("deserialize checkpoint metadata failed")
    }

    fn load_partition_state(
        &self,
        checkpoint_id: CheckpointId,
        partition_id: PartitionId,
    ) -> Result<Vec<u8>> {
        fs::read(self.state_path(checkpoint_id, partition_id))
            .context("read checkpoint partition state failed")
    }

    fn list_checkpoints(&self, partition_id: PartitionId) -> Result<Vec<CheckpointId>> {
        Ok(self
            .checkpoint_ids()?
            .into_iter()
            .filter(|id| self.metadata_path(*id, partition_id).is_file())
            .collect())
    }

    fn purge(&self, partition_id: PartitionId, keep_last_n: usize) -> Result<()> {
        let ids = self.list_checkpoints(partition_id)?;
        if ids.len() <= keep_last_n {
            return Ok(());
        }
        let purge_count = ids.len() - keep_last_n;
        for checkpoint_id in ids.into_iter().take(purge_count) {
            for path in [
                self.metadata_path(checkpoint_id, partition_id),
                self.state_path(checkpoint_id, partition_id),
            ] {
                if path.exists() {
                    fs::remove_file(&path)
                        .with_context(|| format!("failed to remove {}", path.display()))?;
                }
            }
            // Other partitions may still use the directory
            let dir = self.checkpoint_dir(checkpoint_id);
            if fs::read_dir(&dir)?.next().is_none() {
                fs::remove_dir(&dir)
                    .with_context(|| format!("failed to remove {}", dir.display()))?;
            }
        }
        Ok(())
    }
}
