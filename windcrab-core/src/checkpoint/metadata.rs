use super::*;

/// Persisted checkpoint metadata of one partition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckpointMetadata {
    pub checkpoint_id: CheckpointId,
    /// Barrier timestamp.
    pub timestamp: EventTime,
    pub partition_id: PartitionId,
    /// Progress of the partition when the barrier arrived.
    pub progress: EventTime,
    /// Size of the stored state in bytes.
    pub state_size: usize,
}
