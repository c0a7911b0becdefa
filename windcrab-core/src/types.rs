use serde::{Deserialize, Serialize};

/// Event time in milliseconds since epoch.
pub type EventTime = i64;

/// Unique identifier for checkpoint barriers.
pub type CheckpointId = u64;

/// Identifier of the key partition a `WindowProcessor` instance owns.
pub type PartitionId = u32;

/// Watermark indicates that no elements with timestamp <= this value will arrive.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct Watermark {
    pub timestamp: EventTime,
}

impl Watermark {
    /// Create a new watermark at the given timestamp.
    pub fn new(timestamp: EventTime) -> Self {
        Self { timestamp }
    }
}

impl std::fmt::Display for Watermark {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Watermark({}ms)", self.timestamp)
    }
}

/// Checkpoint barrier delivered in-band with records and watermarks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Barrier {
    pub checkpoint_id: CheckpointId,
    pub timestamp: EventTime,
}

impl Barrier {
    /// Create a new checkpoint barrier with the given ID.
    pub fn new(checkpoint_id: CheckpointId) -> Self {
        Self {
            checkpoint_id,
            timestamp: 0,
        }
    }

    /// Create a new checkpoint barrier with explicit timestamp.
    pub fn with_timestamp(checkpoint_id: CheckpointId, timestamp: EventTime) -> Self {
        Self {
            checkpoint_id,
            timestamp,
        }
    }
}

/// Whether an incoming record made it into at least one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The record was merged into one or more window accumulators.
    Accepted,
    /// Every window the record maps to has already fired; the record was discarded.
    Dropped,
}

impl ProcessOutcome {
    pub fn is_dropped(self) -> bool {
        matches!(self, ProcessOutcome::Dropped)
    }
}

/// Trait bound for keys, payloads and accumulators handled by the engine.
/// Everything that reaches keyed state must be serializable.
pub trait StreamData: Send + Clone + Serialize + for<'de> Deserialize<'de> + 'static {}

// Blanket implementation: any type satisfying the bounds is StreamData.
impl<T> StreamData for T where T: Send + Clone + Serialize + for<'de> Deserialize<'de> + 'static {}
