use super::*;

/// Checkpointed form of a [`WindowProcessor`].
///
/// Timers are not stored: every live window entry carries its firing time,
/// and the trigger clock is rebuilt from the entries on restore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorSnapshot {
    pub progress: EventTime,
    pub last_triggered_processing_time: EventTime,
    /// Highest watermark forwarded in the processing-time domain.
    pub forwarded_watermark: EventTime,
    /// Keyed-state backend snapshot.
    pub state: Vec<u8>,
}

impl ProcessorSnapshot {
    pub fn encode(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).context("encode processor snapshot")
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).context("decode processor snapshot")
    }

    /// Progress recorded in an encoded snapshot, without restoring it.
    pub fn progress_of(bytes: &[u8]) -> Result<EventTime> {
        Ok(Self::decode(bytes)?.progress)
    }
}
