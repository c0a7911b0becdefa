//! Error taxonomy for the window engine.
//!
//! Public operations return `anyhow::Result`; the variants below travel
//! inside the `anyhow::Error` so a supervisor can classify a failure with
//! `err.downcast_ref::<WindowError>()`.
//!
//! Late records are not errors: they surface as
//! [`ProcessOutcome::Dropped`](crate::types::ProcessOutcome::Dropped) and a
//! counter bump.

use crate::types::EventTime;
use crate::window::TimeWindow;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, thiserror::Error)]
pub enum WindowError {
    /// Malformed `WindowSpec`, rejected at construction.
    #[error("invalid window spec: {0}")]
    InvalidWindowSpec(String),

    /// Malformed `WindowProcessorConfig`, rejected at construction.
    #[error("invalid window processor config: {0}")]
    InvalidConfig(String),

    /// The aggregator failed to create, merge or finalize an accumulator.
    /// The accumulator can no longer be trusted, so the partition halts.
    #[error("aggregation failed for {window}: {source}")]
    Aggregation {
        window: TimeWindow,
        #[source]
        source: BoxError,
    },

    /// The keyed-state collaborator gave up (its retries are exhausted).
    #[error("state backend failure: {0}")]
    StateBackend(#[source] BoxError),

    /// The output sink refused a fired window result.
    #[error("collector rejected window output: {0}")]
    Collector(#[source] BoxError),

    /// The record's timestamp is so close to the `EventTime` bounds that
    /// one of its windows cannot be represented. Only the record is
    /// rejected; the processor keeps running.
    #[error("timestamp {timestamp} has no representable window")]
    TimestampOutOfRange { timestamp: EventTime },

    /// A previous fatal error stopped this processor.
    #[error("window processor halted after a fatal error")]
    Halted,

    /// `close()` was already called.
    #[error("window processor is closed")]
    Closed,
}

impl WindowError {
    pub fn aggregation(window: &TimeWindow, source: anyhow::Error) -> Self {
        Self::Aggregation {
            window: window.clone(),
            source: source.into(),
        }
    }

    pub fn state_backend(source: anyhow::Error) -> Self {
        Self::StateBackend(source.into())
    }

    pub fn collector(source: anyhow::Error) -> Self {
        Self::Collector(source.into())
    }

    /// Return true for failures after which the partition must stop and be
    /// restarted from its last checkpoint.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            WindowError::Aggregation { .. }
                | WindowError::StateBackend(_)
                | WindowError::Collector(_)
        )
    }
}
