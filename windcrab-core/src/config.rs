use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::error::WindowError;

/// Which clock drives window firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TimeDomain {
    /// Watermarks advance progress; processing-time callbacks are ignored.
    #[default]
    EventTime,
    /// Processing-time callbacks advance progress; watermarks are only forwarded.
    ProcessingTime,
}

/// Runtime knobs of a `WindowProcessor`.
///
/// Window shape is not configured here; it arrives as a `WindowSpec`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowProcessorConfig {
    pub time_domain: TimeDomain,
    /// Dirty `(key, window)` entries held in memory before they are spilled
    /// to the keyed-state backend.
    pub write_buffer_capacity: usize,
    /// Span over which the late-drop rate is averaged.
    pub late_drop_rate_span: Duration,
}

impl Default for WindowProcessorConfig {
    fn default() -> Self {
        Self {
            time_domain: TimeDomain::EventTime,
            write_buffer_capacity: 1024,
            late_drop_rate_span: Duration::from_secs(60),
        }
    }
}

impl WindowProcessorConfig {
    pub fn processing_time() -> Self {
        Self::default().with_time_domain(TimeDomain::ProcessingTime)
    }

    pub fn with_time_domain(mut self, time_domain: TimeDomain) -> Self {
        self.time_domain = time_domain;
        self
    }

    pub fn with_write_buffer_capacity(mut self, capacity: usize) -> Self {
        self.write_buffer_capacity = capacity;
        self
    }

    pub fn with_late_drop_rate_span(mut self, span: Duration) -> Self {
        self.late_drop_rate_span = span;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.write_buffer_capacity == 0 {
            return Err(WindowError::InvalidConfig(
                "write_buffer_capacity must be positive".to_string(),
            )
            .into());
        }
        if self.late_drop_rate_span.as_millis() == 0 {
            return Err(WindowError::InvalidConfig(
                "late_drop_rate_span must be at least 1ms".to_string(),
            )
            .into());
        }
        Ok(())
    }
}
