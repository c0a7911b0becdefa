//! The window processor: one key partition's record, progress and
//! checkpoint entry points.

use std::marker::PhantomData;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, trace, warn};

use crate::checkpoint::Checkpointed;
use crate::collector::{Collector, WindowResult};
use crate::config::{TimeDomain, WindowProcessorConfig};
use crate::error::WindowError;
use crate::metrics::{LateRecordMeter, WindowMetrics, watermark_lag};
use crate::state::{HashMapStateBackend, KeyContext, KeyedStateBackend, WindowState};
use crate::time::{EVENT_TIME_MIN, ProcessingTimeService, SystemProcessingTime, TriggerClock};
use crate::types::{EventTime, ProcessOutcome, StreamData, Watermark};
use crate::window::{Aggregator, TimeWindow, WindowAssigner, WindowSpec};

mod snapshot;
mod window_processor;

pub use snapshot::*;
pub use window_processor::*;

#[cfg(test)]
#[path = "tests/processor_tests.rs"]
mod tests;
