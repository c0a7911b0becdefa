//! Progress clocks: the per-window trigger clock and the processing-time source.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use ahash::AHashMap;

use crate::types::EventTime;
use crate::window::TimeWindow;

mod processing_time;
mod trigger_clock;

pub use processing_time::*;
pub use trigger_clock::*;

/// Minimum possible event time. Used as the initial "no progress yet" sentinel.
pub const EVENT_TIME_MIN: EventTime = i64::MIN;

/// Maximum possible event time. Used to represent no upper bound.
pub const EVENT_TIME_MAX: EventTime = i64::MAX;

#[cfg(test)]
#[path = "tests/time_tests.rs"]
mod tests;
