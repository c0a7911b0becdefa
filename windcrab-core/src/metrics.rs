//! Late-record and progress-lag metrics of a window processor.

use std::collections::VecDeque;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::EventTime;

/// Width of one rate bucket.
const BUCKET_MS: i64 = 1_000;

/// Read-only view of a processor's metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowMetrics {
    /// Records dropped because every window they belonged to had fired.
    pub num_late_records_dropped: u64,
    /// Late drops per second, averaged over the configured span.
    pub late_records_dropped_rate: f64,
    /// Milliseconds between processing time and current progress.
    pub watermark_lag: i64,
}

/// Lag between processing time and progress.
///
/// Zero before the first progress value and while progress is negative.
pub fn watermark_lag(processing_now: EventTime, progress: Option<EventTime>) -> i64 {
    match progress {
        Some(p) if p >= 0 => processing_now.saturating_sub(p).max(0),
        _ => 0,
    }
}

/// Counter plus a rate meter over a sliding span, bucketed per second.
#[derive(Debug, Clone)]
pub struct LateRecordMeter {
    total: u64,
    span_ms: i64,
    /// `(bucket start, drops in bucket)`, oldest first.
    buckets: VecDeque<(EventTime, u64)>,
}

impl LateRecordMeter {
    pub fn new(span: Duration) -> Self {
        Self {
            total: 0,
            span_ms: (span.as_millis() as i64).max(1),
            buckets: VecDeque::new(),
        }
    }

    /// Count one dropped record at processing time `now`.
    pub fn mark(&mut self, now: EventTime) {
        self.total += 1;
        let bucket = now - now.rem_euclid(BUCKET_MS);
        match self.buckets.back_mut() {
            Some((start, count)) if *start == bucket => *count += 1,
            _ => self.buckets.push_back((bucket, 1)),
        }
        self.evict(now);
    }

    pub fn count(&self) -> u64 {
        self.total
    }

    /// Drops per second over the span ending at `now`.
    pub fn rate(&self, now: EventTime) -> f64 {
        let horizon = now - self.span_ms;
        let recent: u64 = self
            .buckets
            .iter()
            .filter(|(start, _)| *start + BUCKET_MS > horizon)
            .map(|(_, count)| count)
            .sum();
        recent as f64 * 1_000.0 / self.span_ms as f64
    }

    fn evict(&mut self, now: EventTime) {
        let horizon = now - self.span_ms;
        while self
            .buckets
            .front()
            .is_some_and(|(start, _)| start + BUCKET_MS <= horizon)
        {
            self.buckets.pop_front();
        }
    }
}
