use super::*;

/// Source of processing time (wall-clock milliseconds).
///
/// The engine never sleeps on it; it is read for processing-time record
/// stamping and for the watermark-lag gauge.
pub trait ProcessingTimeService: Send + Sync {
    fn now(&self) -> EventTime;
}

/// Reads `SystemTime::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProcessingTime;

impl ProcessingTimeService for SystemProcessingTime {
    fn now(&self) -> EventTime {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as EventTime)
            .unwrap_or(0)
    }
}

/// Manually driven clock for tests and replay. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualProcessingTime {
    now: Arc<AtomicI64>,
}

impl ManualProcessingTime {
    pub fn new(start: EventTime) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(start)),
        }
    }

    pub fn set(&self, now: EventTime) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance_by(&self, delta_ms: i64) {
        self.now.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl ProcessingTimeService for ManualProcessingTime {
    fn now(&self) -> EventTime {
        self.now.load(Ordering::SeqCst)
    }
}
