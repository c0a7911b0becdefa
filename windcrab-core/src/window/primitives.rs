use super::*;

/// A half-open event-time window `[start, end)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: EventTime,
    pub end: EventTime,
}

impl TimeWindow {
    pub fn new(start: EventTime, end: EventTime) -> Self {
        debug_assert!(start < end, "window start must precede its end");
        Self { start, end }
    }

    /// The maximum timestamp that belongs to this window.
    /// A window with no allowed lateness fires once progress reaches this value.
    pub fn max_timestamp(&self) -> EventTime {
        self.end - 1
    }

    /// Return true if `timestamp` falls inside this window.
    pub fn contains(&self, timestamp: EventTime) -> bool {
        timestamp >= self.start && timestamp < self.end
    }

    /// Session windows merge when they overlap or touch.
    pub fn intersects(&self, other: &TimeWindow) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// Smallest window spanning both `self` and `other`.
    pub fn cover(&self, other: &TimeWindow) -> TimeWindow {
        TimeWindow::new(self.start.min(other.start), self.end.max(other.end))
    }
}

impl std::fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TimeWindow([{}, {}))", self.start, self.end)
    }
}

/// Shape of the windows a stream is cut into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WindowKind {
    /// Fixed-size, non-overlapping windows.
    Tumbling { size_ms: i64 },
    /// Fixed-size windows starting every `slide_ms`; they overlap when `slide < size`.
    Hopping { size_ms: i64, slide_ms: i64 },
    /// Windows anchored at a `max_size_ms` boundary that grow by `step_ms`
    /// until they reach `max_size_ms`. Each step fires on its own.
    Cumulating { max_size_ms: i64, step_ms: i64 },
    /// Gap-based windows built by merging `[ts, ts + gap_ms)` candidates.
    Session { gap_ms: i64 },
}

/// Static window policy handed to the engine by the query planner.
///
/// ```
/// use std::time::Duration;
/// use windcrab_core::window::WindowSpec;
///
/// let spec = WindowSpec::hopping(Duration::from_secs(10), Duration::from_secs(5))
///     .with_allowed_lateness(Duration::from_secs(1));
/// assert_eq!(spec.allowed_lateness_ms, 1_000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSpec {
    pub kind: WindowKind,
    /// Alignment offset for tumbling, hopping and cumulating windows.
    pub offset_ms: i64,
    /// Delay added to every window's firing time.
    pub allowed_lateness_ms: i64,
    /// First builder argument whose `Duration` did not fit in `i64`
    /// milliseconds; reported by `validate`.
    #[serde(skip)]
    oversized: Option<&'static str>,
}

impl WindowSpec {
    fn of(kind: WindowKind) -> Self {
        Self {
            kind,
            offset_ms: 0,
            allowed_lateness_ms: 0,
            oversized: None,
        }
    }

    fn millis(&mut self, what: &'static str, duration: Duration) -> i64 {
        i64::try_from(duration.as_millis()).unwrap_or_else(|_| {
            if self.oversized.is_none() {
                self.oversized = Some(what);
            }
            i64::MAX
        })
    }

    pub fn tumbling(size: Duration) -> Self {
        let mut spec = Self::of(WindowKind::Tumbling { size_ms: 0 });
        let size_ms = spec.millis("tumbling size", size);
        spec.kind = WindowKind::Tumbling { size_ms };
        spec
    }

    pub fn hopping(size: Duration, slide: Duration) -> Self {
        let mut spec = Self::of(WindowKind::Hopping {
            size_ms: 0,
            slide_ms: 0,
        });
        let size_ms = spec.millis("hopping size", size);
        let slide_ms = spec.millis("hopping slide", slide);
        spec.kind = WindowKind::Hopping { size_ms, slide_ms };
        spec
    }

    pub fn cumulating(max_size: Duration, step: Duration) -> Self {
        let mut spec = Self::of(WindowKind::Cumulating {
            max_size_ms: 0,
            step_ms: 0,
        });
        let max_size_ms = spec.millis("cumulating max size", max_size);
        let step_ms = spec.millis("cumulating step", step);
        spec.kind = WindowKind::Cumulating {
            max_size_ms,
            step_ms,
        };
        spec
    }

    pub fn session(gap: Duration) -> Self {
        let mut spec = Self::of(WindowKind::Session { gap_ms: 0 });
        let gap_ms = spec.millis("session gap", gap);
        spec.kind = WindowKind::Session { gap_ms };
        spec
    }

    pub fn with_offset(mut self, offset: Duration) -> Self {
        self.offset_ms = self.millis("offset", offset);
        self
    }

    pub fn with_allowed_lateness(mut self, lateness: Duration) -> Self {
        self.allowed_lateness_ms = self.millis("allowed lateness", lateness);
        self
    }

    /// Reject specs that cannot produce well-formed windows.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| -> Result<()> { Err(WindowError::InvalidWindowSpec(msg).into()) };

        if let Some(what) = self.oversized {
            return invalid(format!("{what} does not fit in i64 milliseconds"));
        }

        if self.allowed_lateness_ms < 0 {
            return invalid(format!(
                "allowed lateness must not be negative, got {}ms",
                self.allowed_lateness_ms
            ));
        }

        match self.kind {
            WindowKind::Tumbling { size_ms } => {
                if size_ms <= 0 {
                    return invalid(format!("tumbling size must be positive, got {size_ms}ms"));
                }
                if !(0..size_ms).contains(&self.offset_ms) {
                    return invalid(format!(
                        "tumbling offset must be in [0, {size_ms}), got {}ms",
                        self.offset_ms
                    ));
                }
            }
            WindowKind::Hopping { size_ms, slide_ms } => {
                if size_ms <= 0 || slide_ms <= 0 {
                    return invalid(format!(
                        "hopping size and slide must be positive, got size={size_ms}ms slide={slide_ms}ms"
                    ));
                }
                if slide_ms > size_ms || size_ms % slide_ms != 0 {
                    return invalid(format!(
                        "hopping size ({size_ms}ms) must be a multiple of slide ({slide_ms}ms)"
                    ));
                }
                if !(0..slide_ms).contains(&self.offset_ms) {
                    return invalid(format!(
                        "hopping offset must be in [0, {slide_ms}), got {}ms",
                        self.offset_ms
                    ));
                }
            }
            WindowKind::Cumulating {
                max_size_ms,
                step_ms,
            } => {
                if max_size_ms <= 0 || step_ms <= 0 {
                    return invalid(format!(
                        "cumulating max size and step must be positive, got max_size={max_size_ms}ms step={step_ms}ms"
                    ));
                }
                if max_size_ms % step_ms != 0 {
                    return invalid(format!(
                        "cumulating max size ({max_size_ms}ms) must be a multiple of step ({step_ms}ms)"
                    ));
                }
                if !(0..max_size_ms).contains(&self.offset_ms) {
                    return invalid(format!(
                        "cumulating offset must be in [0, {max_size_ms}), got {}ms",
                        self.offset_ms
                    ));
                }
            }
            WindowKind::Session { gap_ms } => {
                if gap_ms <= 0 {
                    return invalid(format!("session gap must be positive, got {gap_ms}ms"));
                }
                if self.offset_ms != 0 {
                    return invalid("session windows do not support an offset".to_string());
                }
            }
        }
        Ok(())
    }
}
