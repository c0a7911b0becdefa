use super::*;

/// Maps record timestamps to windows and windows to firing times.
///
/// A single tagged type covers every [`WindowKind`]; each arm implements
/// the same `assign_windows` / `firing_time` contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowAssigner {
    spec: WindowSpec,
}

impl WindowAssigner {
    /// Validate `spec` and build an assigner for it.
    pub fn new(spec: WindowSpec) -> Result<Self> {
        spec.validate()?;
        Ok(Self { spec })
    }

    pub fn spec(&self) -> &WindowSpec {
        &self.spec
    }

    /// Whether windows must be merged after assignment (session only).
    pub fn is_merging(&self) -> bool {
        matches!(self.spec.kind, WindowKind::Session { .. })
    }

    /// Return the windows that contain `timestamp`.
    ///
    /// Multi-window kinds return windows in ascending firing order. For
    /// session windows this is the single un-merged candidate.
    ///
    /// Bounds are computed in `i128`; a window reaching outside the
    /// `EventTime` range fails with [`WindowError::TimestampOutOfRange`].
    pub fn assign_windows(&self, timestamp: EventTime) -> Result<Vec<TimeWindow>> {
        let ts = i128::from(timestamp);
        let offset = i128::from(self.spec.offset_ms);
        let bounded = |start: i128, end: i128| -> Result<TimeWindow> {
            match (EventTime::try_from(start), EventTime::try_from(end)) {
                (Ok(start), Ok(end)) => Ok(TimeWindow::new(start, end)),
                _ => Err(WindowError::TimestampOutOfRange { timestamp }.into()),
            }
        };

        match self.spec.kind {
            WindowKind::Tumbling { size_ms } => {
                let size = i128::from(size_ms);
                let start = ts - (ts - offset).rem_euclid(size);
                Ok(vec![bounded(start, start + size)?])
            }
            WindowKind::Hopping { size_ms, slide_ms } => {
                let (size, slide) = (i128::from(size_ms), i128::from(slide_ms));
                // Walk back from the last start by slide until no window covers ts.
                let mut start = ts - (ts - offset).rem_euclid(slide);
                let mut windows = Vec::with_capacity((size_ms / slide_ms) as usize);
                while start > ts - size {
                    windows.push(bounded(start, start + size)?);
                    start -= slide;
                }
                windows.reverse();
                Ok(windows)
            }
            WindowKind::Cumulating {
                max_size_ms,
                step_ms,
            } => {
                let (max_size, step) = (i128::from(max_size_ms), i128::from(step_ms));
                let base = ts - (ts - offset).rem_euclid(max_size);
                (1..=max_size / step)
                    .map(|k| base + k * step)
                    .filter(|end| *end > ts)
                    .map(|end| bounded(base, end))
                    .collect()
            }
            WindowKind::Session { gap_ms } => Ok(vec![bounded(ts, ts + i128::from(gap_ms))?]),
        }
    }

    /// Progress value at which `window` fires.
    pub fn firing_time(&self, window: &TimeWindow) -> EventTime {
        window
            .max_timestamp()
            .saturating_add(self.spec.allowed_lateness_ms)
    }

    /// Return true when `window` has already fired (or would fire) at `progress`.
    pub fn is_late(&self, window: &TimeWindow, progress: EventTime) -> bool {
        self.firing_time(window) <= progress
    }
}
