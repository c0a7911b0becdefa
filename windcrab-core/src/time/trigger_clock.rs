use super::*;

/// Sort key of a pending timer. Field order is the firing order:
/// firing time, then window start, then encoded key, then window end.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct TimerSlot {
    fire_at: EventTime,
    window_start: EventTime,
    key: Vec<u8>,
    window_end: EventTime,
}

impl TimerSlot {
    fn new(key: &[u8], window: &TimeWindow, fire_at: EventTime) -> Self {
        Self {
            fire_at,
            window_start: window.start,
            key: key.to_vec(),
            window_end: window.end,
        }
    }
}

/// A timer returned by [`TriggerClock::advance`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueTimer {
    /// Encoded key the window belongs to.
    pub key: Vec<u8>,
    pub window: TimeWindow,
    pub fire_at: EventTime,
}

/// Pending firing timers of one key partition.
///
/// # Invariants
/// - At most one timer per `(key, window)`; registering again replaces the
///   firing time instead of adding a second timer.
/// - `advance` hands out each timer once, in ascending
///   `(fire_at, window.start, key)` order, and never for a progress value at
///   or below one it has already seen.
#[derive(Debug, Clone)]
pub struct TriggerClock {
    queue: BTreeSet<TimerSlot>,
    index: AHashMap<(Vec<u8>, TimeWindow), EventTime>,
    progress: EventTime,
}

impl TriggerClock {
    pub fn new() -> Self {
        Self {
            queue: BTreeSet::new(),
            index: AHashMap::new(),
            progress: EVENT_TIME_MIN,
        }
    }

    /// Register the timer of `(key, window)` at `fire_at`.
    ///
    /// Returns true when the pending set changed: a new timer, or an existing
    /// one moved to a different timestamp.
    pub fn register_timer(&mut self, key: &[u8], window: &TimeWindow, fire_at: EventTime) -> bool {
        let index_key = (key.to_vec(), window.clone());
        match self.index.get(&index_key) {
            Some(existing) if *existing == fire_at => return false,
            Some(existing) => {
                self.queue.remove(&TimerSlot::new(key, window, *existing));
            }
            None => {}
        }
        self.queue.insert(TimerSlot::new(key, window, fire_at));
        self.index.insert(index_key, fire_at);
        true
    }

    /// Retract the timer of `(key, window)`, returning its firing time.
    pub fn cancel(&mut self, key: &[u8], window: &TimeWindow) -> Option<EventTime> {
        let fire_at = self.index.remove(&(key.to_vec(), window.clone()))?;
        self.queue.remove(&TimerSlot::new(key, window, fire_at));
        Some(fire_at)
    }

    /// Move progress to `progress` and drain every timer with
    /// `fire_at <= progress`.
    ///
    /// A `progress` at or below the last advanced value yields nothing.
    pub fn advance(&mut self, progress: EventTime) -> Vec<DueTimer> {
        if progress <= self.progress {
            return Vec::new();
        }
        self.progress = progress;

        let mut due = Vec::new();
        while self
            .queue
            .first()
            .is_some_and(|slot| slot.fire_at <= progress)
        {
            let Some(slot) = self.queue.pop_first() else {
                break;
            };
            let window = TimeWindow::new(slot.window_start, slot.window_end);
            self.index.remove(&(slot.key.clone(), window.clone()));
            due.push(DueTimer {
                key: slot.key,
                window,
                fire_at: slot.fire_at,
            });
        }
        due
    }

    /// Set progress after a restore without firing anything.
    ///
    /// Unlike [`advance`](Self::advance) this may move progress backwards,
    /// which restoring from several partitions' snapshots relies on.
    pub fn restore_progress(&mut self, progress: EventTime) {
        self.progress = progress;
    }

    pub fn current_progress(&self) -> EventTime {
        self.progress
    }

    /// Firing time registered for `(key, window)`, if any.
    pub fn timer_for(&self, key: &[u8], window: &TimeWindow) -> Option<EventTime> {
        self.index.get(&(key.to_vec(), window.clone())).copied()
    }

    /// Return the timestamp of the earliest pending timer, or `None`.
    pub fn next_timer(&self) -> Option<EventTime> {
        self.queue.first().map(|slot| slot.fire_at)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Drop every pending timer. Progress is kept.
    pub fn clear(&mut self) {
        self.queue.clear();
        self.index.clear();
    }
}

impl Default for TriggerClock {
    fn default() -> Self {
        Self::new()
    }
}
