use super::*;

// ── Lifecycle ─────────────────────────────────────────────────────────────────

/// Lifecycle of a [`WindowProcessor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorStatus {
    Running,
    /// A fatal error occurred; every later call returns [`WindowError::Halted`].
    Failed,
    /// `close()` was called; every later call returns [`WindowError::Closed`].
    Closed,
}

// ── WindowProcessor ───────────────────────────────────────────────────────────

/// Windowed aggregation over one key partition.
///
/// Records are assigned to windows and folded into per-`(key, window)`
/// accumulators. When progress (event-time watermark or processing time)
/// reaches a window's firing time, the window's result is emitted to the
/// collector and its state is released.
///
/// # Ordering
///
/// Every operation takes `&mut self`, so a record is never interleaved with a
/// fire batch. Within one batch windows fire in ascending
/// `(fire_at, window.start, key bytes)` order.
///
/// ```
/// use std::time::Duration;
/// use windcrab_core::collector::{VecCollector, WindowResult};
/// use windcrab_core::config::WindowProcessorConfig;
/// use windcrab_core::processor::WindowProcessor;
/// use windcrab_core::window::{SumAggregator, WindowSpec};
///
/// let collector: VecCollector<WindowResult<String, i64>> = VecCollector::new();
/// let mut processor = WindowProcessor::new(
///     WindowSpec::tumbling(Duration::from_millis(10)),
///     SumAggregator,
///     collector,
///     WindowProcessorConfig::default(),
/// )
/// .unwrap();
///
/// processor.process_element("k".to_string(), 1, 5).unwrap();
/// processor.process_element("k".to_string(), 7, 3).unwrap();
/// processor.advance_progress(10).unwrap();
/// assert_eq!(processor.collector().items()[0].value, 8);
/// ```
pub struct WindowProcessor<K, IN, A, C, B = HashMapStateBackend>
where
    A: Aggregator<IN>,
{
    assigner: WindowAssigner,
    aggregator: A,
    collector: C,
    state: WindowState<A::Acc, B>,
    clock: TriggerClock,
    config: WindowProcessorConfig,
    processing_time: Arc<dyn ProcessingTimeService>,
    late_records: LateRecordMeter,
    last_triggered_processing_time: EventTime,
    /// Highest watermark handed downstream in the processing-time domain.
    forwarded_watermark: EventTime,
    status: ProcessorStatus,
    _phantom: PhantomData<fn(K, IN)>,
}

impl<K, IN, A, C> WindowProcessor<K, IN, A, C, HashMapStateBackend>
where
    K: StreamData,
    A: Aggregator<IN>,
    C: Collector<WindowResult<K, A::Output>>,
{
    /// Create a processor over an in-memory [`HashMapStateBackend`].
    pub fn new(spec: WindowSpec, aggregator: A, collector: C, config: WindowProcessorConfig) -> Result<Self> {
        Self::with_backend(spec, aggregator, collector, config, HashMapStateBackend::new())
    }
}

impl<K, IN, A, C, B> WindowProcessor<K, IN, A, C, B>
where
    K: StreamData,
    A: Aggregator<IN>,
    C: Collector<WindowResult<K, A::Output>>,
    B: KeyedStateBackend,
{
    /// Create a processor over the given keyed-state backend.
    ///
    /// Fails with [`WindowError::InvalidWindowSpec`] or
    /// [`WindowError::InvalidConfig`].
    pub fn with_backend(
        spec: WindowSpec,
        aggregator: A,
        collector: C,
        config: WindowProcessorConfig,
        backend: B,
    ) -> Result<Self> {
        let assigner = WindowAssigner::new(spec)?;
        config.validate()?;
        Ok(Self {
            assigner,
            aggregator,
            collector,
            state: WindowState::new(backend, config.write_buffer_capacity),
            clock: TriggerClock::new(),
            late_records: LateRecordMeter::new(config.late_drop_rate_span),
            config,
            processing_time: Arc::new(SystemProcessingTime),
            last_triggered_processing_time: EVENT_TIME_MIN,
            forwarded_watermark: EVENT_TIME_MIN,
            status: ProcessorStatus::Running,
            _phantom: PhantomData,
        })
    }

    /// Replace the wall clock used for processing-time stamping and metrics.
    pub fn with_processing_time_service(mut self, service: Arc<dyn ProcessingTimeService>) -> Self {
        self.processing_time = service;
        self
    }

    // ── Accessors ─────────────────────────────────────────────────────────

    pub fn status(&self) -> ProcessorStatus {
        self.status
    }

    pub fn config(&self) -> &WindowProcessorConfig {
        &self.config
    }

    pub fn assigner(&self) -> &WindowAssigner {
        &self.assigner
    }

    /// Highest progress value seen, or [`EVENT_TIME_MIN`] before any.
    pub fn current_progress(&self) -> EventTime {
        self.clock.current_progress()
    }

    /// Live `(key, window)` pairs waiting to fire.
    pub fn pending_windows(&self) -> usize {
        self.clock.len()
    }

    /// Firing time of the next pending window.
    pub fn next_firing_time(&self) -> Option<EventTime> {
        self.clock.next_timer()
    }

    pub fn window_state(&self) -> &WindowState<A::Acc, B> {
        &self.state
    }

    pub fn collector(&self) -> &C {
        &self.collector
    }

    pub fn collector_mut(&mut self) -> &mut C {
        &mut self.collector
    }

    pub fn metrics(&self) -> WindowMetrics {
        let now = self.processing_time.now();
        let progress = self.clock.current_progress();
        WindowMetrics {
            num_late_records_dropped: self.late_records.count(),
            late_records_dropped_rate: self.late_records.rate(now),
            watermark_lag: watermark_lag(now, (progress != EVENT_TIME_MIN).then_some(progress)),
        }
    }

    // ── Records ───────────────────────────────────────────────────────────

    /// Assign one record to its windows and fold it into their accumulators.
    ///
    /// In the processing-time domain `timestamp` is ignored and the record is
    /// stamped with the current processing time. Windows that have already
    /// fired are skipped; when every window of the record has fired the record
    /// is dropped and counted. A timestamp whose windows fall outside the
    /// `EventTime` range is rejected with [`WindowError::TimestampOutOfRange`]
    /// and leaves the processor running.
    pub fn process_element(&mut self, key: K, timestamp: EventTime, payload: IN) -> Result<ProcessOutcome> {
        self.ensure_running()?;
        let timestamp = match self.config.time_domain {
            TimeDomain::EventTime => timestamp,
            TimeDomain::ProcessingTime => self.processing_time.now(),
        };

        let progress = self.clock.current_progress();
        let windows: Vec<TimeWindow> = self
            .assigner
            .assign_windows(timestamp)?
            .into_iter()
            .filter(|w| !self.assigner.is_late(w, progress))
            .collect();

        if windows.is_empty() {
            self.late_records.mark(self.processing_time.now());
            trace!(timestamp, progress, "dropping late record");
            return Ok(ProcessOutcome::Dropped);
        }

        let ctx = KeyContext::encode(&key)?;
        let result = self.accumulate(&ctx, windows, &payload);
        self.guard(result)?;
        Ok(ProcessOutcome::Accepted)
    }

    fn accumulate(&mut self, ctx: &KeyContext, windows: Vec<TimeWindow>, payload: &IN) -> Result<()> {
        for candidate in windows {
            let window = if self.assigner.is_merging() {
                let assigner = &self.assigner;
                let merged = self.state.merge_session_window::<IN, A>(
                    ctx,
                    candidate,
                    |w| assigner.firing_time(w),
                    &self.aggregator,
                )?;
                for retired in &merged.retired {
                    self.clock.cancel(ctx.as_bytes(), retired);
                }
                merged.window
            } else {
                candidate
            };

            let fire_at = self.assigner.firing_time(&window);
            self.state
                .merge(ctx, &window, fire_at, payload, &self.aggregator)?;
            self.clock.register_timer(ctx.as_bytes(), &window, fire_at);
        }
        Ok(())
    }

    // ── Progress ──────────────────────────────────────────────────────────

    /// Move progress forward and fire every window whose firing time has been
    /// reached. A value below current progress is ignored.
    pub fn advance_progress(&mut self, progress: EventTime) -> Result<()> {
        self.ensure_running()?;
        let current = self.clock.current_progress();
        if progress <= current {
            if progress < current {
                warn!(progress, current, "ignoring progress regression");
            }
            return Ok(());
        }
        let result = self.fire_due(progress);
        self.guard(result)
    }

    fn fire_due(&mut self, progress: EventTime) -> Result<()> {
        // Spilled and buffered entries must agree before anything is read back.
        self.state.flush()?;
        let due = self.clock.advance(progress);
        if due.is_empty() {
            return Ok(());
        }
        debug!(progress, windows = due.len(), "firing windows");

        for timer in due {
            let ctx = KeyContext::from_bytes(timer.key);
            let fired = self
                .state
                .fire::<IN, A>(&ctx, &timer.window, &self.aggregator)?;
            if let Some(value) = fired {
                let key: K = ctx.decode()?;
                self.collector
                    .collect(WindowResult {
                        key,
                        window: timer.window.clone(),
                        value,
                    })
                    .map_err(|e| anyhow::Error::from(WindowError::collector(e)))?;
            }
            self.state.clear(&ctx, &timer.window)?;
            if self.assigner.is_merging() {
                self.state.clear_session(&ctx, &timer.window)?;
            }
        }
        Ok(())
    }

    /// Handle an event-time watermark and return the watermark to forward.
    ///
    /// In the event-time domain a newer watermark advances progress. In the
    /// processing-time domain it is only remembered and forwarded. In both
    /// domains an older watermark is answered with the highest one seen, so
    /// downstream never observes a regression.
    pub fn process_watermark(&mut self, watermark: Watermark) -> Result<Watermark> {
        self.ensure_running()?;
        let current = match self.config.time_domain {
            TimeDomain::EventTime => self.clock.current_progress(),
            TimeDomain::ProcessingTime => self.forwarded_watermark,
        };

        if watermark.timestamp > current {
            match self.config.time_domain {
                TimeDomain::EventTime => self.advance_progress(watermark.timestamp)?,
                TimeDomain::ProcessingTime => self.forwarded_watermark = watermark.timestamp,
            }
            Ok(watermark)
        } else {
            if watermark.timestamp < current {
                warn!(%watermark, current, "watermark regressed, forwarding current watermark");
            }
            Ok(Watermark::new(current))
        }
    }

    /// Processing-time callback. Fires due windows in the processing-time
    /// domain; ignored in the event-time domain.
    pub fn on_processing_time(&mut self, time: EventTime) -> Result<()> {
        self.ensure_running()?;
        if self.config.time_domain != TimeDomain::ProcessingTime {
            return Ok(());
        }
        if time <= self.last_triggered_processing_time {
            return Ok(());
        }
        self.last_triggered_processing_time = time;
        self.advance_progress(time)
    }

    // ── Checkpointing ─────────────────────────────────────────────────────

    /// Spill the write buffer before a checkpoint barrier. Never fires.
    pub fn prepare_checkpoint(&mut self) -> Result<()> {
        self.ensure_running()?;
        let result = self.state.flush();
        self.guard(result)
    }

    /// Encode progress and all window state.
    pub fn snapshot_state(&mut self) -> Result<Vec<u8>> {
        self.ensure_running()?;
        let state = self.state.snapshot();
        let state = self.guard(state)?;
        ProcessorSnapshot {
            progress: self.clock.current_progress(),
            last_triggered_processing_time: self.last_triggered_processing_time,
            forwarded_watermark: self.forwarded_watermark,
            state,
        }
        .encode()
    }

    /// Replace all state with a snapshot taken by [`snapshot_state`](Self::snapshot_state).
    pub fn restore_state(&mut self, bytes: &[u8]) -> Result<()> {
        self.ensure_running()?;
        let snapshot = ProcessorSnapshot::decode(bytes)?;
        let result = self.restore_from(snapshot);
        self.guard(result)
    }

    fn restore_from(&mut self, snapshot: ProcessorSnapshot) -> Result<()> {
        self.state.restore(&snapshot.state)?;
        self.clock = TriggerClock::new();
        for (key, window, entry) in self.state.entries()? {
            self.clock.register_timer(&key, &window, entry.fire_at);
        }
        self.clock.restore_progress(snapshot.progress);
        self.last_triggered_processing_time = snapshot.last_triggered_processing_time;
        self.forwarded_watermark = snapshot.forwarded_watermark;
        info!(
            progress = snapshot.progress,
            windows = self.clock.len(),
            "restored window processor state"
        );
        Ok(())
    }

    /// Reset progress to the minimum of the progress values recorded by
    /// several partitions' snapshots. An empty slice leaves progress as is.
    pub fn restore_progress_from(&mut self, progresses: &[EventTime]) -> Result<()> {
        self.ensure_running()?;
        if let Some(min) = progresses.iter().copied().min() {
            self.clock.restore_progress(min);
        }
        Ok(())
    }

    // ── Teardown ──────────────────────────────────────────────────────────

    /// Release every accumulator and timer without firing. Idempotent.
    pub fn close(&mut self) -> Result<()> {
        if self.status == ProcessorStatus::Closed {
            return Ok(());
        }
        if !self.clock.is_empty() {
            warn!(
                windows = self.clock.len(),
                "closing window processor with unfired windows"
            );
        }
        self.clock.clear();
        self.state.clear_all();
        self.status = ProcessorStatus::Closed;
        Ok(())
    }

    fn ensure_running(&self) -> Result<()> {
        match self.status {
            ProcessorStatus::Running => Ok(()),
            ProcessorStatus::Failed => Err(WindowError::Halted.into()),
            ProcessorStatus::Closed => Err(WindowError::Closed.into()),
        }
    }

    /// Halt on fatal errors; pass everything else through.
    fn guard<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            let fatal = err
                .downcast_ref::<WindowError>()
                .is_some_and(WindowError::is_fatal);
            if fatal {
                error!(error = %err, "window processor halted");
                self.status = ProcessorStatus::Failed;
            }
        }
        result
    }
}

impl<K, IN, A, C, B> Checkpointed for WindowProcessor<K, IN, A, C, B>
where
    K: StreamData,
    A: Aggregator<IN>,
    C: Collector<WindowResult<K, A::Output>>,
    B: KeyedStateBackend,
{
    fn prepare_checkpoint(&mut self) -> Result<()> {
        WindowProcessor::prepare_checkpoint(self)
    }

    fn snapshot_state(&mut self) -> Result<Vec<u8>> {
        WindowProcessor::snapshot_state(self)
    }

    fn restore_state(&mut self, bytes: &[u8]) -> Result<()> {
        WindowProcessor::restore_state(self, bytes)
    }

    fn checkpoint_progress(&self) -> EventTime {
        self.current_progress()
    }
}
