use super::*;

/// State name of the `(key, window) -> WindowEntry` table.
pub const WINDOW_ENTRIES: &str = "window-entries";

/// State name of the per-key live session windows.
pub const SESSION_WINDOWS: &str = "session-windows";

const SESSIONS: ValueStateHandle<Vec<TimeWindow>> = ValueStateHandle::new(SESSION_WINDOWS);

/// Key of the record being processed, with its encoded form.
///
/// The encoding partitions state and gives the tie-break order between keys
/// when several windows fire at the same time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyContext {
    bytes: Vec<u8>,
}

impl KeyContext {
    pub fn encode<K: StreamData>(key: &K) -> Result<Self> {
        let bytes = bincode::serialize(key).context("encode key")?;
        Ok(Self { bytes })
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn decode<K: StreamData>(&self) -> Result<K> {
        bincode::deserialize(&self.bytes).context("decode key")
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Accumulator of one `(key, window)` and the time its timer fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowEntry<ACC> {
    pub acc: ACC,
    pub fire_at: EventTime,
}

/// Outcome of folding a session candidate into a key's live sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionMergeResult {
    /// Window the record must be added to.
    pub window: TimeWindow,
    /// Windows that no longer exist; their timers must be cancelled.
    pub retired: Vec<TimeWindow>,
}

/// Per-`(key, window)` accumulator table.
///
/// Recently touched entries live in an in-memory write buffer; everything
/// else is read from and written to the [`KeyedStateBackend`]. The buffer is
/// spilled once it grows past its capacity, and on [`flush`](Self::flush).
pub struct WindowState<ACC, B = HashMapStateBackend> {
    backend: B,
    buffer: AHashMap<(Vec<u8>, TimeWindow), WindowEntry<ACC>>,
    capacity: usize,
    table: ValueStateHandle<WindowEntry<ACC>>,
}

fn namespace(window: &TimeWindow) -> Result<Vec<u8>> {
    bincode::serialize(window).context("encode window")
}

fn backend_err(e: anyhow::Error) -> anyhow::Error {
    WindowError::state_backend(e).into()
}

fn aggregation_err(window: &TimeWindow) -> impl FnOnce(anyhow::Error) -> anyhow::Error + '_ {
    move |e| WindowError::aggregation(window, e).into()
}

impl<ACC: StreamData, B: KeyedStateBackend> WindowState<ACC, B> {
    pub fn new(backend: B, capacity: usize) -> Self {
        Self {
            backend,
            buffer: AHashMap::with_capacity(capacity.min(4096)),
            capacity,
            table: ValueStateHandle::new(WINDOW_ENTRIES),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Entries currently held in the write buffer.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Add `value` to the accumulator of `(ctx, window)`, creating the entry
    /// when it does not exist yet. Returns true if the entry was created.
    pub fn merge<IN, A>(
        &mut self,
        ctx: &KeyContext,
        window: &TimeWindow,
        fire_at: EventTime,
        value: &IN,
        aggregator: &A,
    ) -> Result<bool>
    where
        A: Aggregator<IN, Acc = ACC>,
    {
        let slot = (ctx.as_bytes().to_vec(), window.clone());
        let mut created = false;
        let mut entry = match self.buffer.remove(&slot) {
            Some(entry) => entry,
            None => match self.load(ctx, window)? {
                Some(entry) => entry,
                None => {
                    created = true;
                    WindowEntry {
                        acc: aggregator.create_accumulator(),
                        fire_at,
                    }
                }
            },
        };

        entry.fire_at = fire_at;
        aggregator
            .add(&mut entry.acc, value)
            .map_err(aggregation_err(window))?;
        self.buffer.insert(slot, entry);

        if self.buffer.len() > self.capacity {
            self.flush()?;
        }
        Ok(created)
    }

    /// Final value of `(ctx, window)`, or `None` when the window holds no
    /// entry. Does not modify the entry.
    pub fn fire<IN, A>(
        &mut self,
        ctx: &KeyContext,
        window: &TimeWindow,
        aggregator: &A,
    ) -> Result<Option<A::Output>>
    where
        A: Aggregator<IN, Acc = ACC>,
    {
        let slot = (ctx.as_bytes().to_vec(), window.clone());
        let output = match self.buffer.get(&slot) {
            Some(entry) => aggregator.get_result(&entry.acc),
            None => match self.load(ctx, window)? {
                Some(entry) => aggregator.get_result(&entry.acc),
                None => return Ok(None),
            },
        };
        output.map(Some).map_err(aggregation_err(window))
    }

    /// Remove `(ctx, window)` from the buffer and the backend.
    pub fn clear(&mut self, ctx: &KeyContext, window: &TimeWindow) -> Result<()> {
        self.buffer.remove(&(ctx.as_bytes().to_vec(), window.clone()));
        let ns = namespace(window)?;
        self.backend.set_current_key(ctx.as_bytes().to_vec());
        self.table.clear(&mut self.backend, &ns).map_err(backend_err)
    }

    /// Drop `window` from the key's session set, if present.
    pub fn clear_session(&mut self, ctx: &KeyContext, window: &TimeWindow) -> Result<()> {
        let mut sessions = self.sessions(ctx)?;
        if let Some(pos) = sessions.iter().position(|w| w == window) {
            sessions.remove(pos);
            self.store_sessions(ctx, sessions)?;
        }
        Ok(())
    }

    /// Fold `candidate` into the key's live sessions.
    ///
    /// Accumulators of every absorbed window are merged into the resulting
    /// window, whose entry fires at `firing_time(&window)`. The caller adds
    /// the record itself with [`merge`](Self::merge) afterwards.
    pub fn merge_session_window<IN, A>(
        &mut self,
        ctx: &KeyContext,
        candidate: TimeWindow,
        firing_time: impl Fn(&TimeWindow) -> EventTime,
        aggregator: &A,
    ) -> Result<SessionMergeResult>
    where
        A: Aggregator<IN, Acc = ACC>,
    {
        let mut sessions = self.sessions(ctx)?;
        let merge = merge_session_windows(&sessions, candidate);
        if merge.is_noop() {
            return Ok(SessionMergeResult {
                window: merge.merged,
                retired: Vec::new(),
            });
        }

        let target = merge.merged;
        let mut combined: Option<ACC> = None;
        for window in &merge.absorbed {
            let Some(entry) = self.take(ctx, window)? else {
                continue;
            };
            combined = Some(match combined.take() {
                None => entry.acc,
                Some(mut acc) => {
                    aggregator
                        .merge(&mut acc, entry.acc)
                        .map_err(aggregation_err(&target))?;
                    acc
                }
            });
        }
        if let Some(acc) = combined {
            let entry = WindowEntry {
                acc,
                fire_at: firing_time(&target),
            };
            self.buffer
                .insert((ctx.as_bytes().to_vec(), target.clone()), entry);
        }

        sessions.retain(|w| !merge.absorbed.contains(w));
        sessions.push(target.clone());
        sessions.sort();
        self.store_sessions(ctx, sessions)?;

        let retired = merge
            .absorbed
            .into_iter()
            .filter(|w| *w != target)
            .collect();
        if self.buffer.len() > self.capacity {
            self.flush()?;
        }
        Ok(SessionMergeResult {
            window: target,
            retired,
        })
    }

    /// Live session windows of `ctx`, ascending.
    pub fn sessions(&mut self, ctx: &KeyContext) -> Result<Vec<TimeWindow>> {
        self.backend.set_current_key(ctx.as_bytes().to_vec());
        let sessions = SESSIONS.get(&self.backend, &[]).map_err(backend_err)?;
        Ok(sessions.unwrap_or_default())
    }

    fn store_sessions(&mut self, ctx: &KeyContext, sessions: Vec<TimeWindow>) -> Result<()> {
        self.backend.set_current_key(ctx.as_bytes().to_vec());
        let stored = if sessions.is_empty() {
            SESSIONS.clear(&mut self.backend, &[])
        } else {
            SESSIONS.put(&mut self.backend, &[], sessions)
        };
        stored.map_err(backend_err)
    }

    /// Write every buffered entry to the backend and empty the buffer.
    pub fn flush(&mut self) -> Result<()> {
        for ((key, window), entry) in self.buffer.drain() {
            let ns = namespace(&window)?;
            self.backend.set_current_key(key);
            self.table
                .put(&mut self.backend, &ns, entry)
                .map_err(backend_err)?;
        }
        Ok(())
    }

    /// Every live `(key bytes, window, entry)`, after a flush.
    pub fn entries(&mut self) -> Result<Vec<(Vec<u8>, TimeWindow, WindowEntry<ACC>)>> {
        self.flush()?;
        let raw = self.table.entries(&self.backend).map_err(backend_err)?;
        raw.into_iter()
            .map(|(key, ns, entry)| {
                let window: TimeWindow = bincode::deserialize(&ns).context("decode window")?;
                Ok((key, window, entry))
            })
            .collect()
    }

    /// Flush, then snapshot the backend.
    pub fn snapshot(&mut self) -> Result<Vec<u8>> {
        self.flush()?;
        self.backend.snapshot().map_err(backend_err)
    }

    /// Discard the write buffer and replace backend contents with `data`.
    pub fn restore(&mut self, data: &[u8]) -> Result<()> {
        self.buffer.clear();
        self.backend.restore(data).map_err(backend_err)
    }

    /// Drop every entry without writing anything back.
    pub fn clear_all(&mut self) {
        self.buffer.clear();
        self.backend.clear_all();
    }

    fn load(&mut self, ctx: &KeyContext, window: &TimeWindow) -> Result<Option<WindowEntry<ACC>>> {
        let ns = namespace(window)?;
        self.backend.set_current_key(ctx.as_bytes().to_vec());
        self.table.get(&self.backend, &ns).map_err(backend_err)
    }

    /// Remove an entry from wherever it lives and return it.
    fn take(&mut self, ctx: &KeyContext, window: &TimeWindow) -> Result<Option<WindowEntry<ACC>>> {
        let buffered = self.buffer.remove(&(ctx.as_bytes().to_vec(), window.clone()));
        let stored = self.load(ctx, window)?;
        let ns = namespace(window)?;
        self.table.clear(&mut self.backend, &ns).map_err(backend_err)?;
        Ok(buffered.or(stored))
    }
}
