use super::*;

// ── Aggregator ────────────────────────────────────────────────────────────────

/// Incremental aggregation over the records of one `(key, window)`.
///
/// The accumulator shape is owned by the implementation; the engine only
/// stores it, hands it back, and serializes it for checkpoints. Any error
/// returned here is fatal for the partition: a half-applied update leaves
/// an accumulator that can never be trusted again.
pub trait Aggregator<IN>: Send {
    type Acc: StreamData;
    type Output;

    /// Create a fresh accumulator for a new window.
    fn create_accumulator(&self) -> Self::Acc;

    /// Fold one record into the accumulator.
    fn add(&self, acc: &mut Self::Acc, value: &IN) -> Result<()>;

    /// Fold `other` into `acc`. Used when session windows merge.
    fn merge(&self, acc: &mut Self::Acc, other: Self::Acc) -> Result<()>;

    /// Finalize the accumulator into the window result.
    fn get_result(&self, acc: &Self::Acc) -> Result<Self::Output>;
}

// ── Built-ins ─────────────────────────────────────────────────────────────────

/// Checked `i64` sum. Overflow is reported as an aggregation failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct SumAggregator;

impl Aggregator<i64> for SumAggregator {
    type Acc = i64;
    type Output = i64;

    fn create_accumulator(&self) -> i64 {
        0
    }

    fn add(&self, acc: &mut i64, value: &i64) -> Result<()> {
        *acc = acc
            .checked_add(*value)
            .ok_or_else(|| anyhow!("i64 sum overflow adding {value} to {acc}"))?;
        Ok(())
    }

    fn merge(&self, acc: &mut i64, other: i64) -> Result<()> {
        self.add(acc, &other)
    }

    fn get_result(&self, acc: &i64) -> Result<i64> {
        Ok(*acc)
    }
}

/// Counts records regardless of payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct CountAggregator;

impl<IN> Aggregator<IN> for CountAggregator {
    type Acc = u64;
    type Output = u64;

    fn create_accumulator(&self) -> u64 {
        0
    }

    fn add(&self, acc: &mut u64, _value: &IN) -> Result<()> {
        *acc += 1;
        Ok(())
    }

    fn merge(&self, acc: &mut u64, other: u64) -> Result<()> {
        *acc += other;
        Ok(())
    }

    fn get_result(&self, acc: &u64) -> Result<u64> {
        Ok(*acc)
    }
}

/// Pairwise reduction with a user closure, like a keyed `reduce`.
///
/// The accumulator is `None` until the first record arrives; an empty
/// window finalizes to `None`.
pub struct ReduceAggregator<T, F> {
    reduce_fn: F,
    _phantom: PhantomData<fn(T) -> T>,
}

impl<T, F> ReduceAggregator<T, F>
where
    F: Fn(&T, &T) -> T + Send,
{
    pub fn new(reduce_fn: F) -> Self {
        Self {
            reduce_fn,
            _phantom: PhantomData,
        }
    }
}

impl<T, F> Aggregator<T> for ReduceAggregator<T, F>
where
    T: StreamData,
    F: Fn(&T, &T) -> T + Send,
{
    type Acc = Option<T>;
    type Output = Option<T>;

    fn create_accumulator(&self) -> Option<T> {
        None
    }

    fn add(&self, acc: &mut Option<T>, value: &T) -> Result<()> {
        let next = match acc.as_ref() {
            Some(current) => (self.reduce_fn)(current, value),
            None => value.clone(),
        };
        *acc = Some(next);
        Ok(())
    }

    fn merge(&self, acc: &mut Option<T>, other: Option<T>) -> Result<()> {
        if let Some(other) = other {
            self.add(acc, &other)?;
        }
        Ok(())
    }

    fn get_result(&self, acc: &Option<T>) -> Result<Option<T>> {
        Ok(acc.clone())
    }
}
