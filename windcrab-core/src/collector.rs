//! Output sinks for fired windows.
//!
//! The processor hands every fired window to a [`Collector`]. Results carry
//! no timestamp; downstream operators see only key, window and value.

use anyhow::{Result, anyhow};
use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use serde::{Deserialize, Serialize};

use crate::window::TimeWindow;

/// Default capacity of [`ChannelCollector::bounded_default`].
const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// One fired `(key, window)` aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowResult<K, OUT> {
    pub key: K,
    pub window: TimeWindow,
    pub value: OUT,
}

/// Receives fired window results.
///
/// An error from `collect` is fatal for the processor that emitted the item.
pub trait Collector<T>: Send {
    fn collect(&mut self, item: T) -> Result<()>;
}

/// Buffers every item in memory. Used by tests and batch replays.
#[derive(Debug, Clone)]
pub struct VecCollector<T> {
    items: Vec<T>,
}

impl<T> VecCollector<T> {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    /// Take everything collected so far, leaving the collector empty.
    pub fn drain(&mut self) -> Vec<T> {
        std::mem::take(&mut self.items)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T> Default for VecCollector<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send> Collector<T> for VecCollector<T> {
    fn collect(&mut self, item: T) -> Result<()> {
        self.items.push(item);
        Ok(())
    }
}

/// Forwards items over a crossbeam channel to another thread.
///
/// With a bounded channel `collect` blocks while the channel is full
/// (backpressure).
#[derive(Debug, Clone)]
pub struct ChannelCollector<T> {
    sender: Sender<T>,
}

impl<T> ChannelCollector<T> {
    pub fn new(sender: Sender<T>) -> Self {
        Self { sender }
    }

    pub fn bounded(capacity: usize) -> (Self, Receiver<T>) {
        let (tx, rx) = bounded(capacity);
        (Self::new(tx), rx)
    }

    pub fn bounded_default() -> (Self, Receiver<T>) {
        Self::bounded(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn unbounded() -> (Self, Receiver<T>) {
        let (tx, rx) = unbounded();
        (Self::new(tx), rx)
    }
}

impl<T: Send> Collector<T> for ChannelCollector<T> {
    fn collect(&mut self, item: T) -> Result<()> {
        self.sender
            .send(item)
            .map_err(|_| anyhow!("Channel closed: receiver dropped"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_collector_drain() {
        let mut out = VecCollector::new();
        out.collect(1).unwrap();
        out.collect(2).unwrap();
        assert_eq!(out.items(), &[1, 2]);
        assert_eq!(out.drain(), vec![1, 2]);
        assert!(out.is_empty());
    }

    #[test]
    fn test_channel_collector_delivers_across_threads() {
        let (mut out, rx) = ChannelCollector::bounded(4);
        let handle = std::thread::spawn(move || rx.iter().collect::<Vec<i32>>());
        for v in 0..10 {
            out.collect(v).unwrap();
        }
        drop(out);
        assert_eq!(handle.join().unwrap(), (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_channel_collector_fails_when_receiver_dropped() {
        let (mut out, rx) = ChannelCollector::<i32>::unbounded();
        drop(rx);
        assert!(out.collect(1).is_err());
    }
}
