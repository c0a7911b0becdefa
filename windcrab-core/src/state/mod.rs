//! # State Management
//!
//! Keyed state for the window engine.
//!
//! - [`KeyedStateBackend`] — storage contract, scoped to a current key.
//! - [`HashMapStateBackend`] — in-memory backend with deterministic snapshots.
//! - [`ValueStateHandle`] — typed descriptor for one named value state.
//! - [`WindowState`] — `(key, window) -> WindowEntry` table with a write buffer.

use std::collections::BTreeMap;
use std::marker::PhantomData;

use ahash::AHashMap;
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::error::WindowError;
use crate::types::{EventTime, StreamData};
use crate::window::{Aggregator, TimeWindow, merge_session_windows};

mod hashmap;
mod window_state;

pub use hashmap::*;
pub use window_state::*;

/// Keyed state backend: manages state for the current processing key.
///
/// Values are addressed by `(current key, state name, namespace)`. The
/// namespace is an opaque byte string; the window engine stores the encoded
/// window there.
pub trait KeyedStateBackend: Send {
    /// Set the current processing key.
    ///
    /// All subsequent value operations are scoped to this key.
    fn set_current_key(&mut self, key: Vec<u8>);

    fn current_key(&self) -> Option<&[u8]>;

    fn get_value<V: StreamData>(&self, name: &str, namespace: &[u8]) -> Result<Option<V>>;

    fn put_value<V: StreamData>(&mut self, name: &str, namespace: &[u8], value: V) -> Result<()>;

    fn clear_value(&mut self, name: &str, namespace: &[u8]) -> Result<()>;

    /// Every `(key, namespace, value)` stored under `name`, across all keys,
    /// in key then namespace order.
    fn entries<V: StreamData>(&self, name: &str) -> Result<Vec<(Vec<u8>, Vec<u8>, V)>>;

    /// Drop all state of all keys.
    fn clear_all(&mut self);

    /// Snapshot all state for checkpointing.
    fn snapshot(&self) -> Result<Vec<u8>>;

    /// Replace all state with a snapshot taken by [`snapshot`](Self::snapshot).
    fn restore(&mut self, data: &[u8]) -> Result<()>;
}

/// Descriptor of a named value state.
///
/// Holds no reference to the backend, so the same handle can be used with
/// any key and across `&mut` borrows of the backend.
#[derive(Debug, Clone, Copy)]
pub struct ValueStateHandle<V> {
    name: &'static str,
    _marker: PhantomData<fn() -> V>,
}

impl<V: StreamData> ValueStateHandle<V> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn get<B: KeyedStateBackend>(&self, backend: &B, namespace: &[u8]) -> Result<Option<V>> {
        backend.get_value(self.name, namespace)
    }

    pub fn put<B: KeyedStateBackend>(&self, backend: &mut B, namespace: &[u8], value: V) -> Result<()> {
        backend.put_value(self.name, namespace, value)
    }

    pub fn clear<B: KeyedStateBackend>(&self, backend: &mut B, namespace: &[u8]) -> Result<()> {
        backend.clear_value(self.name, namespace)
    }

    pub fn entries<B: KeyedStateBackend>(&self, backend: &B) -> Result<Vec<(Vec<u8>, Vec<u8>, V)>> {
        backend.entries(self.name)
    }
}

#[cfg(test)]
#[path = "tests/hashmap_tests.rs"]
mod hashmap_tests;

#[cfg(test)]
#[path = "tests/window_state_tests.rs"]
mod window_state_tests;
