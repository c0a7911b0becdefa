//! Checkpoint storage and the barrier driver for one window partition.
//!
//! A checkpoint of a partition is the encoded [`ProcessorSnapshot`] of its
//! [`WindowProcessor`] plus a small metadata record. Metadata is written last,
//! so a checkpoint without metadata is incomplete and never listed.
//!
//! [`ProcessorSnapshot`]: crate::processor::ProcessorSnapshot
//! [`WindowProcessor`]: crate::processor::WindowProcessor

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::types::{Barrier, CheckpointId, EventTime, PartitionId};

mod coordinator;
mod metadata;
mod storage;

pub use coordinator::*;
pub use metadata::*;
pub use storage::*;

/// Something whose state can be captured at a barrier and restored later.
pub trait Checkpointed {
    /// Make in-memory state durable in the keyed-state backend. Must not
    /// emit output.
    fn prepare_checkpoint(&mut self) -> Result<()>;

    fn snapshot_state(&mut self) -> Result<Vec<u8>>;

    fn restore_state(&mut self, bytes: &[u8]) -> Result<()>;

    /// Progress to record in checkpoint metadata.
    fn checkpoint_progress(&self) -> EventTime;
}

#[cfg(test)]
#[path = "tests/checkpoint_tests.rs"]
mod tests;
