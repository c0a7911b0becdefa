//! # windcrab core
//!
//! Windowed stream aggregation for one key partition.
//!
//! - [`window`] — window shapes ([`WindowSpec`](window::WindowSpec)), assignment
//!   ([`WindowAssigner`](window::WindowAssigner)), session merging and the
//!   [`Aggregator`](window::Aggregator) contract.
//! - [`state`] — keyed state backends and the write-buffered
//!   [`WindowState`](state::WindowState) table.
//! - [`time`] — the [`TriggerClock`](time::TriggerClock) and processing-time sources.
//! - [`processor`] — [`WindowProcessor`](processor::WindowProcessor), which ties
//!   the above together.
//! - [`checkpoint`] — checkpoint storages and the per-partition barrier driver.
//! - [`collector`], [`metrics`], [`config`], [`error`], [`types`] — supporting types.

pub mod checkpoint;
pub mod collector;
pub mod config;
pub mod error;
pub mod metrics;
pub mod processor;
pub mod state;
pub mod time;
pub mod types;
pub mod window;
