use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::info;
use windcrab_core::checkpoint::{CheckpointCoordinator, FsCheckpointStorage};
use windcrab_core::collector::{ChannelCollector, WindowResult};
use windcrab_core::config::WindowProcessorConfig;
use windcrab_core::processor::WindowProcessor;
use windcrab_core::time::EVENT_TIME_MAX;
use windcrab_core::types::{Barrier, Watermark};
use windcrab_core::window::{Aggregator, WindowSpec};

/// Watermarks trail the highest timestamp seen by this much.
const OUT_OF_ORDERNESS_MS: i64 = 2_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Click {
    user: String,
    ts: i64,
    latency_ms: u32,
}

/// Count and mean latency per window.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
struct LatencyStats {
    count: u64,
    total_ms: u64,
}

struct LatencyAggregator;

impl Aggregator<Click> for LatencyAggregator {
    type Acc = LatencyStats;
    type Output = (u64, f64);

    fn create_accumulator(&self) -> LatencyStats {
        LatencyStats::default()
    }

    fn add(&self, acc: &mut LatencyStats, value: &Click) -> Result<()> {
        acc.count += 1;
        acc.total_ms += u64::from(value.latency_ms);
        Ok(())
    }

    fn merge(&self, acc: &mut LatencyStats, other: LatencyStats) -> Result<()> {
        acc.count += other.count;
        acc.total_ms += other.total_ms;
        Ok(())
    }

    fn get_result(&self, acc: &LatencyStats) -> Result<(u64, f64)> {
        Ok((acc.count, acc.total_ms as f64 / acc.count.max(1) as f64))
    }
}

type ClickStats = WindowResult<String, (u64, f64)>;

fn clicks() -> Vec<Click> {
    let raw = [
        ("u1", 1_000, 120),
        ("u2", 1_500, 80),
        ("u1", 9_000, 95),
        // Out of order but within the watermark delay.
        ("u1", 8_000, 130),
        ("u2", 12_000, 60),
        ("u1", 12_500, 110),
        // Behind the watermark: dropped.
        ("u2", 3_000, 999),
        ("u1", 25_000, 70),
    ];
    raw.into_iter()
        .map(|(user, ts, latency_ms)| Click {
            user: user.to_string(),
            ts,
            latency_ms,
        })
        .collect()
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("windcrab_core=info".parse()?)
                .add_directive("windowing=info".parse()?),
        )
        .init();

    let (collector, results) = ChannelCollector::<ClickStats>::bounded_default();
    let printer = thread::spawn(move || {
        for r in results {
            let (count, mean) = r.value;
            println!(
                "user={} window=[{}, {}) clicks={} mean_latency={:.1}ms",
                r.key, r.window.start, r.window.end, count, mean
            );
        }
    });

    let spec = WindowSpec::tumbling(Duration::from_secs(10));
    let mut processor = WindowProcessor::new(
        spec.clone(),
        LatencyAggregator,
        collector.clone(),
        WindowProcessorConfig::default(),
    )?;

    let checkpoint_dir = std::env::temp_dir().join(format!("windcrab-demo-{}", std::process::id()));
    let storage = Arc::new(FsCheckpointStorage::new(&checkpoint_dir)?);
    let mut coordinator = CheckpointCoordinator::new(0, storage.clone());

    let events = clicks();
    let (first, second) = events.split_at(5);

    let mut max_seen = i64::MIN;
    for click in first {
        max_seen = max_seen.max(click.ts);
        processor.process_element(click.user.clone(), click.ts, click.clone())?;
        processor.process_watermark(Watermark::new(max_seen - OUT_OF_ORDERNESS_MS))?;
    }

    let metadata = coordinator.on_barrier(Barrier::with_timestamp(1, max_seen), &mut processor)?;
    info!(checkpoint_id = metadata.checkpoint_id, "took checkpoint, simulating restart");
    processor.close()?;
    drop(processor);

    let mut processor = WindowProcessor::new(
        spec,
        LatencyAggregator,
        collector,
        WindowProcessorConfig::default(),
    )?;
    let mut restarted = CheckpointCoordinator::new(0, storage);
    restarted.restore_latest(&mut processor)?;

    for click in second {
        max_seen = max_seen.max(click.ts);
        let outcome = processor.process_element(click.user.clone(), click.ts, click.clone())?;
        if outcome.is_dropped() {
            info!(user = %click.user, ts = click.ts, "late click dropped");
        }
        processor.process_watermark(Watermark::new(max_seen - OUT_OF_ORDERNESS_MS))?;
    }
    // End of input
    processor.process_watermark(Watermark::new(EVENT_TIME_MAX))?;

    let metrics = processor.metrics();
    info!(
        late_dropped = metrics.num_late_records_dropped,
        "input exhausted"
    );
    processor.close()?;
    drop(processor);

    printer
        .join()
        .map_err(|_| anyhow::anyhow!("printer thread panicked"))?;
    std::fs::remove_dir_all(&checkpoint_dir)?;
    Ok(())
}
