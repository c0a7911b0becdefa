use std::collections::BTreeMap;
use std::thread;
use std::time::Duration;

use windcrab_core::collector::{ChannelCollector, VecCollector, WindowResult};
use windcrab_core::config::WindowProcessorConfig;
use windcrab_core::processor::WindowProcessor;
use windcrab_core::time::EVENT_TIME_MAX;
use windcrab_core::types::{EventTime, ProcessOutcome, Watermark};
use windcrab_core::window::{
    Aggregator, ReduceAggregator, SumAggregator, TimeWindow, WindowAssigner, WindowSpec,
};

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
struct Event {
    user: String,
    ts: i64,
    value: i32,
}

fn event(user: &str, ts: i64, value: i32) -> Event {
    Event {
        user: user.to_string(),
        ts,
        value,
    }
}

fn lcg_next(state: &mut u64) -> u64 {
    *state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
    *state
}

fn gen_events(seed: u64, n: usize, num_users: usize) -> Vec<Event> {
    let mut state = seed;
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let user = format!("u{}", (lcg_next(&mut state) as usize % num_users) + 1);
        let jitter = (lcg_next(&mut state) % 4_000) as i64 - 1_000; // [-1000, 2999]
        let ts = ((i as i64) * 500 + jitter).max(0);
        let value = (lcg_next(&mut state) % 7) as i32 + 1;
        out.push(Event { user, ts, value });
    }
    out
}

/// Feed `events` with a bounded out-of-orderness watermark after each one,
/// then close the stream with a final watermark.
fn run<A, C>(
    processor: &mut WindowProcessor<String, Event, A, C>,
    events: &[Event],
    max_delay: i64,
) -> Vec<ProcessOutcome>
where
    A: Aggregator<Event>,
    C: windcrab_core::collector::Collector<WindowResult<String, A::Output>>,
{
    let mut max_seen = i64::MIN;
    let mut outcomes = Vec::with_capacity(events.len());
    for e in events {
        max_seen = max_seen.max(e.ts);
        outcomes.push(
            processor
                .process_element(e.user.clone(), e.ts, e.clone())
                .unwrap(),
        );
        processor
            .process_watermark(Watermark::new(max_seen - max_delay))
            .unwrap();
    }
    processor.process_watermark(Watermark::new(EVENT_TIME_MAX)).unwrap();
    outcomes
}

fn sum_events() -> impl Aggregator<Event, Acc = Option<Event>, Output = Option<Event>> {
    ReduceAggregator::new(|a: &Event, b: &Event| Event {
        user: a.user.clone(),
        ts: a.ts.max(b.ts),
        value: a.value + b.value,
    })
}

#[test]
fn test_event_time_tumbling_reduce_out_of_order_and_late_drop() {
    let mut processor = WindowProcessor::new(
        WindowSpec::tumbling(Duration::from_secs(10)),
        sum_events(),
        VecCollector::new(),
        WindowProcessorConfig::default(),
    )
    .unwrap();

    let events = vec![
        event("u1", 1_000, 1),
        event("u1", 9_000, 2),
        // Out of order but within the 2s delay.
        event("u1", 8_000, 3),
        // Watermark reaches 10_000 and closes [0, 10_000).
        event("u1", 12_000, 10),
        // Behind the watermark.
        event("u1", 5_000, 1000),
    ];
    let outcomes = run(&mut processor, &events, 2_000);
    assert_eq!(outcomes[4], ProcessOutcome::Dropped);
    assert!(outcomes[..4].iter().all(|o| *o == ProcessOutcome::Accepted));

    let out: Vec<_> = processor
        .collector()
        .items()
        .iter()
        .map(|r| (r.window.clone(), r.value.as_ref().unwrap().value))
        .collect();
    assert_eq!(
        out,
        vec![
            (TimeWindow::new(0, 10_000), 6),
            (TimeWindow::new(10_000, 20_000), 10),
        ]
    );
    assert_eq!(processor.metrics().num_late_records_dropped, 1);
}

#[test]
fn test_out_of_order_sequence_fires_on_watermark() {
    let mut processor = WindowProcessor::new(
        WindowSpec::tumbling(Duration::from_millis(5)),
        sum_events(),
        VecCollector::new(),
        WindowProcessorConfig::default(),
    )
    .unwrap();

    // Watermark 6 is produced after T=9 with max delay 3.
    let events = vec![
        event("u1", 1, 1),
        event("u1", 5, 5),
        event("u1", 3, 3),
        event("u1", 9, 9),
    ];
    run(&mut processor, &events, 3);

    let by_ts: Vec<_> = processor
        .collector()
        .items()
        .iter()
        .map(|r| {
            let e = r.value.as_ref().unwrap();
            (e.ts, e.value)
        })
        .collect();
    // [0,5) fires at watermark 6; [5,10) at the final watermark.
    assert_eq!(by_ts, vec![(3, 4), (9, 14)]);
}

/// Sums values of records that were not late at arrival, per `(user, window)`.
fn reference_sums(
    spec: &WindowSpec,
    events: &[Event],
    max_delay: i64,
) -> BTreeMap<(String, TimeWindow), i64> {
    let assigner = WindowAssigner::new(spec.clone()).unwrap();
    let mut progress = i64::MIN;
    let mut max_seen = i64::MIN;
    let mut sums = BTreeMap::new();
    for e in events {
        for w in assigner.assign_windows(e.ts).unwrap() {
            if !assigner.is_late(&w, progress) {
                *sums.entry((e.user.clone(), w)).or_insert(0) += e.value as i64;
            }
        }
        max_seen = max_seen.max(e.ts);
        progress = progress.max(max_seen - max_delay);
    }
    sums
}

struct ValueSum;

impl Aggregator<Event> for ValueSum {
    type Acc = i64;
    type Output = i64;

    fn create_accumulator(&self) -> i64 {
        0
    }

    fn add(&self, acc: &mut i64, value: &Event) -> anyhow::Result<()> {
        *acc += value.value as i64;
        Ok(())
    }

    fn merge(&self, acc: &mut i64, other: i64) -> anyhow::Result<()> {
        *acc += other;
        Ok(())
    }

    fn get_result(&self, acc: &i64) -> anyhow::Result<i64> {
        Ok(*acc)
    }
}

fn assert_matches_reference(spec: WindowSpec, config: WindowProcessorConfig, seed: u64) {
    let events = gen_events(seed, 400, 5);
    let expected = reference_sums(&spec, &events, 1_500);

    let mut processor =
        WindowProcessor::new(spec, ValueSum, VecCollector::new(), config).unwrap();
    run(&mut processor, &events, 1_500);

    let results = processor.collector().items();
    let mut actual = BTreeMap::new();
    for r in results {
        let prev = actual.insert((r.key.clone(), r.window.clone()), r.value);
        assert!(prev.is_none(), "window {} fired twice for {}", r.window, r.key);
    }
    assert_eq!(actual, expected, "seed {seed}");

    // Fire order follows window end for fixed-size windows.
    assert!(results.windows(2).all(|p| p[0].window.end <= p[1].window.end));
    assert_eq!(processor.pending_windows(), 0);
}

#[test]
fn test_tumbling_matches_reference_over_random_streams() {
    for seed in [7, 42, 1_234_567] {
        assert_matches_reference(
            WindowSpec::tumbling(Duration::from_secs(5)),
            WindowProcessorConfig::default(),
            seed,
        );
    }
}

#[test]
fn test_hopping_matches_reference_over_random_streams() {
    for seed in [3, 99] {
        assert_matches_reference(
            WindowSpec::hopping(Duration::from_secs(6), Duration::from_secs(2))
                .with_offset(Duration::from_secs(1)),
            WindowProcessorConfig::default(),
            seed,
        );
    }
}

#[test]
fn test_spilling_write_buffer_does_not_change_results() {
    let spec = WindowSpec::hopping(Duration::from_secs(4), Duration::from_secs(2))
        .with_allowed_lateness(Duration::from_millis(500));
    for seed in [11, 2024] {
        assert_matches_reference(
            spec.clone(),
            WindowProcessorConfig::default().with_write_buffer_capacity(1),
            seed,
        );
    }
}

#[test]
fn test_cumulating_windows_emit_growing_prefixes() {
    let mut processor = WindowProcessor::new(
        WindowSpec::cumulating(Duration::from_millis(30), Duration::from_millis(10)),
        SumAggregator,
        VecCollector::new(),
        WindowProcessorConfig::default(),
    )
    .unwrap();

    for (ts, v) in [(2, 1), (15, 2), (25, 4)] {
        processor.process_element("k".to_string(), ts, v).unwrap();
    }
    processor.advance_progress(29).unwrap();

    let out: Vec<_> = processor
        .collector()
        .items()
        .iter()
        .map(|r| (r.window.end, r.value))
        .collect();
    assert_eq!(out, vec![(10, 1), (20, 3), (30, 7)]);
}

#[test]
fn test_sessions_merge_across_out_of_order_records() {
    let mut processor = WindowProcessor::new(
        WindowSpec::session(Duration::from_millis(10)),
        SumAggregator,
        VecCollector::new(),
        WindowProcessorConfig::default(),
    )
    .unwrap();

    for (ts, v) in [(0, 1), (25, 2), (12, 4), (50, 8)] {
        processor.process_element("s".to_string(), ts, v).unwrap();
    }
    // Three disjoint sessions so far besides [50, 60): [0,10), [12,22), [25,35).
    // [20,30) overlaps the last two and joins them into [12,35).
    processor.process_element("s".to_string(), 20, 16).unwrap();
    processor.advance_progress(EVENT_TIME_MAX).unwrap();

    let out: Vec<_> = processor
        .collector()
        .items()
        .iter()
        .map(|r| (r.window.clone(), r.value))
        .collect();
    assert_eq!(
        out,
        vec![
            (TimeWindow::new(0, 10), 1),
            (TimeWindow::new(12, 35), 2 + 4 + 16),
            (TimeWindow::new(50, 60), 8),
        ]
    );
}

#[test]
fn test_channel_collector_feeds_consumer_thread() {
    let (collector, rx) = ChannelCollector::<WindowResult<String, i64>>::bounded(4);
    let consumer = thread::spawn(move || rx.iter().collect::<Vec<_>>());

    let mut processor = WindowProcessor::new(
        WindowSpec::tumbling(Duration::from_millis(10)),
        SumAggregator,
        collector,
        WindowProcessorConfig::default(),
    )
    .unwrap();

    // More windows than the channel holds: collect blocks until the consumer drains.
    for i in 0..20i64 {
        processor
            .process_element(format!("k{}", i % 3), i * 10 + 1, i)
            .unwrap();
    }
    processor.advance_progress(1_000).unwrap();
    drop(processor);

    let results = consumer.join().unwrap();
    assert_eq!(results.len(), 20);
    let total: i64 = results.iter().map(|r| r.value).sum();
    assert_eq!(total, (0..20).sum::<i64>());
    let fire_times: Vec<EventTime> = results.iter().map(|r| r.window.max_timestamp()).collect();
    assert!(fire_times.windows(2).all(|p| p[0] <= p[1]));
}
