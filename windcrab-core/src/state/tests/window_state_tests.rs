use super::*;
use crate::window::SumAggregator;

fn state(capacity: usize) -> WindowState<i64> {
    WindowState::new(HashMapStateBackend::new(), capacity)
}

fn ctx(key: &str) -> KeyContext {
    KeyContext::encode(&key.to_string()).unwrap()
}

fn w(start: EventTime, end: EventTime) -> TimeWindow {
    TimeWindow::new(start, end)
}

#[test]
fn test_key_context_round_trip() {
    let key = ctx("sensor-1");
    assert_eq!(key.decode::<String>().unwrap(), "sensor-1");
    assert_eq!(KeyContext::from_bytes(key.as_bytes().to_vec()), key);
}

#[test]
fn test_merge_creates_then_accumulates() {
    let mut st = state(16);
    let k = ctx("k");
    assert!(st.merge(&k, &w(0, 10), 9, &5, &SumAggregator).unwrap());
    assert!(!st.merge(&k, &w(0, 10), 9, &3, &SumAggregator).unwrap());
    assert_eq!(st.fire(&k, &w(0, 10), &SumAggregator).unwrap(), Some(8));
}

#[test]
fn test_fire_unknown_window_is_none() {
    let mut st = state(16);
    assert_eq!(st.fire(&ctx("k"), &w(0, 10), &SumAggregator).unwrap(), None);
}

#[test]
fn test_keys_are_isolated() {
    let mut st = state(16);
    st.merge(&ctx("a"), &w(0, 10), 9, &1, &SumAggregator).unwrap();
    st.merge(&ctx("b"), &w(0, 10), 9, &2, &SumAggregator).unwrap();
    assert_eq!(st.fire(&ctx("a"), &w(0, 10), &SumAggregator).unwrap(), Some(1));
    assert_eq!(st.fire(&ctx("b"), &w(0, 10), &SumAggregator).unwrap(), Some(2));
}

#[test]
fn test_buffer_spills_past_capacity() {
    let mut st = state(2);
    let k = ctx("k");
    st.merge(&k, &w(0, 10), 9, &1, &SumAggregator).unwrap();
    st.merge(&k, &w(10, 20), 19, &2, &SumAggregator).unwrap();
    assert_eq!(st.buffered_len(), 2);
    assert!(st.backend().is_empty());

    st.merge(&k, &w(20, 30), 29, &3, &SumAggregator).unwrap();
    assert_eq!(st.buffered_len(), 0);
    assert_eq!(st.backend().len(), 3);

    // Spilled entries keep accumulating through the backend
    st.merge(&k, &w(0, 10), 9, &10, &SumAggregator).unwrap();
    assert_eq!(st.fire(&k, &w(0, 10), &SumAggregator).unwrap(), Some(11));
}

#[test]
fn test_clear_removes_buffered_and_spilled_entry() {
    let mut st = state(16);
    let k = ctx("k");
    st.merge(&k, &w(0, 10), 9, &1, &SumAggregator).unwrap();
    st.flush().unwrap();
    st.merge(&k, &w(0, 10), 9, &1, &SumAggregator).unwrap();

    st.clear(&k, &w(0, 10)).unwrap();
    assert_eq!(st.fire(&k, &w(0, 10), &SumAggregator).unwrap(), None);
    assert!(st.entries().unwrap().is_empty());
}

#[test]
fn test_aggregation_failure_is_typed() {
    let mut st = state(16);
    let k = ctx("k");
    st.merge(&k, &w(0, 10), 9, &i64::MAX, &SumAggregator).unwrap();
    let err = st.merge(&k, &w(0, 10), 9, &1, &SumAggregator).unwrap_err();
    match err.downcast_ref::<WindowError>().unwrap() {
        WindowError::Aggregation { window, .. } => assert_eq!(*window, w(0, 10)),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_session_merge_moves_accumulators() {
    let mut st = state(16);
    let k = ctx("k");
    let firing = |w: &TimeWindow| w.max_timestamp();

    let first = st
        .merge_session_window(&k, w(10, 20), firing, &SumAggregator)
        .unwrap();
    assert_eq!(first.window, w(10, 20));
    assert!(first.retired.is_empty());
    st.merge(&k, &first.window, 19, &4, &SumAggregator).unwrap();

    let second = st
        .merge_session_window(&k, w(15, 25), firing, &SumAggregator)
        .unwrap();
    assert_eq!(second.window, w(10, 25));
    assert_eq!(second.retired, vec![w(10, 20)]);
    st.merge(&k, &second.window, 24, &6, &SumAggregator).unwrap();

    assert_eq!(st.sessions(&k).unwrap(), vec![w(10, 25)]);
    assert_eq!(st.fire(&k, &w(10, 25), &SumAggregator).unwrap(), Some(10));
    assert_eq!(st.fire(&k, &w(10, 20), &SumAggregator).unwrap(), None);

    let entries = st.entries().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].1, w(10, 25));
    assert_eq!(entries[0].2.fire_at, 24);
}

#[test]
fn test_session_merge_of_spilled_windows() {
    let mut st = state(1);
    let k = ctx("k");
    let firing = |w: &TimeWindow| w.max_timestamp();

    for (start, value) in [(0, 1), (20, 2)] {
        let merged = st
            .merge_session_window(&k, w(start, start + 5), firing, &SumAggregator)
            .unwrap();
        st.merge(&k, &merged.window, firing(&merged.window), &value, &SumAggregator)
            .unwrap();
    }
    st.flush().unwrap();

    // A record bridging both sessions
    let merged = st
        .merge_session_window(&k, w(4, 21), firing, &SumAggregator)
        .unwrap();
    assert_eq!(merged.window, w(0, 25));
    assert_eq!(merged.retired, vec![w(0, 5), w(20, 25)]);
    st.merge(&k, &merged.window, 24, &3, &SumAggregator).unwrap();
    assert_eq!(st.fire(&k, &w(0, 25), &SumAggregator).unwrap(), Some(6));
}

#[test]
fn test_clear_session_drops_window_from_set() {
    let mut st = state(16);
    let k = ctx("k");
    let merged = st
        .merge_session_window(&k, w(0, 5), |w| w.max_timestamp(), &SumAggregator)
        .unwrap();
    st.merge(&k, &merged.window, 4, &1, &SumAggregator).unwrap();

    st.clear(&k, &w(0, 5)).unwrap();
    assert_eq!(st.sessions(&k).unwrap(), vec![w(0, 5)]);
    st.clear_session(&k, &w(0, 5)).unwrap();
    assert!(st.sessions(&k).unwrap().is_empty());
    assert!(st.backend().is_empty());
}

#[test]
fn test_snapshot_restore_preserves_entries() {
    let mut st = state(16);
    st.merge(&ctx("a"), &w(0, 10), 9, &7, &SumAggregator).unwrap();
    st.merge(&ctx("b"), &w(10, 20), 19, &9, &SumAggregator).unwrap();
    let bytes = st.snapshot().unwrap();

    let mut restored = state(16);
    restored.restore(&bytes).unwrap();
    assert_eq!(restored.entries().unwrap(), st.entries().unwrap());
    assert_eq!(
        restored.fire(&ctx("b"), &w(10, 20), &SumAggregator).unwrap(),
        Some(9)
    );
}
