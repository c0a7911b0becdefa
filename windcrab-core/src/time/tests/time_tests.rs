use super::*;
use proptest::prelude::*;

fn w(start: EventTime, end: EventTime) -> TimeWindow {
    TimeWindow::new(start, end)
}

// ── TriggerClock ──────────────────────────────────────────────────────────

#[test]
fn test_empty_clock_has_no_timer() {
    let clock = TriggerClock::new();
    assert!(clock.is_empty());
    assert_eq!(clock.next_timer(), None);
    assert_eq!(clock.current_progress(), EVENT_TIME_MIN);
}

#[test]
fn test_advance_drains_due_timers_in_order() {
    let mut clock = TriggerClock::new();
    clock.register_timer(b"b", &w(10, 20), 19);
    clock.register_timer(b"a", &w(0, 10), 9);
    clock.register_timer(b"c", &w(20, 30), 29);

    let due = clock.advance(20);
    let fired: Vec<_> = due.iter().map(|t| (t.key.clone(), t.fire_at)).collect();
    assert_eq!(fired, vec![(b"a".to_vec(), 9), (b"b".to_vec(), 19)]);
    assert_eq!(clock.len(), 1);
    assert_eq!(clock.next_timer(), Some(29));
}

#[test]
fn test_same_firing_time_orders_by_window_start_then_key() {
    let mut clock = TriggerClock::new();
    // Ties on firing time are broken by window start, then by key bytes
    clock.register_timer(b"k2", &w(5, 15), 14);
    clock.register_timer(b"k1", &w(5, 15), 14);
    clock.register_timer(b"k9", &w(0, 15), 14);

    let due = clock.advance(14);
    let order: Vec<_> = due.iter().map(|t| (t.window.start, t.key.clone())).collect();
    assert_eq!(
        order,
        vec![(0, b"k9".to_vec()), (5, b"k1".to_vec()), (5, b"k2".to_vec())]
    );
}

#[test]
fn test_register_same_window_twice_keeps_one_timer() {
    let mut clock = TriggerClock::new();
    assert!(clock.register_timer(b"k", &w(0, 10), 9));
    assert!(!clock.register_timer(b"k", &w(0, 10), 9));
    assert_eq!(clock.len(), 1);

    // Moving the firing time replaces the old entry
    assert!(clock.register_timer(b"k", &w(0, 10), 12));
    assert_eq!(clock.len(), 1);
    assert_eq!(clock.timer_for(b"k", &w(0, 10)), Some(12));
    assert!(clock.advance(9).is_empty());
    assert_eq!(clock.advance(12).len(), 1);
}

#[test]
fn test_cancel_removes_timer() {
    let mut clock = TriggerClock::new();
    clock.register_timer(b"k", &w(0, 10), 9);
    assert_eq!(clock.cancel(b"k", &w(0, 10)), Some(9));
    assert_eq!(clock.cancel(b"k", &w(0, 10)), None);
    assert!(clock.advance(100).is_empty());
}

#[test]
fn test_advance_is_idempotent_and_monotonic() {
    let mut clock = TriggerClock::new();
    clock.register_timer(b"k", &w(0, 10), 9);
    assert_eq!(clock.advance(10).len(), 1);
    assert!(clock.advance(10).is_empty());

    clock.register_timer(b"k", &w(10, 20), 19);
    // Regressed progress is ignored
    assert!(clock.advance(5).is_empty());
    assert_eq!(clock.current_progress(), 10);
    assert_eq!(clock.advance(19).len(), 1);
}

#[test]
fn test_restore_progress_does_not_fire() {
    let mut clock = TriggerClock::new();
    clock.register_timer(b"k", &w(0, 10), 9);
    clock.restore_progress(8);
    assert_eq!(clock.len(), 1);
    assert_eq!(clock.current_progress(), 8);
    assert!(clock.advance(8).is_empty());
    assert_eq!(clock.advance(9).len(), 1);
}

// ── Processing time ───────────────────────────────────────────────────────

#[test]
fn test_manual_processing_time_shared_between_clones() {
    let clock = ManualProcessingTime::new(1_000);
    let view = clock.clone();
    clock.advance_by(500);
    assert_eq!(view.now(), 1_500);
    view.set(42);
    assert_eq!(clock.now(), 42);
}

#[test]
fn test_system_processing_time_is_after_epoch() {
    assert!(SystemProcessingTime.now() > 0);
}

// ── Properties ────────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn prop_advance_fires_each_timer_once_in_order(
        timers in prop::collection::vec((0u8..4, 0i64..50, 1i64..20), 0..40),
        steps in prop::collection::vec(-10i64..120, 1..10),
    ) {
        let mut clock = TriggerClock::new();
        let mut expected = std::collections::BTreeSet::new();
        for (key, start, len) in &timers {
            let window = w(*start, start + len);
            let fire_at = window.max_timestamp();
            clock.register_timer(&[*key], &window, fire_at);
            expected.insert(([*key].to_vec(), window));
        }

        let mut fired = Vec::new();
        let mut high = EVENT_TIME_MIN;
        for step in steps.iter().copied().chain(std::iter::once(200)) {
            let due = clock.advance(step);
            if step <= high {
                prop_assert!(due.is_empty());
            }
            high = high.max(step);
            for t in &due {
                prop_assert!(t.fire_at <= high);
            }
            prop_assert!(due.windows(2).all(|p|
                (p[0].fire_at, p[0].window.start, &p[0].key) <= (p[1].fire_at, p[1].window.start, &p[1].key)
            ));
            fired.extend(due.into_iter().map(|t| (t.key, t.window)));
        }

        prop_assert_eq!(fired.len(), expected.len());
        let fired: std::collections::BTreeSet<_> = fired.into_iter().collect();
        prop_assert_eq!(fired, expected);
        prop_assert!(clock.is_empty());
    }
}
