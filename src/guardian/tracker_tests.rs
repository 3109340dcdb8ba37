use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use super::tracker::{RestartTracker, SkipReason, TrackerConfig};
use crate::clock::ManualClock;

const ID: &str = "0123456789abcdef";

fn tracker(cfg: TrackerConfig) -> (RestartTracker, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    (RestartTracker::new(cfg, clock.clone()), clock)
}

#[test]
fn fresh_container_is_allowed() {
    let (t, _clock) = tracker(TrackerConfig::default());
    assert!(t.should_restart(ID).is_ok());
    assert_eq!(t.backoff_remaining(ID), Duration::ZERO);
}

#[test]
fn backoff_grows_by_multiplier_up_to_cap() {
    let cfg = TrackerConfig {
        multiplier: 2.0,
        max_backoff: Duration::from_secs(300),
        budget: 0,
        window: Duration::from_secs(3600),
    };
    let (t, clock) = tracker(cfg);

    // After the k-th restart the delay is min(10 * 2^(k-1), 300).
    let mut expected = 10u64;
    for _ in 0..8 {
        t.record_restart(ID);
        let remaining = t.backoff_remaining(ID).as_secs();
        assert!(
            remaining.abs_diff(expected) <= 1,
            "expected ~{expected}s, got {remaining}s"
        );
        // Step past the current backoff so the next attempt is legal.
        clock.advance(Duration::from_secs(expected + 1));
        assert!(t.should_restart(ID).is_ok());
        expected = (expected * 2).min(300);
    }
}

#[test]
fn restart_inside_backoff_is_suppressed() {
    let (t, clock) = tracker(TrackerConfig {
        budget: 0,
        ..TrackerConfig::default()
    });
    t.record_restart(ID);
    assert_eq!(t.should_restart(ID), Err(SkipReason::Backoff));

    clock.advance(Duration::from_secs(11));
    assert!(t.should_restart(ID).is_ok());
}

#[test]
fn budget_exhaustion_opens_circuit() {
    let cfg = TrackerConfig {
        multiplier: 1.0,
        max_backoff: Duration::from_secs(1),
        budget: 2,
        window: Duration::from_secs(600),
    };
    let (t, clock) = tracker(cfg);

    for _ in 0..2 {
        assert!(t.should_restart(ID).is_ok());
        t.record_restart(ID);
        clock.advance(Duration::from_millis(1500));
    }

    // The check that exhausts the budget reports circuit, not backoff.
    assert_eq!(t.should_restart(ID), Err(SkipReason::Circuit));
    assert!(t.is_circuit_open(ID));
    assert_eq!(t.circuit_open_count(), 1);

    // Circuit stays open on subsequent checks.
    clock.advance(Duration::from_secs(60));
    assert_eq!(t.should_restart(ID), Err(SkipReason::Circuit));
}

#[test]
fn zero_budget_is_unlimited() {
    let cfg = TrackerConfig {
        multiplier: 1.0,
        max_backoff: Duration::from_secs(1),
        budget: 0,
        window: Duration::from_secs(60),
    };
    let (t, clock) = tracker(cfg);

    for _ in 0..50 {
        assert!(t.should_restart(ID).is_ok());
        t.record_restart(ID);
        clock.advance(Duration::from_secs(2));
    }
    assert!(!t.is_circuit_open(ID));
}

#[test]
fn window_pruning_clears_budget_pressure() {
    let cfg = TrackerConfig {
        multiplier: 1.0,
        max_backoff: Duration::from_secs(1),
        budget: 3,
        window: Duration::from_secs(100),
    };
    let (t, clock) = tracker(cfg);

    for _ in 0..3 {
        t.record_restart(ID);
        clock.advance(Duration::from_secs(2));
    }

    // All three restarts age out of the window before the next check.
    clock.advance(Duration::from_secs(101));
    assert!(t.should_restart(ID).is_ok());
    assert!(!t.is_circuit_open(ID));
}

#[test]
fn circuit_beats_backoff() {
    let cfg = TrackerConfig {
        multiplier: 2.0,
        max_backoff: Duration::from_secs(300),
        budget: 1,
        window: Duration::from_secs(600),
    };
    let (t, _clock) = tracker(cfg);

    t.record_restart(ID);
    // Still inside backoff AND over budget: circuit wins.
    assert_eq!(t.should_restart(ID), Err(SkipReason::Circuit));
}

#[test]
fn reset_clears_everything() {
    let cfg = TrackerConfig {
        budget: 1,
        ..TrackerConfig::default()
    };
    let (t, _clock) = tracker(cfg);

    t.record_restart(ID);
    assert_eq!(t.should_restart(ID), Err(SkipReason::Circuit));

    t.reset(ID);
    assert!(t.should_restart(ID).is_ok());
    assert_eq!(t.backoff_remaining(ID), Duration::ZERO);
    assert!(!t.is_circuit_open(ID));
    assert_eq!(t.circuit_open_count(), 0);
}

#[test]
fn unhealthy_counter_reaches_threshold() {
    let (t, _clock) = tracker(TrackerConfig::default());

    assert!(!t.record_unhealthy(ID, 3));
    assert!(!t.record_unhealthy(ID, 3));
    assert!(t.record_unhealthy(ID, 3));

    t.reset_unhealthy(ID);
    assert!(!t.record_unhealthy(ID, 3));
}

#[test]
fn threshold_of_one_acts_immediately() {
    let (t, _clock) = tracker(TrackerConfig::default());
    assert!(t.record_unhealthy(ID, 1));
}

#[test]
fn skip_reason_formatting_names_the_container() {
    let (t, _clock) = tracker(TrackerConfig {
        budget: 1,
        ..TrackerConfig::default()
    });
    t.record_restart(ID);

    let msg = t.format_skip_reason(ID, "web", SkipReason::Backoff);
    assert!(msg.contains("web"));
    assert!(msg.contains("backoff"));

    let msg = t.format_skip_reason(ID, "web", SkipReason::Circuit);
    assert!(msg.contains("circuit open"));
}

#[test]
fn histories_are_independent_per_container() {
    let cfg = TrackerConfig {
        budget: 1,
        ..TrackerConfig::default()
    };
    let (t, _clock) = tracker(cfg);

    t.record_restart("aaaaaaaaaaaa");
    assert_eq!(t.should_restart("aaaaaaaaaaaa"), Err(SkipReason::Circuit));
    assert!(t.should_restart("bbbbbbbbbbbb").is_ok());
}

#[test]
fn clock_never_consulted_on_wall_time() {
    // A frozen clock means backoff_remaining stays constant; this guards
    // against any path reading the OS clock directly.
    let (t, _clock) = tracker(TrackerConfig::default());
    t.record_restart(ID);
    let a = t.backoff_remaining(ID);
    std::thread::sleep(Duration::from_millis(20));
    let b = t.backoff_remaining(ID);
    assert_eq!(a, b);
}
