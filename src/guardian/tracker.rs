//! # Per-container restart tracking: backoff, budget, circuit breaker.
//!
//! [`RestartTracker`] is the state machine that keeps a flapping container
//! from being restarted in a tight loop:
//!
//! - **Backoff**: each recorded restart schedules the earliest next attempt,
//!   with a capped multiplicative delay (10 s, then x`multiplier` up to `max`).
//! - **Budget**: at most `budget` restarts inside a rolling `window`; the
//!   attempt that would exceed it trips the circuit.
//! - **Circuit**: once open, no restarts for that container until an
//!   explicit [`reset`](RestartTracker::reset) (a healthy transition).
//!
//! ## Rules
//! - `should_restart` and `record_restart` need not be atomic with each
//!   other; two racing detections may both pass the check and both record,
//!   which only widens the next backoff.
//! - Pruning drops restarts older than `now - window` with a stable
//!   in-place compaction, preserving order.
//! - If circuit and backoff both apply, circuit wins.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::clock::Clock;

/// Delay scheduled after the first recorded restart.
const INITIAL_BACKOFF: Duration = Duration::from_secs(10);

/// Backoff and budget settings for the tracker.
#[derive(Clone, Copy, Debug)]
pub struct TrackerConfig {
    /// Multiplicative factor applied to the delay on each restart (>= 1.0).
    pub multiplier: f64,
    /// Cap on the per-container delay.
    pub max_backoff: Duration,
    /// Restarts allowed inside the window. `0` disables the budget.
    pub budget: usize,
    /// Rolling window for the budget.
    pub window: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            multiplier: 2.0,
            max_backoff: Duration::from_secs(300),
            budget: 5,
            window: Duration::from_secs(300),
        }
    }
}

/// Why a restart was suppressed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// The container is still inside its backoff delay.
    Backoff,
    /// The restart budget is exhausted; the circuit is open.
    Circuit,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Backoff => "backoff",
            SkipReason::Circuit => "circuit",
        }
    }
}

/// Restart history for one container.
#[derive(Clone, Debug, Default)]
struct ContainerHistory {
    /// Timestamps of recent restarts, monotonically non-decreasing.
    restarts: Vec<DateTime<Utc>>,
    /// Earliest instant a new restart is permitted.
    backoff_until: Option<DateTime<Utc>>,
    /// Current per-container delay; `None` until the first restart.
    backoff_delay: Option<Duration>,
    /// Once set, no further restarts until reset.
    circuit_open: bool,
    /// Consecutive unhealthy detections.
    unhealthy_count: u32,
}

/// Thread-safe per-container restart state.
///
/// All histories live behind one mutex; entries are created lazily on first
/// mention of an id and dropped by [`reset`](Self::reset).
pub struct RestartTracker {
    history: Mutex<HashMap<String, ContainerHistory>>,
    cfg: TrackerConfig,
    clock: Arc<dyn Clock>,
}

impl RestartTracker {
    pub fn new(cfg: TrackerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            history: Mutex::new(HashMap::new()),
            cfg,
            clock,
        }
    }

    /// Decides whether a restart is currently allowed.
    ///
    /// Evaluation order: prune stale restarts, then circuit, then backoff,
    /// then budget. The call that finds the budget exhausted is the one that
    /// opens the circuit, so its reason is `Circuit`, not `Backoff`.
    pub fn should_restart(&self, id: &str) -> Result<(), SkipReason> {
        let mut map = self.history.lock().unwrap();
        let h = map.entry(id.to_string()).or_default();
        let now = self.clock.now();

        prune(h, now, self.cfg.window);

        if h.circuit_open {
            return Err(SkipReason::Circuit);
        }
        if let Some(until) = h.backoff_until {
            if now < until {
                return Err(SkipReason::Backoff);
            }
        }
        if self.cfg.budget > 0 && h.restarts.len() >= self.cfg.budget {
            h.circuit_open = true;
            return Err(SkipReason::Circuit);
        }
        Ok(())
    }

    /// Records a restart attempt and advances the backoff schedule.
    ///
    /// Called regardless of whether the runtime action succeeded; a failed
    /// restart still consumes budget and widens the delay.
    pub fn record_restart(&self, id: &str) {
        let mut map = self.history.lock().unwrap();
        let h = map.entry(id.to_string()).or_default();
        let now = self.clock.now();

        h.restarts.push(now);

        let next = match h.backoff_delay {
            None => INITIAL_BACKOFF,
            Some(prev) => prev.mul_f64(self.cfg.multiplier),
        }
        .min(self.cfg.max_backoff);
        h.backoff_delay = Some(next);
        h.backoff_until = now.checked_add_signed(
            chrono::Duration::from_std(next).unwrap_or(chrono::Duration::zero()),
        );
    }

    /// Increments the consecutive-unhealthy counter.
    ///
    /// Returns true once the counter reaches `threshold`.
    pub fn record_unhealthy(&self, id: &str, threshold: u32) -> bool {
        let mut map = self.history.lock().unwrap();
        let h = map.entry(id.to_string()).or_default();
        h.unhealthy_count += 1;
        h.unhealthy_count >= threshold
    }

    /// Clears the consecutive-unhealthy counter.
    pub fn reset_unhealthy(&self, id: &str) {
        let mut map = self.history.lock().unwrap();
        if let Some(h) = map.get_mut(id) {
            h.unhealthy_count = 0;
        }
    }

    /// Drops the container's history entirely (healthy transition).
    pub fn reset(&self, id: &str) {
        self.history.lock().unwrap().remove(id);
    }

    pub fn is_circuit_open(&self, id: &str) -> bool {
        self.history
            .lock()
            .unwrap()
            .get(id)
            .map(|h| h.circuit_open)
            .unwrap_or(false)
    }

    /// Time remaining until the backoff expires. Zero when no backoff is
    /// scheduled.
    pub fn backoff_remaining(&self, id: &str) -> Duration {
        let map = self.history.lock().unwrap();
        let Some(h) = map.get(id) else {
            return Duration::ZERO;
        };
        let Some(until) = h.backoff_until else {
            return Duration::ZERO;
        };
        (until - self.clock.now()).to_std().unwrap_or(Duration::ZERO)
    }

    /// Number of containers currently quarantined by an open circuit.
    pub fn circuit_open_count(&self) -> usize {
        self.history
            .lock()
            .unwrap()
            .values()
            .filter(|h| h.circuit_open)
            .count()
    }

    /// Human-readable explanation of a skip, used in logs and notifications.
    pub fn format_skip_reason(&self, id: &str, name: &str, reason: SkipReason) -> String {
        match reason {
            SkipReason::Backoff => format!(
                "Container {name} in backoff ({}s remaining)",
                self.backoff_remaining(id).as_secs()
            ),
            SkipReason::Circuit => {
                format!("Container {name} circuit open (restart budget exhausted)")
            }
        }
    }
}

/// Stable in-place compaction of restarts outside the window.
fn prune(h: &mut ContainerHistory, now: DateTime<Utc>, window: Duration) {
    if window.is_zero() {
        return;
    }
    let cutoff = now - chrono::Duration::from_std(window).unwrap_or(chrono::Duration::zero());
    h.restarts.retain(|t| *t > cutoff);
}
