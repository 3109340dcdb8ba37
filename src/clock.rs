//! # Abstract time source.
//!
//! Every time-dependent component (tracker, guards, ledger, dispatcher)
//! reads time through [`Clock`] instead of the wall clock. Production code
//! injects [`SystemClock`]; the test suite injects [`ManualClock`] and
//! advances it explicitly, which makes backoff windows, grace periods and
//! rolling budgets deterministic to the second.
//!
//! ## Rules
//! - `now()` is wall-clock UTC so it can be compared against timestamps the
//!   Docker API reports (RFC 3339 `FinishedAt`, event unix times).
//! - `sleep()` is a suspension point; callers wrap it in `tokio::select!`
//!   with a cancellation token when they need to abort early.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Time capability injected into time-dependent components.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> DateTime<Utc>;

    /// Elapsed time since `earlier`. Zero if `earlier` is in the future.
    fn since(&self, earlier: DateTime<Utc>) -> Duration {
        (self.now() - earlier).to_std().unwrap_or(Duration::ZERO)
    }

    /// Suspends the caller for `dur`.
    async fn sleep(&self, dur: Duration);
}

/// Production clock backed by the OS.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, dur: Duration) {
        tokio::time::sleep(dur).await;
    }
}

/// Manually advanced clock for tests.
///
/// `sleep` completes once `advance` has moved the clock past the deadline;
/// it never consults the OS, so tests control every timer explicitly.
pub struct ManualClock {
    now: std::sync::Mutex<DateTime<Utc>>,
    tick: tokio::sync::Notify,
}

impl ManualClock {
    /// Creates a clock frozen at `start`.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: std::sync::Mutex::new(start),
            tick: tokio::sync::Notify::new(),
        }
    }

    /// Moves the clock forward and wakes pending `sleep` calls.
    pub fn advance(&self, dur: Duration) {
        {
            let mut now = self.now.lock().unwrap();
            *now += chrono::Duration::from_std(dur).expect("advance out of range");
        }
        self.tick.notify_waiters();
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }

    async fn sleep(&self, dur: Duration) {
        let deadline = self.now() + chrono::Duration::from_std(dur).expect("sleep out of range");
        loop {
            // Enable the waiter before re-checking so an advance between the
            // check and the await cannot be missed.
            let notified = self.tick.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.now() >= deadline {
                return;
            }
            notified.await;
        }
    }
}
