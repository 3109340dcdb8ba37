//! # Orchestration ledger.
//!
//! An in-memory window of create/destroy activity per container name.
//! Recent entries are evidence that an external updater (Watchtower and
//! friends) is reworking the stack; the guard pipeline defers to it.
//!
//! Populated two ways: live events in event-driven mode, and a one-shot
//! `events(since, until)` query absorbed at the start of each full scan so
//! the first scan after startup still sees the preceding cooldown window.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::clock::Clock;
use crate::docker::OrchestrationRecord;

/// Name-keyed record of the most recent create/destroy instant.
pub struct OrchestrationLedger {
    entries: Mutex<HashMap<String, DateTime<Utc>>>,
    clock: Arc<dyn Clock>,
}

impl OrchestrationLedger {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Records activity for a name, keeping the most recent instant.
    pub fn record(&self, name: &str, at: DateTime<Utc>) {
        let mut entries = self.entries.lock().unwrap();
        let slot = entries.entry(name.to_string()).or_insert(at);
        if at > *slot {
            *slot = at;
        }
    }

    /// Absorbs records from a one-shot events query.
    pub fn absorb(&self, records: &[OrchestrationRecord]) {
        for rec in records {
            self.record(&rec.name, rec.timestamp);
        }
    }

    /// True when any name saw activity within the window.
    pub fn any_within(&self, window: Duration) -> bool {
        let cutoff = self.cutoff(window);
        self.entries
            .lock()
            .unwrap()
            .values()
            .any(|ts| *ts > cutoff)
    }

    /// True when this specific name saw activity within the window.
    pub fn contains_within(&self, name: &str, window: Duration) -> bool {
        let cutoff = self.cutoff(window);
        self.entries
            .lock()
            .unwrap()
            .get(name)
            .is_some_and(|ts| *ts > cutoff)
    }

    /// Drops entries older than the window. Called opportunistically; staying
    /// behind only costs memory, never correctness, since reads re-check the
    /// cutoff.
    pub fn prune(&self, window: Duration) {
        let cutoff = self.cutoff(window);
        self.entries.lock().unwrap().retain(|_, ts| *ts > cutoff);
    }

    fn cutoff(&self, window: Duration) -> DateTime<Utc> {
        self.clock.now() - chrono::Duration::from_std(window).unwrap_or(chrono::Duration::zero())
    }
}
