//! # Per-key action coalescing.
//!
//! High-frequency events collapse to at most one action per key within a
//! rolling window. Scheduling a key that already has a pending timer cancels
//! the old timer and restarts the window, so only the last action runs.
//!
//! ## Rules
//! - Keys are composite strings (`"unhealthy:<id>"`, `"dep:<id>"`).
//! - A fired timer removes its own map entry before invoking the action.
//! - Actions observe the ambient token and no-op once it is cancelled.
//! - The map lock is never held while an action runs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

/// A pending timer: generation id plus its cancel handle. The generation
/// lets a firing timer verify the entry still belongs to it before removal.
struct Pending {
    generation: u64,
    cancel: CancellationToken,
}

/// Cancellable per-key delay timers.
#[derive(Clone)]
pub struct Debouncer {
    window: Duration,
    timers: Arc<DashMap<String, Pending>>,
    generations: Arc<AtomicU64>,
    /// Ambient token: cancelling it voids every pending action.
    root: CancellationToken,
}

impl Debouncer {
    pub fn new(window: Duration, root: CancellationToken) -> Self {
        Self {
            window,
            timers: Arc::new(DashMap::new()),
            generations: Arc::new(AtomicU64::new(0)),
            root,
        }
    }

    /// Schedules `action` to run after the window, replacing any pending
    /// timer for the same key.
    pub fn schedule<F, Fut>(&self, key: &str, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let generation = self.generations.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();

        if let Some(prev) = self.timers.insert(
            key.to_string(),
            Pending {
                generation,
                cancel: cancel.clone(),
            },
        ) {
            prev.cancel.cancel();
        }

        let timers = Arc::clone(&self.timers);
        let root = self.root.clone();
        let window = self.window;
        let key = key.to_string();

        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(window) => {}
                _ = cancel.cancelled() => return, // replaced by a newer timer
                _ = root.cancelled() => {
                    timers.remove_if(&key, |_, p| p.generation == generation);
                    return;
                }
            }

            // Drop the entry first so a re-schedule during the action starts
            // a fresh window instead of finding a stale handle.
            timers.remove_if(&key, |_, p| p.generation == generation);

            if root.is_cancelled() {
                return;
            }
            action().await;
        });
    }

    /// Number of pending timers, for introspection and tests.
    pub fn pending(&self) -> usize {
        self.timers.len()
    }
}
