//! Notification fan-out.
//!
//! The engine speaks three verbs through the [`Notify`] capability:
//! `startup` once at boot, `action` for every corrective action (success or
//! failure, `[CRITICAL]` prefix when a circuit opens), and `skip` when a
//! guard suppresses an action.
//!
//! [`Dispatcher`] is the production implementation: it filters by the
//! operator's subscribed categories, rate-limits repeats, and fans out to
//! every configured HTTP transport concurrently. Notification failures are
//! logged and counted, never surfaced to the engine.

mod dispatcher;

use async_trait::async_trait;

pub use dispatcher::Dispatcher;

/// Notification capability consumed by the engine.
#[async_trait]
pub trait Notify: Send + Sync {
    /// One-time startup announcement.
    async fn startup(&self, text: &str);

    /// A corrective action happened (or failed). Retried on transport
    /// failure.
    async fn action(&self, text: &str);

    /// A guard suppressed an action. Single attempt.
    async fn skip(&self, text: &str);

    /// Waits for in-flight sends to drain, bounded by a grace period.
    async fn close(&self);
}

#[cfg(test)]
mod dispatcher_tests;
