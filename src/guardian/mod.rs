//! Decision engine: the event-driven control loop that turns runtime events
//! and periodic scans into at most one disciplined corrective action per
//! container.
//!
//! ## Files & responsibilities
//! - **controller.rs**: wires the engine; full scans, event dispatch, the
//!   polling fallback.
//! - **tracker.rs**: per-container restart history, exponential backoff,
//!   rolling budget, circuit breaker.
//! - **guards.rs**: ordered skip pipeline (orchestration cooldown, grace
//!   period, backup awareness) with per-cycle caching.
//! - **ledger.rs**: rolling window of create/destroy activity per name.
//! - **debounce.rs**: per-key coalescing of actions, cancellable timers.
//! - **unhealthy.rs**: one unhealthy container through guards, tracker,
//!   action labels, and execution.
//! - **dependency.rs**: recovery of exited children orphaned by a living
//!   parent (shared network namespace).
//! - **labels.rs**: the `autoheal.*` label vocabulary.
//! - **hooks.rs**: optional post-action operator script.
//!
//! ## Wiring
//! ```text
//! EventWatcher ──► Guardian::dispatch
//!                    ├─ health_status: unhealthy ─► Debouncer ─► UnhealthyHandler
//!                    ├─ health_status: healthy   ─► RestartTracker::reset
//!                    ├─ die                      ─► Debouncer ─► DependencyResolver
//!                    └─ create/destroy           ─► OrchestrationLedger
//!
//! Both handlers consult GuardPipeline and (for unhealthy) RestartTracker
//! before calling into the runtime client and the notifier.
//! ```

mod controller;
mod debounce;
mod dependency;
mod guards;
mod hooks;
mod labels;
mod ledger;
mod tracker;
mod unhealthy;

pub use controller::Guardian;
pub use debounce::Debouncer;
pub use dependency::DependencyResolver;
pub use guards::{GuardPipeline, GuardVerdict, ScanCache};
pub use labels::{container_action, notify_suppressed, opted_out, ContainerAction};
pub use ledger::OrchestrationLedger;
pub use tracker::{RestartTracker, SkipReason, TrackerConfig};
pub use unhealthy::UnhealthyHandler;

#[cfg(test)]
mod controller_tests;
#[cfg(test)]
mod dependency_tests;
#[cfg(test)]
mod tracker_tests;
