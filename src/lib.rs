//! # docker-guardian
//!
//! **Docker-Guardian** is a supervisor daemon that watches containers
//! managed by a local Docker runtime and drives corrective actions
//! (restart, quarantine-stop, or notify) when they become unhealthy or are
//! orphaned by the lifecycle of a container they depend on. It deploys
//! alongside the runtime (socket-mounted) and coexists with image updaters,
//! backup tools, and manual maintenance without fighting them.
//!
//! ## Subsystems
//!
//! | Area           | Description                                                      | Key types                                  |
//! |----------------|------------------------------------------------------------------|--------------------------------------------|
//! | **Engine**     | Event-driven control loop, guards, restart tracking, debouncing. | [`Guardian`], [`RestartTracker`]           |
//! | **Runtime**    | Capability trait, bollard client, reconnecting event watcher.    | [`ContainerApi`], [`DockerClient`], [`EventWatcher`] |
//! | **Notify**     | Category-filtered, rate-limited fan-out to HTTP transports.      | [`Notify`], [`Dispatcher`]                 |
//! | **Config**     | Flat environment-derived options with collected validation.      | [`Config`]                                 |
//! | **Time**       | Injected clock; virtual time in tests.                           | [`Clock`], [`SystemClock`]                 |
//! | **Observability** | Hand-rolled metric registry served at `/metrics`.             | [`Metrics`]                                |
//!
//! ## Rules
//! - All state is process-local and ephemeral; nothing persists to disk.
//! - One ambient [`CancellationToken`](tokio_util::sync::CancellationToken)
//!   propagates from process start to every task; every suspension point
//!   observes it.
//! - The engine trusts whoever mounts the Docker socket; there is no
//!   authentication layer.

pub mod clock;
pub mod config;
pub mod docker;
pub mod error;
pub mod guardian;
pub mod logging;
pub mod metrics;
pub mod notify;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

#[cfg(test)]
mod config_tests;

// ---- Public re-exports ----

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{BackupMode, Config, NotifyCategory};
pub use docker::{ContainerApi, ContainerEvent, DockerClient, EventWatcher};
pub use error::GuardianError;
pub use guardian::{Guardian, RestartTracker, SkipReason, TrackerConfig};
pub use metrics::Metrics;
pub use notify::{Dispatcher, Notify};
