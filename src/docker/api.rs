//! # Runtime capability set.
//!
//! [`ContainerApi`] is the narrow interface the decision engine depends on.
//! The production implementation is [`DockerClient`](super::DockerClient);
//! tests inject a scripted fake. Keeping the surface this small is what makes
//! test doubles trivial and would let a different OCI engine slot in.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::docker::event::OrchestrationRecord;
use crate::error::GuardianError;

/// Short form of an opaque container id, used in logs and notifications.
pub fn short_id(id: &str) -> &str {
    &id[..id.len().min(12)]
}

/// Canonical display name: the first reported name with the leading `/`
/// stripped.
pub fn display_name(name: &str) -> &str {
    name.strip_prefix('/').unwrap_or(name)
}

/// A container as reported by list operations.
#[derive(Clone, Debug, Default)]
pub struct ContainerSummary {
    pub id: String,
    pub names: Vec<String>,
    pub image: String,
    pub state: String,
    pub labels: HashMap<String, String>,
}

impl ContainerSummary {
    /// First reported name, cleaned for display. `None` when the runtime
    /// reported no names (such containers are skipped by the handlers).
    pub fn display_name(&self) -> Option<&str> {
        self.names.first().map(|n| display_name(n))
    }
}

/// A container as reported by inspect.
#[derive(Clone, Debug, Default)]
pub struct ContainerDetails {
    /// Canonical name, leading `/` stripped.
    pub name: String,
    /// Status string: `running`, `exited`, `restarting`, ...
    pub status: String,
    pub exit_code: i64,
    /// When the container last stopped. `None` if the runtime did not report
    /// a parseable instant.
    pub finished_at: Option<DateTime<Utc>>,
    /// Host network mode; `container:<id>` marks a donated network namespace.
    pub network_mode: String,
    pub labels: HashMap<String, String>,
}

/// The subset of runtime operations the engine consumes.
///
/// All operations are one-shot calls; streaming subscription lives on the
/// [`EventWatcher`](super::EventWatcher) instead, so fakes without a stream
/// automatically put the controller into polling mode.
#[async_trait]
pub trait ContainerApi: Send + Sync {
    /// Containers with health status `unhealthy`, optionally filtered by
    /// label (`"all"` means no label filter) and running state.
    async fn list_unhealthy(
        &self,
        label: &str,
        only_running: bool,
    ) -> Result<Vec<ContainerSummary>, GuardianError>;

    /// All containers with status `exited`.
    async fn list_exited(&self) -> Result<Vec<ContainerSummary>, GuardianError>;

    /// All containers with status `running`.
    async fn list_running(&self) -> Result<Vec<ContainerSummary>, GuardianError>;

    async fn inspect(&self, id: &str) -> Result<ContainerDetails, GuardianError>;

    async fn restart(&self, id: &str, stop_timeout: i64) -> Result<(), GuardianError>;

    async fn start(&self, id: &str) -> Result<(), GuardianError>;

    async fn stop(&self, id: &str, stop_timeout: i64) -> Result<(), GuardianError>;

    /// Current status string of a container.
    async fn status(&self, id: &str) -> Result<String, GuardianError>;

    /// When the container last stopped.
    async fn finished_at(&self, id: &str) -> Result<DateTime<Utc>, GuardianError>;

    /// Output of the latest healthcheck probe, trimmed and truncated.
    /// Empty when no health log is available.
    async fn health_log(&self, id: &str) -> Result<String, GuardianError>;

    /// Container events in a closed time window, collapsed to orchestration
    /// records. With `orchestration_only` the query is restricted to
    /// create/destroy (the image-updater signature).
    async fn events_window(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
        orchestration_only: bool,
    ) -> Result<Vec<OrchestrationRecord>, GuardianError>;
}
