//! # Production runtime client backed by bollard.
//!
//! Thin marshalling layer over the Docker Engine API: each [`ContainerApi`]
//! operation maps to one HTTP call on the mounted socket. No decisions are
//! made here; the engine owns all policy.

use std::collections::HashMap;

use async_trait::async_trait;
use bollard::container::{
    InspectContainerOptions, ListContainersOptions, RestartContainerOptions, StartContainerOptions,
    StopContainerOptions,
};
use bollard::system::EventsOptions;
use bollard::Docker;
use chrono::{DateTime, Utc};
use futures::StreamExt;

use crate::docker::api::{display_name, ContainerApi, ContainerDetails, ContainerSummary};
use crate::docker::event::{decode_orchestration, OrchestrationRecord};
use crate::error::GuardianError;

/// Healthcheck probe output is clipped to this many characters in
/// notifications.
const HEALTH_LOG_LIMIT: usize = 200;

/// Docker Engine client for the mounted socket.
#[derive(Clone)]
pub struct DockerClient {
    api: Docker,
}

impl DockerClient {
    /// Connects to the Docker socket at `sock`.
    ///
    /// `timeout_secs` bounds each API call; a wedged daemon must not wedge
    /// the supervisor.
    pub fn connect(sock: &str, timeout_secs: u64) -> Result<Self, GuardianError> {
        let api = Docker::connect_with_socket(sock, timeout_secs, bollard::API_DEFAULT_VERSION)?;
        Ok(Self { api })
    }

    /// Clone of the underlying bollard handle, used by the event watcher.
    pub(crate) fn raw(&self) -> Docker {
        self.api.clone()
    }

    async fn list(
        &self,
        all: bool,
        filters: HashMap<String, Vec<String>>,
    ) -> Result<Vec<ContainerSummary>, GuardianError> {
        let opts = ListContainersOptions::<String> {
            all,
            filters,
            ..Default::default()
        };
        let listed = self.api.list_containers(Some(opts)).await?;
        Ok(listed
            .into_iter()
            .map(|c| ContainerSummary {
                id: c.id.unwrap_or_default(),
                names: c.names.unwrap_or_default(),
                image: c.image.unwrap_or_default(),
                state: c.state.unwrap_or_default(),
                labels: c.labels.unwrap_or_default(),
            })
            .collect())
    }
}

#[async_trait]
impl ContainerApi for DockerClient {
    async fn list_unhealthy(
        &self,
        label: &str,
        only_running: bool,
    ) -> Result<Vec<ContainerSummary>, GuardianError> {
        let mut filters = HashMap::from([(
            "health".to_string(),
            vec!["unhealthy".to_string()],
        )]);
        if label != "all" {
            filters.insert("label".to_string(), vec![format!("{label}=true")]);
        }
        if only_running {
            filters.insert("status".to_string(), vec!["running".to_string()]);
        }
        self.list(false, filters).await
    }

    async fn list_exited(&self) -> Result<Vec<ContainerSummary>, GuardianError> {
        let filters =
            HashMap::from([("status".to_string(), vec!["exited".to_string()])]);
        self.list(true, filters).await
    }

    async fn list_running(&self) -> Result<Vec<ContainerSummary>, GuardianError> {
        let filters =
            HashMap::from([("status".to_string(), vec!["running".to_string()])]);
        self.list(false, filters).await
    }

    async fn inspect(&self, id: &str) -> Result<ContainerDetails, GuardianError> {
        let resp = self
            .api
            .inspect_container(id, None::<InspectContainerOptions>)
            .await?;
        let state = resp.state.unwrap_or_default();
        Ok(ContainerDetails {
            name: resp
                .name
                .as_deref()
                .map(|n| display_name(n).to_string())
                .unwrap_or_default(),
            status: state.status.map(|s| s.to_string()).unwrap_or_default(),
            exit_code: state.exit_code.unwrap_or(0),
            finished_at: state
                .finished_at
                .as_deref()
                .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
                .map(|t| t.with_timezone(&Utc)),
            network_mode: resp
                .host_config
                .and_then(|h| h.network_mode)
                .unwrap_or_default(),
            labels: resp.config.and_then(|c| c.labels).unwrap_or_default(),
        })
    }

    async fn restart(&self, id: &str, stop_timeout: i64) -> Result<(), GuardianError> {
        let opts = RestartContainerOptions {
            t: stop_timeout as isize,
        };
        self.api.restart_container(id, Some(opts)).await?;
        Ok(())
    }

    async fn start(&self, id: &str) -> Result<(), GuardianError> {
        self.api
            .start_container(id, None::<StartContainerOptions<String>>)
            .await?;
        Ok(())
    }

    async fn stop(&self, id: &str, stop_timeout: i64) -> Result<(), GuardianError> {
        let opts = StopContainerOptions { t: stop_timeout };
        self.api.stop_container(id, Some(opts)).await?;
        Ok(())
    }

    async fn status(&self, id: &str) -> Result<String, GuardianError> {
        Ok(self.inspect(id).await?.status)
    }

    async fn finished_at(&self, id: &str) -> Result<DateTime<Utc>, GuardianError> {
        self.inspect(id)
            .await?
            .finished_at
            .ok_or(GuardianError::MissingData("State.FinishedAt"))
    }

    async fn health_log(&self, id: &str) -> Result<String, GuardianError> {
        let resp = self
            .api
            .inspect_container(id, None::<InspectContainerOptions>)
            .await?;
        let output = resp
            .state
            .and_then(|s| s.health)
            .and_then(|h| h.log)
            .and_then(|log| log.into_iter().last())
            .and_then(|entry| entry.output)
            .unwrap_or_default();

        let trimmed = output.trim();
        if trimmed.chars().count() > HEALTH_LOG_LIMIT {
            let clipped: String = trimmed.chars().take(HEALTH_LOG_LIMIT).collect();
            Ok(format!("{clipped}..."))
        } else {
            Ok(trimmed.to_string())
        }
    }

    async fn events_window(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
        orchestration_only: bool,
    ) -> Result<Vec<OrchestrationRecord>, GuardianError> {
        let mut filters = HashMap::from([(
            "type".to_string(),
            vec!["container".to_string()],
        )]);
        if orchestration_only {
            filters.insert(
                "event".to_string(),
                vec!["destroy".to_string(), "create".to_string()],
            );
        }
        let opts = EventsOptions::<String> {
            since: Some(since.timestamp().to_string()),
            until: Some(until.timestamp().to_string()),
            filters,
        };

        let mut stream = self.api.events(Some(opts));
        let mut records = Vec::new();
        while let Some(item) = stream.next().await {
            let msg = item?;
            if let Some(rec) = decode_orchestration(&msg) {
                records.push(rec);
            }
        }
        Ok(records)
    }
}
