//! Shared test helpers: a scripted runtime client, a recording notifier,
//! and a baseline configuration.
//!
//! Gated behind `#[cfg(any(test, feature = "test-support"))]` so the
//! integration harness in `tests/` can reuse the same fakes.

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::{BackupMode, Config};
use crate::docker::{
    ContainerApi, ContainerDetails, ContainerSummary, OrchestrationRecord,
};
use crate::error::GuardianError;
use crate::notify::Notify;

/// Baseline config with guards quiet and notifications unrestricted, so
/// individual tests enable exactly what they exercise.
pub fn base_config() -> Config {
    Config {
        docker_sock: "/var/run/docker.sock".into(),
        curl_timeout: 30,
        container_label: "all".into(),
        start_period: 0,
        interval: 5,
        default_stop_timeout: 10,
        only_monitor_running: false,
        monitor_dependencies: true,
        dependency_start_delay: 0,
        dependency_exit_codes: BTreeSet::new(),
        backup_label: "docker-volume-backup.stop-during-backup".into(),
        backup_container: String::new(),
        backup_mode: BackupMode::Running,
        backup_timeout: 600,
        grace_period: 0,
        watchtower_cooldown: 0,
        watchtower_scope: "all".into(),
        watchtower_events: "orchestration".into(),
        unhealthy_threshold: 1,
        backoff_multiplier: 2.0,
        backoff_max: 300,
        backoff_reset_after: 600,
        restart_budget: 5,
        restart_window: 300,
        post_restart_script: String::new(),
        notify_events: "all".into(),
        notify_rate_limit: 0,
        notify_hostname: String::new(),
        webhook_url: String::new(),
        webhook_json_key: "text".into(),
        apprise_url: String::new(),
        gotify_url: String::new(),
        gotify_token: String::new(),
        discord_webhook: String::new(),
        slack_webhook: String::new(),
        telegram_token: String::new(),
        telegram_chat_id: String::new(),
        pushover_token: String::new(),
        pushover_user: String::new(),
        pushbullet_token: String::new(),
        lunasea_webhook: String::new(),
        email_configured: false,
        metrics_port: 0,
        log_json: false,
    }
}

/// Builds a summary with sane defaults for tests.
pub fn summary(id: &str, name: &str, state: &str) -> ContainerSummary {
    ContainerSummary {
        id: id.to_string(),
        names: vec![format!("/{name}")],
        image: "busybox:latest".to_string(),
        state: state.to_string(),
        labels: HashMap::new(),
    }
}

/// Scripted state behind [`FakeDocker`].
#[derive(Default)]
pub struct FakeState {
    pub unhealthy: Vec<ContainerSummary>,
    pub exited: Vec<ContainerSummary>,
    pub running: Vec<ContainerSummary>,
    pub details: HashMap<String, ContainerDetails>,
    pub events: Vec<OrchestrationRecord>,
    /// Recorded `(id, stop_timeout)` restart calls.
    pub restarts: Vec<(String, i64)>,
    /// Recorded start calls.
    pub starts: Vec<String>,
    /// Recorded `(id, stop_timeout)` stop calls.
    pub stops: Vec<(String, i64)>,
    /// When set, restart calls fail.
    pub fail_restarts: bool,
    /// When set, start calls fail.
    pub fail_starts: bool,
}

/// Scripted [`ContainerApi`] double.
#[derive(Default)]
pub struct FakeDocker {
    pub state: Mutex<FakeState>,
}

impl FakeDocker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: FakeState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    pub fn restarts(&self) -> Vec<(String, i64)> {
        self.state.lock().unwrap().restarts.clone()
    }

    pub fn starts(&self) -> Vec<String> {
        self.state.lock().unwrap().starts.clone()
    }

    pub fn stops(&self) -> Vec<(String, i64)> {
        self.state.lock().unwrap().stops.clone()
    }
}

fn io_error(what: &'static str) -> GuardianError {
    GuardianError::MissingData(what)
}

#[async_trait]
impl ContainerApi for FakeDocker {
    async fn list_unhealthy(
        &self,
        label: &str,
        only_running: bool,
    ) -> Result<Vec<ContainerSummary>, GuardianError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .unhealthy
            .iter()
            .filter(|c| {
                label == "all" || c.labels.get(label).map(String::as_str) == Some("true")
            })
            .filter(|c| !only_running || c.state == "running")
            .cloned()
            .collect())
    }

    async fn list_exited(&self) -> Result<Vec<ContainerSummary>, GuardianError> {
        Ok(self.state.lock().unwrap().exited.clone())
    }

    async fn list_running(&self) -> Result<Vec<ContainerSummary>, GuardianError> {
        Ok(self.state.lock().unwrap().running.clone())
    }

    async fn inspect(&self, id: &str) -> Result<ContainerDetails, GuardianError> {
        self.state
            .lock()
            .unwrap()
            .details
            .get(id)
            .cloned()
            .ok_or(io_error("inspect"))
    }

    async fn restart(&self, id: &str, stop_timeout: i64) -> Result<(), GuardianError> {
        let mut state = self.state.lock().unwrap();
        state.restarts.push((id.to_string(), stop_timeout));
        if state.fail_restarts {
            return Err(io_error("restart"));
        }
        Ok(())
    }

    async fn start(&self, id: &str) -> Result<(), GuardianError> {
        let mut state = self.state.lock().unwrap();
        state.starts.push(id.to_string());
        if state.fail_starts {
            return Err(io_error("start"));
        }
        // A started container is no longer exited; later passes must see it
        // running so they do not start it twice.
        if let Some(details) = state.details.get_mut(id) {
            details.status = "running".to_string();
        }
        Ok(())
    }

    async fn stop(&self, id: &str, stop_timeout: i64) -> Result<(), GuardianError> {
        let mut state = self.state.lock().unwrap();
        state.stops.push((id.to_string(), stop_timeout));
        Ok(())
    }

    async fn status(&self, id: &str) -> Result<String, GuardianError> {
        Ok(self.inspect(id).await?.status)
    }

    async fn finished_at(&self, id: &str) -> Result<DateTime<Utc>, GuardianError> {
        self.inspect(id)
            .await?
            .finished_at
            .ok_or(io_error("finished_at"))
    }

    async fn health_log(&self, _id: &str) -> Result<String, GuardianError> {
        Ok(String::new())
    }

    async fn events_window(
        &self,
        _since: DateTime<Utc>,
        _until: DateTime<Utc>,
        _orchestration_only: bool,
    ) -> Result<Vec<OrchestrationRecord>, GuardianError> {
        Ok(self.state.lock().unwrap().events.clone())
    }
}

/// Notifier double that records every message by verb.
#[derive(Default)]
pub struct RecordingNotifier {
    pub startups: Mutex<Vec<String>>,
    pub actions: Mutex<Vec<String>>,
    pub skips: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn actions(&self) -> Vec<String> {
        self.actions.lock().unwrap().clone()
    }

    pub fn skips(&self) -> Vec<String> {
        self.skips.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notify for RecordingNotifier {
    async fn startup(&self, text: &str) {
        self.startups.lock().unwrap().push(text.to_string());
    }

    async fn action(&self, text: &str) {
        self.actions.lock().unwrap().push(text.to_string());
    }

    async fn skip(&self, text: &str) {
        self.skips.lock().unwrap().push(text.to_string());
    }

    async fn close(&self) {}
}
