//! # Unhealthy container handler.
//!
//! Drives one unhealthy container through opt-out and action labels, the
//! guard pipeline, and the restart tracker, then executes the selected
//! action. Runs after every debounced `health_status: unhealthy` event and
//! once per full scan.
//!
//! ## Rules
//! - `autoheal=False` opts a container out entirely.
//! - Containers already `restarting` are left alone.
//! - The action that exhausts the restart budget emits a `[CRITICAL]`
//!   notification.
//! - The restart attempt is recorded in the tracker whether or not the
//!   runtime call succeeded.

use std::sync::Arc;

use tracing::{error, info};

use crate::config::Config;
use crate::docker::{short_id, ContainerApi, ContainerSummary};
use crate::guardian::guards::{GuardPipeline, ScanCache};
use crate::guardian::hooks::spawn_post_action_hook;
use crate::guardian::labels::{self, ContainerAction};
use crate::guardian::tracker::{RestartTracker, SkipReason};
use crate::metrics::Metrics;
use crate::notify::Notify;

pub struct UnhealthyHandler {
    cfg: Arc<Config>,
    api: Arc<dyn ContainerApi>,
    notifier: Arc<dyn Notify>,
    metrics: Arc<Metrics>,
    tracker: Arc<RestartTracker>,
    guards: Arc<GuardPipeline>,
}

impl UnhealthyHandler {
    pub fn new(
        cfg: Arc<Config>,
        api: Arc<dyn ContainerApi>,
        notifier: Arc<dyn Notify>,
        metrics: Arc<Metrics>,
        tracker: Arc<RestartTracker>,
        guards: Arc<GuardPipeline>,
    ) -> Self {
        Self {
            cfg,
            api,
            notifier,
            metrics,
            tracker,
            guards,
        }
    }

    /// Enumerates unhealthy containers and handles each one.
    pub async fn check(&self, cache: &mut ScanCache) {
        let containers = match self
            .api
            .list_unhealthy(&self.cfg.container_label, self.cfg.only_monitor_running)
            .await
        {
            Ok(c) => c,
            Err(e) => {
                error!(error = %e, "failed to list unhealthy containers");
                return;
            }
        };

        self.metrics.set_unhealthy_containers(containers.len() as i64);
        self.metrics
            .set_circuit_open_containers(self.tracker.circuit_open_count() as i64);

        for container in containers {
            self.handle(cache, &container).await;
        }
    }

    async fn handle(&self, cache: &mut ScanCache, container: &ContainerSummary) {
        if labels::opted_out(&container.labels) {
            return;
        }
        let Some(name) = container.display_name().map(str::to_string) else {
            return;
        };
        let id = container.id.clone();
        let sid = short_id(&id);

        let action = labels::container_action(&container.labels);
        if action == ContainerAction::None {
            return;
        }

        if container.state == "restarting" {
            info!(container = %name, id = sid, "container already restarting, leaving it alone");
            return;
        }

        // Threshold-based suppression: act only on the N-th consecutive
        // detection.
        if !self
            .tracker
            .record_unhealthy(&id, self.cfg.unhealthy_threshold)
        {
            info!(
                container = %name,
                id = sid,
                threshold = self.cfg.unhealthy_threshold,
                "unhealthy, below threshold"
            );
            return;
        }

        if self
            .guards
            .should_skip(cache, &id, &name, &container.labels)
            .await
            .is_some()
        {
            return;
        }

        let suppress_notify = labels::notify_suppressed(&container.labels);

        if action == ContainerAction::Notify {
            if !suppress_notify {
                self.notifier
                    .action(&format!(
                        "Container {name} ({sid}) found to be unhealthy (action=notify)"
                    ))
                    .await;
            }
            self.tracker.reset_unhealthy(&id);
            return;
        }

        // Tracker consult: backoff and circuit apply to restart and stop.
        if let Err(reason) = self.tracker.should_restart(&id) {
            let msg = self.tracker.format_skip_reason(&id, &name, reason);
            info!("{msg}");
            self.metrics.inc_skip(&name, reason.as_str());
            if reason == SkipReason::Circuit && !suppress_notify {
                self.notifier.action(&format!("[CRITICAL] {msg}")).await;
            }
            return;
        }

        let timeout = labels::stop_timeout_override(&container.labels)
            .unwrap_or(self.cfg.default_stop_timeout);

        // Latest healthcheck probe output enriches the notification.
        let probe = self.api.health_log(&id).await.unwrap_or_default();
        let probe_suffix = if probe.is_empty() {
            String::new()
        } else {
            format!(" Last probe output: {probe}")
        };

        match action {
            ContainerAction::Stop => {
                info!(container = %name, id = sid, timeout, "unhealthy, stopping (quarantine)");
                let text = match self.api.stop(&id, timeout).await {
                    Ok(()) => {
                        self.metrics.inc_restart(&name, "success");
                        format!(
                            "Container {name} ({sid}) found to be unhealthy. Stopped (quarantined).{probe_suffix}"
                        )
                    }
                    Err(e) => {
                        error!(container = %name, id = sid, error = %e, "failed to stop container");
                        self.metrics.inc_restart(&name, "failure");
                        format!(
                            "Container {name} ({sid}) found to be unhealthy. Failed to stop (quarantine)!"
                        )
                    }
                };
                if !suppress_notify {
                    self.notifier.action(&text).await;
                }
                self.tracker.record_restart(&id);
                self.tracker.reset_unhealthy(&id);
            }
            _ => {
                info!(container = %name, id = sid, timeout, "unhealthy, restarting");
                let started = std::time::Instant::now();
                let text = match self.api.restart(&id, timeout).await {
                    Ok(()) => {
                        self.metrics.inc_restart(&name, "success");
                        format!(
                            "Container {name} ({sid}) found to be unhealthy. Successfully restarted the container!{probe_suffix}"
                        )
                    }
                    Err(e) => {
                        error!(container = %name, id = sid, error = %e, "failed to restart container");
                        self.metrics.inc_restart(&name, "failure");
                        format!(
                            "Container {name} ({sid}) found to be unhealthy. Failed to restart the container!"
                        )
                    }
                };
                self.metrics
                    .observe_restart_duration(&name, started.elapsed().as_secs_f64());
                if !suppress_notify {
                    self.notifier.action(&text).await;
                }
                self.tracker.record_restart(&id);
                self.tracker.reset_unhealthy(&id);
                spawn_post_action_hook(
                    &self.cfg.post_restart_script,
                    &name,
                    sid,
                    &container.state,
                    timeout,
                );
            }
        }
    }
}
