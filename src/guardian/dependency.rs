//! # Dependency-orphan resolver.
//!
//! An exited container whose network namespace was donated by another
//! container (`NetworkMode = container:<parentId>`) is orphaned when the
//! parent is still running: Docker will not bring it back on its own.
//! The resolver finds such children and starts them.
//!
//! Multi-level chains (A -> B -> C) converge over successive passes:
//! starting B makes C's parent running on the next pass.
//!
//! ## Rules
//! - Both the parent and the child are re-checked after the start delay; a
//!   parent that stopped or a child that self-recovered cancels the start.
//! - The optional exit-code gate restricts recovery to listed codes.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::clock::Clock;
use crate::config::Config;
use crate::docker::{short_id, ContainerApi, ContainerSummary};
use crate::guardian::guards::{GuardPipeline, ScanCache};
use crate::guardian::hooks::spawn_post_action_hook;
use crate::guardian::labels;
use crate::notify::Notify;

/// Network-mode prefix marking a donated network namespace.
const PARENT_PREFIX: &str = "container:";

pub struct DependencyResolver {
    cfg: Arc<Config>,
    api: Arc<dyn ContainerApi>,
    notifier: Arc<dyn Notify>,
    clock: Arc<dyn Clock>,
    guards: Arc<GuardPipeline>,
}

impl DependencyResolver {
    pub fn new(
        cfg: Arc<Config>,
        api: Arc<dyn ContainerApi>,
        notifier: Arc<dyn Notify>,
        clock: Arc<dyn Clock>,
        guards: Arc<GuardPipeline>,
    ) -> Self {
        Self {
            cfg,
            api,
            notifier,
            clock,
            guards,
        }
    }

    /// Scans exited containers for orphaned dependents and recovers them.
    pub async fn check(&self, cache: &mut ScanCache, token: &CancellationToken) {
        if !self.cfg.monitor_dependencies {
            return;
        }

        let exited = match self.api.list_exited().await {
            Ok(c) => c,
            Err(e) => {
                error!(error = %e, "failed to list exited containers");
                return;
            }
        };

        for container in exited {
            if token.is_cancelled() {
                return;
            }
            self.recover(cache, token, &container).await;
        }
    }

    async fn recover(
        &self,
        cache: &mut ScanCache,
        token: &CancellationToken,
        container: &ContainerSummary,
    ) {
        let id = &container.id;
        let Ok(details) = self.api.inspect(id).await else {
            return;
        };

        let Some(parent_id) = details.network_mode.strip_prefix(PARENT_PREFIX) else {
            return;
        };
        match self.api.status(parent_id).await {
            Ok(status) if status == "running" => {}
            _ => return,
        }

        let name = details.name.clone();
        let sid = short_id(id);

        if !self.cfg.dependency_exit_codes.is_empty()
            && !self.cfg.dependency_exit_codes.contains(&details.exit_code)
        {
            info!(
                container = %name,
                id = sid,
                exit_code = details.exit_code,
                "orphaned dependent left alone, exit code not eligible"
            );
            return;
        }

        if self
            .guards
            .should_skip(cache, id, &name, &details.labels)
            .await
            .is_some()
        {
            return;
        }

        info!(
            container = %name,
            id = sid,
            exit_code = details.exit_code,
            parent = short_id(parent_id),
            "exited orphaned dependent, parent is running"
        );

        if self.cfg.dependency_start_delay > 0 {
            let delay = std::time::Duration::from_secs(self.cfg.dependency_start_delay);
            info!(container = %name, delay_secs = self.cfg.dependency_start_delay, "waiting before start");
            tokio::select! {
                _ = self.clock.sleep(delay) => {}
                _ = token.cancelled() => return,
            }

            match self.api.status(parent_id).await {
                Ok(status) if status == "running" => {}
                _ => {
                    info!(container = %name, parent = short_id(parent_id), "parent no longer running after delay, skipping");
                    return;
                }
            }
        }

        // The child may have recovered on its own while we waited.
        if let Ok(status) = self.api.status(id).await {
            if status != "exited" {
                info!(container = %name, id = sid, %status, "no action needed");
                return;
            }
        }

        info!(container = %name, id = sid, "starting orphaned dependent");
        let text = match self.api.start(id).await {
            Ok(()) => {
                info!(container = %name, id = sid, "successfully started");
                format!("Container {name} ({sid}) orphaned (parent running). Successfully started!")
            }
            Err(e) => {
                error!(container = %name, id = sid, error = %e, "failed to start container");
                format!("Container {name} ({sid}) orphaned (parent running). Failed to start!")
            }
        };
        if !labels::notify_suppressed(&details.labels) {
            self.notifier.action(&text).await;
        }

        spawn_post_action_hook(&self.cfg.post_restart_script, &name, sid, "orphaned", 0);
    }
}
