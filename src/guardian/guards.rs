//! # Guard pipeline.
//!
//! Pure-ish predicates that decide whether an otherwise-justified action
//! must be suppressed, evaluated in a fixed order so decisions are
//! deterministic and cheap:
//!
//! 1. **Orchestration cooldown** — recent create/destroy activity means an
//!    external updater is at work; defer to it.
//! 2. **Grace period** — the container stopped too recently to judge.
//! 3. **Backup awareness** — a labeled container is (or just was) under a
//!    volume backup.
//!
//! Each skip emits a `skip` notification and increments
//! `skips_total{reason}`. Per-container `autoheal.notify=false` suppresses
//! the notification but the skip still applies.
//!
//! Expensive lookups (the one-shot events query, the backup-container scan)
//! are cached in a [`ScanCache`] that lives for one scan cycle.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::clock::Clock;
use crate::config::{BackupMode, Config};
use crate::docker::{short_id, ContainerApi};
use crate::guardian::labels;
use crate::guardian::ledger::OrchestrationLedger;
use crate::metrics::Metrics;
use crate::notify::Notify;

/// Image-name needle identifying the conventional backup tool when no
/// explicit backup container name is configured.
const BACKUP_IMAGE_NEEDLE: &str = "docker-volume-backup";

/// Per-cycle cache for guard lookups.
///
/// A full scan shares one cache across both handlers; each debounced event
/// check gets a fresh one.
pub struct ScanCache {
    /// Whether this cycle may issue the one-shot orchestration events query.
    fetch_orchestration: bool,
    orchestration_fetched: bool,
    backup_active: Option<bool>,
}

impl ScanCache {
    /// Cache for an enumeration scan: absorbs the events window once.
    pub fn full_scan() -> Self {
        Self {
            fetch_orchestration: true,
            orchestration_fetched: false,
            backup_active: None,
        }
    }

    /// Cache for a single debounced event check: the live ledger is already
    /// current, no query needed.
    pub fn event() -> Self {
        Self {
            fetch_orchestration: false,
            orchestration_fetched: false,
            backup_active: None,
        }
    }
}

/// Why the pipeline suppressed an action.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GuardVerdict {
    Orchestration,
    Grace,
    Backup,
}

impl GuardVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            GuardVerdict::Orchestration => "orchestration",
            GuardVerdict::Grace => "grace",
            GuardVerdict::Backup => "backup",
        }
    }
}

/// Ordered skip pipeline shared by both handlers.
pub struct GuardPipeline {
    cfg: Arc<Config>,
    api: Arc<dyn ContainerApi>,
    notifier: Arc<dyn Notify>,
    metrics: Arc<Metrics>,
    clock: Arc<dyn Clock>,
    ledger: Arc<OrchestrationLedger>,
}

impl GuardPipeline {
    pub fn new(
        cfg: Arc<Config>,
        api: Arc<dyn ContainerApi>,
        notifier: Arc<dyn Notify>,
        metrics: Arc<Metrics>,
        clock: Arc<dyn Clock>,
        ledger: Arc<OrchestrationLedger>,
    ) -> Self {
        Self {
            cfg,
            api,
            notifier,
            metrics,
            clock,
            ledger,
        }
    }

    /// Decides whether the container must be skipped this cycle.
    ///
    /// Returns the first guard that fires, in the documented order.
    pub async fn should_skip(
        &self,
        cache: &mut ScanCache,
        id: &str,
        name: &str,
        container_labels: &HashMap<String, String>,
    ) -> Option<GuardVerdict> {
        if let Some(verdict) = self.orchestration_guard(cache, name).await {
            self.report(id, name, container_labels, verdict).await;
            return Some(verdict);
        }
        if let Some(verdict) = self.grace_guard(id).await {
            self.report(id, name, container_labels, verdict).await;
            return Some(verdict);
        }
        if let Some(verdict) = self.backup_guard(cache, id, container_labels).await {
            self.report(id, name, container_labels, verdict).await;
            return Some(verdict);
        }
        None
    }

    async fn orchestration_guard(&self, cache: &mut ScanCache, name: &str) -> Option<GuardVerdict> {
        if self.cfg.watchtower_cooldown == 0 {
            return None;
        }
        let cooldown = Duration::from_secs(self.cfg.watchtower_cooldown);

        if cache.fetch_orchestration && !cache.orchestration_fetched {
            cache.orchestration_fetched = true;
            self.absorb_events_window(cooldown).await;
        }

        let affected = if self.cfg.watchtower_scope == "affected" {
            self.ledger.contains_within(name, cooldown)
        } else {
            self.ledger.any_within(cooldown)
        };
        affected.then_some(GuardVerdict::Orchestration)
    }

    /// One-shot query covering the cooldown window preceding this scan.
    /// Failures mean "no data": the guard then judges on the live ledger.
    async fn absorb_events_window(&self, cooldown: Duration) {
        let until = self.clock.now();
        let since = until - chrono::Duration::from_std(cooldown).unwrap_or(chrono::Duration::zero());
        let orchestration_only = self.cfg.watchtower_events != "all";

        match self.api.events_window(since, until, orchestration_only).await {
            Ok(records) => {
                if !records.is_empty() {
                    info!(
                        events = records.len(),
                        cooldown_secs = self.cfg.watchtower_cooldown,
                        "orchestration activity detected"
                    );
                }
                self.ledger.absorb(&records);
            }
            Err(e) => warn!(error = %e, "orchestration events query failed"),
        }
    }

    async fn grace_guard(&self, id: &str) -> Option<GuardVerdict> {
        if self.cfg.grace_period == 0 {
            return None;
        }
        // A failed lookup bypasses the guard rather than blocking the action.
        let finished_at = self.api.finished_at(id).await.ok()?;
        let age = self.clock.since(finished_at);
        (age < Duration::from_secs(self.cfg.grace_period)).then_some(GuardVerdict::Grace)
    }

    async fn backup_guard(
        &self,
        cache: &mut ScanCache,
        id: &str,
        container_labels: &HashMap<String, String>,
    ) -> Option<GuardVerdict> {
        if self.cfg.backup_label.is_empty()
            || !container_labels.contains_key(&self.cfg.backup_label)
        {
            return None;
        }

        let active = match self.cfg.backup_mode {
            BackupMode::Running => self.backup_running(cache).await,
            BackupMode::Window => self.stopped_within_backup_window(id).await,
        };
        active.then_some(GuardVerdict::Backup)
    }

    /// True while a backup container is running. The scan is cached for the
    /// cycle to avoid hammering the runtime once per candidate.
    async fn backup_running(&self, cache: &mut ScanCache) -> bool {
        if let Some(active) = cache.backup_active {
            return active;
        }
        let active = match self.api.list_running().await {
            Ok(running) => running.iter().any(|c| {
                if self.cfg.backup_container.is_empty() {
                    c.image.contains(BACKUP_IMAGE_NEEDLE)
                } else {
                    c.display_name() == Some(self.cfg.backup_container.as_str())
                }
            }),
            Err(e) => {
                warn!(error = %e, "backup container scan failed");
                false
            }
        };
        cache.backup_active = Some(active);
        active
    }

    async fn stopped_within_backup_window(&self, id: &str) -> bool {
        if self.cfg.backup_timeout == 0 {
            return false;
        }
        let Ok(finished_at) = self.api.finished_at(id).await else {
            return false;
        };
        self.clock.since(finished_at) < Duration::from_secs(self.cfg.backup_timeout)
    }

    async fn report(
        &self,
        id: &str,
        name: &str,
        container_labels: &HashMap<String, String>,
        verdict: GuardVerdict,
    ) {
        info!(
            container = name,
            id = short_id(id),
            reason = verdict.as_str(),
            "skipping container"
        );
        self.metrics.inc_skip(name, verdict.as_str());

        if labels::notify_suppressed(container_labels) {
            return;
        }
        let text = match verdict {
            GuardVerdict::Orchestration => format!(
                "Container {name} ({}) skipped - orchestration activity",
                short_id(id)
            ),
            GuardVerdict::Grace => {
                format!("Container {name} ({}) skipped - grace period", short_id(id))
            }
            GuardVerdict::Backup => {
                format!("Container {name} ({}) skipped - backup active", short_id(id))
            }
        };
        self.notifier.skip(&text).await;
    }
}
