//! # Guardian controller.
//!
//! Wires the engine together and owns the control loop. In event-driven
//! mode it does one full scan at startup and then dispatches stream events;
//! without a watcher (the test fake, or a runtime without streaming) it
//! falls back to a polling loop with identical semantics.
//!
//! ## Event dispatch
//! ```text
//! health_status: unhealthy -> debounce("unhealthy:<id>") -> UnhealthyHandler
//! health_status: healthy   -> RestartTracker::reset(id)
//! die                      -> debounce("dep:<id>")       -> DependencyResolver
//! create | destroy         -> OrchestrationLedger::record + async prune
//! start                    -> reserved, no action
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::clock::Clock;
use crate::config::Config;
use crate::docker::{ContainerApi, ContainerEvent, EventAction, EventWatcher, HealthState};
use crate::guardian::debounce::Debouncer;
use crate::guardian::dependency::DependencyResolver;
use crate::guardian::guards::{GuardPipeline, ScanCache};
use crate::guardian::ledger::OrchestrationLedger;
use crate::guardian::tracker::{RestartTracker, TrackerConfig};
use crate::guardian::unhealthy::UnhealthyHandler;
use crate::metrics::Metrics;
use crate::notify::Notify;

/// Orchestrates scans, event dispatch, and the per-container state machines.
pub struct Guardian {
    cfg: Arc<Config>,
    metrics: Arc<Metrics>,
    clock: Arc<dyn Clock>,
    tracker: Arc<RestartTracker>,
    ledger: Arc<OrchestrationLedger>,
    unhealthy: Arc<UnhealthyHandler>,
    dependency: Arc<DependencyResolver>,
    watcher: Option<EventWatcher>,
}

impl Guardian {
    /// Builds the engine. Pass a watcher for event-driven mode; `None`
    /// selects the polling fallback.
    pub fn new(
        cfg: Arc<Config>,
        api: Arc<dyn ContainerApi>,
        notifier: Arc<dyn Notify>,
        metrics: Arc<Metrics>,
        clock: Arc<dyn Clock>,
        watcher: Option<EventWatcher>,
    ) -> Self {
        let tracker = Arc::new(RestartTracker::new(
            TrackerConfig {
                multiplier: cfg.backoff_multiplier,
                max_backoff: Duration::from_secs(cfg.backoff_max),
                budget: cfg.restart_budget,
                window: Duration::from_secs(cfg.restart_window),
            },
            clock.clone(),
        ));
        let ledger = Arc::new(OrchestrationLedger::new(clock.clone()));
        let guards = Arc::new(GuardPipeline::new(
            cfg.clone(),
            api.clone(),
            notifier.clone(),
            metrics.clone(),
            clock.clone(),
            ledger.clone(),
        ));
        let unhealthy = Arc::new(UnhealthyHandler::new(
            cfg.clone(),
            api.clone(),
            notifier.clone(),
            metrics.clone(),
            tracker.clone(),
            guards.clone(),
        ));
        let dependency = Arc::new(DependencyResolver::new(
            cfg.clone(),
            api,
            notifier,
            clock.clone(),
            guards,
        ));

        Self {
            cfg,
            metrics,
            clock,
            tracker,
            ledger,
            unhealthy,
            dependency,
            watcher,
        }
    }

    /// The restart tracker, exposed for metrics and tests.
    pub fn tracker(&self) -> Arc<RestartTracker> {
        self.tracker.clone()
    }

    /// Runs until the token is cancelled.
    pub async fn run(mut self, token: CancellationToken) {
        match self.watcher.take() {
            Some(watcher) => self.run_event_driven(watcher, token).await,
            None => self.run_polling(token).await,
        }
    }

    /// One complete pass over the runtime state: unhealthy containers first,
    /// then orphaned dependents. Guard caches live for the whole pass.
    pub async fn full_scan(&self, token: &CancellationToken) {
        let mut cache = ScanCache::full_scan();
        self.unhealthy.check(&mut cache).await;
        self.dependency.check(&mut cache, token).await;
    }

    async fn run_event_driven(&self, watcher: EventWatcher, token: CancellationToken) {
        info!("event-driven monitoring active");
        let mut events = watcher.watch(token.clone());
        let debouncer = Debouncer::new(self.cfg.debounce_window(), token.clone());

        self.full_scan(&token).await;

        loop {
            tokio::select! {
                _ = token.cancelled() => return,
                evt = events.recv() => match evt {
                    Some(evt) => self.dispatch(&debouncer, &token, evt).await,
                    None => return, // watcher closed
                },
            }
        }
    }

    async fn run_polling(&self, token: CancellationToken) {
        info!(interval_secs = self.cfg.interval, "polling monitoring active");
        let interval = Duration::from_secs(self.cfg.interval);

        loop {
            self.full_scan(&token).await;
            tokio::select! {
                _ = self.clock.sleep(interval) => {}
                _ = token.cancelled() => return,
            }
        }
    }

    pub(crate) async fn dispatch(
        &self,
        debouncer: &Debouncer,
        token: &CancellationToken,
        evt: ContainerEvent,
    ) {
        let started = std::time::Instant::now();
        self.metrics.inc_event(evt.action.as_str());

        match evt.action {
            EventAction::HealthStatus => match evt.health {
                Some(HealthState::Unhealthy) => {
                    let handler = self.unhealthy.clone();
                    debouncer.schedule(&format!("unhealthy:{}", evt.id), move || async move {
                        let mut cache = ScanCache::event();
                        handler.check(&mut cache).await;
                    });
                }
                Some(HealthState::Healthy) => {
                    self.tracker.reset(&evt.id);
                }
                None => {}
            },
            EventAction::Die => {
                let resolver = self.dependency.clone();
                let token = token.clone();
                debouncer.schedule(&format!("dep:{}", evt.id), move || async move {
                    let mut cache = ScanCache::event();
                    resolver.check(&mut cache, &token).await;
                });
            }
            EventAction::Create | EventAction::Destroy => {
                self.ledger.record(&evt.name, evt.timestamp);
                let ledger = self.ledger.clone();
                let cooldown = Duration::from_secs(self.cfg.watchtower_cooldown);
                tokio::spawn(async move {
                    ledger.prune(cooldown);
                });
            }
            EventAction::Start => {} // reserved
        }

        self.metrics
            .observe_event_duration(started.elapsed().as_secs_f64());
    }
}
