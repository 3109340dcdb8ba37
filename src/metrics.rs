//! # Process-local metrics and the `/metrics` endpoint.
//!
//! A small hand-rolled registry: labeled counters, gauges, and fixed-bucket
//! histograms, rendered in the Prometheus text exposition format on demand.
//! The registry is shared as an `Arc<Metrics>` and injected into every
//! component that observes something; nothing is global.
//!
//! ## Exposed series
//! - `docker_guardian_restarts_total{container,result}`
//! - `docker_guardian_skips_total{container,reason}`
//! - `docker_guardian_notifications_total{service,result}`
//! - `docker_guardian_events_processed_total{action}`
//! - `docker_guardian_unhealthy_containers`
//! - `docker_guardian_circuit_open_containers`
//! - `docker_guardian_event_stream_connected`
//! - `docker_guardian_restart_duration_seconds{container}` (histogram)
//! - `docker_guardian_event_processing_duration_seconds` (histogram)

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use axum::{extract::State, routing::get, Router};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Prometheus default histogram buckets, in seconds.
const BUCKETS: [f64; 11] = [
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Cumulative histogram over [`BUCKETS`].
#[derive(Clone, Debug, Default)]
struct Histogram {
    counts: [u64; BUCKETS.len()],
    sum: f64,
    total: u64,
}

impl Histogram {
    fn observe(&mut self, value: f64) {
        for (i, bound) in BUCKETS.iter().enumerate() {
            if value <= *bound {
                self.counts[i] += 1;
            }
        }
        self.sum += value;
        self.total += 1;
    }

    fn render(&self, out: &mut String, name: &str, labels: &str) {
        let sep = if labels.is_empty() { "" } else { "," };
        for (i, bound) in BUCKETS.iter().enumerate() {
            let _ = writeln!(
                out,
                "{name}_bucket{{{labels}{sep}le=\"{bound}\"}} {}",
                self.counts[i]
            );
        }
        let _ = writeln!(out, "{name}_bucket{{{labels}{sep}le=\"+Inf\"}} {}", self.total);
        let lb = if labels.is_empty() {
            String::new()
        } else {
            format!("{{{labels}}}")
        };
        let _ = writeln!(out, "{name}_sum{lb} {}", self.sum);
        let _ = writeln!(out, "{name}_count{lb} {}", self.total);
    }
}

/// Shared metric registry.
///
/// Counter maps use `BTreeMap` so the rendered output is stable, which keeps
/// scrape diffs and tests deterministic.
#[derive(Default)]
pub struct Metrics {
    restarts: Mutex<BTreeMap<(String, String), u64>>,
    skips: Mutex<BTreeMap<(String, String), u64>>,
    notifications: Mutex<BTreeMap<(String, String), u64>>,
    events: Mutex<BTreeMap<String, u64>>,
    unhealthy: AtomicI64,
    circuit_open: AtomicI64,
    stream_connected: AtomicI64,
    restart_duration: Mutex<BTreeMap<String, Histogram>>,
    event_duration: Mutex<Histogram>,
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn inc_restart(&self, container: &str, result: &str) {
        let mut map = self.restarts.lock().unwrap();
        *map.entry((container.to_string(), result.to_string()))
            .or_default() += 1;
    }

    pub fn inc_skip(&self, container: &str, reason: &str) {
        let mut map = self.skips.lock().unwrap();
        *map.entry((container.to_string(), reason.to_string()))
            .or_default() += 1;
    }

    pub fn inc_notification(&self, service: &str, result: &str) {
        let mut map = self.notifications.lock().unwrap();
        *map.entry((service.to_string(), result.to_string()))
            .or_default() += 1;
    }

    pub fn inc_event(&self, action: &str) {
        let mut map = self.events.lock().unwrap();
        *map.entry(action.to_string()).or_default() += 1;
    }

    pub fn set_unhealthy_containers(&self, n: i64) {
        self.unhealthy.store(n, Ordering::Relaxed);
    }

    pub fn set_circuit_open_containers(&self, n: i64) {
        self.circuit_open.store(n, Ordering::Relaxed);
    }

    pub fn set_stream_connected(&self, connected: bool) {
        self.stream_connected
            .store(connected as i64, Ordering::Relaxed);
    }

    pub fn observe_restart_duration(&self, container: &str, seconds: f64) {
        let mut map = self.restart_duration.lock().unwrap();
        map.entry(container.to_string()).or_default().observe(seconds);
    }

    pub fn observe_event_duration(&self, seconds: f64) {
        self.event_duration.lock().unwrap().observe(seconds);
    }

    /// Renders the registry in the Prometheus text exposition format.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(2048);

        let _ = writeln!(
            out,
            "# HELP docker_guardian_restarts_total Total container restarts by result."
        );
        let _ = writeln!(out, "# TYPE docker_guardian_restarts_total counter");
        for ((container, result), v) in self.restarts.lock().unwrap().iter() {
            let _ = writeln!(
                out,
                "docker_guardian_restarts_total{{container=\"{container}\",result=\"{result}\"}} {v}"
            );
        }

        let _ = writeln!(
            out,
            "# HELP docker_guardian_skips_total Total skipped containers by reason."
        );
        let _ = writeln!(out, "# TYPE docker_guardian_skips_total counter");
        for ((container, reason), v) in self.skips.lock().unwrap().iter() {
            let _ = writeln!(
                out,
                "docker_guardian_skips_total{{container=\"{container}\",reason=\"{reason}\"}} {v}"
            );
        }

        let _ = writeln!(
            out,
            "# HELP docker_guardian_notifications_total Total notification sends by service and result."
        );
        let _ = writeln!(out, "# TYPE docker_guardian_notifications_total counter");
        for ((service, result), v) in self.notifications.lock().unwrap().iter() {
            let _ = writeln!(
                out,
                "docker_guardian_notifications_total{{service=\"{service}\",result=\"{result}\"}} {v}"
            );
        }

        let _ = writeln!(
            out,
            "# HELP docker_guardian_events_processed_total Total Docker events processed by action."
        );
        let _ = writeln!(out, "# TYPE docker_guardian_events_processed_total counter");
        for (action, v) in self.events.lock().unwrap().iter() {
            let _ = writeln!(
                out,
                "docker_guardian_events_processed_total{{action=\"{action}\"}} {v}"
            );
        }

        let _ = writeln!(
            out,
            "# HELP docker_guardian_unhealthy_containers Current number of unhealthy containers."
        );
        let _ = writeln!(out, "# TYPE docker_guardian_unhealthy_containers gauge");
        let _ = writeln!(
            out,
            "docker_guardian_unhealthy_containers {}",
            self.unhealthy.load(Ordering::Relaxed)
        );

        let _ = writeln!(
            out,
            "# HELP docker_guardian_circuit_open_containers Number of containers with open circuit breakers."
        );
        let _ = writeln!(out, "# TYPE docker_guardian_circuit_open_containers gauge");
        let _ = writeln!(
            out,
            "docker_guardian_circuit_open_containers {}",
            self.circuit_open.load(Ordering::Relaxed)
        );

        let _ = writeln!(
            out,
            "# HELP docker_guardian_event_stream_connected 1 if connected to the Docker event stream."
        );
        let _ = writeln!(out, "# TYPE docker_guardian_event_stream_connected gauge");
        let _ = writeln!(
            out,
            "docker_guardian_event_stream_connected {}",
            self.stream_connected.load(Ordering::Relaxed)
        );

        let _ = writeln!(
            out,
            "# HELP docker_guardian_restart_duration_seconds Time taken to restart a container."
        );
        let _ = writeln!(out, "# TYPE docker_guardian_restart_duration_seconds histogram");
        for (container, hist) in self.restart_duration.lock().unwrap().iter() {
            hist.render(
                &mut out,
                "docker_guardian_restart_duration_seconds",
                &format!("container=\"{container}\""),
            );
        }

        let _ = writeln!(
            out,
            "# HELP docker_guardian_event_processing_duration_seconds Time taken to process a Docker event."
        );
        let _ = writeln!(
            out,
            "# TYPE docker_guardian_event_processing_duration_seconds histogram"
        );
        self.event_duration.lock().unwrap().render(
            &mut out,
            "docker_guardian_event_processing_duration_seconds",
            "",
        );

        out
    }
}

/// Serves `/metrics` until the token is cancelled.
///
/// Bind or serve errors are logged and swallowed; metrics are best-effort
/// observability and never take the supervisor down.
pub async fn serve(metrics: Arc<Metrics>, port: u16, token: CancellationToken) {
    let app = Router::new()
        .route("/metrics", get(render_handler))
        .with_state(metrics);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(%addr, error = %e, "failed to bind metrics endpoint");
            return;
        }
    };
    info!(%addr, "metrics endpoint listening");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(token.cancelled_owned())
        .await
    {
        error!(error = %e, "metrics server error");
    }
}

async fn render_handler(State(metrics): State<Arc<Metrics>>) -> String {
    metrics.render()
}
