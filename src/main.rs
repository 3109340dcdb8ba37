//! Guardian daemon entry point.
//!
//! Thin wiring: load and validate configuration, install the signal-driven
//! cancellation token, build the Docker client and notification dispatcher,
//! start the metrics endpoint, then hand control to the engine.
//!
//! Exit codes: `0` on clean shutdown from a signal, `1` on fatal
//! misconfiguration or Docker client creation failure.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use docker_guardian::clock::SystemClock;
use docker_guardian::config::Config;
use docker_guardian::docker::{DockerClient, EventWatcher};
use docker_guardian::guardian::Guardian;
use docker_guardian::metrics::{self, Metrics};
use docker_guardian::notify::{Dispatcher, Notify};
use docker_guardian::logging;

#[tokio::main]
async fn main() -> ExitCode {
    // The "autoheal" argument is accepted for drop-in compatibility with the
    // shell image's CMD.
    if let Some(arg) = std::env::args().nth(1) {
        if arg != "autoheal" {
            eprintln!("unknown command: {arg}");
            eprintln!("Usage: guardian [autoheal]");
            return ExitCode::FAILURE;
        }
    }

    let cfg = Config::from_env();
    logging::init(cfg.log_json);

    // Plain-stdout banner; acceptance tooling greps these lines.
    println!("Docker-Guardian");
    println!("=============================================");
    print!("{}", cfg.banner());

    if let Err(e) = cfg.validate() {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }
    let cfg = Arc::new(cfg);

    let token = CancellationToken::new();
    spawn_signal_handler(token.clone());

    let client = match DockerClient::connect(&cfg.docker_sock, cfg.curl_timeout) {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, sock = %cfg.docker_sock, "failed to create Docker client");
            return ExitCode::FAILURE;
        }
    };

    let clock = Arc::new(SystemClock);
    let registry = Metrics::new();
    if cfg.metrics_port > 0 {
        tokio::spawn(metrics::serve(
            registry.clone(),
            cfg.metrics_port,
            token.clone(),
        ));
    }

    let dispatcher = match Dispatcher::new(cfg.clone(), registry.clone(), clock.clone()) {
        Ok(d) => Arc::new(d),
        Err(e) => {
            error!(error = %e, "failed to build notification dispatcher");
            return ExitCode::FAILURE;
        }
    };
    println!("NOTIFICATIONS={}", dispatcher.configured_services());
    let resolved: Vec<&str> = cfg
        .resolved_notify_events()
        .iter()
        .map(|c| c.as_str())
        .collect();
    println!(
        "NOTIFY_EVENTS={} (resolved: {})",
        cfg.notify_events,
        resolved.join(",")
    );

    if cfg.start_period > 0 {
        println!("Monitoring containers in {} second(s)", cfg.start_period);
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(cfg.start_period)) => {}
            _ = token.cancelled() => return ExitCode::SUCCESS,
        }
    }

    dispatcher
        .startup(&format!(
            "Docker-Guardian started. Monitoring active. Services: {}",
            dispatcher.configured_services()
        ))
        .await;

    let watcher = EventWatcher::new(&client, registry.clone());
    let guardian = Guardian::new(
        cfg.clone(),
        Arc::new(client),
        dispatcher.clone(),
        registry,
        clock,
        Some(watcher),
    );
    guardian.run(token.clone()).await;

    dispatcher.close().await;
    info!("shutdown complete");
    ExitCode::SUCCESS
}

/// Cancels the ambient token when the process receives a termination signal.
#[cfg(unix)]
fn spawn_signal_handler(token: CancellationToken) {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async move {
        let mut sigint = match signal(SignalKind::interrupt()) {
            Ok(s) => s,
            Err(e) => {
                error!(error = %e, "failed to register SIGINT handler");
                return;
            }
        };
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                error!(error = %e, "failed to register SIGTERM handler");
                return;
            }
        };

        tokio::select! {
            _ = sigint.recv() => info!("received SIGINT, shutting down"),
            _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
        }
        token.cancel();
    });
}

#[cfg(not(unix))]
fn spawn_signal_handler(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received ctrl-c, shutting down");
        }
        token.cancel();
    });
}
