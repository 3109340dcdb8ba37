use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use super::controller::Guardian;
use super::debounce::Debouncer;
use crate::clock::{Clock, ManualClock};
use crate::config::Config;
use crate::docker::{ContainerApi, ContainerEvent, EventAction, HealthState};
use crate::metrics::Metrics;
use crate::test_support::{base_config, summary, FakeDocker, RecordingNotifier};

const ID: &str = "eeeeeeeeeeee33333333";

struct Fixture {
    guardian: Guardian,
    docker: Arc<FakeDocker>,
    notifier: Arc<RecordingNotifier>,
    metrics: Arc<Metrics>,
    clock: Arc<ManualClock>,
}

fn fixture(cfg: Config) -> Fixture {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let docker = Arc::new(FakeDocker::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let metrics = Metrics::new();
    let guardian = Guardian::new(
        Arc::new(cfg),
        docker.clone() as Arc<dyn ContainerApi>,
        notifier.clone(),
        metrics.clone(),
        clock.clone(),
        None,
    );
    Fixture {
        guardian,
        docker,
        notifier,
        metrics,
        clock,
    }
}

fn health_event(id: &str, state: HealthState) -> ContainerEvent {
    ContainerEvent {
        id: id.to_string(),
        name: "web".to_string(),
        action: EventAction::HealthStatus,
        health: Some(state),
        timestamp: Utc::now(),
    }
}

#[tokio::test(start_paused = true)]
async fn two_unhealthy_events_coalesce_to_one_restart() {
    let f = fixture(base_config());
    f.docker.state.lock().unwrap().unhealthy = vec![summary(ID, "web", "running")];

    let token = CancellationToken::new();
    let debouncer = Debouncer::new(Duration::from_secs(5), token.clone());

    f.guardian
        .dispatch(&debouncer, &token, health_event(ID, HealthState::Unhealthy))
        .await;
    tokio::time::sleep(Duration::from_secs(2)).await;
    f.guardian
        .dispatch(&debouncer, &token, health_event(ID, HealthState::Unhealthy))
        .await;

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(f.docker.restarts().len(), 1, "debounced to one invocation");
    assert!(f
        .metrics
        .render()
        .contains(r#"docker_guardian_events_processed_total{action="health_status"} 2"#));
}

#[tokio::test(start_paused = true)]
async fn healthy_event_resets_the_tracker() {
    let f = fixture(base_config());
    let tracker = f.guardian.tracker();
    tracker.record_restart(ID);
    assert!(tracker.backoff_remaining(ID) > Duration::ZERO);

    let token = CancellationToken::new();
    let debouncer = Debouncer::new(Duration::from_secs(5), token.clone());
    f.guardian
        .dispatch(&debouncer, &token, health_event(ID, HealthState::Healthy))
        .await;

    assert_eq!(tracker.backoff_remaining(ID), Duration::ZERO);
    assert!(tracker.should_restart(ID).is_ok());
}

#[tokio::test(start_paused = true)]
async fn create_event_feeds_the_orchestration_guard() {
    let mut cfg = base_config();
    cfg.watchtower_cooldown = 300;
    cfg.watchtower_scope = "affected".into();
    let f = fixture(cfg);
    f.docker.state.lock().unwrap().unhealthy = vec![summary(ID, "web", "running")];

    let token = CancellationToken::new();
    let debouncer = Debouncer::new(Duration::from_secs(5), token.clone());
    f.guardian
        .dispatch(
            &debouncer,
            &token,
            ContainerEvent {
                id: "other0000000".to_string(),
                name: "web".to_string(),
                action: EventAction::Create,
                health: None,
                timestamp: f.clock.now(),
            },
        )
        .await;

    f.guardian.full_scan(&token).await;

    assert!(f.docker.restarts().is_empty(), "orchestration guard skipped");
    assert_eq!(f.notifier.skips().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn start_events_are_ignored() {
    let f = fixture(base_config());
    let token = CancellationToken::new();
    let debouncer = Debouncer::new(Duration::from_secs(5), token.clone());

    f.guardian
        .dispatch(
            &debouncer,
            &token,
            ContainerEvent {
                id: ID.to_string(),
                name: "web".to_string(),
                action: EventAction::Start,
                health: None,
                timestamp: Utc::now(),
            },
        )
        .await;

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert!(f.docker.restarts().is_empty());
    assert!(f
        .metrics
        .render()
        .contains(r#"docker_guardian_events_processed_total{action="start"} 1"#));
}

#[tokio::test]
async fn polling_fallback_scans_until_cancelled() {
    let f = fixture(base_config());
    f.docker.state.lock().unwrap().unhealthy = vec![summary(ID, "web", "running")];
    let docker = f.docker.clone();
    let clock = f.clock.clone();

    let token = CancellationToken::new();
    let run_token = token.clone();
    let run = tokio::spawn(async move { f.guardian.run(run_token).await });

    // First poll cycle fires immediately.
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(docker.restarts().len(), 1);

    // Advance the virtual interval: the container is in backoff now, so the
    // scan runs but takes no action.
    clock.advance(Duration::from_secs(5));
    tokio::time::sleep(Duration::from_millis(20)).await;

    token.cancel();
    run.await.unwrap();
    assert_eq!(docker.restarts().len(), 1);
}
