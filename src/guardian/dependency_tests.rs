use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use super::dependency::DependencyResolver;
use super::guards::{GuardPipeline, ScanCache};
use super::ledger::OrchestrationLedger;
use crate::clock::ManualClock;
use crate::config::Config;
use crate::docker::{ContainerApi, ContainerDetails};
use crate::metrics::Metrics;
use crate::test_support::{base_config, summary, FakeDocker, RecordingNotifier};

const CHILD: &str = "cccccccccccc11111111";
const PARENT: &str = "pppppppppppp22222222";

struct Fixture {
    resolver: DependencyResolver,
    docker: Arc<FakeDocker>,
    notifier: Arc<RecordingNotifier>,
    clock: Arc<ManualClock>,
}

fn fixture(cfg: Config) -> Fixture {
    let cfg = Arc::new(cfg);
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let docker = Arc::new(FakeDocker::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let metrics = Metrics::new();
    let ledger = Arc::new(OrchestrationLedger::new(clock.clone()));
    let guards = Arc::new(GuardPipeline::new(
        cfg.clone(),
        docker.clone() as Arc<dyn ContainerApi>,
        notifier.clone(),
        metrics,
        clock.clone(),
        ledger,
    ));
    let resolver = DependencyResolver::new(cfg, docker.clone(), notifier.clone(), clock.clone(), guards);
    Fixture {
        resolver,
        docker,
        notifier,
        clock,
    }
}

/// Scripts an exited child whose network namespace came from a running
/// parent.
fn script_orphan(f: &Fixture, exit_code: i64) {
    let mut state = f.docker.state.lock().unwrap();
    state.exited = vec![summary(CHILD, "child", "exited")];
    state.details.insert(
        CHILD.to_string(),
        ContainerDetails {
            name: "child".to_string(),
            status: "exited".to_string(),
            exit_code,
            network_mode: format!("container:{PARENT}"),
            ..Default::default()
        },
    );
    state.details.insert(
        PARENT.to_string(),
        ContainerDetails {
            name: "parent".to_string(),
            status: "running".to_string(),
            ..Default::default()
        },
    );
}

async fn run_pass(f: &Fixture) {
    let mut cache = ScanCache::event();
    f.resolver.check(&mut cache, &CancellationToken::new()).await;
}

#[tokio::test]
async fn orphan_with_running_parent_is_started_once() {
    let f = fixture(base_config());
    script_orphan(&f, 128);

    run_pass(&f).await;

    assert_eq!(f.docker.starts(), vec![CHILD.to_string()]);
    let actions = f.notifier.actions();
    assert_eq!(actions.len(), 1);
    assert!(actions[0].contains("orphaned (parent running). Successfully started"));

    // The child is running now; a second pass must not start it again.
    run_pass(&f).await;
    assert_eq!(f.docker.starts().len(), 1);
}

#[tokio::test]
async fn plain_exited_container_is_ignored() {
    let f = fixture(base_config());
    {
        let mut state = f.docker.state.lock().unwrap();
        state.exited = vec![summary(CHILD, "loner", "exited")];
        state.details.insert(
            CHILD.to_string(),
            ContainerDetails {
                name: "loner".to_string(),
                status: "exited".to_string(),
                network_mode: "bridge".to_string(),
                ..Default::default()
            },
        );
    }

    run_pass(&f).await;
    assert!(f.docker.starts().is_empty());
}

#[tokio::test]
async fn stopped_parent_means_no_recovery() {
    let f = fixture(base_config());
    script_orphan(&f, 0);
    f.docker
        .state
        .lock()
        .unwrap()
        .details
        .get_mut(PARENT)
        .unwrap()
        .status = "exited".to_string();

    run_pass(&f).await;
    assert!(f.docker.starts().is_empty());
}

#[tokio::test]
async fn monitoring_disabled_skips_everything() {
    let mut cfg = base_config();
    cfg.monitor_dependencies = false;
    let f = fixture(cfg);
    script_orphan(&f, 0);

    run_pass(&f).await;
    assert!(f.docker.starts().is_empty());
}

#[tokio::test]
async fn exit_code_gate_restricts_recovery() {
    let mut cfg = base_config();
    cfg.dependency_exit_codes = BTreeSet::from([128]);
    let f = fixture(cfg);
    script_orphan(&f, 137);

    run_pass(&f).await;
    assert!(f.docker.starts().is_empty(), "exit code 137 not eligible");

    f.docker
        .state
        .lock()
        .unwrap()
        .details
        .get_mut(CHILD)
        .unwrap()
        .exit_code = 128;
    run_pass(&f).await;
    assert_eq!(f.docker.starts().len(), 1);
}

#[tokio::test]
async fn start_delay_rechecks_parent() {
    let mut cfg = base_config();
    cfg.dependency_start_delay = 5;
    let f = fixture(cfg);
    script_orphan(&f, 0);

    // The parent dies while the resolver waits out the start delay.
    let resolver_pass = async {
        let mut cache = ScanCache::event();
        f.resolver.check(&mut cache, &CancellationToken::new()).await;
    };
    let drive = async {
        tokio::task::yield_now().await;
        f.docker
            .state
            .lock()
            .unwrap()
            .details
            .get_mut(PARENT)
            .unwrap()
            .status = "exited".to_string();
        f.clock.advance(Duration::from_secs(5));
    };
    tokio::join!(resolver_pass, drive);

    assert!(f.docker.starts().is_empty(), "parent left running state during delay");
}

#[tokio::test]
async fn self_recovered_child_is_not_started() {
    let mut cfg = base_config();
    cfg.dependency_start_delay = 1;
    let f = fixture(cfg);
    script_orphan(&f, 0);

    let resolver_pass = async {
        let mut cache = ScanCache::event();
        f.resolver.check(&mut cache, &CancellationToken::new()).await;
    };
    let drive = async {
        tokio::task::yield_now().await;
        // The child comes back on its own while the resolver waits.
        f.docker
            .state
            .lock()
            .unwrap()
            .details
            .get_mut(CHILD)
            .unwrap()
            .status = "running".to_string();
        f.clock.advance(Duration::from_secs(1));
    };
    tokio::join!(resolver_pass, drive);

    assert!(f.docker.starts().is_empty());
}

#[tokio::test]
async fn cancellation_aborts_the_delay() {
    let mut cfg = base_config();
    cfg.dependency_start_delay = 30;
    let f = fixture(cfg);
    script_orphan(&f, 0);

    let token = CancellationToken::new();
    let resolver_pass = async {
        let mut cache = ScanCache::event();
        f.resolver.check(&mut cache, &token).await;
    };
    let drive = async {
        tokio::task::yield_now().await;
        token.cancel();
    };
    tokio::join!(resolver_pass, drive);

    assert!(f.docker.starts().is_empty());
}

#[tokio::test]
async fn failed_start_notifies_failure() {
    let f = fixture(base_config());
    script_orphan(&f, 0);
    f.docker.state.lock().unwrap().fail_starts = true;

    run_pass(&f).await;

    assert_eq!(f.docker.starts().len(), 1, "attempt was made");
    assert!(f.notifier.actions()[0].contains("Failed to start"));
}
