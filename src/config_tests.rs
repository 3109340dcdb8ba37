use std::collections::BTreeSet;
use std::time::Duration;

use crate::config::*;
use crate::error::GuardianError;

fn base_config() -> Config {
    Config {
        docker_sock: "/var/run/docker.sock".into(),
        curl_timeout: 30,
        container_label: "autoheal".into(),
        start_period: 0,
        interval: 5,
        default_stop_timeout: 10,
        only_monitor_running: false,
        monitor_dependencies: true,
        dependency_start_delay: 5,
        dependency_exit_codes: BTreeSet::new(),
        backup_label: "docker-volume-backup.stop-during-backup".into(),
        backup_container: String::new(),
        backup_mode: BackupMode::Running,
        backup_timeout: 600,
        grace_period: 300,
        watchtower_cooldown: 300,
        watchtower_scope: "all".into(),
        watchtower_events: "orchestration".into(),
        unhealthy_threshold: 1,
        backoff_multiplier: 2.0,
        backoff_max: 300,
        backoff_reset_after: 600,
        restart_budget: 5,
        restart_window: 300,
        post_restart_script: String::new(),
        notify_events: "actions".into(),
        notify_rate_limit: 60,
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

#[test]
fn configured_email_is_rejected() {
    let mut cfg = base_config();
    cfg.email_configured = true;
    let err = cfg.validate().unwrap_err();
    assert!(err.to_string().contains("NOTIFY_EMAIL_"));
}

#[test]
fn defaults_pass_validation() {
    assert!(base_config().validate().is_ok());
}

#[test]
fn validation_collects_every_violation() {
    let mut cfg = base_config();
    cfg.interval = 0;
    cfg.unhealthy_threshold = 0;
    cfg.watchtower_scope = "some".into();
    cfg.webhook_url = "not a url".into();

    let err = cfg.validate().unwrap_err();
    match err {
        GuardianError::InvalidConfig(errs) => {
            assert_eq!(errs.len(), 4, "all violations reported: {errs:?}");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn multiplier_below_one_rejected() {
    let mut cfg = base_config();
    cfg.backoff_multiplier = 0.5;
    assert!(cfg.validate().is_err());
}

#[test]
fn notify_events_default_is_actions_only() {
    let cfg = base_config();
    let resolved = cfg.resolved_notify_events();
    assert_eq!(resolved, BTreeSet::from([NotifyCategory::Actions]));
}

#[test]
fn notify_events_all_shorthand() {
    let mut cfg = base_config();
    cfg.notify_events = "all".into();
    let resolved = cfg.resolved_notify_events();
    assert!(resolved.contains(&NotifyCategory::Startup));
    assert!(resolved.contains(&NotifyCategory::Actions));
    assert!(resolved.contains(&NotifyCategory::Skips));
    assert!(!resolved.contains(&NotifyCategory::Debug));
}

#[test]
fn notify_events_numeric_aliases() {
    let mut cfg = base_config();
    cfg.notify_events = "1, 3".into();
    let resolved = cfg.resolved_notify_events();
    assert_eq!(
        resolved,
        BTreeSet::from([NotifyCategory::Startup, NotifyCategory::Failures])
    );
}

#[test]
fn notify_events_debug_implies_everything() {
    let mut cfg = base_config();
    cfg.notify_events = "debug".into();
    assert_eq!(cfg.resolved_notify_events().len(), 4);
}

#[test]
fn exit_codes_parse_and_reject_garbage() {
    assert_eq!(
        parse_exit_codes("128, 137").unwrap(),
        BTreeSet::from([128, 137])
    );
    assert!(parse_exit_codes("").unwrap().is_empty());
    assert!(parse_exit_codes("abc").is_err());
}

#[test]
fn banner_contains_core_options() {
    let banner = base_config().banner();
    assert!(banner.contains("AUTOHEAL_CONTAINER_LABEL=autoheal"));
    assert!(banner.contains("AUTOHEAL_INTERVAL=5"));
    assert!(banner.contains("AUTOHEAL_RESTART_BUDGET=5"));
    assert!(banner.contains("AUTOHEAL_BACKOFF_MULTIPLIER=2"));
}

#[test]
fn debounce_window_floors_at_five_seconds() {
    let mut cfg = base_config();
    cfg.interval = 0;
    assert_eq!(cfg.debounce_window(), Duration::from_secs(5));
    cfg.interval = 7;
    assert_eq!(cfg.debounce_window(), Duration::from_secs(7));
}
