use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use super::dispatcher::{Dispatcher, Payload};
use crate::clock::ManualClock;
use crate::config::{Config, NotifyCategory};
use crate::metrics::Metrics;

fn config() -> Config {
    let mut cfg = crate::test_support::base_config();
    cfg.notify_rate_limit = 60;
    cfg
}

fn dispatcher(cfg: Config) -> (Dispatcher, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let d = Dispatcher::new(Arc::new(cfg), Metrics::new(), clock.clone()).unwrap();
    (d, clock)
}

#[tokio::test]
async fn no_services_configured_reports_none() {
    let (d, _clock) = dispatcher(config());
    assert_eq!(d.configured_services(), "none");
    assert!(d.targets("hello").is_empty());
}

#[tokio::test]
async fn configured_services_listed_in_order() {
    let mut cfg = config();
    cfg.webhook_url = "https://example.test/hook".into();
    cfg.slack_webhook = "https://hooks.slack.test/x".into();
    cfg.lunasea_webhook = "https://notify.lunasea.test/x".into();

    let (d, _clock) = dispatcher(cfg);
    assert_eq!(d.configured_services(), "webhook slack lunasea");
}

#[tokio::test]
async fn webhook_payload_uses_configured_json_key() {
    let mut cfg = config();
    cfg.webhook_url = "https://example.test/hook".into();
    cfg.webhook_json_key = "message".into();

    let (d, _clock) = dispatcher(cfg);
    let targets = d.targets("container web restarted");
    assert_eq!(targets.len(), 1);
    let (service, payload) = &targets[0];
    assert_eq!(*service, "webhook");
    match payload {
        Payload::Json { url, body } => {
            assert_eq!(url, "https://example.test/hook");
            assert_eq!(body["message"], "container web restarted");
        }
        _ => panic!("webhook must be a json payload"),
    }
}

#[tokio::test]
async fn gotify_url_embeds_token() {
    let mut cfg = config();
    cfg.gotify_url = "https://gotify.test".into();
    cfg.gotify_token = "tok123".into();

    let (d, _clock) = dispatcher(cfg);
    let targets = d.targets("text");
    match &targets[0].1 {
        Payload::Json { url, .. } => {
            assert_eq!(url, "https://gotify.test/message?token=tok123")
        }
        _ => panic!("gotify must be a json payload"),
    }
}

#[tokio::test]
async fn pushover_sends_form_fields() {
    let mut cfg = config();
    cfg.pushover_token = "app".into();
    cfg.pushover_user = "user".into();

    let (d, _clock) = dispatcher(cfg);
    let targets = d.targets("text");
    match &targets[0].1 {
        Payload::Form { fields, .. } => {
            assert!(fields.contains(&("token", "app".to_string())));
            assert!(fields.contains(&("user", "user".to_string())));
        }
        _ => panic!("pushover must be form-encoded"),
    }
}

#[tokio::test]
async fn pushbullet_sets_access_token_header() {
    let mut cfg = config();
    cfg.pushbullet_token = "pb-token".into();

    let (d, _clock) = dispatcher(cfg);
    let targets = d.targets("text");
    match &targets[0].1 {
        Payload::JsonWithHeader { header, .. } => {
            assert_eq!(header.0, "Access-Token");
            assert_eq!(header.1, "pb-token");
        }
        _ => panic!("pushbullet must carry the token header"),
    }
}

#[tokio::test]
async fn rate_limit_suppresses_repeats_within_window() {
    let (d, clock) = dispatcher(config());

    assert!(!d.is_rate_limited("Container web (abc) restarted"));
    assert!(d.is_rate_limited("Container web (abc) restarted"));

    clock.advance(Duration::from_secs(61));
    assert!(!d.is_rate_limited("Container web (abc) restarted"));
}

#[tokio::test]
async fn rate_limit_zero_disables_suppression() {
    let mut cfg = config();
    cfg.notify_rate_limit = 0;
    let (d, _clock) = dispatcher(cfg);

    assert!(!d.is_rate_limited("key"));
    assert!(!d.is_rate_limited("key"));
}

#[tokio::test]
async fn category_resolution_feeds_has() {
    let mut cfg = config();
    cfg.notify_events = "startup,skips".into();
    let (d, _clock) = dispatcher(cfg);

    assert!(d.has(NotifyCategory::Startup));
    assert!(d.has(NotifyCategory::Skips));
    assert!(!d.has(NotifyCategory::Actions));

    let mut cfg = config();
    cfg.notify_events = "all".into();
    let (d, _clock) = dispatcher(cfg);
    assert_eq!(
        [
            d.has(NotifyCategory::Startup),
            d.has(NotifyCategory::Actions),
            d.has(NotifyCategory::Skips),
            d.has(NotifyCategory::Debug),
        ],
        [true, true, true, false]
    );
}
