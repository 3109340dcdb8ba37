use std::collections::HashMap;

use bollard::models::{EventActor, EventMessage};

use super::event::*;

fn message(action: &str, id: &str, name: &str) -> EventMessage {
    EventMessage {
        action: Some(action.to_string()),
        actor: Some(EventActor {
            id: Some(id.to_string()),
            attributes: Some(HashMap::from([("name".to_string(), name.to_string())])),
        }),
        time: Some(1_700_000_000),
        time_nano: Some(1_700_000_000_123_456_789),
        ..Default::default()
    }
}

#[test]
fn decodes_inline_health_status_encoding() {
    let msg = message("health_status: unhealthy", "abcdef123456", "web");
    let evt = decode(&msg).unwrap();
    assert_eq!(evt.action, EventAction::HealthStatus);
    assert_eq!(evt.health, Some(HealthState::Unhealthy));
    assert_eq!(evt.id, "abcdef123456");
    assert_eq!(evt.name, "web");
}

#[test]
fn decodes_attribute_health_status_encoding() {
    let mut msg = message("health_status", "abcdef123456", "web");
    msg.actor
        .as_mut()
        .unwrap()
        .attributes
        .as_mut()
        .unwrap()
        .insert("health_status".to_string(), "healthy".to_string());

    let evt = decode(&msg).unwrap();
    assert_eq!(evt.action, EventAction::HealthStatus);
    assert_eq!(evt.health, Some(HealthState::Healthy));
}

#[test]
fn both_encodings_normalize_identically() {
    let inline = decode(&message("health_status: healthy", "aa", "x")).unwrap();

    let mut attr_msg = message("health_status", "aa", "x");
    attr_msg
        .actor
        .as_mut()
        .unwrap()
        .attributes
        .as_mut()
        .unwrap()
        .insert("health_status".to_string(), "healthy".to_string());
    let attr = decode(&attr_msg).unwrap();

    assert_eq!(inline.action, attr.action);
    assert_eq!(inline.health, attr.health);
}

#[test]
fn decodes_lifecycle_actions() {
    for (raw, want) in [
        ("die", EventAction::Die),
        ("start", EventAction::Start),
        ("create", EventAction::Create),
        ("destroy", EventAction::Destroy),
    ] {
        let evt = decode(&message(raw, "id", "name")).unwrap();
        assert_eq!(evt.action, want);
        assert_eq!(evt.health, None);
    }
}

#[test]
fn unknown_actions_are_dropped() {
    assert!(decode(&message("exec_create", "id", "name")).is_none());
    assert!(decode(&message("", "id", "name")).is_none());
}

#[test]
fn timestamp_combines_seconds_and_nanos() {
    let evt = decode(&message("die", "id", "name")).unwrap();
    assert_eq!(evt.timestamp.timestamp(), 1_700_000_000);
    assert_eq!(evt.timestamp.timestamp_subsec_nanos(), 123_456_789);
}

#[test]
fn orchestration_record_keeps_any_action() {
    let rec = decode_orchestration(&message("exec_create", "id", "svc")).unwrap();
    assert_eq!(rec.name, "svc");
    assert_eq!(rec.timestamp.timestamp(), 1_700_000_000);
}
