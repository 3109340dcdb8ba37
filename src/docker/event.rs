//! # Container event decoding.
//!
//! Normalizes raw Docker event messages into [`ContainerEvent`]. Health
//! transitions arrive in two encodings in the wild:
//!
//! - the action literal `health_status: unhealthy` / `health_status: healthy`;
//! - `action = health_status` with the status in the actor attributes map.
//!
//! Both are decoded to `action = HealthStatus` plus a [`HealthState`]. An
//! implementation must not assume a single encoding.

use std::collections::HashMap;

use bollard::models::EventMessage;
use chrono::{DateTime, Utc};

/// Container event actions the engine subscribes to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventAction {
    HealthStatus,
    Die,
    Start,
    Create,
    Destroy,
}

impl EventAction {
    /// Stable label for metrics and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventAction::HealthStatus => "health_status",
            EventAction::Die => "die",
            EventAction::Start => "start",
            EventAction::Create => "create",
            EventAction::Destroy => "destroy",
        }
    }

    /// The action names requested from the Docker event filter.
    pub fn stream_filter() -> [&'static str; 5] {
        ["health_status", "die", "start", "destroy", "create"]
    }
}

/// Reported health of a container, as computed by the Docker daemon.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HealthState {
    Healthy,
    Unhealthy,
}

/// A normalized container event from the Docker stream.
#[derive(Clone, Debug)]
pub struct ContainerEvent {
    pub id: String,
    pub name: String,
    pub action: EventAction,
    /// Present only for `HealthStatus` events.
    pub health: Option<HealthState>,
    pub timestamp: DateTime<Utc>,
}

/// A create/destroy observation used by the orchestration ledger.
///
/// Full-scan queries collapse raw events to this form: all the cooldown guard
/// needs is which name saw activity and when.
#[derive(Clone, Debug)]
pub struct OrchestrationRecord {
    pub name: String,
    pub timestamp: DateTime<Utc>,
}

/// Decodes a raw message into a [`ContainerEvent`].
///
/// Returns `None` for actions outside the subscribed set; the stream filter
/// should already exclude them but Docker versions differ in what they leak
/// through.
pub fn decode(msg: &EventMessage) -> Option<ContainerEvent> {
    let actor = msg.actor.as_ref();
    let id = actor.and_then(|a| a.id.clone()).unwrap_or_default();
    let attributes = actor.and_then(|a| a.attributes.clone()).unwrap_or_default();
    let name = attributes.get("name").cloned().unwrap_or_default();

    let raw_action = msg.action.as_deref().unwrap_or_default();
    let (action, health) = decode_action(raw_action, &attributes)?;

    Some(ContainerEvent {
        id,
        name,
        action,
        health,
        timestamp: event_timestamp(msg),
    })
}

/// Collapses a raw message to an [`OrchestrationRecord`], regardless of
/// action. Used when draining the bounded `events(since, until)` query.
pub fn decode_orchestration(msg: &EventMessage) -> Option<OrchestrationRecord> {
    let name = msg
        .actor
        .as_ref()
        .and_then(|a| a.attributes.as_ref())
        .and_then(|attrs| attrs.get("name"))
        .cloned()?;
    Some(OrchestrationRecord {
        name,
        timestamp: event_timestamp(msg),
    })
}

fn decode_action(
    raw: &str,
    attributes: &HashMap<String, String>,
) -> Option<(EventAction, Option<HealthState>)> {
    if let Some(status) = raw.strip_prefix("health_status:") {
        return Some((EventAction::HealthStatus, parse_health(status.trim())));
    }
    match raw {
        "health_status" => {
            let status = attributes.get("health_status").map(String::as_str);
            Some((
                EventAction::HealthStatus,
                status.and_then(|s| parse_health(s.trim())),
            ))
        }
        "die" => Some((EventAction::Die, None)),
        "start" => Some((EventAction::Start, None)),
        "create" => Some((EventAction::Create, None)),
        "destroy" => Some((EventAction::Destroy, None)),
        _ => None,
    }
}

fn parse_health(status: &str) -> Option<HealthState> {
    match status {
        "healthy" => Some(HealthState::Healthy),
        "unhealthy" => Some(HealthState::Unhealthy),
        _ => None,
    }
}

fn event_timestamp(msg: &EventMessage) -> DateTime<Utc> {
    let secs = msg.time.unwrap_or(0);
    let nanos = msg.time_nano.map(|n| (n % 1_000_000_000) as u32).unwrap_or(0);
    DateTime::from_timestamp(secs, nanos).unwrap_or(DateTime::UNIX_EPOCH)
}
