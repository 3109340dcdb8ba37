//! # Container label vocabulary.
//!
//! The labels the engine honors, bit-exact:
//!
//! - `autoheal=False` — opt-out (note the capital F, matching the shell era)
//! - `autoheal.action` — `restart` | `stop` | `notify` | `none`
//! - `autoheal.stop.timeout` — integer seconds, overrides the default
//! - `autoheal.notify=false` — suppress notifications but still act

use std::collections::HashMap;

/// Per-container corrective action selected via `autoheal.action`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContainerAction {
    Restart,
    Stop,
    Notify,
    None,
}

/// Resolves `autoheal.action`. Unknown or missing values mean restart.
pub fn container_action(labels: &HashMap<String, String>) -> ContainerAction {
    match labels.get("autoheal.action").map(String::as_str) {
        Some("stop") => ContainerAction::Stop,
        Some("notify") => ContainerAction::Notify,
        Some("none") => ContainerAction::None,
        _ => ContainerAction::Restart,
    }
}

/// True when the container opted out via `autoheal=False`.
pub fn opted_out(labels: &HashMap<String, String>) -> bool {
    labels.get("autoheal").map(String::as_str) == Some("False")
}

/// Per-container stop timeout override, when present and parseable.
pub fn stop_timeout_override(labels: &HashMap<String, String>) -> Option<i64> {
    labels.get("autoheal.stop.timeout")?.parse().ok()
}

/// True when `autoheal.notify=false` suppresses notifications for this
/// container.
pub fn notify_suppressed(labels: &HashMap<String, String>) -> bool {
    labels.get("autoheal.notify").map(String::as_str) == Some("false")
}
