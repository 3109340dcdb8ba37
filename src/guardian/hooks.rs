//! # Post-action hook.
//!
//! An optional operator script invoked after a corrective action with the
//! arguments `name shortId state timeoutSeconds`. Runs detached; a nonzero
//! exit is logged and nothing else happens (no notification, no tracker
//! effect).

use tokio::process::Command;
use tracing::error;

/// Spawns the configured script, if any. Returns immediately.
pub fn spawn_post_action_hook(script: &str, name: &str, short_id: &str, state: &str, timeout: i64) {
    if script.is_empty() {
        return;
    }
    let script = script.to_string();
    let args = [
        name.to_string(),
        short_id.to_string(),
        state.to_string(),
        timeout.to_string(),
    ];
    tokio::spawn(async move {
        match Command::new(&script).args(&args).status().await {
            Ok(status) if !status.success() => {
                error!(%script, %status, "post-restart script failed");
            }
            Err(e) => error!(%script, error = %e, "post-restart script failed to run"),
            _ => {}
        }
    });
}
