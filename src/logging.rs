//! # Tracing initialization.
//!
//! One subscriber for the whole process: human-readable by default, JSON
//! lines when `LOG_JSON=true`. The filter honors `RUST_LOG` and falls back
//! to `info`.

use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Installs the global tracing subscriber.
///
/// Call once, before any component logs. Subsequent calls are ignored
/// (the first subscriber wins), which keeps tests that initialize logging
/// from panicking.
pub fn init(json: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if json {
        let fmt_layer = tracing_subscriber::fmt::layer().json().with_target(true);
        let _ = tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init();
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);
        let _ = tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init();
    }
}
