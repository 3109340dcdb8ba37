//! # Error types used by the guardian runtime.
//!
//! [`GuardianError`] covers the failures the engine can surface:
//!
//! - Docker API I/O (list, inspect, actions, event stream);
//! - unparseable timestamps in inspect responses;
//! - invalid configuration, collected at startup.
//!
//! Transient Docker I/O never tears the engine down: list failures are logged
//! and treated as "no data", stream failures trigger a reconnect. Only
//! configuration and client-creation errors are fatal (exit code 1).

use thiserror::Error;

/// Errors produced by the guardian runtime.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum GuardianError {
    /// A Docker API call failed.
    #[error("docker api error: {0}")]
    Docker(#[from] bollard::errors::Error),

    /// A timestamp in a Docker response could not be parsed.
    #[error("unparseable timestamp: {0}")]
    Timestamp(#[from] chrono::ParseError),

    /// A Docker response lacked a field the engine needs.
    #[error("missing field in docker response: {0}")]
    MissingData(&'static str),

    /// The notification HTTP client could not be built.
    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration failed validation. Every violation is listed so the
    /// operator can fix them in one pass.
    #[error("invalid configuration:\n  {}", .0.join("\n  "))]
    InvalidConfig(Vec<String>),
}

impl GuardianError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            GuardianError::Docker(_) => "docker",
            GuardianError::Timestamp(_) => "timestamp",
            GuardianError::MissingData(_) => "missing_data",
            GuardianError::Http(_) => "http",
            GuardianError::InvalidConfig(_) => "invalid_config",
        }
    }
}
