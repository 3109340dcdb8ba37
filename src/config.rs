//! # Flat environment-derived configuration.
//!
//! [`Config`] maps 1:1 to the operator-facing environment variables. Every
//! option has a default matching the shell-era behavior, so an empty
//! environment yields a working supervisor watching the `autoheal` label.
//!
//! Loading never fails; [`Config::validate`] collects every violation into a
//! single [`GuardianError::InvalidConfig`] so the operator fixes them in one
//! pass instead of playing whack-a-mole.
//!
//! ## Sentinel values
//! - `watchtower_cooldown = 0` disables the orchestration guard
//! - `grace_period = 0` disables the grace guard
//! - `restart_budget = 0` means an unlimited restart budget
//! - `metrics_port = 0` disables the metrics endpoint
//! - `notify_rate_limit = 0` disables notification rate limiting

use std::collections::BTreeSet;
use std::env;
use std::fmt::Write as _;
use std::time::Duration;

use crate::error::GuardianError;

/// How the backup guard decides a backup is in progress.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackupMode {
    /// Skip while a backup container is currently running (default,
    /// the documented behavior of the acceptance suite).
    Running,
    /// Skip while the target container stopped within `backup_timeout`.
    Window,
}

/// Notification categories an operator can subscribe to via `NOTIFY_EVENTS`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum NotifyCategory {
    Startup,
    Actions,
    Failures,
    Skips,
    Debug,
}

impl NotifyCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotifyCategory::Startup => "startup",
            NotifyCategory::Actions => "actions",
            NotifyCategory::Failures => "failures",
            NotifyCategory::Skips => "skips",
            NotifyCategory::Debug => "debug",
        }
    }
}

/// All guardian configuration, read from the environment.
#[derive(Clone, Debug)]
pub struct Config {
    // Docker connection
    pub docker_sock: String,
    /// HTTP timeout in seconds, shared by the Docker and notification clients.
    pub curl_timeout: u64,

    // Core monitoring
    /// `"all"` or a label key; anything else filters on `<label>=true`.
    pub container_label: String,
    pub start_period: u64,
    pub interval: u64,
    pub default_stop_timeout: i64,
    pub only_monitor_running: bool,

    // Guards
    pub monitor_dependencies: bool,
    pub dependency_start_delay: u64,
    /// Exit codes eligible for orphan recovery. Empty = no gate.
    pub dependency_exit_codes: BTreeSet<i64>,
    pub backup_label: String,
    pub backup_container: String,
    pub backup_mode: BackupMode,
    pub backup_timeout: u64,
    pub grace_period: u64,
    pub watchtower_cooldown: u64,
    /// `"all"` or `"affected"`.
    pub watchtower_scope: String,
    /// `"orchestration"` (create/destroy only) or `"all"`.
    pub watchtower_events: String,

    // Health
    pub unhealthy_threshold: u32,

    // Restart tracker
    pub backoff_multiplier: f64,
    pub backoff_max: u64,
    pub backoff_reset_after: u64,
    pub restart_budget: usize,
    pub restart_window: u64,

    // Hooks
    pub post_restart_script: String,

    // Notifications
    pub notify_events: String,
    pub notify_rate_limit: u64,
    pub notify_hostname: String,
    pub webhook_url: String,
    pub webhook_json_key: String,
    pub apprise_url: String,
    pub gotify_url: String,
    pub gotify_token: String,
    pub discord_webhook: String,
    pub slack_webhook: String,
    pub telegram_token: String,
    pub telegram_chat_id: String,
    pub pushover_token: String,
    pub pushover_user: String,
    pub pushbullet_token: String,
    pub lunasea_webhook: String,

    /// Set when any `NOTIFY_EMAIL_*` variable is present; rejected at
    /// validation (no SMTP transport).
    pub email_configured: bool,

    // Observability
    pub metrics_port: u16,
    pub log_json: bool,
}

impl Config {
    /// Reads every option from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            docker_sock: env_str("DOCKER_SOCK", "/var/run/docker.sock"),
            curl_timeout: env_parse("CURL_TIMEOUT", 30),

            container_label: env_str("AUTOHEAL_CONTAINER_LABEL", "autoheal"),
            start_period: env_parse("AUTOHEAL_START_PERIOD", 0),
            interval: env_parse("AUTOHEAL_INTERVAL", 5),
            default_stop_timeout: env_parse("AUTOHEAL_DEFAULT_STOP_TIMEOUT", 10),
            only_monitor_running: env_parse("AUTOHEAL_ONLY_MONITOR_RUNNING", false),

            monitor_dependencies: env_parse("AUTOHEAL_MONITOR_DEPENDENCIES", true),
            dependency_start_delay: env_parse("AUTOHEAL_DEPENDENCY_START_DELAY", 5),
            dependency_exit_codes: parse_exit_codes(&env_str(
                "AUTOHEAL_DEPENDENCY_EXIT_CODES",
                "",
            ))
            .unwrap_or_default(),
            backup_label: env_str(
                "AUTOHEAL_BACKUP_LABEL",
                "docker-volume-backup.stop-during-backup",
            ),
            backup_container: env_str("AUTOHEAL_BACKUP_CONTAINER", ""),
            backup_mode: match env_str("AUTOHEAL_BACKUP_MODE", "running").as_str() {
                "window" => BackupMode::Window,
                _ => BackupMode::Running,
            },
            backup_timeout: env_parse("AUTOHEAL_BACKUP_TIMEOUT", 600),
            grace_period: env_parse("AUTOHEAL_GRACE_PERIOD", 300),
            watchtower_cooldown: env_parse("AUTOHEAL_WATCHTOWER_COOLDOWN", 300),
            watchtower_scope: env_str("AUTOHEAL_WATCHTOWER_SCOPE", "all"),
            watchtower_events: env_str("AUTOHEAL_WATCHTOWER_EVENTS", "orchestration"),

            unhealthy_threshold: env_parse("AUTOHEAL_UNHEALTHY_THRESHOLD", 1),

            backoff_multiplier: env_parse("AUTOHEAL_BACKOFF_MULTIPLIER", 2.0),
            backoff_max: env_parse("AUTOHEAL_BACKOFF_MAX", 300),
            backoff_reset_after: env_parse("AUTOHEAL_BACKOFF_RESET_AFTER", 600),
            restart_budget: env_parse("AUTOHEAL_RESTART_BUDGET", 5),
            restart_window: env_parse("AUTOHEAL_RESTART_WINDOW", 300),

            post_restart_script: env_str("POST_RESTART_SCRIPT", ""),

            notify_events: env_str("NOTIFY_EVENTS", "actions"),
            notify_rate_limit: env_parse("NOTIFY_RATE_LIMIT", 60),
            notify_hostname: env_str("NOTIFY_HOSTNAME", ""),
            webhook_url: env_str("WEBHOOK_URL", ""),
            webhook_json_key: env_str("WEBHOOK_JSON_KEY", "text"),
            apprise_url: env_str("APPRISE_URL", ""),
            gotify_url: env_str("NOTIFY_GOTIFY_URL", ""),
            gotify_token: env_str("NOTIFY_GOTIFY_TOKEN", ""),
            discord_webhook: env_str("NOTIFY_DISCORD_WEBHOOK", ""),
            slack_webhook: env_str("NOTIFY_SLACK_WEBHOOK", ""),
            telegram_token: env_str("NOTIFY_TELEGRAM_TOKEN", ""),
            telegram_chat_id: env_str("NOTIFY_TELEGRAM_CHAT_ID", ""),
            pushover_token: env_str("NOTIFY_PUSHOVER_TOKEN", ""),
            pushover_user: env_str("NOTIFY_PUSHOVER_USER", ""),
            pushbullet_token: env_str("NOTIFY_PUSHBULLET_TOKEN", ""),
            lunasea_webhook: env_str("NOTIFY_LUNASEA_WEBHOOK", ""),

            email_configured: !env_str("NOTIFY_EMAIL_SMTP", "").is_empty(),

            metrics_port: env_parse("METRICS_PORT", 0),
            log_json: env_parse("LOG_JSON", false),
        }
    }

    /// Checks the configuration, collecting every violation.
    pub fn validate(&self) -> Result<(), GuardianError> {
        let mut errs = Vec::new();

        if self.interval == 0 {
            errs.push("AUTOHEAL_INTERVAL must be > 0".to_string());
        }
        if self.unhealthy_threshold < 1 {
            errs.push(format!(
                "AUTOHEAL_UNHEALTHY_THRESHOLD must be >= 1, got {}",
                self.unhealthy_threshold
            ));
        }
        if self.default_stop_timeout < 0 {
            errs.push(format!(
                "AUTOHEAL_DEFAULT_STOP_TIMEOUT must be >= 0, got {}",
                self.default_stop_timeout
            ));
        }
        if self.backoff_multiplier < 1.0 {
            errs.push(format!(
                "AUTOHEAL_BACKOFF_MULTIPLIER must be >= 1.0, got {}",
                self.backoff_multiplier
            ));
        }
        if self.watchtower_scope != "all" && self.watchtower_scope != "affected" {
            errs.push(format!(
                "AUTOHEAL_WATCHTOWER_SCOPE must be \"all\" or \"affected\", got {:?}",
                self.watchtower_scope
            ));
        }
        if self.watchtower_events != "orchestration" && self.watchtower_events != "all" {
            errs.push(format!(
                "AUTOHEAL_WATCHTOWER_EVENTS must be \"orchestration\" or \"all\", got {:?}",
                self.watchtower_events
            ));
        }
        for (name, value) in [
            ("WEBHOOK_URL", &self.webhook_url),
            ("APPRISE_URL", &self.apprise_url),
            ("NOTIFY_GOTIFY_URL", &self.gotify_url),
            ("NOTIFY_DISCORD_WEBHOOK", &self.discord_webhook),
            ("NOTIFY_SLACK_WEBHOOK", &self.slack_webhook),
            ("NOTIFY_LUNASEA_WEBHOOK", &self.lunasea_webhook),
        ] {
            if !value.is_empty() {
                if let Err(e) = value.parse::<reqwest::Url>() {
                    errs.push(format!("{name} is not a valid URL: {e}"));
                }
            }
        }
        if self.email_configured {
            errs.push(
                "NOTIFY_EMAIL_* is not supported; use WEBHOOK_URL or APPRISE_URL instead"
                    .to_string(),
            );
        }

        if errs.is_empty() {
            Ok(())
        } else {
            Err(GuardianError::InvalidConfig(errs))
        }
    }

    /// Resolves `NOTIFY_EVENTS` into a normalized category set.
    ///
    /// Accepts names, numeric aliases 1-5, comma-separated combinations, and
    /// the `all`/`debug` shorthands.
    pub fn resolved_notify_events(&self) -> BTreeSet<NotifyCategory> {
        use NotifyCategory::*;

        let raw = self.notify_events.trim();
        match raw {
            "all" => return BTreeSet::from([Startup, Actions, Skips]),
            "debug" => return BTreeSet::from([Startup, Actions, Skips, Debug]),
            _ => {}
        }

        let mut resolved = BTreeSet::new();
        for item in raw.split(',') {
            match item.trim() {
                "1" | "startup" => {
                    resolved.insert(Startup);
                }
                "2" | "actions" => {
                    resolved.insert(Actions);
                }
                "3" | "failures" => {
                    resolved.insert(Failures);
                }
                "4" | "skips" => {
                    resolved.insert(Skips);
                }
                "5" | "debug" => {
                    resolved.extend([Startup, Actions, Skips, Debug]);
                }
                "all" => {
                    resolved.extend([Startup, Actions, Skips]);
                }
                _ => {}
            }
        }
        resolved
    }

    /// Shell-compatible startup banner (`AUTOHEAL_<KEY>=<value>` lines).
    pub fn banner(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "AUTOHEAL_CONTAINER_LABEL={}", self.container_label);
        let _ = writeln!(out, "AUTOHEAL_START_PERIOD={}", self.start_period);
        let _ = writeln!(out, "AUTOHEAL_INTERVAL={}", self.interval);
        let _ = writeln!(
            out,
            "AUTOHEAL_DEFAULT_STOP_TIMEOUT={}",
            self.default_stop_timeout
        );
        let _ = writeln!(
            out,
            "AUTOHEAL_ONLY_MONITOR_RUNNING={}",
            self.only_monitor_running
        );
        let _ = writeln!(
            out,
            "AUTOHEAL_MONITOR_DEPENDENCIES={}",
            self.monitor_dependencies
        );
        let _ = writeln!(
            out,
            "AUTOHEAL_DEPENDENCY_START_DELAY={}",
            self.dependency_start_delay
        );
        let _ = writeln!(out, "AUTOHEAL_BACKUP_LABEL={}", self.backup_label);
        let _ = writeln!(out, "AUTOHEAL_BACKUP_CONTAINER={}", self.backup_container);
        let _ = writeln!(out, "AUTOHEAL_BACKUP_TIMEOUT={}", self.backup_timeout);
        let _ = writeln!(out, "AUTOHEAL_GRACE_PERIOD={}", self.grace_period);
        let _ = writeln!(
            out,
            "AUTOHEAL_WATCHTOWER_COOLDOWN={}",
            self.watchtower_cooldown
        );
        let _ = writeln!(out, "AUTOHEAL_WATCHTOWER_SCOPE={}", self.watchtower_scope);
        let _ = writeln!(out, "AUTOHEAL_WATCHTOWER_EVENTS={}", self.watchtower_events);
        let _ = writeln!(
            out,
            "AUTOHEAL_UNHEALTHY_THRESHOLD={}",
            self.unhealthy_threshold
        );
        let _ = writeln!(
            out,
            "AUTOHEAL_BACKOFF_MULTIPLIER={}",
            self.backoff_multiplier
        );
        let _ = writeln!(out, "AUTOHEAL_BACKOFF_MAX={}", self.backoff_max);
        let _ = writeln!(
            out,
            "AUTOHEAL_BACKOFF_RESET_AFTER={}",
            self.backoff_reset_after
        );
        let _ = writeln!(out, "AUTOHEAL_RESTART_BUDGET={}", self.restart_budget);
        let _ = writeln!(out, "AUTOHEAL_RESTART_WINDOW={}", self.restart_window);
        out
    }

    /// Debounce window for event coalescing: the scan interval, with a 5 s
    /// floor when the interval is unset.
    pub fn debounce_window(&self) -> Duration {
        match self.interval {
            0 => Duration::from_secs(5),
            n => Duration::from_secs(n),
        }
    }
}

fn env_str(key: &str, default: &str) -> String {
    match env::var(key) {
        Ok(v) if !v.is_empty() => v,
        _ => default.to_string(),
    }
}

/// Parses an env var with `FromStr`, keeping the default on absence or parse
/// failure (matching the forgiving shell-era behavior).
fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(v) => v.trim().parse().unwrap_or(default),
        Err(_) => default,
    }
}

pub(crate) fn parse_exit_codes(raw: &str) -> Result<BTreeSet<i64>, String> {
    let mut codes = BTreeSet::new();
    for part in raw.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let code: i64 = part
            .parse()
            .map_err(|_| format!("{part:?} is not an integer exit code"))?;
        codes.insert(code);
    }
    Ok(codes)
}
