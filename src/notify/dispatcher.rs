//! # Notification dispatcher.
//!
//! Fans a message out to every configured transport. Each send runs on its
//! own tracked task so a slow webhook cannot stall the engine; shutdown
//! drains in-flight sends for up to 10 seconds, then abandons them with a
//! warning.
//!
//! ## Transports
//! Generic webhook (configurable JSON key), Apprise, Gotify, Discord,
//! Slack, Telegram, Pushover (form-encoded), Pushbullet (Access-Token
//! header), LunaSea.
//!
//! ## Rules
//! - Action sends retry up to 3 times with 1/2/4 s delays; startup and skip
//!   send once.
//! - Rate limiting keys on the first 50 characters of the text (which carry
//!   the container name), window `NOTIFY_RATE_LIMIT` seconds.
//! - `NOTIFY_HOSTNAME` prefixes every message with `[host]`.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::config::{Config, NotifyCategory};
use crate::error::GuardianError;
use crate::metrics::Metrics;
use crate::notify::Notify;

/// Grace period for in-flight sends on shutdown.
const CLOSE_GRACE: Duration = Duration::from_secs(10);
/// Retry delays for action notifications.
const RETRY_DELAYS: [Duration; 3] = [
    Duration::from_secs(1),
    Duration::from_secs(2),
    Duration::from_secs(4),
];
/// Rate-limit keys are the leading characters of the message text.
const RATE_KEY_LEN: usize = 50;

/// One transport-specific HTTP request.
pub(crate) enum Payload {
    Json {
        url: String,
        body: serde_json::Value,
    },
    JsonWithHeader {
        url: String,
        header: (&'static str, String),
        body: serde_json::Value,
    },
    Form {
        url: String,
        fields: Vec<(&'static str, String)>,
    },
}

/// Production [`Notify`] implementation.
pub struct Dispatcher {
    cfg: Arc<Config>,
    client: reqwest::Client,
    categories: BTreeSet<NotifyCategory>,
    metrics: Arc<Metrics>,
    clock: Arc<dyn Clock>,
    inflight: TaskTracker,
    rate: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl Dispatcher {
    pub fn new(
        cfg: Arc<Config>,
        metrics: Arc<Metrics>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, GuardianError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.curl_timeout))
            .build()?;
        Ok(Self {
            categories: cfg.resolved_notify_events(),
            cfg,
            client,
            metrics,
            clock,
            inflight: TaskTracker::new(),
            rate: Mutex::new(HashMap::new()),
        })
    }

    /// Space-separated list of configured transports, `none` when empty.
    /// Printed in the startup banner.
    pub fn configured_services(&self) -> String {
        let services = self.service_names();
        if services.is_empty() {
            "none".to_string()
        } else {
            services.join(" ")
        }
    }

    fn service_names(&self) -> Vec<&'static str> {
        let c = &self.cfg;
        let mut out = Vec::new();
        if !c.webhook_url.is_empty() {
            out.push("webhook");
        }
        if !c.apprise_url.is_empty() {
            out.push("apprise");
        }
        if !c.gotify_url.is_empty() {
            out.push("gotify");
        }
        if !c.discord_webhook.is_empty() {
            out.push("discord");
        }
        if !c.slack_webhook.is_empty() {
            out.push("slack");
        }
        if !c.telegram_token.is_empty() {
            out.push("telegram");
        }
        if !c.pushover_token.is_empty() {
            out.push("pushover");
        }
        if !c.pushbullet_token.is_empty() {
            out.push("pushbullet");
        }
        if !c.lunasea_webhook.is_empty() {
            out.push("lunasea");
        }
        out
    }

    pub(crate) fn has(&self, category: NotifyCategory) -> bool {
        self.categories.contains(&category)
    }

    /// Checks and stamps the rate limiter. Returns true when the message
    /// should be suppressed.
    pub(crate) fn is_rate_limited(&self, key: &str) -> bool {
        if self.cfg.notify_rate_limit == 0 {
            return false;
        }
        let window = Duration::from_secs(self.cfg.notify_rate_limit);
        let now = self.clock.now();
        let mut rate = self.rate.lock().unwrap();
        if let Some(last) = rate.get(key) {
            if (now - *last).to_std().unwrap_or(Duration::ZERO) < window {
                return true;
            }
        }
        rate.insert(key.to_string(), now);
        false
    }

    pub(crate) fn targets(&self, text: &str) -> Vec<(&'static str, Payload)> {
        let c = &self.cfg;
        let mut targets = Vec::new();

        if !c.webhook_url.is_empty() {
            let mut body = serde_json::Map::new();
            body.insert(
                c.webhook_json_key.clone(),
                serde_json::Value::String(text.to_string()),
            );
            targets.push((
                "webhook",
                Payload::Json {
                    url: c.webhook_url.clone(),
                    body: serde_json::Value::Object(body),
                },
            ));
        }
        if !c.apprise_url.is_empty() {
            targets.push((
                "apprise",
                Payload::Json {
                    url: c.apprise_url.clone(),
                    body: json!({ "title": "Docker-Guardian", "body": text }),
                },
            ));
        }
        if !c.gotify_url.is_empty() {
            targets.push((
                "gotify",
                Payload::Json {
                    url: format!("{}/message?token={}", c.gotify_url, c.gotify_token),
                    body: json!({ "title": "Docker-Guardian", "message": text, "priority": 5 }),
                },
            ));
        }
        if !c.discord_webhook.is_empty() {
            targets.push((
                "discord",
                Payload::Json {
                    url: c.discord_webhook.clone(),
                    body: json!({
                        "embeds": [{ "title": "Docker-Guardian", "description": text, "color": 3_066_993 }]
                    }),
                },
            ));
        }
        if !c.slack_webhook.is_empty() {
            targets.push((
                "slack",
                Payload::Json {
                    url: c.slack_webhook.clone(),
                    body: json!({ "text": format!("*Docker-Guardian*\n{text}") }),
                },
            ));
        }
        if !c.telegram_token.is_empty() {
            targets.push((
                "telegram",
                Payload::Json {
                    url: format!("https://api.telegram.org/bot{}/sendMessage", c.telegram_token),
                    body: json!({ "chat_id": c.telegram_chat_id, "text": format!("Docker-Guardian: {text}") }),
                },
            ));
        }
        if !c.pushover_token.is_empty() {
            targets.push((
                "pushover",
                Payload::Form {
                    url: "https://api.pushover.net/1/messages.json".to_string(),
                    fields: vec![
                        ("token", c.pushover_token.clone()),
                        ("user", c.pushover_user.clone()),
                        ("title", "Docker-Guardian".to_string()),
                        ("message", text.to_string()),
                    ],
                },
            ));
        }
        if !c.pushbullet_token.is_empty() {
            targets.push((
                "pushbullet",
                Payload::JsonWithHeader {
                    url: "https://api.pushbullet.com/v2/pushes".to_string(),
                    header: ("Access-Token", c.pushbullet_token.clone()),
                    body: json!({ "type": "note", "title": "Docker-Guardian", "body": text }),
                },
            ));
        }
        if !c.lunasea_webhook.is_empty() {
            targets.push((
                "lunasea",
                Payload::Json {
                    url: c.lunasea_webhook.clone(),
                    body: json!({ "title": "Docker-Guardian", "body": text }),
                },
            ));
        }
        targets
    }

    fn dispatch(&self, text: &str, retry: bool) {
        let text = if self.cfg.notify_hostname.is_empty() {
            text.to_string()
        } else {
            format!("[{}] {}", self.cfg.notify_hostname, text)
        };

        if self.has(NotifyCategory::Debug) {
            for service in self.service_names() {
                debug!(service, %text, "notify");
            }
        }

        for (service, payload) in self.targets(&text) {
            let client = self.client.clone();
            let metrics = self.metrics.clone();
            self.inflight.spawn(async move {
                send_with_retry(&client, &metrics, service, retry, payload).await;
            });
        }
    }
}

#[async_trait]
impl Notify for Dispatcher {
    async fn startup(&self, text: &str) {
        if self.has(NotifyCategory::Startup) {
            self.dispatch(text, false);
        }
    }

    async fn action(&self, text: &str) {
        let failure = text.contains("Failed") || text.contains("[CRITICAL]");
        let wanted = if failure {
            self.has(NotifyCategory::Actions) || self.has(NotifyCategory::Failures)
        } else {
            self.has(NotifyCategory::Actions)
        };
        if !wanted {
            return;
        }

        let key: String = text.chars().take(RATE_KEY_LEN).collect();
        if self.is_rate_limited(&key) {
            return;
        }
        self.dispatch(text, true);
    }

    async fn skip(&self, text: &str) {
        if self.has(NotifyCategory::Skips) {
            self.dispatch(text, false);
        }
    }

    async fn close(&self) {
        self.inflight.close();
        if tokio::time::timeout(CLOSE_GRACE, self.inflight.wait())
            .await
            .is_err()
        {
            warn!(
                "notification shutdown timed out after {}s, some notifications may be lost",
                CLOSE_GRACE.as_secs()
            );
        }
    }
}

/// Sends one payload, retrying on failure when `retry` is set.
async fn send_with_retry(
    client: &reqwest::Client,
    metrics: &Metrics,
    service: &'static str,
    retry: bool,
    payload: Payload,
) {
    let attempts = if retry { RETRY_DELAYS.len() } else { 1 };

    for attempt in 0..attempts {
        match send_once(client, &payload).await {
            Ok(()) => {
                metrics.inc_notification(service, "success");
                return;
            }
            Err(e) => {
                warn!(service, attempt = attempt + 1, error = %e, "notification send failed");
                if attempt + 1 < attempts {
                    tokio::time::sleep(RETRY_DELAYS[attempt]).await;
                }
            }
        }
    }
    metrics.inc_notification(service, "failure");
}

async fn send_once(client: &reqwest::Client, payload: &Payload) -> Result<(), String> {
    let request = match payload {
        Payload::Json { url, body } => client.post(url).json(body),
        Payload::JsonWithHeader {
            url,
            header: (name, value),
            body,
        } => client.post(url).header(*name, value).json(body),
        Payload::Form { url, fields } => {
            let form: Vec<(&str, &str)> =
                fields.iter().map(|(k, v)| (*k, v.as_str())).collect();
            client.post(url).form(&form)
        }
    };

    let resp = request.send().await.map_err(|e| e.to_string())?;
    let status = resp.status();
    if !status.is_success() {
        return Err(format!("HTTP {status}"));
    }
    Ok(())
}
