//! # Event stream watcher.
//!
//! Subscribes to the Docker event stream filtered to the five container
//! actions the engine reacts to, decodes each message, and forwards it over
//! a bounded channel. On stream closure or error the watcher reconnects with
//! exponential backoff.
//!
//! ## Rules
//! - Channel capacity is 64; a slow consumer blocks the watcher rather than
//!   losing events (ordering preserved).
//! - Reconnect delays double from 1 s up to a 30 s cap.
//! - The delay resets once a connection proves live: first event received,
//!   or the stream stayed open for the liveness window.
//! - Cancellation closes the channel at the next suspension point.

use std::sync::Arc;
use std::time::Duration;

use bollard::models::EventMessage;
use bollard::system::EventsOptions;
use bollard::Docker;
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::docker::client::DockerClient;
use crate::docker::event::{decode, ContainerEvent, EventAction};
use crate::metrics::Metrics;

/// Bounded buffer between the watcher and the controller.
const CHANNEL_CAPACITY: usize = 64;
/// First reconnect delay.
const RECONNECT_INITIAL: Duration = Duration::from_secs(1);
/// Reconnect delay cap.
const RECONNECT_MAX: Duration = Duration::from_secs(30);
/// A stream open this long counts as a successful connection even if no
/// event has arrived yet.
const LIVENESS_WINDOW: Duration = Duration::from_secs(60);

/// Source of raw event streams. Production subscribes via bollard; tests
/// script the returned streams.
pub(crate) trait EventSource: Send + Sync + 'static {
    fn subscribe(&self) -> BoxStream<'static, Result<EventMessage, bollard::errors::Error>>;
}

struct DockerEventSource {
    api: Docker,
}

impl EventSource for DockerEventSource {
    fn subscribe(&self) -> BoxStream<'static, Result<EventMessage, bollard::errors::Error>> {
        let filters = std::collections::HashMap::from([
            ("type".to_string(), vec!["container".to_string()]),
            (
                "event".to_string(),
                EventAction::stream_filter()
                    .into_iter()
                    .map(str::to_string)
                    .collect(),
            ),
        ]);
        self.api
            .events(Some(EventsOptions::<String> {
                since: None,
                until: None,
                filters,
            }))
            .boxed()
    }
}

/// Reconnecting consumer of the Docker event stream.
pub struct EventWatcher {
    source: Arc<dyn EventSource>,
    metrics: Arc<Metrics>,
}

impl EventWatcher {
    pub fn new(client: &DockerClient, metrics: Arc<Metrics>) -> Self {
        Self {
            source: Arc::new(DockerEventSource { api: client.raw() }),
            metrics,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_source(source: Arc<dyn EventSource>, metrics: Arc<Metrics>) -> Self {
        Self { source, metrics }
    }

    /// Spawns the reader task and returns the event channel.
    ///
    /// The channel closes when `token` is cancelled.
    pub fn watch(self, token: CancellationToken) -> mpsc::Receiver<ContainerEvent> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        tokio::spawn(async move {
            self.run(token, tx).await;
        });
        rx
    }

    async fn run(self, token: CancellationToken, tx: mpsc::Sender<ContainerEvent>) {
        let mut delay = RECONNECT_INITIAL;

        loop {
            if token.is_cancelled() {
                return;
            }

            if self.consume_stream(&token, &tx, &mut delay).await {
                return;
            }
            self.metrics.set_stream_connected(false);

            // Disconnected with the context still live: back off, then retry.
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = token.cancelled() => return,
            }
            delay = (delay * 2).min(RECONNECT_MAX);
        }
    }

    /// Drains one stream connection. Returns true when the watcher must shut
    /// down (cancellation or consumer gone), false to reconnect.
    async fn consume_stream(
        &self,
        token: &CancellationToken,
        tx: &mpsc::Sender<ContainerEvent>,
        delay: &mut Duration,
    ) -> bool {
        let mut stream = self.source.subscribe();
        let mut live = false;
        let liveness = tokio::time::sleep(LIVENESS_WINDOW);
        tokio::pin!(liveness);

        loop {
            tokio::select! {
                _ = token.cancelled() => return true,
                _ = &mut liveness, if !live => {
                    live = true;
                    *delay = RECONNECT_INITIAL;
                    self.metrics.set_stream_connected(true);
                }
                item = stream.next() => match item {
                    Some(Ok(msg)) => {
                        if !live {
                            live = true;
                            *delay = RECONNECT_INITIAL;
                            self.metrics.set_stream_connected(true);
                        }
                        let Some(evt) = decode(&msg) else { continue };
                        debug!(id = %evt.id, action = evt.action.as_str(), "container event");
                        tokio::select! {
                            sent = tx.send(evt) => {
                                if sent.is_err() {
                                    return true; // consumer dropped
                                }
                            }
                            _ = token.cancelled() => return true,
                        }
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "event stream error, reconnecting");
                        return false;
                    }
                    None => {
                        warn!("event stream closed, reconnecting");
                        return false;
                    }
                },
            }
        }
    }
}
