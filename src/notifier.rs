//! Extraction notifier: consumes the server-push channel that reports
//! AI-extraction progress for an uploaded resume.
//!
//! The channel is at-most-once: the server replays nothing. The notifier
//! reconnects with capped exponential backoff and jitter, and resubscribes
//! by simply reopening the user-keyed channel. Completion is confirmed only
//! by message receipt; the coordinator owns the poll-based fallback.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::auth::UserId;
use crate::config::CoordinatorConfig;

/// A push message from the extraction pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExtractionEvent {
    /// Incremental progress: percentage plus a phase label.
    Progress {
        step: u8,
        /// 0..=100.
        progress: u8,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        details: Option<String>,
    },
    /// Extraction finished, with a data-quality report.
    Completion {
        confidence_score: f32,
        #[serde(default)]
        missing_sections: Vec<String>,
    },
}

impl ExtractionEvent {
    pub fn is_completion(&self) -> bool {
        matches!(self, Self::Completion { .. })
    }
}

/// Reconnect policy for the push channel.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl From<&CoordinatorConfig> for ReconnectPolicy {
    fn from(cfg: &CoordinatorConfig) -> Self {
        Self {
            initial_backoff: cfg.reconnect_initial_backoff,
            max_backoff: cfg.reconnect_max_backoff,
        }
    }
}

impl ReconnectPolicy {
    /// Next backoff: doubled, capped, with up to 50% random jitter added.
    fn next_backoff(&self, current: Duration) -> Duration {
        let doubled = current.saturating_mul(2).min(self.max_backoff);
        let jitter_ms = rand::thread_rng().gen_range(0..=doubled.as_millis() as u64 / 2);
        doubled + Duration::from_millis(jitter_ms)
    }
}

/// Handle to the running push-channel consumer.
///
/// Owned exclusively by one onboarding session; `shutdown` closes the
/// socket and stops reconnecting.
pub struct ExtractionNotifier {
    events: mpsc::UnboundedReceiver<ExtractionEvent>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ExtractionNotifier {
    /// Open the channel for `user` and spawn the read/reconnect task.
    pub fn connect(ws_base_url: &str, user: UserId, policy: ReconnectPolicy) -> Self {
        let url = format!(
            "{}/ws/extraction/{user}",
            ws_base_url.trim_end_matches('/')
        );
        let (tx, rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(run_channel(url, tx, shutdown_rx, policy));

        Self {
            events: rx,
            shutdown: shutdown_tx,
            task,
        }
    }

    /// Receive the next event. `None` once the channel has shut down.
    pub async fn recv(&mut self) -> Option<ExtractionEvent> {
        self.events.recv().await
    }

    /// Raw event receiver, for callers that select over it themselves.
    pub fn events_mut(&mut self) -> &mut mpsc::UnboundedReceiver<ExtractionEvent> {
        &mut self.events
    }

    /// Close the socket and stop the consumer task.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

async fn run_channel(
    url: String,
    tx: mpsc::UnboundedSender<ExtractionEvent>,
    mut shutdown: watch::Receiver<bool>,
    policy: ReconnectPolicy,
) {
    let mut backoff = policy.initial_backoff;

    loop {
        if *shutdown.borrow() {
            return;
        }

        match connect_async(url.as_str()).await {
            Ok((mut ws, _resp)) => {
                info!(url = %url, "Extraction channel connected");
                backoff = policy.initial_backoff;

                loop {
                    tokio::select! {
                        changed = shutdown.changed() => {
                            if changed.is_err() || *shutdown.borrow() {
                                let _ = ws.close(None).await;
                                info!("Extraction channel closed on shutdown");
                                return;
                            }
                        }
                        msg = ws.next() => {
                            match msg {
                                Some(Ok(Message::Text(text))) => {
                                    match serde_json::from_str::<ExtractionEvent>(&text) {
                                        Ok(event) => {
                                            if tx.send(event).is_err() {
                                                debug!("Event receiver dropped, closing channel");
                                                let _ = ws.close(None).await;
                                                return;
                                            }
                                        }
                                        Err(e) => {
                                            debug!(error = %e, text = %text,
                                                "Unrecognized push message");
                                        }
                                    }
                                }
                                Some(Ok(Message::Ping(data))) => {
                                    if ws.send(Message::Pong(data)).await.is_err() {
                                        break;
                                    }
                                }
                                Some(Ok(Message::Close(_))) | None => {
                                    warn!("Extraction channel closed by server");
                                    break;
                                }
                                Some(Err(e)) => {
                                    warn!(error = %e, "Extraction channel error");
                                    break;
                                }
                                Some(Ok(_)) => {}
                            }
                        }
                    }
                }
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Extraction channel connect failed");
            }
        }

        // Dropped or failed connection: back off, then resubscribe.
        let wait = backoff;
        backoff = policy.next_backoff(backoff);
        debug!(wait = ?wait, "Reconnecting extraction channel");
        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            changed = shutdown.changed() => {
                // A dropped sender means the handle is gone; stop
                // reconnecting rather than spinning through the backoff.
                if changed.is_err() || *shutdown.borrow() {
                    return;
                }
            }
        }
    }
}
