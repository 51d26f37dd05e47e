//! Ordered, multi-subscriber progress fan-out, keyed by document id.
//!
//! Guarantees that every subscriber observes non-decreasing percentage
//! and timestamp for a given document. Subscribers joining mid-run get
//! the latest known snapshot immediately, then subsequent events; they
//! never see a replay of earlier events. Publishing is best-effort and
//! never affects the underlying run.

use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

/// Broadcast buffer per document. Slow subscribers that fall further
/// behind than this see a lag error and skip ahead.
const CHANNEL_CAPACITY: usize = 64;

/// An immutable point-in-time progress record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub document_id: String,
    pub stage: String,
    pub current: u32,
    pub total: u32,
    pub percentage: f64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
}

impl ProgressEvent {
    /// A mid-run update event.
    pub fn update(
        document_id: impl Into<String>,
        stage: impl Into<String>,
        current: u32,
        total: u32,
        message: impl Into<String>,
    ) -> Self {
        let percentage = if total > 0 {
            (current as f64 / total as f64 * 1000.0).round() / 10.0
        } else {
            0.0
        };
        Self {
            document_id: document_id.into(),
            stage: stage.into(),
            current,
            total,
            percentage,
            message: message.into(),
            completed: None,
            success: None,
            timestamp: now_epoch(),
        }
    }

    /// The terminal event for a document's run.
    pub fn finished(document_id: impl Into<String>, success: bool, message: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            stage: if success { "completed" } else { "failed" }.to_string(),
            current: 100,
            total: 100,
            percentage: 100.0,
            message: message.into(),
            completed: Some(true),
            success: Some(success),
            timestamp: now_epoch(),
        }
    }

    pub fn is_final(&self) -> bool {
        self.completed == Some(true)
    }
}

fn now_epoch() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}

struct DocumentChannel {
    tx: broadcast::Sender<ProgressEvent>,
    latest: Option<ProgressEvent>,
}

impl DocumentChannel {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx, latest: None }
    }
}

/// A subscriber's view of one document's progress.
pub struct Subscription {
    /// Latest event at join time, if the run had already emitted one.
    pub snapshot: Option<ProgressEvent>,
    pub receiver: broadcast::Receiver<ProgressEvent>,
}

impl Subscription {
    /// Next event, transparently skipping over lag gaps. `None` when the
    /// channel is closed.
    pub async fn next_event(&mut self) -> Option<ProgressEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "progress subscriber lagged, skipping ahead");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Per-document progress fan-out.
#[derive(Default)]
pub struct ProgressPublisher {
    channels: RwLock<HashMap<String, DocumentChannel>>,
}

impl ProgressPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish an event to every subscriber of its document.
    ///
    /// Percentage and timestamp are clamped so they never regress
    /// relative to the previously published event for the document.
    /// Send failures (no subscribers) are ignored.
    pub async fn publish(&self, mut event: ProgressEvent) {
        let mut channels = self.channels.write().await;
        let channel = channels
            .entry(event.document_id.clone())
            .or_insert_with(DocumentChannel::new);

        if let Some(latest) = &channel.latest {
            if event.percentage < latest.percentage {
                event.percentage = latest.percentage;
            }
            if event.timestamp < latest.timestamp {
                event.timestamp = latest.timestamp;
            }
        }

        let is_final = event.is_final();
        let document_id = event.document_id.clone();
        channel.latest = Some(event.clone());
        if channel.tx.send(event).is_err() {
            debug!("no progress subscribers, event dropped");
        }

        // A finished document's channel is retired so a fresh run starts
        // with a clean ordering baseline.
        if is_final {
            channels.remove(&document_id);
        }
    }

    /// Subscribe to a document's progress. Joining before the run starts
    /// is allowed; the snapshot is then empty.
    pub async fn subscribe(&self, document_id: &str) -> Subscription {
        let mut channels = self.channels.write().await;
        let channel = channels
            .entry(document_id.to_string())
            .or_insert_with(DocumentChannel::new);
        Subscription {
            snapshot: channel.latest.clone(),
            receiver: channel.tx.subscribe(),
        }
    }

    /// Drop a document's channel once nothing references it: no run has
    /// published yet and the last subscriber is gone. Channels holding a
    /// baseline event stay until the terminal event retires them.
    pub async fn release_if_idle(&self, document_id: &str) {
        let mut channels = self.channels.write().await;
        if let Some(channel) = channels.get(document_id) {
            if channel.latest.is_none() && channel.tx.receiver_count() == 0 {
                channels.remove(document_id);
                debug!(document_id, "idle progress channel released");
            }
        }
    }

    /// Latest known event for a document, if any.
    pub async fn latest(&self, document_id: &str) -> Option<ProgressEvent> {
        self.channels
            .read()
            .await
            .get(document_id)
            .and_then(|c| c.latest.clone())
    }
}
