//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is shared via `Arc<EventBus>` between the orchestrator and
//! anything that wants to observe analysis runs (logging, the worker).

use std::fmt;

use chrono::{DateTime, Utc};
use physio_core::analysis::AnalysisKey;
use physio_core::types::AnalysisId;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// AnalysisEvent
// ---------------------------------------------------------------------------

/// Lifecycle stage an event reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnalysisEventKind {
    #[serde(rename = "analysis.started")]
    Started,
    #[serde(rename = "analysis.completed")]
    Completed,
    #[serde(rename = "analysis.failed")]
    Failed,
}

impl AnalysisEventKind {
    /// Dot-separated event name, e.g. `"analysis.completed"`.
    pub fn as_str(self) -> &'static str {
        match self {
            AnalysisEventKind::Started => "analysis.started",
            AnalysisEventKind::Completed => "analysis.completed",
            AnalysisEventKind::Failed => "analysis.failed",
        }
    }
}

impl fmt::Display for AnalysisEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something that happened to one analysis run.
///
/// Constructed via [`AnalysisEvent::new`] and enriched with
/// [`with_payload`](AnalysisEvent::with_payload).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisEvent {
    #[serde(rename = "eventType")]
    pub kind: AnalysisEventKind,

    pub analysis_id: AnalysisId,

    pub video_id: String,

    pub user_id: String,

    /// Free-form JSON payload carrying event-specific data.
    pub payload: serde_json::Value,

    /// When the event was created (UTC).
    pub timestamp: DateTime<Utc>,
}

impl AnalysisEvent {
    pub fn new(kind: AnalysisEventKind, analysis_id: AnalysisId, key: &AnalysisKey) -> Self {
        Self {
            kind,
            analysis_id,
            video_id: key.video_id.clone(),
            user_id: key.user_id.clone(),
            payload: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    /// Set the JSON payload for the event.
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn key(&self) -> AnalysisKey {
        AnalysisKey::new(self.video_id.clone(), self.user_id.clone())
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// # Usage
///
/// ```rust
/// use physio_core::analysis::AnalysisKey;
/// use physio_events::bus::{AnalysisEvent, AnalysisEventKind, EventBus};
///
/// let bus = EventBus::default();
/// let mut rx = bus.subscribe();
///
/// let key = AnalysisKey::new("video-1", "user-1");
/// bus.publish(AnalysisEvent::new(AnalysisEventKind::Started, uuid::Uuid::nil(), &key));
/// ```
pub struct EventBus {
    sender: broadcast::Sender<AnalysisEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed messages are dropped
    /// and slow receivers will observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// If there are no active subscribers the event is silently dropped.
    pub fn publish(&self, event: AnalysisEvent) {
        // Ignore the SendError; it only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AnalysisEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> AnalysisKey {
        AnalysisKey::new("video-9", "user-3")
    }

    #[tokio::test]
    async fn publish_and_receive_single_subscriber() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        let id = uuid::Uuid::now_v7();

        bus.publish(
            AnalysisEvent::new(AnalysisEventKind::Completed, id, &key())
                .with_payload(serde_json::json!({"injuryRiskScore": 12.5})),
        );

        let received = rx.recv().await.expect("should receive the event");
        assert_eq!(received.kind, AnalysisEventKind::Completed);
        assert_eq!(received.analysis_id, id);
        assert_eq!(received.key(), key());
        assert_eq!(received.payload["injuryRiskScore"], 12.5);
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(AnalysisEvent::new(AnalysisEventKind::Started, uuid::Uuid::nil(), &key()));

        let e1 = rx1.recv().await.expect("subscriber 1 should receive");
        let e2 = rx2.recv().await.expect("subscriber 2 should receive");
        assert_eq!(e1.kind, AnalysisEventKind::Started);
        assert_eq!(e2.kind, AnalysisEventKind::Started);
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        let bus = EventBus::default();
        bus.publish(AnalysisEvent::new(AnalysisEventKind::Failed, uuid::Uuid::nil(), &key()));
    }

    #[test]
    fn serializes_dotted_event_type() {
        let event = AnalysisEvent::new(AnalysisEventKind::Failed, uuid::Uuid::nil(), &key());
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["eventType"], "analysis.failed");
        assert_eq!(json["videoId"], "video-9");
        assert!(json["payload"].is_object());
    }
}
