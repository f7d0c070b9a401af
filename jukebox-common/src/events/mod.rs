//! Event types for the jukebox event system
//!
//! Provides shared event definitions and the in-process EventBus.

mod tracklist;
mod wire;

pub use tracklist::{EntrySnapshot, EventSource, TracklistEvent, TracklistOperation};
pub use wire::{
    PubSubMessage, RegisterMessage, TracklistUpdate, TransportNotice, ValidationNotice,
    ValidationRequest, VALIDATION_REQUEST_TYPE,
};

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

/// Category of the rolling status line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusCategory {
    Store,
    Socket,
    Control,
    Queue,
}

impl fmt::Display for StatusCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StatusCategory::Store => "store",
            StatusCategory::Socket => "socket",
            StatusCategory::Control => "control",
            StatusCategory::Queue => "queue",
        };
        f.write_str(name)
    }
}

/// Connection state of an outbound channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    Connecting,
    Connected,
    /// Reconnect attempts exhausted; no further retries
    Disconnected,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LinkState::Connecting => "connecting",
            LinkState::Connected => "connected",
            LinkState::Disconnected => "disconnected",
        };
        f.write_str(name)
    }
}

/// Jukebox event types
///
/// Broadcast via EventBus inside a node: the coordinator and the sequencer
/// emit them, the HTTP API streams them to SSE clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum JukeboxEvent {
    /// An entry left Loading and is now Playing
    TrackStarted {
        entry_id: String,
        title: String,
        artist: String,
        album: String,
        length_seconds: u32,
        /// Positional code of the track when it resolves in the local library
        code: Option<String>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Playing entry left the sequencer
    TrackFinished {
        entry_id: String,
        title: String,
        /// false when skipped or forced out by the safety timeout
        completed: bool,
        position_seconds: u32,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Current track restarted from position 0
    TrackRestarted {
        entry_id: String,
        title: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    PlaybackPaused {
        entry_id: String,
        position_seconds: u32,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    PlaybackResumed {
        entry_id: String,
        position_seconds: u32,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Periodic position while a track (or a mirrored clock) runs
    PlaybackPosition {
        entry_id: String,
        position_seconds: u32,
        length_seconds: u32,
        playing: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Local queue contents changed
    QueueChanged {
        queued: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A new entry was written to the store by this node
    EntryEnqueued {
        entry_id: String,
        title: String,
        artist: String,
        album: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Validator stamped an entry
    ValidationCompleted {
        entry_id: String,
        playable: bool,
        length_seconds: u32,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Latest line of the rolling status board
    StatusLine {
        category: StatusCategory,
        message: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Pub/sub socket or control link changed state
    LinkChanged {
        link: String,
        state: LinkState,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl JukeboxEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            JukeboxEvent::TrackStarted { .. } => "TrackStarted",
            JukeboxEvent::TrackFinished { .. } => "TrackFinished",
            JukeboxEvent::TrackRestarted { .. } => "TrackRestarted",
            JukeboxEvent::PlaybackPaused { .. } => "PlaybackPaused",
            JukeboxEvent::PlaybackResumed { .. } => "PlaybackResumed",
            JukeboxEvent::PlaybackPosition { .. } => "PlaybackPosition",
            JukeboxEvent::QueueChanged { .. } => "QueueChanged",
            JukeboxEvent::EntryEnqueued { .. } => "EntryEnqueued",
            JukeboxEvent::ValidationCompleted { .. } => "ValidationCompleted",
            JukeboxEvent::StatusLine { .. } => "StatusLine",
            JukeboxEvent::LinkChanged { .. } => "LinkChanged",
        }
    }
}

/// One-to-many event distribution (tokio broadcast)
///
/// Slow receivers lag and drop the oldest events rather than blocking the
/// coordinator loop.
pub struct EventBus {
    tx: broadcast::Sender<JukeboxEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<JukeboxEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: JukeboxEvent,
    ) -> Result<usize, broadcast::error::SendError<JukeboxEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: JukeboxEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TrackStatus;
    use chrono::Utc;

    fn started() -> JukeboxEvent {
        JukeboxEvent::TrackStarted {
            entry_id: "e1".to_string(),
            title: "Atmosphere".to_string(),
            artist: "Joy Division".to_string(),
            album: "Closer".to_string(),
            length_seconds: 250,
            code: Some("01-02".to_string()),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_eventbus_new() {
        let bus = EventBus::new(100);
        assert_eq!(bus.capacity(), 100);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_eventbus_emit_without_subscribers_fails() {
        let bus = EventBus::new(10);
        assert!(bus.emit(started()).is_err());
        bus.emit_lossy(started());
    }

    #[test]
    fn test_eventbus_multiple_subscribers() {
        let bus = EventBus::new(10);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        assert_eq!(bus.emit(started()).unwrap(), 2);

        assert_eq!(rx1.try_recv().unwrap().event_type(), "TrackStarted");
        assert_eq!(rx2.try_recv().unwrap().event_type(), "TrackStarted");
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let json = serde_json::to_string(&started()).unwrap();
        assert!(json.contains("\"type\":\"TrackStarted\""));

        let back: JukeboxEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.event_type(), "TrackStarted");
    }

    #[test]
    fn test_register_message_shape() {
        let json = serde_json::to_value(RegisterMessage::new(crate::NodeRole::Master)).unwrap();
        assert_eq!(json, serde_json::json!({"type": "register", "role": "master"}));
    }

    #[test]
    fn test_parse_tracklist_update_frame() {
        let frame = r#"{
            "operationType": "insert",
            "songId": "s-9",
            "songTitle": "Ceremony",
            "artist": "New Order",
            "album": "Substance",
            "duration": 273,
            "status": "queued",
            "existsAtMaster": false,
            "timestamp": "2025-11-02T10:00:00Z"
        }"#;

        match PubSubMessage::parse(frame).unwrap() {
            PubSubMessage::Update(update) => {
                assert_eq!(update.operation_type, TracklistOperation::Insert);
                let event = update.into_event();
                assert_eq!(event.source, EventSource::PubSub);
                assert_eq!(event.entry.title, "Ceremony");
                assert_eq!(event.entry.status, Some(TrackStatus::Queued));
                assert!(event.entry.tracklist_id.is_none());
            }
            other => panic!("expected update, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_validation_request_frame() {
        let frame = r#"{
            "type": "validation_request",
            "tracklistId": "t-1",
            "title": "Ceremony",
            "artist": "New Order",
            "album": "Substance",
            "timestamp": "2025-11-02T10:00:00Z"
        }"#;

        match PubSubMessage::parse(frame).unwrap() {
            PubSubMessage::ValidationRequest(req) => {
                assert_eq!(req.tracklist_id, "t-1");
                assert_eq!(req.album, "Substance");
            }
            other => panic!("expected validation request, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_malformed_frame_is_error() {
        assert!(PubSubMessage::parse("not json").is_err());
        assert!(PubSubMessage::parse(r#"{"type":"validation_request"}"#).is_err());
        assert!(PubSubMessage::parse(r#"{"hello":"world"}"#).is_err());
    }

    #[test]
    fn test_validation_notice_body() {
        let notice = ValidationNotice {
            tracklist_id: "t-1".to_string(),
            exists_at_master: true,
            length: Some(185),
        };
        let json = serde_json::to_value(notice).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"tracklistId": "t-1", "existsAtMaster": true, "length": 185})
        );
    }
}
