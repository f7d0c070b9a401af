//! Pub/sub wire records
//!
//! JSON frames exchanged with the external realtime server over its socket,
//! and the bodies POSTed to its HTTP control endpoints.

use super::tracklist::{EntrySnapshot, EventSource, TracklistEvent, TracklistOperation};
use crate::models::{NodeRole, TrackStatus, TracklistEntry};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `type` of a validation request frame
pub const VALIDATION_REQUEST_TYPE: &str = "validation_request";

/// Sent once per socket connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub role: NodeRole,
}

impl RegisterMessage {
    pub fn new(role: NodeRole) -> Self {
        Self {
            kind: "register".to_string(),
            role,
        }
    }
}

/// Tracklist operation broadcast
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TracklistUpdate {
    pub operation_type: TracklistOperation,
    #[serde(default)]
    pub song_id: Option<String>,
    pub song_title: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub album: String,
    #[serde(default)]
    pub duration: u32,
    #[serde(default)]
    pub status: Option<TrackStatus>,
    #[serde(default)]
    pub exists_at_master: bool,
    #[serde(default)]
    pub length: Option<u32>,
    pub timestamp: DateTime<Utc>,
}

impl TracklistUpdate {
    pub fn from_entry(operation: TracklistOperation, entry: &TracklistEntry) -> Self {
        Self {
            operation_type: operation,
            song_id: Some(entry.song_id.clone()),
            song_title: entry.title.clone(),
            artist: entry.artist.clone(),
            album: entry.album.clone(),
            duration: entry.duration,
            status: Some(entry.status),
            exists_at_master: entry.exists_at_master,
            length: entry.length,
            timestamp: Utc::now(),
        }
    }

    pub fn into_event(self) -> TracklistEvent {
        TracklistEvent {
            operation: self.operation_type,
            source: EventSource::PubSub,
            entry: EntrySnapshot {
                tracklist_id: None,
                song_id: self.song_id,
                title: self.song_title,
                artist: self.artist,
                album: self.album,
                duration: self.duration,
                status: self.status,
                exists_at_master: self.exists_at_master,
                length: self.length,
            },
        }
    }
}

/// Asks the master to validate an entry enqueued elsewhere
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub tracklist_id: String,
    pub title: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub album: String,
    pub timestamp: DateTime<Utc>,
}

impl ValidationRequest {
    pub fn for_entry(entry: &TracklistEntry) -> Self {
        Self {
            kind: VALIDATION_REQUEST_TYPE.to_string(),
            tracklist_id: entry.id.clone(),
            title: entry.title.clone(),
            artist: entry.artist.clone(),
            album: entry.album.clone(),
            timestamp: Utc::now(),
        }
    }
}

/// Any inbound socket frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PubSubMessage {
    Update(TracklistUpdate),
    ValidationRequest(ValidationRequest),
}

impl PubSubMessage {
    /// Decode a text frame; frames carrying a `type` other than
    /// `validation_request` are treated as tracklist updates
    pub fn parse(text: &str) -> crate::Result<Self> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        let is_validation = value
            .get("type")
            .and_then(|t| t.as_str())
            .map(|t| t == VALIDATION_REQUEST_TYPE)
            .unwrap_or(false);

        if is_validation {
            Ok(PubSubMessage::ValidationRequest(serde_json::from_value(value)?))
        } else {
            Ok(PubSubMessage::Update(serde_json::from_value(value)?))
        }
    }
}

/// Body of `/api/tracklist`, `/api/pause`, `/api/resume` and `/api/skip`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportNotice {
    pub tracklist_id: String,
    pub song_title: String,
    pub artist: String,
    pub album: String,
}

impl From<&TracklistEntry> for TransportNotice {
    fn from(entry: &TracklistEntry) -> Self {
        Self {
            tracklist_id: entry.id.clone(),
            song_title: entry.title.clone(),
            artist: entry.artist.clone(),
            album: entry.album.clone(),
        }
    }
}

/// Body of `/api/validate`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationNotice {
    pub tracklist_id: String,
    pub exists_at_master: bool,
    #[serde(default)]
    pub length: Option<u32>,
}
