//! Normalized tracklist change events
//!
//! Both change sources (the store change feed and the pub/sub socket) are
//! reduced to one shape so the coordinator handles them identically.

use crate::models::{TrackStatus, TracklistEntry};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What happened to a tracklist entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TracklistOperation {
    Insert,
    Update,
    Play,
    Pause,
    Resume,
    Skip,
    Remove,
}

impl fmt::Display for TracklistOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = match self {
            TracklistOperation::Insert => "insert",
            TracklistOperation::Update => "update",
            TracklistOperation::Play => "play",
            TracklistOperation::Pause => "pause",
            TracklistOperation::Resume => "resume",
            TracklistOperation::Skip => "skip",
            TracklistOperation::Remove => "remove",
        };
        f.write_str(token)
    }
}

/// Where a normalized event came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSource {
    StoreFeed,
    PubSub,
}

/// Entry fields carried by a change event
///
/// Pub/sub broadcasts do not carry the store id, so `tracklist_id` is optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntrySnapshot {
    #[serde(default)]
    pub tracklist_id: Option<String>,
    #[serde(default)]
    pub song_id: Option<String>,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub duration: u32,
    #[serde(default)]
    pub status: Option<TrackStatus>,
    pub exists_at_master: bool,
    #[serde(default)]
    pub length: Option<u32>,
}

impl From<&TracklistEntry> for EntrySnapshot {
    fn from(entry: &TracklistEntry) -> Self {
        Self {
            tracklist_id: Some(entry.id.clone()),
            song_id: Some(entry.song_id.clone()),
            title: entry.title.clone(),
            artist: entry.artist.clone(),
            album: entry.album.clone(),
            duration: entry.duration,
            status: Some(entry.status),
            exists_at_master: entry.exists_at_master,
            length: entry.length,
        }
    }
}

/// One normalized change, as consumed by the coordinator loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracklistEvent {
    pub operation: TracklistOperation,
    pub source: EventSource,
    pub entry: EntrySnapshot,
}

impl TracklistEvent {
    pub fn from_feed(operation: TracklistOperation, entry: &TracklistEntry) -> Self {
        Self {
            operation,
            source: EventSource::StoreFeed,
            entry: EntrySnapshot::from(entry),
        }
    }
}
