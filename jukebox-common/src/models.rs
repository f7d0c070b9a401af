//! Store models
//!
//! Records mirrored into the document store's three collections
//! (`albums`, `songs`, `tracklist`). Field names serialize in camelCase to
//! match the documents other nodes read and write.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Role a node plays in the jukebox cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    /// Owns the library, the audio output and authoritative tracklist transitions
    Master,
    /// Mirrors playback time and forwards remote input
    Slave,
}

impl NodeRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeRole::Master => "master",
            NodeRole::Slave => "slave",
        }
    }

    pub fn is_master(&self) -> bool {
        matches!(self, NodeRole::Master)
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "master" | "hub" => Ok(NodeRole::Master),
            "slave" => Ok(NodeRole::Slave),
            other => Err(format!("unknown node role '{}' (expected master or slave)", other)),
        }
    }
}

/// Tracklist entry status, persisted as lowercase tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackStatus {
    Queued,
    Playing,
    Paused,
    /// Kept for compatibility; completed entries are deleted, not archived
    Played,
    Skipped,
}

impl TrackStatus {
    pub const ALL: [TrackStatus; 5] = [
        TrackStatus::Queued,
        TrackStatus::Playing,
        TrackStatus::Paused,
        TrackStatus::Played,
        TrackStatus::Skipped,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TrackStatus::Queued => "queued",
            TrackStatus::Playing => "playing",
            TrackStatus::Paused => "paused",
            TrackStatus::Played => "played",
            TrackStatus::Skipped => "skipped",
        }
    }

    /// Whether a transition into this status stamps `playedAt`
    pub fn stamps_played_at(&self) -> bool {
        matches!(self, TrackStatus::Playing | TrackStatus::Played)
    }
}

impl fmt::Display for TrackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrackStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TrackStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown tracklist status '{}'", s))
    }
}

/// Album catalog entry (`albums` collection)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Album {
    pub id: String,
    pub title: String,
    pub artist: String,
}

/// Song catalog entry (`songs` collection)
///
/// Joined to its album by album title, not by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Song {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub family_friendly: bool,
}

/// Queue element shared by every node (`tracklist` collection)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TracklistEntry {
    pub id: String,
    pub song_id: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    /// Denormalized catalog duration in seconds
    pub duration: u32,
    pub status: TrackStatus,
    /// Ascending sort key (lower plays sooner)
    pub priority: i32,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub played_at: Option<DateTime<Utc>>,
    pub requested_by: String,
    pub owner_node_id: String,
    #[serde(default)]
    pub assigned_node_id: Option<String>,
    /// Gate flag: invisible to playback pickup until some node validated it
    pub exists_at_master: bool,
    /// Validated playable duration in seconds
    #[serde(default)]
    pub length: Option<u32>,
    /// Store-wide change counter of the last write to this entry
    #[serde(default)]
    pub revision: i64,
}

impl TracklistEntry {
    /// Playable duration in seconds: validated `length` wins over catalog `duration`
    pub fn effective_length(&self) -> u32 {
        match self.length {
            Some(length) if length > 0 => length,
            _ => self.duration,
        }
    }

    /// Eligible for local playback pickup
    pub fn is_pickable(&self) -> bool {
        self.exists_at_master && self.status == TrackStatus::Queued
    }

    pub fn same_title(&self, title: &str) -> bool {
        self.title.eq_ignore_ascii_case(title)
    }
}

/// Fields supplied by the enqueuer; the store assigns id and revision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTracklistEntry {
    pub song_id: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub duration: u32,
    pub requested_by: String,
    pub owner_node_id: String,
    pub priority: i32,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> TracklistEntry {
        TracklistEntry {
            id: "e1".to_string(),
            song_id: "s1".to_string(),
            title: "Blue Monday".to_string(),
            artist: "New Order".to_string(),
            album: "Substance".to_string(),
            duration: 300,
            status: TrackStatus::Queued,
            priority: 1,
            created_at: Utc::now(),
            played_at: None,
            requested_by: "keypad".to_string(),
            owner_node_id: "hub".to_string(),
            assigned_node_id: None,
            exists_at_master: false,
            length: None,
            revision: 0,
        }
    }

    #[test]
    fn test_status_tokens_are_lowercase() {
        for status in TrackStatus::ALL {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
            assert_eq!(status.as_str().parse::<TrackStatus>().unwrap(), status);
        }
        assert!("Queued".parse::<TrackStatus>().is_err());
    }

    #[test]
    fn test_played_at_stamping_statuses() {
        assert!(TrackStatus::Playing.stamps_played_at());
        assert!(TrackStatus::Played.stamps_played_at());
        assert!(!TrackStatus::Paused.stamps_played_at());
        assert!(!TrackStatus::Queued.stamps_played_at());
    }

    #[test]
    fn test_length_takes_precedence_over_duration() {
        let mut e = entry();
        assert_eq!(e.effective_length(), 300);

        e.length = Some(0);
        assert_eq!(e.effective_length(), 300, "zero length is not authoritative");

        e.length = Some(287);
        assert_eq!(e.effective_length(), 287);
    }

    #[test]
    fn test_pickable_requires_validation() {
        let mut e = entry();
        assert!(!e.is_pickable());

        e.exists_at_master = true;
        assert!(e.is_pickable());

        e.status = TrackStatus::Playing;
        assert!(!e.is_pickable());
    }

    #[test]
    fn test_entry_serializes_camel_case() {
        let json = serde_json::to_value(entry()).unwrap();
        assert!(json.get("existsAtMaster").is_some());
        assert!(json.get("ownerNodeId").is_some());
        assert_eq!(json["status"], "queued");
    }

    #[test]
    fn test_node_role_parsing() {
        assert_eq!("master".parse::<NodeRole>().unwrap(), NodeRole::Master);
        assert_eq!("HUB".parse::<NodeRole>().unwrap(), NodeRole::Master);
        assert_eq!("slave".parse::<NodeRole>().unwrap(), NodeRole::Slave);
        assert!("observer".parse::<NodeRole>().is_err());
    }
}
