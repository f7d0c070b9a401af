//! Tracklist store client
//!
//! Wraps a [`TracklistStore`] so that no store fault ever reaches the
//! coordination loop: failures are logged, mirrored to the status board, and
//! returned as `false` / `None`. A `None` listing means "failed, retry later"
//! and is distinct from an empty listing.

use super::{TracklistChange, TracklistStore};
use crate::status::StatusBoard;
use jukebox_common::events::StatusCategory;
use jukebox_common::{Album, NewTracklistEntry, Song, TrackStatus, TracklistEntry};
use std::fmt::Display;
use std::sync::Arc;
use tracing::{debug, error};

#[derive(Clone)]
pub struct TracklistClient {
    store: Arc<dyn TracklistStore>,
    status: StatusBoard,
}

impl TracklistClient {
    pub fn new(store: Arc<dyn TracklistStore>, status: StatusBoard) -> Self {
        Self { store, status }
    }

    /// Underlying store, for bulk catalog work such as the library scan
    pub fn store(&self) -> &Arc<dyn TracklistStore> {
        &self.store
    }

    fn fault(&self, operation: &str, err: impl Display) {
        error!("Store {} failed: {}", operation, err);
        self.status
            .set(StatusCategory::Store, format!("{} failed: {}", operation, err));
    }

    pub async fn enqueue(&self, entry: NewTracklistEntry) -> Option<TracklistEntry> {
        let title = entry.title.clone();
        match self.store.enqueue(entry).await {
            Ok(entry) => {
                debug!(entry_id = %entry.id, "Enqueued '{}'", title);
                self.status
                    .set(StatusCategory::Store, format!("enqueued '{}'", title));
                Some(entry)
            }
            Err(e) => {
                self.fault("enqueue", e);
                None
            }
        }
    }

    /// Entries with `status`, sorted by (priority, createdAt); `None` on failure
    pub async fn list_by_status(&self, status: TrackStatus) -> Option<Vec<TracklistEntry>> {
        match self.store.list_by_status(status).await {
            Ok(entries) => Some(entries),
            Err(e) => {
                self.fault("list", e);
                None
            }
        }
    }

    pub async fn list_all(&self) -> Option<Vec<TracklistEntry>> {
        match self.store.list_all().await {
            Ok(entries) => Some(entries),
            Err(e) => {
                self.fault("list", e);
                None
            }
        }
    }

    /// `None` when the entry is absent or the store failed
    pub async fn get(&self, id: &str) -> Option<TracklistEntry> {
        match self.store.get(id).await {
            Ok(entry) => entry,
            Err(e) => {
                self.fault("get", e);
                None
            }
        }
    }

    pub async fn set_status(
        &self,
        id: &str,
        status: TrackStatus,
        assigned_node_id: Option<&str>,
    ) -> bool {
        match self.store.set_status(id, status, assigned_node_id).await {
            Ok(updated) => {
                if !updated {
                    debug!(entry_id = id, "set_status({}) matched no entry", status);
                }
                updated
            }
            Err(e) => {
                self.fault("set_status", e);
                false
            }
        }
    }

    pub async fn set_exists_at_master(&self, id: &str, exists: bool, length: Option<u32>) -> bool {
        match self.store.set_exists_at_master(id, exists, length).await {
            Ok(updated) => updated,
            Err(e) => {
                self.fault("set_exists_at_master", e);
                false
            }
        }
    }

    pub async fn delete(&self, id: &str) -> bool {
        match self.store.delete(id).await {
            Ok(deleted) => deleted,
            Err(e) => {
                self.fault("delete", e);
                false
            }
        }
    }

    /// Number of entries removed; `None` on failure
    pub async fn clear_all(&self) -> Option<u64> {
        match self.store.clear_all().await {
            Ok(count) => {
                self.status
                    .set(StatusCategory::Store, format!("cleared {} entries", count));
                Some(count)
            }
            Err(e) => {
                self.fault("clear", e);
                None
            }
        }
    }

    pub async fn current_revision(&self) -> Option<i64> {
        match self.store.current_revision().await {
            Ok(revision) => Some(revision),
            Err(e) => {
                self.fault("revision", e);
                None
            }
        }
    }

    pub async fn changes_since(&self, revision: i64) -> Option<Vec<TracklistChange>> {
        match self.store.changes_since(revision).await {
            Ok(changes) => Some(changes),
            Err(e) => {
                self.fault("change feed", e);
                None
            }
        }
    }

    pub async fn find_song(&self, album: &str, title: &str) -> Option<Song> {
        match self.store.find_song(album, title).await {
            Ok(song) => song,
            Err(e) => {
                self.fault("song lookup", e);
                None
            }
        }
    }

    pub async fn list_albums(&self) -> Option<Vec<Album>> {
        match self.store.list_albums().await {
            Ok(albums) => Some(albums),
            Err(e) => {
                self.fault("album list", e);
                None
            }
        }
    }
}
