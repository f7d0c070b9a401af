//! In-process store
//!
//! Same contract as the SQLite store, kept entirely in memory. Used when the
//! configured database is `memory` (a standalone node with no shared store)
//! and by tests that run on a paused clock.

use super::{sort_entries, StoreResult, TracklistChange, TracklistStore};
use async_trait::async_trait;
use chrono::Utc;
use jukebox_common::events::TracklistOperation;
use jukebox_common::{Album, NewTracklistEntry, Song, TrackStatus, TracklistEntry};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct Collections {
    revision: i64,
    /// entry id -> (created revision, entry)
    tracklist: HashMap<String, (i64, TracklistEntry)>,
    albums: HashMap<String, Album>,
    songs: HashMap<String, Song>,
}

impl Collections {
    fn bump(&mut self) -> i64 {
        self.revision += 1;
        self.revision
    }

    /// Matching entries in FIFO order; insertion order breaks exact ties
    fn sorted(&self, keep: impl Fn(&TracklistEntry) -> bool) -> Vec<TracklistEntry> {
        let mut matching: Vec<&(i64, TracklistEntry)> =
            self.tracklist.values().filter(|(_, e)| keep(e)).collect();
        matching.sort_by_key(|(created, _)| *created);

        let mut entries: Vec<TracklistEntry> = matching.into_iter().map(|(_, e)| e.clone()).collect();
        sort_entries(&mut entries);
        entries
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<T>(&self, f: impl FnOnce(&mut Collections) -> T) -> T {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }
}

#[async_trait]
impl TracklistStore for MemoryStore {
    async fn enqueue(&self, new: NewTracklistEntry) -> StoreResult<TracklistEntry> {
        Ok(self.with(|c| {
            let revision = c.bump();
            let entry = TracklistEntry {
                id: Uuid::new_v4().to_string(),
                song_id: new.song_id,
                title: new.title,
                artist: new.artist,
                album: new.album,
                duration: new.duration,
                status: TrackStatus::Queued,
                priority: new.priority,
                created_at: new.created_at,
                played_at: None,
                requested_by: new.requested_by,
                owner_node_id: new.owner_node_id,
                assigned_node_id: None,
                exists_at_master: false,
                length: None,
                revision,
            };
            c.tracklist
                .insert(entry.id.clone(), (revision, entry.clone()));
            entry
        }))
    }

    async fn list_by_status(&self, status: TrackStatus) -> StoreResult<Vec<TracklistEntry>> {
        Ok(self.with(|c| c.sorted(|e| e.status == status)))
    }

    async fn list_all(&self) -> StoreResult<Vec<TracklistEntry>> {
        Ok(self.with(|c| c.sorted(|_| true)))
    }

    async fn get(&self, id: &str) -> StoreResult<Option<TracklistEntry>> {
        Ok(self.with(|c| c.tracklist.get(id).map(|(_, e)| e.clone())))
    }

    async fn set_status(
        &self,
        id: &str,
        status: TrackStatus,
        assigned_node_id: Option<&str>,
    ) -> StoreResult<bool> {
        Ok(self.with(|c| {
            if !c.tracklist.contains_key(id) {
                return false;
            }
            let revision = c.bump();
            if let Some((_, entry)) = c.tracklist.get_mut(id) {
                entry.status = status;
                if status.stamps_played_at() {
                    entry.played_at = Some(Utc::now());
                }
                if let Some(node) = assigned_node_id {
                    entry.assigned_node_id = Some(node.to_string());
                }
                entry.revision = revision;
            }
            true
        }))
    }

    async fn set_exists_at_master(
        &self,
        id: &str,
        exists: bool,
        length: Option<u32>,
    ) -> StoreResult<bool> {
        Ok(self.with(|c| {
            if !c.tracklist.contains_key(id) {
                return false;
            }
            let revision = c.bump();
            if let Some((_, entry)) = c.tracklist.get_mut(id) {
                entry.exists_at_master = exists;
                if exists {
                    if let Some(length) = length.filter(|l| *l > 0) {
                        entry.length = Some(length);
                    }
                } else {
                    entry.length = None;
                }
                entry.revision = revision;
            }
            true
        }))
    }

    async fn delete(&self, id: &str) -> StoreResult<bool> {
        Ok(self.with(|c| c.tracklist.remove(id).is_some()))
    }

    async fn clear_all(&self) -> StoreResult<u64> {
        Ok(self.with(|c| {
            let count = c.tracklist.len() as u64;
            c.tracklist.clear();
            count
        }))
    }

    async fn current_revision(&self) -> StoreResult<i64> {
        Ok(self.with(|c| c.revision))
    }

    async fn changes_since(&self, revision: i64) -> StoreResult<Vec<TracklistChange>> {
        let mut changes: Vec<TracklistChange> = self.with(|c| {
            c.tracklist
                .values()
                .filter(|(_, e)| e.revision > revision)
                .map(|(created, e)| TracklistChange {
                    operation: if *created > revision {
                        TracklistOperation::Insert
                    } else {
                        TracklistOperation::Update
                    },
                    entry: e.clone(),
                })
                .collect()
        });
        changes.sort_by_key(|change| change.entry.revision);
        Ok(changes)
    }

    async fn list_albums(&self) -> StoreResult<Vec<Album>> {
        let mut albums: Vec<Album> = self.with(|c| c.albums.values().cloned().collect());
        albums.sort_by_key(|a| a.title.to_lowercase());
        Ok(albums)
    }

    async fn upsert_album(&self, album: &Album) -> StoreResult<()> {
        self.with(|c| c.albums.insert(album.id.clone(), album.clone()));
        Ok(())
    }

    async fn delete_album(&self, id: &str) -> StoreResult<bool> {
        Ok(self.with(|c| c.albums.remove(id).is_some()))
    }

    async fn list_songs(&self) -> StoreResult<Vec<Song>> {
        let mut songs: Vec<Song> = self.with(|c| c.songs.values().cloned().collect());
        songs.sort_by_key(|s| (s.album.to_lowercase(), s.title.to_lowercase()));
        Ok(songs)
    }

    async fn find_song(&self, album: &str, title: &str) -> StoreResult<Option<Song>> {
        Ok(self.with(|c| {
            c.songs
                .values()
                .find(|s| s.album.eq_ignore_ascii_case(album) && s.title.eq_ignore_ascii_case(title))
                .cloned()
        }))
    }

    async fn upsert_song(&self, song: &Song) -> StoreResult<()> {
        self.with(|c| c.songs.insert(song.id.clone(), song.clone()));
        Ok(())
    }

    async fn delete_song(&self, id: &str) -> StoreResult<bool> {
        Ok(self.with(|c| c.songs.remove(id).is_some()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_entry(title: &str) -> NewTracklistEntry {
        NewTracklistEntry {
            song_id: title.to_string(),
            title: title.to_string(),
            artist: String::new(),
            album: "Album".to_string(),
            duration: 90,
            requested_by: "test".to_string(),
            owner_node_id: "hub".to_string(),
            priority: 1,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_change_feed_reports_latest_state_once() {
        let store = MemoryStore::new();
        let entry = store.enqueue(new_entry("One")).await.unwrap();
        store.set_exists_at_master(&entry.id, true, Some(90)).await.unwrap();

        let changes = store.changes_since(0).await.unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].operation, TracklistOperation::Insert);
        assert!(changes[0].entry.exists_at_master);

        let changes = store.changes_since(1).await.unwrap();
        assert_eq!(changes[0].operation, TracklistOperation::Update);
    }

    #[tokio::test]
    async fn test_missing_entry_updates_return_false() {
        let store = MemoryStore::new();
        assert!(!store.set_status("nope", TrackStatus::Playing, None).await.unwrap());
        assert!(!store.set_exists_at_master("nope", true, Some(3)).await.unwrap());
        assert!(!store.delete("nope").await.unwrap());
        assert_eq!(store.current_revision().await.unwrap(), 0);
    }
}
