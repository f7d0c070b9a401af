//! Shared fixtures for jukebox-node integration tests
//!
//! - [`TestLibrary`]: album folders with WAV files of known length
//! - [`TestNode`]: services over an in-memory store and a subscribed event bus
//! - [`FaultyStore`]: a store that can be switched into failing every call

#![allow(dead_code)]

pub mod audio_generator;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use jukebox_common::events::{EventBus, JukeboxEvent};
use jukebox_common::{Album, NewTracklistEntry, Song, TrackStatus, TracklistEntry};
use jukebox_node::bridge::Outbox;
use jukebox_node::library::LibraryIndex;
use jukebox_node::playback::{AudioOutput, ClockOutput};
use jukebox_node::services::Services;
use jukebox_node::status::StatusBoard;
use jukebox_node::store::{
    MemoryStore, StoreError, StoreResult, TracklistChange, TracklistClient, TracklistStore,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use std::time::Duration;
use tokio::sync::broadcast;

pub use audio_generator::generate_silent_wav;

pub struct TestLibrary {
    temp: TempDir,
}

impl TestLibrary {
    pub fn new() -> Self {
        Self {
            temp: tempfile::tempdir().unwrap(),
        }
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    /// Write `<root>/<album>/<title>.wav` lasting `seconds`
    pub fn add_track(&self, album: &str, title: &str, seconds: u32) -> PathBuf {
        let dir = self.root().join(album);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(format!("{}.wav", title));
        generate_silent_wav(&path, seconds).unwrap();
        path
    }

    /// Write `<root>/<album>/<title>.mp3` holding bytes no prober accepts
    pub fn add_broken_track(&self, album: &str, title: &str) -> PathBuf {
        let dir = self.root().join(album);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(format!("{}.mp3", title));
        std::fs::write(&path, b"definitely not an mpeg stream").unwrap();
        path
    }

    pub fn index(&self) -> Arc<LibraryIndex> {
        Arc::new(LibraryIndex::new(self.root()))
    }
}

pub struct TestNode {
    pub store: Arc<dyn TracklistStore>,
    pub client: TracklistClient,
    pub bus: Arc<EventBus>,
    pub status: StatusBoard,
    pub services: Services,
}

impl TestNode {
    pub fn new(library: Arc<LibraryIndex>) -> Self {
        Self::with_store(library, Arc::new(MemoryStore::new()), Outbox::new())
    }

    pub fn with_outbox(library: Arc<LibraryIndex>, outbox: Outbox) -> Self {
        Self::with_store(library, Arc::new(MemoryStore::new()), outbox)
    }

    pub fn with_store(
        library: Arc<LibraryIndex>,
        store: Arc<dyn TracklistStore>,
        outbox: Outbox,
    ) -> Self {
        let bus = Arc::new(EventBus::new(1024));
        let status = StatusBoard::with_bus(bus.clone());
        let client = TracklistClient::new(store.clone(), status.clone());
        let services = Services {
            client: client.clone(),
            library,
            bus: bus.clone(),
            status: status.clone(),
            outbox,
        };
        Self {
            store,
            client,
            bus,
            status,
            services,
        }
    }
}

impl TestNode {
    /// Insert an entry and stamp it validated, as the master's validator would
    pub async fn stored(&self, album: &str, title: &str, priority: i32, length: u32) -> TracklistEntry {
        let entry = self.client.enqueue(new_entry(album, title, priority)).await.unwrap();
        assert!(self.client.set_exists_at_master(&entry.id, true, Some(length)).await);
        self.client.get(&entry.id).await.unwrap()
    }
}

/// Entry fields for a direct store insert
pub fn new_entry(album: &str, title: &str, priority: i32) -> NewTracklistEntry {
    NewTracklistEntry {
        song_id: format!("{}/{}", album, title),
        title: title.to_string(),
        artist: "Test Artist".to_string(),
        album: album.to_string(),
        duration: 0,
        requested_by: "test".to_string(),
        owner_node_id: "test-node".to_string(),
        priority,
        created_at: Utc::now(),
    }
}

/// Entry as the validator would leave it, without touching a store
pub fn validated_entry(id: &str, album: &str, title: &str, length: u32) -> TracklistEntry {
    validated_entry_at(id, album, title, length, 1, 0)
}

pub fn validated_entry_at(
    id: &str,
    album: &str,
    title: &str,
    length: u32,
    priority: i32,
    created_offset_secs: i64,
) -> TracklistEntry {
    TracklistEntry {
        id: id.to_string(),
        song_id: format!("{}/{}", album, title),
        title: title.to_string(),
        artist: "Test Artist".to_string(),
        album: album.to_string(),
        duration: length,
        status: TrackStatus::Queued,
        priority,
        created_at: Utc::now() + ChronoDuration::seconds(created_offset_secs),
        played_at: None,
        requested_by: "test".to_string(),
        owner_node_id: "test-node".to_string(),
        assigned_node_id: None,
        exists_at_master: true,
        length: Some(length),
        revision: 0,
    }
}

/// Everything currently buffered on a bus receiver
pub fn drain(rx: &mut broadcast::Receiver<JukeboxEvent>) -> Vec<JukeboxEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn event_types(events: &[JukeboxEvent]) -> Vec<&'static str> {
    events.iter().map(|e| e.event_type()).collect()
}

/// In-memory store that fails every call while `failing` is set
///
/// Also counts `delete` calls that reach the inner store.
#[derive(Default)]
pub struct FaultyStore {
    inner: MemoryStore,
    failing: AtomicBool,
    deletes: AtomicUsize,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn delete_count(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    fn check(&self) -> StoreResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("injected fault".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl TracklistStore for FaultyStore {
    async fn enqueue(&self, entry: NewTracklistEntry) -> StoreResult<TracklistEntry> {
        self.check()?;
        self.inner.enqueue(entry).await
    }

    async fn list_by_status(&self, status: TrackStatus) -> StoreResult<Vec<TracklistEntry>> {
        self.check()?;
        self.inner.list_by_status(status).await
    }

    async fn list_all(&self) -> StoreResult<Vec<TracklistEntry>> {
        self.check()?;
        self.inner.list_all().await
    }

    async fn get(&self, id: &str) -> StoreResult<Option<TracklistEntry>> {
        self.check()?;
        self.inner.get(id).await
    }

    async fn set_status(
        &self,
        id: &str,
        status: TrackStatus,
        assigned_node_id: Option<&str>,
    ) -> StoreResult<bool> {
        self.check()?;
        self.inner.set_status(id, status, assigned_node_id).await
    }

    async fn set_exists_at_master(
        &self,
        id: &str,
        exists: bool,
        length: Option<u32>,
    ) -> StoreResult<bool> {
        self.check()?;
        self.inner.set_exists_at_master(id, exists, length).await
    }

    async fn delete(&self, id: &str) -> StoreResult<bool> {
        self.check()?;
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(id).await
    }

    async fn clear_all(&self) -> StoreResult<u64> {
        self.check()?;
        self.inner.clear_all().await
    }

    async fn current_revision(&self) -> StoreResult<i64> {
        self.check()?;
        self.inner.current_revision().await
    }

    async fn changes_since(&self, revision: i64) -> StoreResult<Vec<TracklistChange>> {
        self.check()?;
        self.inner.changes_since(revision).await
    }

    async fn list_albums(&self) -> StoreResult<Vec<Album>> {
        self.check()?;
        self.inner.list_albums().await
    }

    async fn upsert_album(&self, album: &Album) -> StoreResult<()> {
        self.check()?;
        self.inner.upsert_album(album).await
    }

    async fn delete_album(&self, id: &str) -> StoreResult<bool> {
        self.check()?;
        self.inner.delete_album(id).await
    }

    async fn list_songs(&self) -> StoreResult<Vec<Song>> {
        self.check()?;
        self.inner.list_songs().await
    }

    async fn find_song(&self, album: &str, title: &str) -> StoreResult<Option<Song>> {
        self.check()?;
        self.inner.find_song(album, title).await
    }

    async fn upsert_song(&self, song: &Song) -> StoreResult<()> {
        self.check()?;
        self.inner.upsert_song(song).await
    }

    async fn delete_song(&self, id: &str) -> StoreResult<bool> {
        self.check()?;
        self.inner.delete_song(id).await
    }
}

/// [`ClockOutput`] that counts how often a resource was opened
pub struct CountingOutput {
    inner: ClockOutput,
    loads: Arc<AtomicUsize>,
}

impl CountingOutput {
    pub fn new() -> (Self, Arc<AtomicUsize>) {
        let loads = Arc::new(AtomicUsize::new(0));
        let output = Self {
            inner: ClockOutput::new(),
            loads: loads.clone(),
        };
        (output, loads)
    }
}

impl AudioOutput for CountingOutput {
    fn load(&mut self, path: &Path, duration: Duration) -> jukebox_node::Result<()> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.inner.load(path, duration)
    }

    fn play(&mut self) {
        self.inner.play()
    }

    fn pause(&mut self) {
        self.inner.pause()
    }

    fn resume(&mut self) {
        self.inner.resume()
    }

    fn stop(&mut self) {
        self.inner.stop()
    }

    fn position(&self) -> Duration {
        self.inner.position()
    }

    fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }
}

/// Opens anything and never advances, like a wedged audio device
#[derive(Default)]
pub struct StuckOutput;

impl AudioOutput for StuckOutput {
    fn load(&mut self, _path: &Path, _duration: Duration) -> jukebox_node::Result<()> {
        Ok(())
    }

    fn play(&mut self) {}

    fn pause(&mut self) {}

    fn resume(&mut self) {}

    fn stop(&mut self) {}

    fn position(&self) -> Duration {
        Duration::ZERO
    }

    fn is_finished(&self) -> bool {
        false
    }
}
