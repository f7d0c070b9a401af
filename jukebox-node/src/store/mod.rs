//! Document store access
//!
//! The store holds three collections: `albums`, `songs` and `tracklist`.
//! [`TracklistStore`] is the narrow contract the node needs; [`SqliteStore`]
//! is the persistent implementation and [`MemoryStore`] an ephemeral one.
//! Callers go through [`TracklistClient`], which turns every fault into a
//! logged boolean/`Option` result.

pub mod client;
pub mod memory;
pub mod sqlite;

pub use client::TracklistClient;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use jukebox_common::events::TracklistOperation;
use jukebox_common::{Album, NewTracklistEntry, Song, TrackStatus, TracklistEntry};
use thiserror::Error;

/// Store-level faults; all of them are transient from the node's point of view
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A persisted value could not be decoded
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// Store deliberately unavailable (closed, or failing on purpose in tests)
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// One entry of the tracklist change feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracklistChange {
    /// `Insert` when the entry was created at this revision, else `Update`
    pub operation: TracklistOperation,
    pub entry: TracklistEntry,
}

/// Narrow contract over the external document store
///
/// Tracklist listings are sorted ascending by (priority, createdAt).
/// Writes are last-write-wins; `revision` is informational.
#[async_trait]
pub trait TracklistStore: Send + Sync {
    async fn enqueue(&self, entry: NewTracklistEntry) -> StoreResult<TracklistEntry>;

    async fn list_by_status(&self, status: TrackStatus) -> StoreResult<Vec<TracklistEntry>>;

    /// Every tracklist entry regardless of status
    async fn list_all(&self) -> StoreResult<Vec<TracklistEntry>>;

    async fn get(&self, id: &str) -> StoreResult<Option<TracklistEntry>>;

    /// `Playing` and `Played` also stamp `playedAt`. Returns false when no entry matched.
    async fn set_status(
        &self,
        id: &str,
        status: TrackStatus,
        assigned_node_id: Option<&str>,
    ) -> StoreResult<bool>;

    /// `length` is persisted only when `exists` is true and the length is positive
    async fn set_exists_at_master(
        &self,
        id: &str,
        exists: bool,
        length: Option<u32>,
    ) -> StoreResult<bool>;

    async fn delete(&self, id: &str) -> StoreResult<bool>;

    /// Delete every tracklist entry, returning how many were removed
    async fn clear_all(&self) -> StoreResult<u64>;

    /// Latest revision stamped on any tracklist write
    async fn current_revision(&self) -> StoreResult<i64>;

    /// Inserts and updates with a revision greater than `revision`, oldest first
    async fn changes_since(&self, revision: i64) -> StoreResult<Vec<TracklistChange>>;

    async fn list_albums(&self) -> StoreResult<Vec<Album>>;

    async fn upsert_album(&self, album: &Album) -> StoreResult<()>;

    async fn delete_album(&self, id: &str) -> StoreResult<bool>;

    async fn list_songs(&self) -> StoreResult<Vec<Song>>;

    /// Case-insensitive lookup on the (album, title) join key
    async fn find_song(&self, album: &str, title: &str) -> StoreResult<Option<Song>>;

    async fn upsert_song(&self, song: &Song) -> StoreResult<()>;

    async fn delete_song(&self, id: &str) -> StoreResult<bool>;
}

/// FIFO ordering shared by every implementation
pub(crate) fn sort_entries(entries: &mut [TracklistEntry]) {
    entries.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then(a.created_at.cmp(&b.created_at))
    });
}
