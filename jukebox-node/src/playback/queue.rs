//! Local playback queue
//!
//! Node-local materialization of validated tracklist entries. Owned by the
//! sequencer; everything else asks the sequencer to mutate it.
//!
//! - `current`: the item handed to the output (Loading/Playing/Paused)
//! - `queued`: waiting items, kept sorted by (priority, createdAt); equal keys
//!   keep arrival order
//!
//! Duplicates are refused by entry id and by case-insensitive title, checked
//! against the queued items and the current one.

use chrono::{DateTime, Utc};
use jukebox_common::TracklistEntry;
use serde::Serialize;
use std::path::PathBuf;

/// One playable item
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocalQueueItem {
    pub entry_id: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    /// Known from validation; re-resolved at load time when absent
    #[serde(skip)]
    pub path: Option<PathBuf>,
    pub length_seconds: u32,
    pub priority: i32,
    pub created_at: DateTime<Utc>,
}

impl LocalQueueItem {
    pub fn from_entry(entry: &TracklistEntry, path: Option<PathBuf>) -> Self {
        Self {
            entry_id: entry.id.clone(),
            title: entry.title.clone(),
            artist: entry.artist.clone(),
            album: entry.album.clone(),
            path,
            length_seconds: entry.effective_length(),
            priority: entry.priority,
            created_at: entry.created_at,
        }
    }

    fn sort_key(&self) -> (i32, DateTime<Utc>) {
        (self.priority, self.created_at)
    }
}

/// Result of offering an item to the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Added,
    /// Same entry id already queued or current
    DuplicateEntry,
    /// Same title (case-insensitive) already queued or current
    DuplicateTitle,
}

#[derive(Debug, Default)]
pub struct LocalQueue {
    current: Option<LocalQueueItem>,
    queued: Vec<LocalQueueItem>,
}

impl LocalQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn all(&self) -> impl Iterator<Item = &LocalQueueItem> {
        self.current.iter().chain(self.queued.iter())
    }

    pub fn contains_entry(&self, entry_id: &str) -> bool {
        self.all().any(|item| item.entry_id == entry_id)
    }

    pub fn contains_title(&self, title: &str) -> bool {
        self.all().any(|item| item.title.eq_ignore_ascii_case(title))
    }

    /// Sorted insert after any items with an equal key
    pub fn enqueue(&mut self, item: LocalQueueItem) -> EnqueueOutcome {
        if self.contains_entry(&item.entry_id) {
            return EnqueueOutcome::DuplicateEntry;
        }
        if self.contains_title(&item.title) {
            return EnqueueOutcome::DuplicateTitle;
        }

        let key = item.sort_key();
        let index = self.queued.partition_point(|queued| queued.sort_key() <= key);
        self.queued.insert(index, item);
        EnqueueOutcome::Added
    }

    /// Move the head of the queue into `current`, discarding any previous current
    pub fn advance(&mut self) -> Option<&LocalQueueItem> {
        self.current = if self.queued.is_empty() {
            None
        } else {
            Some(self.queued.remove(0))
        };
        self.current.as_ref()
    }

    pub fn current(&self) -> Option<&LocalQueueItem> {
        self.current.as_ref()
    }

    pub fn current_mut(&mut self) -> Option<&mut LocalQueueItem> {
        self.current.as_mut()
    }

    /// Install an item as current directly (mirrored playback on a slave)
    pub fn set_current(&mut self, item: LocalQueueItem) {
        self.current = Some(item);
    }

    /// Remove and return the current item; a second call returns `None`
    pub fn take_current(&mut self) -> Option<LocalQueueItem> {
        self.current.take()
    }

    pub fn queued(&self) -> &[LocalQueueItem] {
        &self.queued
    }

    /// Remove a waiting item; the current item is only left via the sequencer
    pub fn remove(&mut self, entry_id: &str) -> bool {
        match self.queued.iter().position(|item| item.entry_id == entry_id) {
            Some(index) => {
                self.queued.remove(index);
                true
            }
            None => false,
        }
    }

    /// Drop every waiting item, returning how many were dropped
    pub fn clear(&mut self) -> usize {
        let count = self.queued.len();
        self.queued.clear();
        count
    }

    /// No waiting items (the current one does not count)
    pub fn is_empty(&self) -> bool {
        self.queued.is_empty()
    }

    /// Current + waiting
    pub fn len(&self) -> usize {
        self.queued.len() + usize::from(self.current.is_some())
    }
}
