//! Validator
//!
//! Decides whether this node can play a tracklist entry and writes the answer
//! back as `existsAtMaster` (+ `length`). Validation is a pure function of the
//! filesystem, so repeating it on unchanged files gives the same outcome.

use crate::library::{probe_duration_seconds, LibraryIndex};
use crate::store::TracklistClient;
use jukebox_common::TracklistEntry;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of one validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationOutcome {
    pub playable: bool,
    pub length_seconds: u32,
    /// Resolved file when playable
    pub path: Option<PathBuf>,
}

impl ValidationOutcome {
    fn unplayable() -> Self {
        Self {
            playable: false,
            length_seconds: 0,
            path: None,
        }
    }
}

pub struct Validator {
    library: Arc<LibraryIndex>,
    client: TracklistClient,
}

impl Validator {
    pub fn new(library: Arc<LibraryIndex>, client: TracklistClient) -> Self {
        Self { library, client }
    }

    /// Resolve and probe without touching the store
    pub fn check(&self, album: &str, title: &str) -> ValidationOutcome {
        let Some(album_path) = self.library.resolve_album_folder(album) else {
            debug!("Album folder for '{}' not found", album);
            return ValidationOutcome::unplayable();
        };
        let Some(path) = self.library.resolve_song_file(&album_path, title) else {
            debug!("Song file for '{}' not found in {:?}", title, album_path);
            return ValidationOutcome::unplayable();
        };

        let length_seconds = probe_duration_seconds(&path);
        if length_seconds == 0 {
            debug!("{:?} has no playable duration", path);
            return ValidationOutcome::unplayable();
        }

        ValidationOutcome {
            playable: true,
            length_seconds,
            path: Some(path),
        }
    }

    /// Check an entry and persist `existsAtMaster` / `length`
    ///
    /// A failed write is logged by the client; the entry stays as it was and
    /// the next sweep retries.
    pub async fn validate(&self, entry: &TracklistEntry) -> ValidationOutcome {
        let outcome = self.check(&entry.album, &entry.title);

        let persisted = if outcome.playable {
            self.client
                .set_exists_at_master(&entry.id, true, Some(outcome.length_seconds))
                .await
        } else {
            self.client.set_exists_at_master(&entry.id, false, None).await
        };

        if outcome.playable {
            info!(
                entry_id = %entry.id,
                "Validated '{}' ({}s)", entry.title, outcome.length_seconds
            );
        } else {
            warn!(entry_id = %entry.id, "'{}' / '{}' is not playable here", entry.album, entry.title);
        }
        if !persisted {
            debug!(entry_id = %entry.id, "Validation result not persisted");
        }

        outcome
    }
}
