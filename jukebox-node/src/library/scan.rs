//! Library scan reconciliation
//!
//! Walks the library root and diffs what is on disk against the store's
//! `albums` and `songs` collections:
//! - new folders/files are inserted
//! - changed artists are updated (the stored `familyFriendly` flag is kept)
//! - records with no folder/file left are deleted
//!
//! Titles come from tags when present, else from folder and file names.

use super::index::is_audio_file;
use crate::store::{StoreResult, TracklistStore};
use jukebox_common::{Album, Song};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;
use walkdir::WalkDir;

/// Tag fields read from one audio file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackTags {
    pub title: Option<String>,
    pub artist: Option<String>,
}

/// Read title and artist tags; missing or unreadable tags yield `None` fields
pub fn read_tags(path: &Path) -> TrackTags {
    use lofty::prelude::*;

    let Ok(tagged) = lofty::read_from_path(path) else {
        return TrackTags::default();
    };
    let Some(tag) = tagged.primary_tag().or_else(|| tagged.first_tag()) else {
        return TrackTags::default();
    };

    let clean = |value: Option<std::borrow::Cow<'_, str>>| {
        value
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    TrackTags {
        title: clean(tag.title()),
        artist: clean(tag.artist()),
    }
}

/// One album as found on disk
#[derive(Debug, Clone)]
struct ScannedAlbum {
    title: String,
    artist: String,
    songs: Vec<ScannedSong>,
}

#[derive(Debug, Clone)]
struct ScannedSong {
    title: String,
    artist: String,
}

/// Counts of catalog changes applied by one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub albums_added: usize,
    pub albums_updated: usize,
    pub albums_removed: usize,
    pub songs_added: usize,
    pub songs_updated: usize,
    pub songs_removed: usize,
}

impl ScanSummary {
    pub fn is_unchanged(&self) -> bool {
        *self == Self::default()
    }
}

pub struct LibraryScanner {
    root: PathBuf,
}

impl LibraryScanner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Album folders directly under the root with their audio files
    fn walk(&self) -> Vec<ScannedAlbum> {
        let mut by_folder: HashMap<PathBuf, ScannedAlbum> = HashMap::new();

        for entry in WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(2)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            let hidden = entry
                .file_name()
                .to_str()
                .map(|name| name.starts_with('.'))
                .unwrap_or(true);
            if hidden {
                continue;
            }

            if entry.depth() == 1 && entry.file_type().is_dir() {
                let Some(title) = entry.file_name().to_str() else {
                    continue;
                };
                by_folder.entry(path.to_path_buf()).or_insert_with(|| ScannedAlbum {
                    title: title.to_string(),
                    artist: String::new(),
                    songs: Vec::new(),
                });
            } else if entry.depth() == 2 && is_audio_file(path) {
                let Some(folder) = path.parent() else {
                    continue;
                };
                let Some(album) = by_folder.get_mut(folder) else {
                    continue;
                };
                let stem = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or_default()
                    .to_string();
                let tags = read_tags(path);
                let artist = tags.artist.unwrap_or_default();
                if album.artist.is_empty() && !artist.is_empty() {
                    album.artist = artist.clone();
                }
                album.songs.push(ScannedSong {
                    title: tags.title.unwrap_or(stem),
                    artist,
                });
            }
        }

        let mut albums: Vec<ScannedAlbum> = by_folder.into_values().collect();
        albums.sort_by_key(|a| a.title.to_lowercase());
        for album in &mut albums {
            if album.artist.is_empty() {
                // "Artist - Album" folder naming
                if let Some((artist, _)) = album.title.split_once(" - ") {
                    album.artist = artist.trim().to_string();
                }
            }
            let album_artist = album.artist.clone();
            for song in &mut album.songs {
                if song.artist.is_empty() {
                    song.artist = album_artist.clone();
                }
            }
        }
        albums
    }

    /// Bring the `albums` and `songs` collections in line with the filesystem
    pub async fn reconcile(&self, store: &dyn TracklistStore) -> StoreResult<ScanSummary> {
        let scanned = self.walk();
        let mut summary = ScanSummary::default();

        let mut stored_albums: HashMap<String, Album> = store
            .list_albums()
            .await?
            .into_iter()
            .map(|a| (a.title.to_lowercase(), a))
            .collect();
        let mut stored_songs: HashMap<(String, String), Song> = store
            .list_songs()
            .await?
            .into_iter()
            .map(|s| ((s.album.to_lowercase(), s.title.to_lowercase()), s))
            .collect();

        for album in &scanned {
            match stored_albums.remove(&album.title.to_lowercase()) {
                Some(existing) if existing.artist != album.artist => {
                    store
                        .upsert_album(&Album {
                            artist: album.artist.clone(),
                            ..existing
                        })
                        .await?;
                    summary.albums_updated += 1;
                }
                Some(_) => {}
                None => {
                    store
                        .upsert_album(&Album {
                            id: Uuid::new_v4().to_string(),
                            title: album.title.clone(),
                            artist: album.artist.clone(),
                        })
                        .await?;
                    summary.albums_added += 1;
                }
            }

            for song in &album.songs {
                let key = (album.title.to_lowercase(), song.title.to_lowercase());
                match stored_songs.remove(&key) {
                    Some(existing) if existing.artist != song.artist => {
                        store
                            .upsert_song(&Song {
                                artist: song.artist.clone(),
                                ..existing
                            })
                            .await?;
                        summary.songs_updated += 1;
                    }
                    Some(_) => {}
                    None => {
                        store
                            .upsert_song(&Song {
                                id: Uuid::new_v4().to_string(),
                                title: song.title.clone(),
                                artist: song.artist.clone(),
                                album: album.title.clone(),
                                family_friendly: true,
                            })
                            .await?;
                        summary.songs_added += 1;
                    }
                }
            }
        }

        // Whatever is left in the maps has vanished from disk
        for song in stored_songs.into_values() {
            debug!("Removing vanished song '{}' ({})", song.title, song.album);
            if store.delete_song(&song.id).await? {
                summary.songs_removed += 1;
            }
        }
        for album in stored_albums.into_values() {
            debug!("Removing vanished album '{}'", album.title);
            if store.delete_album(&album.id).await? {
                summary.albums_removed += 1;
            }
        }

        info!(
            "Library scan of {:?}: albums +{} ~{} -{}, songs +{} ~{} -{}",
            self.root,
            summary.albums_added,
            summary.albums_updated,
            summary.albums_removed,
            summary.songs_added,
            summary.songs_updated,
            summary.songs_removed
        );
        Ok(summary)
    }
}
