//! Library index
//!
//! Read-only view of the on-disk library: one folder per album directly under
//! the root, audio files inside. Folders and files are listed in name order,
//! which is what positional codes index into.
//!
//! Album and song names are joined by string, never by id. All matching goes
//! through [`name_matches`]: exact case-insensitive first, then containment in
//! either direction, so "Joy Division - Closer" still resolves "Closer".
//!
//! Every lookup reads the filesystem; nothing is cached, so creating a folder
//! is visible to the next validation.

use jukebox_common::code::{CodeError, SongCode};
use std::path::{Path, PathBuf};
use tracing::debug;

/// File extensions treated as playable audio
pub const AUDIO_EXTENSIONS: &[&str] = &[
    "mp3", "flac", "wav", "ogg", "oga", "opus", "m4a", "aac", "aiff", "aif", "wma",
];

/// An album folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlbumFolder {
    /// Folder name
    pub title: String,
    pub path: PathBuf,
}

/// An audio file inside an album folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackFile {
    /// File name without extension
    pub title: String,
    pub path: PathBuf,
}

/// A concrete, playable track location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTrack {
    pub album: String,
    pub title: String,
    pub path: PathBuf,
    pub code: SongCode,
}

/// Tiered name comparison: exact (case-insensitive) beats containment
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum MatchTier {
    Exact,
    Contains,
}

fn name_matches(candidate: &str, wanted: &str) -> Option<MatchTier> {
    let candidate = candidate.trim().to_lowercase();
    let wanted = wanted.trim().to_lowercase();
    if candidate.is_empty() || wanted.is_empty() {
        return None;
    }
    if candidate == wanted {
        Some(MatchTier::Exact)
    } else if candidate.contains(&wanted) || wanted.contains(&candidate) {
        Some(MatchTier::Contains)
    } else {
        None
    }
}

/// Best match by tier; ties go to the first in listing order
fn best_match<T>(items: Vec<T>, name: impl Fn(&T) -> &str, wanted: &str) -> Option<T> {
    let mut best: Option<(MatchTier, T)> = None;
    for item in items {
        let Some(tier) = name_matches(name(&item), wanted) else {
            continue;
        };
        match &best {
            Some((current, _)) if *current <= tier => {}
            _ => best = Some((tier, item)),
        }
        if matches!(best, Some((MatchTier::Exact, _))) {
            break;
        }
    }
    best.map(|(_, item)| item)
}

pub fn is_audio_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| AUDIO_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            .unwrap_or(false)
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

pub struct LibraryIndex {
    root: PathBuf,
}

impl LibraryIndex {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Album folders in name order (case-insensitive)
    pub fn albums(&self) -> Vec<AlbumFolder> {
        let Ok(entries) = std::fs::read_dir(&self.root) else {
            debug!("Library root {:?} is not readable", self.root);
            return Vec::new();
        };

        let mut albums: Vec<AlbumFolder> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| {
                let title = entry.file_name().to_str()?.to_string();
                (!is_hidden(&title)).then(|| AlbumFolder {
                    title,
                    path: entry.path(),
                })
            })
            .collect();
        albums.sort_by_key(|a| (a.title.to_lowercase(), a.title.clone()));
        albums
    }

    /// Audio files of one album folder in name order (case-insensitive)
    pub fn tracks(&self, album_path: &Path) -> Vec<TrackFile> {
        let Ok(entries) = std::fs::read_dir(album_path) else {
            return Vec::new();
        };

        let mut tracks: Vec<(String, TrackFile)> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| is_audio_file(path))
            .filter_map(|path| {
                let file_name = path.file_name()?.to_str()?.to_string();
                let title = path.file_stem()?.to_str()?.to_string();
                (!is_hidden(&file_name)).then(|| (file_name.to_lowercase(), TrackFile { title, path }))
            })
            .collect();
        tracks.sort_by(|a, b| a.0.cmp(&b.0));
        tracks.into_iter().map(|(_, track)| track).collect()
    }

    pub fn resolve_album_folder(&self, album_title: &str) -> Option<PathBuf> {
        best_match(self.albums(), |a| a.title.as_str(), album_title).map(|a| a.path)
    }

    pub fn resolve_song_file(&self, album_path: &Path, song_title: &str) -> Option<PathBuf> {
        best_match(self.tracks(album_path), |t| t.title.as_str(), song_title).map(|t| t.path)
    }

    /// Album folder, then song file
    pub fn resolve(&self, album_title: &str, song_title: &str) -> Option<PathBuf> {
        let album = self.resolve_album_folder(album_title)?;
        self.resolve_song_file(&album, song_title)
    }

    /// Resolve a positional code against the current listing; never clamps
    pub fn resolve_code(&self, code: SongCode) -> Result<ResolvedTrack, CodeError> {
        let (album_index, track_index) = code.zero_based()?;

        let album = self
            .albums()
            .into_iter()
            .nth(album_index)
            .ok_or_else(|| code.out_of_range())?;
        let track = self
            .tracks(&album.path)
            .into_iter()
            .nth(track_index)
            .ok_or_else(|| code.out_of_range())?;

        Ok(ResolvedTrack {
            album: album.title,
            title: track.title,
            path: track.path,
            code,
        })
    }

    /// Reverse lookup: the code a slave would type for this track
    pub fn code_for(&self, album_title: &str, song_title: &str) -> Option<SongCode> {
        let albums = self.albums();
        let album = best_match(albums.clone(), |a| a.title.as_str(), album_title)?;
        let album_index = albums.iter().position(|a| a.path == album.path)?;

        let tracks = self.tracks(&album.path);
        let track = best_match(tracks.clone(), |t| t.title.as_str(), song_title)?;
        let track_index = tracks.iter().position(|t| t.path == track.path)?;

        Some(SongCode::new(album_index + 1, track_index + 1))
    }

    /// Find a song by title across every album
    ///
    /// An exact title match anywhere wins over a containment match.
    pub fn resolve_title(&self, song_title: &str) -> Option<ResolvedTrack> {
        let mut best: Option<(MatchTier, ResolvedTrack)> = None;

        for (album_index, album) in self.albums().into_iter().enumerate() {
            for (track_index, track) in self.tracks(&album.path).into_iter().enumerate() {
                let Some(tier) = name_matches(&track.title, song_title) else {
                    continue;
                };
                let better = match &best {
                    Some((current, _)) => tier < *current,
                    None => true,
                };
                if better {
                    best = Some((
                        tier,
                        ResolvedTrack {
                            album: album.title.clone(),
                            title: track.title,
                            path: track.path,
                            code: SongCode::new(album_index + 1, track_index + 1),
                        },
                    ));
                }
                if matches!(best, Some((MatchTier::Exact, _))) {
                    return best.map(|(_, track)| track);
                }
            }
        }

        best.map(|(_, track)| track)
    }
}

/// Playable duration in whole seconds (rounded), or 0 when the file cannot be probed
pub fn probe_duration_seconds(path: &Path) -> u32 {
    use lofty::prelude::*;

    match lofty::read_from_path(path) {
        Ok(tagged) => {
            let duration = tagged.properties().duration();
            duration.as_secs_f64().round() as u32
        }
        Err(e) => {
            debug!("Cannot probe {:?}: {}", path, e);
            0
        }
    }
}
