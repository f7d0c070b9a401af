//! Auto-fill
//!
//! When the master sits idle with nothing queued it enqueues a random track:
//! uniform album, then uniform track within it. A pick only counts when the
//! title resolves back to the same file, the file is playable and the title
//! is not already queued. Checks start after a startup grace and respect a
//! cooldown between fills.

use crate::library::{LibraryIndex, ResolvedTrack};
use jukebox_common::config::TimingConfig;
use jukebox_common::SongCode;
use rand::Rng;
use std::path::Path;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct AutoFill {
    startup_grace: Duration,
    interval: Duration,
    cooldown: Duration,
    attempts: u32,
    started_at: Instant,
    last_fill: Option<Instant>,
}

impl AutoFill {
    pub fn new(timing: &TimingConfig) -> Self {
        Self::with_settings(
            timing.autofill_startup_grace(),
            timing.autofill_interval(),
            timing.autofill_cooldown(),
            timing.autofill_attempts,
        )
    }

    pub fn with_settings(startup_grace: Duration, interval: Duration, cooldown: Duration, attempts: u32) -> Self {
        Self {
            startup_grace,
            interval,
            cooldown,
            attempts: attempts.max(1),
            started_at: Instant::now(),
            last_fill: None,
        }
    }

    /// How often the coordinator should ask
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Grace elapsed, cooldown elapsed and the node is idle with an empty queue
    pub fn ready(&self, now: Instant, idle_and_empty: bool) -> bool {
        if !idle_and_empty || now.duration_since(self.started_at) < self.startup_grace {
            return false;
        }
        match self.last_fill {
            Some(last) => now.duration_since(last) >= self.cooldown,
            None => true,
        }
    }

    pub fn record_fill(&mut self, now: Instant) {
        self.last_fill = Some(now);
    }

    /// Pick a random playable track; `None` after the attempt budget is spent
    ///
    /// An unplayable file costs an attempt like a duplicate does.
    pub fn pick<R, F, P>(
        &self,
        library: &LibraryIndex,
        rng: &mut R,
        is_duplicate: F,
        is_playable: P,
    ) -> Option<ResolvedTrack>
    where
        R: Rng + ?Sized,
        F: Fn(&str) -> bool,
        P: Fn(&Path) -> bool,
    {
        let albums = library.albums();
        if albums.is_empty() {
            debug!("Auto-fill: library is empty");
            return None;
        }

        for attempt in 1..=self.attempts {
            let album_index = rng.gen_range(0..albums.len());
            let album = &albums[album_index];
            let tracks = library.tracks(&album.path);
            if tracks.is_empty() {
                debug!(attempt, "Auto-fill: '{}' has no tracks", album.title);
                continue;
            }

            let track_index = rng.gen_range(0..tracks.len());
            let track = &tracks[track_index];
            if is_duplicate(&track.title) {
                debug!(attempt, "Auto-fill: '{}' already queued", track.title);
                continue;
            }

            // Ambiguous names could resolve to a sibling file
            match library.resolve(&album.title, &track.title) {
                Some(path) if path == track.path => {
                    if !is_playable(&path) {
                        debug!(attempt, "Auto-fill: {:?} is not playable", path);
                        continue;
                    }
                    return Some(ResolvedTrack {
                        album: album.title.clone(),
                        title: track.title.clone(),
                        path,
                        code: SongCode::new(album_index + 1, track_index + 1),
                    });
                }
                _ => debug!(attempt, "Auto-fill: '{}' does not resolve back to itself", track.title),
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tokio::time::advance;

    fn library_with(tracks: &[(&str, &str)]) -> (tempfile::TempDir, LibraryIndex) {
        let temp = tempfile::tempdir().unwrap();
        for (album, title) in tracks {
            let dir = temp.path().join(album);
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join(format!("{}.mp3", title)), b"audio").unwrap();
        }
        let library = LibraryIndex::new(temp.path());
        (temp, library)
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_respects_grace_and_cooldown() {
        let mut fill = AutoFill::with_settings(
            Duration::from_secs(5),
            Duration::from_secs(2),
            Duration::from_secs(5),
            3,
        );

        assert!(!fill.ready(Instant::now(), true), "startup grace");
        advance(Duration::from_secs(5)).await;
        assert!(fill.ready(Instant::now(), true));
        assert!(!fill.ready(Instant::now(), false), "busy node");

        fill.record_fill(Instant::now());
        advance(Duration::from_secs(4)).await;
        assert!(!fill.ready(Instant::now(), true), "cooldown");
        advance(Duration::from_secs(1)).await;
        assert!(fill.ready(Instant::now(), true));
    }

    #[test]
    fn test_pick_single_track_library() {
        let (_temp, library) = library_with(&[("Closer", "Isolation")]);
        let fill = AutoFill::with_settings(Duration::ZERO, Duration::ZERO, Duration::ZERO, 3);
        let mut rng = StdRng::seed_from_u64(7);

        let track = fill.pick(&library, &mut rng, |_| false, |_| true).unwrap();
        assert_eq!(track.album, "Closer");
        assert_eq!(track.title, "Isolation");
        assert_eq!(track.code, SongCode::new(1, 1));
    }

    #[test]
    fn test_pick_gives_up_on_duplicates() {
        let (_temp, library) = library_with(&[("Closer", "Isolation")]);
        let fill = AutoFill::with_settings(Duration::ZERO, Duration::ZERO, Duration::ZERO, 3);
        let mut rng = StdRng::seed_from_u64(7);

        assert!(fill
            .pick(&library, &mut rng, |title| title.eq_ignore_ascii_case("isolation"), |_| true)
            .is_none());
    }

    #[test]
    fn test_pick_on_empty_library() {
        let temp = tempfile::tempdir().unwrap();
        let library = LibraryIndex::new(temp.path());
        let fill = AutoFill::with_settings(Duration::ZERO, Duration::ZERO, Duration::ZERO, 3);
        assert!(fill
            .pick(&library, &mut StdRng::seed_from_u64(1), |_| false, |_| true)
            .is_none());
    }

    #[test]
    fn test_pick_skips_unplayable_files() {
        let (_temp, library) = library_with(&[("Broken", "Noise"), ("Closer", "Isolation")]);
        let fill = AutoFill::with_settings(Duration::ZERO, Duration::ZERO, Duration::ZERO, 50);
        let mut rng = StdRng::seed_from_u64(3);
        let is_playable = |path: &Path| path.file_stem().and_then(|s| s.to_str()) != Some("Noise");

        for _ in 0..10 {
            let track = fill.pick(&library, &mut rng, |_| false, is_playable).unwrap();
            assert_eq!(track.title, "Isolation");
        }
    }

    #[test]
    fn test_pick_gives_up_when_nothing_is_playable() {
        let (_temp, library) = library_with(&[("Broken", "Noise")]);
        let fill = AutoFill::with_settings(Duration::ZERO, Duration::ZERO, Duration::ZERO, 3);
        let mut rng = StdRng::seed_from_u64(3);

        let tried = std::cell::Cell::new(0);
        let picked = fill.pick(&library, &mut rng, |_| false, |_| {
            tried.set(tried.get() + 1);
            false
        });
        assert!(picked.is_none());
        assert_eq!(tried.get(), 3);
    }
}
