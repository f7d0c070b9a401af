//! Audio output abstraction
//!
//! The sequencer owns exactly one [`AudioOutput`]. Decoding and device I/O
//! live behind this trait; [`ClockOutput`] is the built-in implementation,
//! which checks that the resource can be opened and then reports position
//! from a wall clock.

use super::clock::PositionClock;
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub trait AudioOutput: Send {
    /// Open a resource for playback; fails when it is missing or empty
    fn load(&mut self, path: &Path, duration: Duration) -> Result<()>;

    fn play(&mut self);

    fn pause(&mut self);

    fn resume(&mut self);

    /// Release the current resource
    fn stop(&mut self);

    fn position(&self) -> Duration;

    /// True once the resource reported its natural end
    fn is_finished(&self) -> bool;
}

/// Output that validates the resource and tracks time without producing sound
#[derive(Debug, Default)]
pub struct ClockOutput {
    loaded: Option<PathBuf>,
    duration: Duration,
    clock: PositionClock,
}

impl ClockOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn loaded(&self) -> Option<&Path> {
        self.loaded.as_deref()
    }
}

impl AudioOutput for ClockOutput {
    fn load(&mut self, path: &Path, duration: Duration) -> Result<()> {
        let metadata = std::fs::metadata(path)
            .map_err(|e| Error::AudioOutput(format!("cannot open {:?}: {}", path, e)))?;
        if !metadata.is_file() || metadata.len() == 0 {
            return Err(Error::AudioOutput(format!("{:?} is empty", path)));
        }

        debug!("Loaded {:?} ({}s)", path, duration.as_secs());
        self.loaded = Some(path.to_path_buf());
        self.duration = duration;
        self.clock.reset();
        Ok(())
    }

    fn play(&mut self) {
        if self.loaded.is_some() {
            self.clock.start();
        }
    }

    fn pause(&mut self) {
        self.clock.pause();
    }

    fn resume(&mut self) {
        if self.loaded.is_some() {
            self.clock.resume();
        }
    }

    fn stop(&mut self) {
        self.loaded = None;
        self.duration = Duration::ZERO;
        self.clock.reset();
    }

    fn position(&self) -> Duration {
        self.clock.elapsed().min(self.duration)
    }

    fn is_finished(&self) -> bool {
        self.loaded.is_some() && self.clock.elapsed() >= self.duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    #[test]
    fn test_load_rejects_missing_and_empty_files() {
        let temp = tempfile::tempdir().unwrap();
        let mut output = ClockOutput::new();

        assert!(output
            .load(&temp.path().join("missing.mp3"), Duration::from_secs(1))
            .is_err());

        let empty = temp.path().join("empty.mp3");
        std::fs::write(&empty, b"").unwrap();
        assert!(output.load(&empty, Duration::from_secs(1)).is_err());
        assert!(output.loaded().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reports_finish_after_duration() {
        let temp = tempfile::tempdir().unwrap();
        let file = temp.path().join("track.mp3");
        std::fs::write(&file, b"data").unwrap();

        let mut output = ClockOutput::new();
        output.load(&file, Duration::from_secs(4)).unwrap();
        output.play();

        advance(Duration::from_secs(3)).await;
        assert!(!output.is_finished());
        assert_eq!(output.position(), Duration::from_secs(3));

        advance(Duration::from_secs(2)).await;
        assert!(output.is_finished());
        assert_eq!(output.position(), Duration::from_secs(4));

        output.stop();
        assert!(!output.is_finished());
    }
}
