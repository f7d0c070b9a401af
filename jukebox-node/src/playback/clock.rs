//! Pause-aware position clock
//!
//! Accumulates elapsed time while running. Pausing freezes the value and
//! resuming continues from it; only `reset` goes back to zero. Built on
//! `tokio::time::Instant` so tests can drive it with a paused runtime clock.

use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Default)]
pub struct PositionClock {
    /// Time banked before the current run
    accumulated: Duration,
    /// Start of the current run; `None` while stopped or paused
    running_since: Option<Instant>,
}

impl PositionClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero the clock and start counting
    pub fn start(&mut self) {
        self.accumulated = Duration::ZERO;
        self.running_since = Some(Instant::now());
    }

    /// Freeze at the current value (no-op when not running)
    pub fn pause(&mut self) {
        if let Some(since) = self.running_since.take() {
            self.accumulated += since.elapsed();
        }
    }

    /// Continue from the frozen value (no-op when already running)
    pub fn resume(&mut self) {
        if self.running_since.is_none() {
            self.running_since = Some(Instant::now());
        }
    }

    /// Stop and zero
    pub fn reset(&mut self) {
        self.accumulated = Duration::ZERO;
        self.running_since = None;
    }

    pub fn is_running(&self) -> bool {
        self.running_since.is_some()
    }

    pub fn elapsed(&self) -> Duration {
        match self.running_since {
            Some(since) => self.accumulated + since.elapsed(),
            None => self.accumulated,
        }
    }
}
