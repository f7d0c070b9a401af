//! Local playback sequencer
//!
//! Owns the local queue, the audio output and the position clock. Lives
//! inside the coordinator loop, so every method runs on one task and no
//! locking is needed.
//!
//! Master state machine:
//!
//! ```text
//! Idle ──queue non-empty──> Loading ──opened──> Playing <──> Paused
//!  ^                           │                   │
//!  └──────load failed──────────┘                   │
//!  └──────natural end / skip / safety timeout──────┘
//! ```
//!
//! The master drives the store transitions (playing/paused, delete on
//! finish) and fans each one out over the control channel, the HTTP push
//! endpoints and the pub/sub socket.
//!
//! A slave never touches the store or the output. It runs the position clock
//! against the `length` pushed by the master and finishes on its own when the
//! clock reaches it.

use super::clock::PositionClock;
use super::output::AudioOutput;
use super::queue::{EnqueueOutcome, LocalQueue, LocalQueueItem};
use crate::bridge::HttpNotice;
use crate::error::{Error, Result};
use crate::services::Services;
use chrono::Utc;
use jukebox_common::events::{
    JukeboxEvent, StatusCategory, TracklistOperation, TracklistUpdate, TransportNotice,
};
use jukebox_common::protocol::ControlCommand;
use jukebox_common::{NodeRole, SongCode, TrackStatus, TracklistEntry};
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Entry ids remembered after finishing, so late change events cannot replay them
const FINISHED_MEMORY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Idle,
    Loading,
    Playing,
    Paused,
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlaybackState::Idle => "idle",
            PlaybackState::Loading => "loading",
            PlaybackState::Playing => "playing",
            PlaybackState::Paused => "paused",
        };
        f.write_str(name)
    }
}

/// Why the current item left the sequencer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Completed,
    Skipped,
    /// Safety timeout: expected length + grace elapsed without an end report
    TimedOut,
    Cleared,
}

/// Read-only view published to the HTTP API
#[derive(Debug, Clone, Serialize)]
pub struct PlaybackSnapshot {
    pub state: PlaybackState,
    pub current: Option<LocalQueueItem>,
    pub position_seconds: u32,
    pub queued: Vec<LocalQueueItem>,
}

pub struct Sequencer {
    role: NodeRole,
    node_id: String,
    state: PlaybackState,
    queue: LocalQueue,
    output: Box<dyn AudioOutput>,
    /// Safety timer on the master, mirrored position on a slave
    clock: PositionClock,
    safety_grace: Duration,
    services: Services,
    finished: VecDeque<String>,
}

fn seconds(length: u32) -> Duration {
    Duration::from_secs(u64::from(length))
}

fn whole_seconds(duration: Duration) -> u32 {
    u32::try_from(duration.as_secs()).unwrap_or(u32::MAX)
}

impl Sequencer {
    pub fn new(
        role: NodeRole,
        node_id: impl Into<String>,
        output: Box<dyn AudioOutput>,
        services: Services,
        safety_grace: Duration,
    ) -> Self {
        Self {
            role,
            node_id: node_id.into(),
            state: PlaybackState::Idle,
            queue: LocalQueue::new(),
            output,
            clock: PositionClock::new(),
            safety_grace,
            services,
            finished: VecDeque::with_capacity(FINISHED_MEMORY),
        }
    }

    pub fn role(&self) -> NodeRole {
        self.role
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn queue(&self) -> &LocalQueue {
        &self.queue
    }

    pub fn current(&self) -> Option<&LocalQueueItem> {
        self.queue.current()
    }

    /// Nothing playing and nothing waiting
    pub fn is_idle_and_empty(&self) -> bool {
        self.state == PlaybackState::Idle && self.queue.len() == 0
    }

    pub fn has_title(&self, title: &str) -> bool {
        self.queue.contains_title(title)
    }

    pub fn contains_entry(&self, entry_id: &str) -> bool {
        self.queue.contains_entry(entry_id)
    }

    /// Position of the current item (zero when idle)
    pub fn position(&self) -> Duration {
        let Some(item) = self.queue.current() else {
            return Duration::ZERO;
        };
        match self.role {
            NodeRole::Master => self.output.position(),
            NodeRole::Slave => {
                let elapsed = self.clock.elapsed();
                if item.length_seconds > 0 {
                    elapsed.min(seconds(item.length_seconds))
                } else {
                    elapsed
                }
            }
        }
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        PlaybackSnapshot {
            state: self.state,
            current: self.queue.current().cloned(),
            position_seconds: whole_seconds(self.position()),
            queued: self.queue.queued().to_vec(),
        }
    }

    /// True when the entry finished here recently
    pub fn was_finished(&self, entry_id: &str) -> bool {
        self.finished.iter().any(|id| id == entry_id)
    }

    /// Returns false when the id was already remembered
    fn remember_finished(&mut self, entry_id: &str) -> bool {
        if self.was_finished(entry_id) {
            return false;
        }
        if self.finished.len() == FINISHED_MEMORY {
            self.finished.pop_front();
        }
        self.finished.push_back(entry_id.to_string());
        true
    }

    /// Materialize a validated entry into the local queue
    pub fn offer(&mut self, entry: &TracklistEntry, path: Option<PathBuf>) -> EnqueueOutcome {
        if self.was_finished(&entry.id) {
            return EnqueueOutcome::DuplicateEntry;
        }
        let outcome = self.queue.enqueue(LocalQueueItem::from_entry(entry, path));
        match outcome {
            EnqueueOutcome::Added => {
                debug!(entry_id = %entry.id, "Queued '{}' locally", entry.title);
                self.queue_changed();
            }
            EnqueueOutcome::DuplicateTitle => {
                debug!(entry_id = %entry.id, "'{}' already queued; skipped", entry.title);
            }
            EnqueueOutcome::DuplicateEntry => {}
        }
        outcome
    }

    /// Drop a waiting item whose store entry left the queued state elsewhere
    pub fn withdraw(&mut self, entry_id: &str) -> bool {
        let removed = self.queue.remove(entry_id);
        if removed {
            debug!(entry_id, "Withdrawn from local queue");
            self.queue_changed();
        }
        removed
    }

    fn queue_changed(&self) {
        self.services.bus.emit_lossy(JukeboxEvent::QueueChanged {
            queued: self.queue.queued().len(),
            timestamp: Utc::now(),
        });
        self.services
            .status
            .set(StatusCategory::Queue, self.queue_line());
    }

    fn queue_line(&self) -> String {
        let waiting = self.queue.queued().len();
        match self.queue.current() {
            Some(item) => format!("{} '{}' ({} queued)", self.state, item.title, waiting),
            None => format!("idle ({} queued)", waiting),
        }
    }

    fn notice(item: &LocalQueueItem) -> TransportNotice {
        TransportNotice {
            tracklist_id: item.entry_id.clone(),
            song_title: item.title.clone(),
            artist: item.artist.clone(),
            album: item.album.clone(),
        }
    }

    fn update(operation: TracklistOperation, item: &LocalQueueItem, status: TrackStatus) -> TracklistUpdate {
        TracklistUpdate {
            operation_type: operation,
            song_id: None,
            song_title: item.title.clone(),
            artist: item.artist.clone(),
            album: item.album.clone(),
            duration: item.length_seconds,
            status: Some(status),
            exists_at_master: true,
            length: Some(item.length_seconds),
            timestamp: Utc::now(),
        }
    }

    /// Advance the state machine by one step
    pub async fn tick(&mut self) {
        match self.role {
            NodeRole::Master => match self.state {
                PlaybackState::Idle => self.start_next().await,
                PlaybackState::Playing => self.check_progress().await,
                PlaybackState::Loading | PlaybackState::Paused => {}
            },
            NodeRole::Slave => self.mirror_tick(),
        }
    }

    fn load(&mut self, item: &LocalQueueItem) -> Result<()> {
        let path = match &item.path {
            Some(path) => path.clone(),
            None => self
                .services
                .library
                .resolve(&item.album, &item.title)
                .ok_or_else(|| Error::NotFound(format!("'{}' / '{}'", item.album, item.title)))?,
        };
        self.output.load(&path, seconds(item.length_seconds))
    }

    /// Idle → Loading → Playing, dropping items that fail to load
    async fn start_next(&mut self) {
        while self.state == PlaybackState::Idle {
            let Some(item) = self.queue.advance().cloned() else {
                return;
            };
            self.state = PlaybackState::Loading;

            match self.load(&item) {
                Ok(()) => self.begin(&item).await,
                Err(e) => {
                    warn!(entry_id = %item.entry_id, "Dropping '{}': {}", item.title, e);
                    self.queue.take_current();
                    self.state = PlaybackState::Idle;
                    self.services
                        .client
                        .set_exists_at_master(&item.entry_id, false, None)
                        .await;
                    self.services
                        .status
                        .set(StatusCategory::Queue, format!("dropped '{}': {}", item.title, e));
                    self.queue_changed();
                }
            }
        }
    }

    async fn begin(&mut self, item: &LocalQueueItem) {
        self.output.play();
        self.clock.start();
        self.state = PlaybackState::Playing;

        self.services
            .client
            .set_status(&item.entry_id, TrackStatus::Playing, Some(&self.node_id))
            .await;

        let code = self.services.library.code_for(&item.album, &item.title);
        info!(
            entry_id = %item.entry_id,
            "Playing '{}' by {} ({}s)", item.title, item.artist, item.length_seconds
        );

        self.services.bus.emit_lossy(JukeboxEvent::TrackStarted {
            entry_id: item.entry_id.clone(),
            title: item.title.clone(),
            artist: item.artist.clone(),
            album: item.album.clone(),
            length_seconds: item.length_seconds,
            code: code.map(|c| c.to_string()),
            timestamp: Utc::now(),
        });

        let outbox = &self.services.outbox;
        match code {
            Some(code) => outbox.control(ControlCommand::AddSong {
                code,
                length: Some(item.length_seconds),
            }),
            None => {
                // A bare length would extend the slave's previous mirror
                outbox.control(ControlCommand::NextSong);
                outbox.control(ControlCommand::SongLength(item.length_seconds));
            }
        }
        outbox.publish(&Self::update(TracklistOperation::Play, item, TrackStatus::Playing));
        self.queue_changed();
    }

    async fn check_progress(&mut self) {
        let Some(item) = self.queue.current() else {
            self.state = PlaybackState::Idle;
            return;
        };
        let length = seconds(item.length_seconds);

        if self.output.is_finished() || (!length.is_zero() && self.output.position() >= length) {
            self.finish(FinishReason::Completed).await;
        } else if self.clock.elapsed() >= length + self.safety_grace {
            warn!(
                entry_id = %item.entry_id,
                "'{}' ran past {}s + {}s grace; forcing it out",
                item.title,
                item.length_seconds,
                self.safety_grace.as_secs()
            );
            self.finish(FinishReason::TimedOut).await;
        } else {
            return;
        }

        self.start_next().await;
    }

    /// Leave Playing/Paused; the store entry is deleted at most once
    pub async fn finish(&mut self, reason: FinishReason) -> Option<LocalQueueItem> {
        if !self.role.is_master() {
            return self.mirror_finish(reason);
        }

        let position = self.position();
        let item = self.queue.take_current()?;
        self.output.stop();
        self.clock.reset();
        self.state = PlaybackState::Idle;

        if self.remember_finished(&item.entry_id) {
            self.services.client.delete(&item.entry_id).await;
        }

        info!(entry_id = %item.entry_id, "Finished '{}' ({:?})", item.title, reason);
        self.services.bus.emit_lossy(JukeboxEvent::TrackFinished {
            entry_id: item.entry_id.clone(),
            title: item.title.clone(),
            completed: reason == FinishReason::Completed,
            position_seconds: whole_seconds(position),
            timestamp: Utc::now(),
        });
        self.services
            .outbox
            .publish(&Self::update(TracklistOperation::Remove, &item, TrackStatus::Played));
        self.queue_changed();
        Some(item)
    }

    /// Skip the current item and start the next one
    pub async fn skip(&mut self) -> bool {
        if !self.role.is_master() {
            return self.mirror_finish(FinishReason::Skipped).is_some();
        }
        let Some(item) = self.queue.current().cloned() else {
            return false;
        };

        let outbox = &self.services.outbox;
        outbox.notify(HttpNotice::Skip(Self::notice(&item)));
        outbox.publish(&Self::update(TracklistOperation::Skip, &item, TrackStatus::Skipped));
        outbox.control(ControlCommand::NextSong);

        self.finish(FinishReason::Skipped).await;
        self.start_next().await;
        true
    }

    pub async fn toggle_pause(&mut self) -> bool {
        match self.state {
            PlaybackState::Playing => self.pause().await,
            PlaybackState::Paused => self.resume().await,
            PlaybackState::Idle | PlaybackState::Loading => false,
        }
    }

    /// Playing → Paused; the position freezes
    pub async fn pause(&mut self) -> bool {
        if self.state != PlaybackState::Playing {
            return false;
        }
        let Some(item) = self.queue.current().cloned() else {
            return false;
        };

        if self.role.is_master() {
            self.output.pause();
        }
        self.clock.pause();
        self.state = PlaybackState::Paused;

        let position_seconds = whole_seconds(self.position());
        self.services.bus.emit_lossy(JukeboxEvent::PlaybackPaused {
            entry_id: item.entry_id.clone(),
            position_seconds,
            timestamp: Utc::now(),
        });

        if self.role.is_master() {
            info!(entry_id = %item.entry_id, "Paused '{}' at {}s", item.title, position_seconds);
            self.services
                .client
                .set_status(&item.entry_id, TrackStatus::Paused, Some(&self.node_id))
                .await;
            let outbox = &self.services.outbox;
            outbox.notify(HttpNotice::Pause(Self::notice(&item)));
            outbox.publish(&Self::update(TracklistOperation::Pause, &item, TrackStatus::Paused));
            outbox.control(ControlCommand::PauseResume);
        }
        self.queue_changed();
        true
    }

    /// Paused → Playing; the position continues from where it froze
    pub async fn resume(&mut self) -> bool {
        if self.state != PlaybackState::Paused {
            return false;
        }
        let Some(item) = self.queue.current().cloned() else {
            return false;
        };

        if self.role.is_master() {
            self.output.resume();
        }
        self.clock.resume();
        self.state = PlaybackState::Playing;

        let position_seconds = whole_seconds(self.position());
        self.services.bus.emit_lossy(JukeboxEvent::PlaybackResumed {
            entry_id: item.entry_id.clone(),
            position_seconds,
            timestamp: Utc::now(),
        });

        if self.role.is_master() {
            info!(entry_id = %item.entry_id, "Resumed '{}' at {}s", item.title, position_seconds);
            self.services
                .client
                .set_status(&item.entry_id, TrackStatus::Playing, Some(&self.node_id))
                .await;
            let outbox = &self.services.outbox;
            outbox.notify(HttpNotice::Resume(Self::notice(&item)));
            outbox.publish(&Self::update(TracklistOperation::Resume, &item, TrackStatus::Playing));
            outbox.control(ControlCommand::PauseResume);
        }
        self.queue_changed();
        true
    }

    /// Restart the current item from position 0
    pub async fn restart(&mut self) -> bool {
        let Some(item) = self.queue.current().cloned() else {
            return false;
        };
        let was_paused = self.state == PlaybackState::Paused;

        if self.role.is_master() {
            if let Err(e) = self.load(&item) {
                warn!(entry_id = %item.entry_id, "Cannot restart '{}': {}", item.title, e);
                self.queue.take_current();
                self.state = PlaybackState::Idle;
                self.services
                    .client
                    .set_exists_at_master(&item.entry_id, false, None)
                    .await;
                self.start_next().await;
                return false;
            }
            self.output.play();
        }

        self.clock.start();
        self.state = PlaybackState::Playing;
        info!(entry_id = %item.entry_id, "Restarted '{}'", item.title);
        self.services.bus.emit_lossy(JukeboxEvent::TrackRestarted {
            entry_id: item.entry_id.clone(),
            title: item.title.clone(),
            timestamp: Utc::now(),
        });

        if self.role.is_master() {
            if was_paused {
                self.services
                    .client
                    .set_status(&item.entry_id, TrackStatus::Playing, Some(&self.node_id))
                    .await;
            }
            self.services.outbox.control(ControlCommand::PreviousSong);
        }
        true
    }

    /// Drop every waiting item and stop the current one
    pub async fn clear(&mut self) -> usize {
        let dropped = self.queue.clear();
        let stopped = self.finish(FinishReason::Cleared).await.is_some();
        self.queue_changed();
        dropped + usize::from(stopped)
    }

    /// Periodic position report while something is loaded
    pub fn emit_position(&self) {
        let Some(item) = self.queue.current() else {
            return;
        };
        if !matches!(self.state, PlaybackState::Playing | PlaybackState::Paused) {
            return;
        }
        self.services.bus.emit_lossy(JukeboxEvent::PlaybackPosition {
            entry_id: item.entry_id.clone(),
            position_seconds: whole_seconds(self.position()),
            length_seconds: item.length_seconds,
            playing: self.state == PlaybackState::Playing,
            timestamp: Utc::now(),
        });
    }

    // ---- slave mirror ----

    fn mirror_item(entry_id: String, title: String, album: String, length_seconds: u32) -> LocalQueueItem {
        LocalQueueItem {
            entry_id,
            title,
            artist: String::new(),
            album,
            path: None,
            length_seconds,
            priority: 0,
            created_at: Utc::now(),
        }
    }

    /// Master started a track: mirror it from position 0
    pub fn mirror_add(&mut self, code: SongCode, length: Option<u32>) {
        let (title, album) = match self.services.library.resolve_code(code) {
            Ok(track) => (track.title, track.album),
            Err(_) => (code.to_string(), String::new()),
        };
        let item = Self::mirror_item(format!("mirror:{}", code), title, album, length.unwrap_or(0));
        self.mirror_start(item);
    }

    /// Master pushed a length; applies to the mirrored track or starts one
    pub fn mirror_length(&mut self, length: u32) {
        match self.queue.current_mut() {
            Some(item) => {
                debug!("Mirrored length for '{}' set to {}s", item.title, length);
                item.length_seconds = length;
            }
            None => {
                let item = Self::mirror_item("mirror".to_string(), "unknown".to_string(), String::new(), length);
                self.mirror_start(item);
            }
        }
    }

    fn mirror_start(&mut self, item: LocalQueueItem) {
        if self.queue.current().is_some() {
            self.mirror_finish(FinishReason::Skipped);
        }

        info!("Mirroring '{}' ({}s)", item.title, item.length_seconds);
        self.services.bus.emit_lossy(JukeboxEvent::TrackStarted {
            entry_id: item.entry_id.clone(),
            title: item.title.clone(),
            artist: item.artist.clone(),
            album: item.album.clone(),
            length_seconds: item.length_seconds,
            code: None,
            timestamp: Utc::now(),
        });
        self.queue.set_current(item);
        self.clock.start();
        self.state = PlaybackState::Playing;
        self.queue_changed();
    }

    fn mirror_tick(&mut self) {
        if self.state != PlaybackState::Playing {
            return;
        }
        let Some(item) = self.queue.current() else {
            self.state = PlaybackState::Idle;
            return;
        };
        if item.length_seconds > 0 && self.clock.elapsed() >= seconds(item.length_seconds) {
            self.mirror_finish(FinishReason::Completed);
        }
    }

    fn mirror_finish(&mut self, reason: FinishReason) -> Option<LocalQueueItem> {
        let position = self.position();
        let item = self.queue.take_current()?;
        self.clock.reset();
        self.state = PlaybackState::Idle;

        debug!("Mirrored '{}' finished ({:?})", item.title, reason);
        self.services.bus.emit_lossy(JukeboxEvent::TrackFinished {
            entry_id: item.entry_id.clone(),
            title: item.title.clone(),
            completed: reason == FinishReason::Completed,
            position_seconds: whole_seconds(position),
            timestamp: Utc::now(),
        });
        self.queue_changed();
        Some(item)
    }
}
