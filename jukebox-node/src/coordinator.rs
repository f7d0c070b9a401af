//! Coordination loop
//!
//! One task per node owns the sequencer, the validator and the auto-fill
//! policy. Everything else (change feed, pub/sub socket, control channel, HTTP
//! API) runs in its own task and talks to the loop over channels:
//!
//! - [`NodeEvent`]s arrive on a bounded channel and are drained at most
//!   `socket_drain_per_tick` per tick
//! - [`ApiRequest`]s arrive through a [`CoordinatorHandle`] and carry a
//!   oneshot reply
//! - a [`NodeSnapshot`] is republished on a watch channel after every step
//!
//! All queue mutation happens here, so no locks guard playback state.

use crate::autofill::AutoFill;
use crate::bridge::HttpNotice;
use crate::library::scan::read_tags;
use crate::library::{probe_duration_seconds, ResolvedTrack};
use crate::playback::{AudioOutput, PlaybackSnapshot, Sequencer};
use crate::services::Services;
use crate::validator::{ValidationOutcome, Validator};
use chrono::Utc;
use jukebox_common::config::TimingConfig;
use jukebox_common::events::{
    JukeboxEvent, LinkState, StatusCategory, TracklistEvent, TracklistOperation, TracklistUpdate,
    TransportNotice, ValidationNotice, ValidationRequest,
};
use jukebox_common::protocol::ControlCommand;
use jukebox_common::{
    CodeError, NewTracklistEntry, NodeRole, SongCode, TrackStatus, TracklistEntry,
};
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Priority of keypad, remote and API requests
pub const REQUEST_PRIORITY: i32 = 1;
/// Auto-fill picks sort after explicit requests
pub const AUTOFILL_PRIORITY: i32 = 2;
/// `requestedBy` of auto-fill entries
pub const AUTOFILL_REQUESTER: &str = "autofill";

/// Capacity of the node event channel
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Everything the background tasks hand to the loop
#[derive(Debug, Clone, PartialEq)]
pub enum NodeEvent {
    Tracklist(TracklistEvent),
    /// Master only: validate an entry enqueued by another node
    ValidationRequested(ValidationRequest),
    Control {
        peer: String,
        command: ControlCommand,
    },
    Link {
        link: &'static str,
        state: LinkState,
    },
}

/// What to enqueue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueTarget {
    /// Positional `DD-DD` code
    Code(String),
    /// Song title, optionally narrowed to an album
    Title { title: String, album: Option<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportAction {
    PauseResume,
    Skip,
    Previous,
}

impl TransportAction {
    fn command(self) -> ControlCommand {
        match self {
            TransportAction::PauseResume => ControlCommand::PauseResume,
            TransportAction::Skip => ControlCommand::NextSong,
            TransportAction::Previous => ControlCommand::PreviousSong,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("invalid code: {0}")]
    InvalidCode(#[from] CodeError),

    #[error("no song titled '{0}' in the library")]
    UnknownTitle(String),

    #[error("'{0}' is already queued")]
    Duplicate(String),

    #[error("tracklist store unavailable")]
    StoreUnavailable,

    #[error("only the master can {0}")]
    MasterOnly(&'static str),

    #[error("coordinator is not running")]
    Stopped,
}

/// Successful enqueue
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum EnqueueReceipt {
    /// Written to the store
    Stored { entry: TracklistEntry, playable: bool },
    /// Slave handed a code to the master
    Forwarded { code: String },
}

/// Mutations requested through the HTTP API
#[derive(Debug)]
pub enum ApiRequest {
    Enqueue {
        target: EnqueueTarget,
        requested_by: String,
        reply: oneshot::Sender<Result<EnqueueReceipt, RequestError>>,
    },
    Transport {
        action: TransportAction,
        reply: oneshot::Sender<Result<bool, RequestError>>,
    },
    Clear {
        reply: oneshot::Sender<Result<u64, RequestError>>,
    },
}

/// Read-only node state for the HTTP API
#[derive(Debug, Clone, Serialize)]
pub struct NodeSnapshot {
    pub role: NodeRole,
    pub node_id: String,
    pub playback: PlaybackSnapshot,
    pub links: BTreeMap<String, LinkState>,
}

/// Cloneable front door to a running coordinator
#[derive(Clone)]
pub struct CoordinatorHandle {
    requests: mpsc::Sender<ApiRequest>,
    snapshot: watch::Receiver<NodeSnapshot>,
}

impl CoordinatorHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T, RequestError>>) -> ApiRequest,
    ) -> Result<T, RequestError> {
        let (reply, rx) = oneshot::channel();
        self.requests
            .send(build(reply))
            .await
            .map_err(|_| RequestError::Stopped)?;
        rx.await.map_err(|_| RequestError::Stopped)?
    }

    pub async fn enqueue(
        &self,
        target: EnqueueTarget,
        requested_by: impl Into<String>,
    ) -> Result<EnqueueReceipt, RequestError> {
        let requested_by = requested_by.into();
        self.request(|reply| ApiRequest::Enqueue {
            target,
            requested_by,
            reply,
        })
        .await
    }

    pub async fn transport(&self, action: TransportAction) -> Result<bool, RequestError> {
        self.request(|reply| ApiRequest::Transport { action, reply }).await
    }

    pub async fn clear(&self) -> Result<u64, RequestError> {
        self.request(|reply| ApiRequest::Clear { reply }).await
    }

    pub fn snapshot(&self) -> NodeSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<NodeSnapshot> {
        self.snapshot.clone()
    }
}

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub role: NodeRole,
    pub node_id: String,
    pub timing: TimingConfig,
}

pub struct Coordinator {
    role: NodeRole,
    node_id: String,
    timing: TimingConfig,
    services: Services,
    sequencer: Sequencer,
    validator: Validator,
    autofill: AutoFill,
    links: BTreeMap<String, LinkState>,
    events: mpsc::Receiver<NodeEvent>,
    requests: mpsc::Receiver<ApiRequest>,
    snapshot: watch::Sender<NodeSnapshot>,
}

impl Coordinator {
    pub fn new(
        config: CoordinatorConfig,
        services: Services,
        output: Box<dyn AudioOutput>,
        events: mpsc::Receiver<NodeEvent>,
    ) -> (Self, CoordinatorHandle) {
        let sequencer = Sequencer::new(
            config.role,
            config.node_id.clone(),
            output,
            services.clone(),
            config.timing.safety_grace(),
        );
        let validator = Validator::new(services.library.clone(), services.client.clone());
        let autofill = AutoFill::new(&config.timing);

        let initial = NodeSnapshot {
            role: config.role,
            node_id: config.node_id.clone(),
            playback: sequencer.snapshot(),
            links: BTreeMap::new(),
        };
        let (snapshot, snapshot_rx) = watch::channel(initial);
        let (requests_tx, requests) = mpsc::channel(64);

        let coordinator = Self {
            role: config.role,
            node_id: config.node_id,
            timing: config.timing,
            services,
            sequencer,
            validator,
            autofill,
            links: BTreeMap::new(),
            events,
            requests,
            snapshot,
        };
        let handle = CoordinatorHandle {
            requests: requests_tx,
            snapshot: snapshot_rx,
        };
        (coordinator, handle)
    }

    pub fn sequencer(&self) -> &Sequencer {
        &self.sequencer
    }

    fn publish_snapshot(&self) {
        self.snapshot.send_replace(NodeSnapshot {
            role: self.role,
            node_id: self.node_id.clone(),
            playback: self.sequencer.snapshot(),
            links: self.links.clone(),
        });
    }

    pub fn spawn(self, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        info!(role = %self.role, node_id = %self.node_id, "Coordinator started");
        let is_master = self.role.is_master();

        if is_master {
            self.startup().await;
        }
        self.publish_snapshot();

        let mut tick = interval(self.timing.tick());
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let sweep_every = self.timing.validation_sweep();
        let mut sweep = interval_at(Instant::now() + sweep_every, sweep_every);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut fill = interval(self.autofill.interval());
        fill.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut position = interval(self.timing.position_event_interval());
        position.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                Some(request) = self.requests.recv() => self.handle_request(request).await,
                _ = tick.tick() => self.step().await,
                _ = sweep.tick(), if is_master => self.sweep().await,
                _ = fill.tick(), if is_master => self.maybe_autofill().await,
                _ = position.tick() => self.sequencer.emit_position(),
            }
            self.publish_snapshot();
        }

        info!("Coordinator stopped");
    }

    /// Master startup: re-validate what is already queued, recover interrupted entries
    pub async fn startup(&mut self) {
        let Some(entries) = self.services.client.list_all().await else {
            warn!("Startup re-validation skipped: store unavailable");
            return;
        };

        let mut recovered = 0;
        for entry in &entries {
            if matches!(entry.status, TrackStatus::Playing | TrackStatus::Paused)
                && self
                    .services
                    .client
                    .set_status(&entry.id, TrackStatus::Queued, None)
                    .await
            {
                recovered += 1;
            }
        }
        if recovered > 0 {
            info!("Returned {} interrupted entries to the queue", recovered);
        }

        let Some(queued) = self.services.client.list_by_status(TrackStatus::Queued).await else {
            return;
        };
        info!("Re-validating {} queued entries", queued.len());
        for entry in &queued {
            self.validate_entry(entry).await;
        }
    }

    /// One tick: drain a bounded batch of events, then advance playback
    pub async fn step(&mut self) {
        let mut refresh = false;
        for _ in 0..self.timing.socket_drain_per_tick.max(1) {
            match self.events.try_recv() {
                Ok(event) => refresh |= self.handle_event(event).await,
                Err(_) => break,
            }
        }
        if refresh && self.role.is_master() {
            self.refresh_pickup().await;
        }
        self.sequencer.tick().await;
    }

    /// Returns true when the local queue should be refreshed from the store
    async fn handle_event(&mut self, event: NodeEvent) -> bool {
        match event {
            NodeEvent::Tracklist(event) => self.on_tracklist(event).await,
            NodeEvent::ValidationRequested(request) => {
                self.on_validation_request(request).await;
                true
            }
            NodeEvent::Control { peer, command } => {
                self.on_control(&peer, command).await;
                false
            }
            NodeEvent::Link { link, state } => {
                self.on_link(link, state);
                false
            }
        }
    }

    async fn on_tracklist(&mut self, event: TracklistEvent) -> bool {
        let entry = &event.entry;
        debug!(
            source = ?event.source,
            "Tracklist {} for '{}'", event.operation, entry.title
        );

        if !self.role.is_master() {
            self.services.status.set(
                StatusCategory::Socket,
                format!("{} '{}'", event.operation, entry.title),
            );
            return false;
        }

        let Some(id) = entry.tracklist_id.as_deref() else {
            // Broadcasts without an id: let the store decide
            return matches!(
                event.operation,
                TracklistOperation::Insert | TracklistOperation::Update
            );
        };

        if matches!(entry.status, Some(status) if status != TrackStatus::Queued) {
            self.sequencer.withdraw(id);
            return false;
        }

        match event.operation {
            TracklistOperation::Insert if !entry.exists_at_master => {
                if let Some(stored) = self.services.client.get(id).await {
                    self.validate_entry(&stored).await;
                }
                false
            }
            TracklistOperation::Insert | TracklistOperation::Update => true,
            TracklistOperation::Remove => {
                self.sequencer.withdraw(id);
                false
            }
            _ => false,
        }
    }

    /// Validate, stamp the store and hand playable queued entries to the sequencer
    async fn validate_entry(&mut self, entry: &TracklistEntry) -> ValidationOutcome {
        let outcome = self.validator.validate(entry).await;

        self.services.bus.emit_lossy(JukeboxEvent::ValidationCompleted {
            entry_id: entry.id.clone(),
            playable: outcome.playable,
            length_seconds: outcome.length_seconds,
            timestamp: Utc::now(),
        });

        if outcome.playable && entry.status == TrackStatus::Queued {
            let mut validated = entry.clone();
            validated.exists_at_master = true;
            validated.length = Some(outcome.length_seconds);
            self.sequencer.offer(&validated, outcome.path.clone());
        }
        outcome
    }

    async fn on_validation_request(&mut self, request: ValidationRequest) {
        let Some(entry) = self.services.client.get(&request.tracklist_id).await else {
            warn!(
                tracklist_id = %request.tracklist_id,
                "Validation requested for unknown entry '{}'", request.title
            );
            return;
        };

        let outcome = self.validate_entry(&entry).await;
        self.services.outbox.notify(HttpNotice::Validate(ValidationNotice {
            tracklist_id: entry.id.clone(),
            exists_at_master: outcome.playable,
            length: outcome.playable.then_some(outcome.length_seconds),
        }));
    }

    /// Offer every validated queued entry not yet held locally
    async fn refresh_pickup(&mut self) {
        let Some(queued) = self.services.client.list_by_status(TrackStatus::Queued).await else {
            return;
        };
        for entry in queued.iter().filter(|entry| entry.is_pickable()) {
            if !self.sequencer.contains_entry(&entry.id) {
                self.sequencer.offer(entry, None);
            }
        }
    }

    /// Periodic validation of entries nobody has validated yet
    pub async fn sweep(&mut self) {
        let Some(queued) = self.services.client.list_by_status(TrackStatus::Queued).await else {
            return;
        };
        let pending: Vec<TracklistEntry> = queued
            .into_iter()
            .filter(|entry| !entry.exists_at_master)
            .collect();
        if pending.is_empty() {
            return;
        }

        debug!("Validation sweep over {} entries", pending.len());
        for entry in &pending {
            self.validate_entry(entry).await;
        }
    }

    async fn maybe_autofill(&mut self) {
        let now = Instant::now();
        if !self.autofill.ready(now, self.sequencer.is_idle_and_empty()) {
            return;
        }

        let picked = {
            let sequencer = &self.sequencer;
            self.autofill.pick(
                &self.services.library,
                &mut rand::thread_rng(),
                |title| sequencer.has_title(title),
                |path| probe_duration_seconds(path) > 0,
            )
        };
        let Some(track) = picked else {
            debug!("Auto-fill found nothing to enqueue");
            return;
        };

        match self
            .enqueue_track(track, AUTOFILL_REQUESTER, AUTOFILL_PRIORITY)
            .await
        {
            Ok(EnqueueReceipt::Stored { playable: true, .. }) => self.autofill.record_fill(now),
            Ok(receipt) => warn!("Auto-fill pick did not become playable: {:?}", receipt),
            Err(e) => warn!("Auto-fill enqueue failed: {}", e),
        }
    }

    async fn on_control(&mut self, peer: &str, command: ControlCommand) {
        self.services
            .status
            .set(StatusCategory::Control, format!("{} from {}", command, peer));

        if self.role.is_master() {
            match command {
                ControlCommand::AddSong { code, .. } => {
                    match self.enqueue_code(code, peer).await {
                        Ok(_) => info!(peer, "ADD_SONG {} accepted", code),
                        Err(e) => warn!(peer, "ADD_SONG {} rejected: {}", code, e),
                    }
                }
                ControlCommand::PauseResume => {
                    self.sequencer.toggle_pause().await;
                }
                ControlCommand::NextSong => {
                    self.sequencer.skip().await;
                }
                ControlCommand::PreviousSong => {
                    self.sequencer.restart().await;
                }
                other => debug!(peer, "Ignoring {} from slave", other),
            }
        } else {
            match command {
                ControlCommand::AddSong { code, length } => self.sequencer.mirror_add(code, length),
                ControlCommand::SongLength(length) => self.sequencer.mirror_length(length),
                ControlCommand::PauseResume => {
                    self.sequencer.toggle_pause().await;
                }
                ControlCommand::NextSong => {
                    self.sequencer.skip().await;
                }
                ControlCommand::PreviousSong => {
                    self.sequencer.restart().await;
                }
                other => debug!("Ignoring {} from master", other),
            }
        }
    }

    fn on_link(&mut self, link: &'static str, state: LinkState) {
        let category = if link == crate::bridge::pubsub::LINK_NAME {
            StatusCategory::Socket
        } else {
            StatusCategory::Control
        };
        self.services.status.set(category, format!("{} {}", link, state));
        self.services.bus.emit_lossy(JukeboxEvent::LinkChanged {
            link: link.to_string(),
            state,
            timestamp: Utc::now(),
        });
        self.links.insert(link.to_string(), state);
    }

    async fn handle_request(&mut self, request: ApiRequest) {
        match request {
            ApiRequest::Enqueue {
                target,
                requested_by,
                reply,
            } => {
                let result = self.enqueue(target, &requested_by).await;
                let _ = reply.send(result);
            }
            ApiRequest::Transport { action, reply } => {
                let result = self.transport(action).await;
                let _ = reply.send(Ok(result));
            }
            ApiRequest::Clear { reply } => {
                let result = self.clear().await;
                let _ = reply.send(result);
            }
        }
    }

    async fn transport(&mut self, action: TransportAction) -> bool {
        if !self.role.is_master() {
            self.services.outbox.control(action.command());
            return true;
        }
        match action {
            TransportAction::PauseResume => self.sequencer.toggle_pause().await,
            TransportAction::Skip => self.sequencer.skip().await,
            TransportAction::Previous => self.sequencer.restart().await,
        }
    }

    async fn clear(&mut self) -> Result<u64, RequestError> {
        if !self.role.is_master() {
            return Err(RequestError::MasterOnly("clear the tracklist"));
        }
        let stopped = self.sequencer.clear().await;
        let cleared = self
            .services
            .client
            .clear_all()
            .await
            .ok_or(RequestError::StoreUnavailable)?;
        info!("Cleared {} store entries ({} local)", cleared, stopped);
        Ok(cleared)
    }

    pub async fn enqueue(
        &mut self,
        target: EnqueueTarget,
        requested_by: &str,
    ) -> Result<EnqueueReceipt, RequestError> {
        match (self.role, target) {
            (NodeRole::Master, EnqueueTarget::Code(text)) => {
                let code: SongCode = text.parse()?;
                self.enqueue_code(code, requested_by).await
            }
            (NodeRole::Master, EnqueueTarget::Title { title, album }) => {
                let track = self.resolve_title(&title, album.as_deref())?;
                self.enqueue_track(track, requested_by, REQUEST_PRIORITY).await
            }
            (NodeRole::Slave, EnqueueTarget::Code(text)) => {
                let code: SongCode = text.parse()?;
                self.services.outbox.control(ControlCommand::AddSong { code, length: None });
                info!("Forwarded {} to master", code);
                Ok(EnqueueReceipt::Forwarded {
                    code: code.to_string(),
                })
            }
            (NodeRole::Slave, EnqueueTarget::Title { title, album }) => {
                self.enqueue_remote(&title, album.as_deref(), requested_by).await
            }
        }
    }

    fn resolve_title(&self, title: &str, album: Option<&str>) -> Result<ResolvedTrack, RequestError> {
        let library = &self.services.library;
        let resolved = match album {
            Some(album) => library
                .code_for(album, title)
                .and_then(|code| library.resolve_code(code).ok()),
            None => library.resolve_title(title),
        };
        resolved.ok_or_else(|| RequestError::UnknownTitle(title.to_string()))
    }

    async fn enqueue_code(
        &mut self,
        code: SongCode,
        requested_by: &str,
    ) -> Result<EnqueueReceipt, RequestError> {
        let track = self.services.library.resolve_code(code)?;
        self.enqueue_track(track, requested_by, REQUEST_PRIORITY).await
    }

    /// Master enqueue: dedup, write, announce, validate, hand to the sequencer
    async fn enqueue_track(
        &mut self,
        track: ResolvedTrack,
        requested_by: &str,
        priority: i32,
    ) -> Result<EnqueueReceipt, RequestError> {
        if self.sequencer.has_title(&track.title) {
            return Err(RequestError::Duplicate(track.title));
        }

        let client = &self.services.client;
        let (song_id, artist) = match client.find_song(&track.album, &track.title).await {
            Some(song) => (song.id, song.artist),
            None => (
                format!("{}/{}", track.album, track.title),
                read_tags(&track.path).artist.unwrap_or_default(),
            ),
        };

        let entry = client
            .enqueue(NewTracklistEntry {
                song_id,
                title: track.title.clone(),
                artist,
                album: track.album.clone(),
                duration: probe_duration_seconds(&track.path),
                requested_by: requested_by.to_string(),
                owner_node_id: self.node_id.clone(),
                priority,
                created_at: Utc::now(),
            })
            .await
            .ok_or(RequestError::StoreUnavailable)?;

        info!(
            entry_id = %entry.id,
            "Enqueued {} '{}' for {}", track.code, entry.title, requested_by
        );
        self.announce(&entry);

        let outcome = self.validate_entry(&entry).await;
        let mut stored = entry;
        stored.exists_at_master = outcome.playable;
        stored.length = outcome.playable.then_some(outcome.length_seconds);
        Ok(EnqueueReceipt::Stored {
            entry: stored,
            playable: outcome.playable,
        })
    }

    /// Slave enqueue by title: write the entry and ask the master to validate it
    async fn enqueue_remote(
        &mut self,
        title: &str,
        album: Option<&str>,
        requested_by: &str,
    ) -> Result<EnqueueReceipt, RequestError> {
        let local = self.services.library.resolve_title(title);
        let (title, album) = match (local, album) {
            (Some(track), _) => (track.title, track.album),
            (None, Some(album)) => (title.to_string(), album.to_string()),
            (None, None) => return Err(RequestError::UnknownTitle(title.to_string())),
        };

        let client = &self.services.client;
        let song = client.find_song(&album, &title).await;
        let entry = client
            .enqueue(NewTracklistEntry {
                song_id: song
                    .as_ref()
                    .map(|s| s.id.clone())
                    .unwrap_or_else(|| format!("{}/{}", album, title)),
                title,
                artist: song.map(|s| s.artist).unwrap_or_default(),
                album,
                duration: 0,
                requested_by: requested_by.to_string(),
                owner_node_id: self.node_id.clone(),
                priority: REQUEST_PRIORITY,
                created_at: Utc::now(),
            })
            .await
            .ok_or(RequestError::StoreUnavailable)?;

        self.announce(&entry);
        self.services
            .outbox
            .request_validation(&ValidationRequest::for_entry(&entry));
        info!(entry_id = %entry.id, "Enqueued '{}'; validation requested", entry.title);

        Ok(EnqueueReceipt::Stored {
            entry,
            playable: false,
        })
    }

    fn announce(&self, entry: &TracklistEntry) {
        self.services.bus.emit_lossy(JukeboxEvent::EntryEnqueued {
            entry_id: entry.id.clone(),
            title: entry.title.clone(),
            artist: entry.artist.clone(),
            album: entry.album.clone(),
            timestamp: Utc::now(),
        });
        let outbox = &self.services.outbox;
        outbox.notify(HttpNotice::Tracklist(TransportNotice::from(entry)));
        outbox.publish(&TracklistUpdate::from_entry(TracklistOperation::Insert, entry));
    }
}
