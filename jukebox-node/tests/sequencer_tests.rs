//! Local playback sequencer tests
//!
//! Run on a paused tokio clock against the in-memory store:
//! - pickup order and title dedup of the local queue
//! - a single playing entry, deleted exactly once when it ends
//! - the safety timeout and load failures
//! - pause/resume/restart position semantics
//! - the slave's silent mirror clock

mod helpers;

use helpers::{
    drain, event_types, validated_entry_at, CountingOutput, FaultyStore, StuckOutput, TestLibrary,
    TestNode,
};
use jukebox_common::events::JukeboxEvent;
use jukebox_common::protocol::ControlCommand;
use jukebox_common::{NodeRole, SongCode, TrackStatus};
use jukebox_node::bridge::Outbox;
use jukebox_node::control::ControlLink;
use jukebox_node::playback::{ClockOutput, EnqueueOutcome, PlaybackState, Sequencer};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::advance;

const GRACE: Duration = Duration::from_secs(10);

fn master(node: &TestNode) -> Sequencer {
    Sequencer::new(
        NodeRole::Master,
        "master-1",
        Box::new(ClockOutput::new()),
        node.services.clone(),
        GRACE,
    )
}

fn finished_ids(events: &[JukeboxEvent]) -> Vec<(String, bool)> {
    events
        .iter()
        .filter_map(|e| match e {
            JukeboxEvent::TrackFinished {
                entry_id,
                completed,
                ..
            } => Some((entry_id.clone(), *completed)),
            _ => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_pickup_order_is_priority_then_created_at() {
    let library = TestLibrary::new();
    let node = TestNode::new(library.index());
    let mut sequencer = master(&node);

    // priorities [2, 1, 1] with createdAt [t0, t2, t1]
    let a = validated_entry_at("a", "Album", "Alpha", 5, 2, 0);
    let b = validated_entry_at("b", "Album", "Bravo", 5, 1, 2);
    let c = validated_entry_at("c", "Album", "Charlie", 5, 1, 1);
    for entry in [&a, &b, &c] {
        assert_eq!(sequencer.offer(entry, None), EnqueueOutcome::Added);
    }

    let order: Vec<&str> = sequencer
        .queue()
        .queued()
        .iter()
        .map(|item| item.entry_id.as_str())
        .collect();
    assert_eq!(order, vec!["c", "b", "a"]);
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_title_is_not_queued_twice() {
    let library = TestLibrary::new();
    let node = TestNode::new(library.index());
    let mut sequencer = master(&node);

    let first = validated_entry_at("one", "Closer", "Isolation", 5, 1, 0);
    let again = validated_entry_at("two", "Closer", "ISOLATION", 5, 1, 1);

    assert_eq!(sequencer.offer(&first, None), EnqueueOutcome::Added);
    assert_eq!(sequencer.offer(&first, None), EnqueueOutcome::DuplicateEntry);
    assert_eq!(sequencer.offer(&again, None), EnqueueOutcome::DuplicateTitle);
    assert_eq!(sequencer.queue().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_single_playing_entry_and_natural_end() {
    let library = TestLibrary::new();
    library.add_track("Closer", "Isolation", 2);
    library.add_track("Closer", "Heart and Soul", 3);
    let node = TestNode::new(library.index());
    let mut rx = node.bus.subscribe();
    let mut sequencer = master(&node);

    let first = node.stored("Closer", "Isolation", 1, 2).await;
    let second = node.stored("Closer", "Heart and Soul", 1, 3).await;
    sequencer.offer(&first, None);
    sequencer.offer(&second, None);

    sequencer.tick().await;
    assert_eq!(sequencer.state(), PlaybackState::Playing);
    assert_eq!(sequencer.current().unwrap().entry_id, first.id);

    let playing = node.client.list_by_status(TrackStatus::Playing).await.unwrap();
    assert_eq!(playing.len(), 1);
    assert_eq!(playing[0].id, first.id);
    assert_eq!(playing[0].assigned_node_id.as_deref(), Some("master-1"));
    assert!(playing[0].played_at.is_some());

    advance(Duration::from_secs(1)).await;
    sequencer.tick().await;
    assert_eq!(sequencer.current().unwrap().entry_id, first.id);

    advance(Duration::from_secs(1)).await;
    sequencer.tick().await;
    assert_eq!(sequencer.current().unwrap().entry_id, second.id);
    assert!(node.client.get(&first.id).await.is_none(), "finished entry deleted");

    let playing = node.client.list_by_status(TrackStatus::Playing).await.unwrap();
    assert_eq!(playing.len(), 1);
    assert_eq!(playing[0].id, second.id);

    let events = drain(&mut rx);
    assert_eq!(finished_ids(&events), vec![(first.id.clone(), true)]);
    let started = event_types(&events)
        .into_iter()
        .filter(|t| *t == "TrackStarted")
        .count();
    assert_eq!(started, 2);
}

#[tokio::test(start_paused = true)]
async fn test_finished_entry_is_never_replayed_or_deleted_twice() {
    let library = TestLibrary::new();
    library.add_track("Closer", "Isolation", 2);
    let node = TestNode::new(library.index());
    let mut rx = node.bus.subscribe();
    let mut sequencer = master(&node);

    let entry = node.stored("Closer", "Isolation", 1, 2).await;
    sequencer.offer(&entry, None);
    sequencer.tick().await;
    advance(Duration::from_secs(2)).await;
    sequencer.tick().await;
    assert_eq!(sequencer.state(), PlaybackState::Idle);

    // A late duplicate delivery of the same entry
    assert_eq!(sequencer.offer(&entry, None), EnqueueOutcome::DuplicateEntry);
    assert!(sequencer.finish(jukebox_node::playback::FinishReason::Completed).await.is_none());
    sequencer.tick().await;

    assert_eq!(finished_ids(&drain(&mut rx)).len(), 1);
    assert!(sequencer.was_finished(&entry.id));
}

#[tokio::test(start_paused = true)]
async fn test_end_racing_skip_deletes_once() {
    let library = TestLibrary::new();
    library.add_track("Closer", "Isolation", 2);
    library.add_track("Closer", "Decades", 2);
    let store = Arc::new(FaultyStore::new());
    let node = TestNode::with_store(library.index(), store.clone(), Outbox::new());
    let mut sequencer = master(&node);

    let first = node.stored("Closer", "Isolation", 1, 2).await;
    let second = node.stored("Closer", "Decades", 2, 2).await;
    sequencer.offer(&first, None);
    sequencer.offer(&second, None);
    sequencer.tick().await;
    assert_eq!(sequencer.current().unwrap().entry_id, first.id);

    // Skip lands on the same instant the track runs out
    advance(Duration::from_secs(2)).await;
    assert!(sequencer.skip().await);
    sequencer.tick().await;
    assert_eq!(store.delete_count(), 1);
    assert!(node.client.get(&first.id).await.is_none());
    assert_eq!(sequencer.current().unwrap().entry_id, second.id);

    // Natural end first, then the late skip finds nothing to finish
    advance(Duration::from_secs(2)).await;
    sequencer.tick().await;
    assert!(!sequencer.skip().await);
    assert_eq!(store.delete_count(), 2);
    assert!(node.client.list_all().await.unwrap().is_empty());
    assert_eq!(sequencer.state(), PlaybackState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_safety_timeout_forces_track_out() {
    let library = TestLibrary::new();
    library.add_track("Closer", "Isolation", 3);
    let node = TestNode::new(library.index());
    let mut rx = node.bus.subscribe();
    let mut sequencer = Sequencer::new(
        NodeRole::Master,
        "master-1",
        Box::new(StuckOutput),
        node.services.clone(),
        GRACE,
    );

    let entry = node.stored("Closer", "Isolation", 1, 3).await;
    sequencer.offer(&entry, None);
    sequencer.tick().await;
    assert_eq!(sequencer.state(), PlaybackState::Playing);

    advance(Duration::from_secs(12)).await;
    sequencer.tick().await;
    assert_eq!(sequencer.state(), PlaybackState::Playing, "within length + grace");

    advance(Duration::from_secs(1)).await;
    sequencer.tick().await;
    assert_eq!(sequencer.state(), PlaybackState::Idle);
    assert!(node.client.get(&entry.id).await.is_none());
    assert_eq!(finished_ids(&drain(&mut rx)), vec![(entry.id.clone(), false)]);
}

#[tokio::test(start_paused = true)]
async fn test_load_failure_drops_item_and_continues() {
    let library = TestLibrary::new();
    library.add_track("Closer", "Isolation", 4);
    let node = TestNode::new(library.index());
    let mut sequencer = master(&node);

    let missing = node.stored("Unknown Pleasures", "Disorder", 1, 4).await;
    let present = node.stored("Closer", "Isolation", 2, 4).await;
    sequencer.offer(&missing, None);
    sequencer.offer(&present, None);

    sequencer.tick().await;
    assert_eq!(sequencer.state(), PlaybackState::Playing);
    assert_eq!(sequencer.current().unwrap().entry_id, present.id);

    let dropped = node.client.get(&missing.id).await.unwrap();
    assert!(!dropped.exists_at_master);
    assert_eq!(dropped.status, TrackStatus::Queued);
}

#[tokio::test(start_paused = true)]
async fn test_pause_freezes_and_resume_continues() {
    let library = TestLibrary::new();
    library.add_track("Closer", "Decades", 60);
    let node = TestNode::new(library.index());
    let mut sequencer = master(&node);

    let entry = node.stored("Closer", "Decades", 1, 60).await;
    sequencer.offer(&entry, None);
    sequencer.tick().await;

    advance(Duration::from_secs(10)).await;
    assert!(sequencer.pause().await);
    assert_eq!(sequencer.state(), PlaybackState::Paused);
    assert_eq!(node.client.get(&entry.id).await.unwrap().status, TrackStatus::Paused);
    assert_eq!(sequencer.position(), Duration::from_secs(10));

    advance(Duration::from_secs(30)).await;
    sequencer.tick().await;
    assert_eq!(sequencer.position(), Duration::from_secs(10), "frozen while paused");

    assert!(sequencer.resume().await);
    assert_eq!(node.client.get(&entry.id).await.unwrap().status, TrackStatus::Playing);
    advance(Duration::from_secs(5)).await;
    assert_eq!(sequencer.position(), Duration::from_secs(15));

    assert!(!sequencer.resume().await, "resume while playing is a no-op");
}

#[tokio::test(start_paused = true)]
async fn test_restart_and_skip() {
    let library = TestLibrary::new();
    library.add_track("Closer", "Decades", 60);
    library.add_track("Closer", "Isolation", 60);
    let node = TestNode::new(library.index());
    let mut rx = node.bus.subscribe();
    let mut sequencer = master(&node);

    let first = node.stored("Closer", "Decades", 1, 60).await;
    let second = node.stored("Closer", "Isolation", 1, 60).await;
    sequencer.offer(&first, None);
    sequencer.offer(&second, None);
    sequencer.tick().await;

    advance(Duration::from_secs(20)).await;
    assert!(sequencer.restart().await);
    assert_eq!(sequencer.position(), Duration::ZERO);
    assert_eq!(sequencer.current().unwrap().entry_id, first.id);

    assert!(sequencer.skip().await);
    assert_eq!(sequencer.current().unwrap().entry_id, second.id);
    assert!(node.client.get(&first.id).await.is_none());

    let events = drain(&mut rx);
    assert!(event_types(&events).contains(&"TrackRestarted"));
    assert_eq!(finished_ids(&events), vec![(first.id.clone(), false)]);
}

#[tokio::test(start_paused = true)]
async fn test_withdraw_only_touches_waiting_items() {
    let library = TestLibrary::new();
    library.add_track("Closer", "Decades", 60);
    library.add_track("Closer", "Isolation", 60);
    let node = TestNode::new(library.index());
    let mut sequencer = master(&node);

    let first = node.stored("Closer", "Decades", 1, 60).await;
    let second = node.stored("Closer", "Isolation", 1, 60).await;
    sequencer.offer(&first, None);
    sequencer.offer(&second, None);
    sequencer.tick().await;

    assert!(!sequencer.withdraw(&first.id), "current item stays");
    assert!(sequencer.withdraw(&second.id));
    assert!(sequencer.queue().queued().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_slave_mirrors_length_without_opening_audio() {
    let library = TestLibrary::new();
    library.add_track("Closer", "Isolation", 3);
    let node = TestNode::new(library.index());
    let mut rx = node.bus.subscribe();
    let (output, loads) = CountingOutput::new();
    let mut sequencer = Sequencer::new(
        NodeRole::Slave,
        "slave-1",
        Box::new(output),
        node.services.clone(),
        GRACE,
    );

    sequencer.mirror_add(SongCode::new(1, 1), Some(185));
    assert_eq!(sequencer.state(), PlaybackState::Playing);
    assert_eq!(sequencer.current().unwrap().title, "Isolation");

    advance(Duration::from_secs(100)).await;
    sequencer.tick().await;
    assert_eq!(sequencer.position(), Duration::from_secs(100));

    advance(Duration::from_secs(85)).await;
    sequencer.tick().await;
    assert_eq!(sequencer.state(), PlaybackState::Idle);
    assert_eq!(loads.load(Ordering::SeqCst), 0);

    let events = drain(&mut rx);
    assert_eq!(finished_ids(&events), vec![("mirror:01-01".to_string(), true)]);
}

#[tokio::test(start_paused = true)]
async fn test_slave_length_push_without_code() {
    let library = TestLibrary::new();
    let node = TestNode::new(library.index());
    let mut sequencer = Sequencer::new(
        NodeRole::Slave,
        "slave-1",
        Box::new(ClockOutput::new()),
        node.services.clone(),
        GRACE,
    );

    sequencer.mirror_length(30);
    assert_eq!(sequencer.state(), PlaybackState::Playing);
    assert_eq!(sequencer.current().unwrap().length_seconds, 30);

    sequencer.mirror_length(40);
    assert_eq!(sequencer.current().unwrap().length_seconds, 40);

    advance(Duration::from_secs(10)).await;
    assert!(sequencer.toggle_pause().await);
    advance(Duration::from_secs(50)).await;
    sequencer.tick().await;
    assert_eq!(sequencer.state(), PlaybackState::Paused);
    assert_eq!(sequencer.position(), Duration::from_secs(10));
}

#[tokio::test(start_paused = true)]
async fn test_track_without_code_ends_slave_mirror_before_length() {
    let library = TestLibrary::new();
    library.add_track("Closer", "Isolation", 3);
    let elsewhere = TestLibrary::new();
    let stray_path = elsewhere.add_track("Elsewhere", "Stray", 3);

    let (control_tx, mut control_rx) = mpsc::unbounded_channel();
    let outbox = Outbox::new().with_control(ControlLink::Upstream(control_tx));
    let node = TestNode::with_outbox(library.index(), outbox);
    let mut sequencer = master(&node);

    let entry = node.stored("Elsewhere", "Stray", 1, 3).await;
    sequencer.offer(&entry, Some(stray_path));
    sequencer.tick().await;
    assert_eq!(sequencer.state(), PlaybackState::Playing);

    let mut sent = Vec::new();
    while let Ok(command) = control_rx.try_recv() {
        sent.push(command);
    }
    assert_eq!(sent, vec![ControlCommand::NextSong, ControlCommand::SongLength(3)]);
}

#[tokio::test(start_paused = true)]
async fn test_slave_restarts_clock_for_track_without_code() {
    let library = TestLibrary::new();
    library.add_track("Closer", "Isolation", 3);
    let node = TestNode::new(library.index());
    let mut sequencer = Sequencer::new(
        NodeRole::Slave,
        "slave-1",
        Box::new(ClockOutput::new()),
        node.services.clone(),
        GRACE,
    );

    sequencer.mirror_add(SongCode::new(1, 1), Some(185));
    advance(Duration::from_secs(100)).await;
    sequencer.tick().await;

    // What the master sends when the next track has no code
    assert!(sequencer.skip().await);
    sequencer.mirror_length(30);
    assert_eq!(sequencer.position(), Duration::ZERO);

    advance(Duration::from_secs(29)).await;
    sequencer.tick().await;
    assert_eq!(sequencer.state(), PlaybackState::Playing);

    advance(Duration::from_secs(1)).await;
    sequencer.tick().await;
    assert_eq!(sequencer.state(), PlaybackState::Idle);
}
