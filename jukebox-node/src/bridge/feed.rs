//! Store change feed
//!
//! Polls `changes_since(revision)` and forwards each change as a normalized
//! [`TracklistEvent`]. The starting revision is the store's revision when the
//! feed starts; earlier entries are covered by startup re-validation.

use crate::coordinator::NodeEvent;
use crate::store::TracklistClient;
use jukebox_common::events::TracklistEvent;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub struct ChangeFeed {
    client: TracklistClient,
    poll_interval: Duration,
    /// Highest revision already forwarded; `None` until the first poll
    revision: Option<i64>,
}

impl ChangeFeed {
    pub fn new(client: TracklistClient, poll_interval: Duration) -> Self {
        Self {
            client,
            poll_interval,
            revision: None,
        }
    }

    pub fn revision(&self) -> Option<i64> {
        self.revision
    }

    /// One poll; a failed read leaves the cursor where it was
    pub async fn poll_once(&mut self) -> Vec<TracklistEvent> {
        let Some(since) = self.revision else {
            self.revision = self.client.current_revision().await;
            if let Some(revision) = self.revision {
                debug!("Change feed starting at revision {}", revision);
            }
            return Vec::new();
        };

        let Some(changes) = self.client.changes_since(since).await else {
            return Vec::new();
        };

        let mut cursor = since;
        let events = changes
            .iter()
            .map(|change| {
                cursor = cursor.max(change.entry.revision);
                TracklistEvent::from_feed(change.operation, &change.entry)
            })
            .collect();
        self.revision = Some(cursor);
        events
    }

    pub fn spawn(self, events: mpsc::Sender<NodeEvent>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(events, cancel))
    }

    async fn run(mut self, events: mpsc::Sender<NodeEvent>, cancel: CancellationToken) {
        info!("Change feed polling every {:?}", self.poll_interval);
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            for event in self.poll_once().await {
                if events.send(NodeEvent::Tracklist(event)).await.is_err() {
                    debug!("Coordinator gone; change feed stopping");
                    return;
                }
            }
        }
        debug!("Change feed stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::StatusBoard;
    use crate::store::MemoryStore;
    use chrono::Utc;
    use jukebox_common::events::{EventSource, TracklistOperation};
    use jukebox_common::{NewTracklistEntry, TrackStatus};
    use std::sync::Arc;

    fn new_entry(title: &str) -> NewTracklistEntry {
        NewTracklistEntry {
            song_id: format!("Album/{}", title),
            title: title.to_string(),
            artist: "Artist".to_string(),
            album: "Album".to_string(),
            duration: 120,
            requested_by: "test".to_string(),
            owner_node_id: "hub".to_string(),
            priority: 1,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_feed_reports_changes_after_start() {
        let client = TracklistClient::new(Arc::new(MemoryStore::new()), StatusBoard::new());
        client.enqueue(new_entry("Before")).await.unwrap();

        let mut feed = ChangeFeed::new(client.clone(), Duration::from_millis(10));
        assert!(feed.poll_once().await.is_empty());

        let entry = client.enqueue(new_entry("After")).await.unwrap();
        let events = feed.poll_once().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].operation, TracklistOperation::Insert);
        assert_eq!(events[0].source, EventSource::StoreFeed);
        assert_eq!(events[0].entry.title, "After");

        client.set_status(&entry.id, TrackStatus::Playing, Some("hub")).await;
        let events = feed.poll_once().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].operation, TracklistOperation::Update);
        assert_eq!(events[0].entry.status, Some(TrackStatus::Playing));

        assert!(feed.poll_once().await.is_empty());
    }
}
