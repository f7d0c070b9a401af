//! Pub/sub realtime socket
//!
//! Announces `{"type":"register","role":...}` once per connection, forwards
//! inbound tracklist broadcasts (and, on the master, validation requests) to
//! the coordinator, and writes frames queued through the
//! [`Outbox`](super::Outbox). Drops are retried under a [`ReconnectPolicy`];
//! once it is exhausted the link is reported `Disconnected` and the task ends.

use super::reconnect::{connect_with_retry, ReconnectPolicy};
use crate::coordinator::NodeEvent;
use futures::{SinkExt, StreamExt};
use jukebox_common::events::{LinkState, PubSubMessage, RegisterMessage};
use jukebox_common::NodeRole;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Link name used in status lines and `LinkChanged` events
pub const LINK_NAME: &str = "pubsub";

pub struct PubSubClient {
    url: String,
    role: NodeRole,
    policy: ReconnectPolicy,
}

/// Why a live connection ended
enum Disconnect {
    Dropped,
    Shutdown,
}

impl PubSubClient {
    pub fn new(url: impl Into<String>, role: NodeRole, policy: ReconnectPolicy) -> Self {
        Self {
            url: url.into(),
            role,
            policy,
        }
    }

    /// Turn one inbound text frame into a coordinator event
    ///
    /// Malformed frames are logged and dropped. Validation requests are only
    /// meaningful on the master.
    pub fn decode_frame(role: NodeRole, text: &str) -> Option<NodeEvent> {
        match PubSubMessage::parse(text) {
            Ok(PubSubMessage::Update(update)) => Some(NodeEvent::Tracklist(update.into_event())),
            Ok(PubSubMessage::ValidationRequest(request)) if role.is_master() => {
                Some(NodeEvent::ValidationRequested(request))
            }
            Ok(PubSubMessage::ValidationRequest(request)) => {
                debug!(tracklist_id = %request.tracklist_id, "Ignoring validation request on slave");
                None
            }
            Err(e) => {
                warn!("Malformed pub/sub frame: {}", e);
                None
            }
        }
    }

    pub fn spawn(
        self,
        events: mpsc::Sender<NodeEvent>,
        outbound: mpsc::UnboundedReceiver<String>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(self.run(events, outbound, cancel))
    }

    async fn run(
        self,
        events: mpsc::Sender<NodeEvent>,
        mut outbound: mpsc::UnboundedReceiver<String>,
        cancel: CancellationToken,
    ) {
        loop {
            link_changed(&events, LinkState::Connecting).await;

            let url = self.url.as_str();
            let connected = connect_with_retry(LINK_NAME, self.policy, &cancel, || connect_async(url)).await;
            let Some((stream, _response)) = connected else {
                link_changed(&events, LinkState::Disconnected).await;
                return;
            };

            info!("Connected to pub/sub server at {}", self.url);
            link_changed(&events, LinkState::Connected).await;

            let (mut write, mut read) = stream.split();
            match serde_json::to_string(&RegisterMessage::new(self.role)) {
                Ok(register) => {
                    if let Err(e) = write.send(Message::Text(register)).await {
                        warn!("Failed to register with pub/sub server: {}", e);
                    }
                }
                Err(e) => warn!("Failed to encode register frame: {}", e),
            }

            let reason = loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        let _ = write.send(Message::Close(None)).await;
                        break Disconnect::Shutdown;
                    }
                    frame = read.next() => match frame {
                        Some(Ok(Message::Text(text))) => {
                            if let Some(event) = Self::decode_frame(self.role, &text) {
                                if events.send(event).await.is_err() {
                                    break Disconnect::Shutdown;
                                }
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            info!(?frame, "Pub/sub server closed the socket");
                            break Disconnect::Dropped;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!("Pub/sub receive error: {}", e);
                            break Disconnect::Dropped;
                        }
                        None => break Disconnect::Dropped,
                    },
                    Some(frame) = outbound.recv() => {
                        if let Err(e) = write.send(Message::Text(frame)).await {
                            warn!("Pub/sub send error: {}", e);
                            break Disconnect::Dropped;
                        }
                    }
                }
            };

            match reason {
                Disconnect::Shutdown => {
                    debug!("Pub/sub client stopped");
                    return;
                }
                Disconnect::Dropped => {
                    warn!("Pub/sub connection lost");
                    link_changed(&events, LinkState::Disconnected).await;
                }
            }
        }
    }
}

async fn link_changed(events: &mpsc::Sender<NodeEvent>, state: LinkState) {
    let _ = events
        .send(NodeEvent::Link {
            link: LINK_NAME,
            state,
        })
        .await;
}
