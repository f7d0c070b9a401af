//! Change notification bridge
//!
//! Inbound, two sources are normalized into [`TracklistEvent`]s for the
//! coordinator loop:
//! - [`feed::ChangeFeed`]: polls the store's revision counter
//! - [`pubsub::PubSubClient`]: the realtime server's WebSocket
//!
//! Outbound, the [`Outbox`] fans one coordination decision out to every
//! configured peer: the control channel, the HTTP push endpoints and the
//! pub/sub socket. Every outbound path is fire-and-forget.
//!
//! [`TracklistEvent`]: jukebox_common::events::TracklistEvent

pub mod feed;
pub mod http;
pub mod pubsub;
pub mod reconnect;

pub use feed::ChangeFeed;
pub use http::{HttpNotice, HttpNotifier};
pub use pubsub::PubSubClient;
pub use reconnect::ReconnectPolicy;

use crate::control::ControlLink;
use jukebox_common::events::{TracklistUpdate, ValidationRequest};
use jukebox_common::protocol::ControlCommand;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Outbound fan-out handle
///
/// Cheap to clone; every target is optional so a node only talks to the
/// peers it was configured with.
#[derive(Clone, Default)]
pub struct Outbox {
    control: Option<ControlLink>,
    http: Option<HttpNotifier>,
    pubsub: Option<mpsc::UnboundedSender<String>>,
}

impl Outbox {
    /// Outbox with no targets (everything is dropped)
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_control(mut self, link: ControlLink) -> Self {
        self.control = Some(link);
        self
    }

    pub fn with_http(mut self, notifier: HttpNotifier) -> Self {
        self.http = Some(notifier);
        self
    }

    /// Frames written here are sent by the pub/sub client while it is connected
    pub fn with_pubsub(mut self, frames: mpsc::UnboundedSender<String>) -> Self {
        self.pubsub = Some(frames);
        self
    }

    pub fn control(&self, command: ControlCommand) {
        match &self.control {
            Some(link) => link.send(command),
            None => debug!("No control link; dropped {}", command),
        }
    }

    pub fn notify(&self, notice: HttpNotice) {
        if let Some(http) = &self.http {
            http.notify(notice);
        }
    }

    pub fn publish(&self, update: &TracklistUpdate) {
        self.publish_frame(update);
    }

    pub fn request_validation(&self, request: &ValidationRequest) {
        self.publish_frame(request);
    }

    fn publish_frame<T: Serialize>(&self, frame: &T) {
        let Some(pubsub) = &self.pubsub else {
            return;
        };
        match serde_json::to_string(frame) {
            Ok(text) => {
                if pubsub.send(text).is_err() {
                    debug!("Pub/sub client stopped; frame dropped");
                }
            }
            Err(e) => warn!("Failed to encode pub/sub frame: {}", e),
        }
    }
}
