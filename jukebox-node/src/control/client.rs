//! Slave side of the control channel
//!
//! Dials the master, optionally announces `AUTH`, sends `HEARTBEAT|n` on a
//! fixed interval and forwards master pushes to the coordinator. Commands
//! queued on the upstream sender (keypad input, transport requests) are
//! written as they arrive. A dropped connection is retried under the
//! reconnect policy.

use super::{ControlCodec, Frame};
use crate::bridge::reconnect::{connect_with_retry, ReconnectPolicy};
use crate::coordinator::NodeEvent;
use futures::{SinkExt, StreamExt};
use jukebox_common::events::LinkState;
use jukebox_common::protocol::ControlCommand;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Link name used in status lines and `LinkChanged` events
pub const LINK_NAME: &str = "master";

pub struct ControlClient {
    master: String,
    credentials: Option<(String, String)>,
    heartbeat: Duration,
    policy: ReconnectPolicy,
}

enum Disconnect {
    Dropped,
    Shutdown,
}

impl ControlClient {
    pub fn new(master: impl Into<String>, heartbeat: Duration, policy: ReconnectPolicy) -> Self {
        Self {
            master: master.into(),
            credentials: None,
            heartbeat,
            policy,
        }
    }

    /// Send `AUTH|user|password` after each connect
    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some((user.into(), password.into()));
        self
    }

    pub fn spawn(
        self,
        events: mpsc::Sender<NodeEvent>,
        upstream: mpsc::UnboundedReceiver<ControlCommand>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(self.run(events, upstream, cancel))
    }

    async fn run(
        self,
        events: mpsc::Sender<NodeEvent>,
        mut upstream: mpsc::UnboundedReceiver<ControlCommand>,
        cancel: CancellationToken,
    ) {
        loop {
            link_changed(&events, LinkState::Connecting).await;

            let master = self.master.as_str();
            let connected = connect_with_retry(LINK_NAME, self.policy, &cancel, || TcpStream::connect(master)).await;
            let Some(stream) = connected else {
                link_changed(&events, LinkState::Disconnected).await;
                return;
            };

            info!("Connected to master at {}", self.master);
            link_changed(&events, LinkState::Connected).await;

            match self.session(stream, &events, &mut upstream, &cancel).await {
                Disconnect::Shutdown => {
                    debug!("Control client stopped");
                    return;
                }
                Disconnect::Dropped => {
                    warn!("Lost connection to master at {}", self.master);
                    link_changed(&events, LinkState::Disconnected).await;
                }
            }
        }
    }

    async fn session(
        &self,
        stream: TcpStream,
        events: &mpsc::Sender<NodeEvent>,
        upstream: &mut mpsc::UnboundedReceiver<ControlCommand>,
        cancel: &CancellationToken,
    ) -> Disconnect {
        let mut framed = Framed::new(stream, ControlCodec::new());

        if let Some((user, password)) = &self.credentials {
            let auth = ControlCommand::Auth {
                user: user.clone(),
                password: password.clone(),
            };
            if framed.send(auth.encode()).await.is_err() {
                return Disconnect::Dropped;
            }
        }

        let mut heartbeat = interval_at(Instant::now() + self.heartbeat, self.heartbeat);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut beats: u64 = 0;
    
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Disconnect::Shutdown,
                line = framed.next() => {
                    let line = match line {
                        Some(Ok(Frame::Line(line))) => line,
                        Some(Ok(Frame::Dropped(reason))) => {
                            warn!("Dropped bad frame from master: {}", reason);
                            continue;
                        }
                        Some(Err(e)) => {
                            warn!("Control read failed: {}", e);
                            return Disconnect::Dropped;
                        }
                        None => return Disconnect::Dropped,
                    };

                    match ControlCommand::parse(&line) {
                        Ok(ControlCommand::Pong { echo }) => {
                            debug!(echo = ?echo, "Master alive");
                        }
                        Ok(ControlCommand::Ping { echo }) | Ok(ControlCommand::Heartbeat { echo }) => {
                            if framed.send(ControlCommand::pong(echo).encode()).await.is_err() {
                                return Disconnect::Dropped;
                            }
                        }
                        Ok(command) => {
                            let event = NodeEvent::Control {
                                peer: self.master.clone(),
                                command,
                            };
                            if events.send(event).await.is_err() {
                                return Disconnect::Shutdown;
                            }
                        }
                        Err(e) => warn!("Ignoring frame {:?} from master: {}", line, e),
                    }
                }
                _ = heartbeat.tick() => {
                    beats += 1;
                    let beat = ControlCommand::Heartbeat {
                        echo: Some(beats.to_string()),
                    };
                    if framed.send(beat.encode()).await.is_err() {
                        return Disconnect::Dropped;
                    }
                }
                Some(command) = upstream.recv() => {
                    debug!("Forwarding {} to master", command);
                    if framed.send(command.encode()).await.is_err() {
                        return Disconnect::Dropped;
                    }
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
