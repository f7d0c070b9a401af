//! Master side of the control channel
//!
//! Accepts any number of slaves. Each connection gets its own task that reads
//! frames, answers liveness probes in place and hands every other command to
//! the coordinator. A closed or failed connection removes only itself from
//! the registry.

use super::{ControlCodec, Frame};
use crate::coordinator::NodeEvent;
use crate::error::{Error, Result};
use futures::{SinkExt, StreamExt};
use jukebox_common::config::FanOutPolicy;
use jukebox_common::events::LinkState;
use jukebox_common::protocol::ControlCommand;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Link name used in status lines and `LinkChanged` events
pub const LINK_NAME: &str = "control";

struct Peer {
    id: u64,
    addr: SocketAddr,
    frames: mpsc::UnboundedSender<String>,
}

struct Registry {
    /// Ordered by connect time
    peers: Mutex<Vec<Peer>>,
    next_id: AtomicU64,
    policy: FanOutPolicy,
}

/// Cloneable handle for pushing commands to connected slaves
#[derive(Clone)]
pub struct ControlHandle {
    registry: Arc<Registry>,
}

impl ControlHandle {
    fn new(policy: FanOutPolicy) -> Self {
        Self {
            registry: Arc::new(Registry {
                peers: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
                policy,
            }),
        }
    }

    fn with_peers<T>(&self, f: impl FnOnce(&mut Vec<Peer>) -> T) -> T {
        let mut peers = self.registry.peers.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut peers)
    }

    fn register(&self, addr: SocketAddr) -> (u64, mpsc::UnboundedReceiver<String>) {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        let (frames, rx) = mpsc::unbounded_channel();
        self.with_peers(|peers| peers.push(Peer { id, addr, frames }));
        (id, rx)
    }

    /// Remaining peer count
    fn unregister(&self, id: u64) -> usize {
        self.with_peers(|peers| {
            peers.retain(|peer| peer.id != id);
            peers.len()
        })
    }

    pub fn policy(&self) -> FanOutPolicy {
        self.registry.policy
    }

    pub fn peer_count(&self) -> usize {
        self.with_peers(|peers| peers.len())
    }

    /// Addresses of connected slaves, oldest first
    pub fn peers(&self) -> Vec<SocketAddr> {
        self.with_peers(|peers| peers.iter().map(|peer| peer.addr).collect())
    }

    /// Push a command under the fan-out policy; returns how many slaves got it
    ///
    /// `First` targets the oldest live connection only. `All` targets every one.
    pub fn send_to_slave(&self, command: ControlCommand) -> usize {
        let frame = command.encode();
        let policy = self.registry.policy;

        let delivered = self.with_peers(|peers| {
            let mut delivered = 0;
            for peer in peers.iter() {
                if peer.frames.send(frame.clone()).is_ok() {
                    delivered += 1;
                    if policy == FanOutPolicy::First {
                        break;
                    }
                }
            }
            delivered
        });

        if delivered == 0 {
            debug!("No slave connected; dropped {}", frame);
        } else {
            debug!("Sent {} to {} slave(s)", frame, delivered);
        }
        delivered
    }
}

pub struct ControlServer {
    listener: TcpListener,
    handle: ControlHandle,
}

impl ControlServer {
    pub async fn bind(addr: &str, policy: FanOutPolicy) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Control(format!("cannot listen on {}: {}", addr, e)))?;
        Ok(Self {
            listener,
            handle: ControlHandle::new(policy),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn handle(&self) -> ControlHandle {
        self.handle.clone()
    }

    pub fn spawn(self, events: mpsc::Sender<NodeEvent>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(events, cancel))
    }

    async fn run(self, events: mpsc::Sender<NodeEvent>, cancel: CancellationToken) {
        if let Ok(addr) = self.listener.local_addr() {
            info!("Control channel listening on {} (fan-out: {})", addr, self.handle.policy());
        }

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        tokio::spawn(serve_connection(
                            stream,
                            addr,
                            self.handle.clone(),
                            events.clone(),
                            cancel.clone(),
                        ));
                    }
                    Err(e) => warn!("Control accept failed: {}", e),
                },
            }
        }
        debug!("Control channel stopped");
    }
}

async fn serve_connection(
    stream: TcpStream,
    addr: SocketAddr,
    handle: ControlHandle,
    events: mpsc::Sender<NodeEvent>,
    cancel: CancellationToken,
) {
    let (id, mut outbound) = handle.register(addr);
    info!(peer = %addr, "Slave connected ({} total)", handle.peer_count());
    let _ = events
        .send(NodeEvent::Link {
            link: LINK_NAME,
            state: LinkState::Connected,
        })
        .await;

    let peer = addr.to_string();
    let mut framed = Framed::new(stream, ControlCodec::new());

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            line = framed.next() => {
                let line = match line {
                    Some(Ok(Frame::Line(line))) => line,
                    Some(Ok(Frame::Dropped(reason))) => {
                        warn!(peer = %addr, "Dropped bad frame: {}", reason);
                        continue;
                    }
                    Some(Err(e)) => {
                        warn!(peer = %addr, "Control read failed: {}", e);
                        break;
                    }
                    None => break,
                };

                match ControlCommand::parse(&line) {
                    Ok(ControlCommand::Ping { echo }) | Ok(ControlCommand::Heartbeat { echo }) => {
                        if let Err(e) = framed.send(ControlCommand::pong(echo).encode()).await {
                            warn!(peer = %addr, "Control write failed: {}", e);
                            break;
                        }
                    }
                    Ok(ControlCommand::Pong { .. }) => {}
                    Ok(ControlCommand::Auth { user, .. }) => {
                        info!(peer = %addr, user = %user, "AUTH received (not enforced)");
                    }
                    Ok(command) => {
                        debug!(peer = %addr, "Received {}", command);
                        let event = NodeEvent::Control {
                            peer: peer.clone(),
                            command,
                        };
                        if events.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(peer = %addr, "Ignoring frame {:?}: {}", line, e);
                    }
                }
            }
            Some(frame) = outbound.recv() => {
                if let Err(e) = framed.send(frame).await {
                    warn!(peer = %addr, "Control write failed: {}", e);
                    break;
                }
            }
        }
    }

    let remaining = handle.unregister(id);
    info!(peer = %addr, "Slave disconnected ({} remaining)", remaining);
    if remaining == 0 {
        let _ = events
            .send(NodeEvent::Link {
                link: LINK_NAME,
                state: LinkState::Disconnected,
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_policy_targets_oldest_peer() {
        let handle = ControlHandle::new(FanOutPolicy::First);
        let (first, mut first_rx) = handle.register("127.0.0.1:5001".parse().unwrap());
        let (_second, mut second_rx) = handle.register("127.0.0.1:5002".parse().unwrap());

        assert_eq!(handle.send_to_slave(ControlCommand::NextSong), 1);
        assert_eq!(first_rx.try_recv().unwrap(), "NEXT_SONG");
        assert!(second_rx.try_recv().is_err());

        // Oldest gone: the next one takes over
        assert_eq!(handle.unregister(first), 1);
        assert_eq!(handle.send_to_slave(ControlCommand::PauseResume), 1);
        assert_eq!(second_rx.try_recv().unwrap(), "PAUSE_RESUME");
    }

    #[test]
    fn test_all_policy_targets_every_peer() {
        let handle = ControlHandle::new(FanOutPolicy::All);
        let (_a, mut a_rx) = handle.register("127.0.0.1:5001".parse().unwrap());
        let (_b, mut b_rx) = handle.register("127.0.0.1:5002".parse().unwrap());

        assert_eq!(handle.send_to_slave(ControlCommand::SongLength(185)), 2);
        assert_eq!(a_rx.try_recv().unwrap(), "SONG_LENGTH|185");
        assert_eq!(b_rx.try_recv().unwrap(), "SONG_LENGTH|185");
    }

    #[test]
    fn test_closed_peer_is_skipped() {
        let handle = ControlHandle::new(FanOutPolicy::First);
        let (_a, a_rx) = handle.register("127.0.0.1:5001".parse().unwrap());
        let (_b, mut b_rx) = handle.register("127.0.0.1:5002".parse().unwrap());
        drop(a_rx);

        assert_eq!(handle.send_to_slave(ControlCommand::NextSong), 1);
        assert_eq!(b_rx.try_recv().unwrap(), "NEXT_SONG");
    }

    #[test]
    fn test_no_peers_delivers_nothing() {
        let handle = ControlHandle::new(FanOutPolicy::All);
        assert_eq!(handle.send_to_slave(ControlCommand::NextSong), 0);
        assert!(handle.peers().is_empty());
    }
}
