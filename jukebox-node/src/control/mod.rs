//! Master↔slave control channel
//!
//! The master runs a [`ControlServer`]; each slave dials in with a
//! [`ControlClient`]. Frames are newline-terminated `|`-joined tokens (see
//! [`jukebox_common::protocol`]), framed with a line codec so partial reads
//! are buffered until a full line arrives. Bad lines are dropped, never fatal.

pub mod client;
pub mod codec;
pub mod server;

pub use client::ControlClient;
pub use codec::{ControlCodec, Frame};
pub use server::{ControlHandle, ControlServer};

use jukebox_common::protocol::ControlCommand;
use tokio::sync::mpsc;
use tracing::debug;

/// Longest accepted frame in bytes
pub const MAX_FRAME_LENGTH: usize = 1024;

/// Where outbound commands go from this node
#[derive(Clone)]
pub enum ControlLink {
    /// Master → connected slaves
    Downstream(ControlHandle),
    /// Slave → master, through the control client's write half
    Upstream(mpsc::UnboundedSender<ControlCommand>),
}

impl ControlLink {
    pub fn send(&self, command: ControlCommand) {
        match self {
            ControlLink::Downstream(handle) => {
                handle.send_to_slave(command);
            }
            ControlLink::Upstream(tx) => {
                if tx.send(command).is_err() {
                    debug!("Control client stopped; command dropped");
                }
            }
        }
    }
}
