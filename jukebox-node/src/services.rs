//! Services shared by the sequencer and the coordinator
//!
//! Built once in `main` (or a test) and handed down by value; every field is
//! a cheap handle.

use crate::bridge::Outbox;
use crate::library::LibraryIndex;
use crate::status::StatusBoard;
use crate::store::TracklistClient;
use jukebox_common::events::EventBus;
use std::sync::Arc;

#[derive(Clone)]
pub struct Services {
    pub client: TracklistClient,
    pub library: Arc<LibraryIndex>,
    pub bus: Arc<EventBus>,
    pub status: StatusBoard,
    pub outbox: Outbox,
}
