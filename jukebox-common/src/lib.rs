//! # Jukebox Common Library
//!
//! Shared code for every jukebox node (master and slave), including:
//! - Tracklist, album and song models with the persisted status vocabulary
//! - Positional song codes (`DD-DD` keypad input)
//! - The master/slave control-channel protocol
//! - Event types, pub/sub wire records and the in-process EventBus
//! - Configuration loading

pub mod code;
pub mod config;
pub mod error;
pub mod events;
pub mod models;
pub mod protocol;

pub use code::{CodeError, SongCode};
pub use error::{Error, Result};
pub use models::{Album, NewTracklistEntry, NodeRole, Song, TrackStatus, TracklistEntry};
