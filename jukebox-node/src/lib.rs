//! # Jukebox Node Library
//!
//! One node of a multi-node jukebox. A master owns the music library, the
//! audio output and the authoritative tracklist transitions; slaves mirror
//! playback time and forward keypad and remote input over the control
//! channel. Nodes share a tracklist store and a pub/sub change channel.
//!
//! The [`coordinator`] loop owns all playback state; every other component
//! runs as its own task and talks to it over channels.

pub mod api;
pub mod autofill;
pub mod bridge;
pub mod config;
pub mod control;
pub mod coordinator;
pub mod error;
pub mod library;
pub mod playback;
pub mod services;
pub mod status;
pub mod store;
pub mod validator;

pub use error::{Error, Result};
