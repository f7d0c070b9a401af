//! Local HTTP API
//!
//! Reads come from the coordinator's published snapshot and the store;
//! mutations are forwarded to the coordinator loop through its handle.

pub mod handlers;
pub mod server;
pub mod sse;

pub use server::{build_router, run, AppContext};
