//! Audio library on the local filesystem
//!
//! - [`LibraryIndex`]: tiered album/song resolution, positional codes, duration probing
//! - [`LibraryScanner`]: reconciliation of the store's catalog against the disk

pub mod index;
pub mod scan;

pub use index::{probe_duration_seconds, AlbumFolder, LibraryIndex, ResolvedTrack, TrackFile};
pub use scan::{LibraryScanner, ScanSummary};
