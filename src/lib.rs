//! A bounded, persistent, journal-backed least-recently-used cache of fixed-arity value
//! tuples, stored on a local filesystem.
//!
//! This crate ties three things together: an in-memory LRU index, a set of on-disk value
//! files, and an append-only text journal that is periodically compacted. It durably caches
//! moderately sized opaque blobs (decoded thumbnails, HTTP response bodies, and the like)
//! behind a soft byte budget, and survives a crash mid-write by replaying the journal on the
//! next [`Cache::open`].
//!
//! # Layout
//!
//! Each key maps to `value_count` value slots, each backed by its own file
//! (`<key>.<index>`). An edit stages its writes into sibling `.tmp` files and only becomes
//! visible by atomically renaming them into place at [`Editor::commit`]. A single process is
//! expected to own a cache directory at a time; this crate does not coordinate across
//! processes.
//!
//! # Example
//!
//! ```no_run
//! use disk_lru_cache::Cache;
//!
//! # fn main() -> Result<(), disk_lru_cache::CacheError> {
//! let cache = Cache::open("/tmp/example-cache", 1, 2, 10 * 1024 * 1024)?;
//!
//! if let Some(mut editor) = cache.edit("thumbnail-42")? {
//!     editor.set(0, "image/png")?;
//!     editor.set(1, b"...bytes...".as_slice())?;
//!     editor.commit()?;
//! }
//!
//! if let Some(snapshot) = cache.get("thumbnail-42")? {
//!     let content_type = snapshot.get_string(0).unwrap_or_default();
//!     println!("cached as {content_type}");
//! }
//!
//! cache.close()?;
//! # Ok(())
//! # }
//! ```

mod cache;
mod config;
mod editor;
mod entry;
mod error;
mod fs;
mod journal;
mod key;
mod recovery;
mod snapshot;
mod worker;

#[cfg(test)]
mod model_tests;
#[cfg(test)]
mod test_support;

pub use cache::Cache;
pub use config::{CacheConfig, CacheConfigBuilder};
pub use editor::{Editor, EditorSink};
pub use error::CacheError;
pub use snapshot::{Snapshot, SnapshotSource};
