//! The `Snapshot` handle: an immutable view over a key's clean files as of `get` time
//! (spec §4.3).
//!
//! Grounded on `variants/disk_v2::reader.rs`'s "the reader owns its open handles" design,
//! though unlike that reader this one never re-seeks a position the caller hasn't asked for
//! (`get_source` hands back the same underlying file each call so progressive reads behave as
//! documented in spec scenario 6).

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::cache::{self, Inner};
use crate::editor::Editor;
use crate::error::CacheError;

/// A read handle borrowed from a [`Snapshot`] for one value index.
///
/// Returned by [`Snapshot::get_source`]; reading through it advances the same file position
/// across calls, so repeated short reads pick up where the previous one left off.
pub struct SnapshotSource<'a> {
    file: &'a Mutex<File>,
}

impl Read for SnapshotSource<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.lock().read(buf)
    }
}

/// An immutable view over one key's clean files, captured at the moment of
/// [`crate::Cache::get`]. The held file handles remain valid even if the entry is later
/// overwritten or evicted, because renaming or unlinking a path does not invalidate a file
/// descriptor already open against the old inode.
pub struct Snapshot {
    inner: Arc<Inner>,
    key: String,
    sequence_number: u64,
    lengths: Vec<u64>,
    sources: Vec<Mutex<File>>,
}

impl Snapshot {
    pub(crate) fn new(
        inner: Arc<Inner>,
        key: String,
        sequence_number: u64,
        lengths: Vec<u64>,
        files: Vec<File>,
    ) -> Self {
        Snapshot {
            inner,
            key,
            sequence_number,
            lengths,
            sources: files.into_iter().map(Mutex::new).collect(),
        }
    }

    /// The key this snapshot was captured for.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The entry's sequence number as of capture time; see [`Snapshot::edit`].
    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    /// A read handle over value `index`, identical across calls (not a fresh stream), so a
    /// caller can read progressively.
    pub fn get_source(&self, index: usize) -> Option<SnapshotSource<'_>> {
        self.sources.get(index).map(|file| SnapshotSource { file })
    }

    /// Reads value `index` from the start as a UTF-8 string. Unlike [`Snapshot::get_source`],
    /// this always rewinds to the beginning first.
    pub fn get_string(&self, index: usize) -> Option<String> {
        let mutex = self.sources.get(index)?;
        let mut file = mutex.lock();
        file.seek(SeekFrom::Start(0)).ok()?;
        let mut buf = String::new();
        file.read_to_string(&mut buf).ok()?;
        Some(buf)
    }

    /// The byte length of value `index` as of capture time.
    pub fn get_length(&self, index: usize) -> Option<u64> {
        self.lengths.get(index).copied()
    }

    /// Equivalent to `cache.edit_expecting(key, self.sequence_number())`: begins an edit of
    /// this key only if it hasn't changed since this snapshot was captured.
    pub fn edit(&self) -> Result<Option<Editor>, CacheError> {
        cache::edit_impl(self.inner.clone(), &self.key, Some(self.sequence_number))
    }

    /// Releases the held file handles. Equivalent to dropping the `Snapshot`; provided for
    /// parity with the spec's handle lifecycle vocabulary.
    pub fn close(self) {}
}
