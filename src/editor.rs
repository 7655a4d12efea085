//! The `Editor` handle: an in-flight, exclusive edit of one key (spec §4.3).
//!
//! Grounded on the bare `disk_v2::writer.rs`'s `Writer` (an error enum declared next to the
//! type it guards, and a "soak up write errors into a flag the caller checks later" pattern),
//! adapted here to the spec's stronger requirement that write errors never even reach the
//! caller as a `Result::Err`, only as a degraded `commit()`.

use std::fs::File;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::warn;

use crate::cache::{self, Inner};
use crate::entry::Entry;
use crate::error::CacheError;
use crate::fs::{self, FileSystem};
use crate::journal::BodyRecord;

/// A write sink over one dirty file of an in-flight [`Editor`].
///
/// Per spec §4.3, I/O errors are absorbed here rather than propagated: [`Write::write`] and
/// [`Write::flush`] always report success, and instead mark the owning editor's `has_errors`
/// flag so that [`Editor::commit`] silently degrades to [`Editor::abort`].
pub struct EditorSink {
    file: Option<File>,
    has_errors: Arc<AtomicBool>,
}

impl Write for EditorSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.file {
            Some(file) => match file.write(buf) {
                Ok(n) => Ok(n),
                Err(_) => {
                    self.has_errors.store(true, Ordering::SeqCst);
                    Ok(buf.len())
                }
            },
            None => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.file {
            Some(file) => match file.flush() {
                Ok(()) => Ok(()),
                Err(_) => {
                    self.has_errors.store(true, Ordering::SeqCst);
                    Ok(())
                }
            },
            None => Ok(()),
        }
    }
}

/// An in-flight, exclusive edit of one key. Obtain one via [`crate::Cache::edit`] or
/// [`crate::Snapshot::edit`].
pub struct Editor {
    inner: Arc<Inner>,
    key: String,
    value_count: usize,
    written: Vec<bool>,
    has_errors: Arc<AtomicBool>,
    done: bool,
}

impl Editor {
    pub(crate) fn new(inner: Arc<Inner>, key: String, value_count: usize) -> Self {
        Editor {
            inner,
            key,
            written: vec![false; value_count],
            has_errors: Arc::new(AtomicBool::new(false)),
            done: false,
        }
    }

    /// The key being edited.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Opens a write sink to the dirty file at `index`, creating/truncating it. Marks `index`
    /// as written so a subsequent [`Editor::commit`] will publish it.
    pub fn new_sink(&mut self, index: usize) -> Result<EditorSink, CacheError> {
        self.check_index(index)?;
        self.check_not_done()?;

        let (fs, dir) = {
            let guard = self.inner.shared.lock();
            (guard.fs.clone(), guard.directory.clone())
        };
        self.written[index] = true;

        let path = fs::dirty_path(&dir, &self.key, index);
        match fs.create_file(&path) {
            Ok(file) => Ok(EditorSink {
                file: Some(file),
                has_errors: self.has_errors.clone(),
            }),
            Err(error) => {
                warn!(key = %self.key, index, %error, "failed to open dirty file for writing");
                self.has_errors.store(true, Ordering::SeqCst);
                Ok(EditorSink {
                    file: None,
                    has_errors: self.has_errors.clone(),
                })
            }
        }
    }

    /// Opens a read source over the *clean* file at `index`, or `None` if the entry isn't
    /// readable yet or the file is missing.
    pub fn new_source(&self, index: usize) -> Option<File> {
        if index >= self.value_count || self.done {
            return None;
        }

        let (fs, dir, readable) = {
            let guard = self.inner.shared.lock();
            let readable = guard
                .entries
                .get(&self.key)
                .map(|entry| entry.readable)
                .unwrap_or(false);
            (guard.fs.clone(), guard.directory.clone(), readable)
        };

        if !readable {
            return None;
        }
        fs.open_read(&fs::clean_path(&dir, &self.key, index)).ok()
    }

    /// Writes `value` to the dirty sink at `index` as UTF-8 bytes. Write errors are absorbed
    /// the same way as [`Editor::new_sink`]'s sink.
    pub fn set(&mut self, index: usize, value: impl AsRef<[u8]>) -> Result<(), CacheError> {
        let mut sink = self.new_sink(index)?;
        let _ = sink.write_all(value.as_ref());
        let _ = sink.flush();
        Ok(())
    }

    /// Reads the clean source at `index` as UTF-8, or `None` if unreadable, missing, or not
    /// valid UTF-8.
    pub fn get_string(&self, index: usize) -> Option<String> {
        let mut file = self.new_source(index)?;
        let mut buf = String::new();
        file.read_to_string(&mut buf).ok()?;
        Some(buf)
    }

    /// Publishes the edit: renames each written dirty file over its clean file, updates the
    /// entry's lengths and the cache's total size, and appends a `CLEAN` journal record.
    ///
    /// Fails with [`CacheError::IllegalState`] if this is a new entry (not yet readable) and
    /// some index was never written (the caller is expected to call [`Editor::abort`]
    /// instead); this failure does not consume the editor. If any sink absorbed a write error
    /// since the edit began, this degrades to calling [`Editor::abort`].
    pub fn commit(&mut self) -> Result<(), CacheError> {
        self.check_not_done()?;

        let mut guard = self.inner.shared.lock();
        if guard.closed {
            return Err(CacheError::illegal_state("cache is closed"));
        }

        let readable_before = guard
            .entries
            .get(&self.key)
            .map(|entry| entry.readable)
            .unwrap_or(false);

        if !readable_before && self.written.iter().any(|written| !written) {
            return Err(CacheError::illegal_state(
                "a new entry must have every index written before commit",
            ));
        }

        if self.has_errors.load(Ordering::SeqCst) {
            drop(guard);
            return self.abort();
        }

        let dir = guard.directory.clone();
        let mut lengths = guard
            .entries
            .get(&self.key)
            .map(|entry| entry.lengths.clone())
            .unwrap_or_else(|| vec![0; self.value_count]);
        let mut delta: i64 = 0;

        for i in 0..self.value_count {
            let dirty_path = fs::dirty_path(&dir, &self.key, i);
            if self.written[i] {
                guard.fs.rename(&dirty_path, &fs::clean_path(&dir, &self.key, i))?;
                let new_len = guard.fs.file_len(&fs::clean_path(&dir, &self.key, i))?;
                delta += new_len as i64 - lengths[i] as i64;
                lengths[i] = new_len;
            } else {
                let _ = fs::remove_if_exists(guard.fs.as_ref(), &dirty_path);
            }
        }

        let value_count = self.value_count;
        let entry = guard
            .entries
            .get_or_insert_with(self.key.clone(), || Entry::new(value_count));
        entry.lengths = lengths.clone();
        entry.readable = true;
        entry.editing = false;
        entry.sequence_number += 1;

        guard.size = (guard.size as i64 + delta).max(0) as u64;
        guard.journal.append(&BodyRecord::Clean {
            key: self.key.clone(),
            lengths,
        })?;
        guard.redundant_op_count += 1;
        let over_budget = guard.size > guard.max_size;
        let should_rebuild = cache::rebuild_due(&guard);
        drop(guard);

        self.done = true;
        if over_budget {
            self.inner.worker.notify_evict();
        }
        if should_rebuild {
            self.inner.worker.notify_rebuild();
        }
        Ok(())
    }

    /// Discards the edit: deletes every dirty file belonging to it and detaches the editor.
    /// If the entry never became readable, it is removed from the table and a `REMOVE` record
    /// is appended; a readable entry under update is left with its previous values intact.
    pub fn abort(&mut self) -> Result<(), CacheError> {
        self.check_not_done()?;

        let mut guard = self.inner.shared.lock();
        let dir = guard.directory.clone();
        for i in 0..self.value_count {
            let _ = fs::remove_if_exists(guard.fs.as_ref(), &fs::dirty_path(&dir, &self.key, i));
        }

        let mut drop_entry = false;
        if let Some(entry) = guard.entries.get_mut(&self.key) {
            entry.editing = false;
            drop_entry = !entry.readable;
        }

        if drop_entry {
            guard.entries.remove(&self.key);
            let _ = guard.journal.append(&BodyRecord::Remove {
                key: self.key.clone(),
            });
        }
        drop(guard);

        self.done = true;
        Ok(())
    }

    fn check_index(&self, index: usize) -> Result<(), CacheError> {
        if index >= self.value_count {
            Err(CacheError::invalid_argument(format!(
                "index {index} out of range for value_count {}",
                self.value_count
            )))
        } else {
            Ok(())
        }
    }

    fn check_not_done(&self) -> Result<(), CacheError> {
        if self.done {
            Err(CacheError::illegal_state(
                "editor already committed or aborted",
            ))
        } else {
            Ok(())
        }
    }
}

impl Drop for Editor {
    fn drop(&mut self) {
        if !self.done {
            warn!(key = %self.key, "Editor dropped without commit() or abort(); entry remains locked until Cache::close()");
        }
    }
}
