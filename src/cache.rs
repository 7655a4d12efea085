//! The public facade (spec §4.1): `Cache::open`, `get`, `edit`, `remove`, `set_max_size`,
//! `size`, `flush`, `close`. Shaped after `disk_v2::Buffer::from_config`'s split between a
//! thin, `Send + Sync` public handle and an inner, mutex-guarded state struct, but without an
//! async runtime: every method here blocks the calling thread for as long as it holds the
//! lock, per spec §5.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::config::CacheConfig;
use crate::editor::Editor;
use crate::entry::{Entry, EntryTable};
use crate::error::CacheError;
use crate::fs::{self, FileSystem, StdFileSystem};
use crate::journal::{BodyRecord, JournalWriter};
use crate::key::validate_key;
use crate::recovery;
use crate::snapshot::Snapshot;
use crate::worker::{self, WorkerHandle};

/// All mutable cache state, guarded by a single mutex (spec §5: "all mutations to the entry
/// table, journal writer, and size counters are serialized under a single cache-wide mutex").
pub(crate) struct Shared {
    pub fs: Arc<dyn FileSystem>,
    pub directory: PathBuf,
    pub app_version: u32,
    pub value_count: usize,
    pub max_size: u64,
    pub size: u64,
    pub entries: EntryTable,
    pub redundant_op_count: usize,
    pub journal: JournalWriter,
    pub closed: bool,
}

/// Shared between [`Cache`], every [`Editor`], and every [`Snapshot`] issued against the same
/// directory, so an `Editor`/`Snapshot` can outlive the `Cache` value that issued it as long as
/// one of these `Arc`s is still alive.
pub(crate) struct Inner {
    pub shared: Arc<Mutex<Shared>>,
    pub worker: WorkerHandle,
    thread: Mutex<Option<JoinHandle<()>>>,
}

/// A bounded, persistent, journal-backed LRU cache of fixed-arity value tuples.
///
/// See the crate-level documentation for the on-disk layout and crash-recovery contract.
pub struct Cache {
    inner: Arc<Inner>,
}

impl Cache {
    /// Opens (creating if absent) a cache directory with the given parameters.
    ///
    /// Equivalent to building a [`CacheConfig`] and calling [`Cache::open_with_config`].
    pub fn open(
        directory: impl Into<PathBuf>,
        app_version: u32,
        value_count: usize,
        max_size: u64,
    ) -> Result<Self, CacheError> {
        let config = CacheConfig::builder(directory.into())
            .app_version(app_version)
            .value_count(value_count)
            .max_size(max_size)
            .build()?;
        Self::open_with_config(config)
    }

    /// Opens a cache from an already-validated [`CacheConfig`].
    pub fn open_with_config(config: CacheConfig) -> Result<Self, CacheError> {
        Self::open_with_filesystem(config, Arc::new(StdFileSystem))
    }

    pub(crate) fn open_with_filesystem(
        config: CacheConfig,
        fs: Arc<dyn FileSystem>,
    ) -> Result<Self, CacheError> {
        info!(directory = %config.directory().display(), app_version = config.app_version(), "opening disk cache");

        let recovered = recovery::open(
            fs.as_ref(),
            config.directory(),
            config.app_version(),
            config.value_count(),
        )?;

        let shared = Shared {
            fs,
            directory: config.directory().to_path_buf(),
            app_version: config.app_version(),
            value_count: config.value_count(),
            max_size: config.max_size(),
            size: recovered.size,
            entries: recovered.entries,
            redundant_op_count: recovered.redundant_op_count,
            journal: recovered.journal,
            closed: false,
        };
        let shared = Arc::new(Mutex::new(shared));
        let (worker, thread) = worker::spawn(shared.clone());

        Ok(Cache {
            inner: Arc::new(Inner {
                shared,
                worker,
                thread: Mutex::new(Some(thread)),
            }),
        })
    }

    /// Looks up `key`, returning a [`Snapshot`] over its clean files if it is present and
    /// readable.
    pub fn get(&self, key: &str) -> Result<Option<Snapshot>, CacheError> {
        get_impl(&self.inner, key)
    }

    /// Begins an edit of `key`, creating it if absent. Returns `None` if another `Editor` is
    /// already in flight for this key.
    pub fn edit(&self, key: &str) -> Result<Option<Editor>, CacheError> {
        edit_impl(self.inner.clone(), key, None)
    }

    /// Begins an edit of `key` only if its current sequence number matches
    /// `expected_sequence_number`; returns `None` if the entry has changed (or been evicted)
    /// since that sequence number was observed, e.g. via [`Snapshot::sequence_number`].
    pub fn edit_expecting(
        &self,
        key: &str,
        expected_sequence_number: u64,
    ) -> Result<Option<Editor>, CacheError> {
        edit_impl(self.inner.clone(), key, Some(expected_sequence_number))
    }

    /// Removes `key` if present and not being edited. Returns `false` if there was nothing to
    /// remove (absent key, or an edit is in flight).
    pub fn remove(&self, key: &str) -> Result<bool, CacheError> {
        let key = validate_key(key)?;
        let mut guard = self.inner.shared.lock();
        ensure_open(&guard)?;

        let removed = remove_locked(&mut guard, key)?;
        let should_rebuild = removed && rebuild_due(&guard);
        drop(guard);

        if should_rebuild {
            self.inner.worker.notify_rebuild();
        }
        Ok(removed)
    }

    /// Updates the soft byte budget, scheduling an eviction pass if the cache is now over
    /// budget. The eviction itself may run asynchronously; call [`Cache::flush`] to wait for it.
    pub fn set_max_size(&self, new_max: u64) -> Result<(), CacheError> {
        if new_max == 0 {
            return Err(CacheError::invalid_argument(
                "max_size must be greater than zero",
            ));
        }

        let mut guard = self.inner.shared.lock();
        ensure_open(&guard)?;
        guard.max_size = new_max;
        let over_budget = guard.size > guard.max_size;
        drop(guard);

        if over_budget {
            self.inner.worker.notify_evict();
        }
        Ok(())
    }

    /// The current total size in bytes of all readable entries.
    pub fn size(&self) -> u64 {
        self.inner.shared.lock().size
    }

    /// The fixed number of value files stored per key.
    pub fn value_count(&self) -> usize {
        self.inner.shared.lock().value_count
    }

    /// Flushes the journal and waits for any pending background eviction or rebuild to finish.
    pub fn flush(&self) -> Result<(), CacheError> {
        {
            let mut guard = self.inner.shared.lock();
            ensure_open(&guard)?;
            guard.journal.flush()?;
        }
        self.inner.worker.drain();
        Ok(())
    }

    /// Aborts any in-flight editors, flushes and closes the journal, and stops the background
    /// worker. Safe to call more than once; every call after the first is a no-op.
    pub fn close(&self) -> Result<(), CacheError> {
        let mut guard = self.inner.shared.lock();
        if guard.closed {
            return Ok(());
        }

        let editing_keys: Vec<String> = guard
            .entries
            .iter()
            .filter(|(_, entry)| entry.editing)
            .map(|(key, _)| key.clone())
            .collect();

        for key in editing_keys {
            abort_in_flight_locked(&mut guard, &key);
        }

        let _ = guard.journal.flush();
        guard.closed = true;
        guard.entries.clear();
        drop(guard);

        info!("closing disk cache");
        self.inner.worker.shutdown();
        if let Some(handle) = self.inner.thread.lock().take() {
            let _ = handle.join();
        }

        Ok(())
    }
}

fn get_impl(inner: &Arc<Inner>, key: &str) -> Result<Option<Snapshot>, CacheError> {
    let key = validate_key(key)?.to_string();
    let mut guard = inner.shared.lock();
    ensure_open(&guard)?;

    let readable = matches!(guard.entries.get(&key), Some(entry) if entry.readable);
    if !readable {
        return Ok(None);
    }

    let dir = guard.directory.clone();
    let (lengths, sequence_number) = {
        let entry = guard.entries.get(&key).expect("checked readable above");
        (entry.lengths.clone(), entry.sequence_number)
    };

    let mut sources = Vec::with_capacity(lengths.len());
    for i in 0..lengths.len() {
        match guard.fs.open_read(&fs::clean_path(&dir, &key, i)) {
            Ok(file) => sources.push(file),
            Err(_) => {
                debug!(%key, index = i, "clean file missing on get; dropping stale entry");
                guard.entries.remove(&key);
                let _ = guard.journal.append(&BodyRecord::Remove { key: key.clone() });
                guard.redundant_op_count += 1;
                return Ok(None);
            }
        }
    }

    guard.journal.append(&BodyRecord::Read { key: key.clone() })?;
    guard.entries.touch(&key);
    let should_rebuild = {
        guard.redundant_op_count += 1;
        rebuild_due(&guard)
    };
    drop(guard);

    if should_rebuild {
        inner.worker.notify_rebuild();
    }

    Ok(Some(Snapshot::new(
        inner.clone(),
        key,
        sequence_number,
        lengths,
        sources,
    )))
}

pub(crate) fn edit_impl(
    inner: Arc<Inner>,
    key: &str,
    expected_sequence_number: Option<u64>,
) -> Result<Option<Editor>, CacheError> {
    let key = validate_key(key)?.to_string();
    let mut guard = inner.shared.lock();
    ensure_open(&guard)?;

    match guard.entries.get(&key) {
        Some(entry) => {
            if let Some(expected) = expected_sequence_number {
                if entry.sequence_number != expected {
                    return Ok(None);
                }
            }
            if entry.editing {
                return Ok(None);
            }
        }
        None if expected_sequence_number.is_some() => return Ok(None),
        None => {}
    }

    let value_count = guard.value_count;
    let entry = guard
        .entries
        .get_or_insert_with(key.clone(), || Entry::new(value_count));
    entry.editing = true;

    guard.journal.append(&BodyRecord::Dirty { key: key.clone() })?;
    guard.journal.flush()?;
    guard.redundant_op_count += 1;
    let should_rebuild = rebuild_due(&guard);
    drop(guard);

    if should_rebuild {
        inner.worker.notify_rebuild();
    }

    Ok(Some(Editor::new(inner, key, value_count)))
}

fn ensure_open(shared: &Shared) -> Result<(), CacheError> {
    if shared.closed {
        Err(CacheError::illegal_state("cache is closed"))
    } else {
        Ok(())
    }
}

pub(crate) fn rebuild_due(shared: &Shared) -> bool {
    shared.redundant_op_count >= std::cmp::max(2000, shared.entries.len())
}

/// Deletes `key`'s clean files, updates `size`, removes it from the table, and appends a
/// `REMOVE` record. Shared between the public `remove()` and eviction. Returns `Ok(false)`
/// without side effects if the key is absent or currently being edited.
pub(crate) fn remove_locked(shared: &mut Shared, key: &str) -> Result<bool, CacheError> {
    let entry = match shared.entries.get(key) {
        Some(entry) => entry.clone(),
        None => return Ok(false),
    };
    if entry.editing {
        return Ok(false);
    }

    let dir = shared.directory.clone();
    for i in 0..entry.lengths.len() {
        let path = fs::clean_path(&dir, key, i);
        if shared.fs.exists(&path) {
            shared.fs.remove_file(&path)?;
        }
    }

    shared.size = shared.size.saturating_sub(entry.total_len());
    shared.entries.remove(key);
    shared
        .journal
        .append(&BodyRecord::Remove { key: key.to_string() })?;
    shared.redundant_op_count += 1;
    Ok(true)
}

/// Implicit `abort()` for an editor still attached when `close()` runs: deletes dirty files,
/// detaches the editor, and removes the entry (with a `REMOVE` record) if it never became
/// readable. A readable entry under update is left with its previous published values intact.
fn abort_in_flight_locked(shared: &mut Shared, key: &str) {
    let dir = shared.directory.clone();
    let value_count = shared.value_count;
    for i in 0..value_count {
        let _ = fs::remove_if_exists(shared.fs.as_ref(), &fs::dirty_path(&dir, key, i));
    }

    let mut drop_entry = false;
    if let Some(entry) = shared.entries.get_mut(key) {
        entry.editing = false;
        drop_entry = !entry.readable;
    }

    if drop_entry {
        shared.entries.remove(key);
        let _ = shared.journal.append(&BodyRecord::Remove {
            key: key.to_string(),
        });
    }
}

/// While over budget, evicts the least-recently-used entry without an in-flight editor.
/// Stops if no evictable entry remains, which is how a single entry larger than `max_size`
/// ends up never retained (spec §4.5): it is evicted on the very next pass after its own
/// commit, and nothing afterward can make room for it.
pub(crate) fn evict_locked(shared: &mut Shared) {
    while shared.size > shared.max_size {
        match shared.entries.eviction_candidate() {
            Some(key) => {
                debug!(%key, size = shared.size, max_size = shared.max_size, "evicting entry");
                match remove_locked(shared, &key) {
                    Ok(true) => continue,
                    Ok(false) => break,
                    Err(error) => {
                        tracing::warn!(%key, %error, "failed to evict entry; stopping eviction pass");
                        break;
                    }
                }
            }
            None => break,
        }
    }
}

/// Compacts the journal if the redundant-operation threshold has been crossed.
pub(crate) fn maybe_rebuild_locked(shared: &mut Shared) {
    if !rebuild_due(shared) {
        return;
    }
    let dir = shared.directory.clone();
    let fs = shared.fs.clone();
    match shared.journal.rebuild(fs.as_ref(), &dir, &shared.entries) {
        Ok(()) => {
            shared.redundant_op_count = shared.entries.len();
            debug!(entries = shared.entries.len(), "rebuilt journal");
        }
        Err(error) => {
            tracing::warn!(%error, "journal rebuild failed; will retry on next trigger");
        }
    }
}
