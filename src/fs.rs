//! The filesystem facet (§2 of the spec): everything the rest of the crate needs from the
//! local filesystem, behind a small trait so the seam is explicit even though, unlike the
//! teacher's `disk_v2::io::Filesystem`, there is only ever one implementation in this crate
//! (no async runtime to abstract over, no test double needed beyond a real temp directory).

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// Generalized interface for the handful of filesystem operations the cache relies on:
/// create/open for read or append, atomic rename, delete, and length queries.
pub trait FileSystem: fmt::Debug + Send + Sync {
    /// Creates `path`'s parent directories if they don't already exist.
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Creates (or truncates) `path` for writing from the start.
    fn create_file(&self, path: &Path) -> io::Result<File>;

    /// Opens `path` for sequential reading.
    fn open_read(&self, path: &Path) -> io::Result<File>;

    /// Opens `path` for appending, creating it if it does not exist.
    fn open_append(&self, path: &Path) -> io::Result<File>;

    /// Atomically renames `from` to `to`, replacing `to` if it exists.
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Deletes `path`.
    fn remove_file(&self, path: &Path) -> io::Result<()>;

    /// Returns the length of `path` in bytes.
    fn file_len(&self, path: &Path) -> io::Result<u64>;

    /// Returns whether `path` currently exists.
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    /// Lists the immediate contents of `dir`, non-recursively.
    fn read_dir(&self, dir: &Path) -> io::Result<Vec<PathBuf>>;
}

/// The only [`FileSystem`] implementation this crate ships: a direct pass-through to
/// `std::fs`. Atomic publication (commit's dirty→clean rename) relies on this
/// implementation's `rename` being atomic within a single directory, which holds for the
/// POSIX filesystems this crate targets (see `DESIGN.md`).
#[derive(Clone, Copy, Debug, Default)]
pub struct StdFileSystem;

impl FileSystem for StdFileSystem {
    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn create_file(&self, path: &Path) -> io::Result<File> {
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
    }

    fn open_read(&self, path: &Path) -> io::Result<File> {
        File::open(path)
    }

    fn open_append(&self, path: &Path) -> io::Result<File> {
        OpenOptions::new().append(true).create(true).open(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn file_len(&self, path: &Path) -> io::Result<u64> {
        Ok(fs::metadata(path)?.len())
    }

    fn read_dir(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        fs::read_dir(dir)?
            .map(|entry| entry.map(|e| e.path()))
            .collect()
    }
}

/// Removes `path` if it exists, treating a missing file as success rather than an error.
///
/// Several call sites (editor abort, entry removal, close-time cleanup) want "delete this if
/// it's there" rather than "delete this, which must be there".
pub(crate) fn remove_if_exists(fs: &dyn FileSystem, path: &Path) -> io::Result<()> {
    match fs.remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Path of the clean (authoritative) value file for `(key, index)`.
pub(crate) fn clean_path(dir: &Path, key: &str, index: usize) -> std::path::PathBuf {
    dir.join(format!("{key}.{index}"))
}

/// Path of the dirty (staging) value file for `(key, index)`.
pub(crate) fn dirty_path(dir: &Path, key: &str, index: usize) -> std::path::PathBuf {
    dir.join(format!("{key}.{index}.tmp"))
}

/// Deletes every entry directly inside `dir` (used when recovery detects corruption and the
/// whole cache directory must be wiped and recreated fresh). Non-recursive: this crate never
/// creates subdirectories inside a cache directory.
pub(crate) fn wipe_directory(fs: &dyn FileSystem, dir: &Path) -> io::Result<()> {
    for path in fs.read_dir(dir)? {
        if path.is_dir() {
            fs::remove_dir_all(&path)?;
        } else {
            remove_if_exists(fs, &path)?;
        }
    }
    Ok(())
}
