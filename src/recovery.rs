//! `Cache::open`'s backup-promotion, journal replay, and stale-entry cleanup (spec §4.1/§4.4).
//!
//! Shaped after `disk_v2::Buffer::from_config_inner` (load the ledger, then let the rest of the
//! subsystem pick up where it left off) but specialized to this crate's textual journal: any
//! failure anywhere in replay is fatal and the caller wipes the directory rather than erroring
//! out, matching the Kotlin `DiskLruCache` this spec descends from.

use std::io;
use std::path::Path;

use tracing::{debug, warn};

use crate::entry::{Entry, EntryTable};
use crate::fs::{self, FileSystem};
use crate::journal::{self, BodyRecord, JournalWriter, JOURNAL_BACKUP_FILE, JOURNAL_FILE};

/// Everything recovered from a prior session's journal: the live entry table, the current
/// total size, and the already-open append-mode journal writer.
pub(crate) struct Recovered {
    pub entries: EntryTable,
    pub size: u64,
    pub redundant_op_count: usize,
    pub journal: JournalWriter,
}

/// Runs the full `open` procedure: backup promotion, recovery-or-fresh-start, returning a
/// ready-to-use entry table, size, redundant op count, and journal writer.
pub(crate) fn open(
    fs: &dyn FileSystem,
    dir: &Path,
    app_version: u32,
    value_count: usize,
) -> io::Result<Recovered> {
    fs.create_dir_all(dir)?;

    let journal_path = dir.join(JOURNAL_FILE);
    let backup_path = dir.join(JOURNAL_BACKUP_FILE);

    if fs.exists(&backup_path) {
        if fs.exists(&journal_path) {
            debug!("discarding stale journal backup; current journal is present");
            fs::remove_if_exists(fs, &backup_path)?;
        } else {
            debug!("promoting journal backup to active journal");
            fs.rename(&backup_path, &journal_path)?;
        }
    }

    if fs.exists(&journal_path) {
        match try_recover(fs, dir, app_version, value_count) {
            Ok(recovered) => {
                debug!(entries = recovered.entries.len(), "recovered cache from journal");
                return Ok(recovered);
            }
            Err(reason) => {
                warn!(%reason, "journal recovery failed; wiping cache directory and starting fresh");
                fs::wipe_directory(fs, dir)?;
            }
        }
    }

    let entries = EntryTable::new();
    let mut journal = JournalWriter::create_fresh(fs, dir, app_version, value_count)?;
    journal.rebuild(fs, dir, &entries)?;
    debug!("initialized fresh cache directory");

    Ok(Recovered {
        entries,
        size: 0,
        redundant_op_count: 0,
        journal,
    })
}

/// Why recovery could not proceed; always results in the whole directory being wiped and a
/// fresh cache started, never surfaced to callers.
#[derive(Debug)]
enum RecoveryFailure {
    Journal(journal::JournalError),
    MissingCleanFile { key: String, index: usize },
    Io(io::Error),
}

impl std::fmt::Display for RecoveryFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecoveryFailure::Journal(e) => write!(f, "{e}"),
            RecoveryFailure::MissingCleanFile { key, index } => {
                write!(f, "clean file missing for key {key:?} index {index}")
            }
            RecoveryFailure::Io(e) => write!(f, "{e}"),
        }
    }
}

impl From<journal::JournalError> for RecoveryFailure {
    fn from(e: journal::JournalError) -> Self {
        RecoveryFailure::Journal(e)
    }
}

impl From<io::Error> for RecoveryFailure {
    fn from(e: io::Error) -> Self {
        RecoveryFailure::Io(e)
    }
}

fn try_recover(
    fs: &dyn FileSystem,
    dir: &Path,
    app_version: u32,
    value_count: usize,
) -> Result<Recovered, RecoveryFailure> {
    let journal_path = dir.join(JOURNAL_FILE);
    let parsed = journal::read_journal(fs, &journal_path, app_version, value_count)?;
    let total_records = parsed.records.len();

    let mut entries = EntryTable::new();
    for record in parsed.records {
        match record {
            BodyRecord::Dirty { key } => {
                let entry = entries
                    .get_or_insert_with(key, || Entry::new(value_count));
                entry.editing = true;
            }
            BodyRecord::Clean { key, lengths } => {
                let entry = entries
                    .get_or_insert_with(key, || Entry::new(value_count));
                entry.editing = false;
                entry.readable = true;
                entry.lengths = lengths;
            }
            BodyRecord::Read { key } => {
                entries.touch(&key);
            }
            BodyRecord::Remove { key } => {
                let _ = entries.remove(&key);
            }
        }
    }

    // Clean up dangling DIRTY records: an edit that began but never committed or was removed.
    let dangling: Vec<String> = entries
        .iter()
        .filter(|(_, entry)| entry.editing)
        .map(|(key, _)| key.clone())
        .collect();
    for key in &dangling {
        if let Some(entry) = entries.get(key) {
            for i in 0..entry.lengths.len() {
                fs::remove_if_exists(fs, &fs::clean_path(dir, key, i))?;
                fs::remove_if_exists(fs, &fs::dirty_path(dir, key, i))?;
            }
        }
        entries.remove(key);
    }

    // Verify every readable entry's clean files still exist and recompute total size.
    let mut size = 0u64;
    let readable_keys: Vec<String> = entries
        .iter()
        .filter(|(_, entry)| entry.readable)
        .map(|(key, _)| key.clone())
        .collect();
    for key in &readable_keys {
        let entry = entries.get(key).expect("key came from this table");
        for (i, len) in entry.lengths.iter().enumerate() {
            if !fs.exists(&fs::clean_path(dir, key, i)) {
                return Err(RecoveryFailure::MissingCleanFile {
                    key: key.clone(),
                    index: i,
                });
            }
            size += len;
        }
    }

    let surviving = entries.len();
    let redundant_op_count = total_records.saturating_sub(surviving);

    let mut writer = JournalWriter::open_append(fs, dir, app_version, value_count)?;
    let redundant_op_count = if parsed.truncated_tail {
        debug!("journal ended mid-record; rebuilding before resuming");
        writer.rebuild(fs, dir, &entries)?;
        entries.len()
    } else {
        redundant_op_count
    };

    Ok(Recovered {
        entries,
        size,
        redundant_op_count,
        journal: writer,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::StdFileSystem;
    use crate::journal::JournalWriter;

    #[test]
    fn fresh_open_creates_empty_journal() {
        let dir = tempfile::tempdir().unwrap();
        let recovered = open(&StdFileSystem, dir.path(), 1, 2).unwrap();
        assert_eq!(recovered.entries.len(), 0);
        assert_eq!(recovered.size, 0);
    }

    #[test]
    fn replays_dirty_then_clean_as_readable() {
        let dir = tempfile::tempdir().unwrap();
        let fs = StdFileSystem;
        std::fs::write(dir.path().join("k1.0"), b"abc").unwrap();
        std::fs::write(dir.path().join("k1.1"), b"de").unwrap();

        let mut writer = JournalWriter::create_fresh(&fs, dir.path(), 1, 2).unwrap();
        writer
            .append(&BodyRecord::Dirty {
                key: "k1".to_string(),
            })
            .unwrap();
        writer
            .append(&BodyRecord::Clean {
                key: "k1".to_string(),
                lengths: vec![3, 2],
            })
            .unwrap();
        writer.flush().unwrap();
        drop(writer);

        let recovered = open(&fs, dir.path(), 1, 2).unwrap();
        assert_eq!(recovered.entries.len(), 1);
        assert_eq!(recovered.size, 5);
        let entry = recovered.entries.get("k1").unwrap();
        assert!(entry.readable);
        assert_eq!(entry.lengths, vec![3, 2]);
    }

    #[test]
    fn dangling_dirty_is_cleaned_up() {
        let dir = tempfile::tempdir().unwrap();
        let fs = StdFileSystem;
        std::fs::write(dir.path().join("k1.0.tmp"), b"ab").unwrap();

        let mut writer = JournalWriter::create_fresh(&fs, dir.path(), 1, 1).unwrap();
        writer
            .append(&BodyRecord::Dirty {
                key: "k1".to_string(),
            })
            .unwrap();
        writer.flush().unwrap();
        drop(writer);

        let recovered = open(&fs, dir.path(), 1, 1).unwrap();
        assert_eq!(recovered.entries.len(), 0);
        assert!(!dir.path().join("k1.0.tmp").exists());
    }

    #[test]
    fn missing_clean_file_wipes_and_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let fs = StdFileSystem;
        // No k1.0 written to disk, but journal claims it is readable.
        let mut writer = JournalWriter::create_fresh(&fs, dir.path(), 1, 1).unwrap();
        writer
            .append(&BodyRecord::Clean {
                key: "k1".to_string(),
                lengths: vec![3],
            })
            .unwrap();
        writer.flush().unwrap();
        drop(writer);

        let recovered = open(&fs, dir.path(), 1, 1).unwrap();
        assert_eq!(recovered.entries.len(), 0);
    }

    #[test]
    fn backup_promoted_when_journal_missing() {
        let dir = tempfile::tempdir().unwrap();
        let fs = StdFileSystem;
        let mut writer = JournalWriter::create_fresh(&fs, dir.path(), 1, 1).unwrap();
        writer
            .append(&BodyRecord::Clean {
                key: "k1".to_string(),
                lengths: vec![0],
            })
            .unwrap();
        writer.flush().unwrap();
        drop(writer);
        std::fs::write(dir.path().join("k1.0"), b"").unwrap();

        std::fs::rename(
            dir.path().join(JOURNAL_FILE),
            dir.path().join(JOURNAL_BACKUP_FILE),
        )
        .unwrap();

        let recovered = open(&fs, dir.path(), 1, 1).unwrap();
        assert_eq!(recovered.entries.len(), 1);
        assert!(dir.path().join(JOURNAL_FILE).exists());
        assert!(!dir.path().join(JOURNAL_BACKUP_FILE).exists());
    }

    #[test]
    fn backup_discarded_when_both_journal_and_backup_present() {
        let dir = tempfile::tempdir().unwrap();
        let fs = StdFileSystem;
        let mut writer = JournalWriter::create_fresh(&fs, dir.path(), 1, 1).unwrap();
        writer.flush().unwrap();
        drop(writer);
        std::fs::write(dir.path().join(JOURNAL_BACKUP_FILE), b"stale").unwrap();

        let recovered = open(&fs, dir.path(), 1, 1).unwrap();
        assert_eq!(recovered.entries.len(), 0);
        assert!(!dir.path().join(JOURNAL_BACKUP_FILE).exists());
    }
}
