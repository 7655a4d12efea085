//! The append-only journal: header writer, body-line reader, append sink, and the
//! rebuild-via-rename procedure (spec §4.2).
//!
//! Grounded on `disk_v2::ledger.rs` for the "owns an open writer plus the on-disk header"
//! shape, and on `vrift-vdird/src/journal.rs` for the rename-based atomic swap used by rebuild
//! (`fs::rename(&temp_path, &self.path)` there becomes `journal.tmp` → `journal` here).

pub(crate) mod record;

use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use crate::entry::EntryTable;
use crate::fs::FileSystem;

pub(crate) use record::{BodyRecord, JournalError};

pub(crate) const JOURNAL_FILE: &str = "journal";
pub(crate) const JOURNAL_BACKUP_FILE: &str = "journal.bkp";
pub(crate) const JOURNAL_TMP_FILE: &str = "journal.tmp";

/// Every body record successfully parsed out of an on-disk journal, plus whether the file
/// ended on a clean (`\n`-terminated) boundary.
pub(crate) struct ParsedJournal {
    pub records: Vec<BodyRecord>,
    pub truncated_tail: bool,
}

/// Reads and parses an entire journal file: the 5-line header, then as many complete body
/// lines as are present. A final, unterminated line is reported via `truncated_tail` rather
/// than treated as a parse error (spec §4.2); everything else wrong is a [`JournalError`].
pub(crate) fn read_journal(
    fs: &dyn FileSystem,
    path: &Path,
    app_version: u32,
    value_count: usize,
) -> Result<ParsedJournal, JournalError> {
    let file = fs
        .open_read(path)
        .map_err(|_| JournalError::UnexpectedEof)?;
    let mut reader = BufReader::new(file);

    let mut header_lines = Vec::with_capacity(5);
    for _ in 0..5 {
        let mut line = String::new();
        let n = reader
            .read_line(&mut line)
            .map_err(|_| JournalError::UnexpectedEof)?;
        if n == 0 {
            return Err(JournalError::UnexpectedEof);
        }
        if !line.ends_with('\n') {
            return Err(JournalError::UnexpectedEof);
        }
        line.truncate(line.len() - 1);
        header_lines.push(line);
    }
    record::parse_header(&header_lines, app_version, value_count)?;

    let mut records = Vec::new();
    let mut truncated_tail = false;
    loop {
        let mut line = String::new();
        let n = reader
            .read_line(&mut line)
            .map_err(|_| JournalError::MalformedRecord {
                line: String::new(),
            })?;
        if n == 0 {
            break;
        }
        if !line.ends_with('\n') {
            // A trailing partial record: discard it, note that the journal needs a rebuild,
            // and stop reading (there is nothing valid after it).
            truncated_tail = true;
            break;
        }
        line.truncate(line.len() - 1);
        let parsed = record::parse_body_line(&line, value_count)?;
        records.push(parsed);
    }

    Ok(ParsedJournal {
        records,
        truncated_tail,
    })
}

/// An open append sink over the active journal file, plus the header parameters needed to
/// recreate it during a rebuild.
pub(crate) struct JournalWriter {
    path: PathBuf,
    app_version: u32,
    value_count: usize,
    writer: Box<dyn Write + Send>,
}

impl JournalWriter {
    /// Opens (creating if absent) `dir/journal` for appending.
    pub fn open_append(
        fs: &dyn FileSystem,
        dir: &Path,
        app_version: u32,
        value_count: usize,
    ) -> io::Result<Self> {
        let path = dir.join(JOURNAL_FILE);
        let file = fs.open_append(&path)?;
        Ok(JournalWriter {
            path,
            app_version,
            value_count,
            writer: Box::new(file),
        })
    }

    /// Writes a fresh header-only journal at `dir/journal`, then opens it for appending.
    /// Used on a cold start with no prior journal to recover.
    pub fn create_fresh(
        fs: &dyn FileSystem,
        dir: &Path,
        app_version: u32,
        value_count: usize,
    ) -> io::Result<Self> {
        let path = dir.join(JOURNAL_FILE);
        let mut file = fs.create_file(&path)?;
        file.write_all(record::format_header(app_version, value_count).as_bytes())?;
        file.flush()?;
        drop(file);
        Self::open_append(fs, dir, app_version, value_count)
    }

    pub fn append(&mut self, record: &BodyRecord) -> io::Result<()> {
        self.writer
            .write_all(record::format_body_line(record).as_bytes())
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    /// Replaces the journal with a compacted equivalent containing one record per entry,
    /// following the rename dance documented in spec §4.2: write `journal.tmp`, promote the
    /// current journal to `journal.bkp`, rename the tmp file into place, delete the backup.
    pub fn rebuild(&mut self, fs: &dyn FileSystem, dir: &Path, entries: &EntryTable) -> io::Result<()> {
        let tmp_path = dir.join(JOURNAL_TMP_FILE);
        let bkp_path = dir.join(JOURNAL_BACKUP_FILE);

        {
            let mut tmp = fs.create_file(&tmp_path)?;
            tmp.write_all(record::format_header(self.app_version, self.value_count).as_bytes())?;
            for (key, entry) in entries.iter() {
                let record = if entry.readable {
                    BodyRecord::Clean {
                        key: key.clone(),
                        lengths: entry.lengths.clone(),
                    }
                } else {
                    BodyRecord::Dirty { key: key.clone() }
                };
                tmp.write_all(record::format_body_line(&record).as_bytes())?;
            }
            tmp.flush()?;
        }

        if fs.exists(&self.path) {
            fs.rename(&self.path, &bkp_path)?;
        }
        fs.rename(&tmp_path, &self.path)?;
        crate::fs::remove_if_exists(fs, &bkp_path)?;

        *self = Self::open_append(fs, dir, self.app_version, self.value_count)?;
        Ok(())
    }
}

impl std::fmt::Debug for JournalWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JournalWriter")
            .field("path", &self.path)
            .field("app_version", &self.app_version)
            .field("value_count", &self.value_count)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::Entry;
    use crate::fs::StdFileSystem;

    #[test]
    fn fresh_journal_round_trips_through_read_journal() {
        let dir = tempfile::tempdir().unwrap();
        let fs = StdFileSystem;
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

        let parsed = read_journal(&fs, &dir.path().join(JOURNAL_FILE), 1, 2).unwrap();
        assert!(!parsed.truncated_tail);
        assert_eq!(
            parsed.records,
            vec![
                BodyRecord::Dirty {
                    key: "k1".to_string()
                },
                BodyRecord::Clean {
                    key: "k1".to_string(),
                    lengths: vec![3, 2]
                },
            ]
        );
    }

    #[test]
    fn truncated_tail_is_reported_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let fs = StdFileSystem;
        let path = dir.path().join(JOURNAL_FILE);
        std::fs::write(
            &path,
            format!(
                "{}\nDIRTY k1\nCLEAN k1 1 2",
                record::format_header(1, 2).trim_end_matches('\n')
            ),
        )
        .unwrap();

        let parsed = read_journal(&fs, &path, 1, 2).unwrap();
        assert!(parsed.truncated_tail);
        assert_eq!(
            parsed.records,
            vec![BodyRecord::Dirty {
                key: "k1".to_string()
            }]
        );
    }

    #[test]
    fn rebuild_compacts_to_one_record_per_entry() {
        let dir = tempfile::tempdir().unwrap();
        let fs = StdFileSystem;
        let mut writer = JournalWriter::create_fresh(&fs, dir.path(), 1, 1).unwrap();
        writer
            .append(&BodyRecord::Dirty {
                key: "k1".to_string(),
            })
            .unwrap();
        writer
            .append(&BodyRecord::Clean {
                key: "k1".to_string(),
                lengths: vec![5],
            })
            .unwrap();
        writer.flush().unwrap();

        let mut entries = EntryTable::new();
        let mut entry = Entry::new(1);
        entry.readable = true;
        entry.lengths = vec![5];
        entries.insert_new("k1".to_string(), entry);

        writer.rebuild(&fs, dir.path(), &entries).unwrap();
        assert!(!fs.exists(&dir.path().join(JOURNAL_BACKUP_FILE)));

        let parsed = read_journal(&fs, &dir.path().join(JOURNAL_FILE), 1, 1).unwrap();
        assert_eq!(
            parsed.records,
            vec![BodyRecord::Clean {
                key: "k1".to_string(),
                lengths: vec![5]
            }]
        );
    }
}
