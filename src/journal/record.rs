//! Textual journal record shapes and their parse/format routines.
//!
//! The teacher's own record type (`variants/disk_v2::record::Record`) is a binary,
//! CRC32C-checksummed, zero-copy `rkyv` archive; this crate's journal has no checksum field and
//! is meant to be human-readable, per spec §6, so the record shape here is a plain enum over
//! owned `String`s rather than an archived struct, but the division of labor (one module owning
//! "is this byte sequence a valid record, and what does it mean") mirrors `variants/disk_v2::record`
//! directly.

use std::fmt;

pub(crate) const MAGIC: &str = "libcore.io.DiskLruCache";
pub(crate) const FORMAT_VERSION: &str = "1";

const DIRTY: &str = "DIRTY";
const CLEAN: &str = "CLEAN";
const REMOVE: &str = "REMOVE";
const READ: &str = "READ";

/// A single parsed body record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum BodyRecord {
    Dirty { key: String },
    Clean { key: String, lengths: Vec<u64> },
    Remove { key: String },
    Read { key: String },
}

/// Why a journal could not be parsed. Every variant here is fatal to recovery and causes the
/// cache directory to be wiped and recreated fresh (spec §4.1/§4.4); none of these are ever
/// surfaced through [`crate::error::CacheError`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum JournalError {
    HeaderMismatch { field: &'static str },
    UnexpectedEof,
    MalformedRecord { line: String },
    MissingCleanFile { key: String, index: usize },
    DanglingClean { key: String },
}

impl fmt::Display for JournalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JournalError::HeaderMismatch { field } => {
                write!(f, "journal header field {field:?} did not match")
            }
            JournalError::UnexpectedEof => write!(f, "journal ended before the header completed"),
            JournalError::MalformedRecord { line } => {
                write!(f, "malformed journal record: {line:?}")
            }
            JournalError::MissingCleanFile { key, index } => {
                write!(f, "clean file missing for key {key:?} index {index}")
            }
            JournalError::DanglingClean { key } => {
                write!(f, "CLEAN record for {key:?} could not be parsed")
            }
        }
    }
}

impl std::error::Error for JournalError {}

/// Formats the 5-line journal header.
pub(crate) fn format_header(app_version: u32, value_count: usize) -> String {
    format!("{MAGIC}\n{FORMAT_VERSION}\n{app_version}\n{value_count}\n\n")
}

/// Parses the 5 header lines, failing if any field mismatches the expected `app_version` /
/// `value_count`, or if the fifth line is non-empty.
pub(crate) fn parse_header(
    lines: &[String],
    expected_app_version: u32,
    expected_value_count: usize,
) -> Result<(), JournalError> {
    if lines.len() < 5 {
        return Err(JournalError::UnexpectedEof);
    }

    if lines[0] != MAGIC {
        return Err(JournalError::HeaderMismatch { field: "magic" });
    }
    if lines[1] != FORMAT_VERSION {
        return Err(JournalError::HeaderMismatch { field: "version" });
    }

    let app_version: u32 = lines[2]
        .parse()
        .map_err(|_| JournalError::HeaderMismatch {
            field: "app_version",
        })?;
    if app_version != expected_app_version {
        return Err(JournalError::HeaderMismatch {
            field: "app_version",
        });
    }

    let value_count: usize = lines[3]
        .parse()
        .map_err(|_| JournalError::HeaderMismatch {
            field: "value_count",
        })?;
    if value_count != expected_value_count {
        return Err(JournalError::HeaderMismatch {
            field: "value_count",
        });
    }

    if !lines[4].is_empty() {
        return Err(JournalError::HeaderMismatch { field: "blank_line" });
    }

    Ok(())
}

/// Parses one terminated body line (without its trailing `\n`) into a [`BodyRecord`].
pub(crate) fn parse_body_line(
    line: &str,
    value_count: usize,
) -> Result<BodyRecord, JournalError> {
    let mut parts = line.split(' ');
    let tag = parts.next().ok_or_else(|| JournalError::MalformedRecord {
        line: line.to_string(),
    })?;

    let malformed = || JournalError::MalformedRecord {
        line: line.to_string(),
    };

    match tag {
        DIRTY => {
            let key = parts.next().ok_or_else(malformed)?.to_string();
            if parts.next().is_some() {
                return Err(malformed());
            }
            Ok(BodyRecord::Dirty { key })
        }
        REMOVE => {
            let key = parts.next().ok_or_else(malformed)?.to_string();
            if parts.next().is_some() {
                return Err(malformed());
            }
            Ok(BodyRecord::Remove { key })
        }
        READ => {
            let key = parts.next().ok_or_else(malformed)?.to_string();
            if parts.next().is_some() {
                return Err(malformed());
            }
            Ok(BodyRecord::Read { key })
        }
        CLEAN => {
            let key = parts.next().ok_or_else(malformed)?.to_string();
            let lengths: Result<Vec<u64>, _> = parts.map(|token| token.parse::<u64>()).collect();
            let lengths = lengths.map_err(|_| malformed())?;
            if lengths.len() != value_count {
                return Err(malformed());
            }
            Ok(BodyRecord::Clean { key, lengths })
        }
        _ => Err(malformed()),
    }
}

/// Formats a body record's line, including the trailing `\n`.
pub(crate) fn format_body_line(record: &BodyRecord) -> String {
    match record {
        BodyRecord::Dirty { key } => format!("{DIRTY} {key}\n"),
        BodyRecord::Remove { key } => format!("{REMOVE} {key}\n"),
        BodyRecord::Read { key } => format!("{READ} {key}\n"),
        BodyRecord::Clean { key, lengths } => {
            let mut line = format!("{CLEAN} {key}");
            for len in lengths {
                line.push(' ');
                line.push_str(&len.to_string());
            }
            line.push('\n');
            line
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips() {
        let header = format_header(7, 2);
        let lines: Vec<String> = header.lines().map(str::to_string).collect();
        assert!(parse_header(&lines, 7, 2).is_ok());
    }

    #[test]
    fn header_rejects_app_version_mismatch() {
        let header = format_header(7, 2);
        let lines: Vec<String> = header.lines().map(str::to_string).collect();
        assert_eq!(
            parse_header(&lines, 8, 2),
            Err(JournalError::HeaderMismatch {
                field: "app_version"
            })
        );
    }

    #[test]
    fn header_rejects_non_blank_fifth_line() {
        let mut lines: Vec<String> = format_header(1, 1).lines().map(str::to_string).collect();
        lines[4] = "not blank".to_string();
        assert!(parse_header(&lines, 1, 1).is_err());
    }

    #[test]
    fn dirty_round_trips() {
        let rec = BodyRecord::Dirty {
            key: "k1".to_string(),
        };
        let line = format_body_line(&rec);
        assert_eq!(line, "DIRTY k1\n");
        let parsed = parse_body_line(line.trim_end_matches('\n'), 2).unwrap();
        assert_eq!(parsed, rec);
    }

    #[test]
    fn clean_round_trips_with_lengths() {
        let rec = BodyRecord::Clean {
            key: "k1".to_string(),
            lengths: vec![3, 2],
        };
        let line = format_body_line(&rec);
        assert_eq!(line, "CLEAN k1 3 2\n");
        let parsed = parse_body_line(line.trim_end_matches('\n'), 2).unwrap();
        assert_eq!(parsed, rec);
    }

    #[test]
    fn clean_rejects_wrong_arity() {
        assert!(parse_body_line("CLEAN k1 3", 2).is_err());
        assert!(parse_body_line("CLEAN k1 3 2 1", 2).is_err());
    }

    #[test]
    fn rejects_unknown_tag() {
        assert!(parse_body_line("BOGUS k1", 1).is_err());
    }

    #[test]
    fn rejects_missing_key() {
        assert!(parse_body_line("DIRTY", 1).is_err());
        assert!(parse_body_line("READ", 1).is_err());
    }
}
