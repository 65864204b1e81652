//! Append-only namespace journal.
//!
//! Every namespace mutation is appended as a [`JournalEntry`] and made
//! durable before the in-memory namespace changes. The live table is rebuilt
//! by replaying the journal when a library opens.
//!
//! # File Format
//! ```text
//! [MAGIC: 4 bytes][VERSION: 1 byte]
//! [ENTRY 1: codec-encoded JournalEntry]
//! [ENTRY 2: codec-encoded JournalEntry]
//! ...
//! ```
//!
//! A torn tail (a crash in the middle of an append) is cut off on open;
//! replay stops at the last complete entry.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Error as IoError, ErrorKind, Result as IoResult, Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::storage::NamespaceDelta;

use super::codec;

/// A single entry in the namespace journal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Monotonically increasing sequence number.
    pub sequence: u64,
    /// When this entry was written.
    pub timestamp: DateTime<Utc>,
    /// The namespace change.
    pub delta: NamespaceDelta,
}

struct JournalWriter {
    writer: BufWriter<File>,
    sequence: u64,
}

/// Append-only journal of namespace deltas.
///
/// Thread-safe via internal mutex.
pub struct NamespaceJournal {
    path: PathBuf,
    state: Mutex<JournalWriter>,
    sync_on_write: bool,
}

impl std::fmt::Debug for NamespaceJournal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamespaceJournal")
            .field("path", &self.path)
            .field("sync_on_write", &self.sync_on_write)
            .finish_non_exhaustive()
    }
}

impl NamespaceJournal {
    /// Opens or creates a journal, returning it with every complete entry.
    pub fn open(path: &Path, sync_on_write: bool) -> IoResult<(Self, Vec<JournalEntry>)> {
        let exists = path.exists() && fs::metadata(path)?.len() > 0;

        let entries = if exists {
            let (entries, valid_len) = Self::replay(path)?;
            let file_len = fs::metadata(path)?.len();
            if valid_len < file_len {
                warn!(
                    path = %path.display(),
                    valid_len,
                    file_len,
                    "namespace.journal.torn_tail"
                );
                let file = OpenOptions::new().write(true).open(path)?;
                file.set_len(valid_len)?;
                file.sync_all()?;
            }
            entries
        } else {
            let mut file = File::create(path)?;
            codec::write_header(&mut file)?;
            if sync_on_write {
                file.sync_all()?;
            }
            Vec::new()
        };

        let sequence = entries.last().map_or(0, |e| e.sequence);
        let file = OpenOptions::new().append(true).open(path)?;
        debug!(path = %path.display(), entries = entries.len(), sequence, "namespace.journal.open");

        let journal = Self {
            path: path.to_path_buf(),
            state: Mutex::new(JournalWriter {
                writer: BufWriter::new(file),
                sequence,
            }),
            sync_on_write,
        };
        Ok((journal, entries))
    }

    fn lock(&self) -> IoResult<MutexGuard<'_, JournalWriter>> {
        self.state
            .lock()
            .map_err(|_| IoError::new(ErrorKind::Other, "namespace journal lock poisoned"))
    }

    /// Appends a delta, returning its sequence number.
    pub fn append(&self, delta: &NamespaceDelta) -> IoResult<u64> {
        let mut state = self.lock()?;
        let candidate = state.sequence + 1;
        let entry = JournalEntry {
            sequence: candidate,
            timestamp: Utc::now(),
            delta: delta.clone(),
        };
        let encoded = codec::encode(&entry)?;

        state.writer.write_all(&encoded)?;
        state.writer.flush()?;
        if self.sync_on_write {
            state.writer.get_ref().sync_all()?;
        }
        state.sequence = candidate;
        Ok(candidate)
    }

    /// Sequence number of the last entry.
    pub fn current_sequence(&self) -> IoResult<u64> {
        Ok(self.lock()?.sequence)
    }

    /// Journal size in bytes.
    pub fn size_bytes(&self) -> IoResult<u64> {
        Ok(fs::metadata(&self.path)?.len())
    }

    /// Replaces the journal with `deltas`, via a temporary file and rename.
    pub fn rewrite<'a>(
        &self,
        deltas: impl IntoIterator<Item = &'a NamespaceDelta>,
    ) -> IoResult<()> {
        let mut state = self.lock()?;
        state.writer.flush()?;

        let tmp_path = self.path.with_extension("journal.tmp");
        let mut written = 0u64;
        {
            let mut tmp = BufWriter::new(File::create(&tmp_path)?);
            codec::write_header(&mut tmp)?;
            for delta in deltas {
                written += 1;
                let entry = JournalEntry {
                    sequence: written,
                    timestamp: Utc::now(),
                    delta: delta.clone(),
                };
                tmp.write_all(&codec::encode(&entry)?)?;
            }
            tmp.flush()?;
            tmp.get_ref().sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;

        let file = OpenOptions::new().append(true).open(&self.path)?;
        state.writer = BufWriter::new(file);
        state.sequence = written;
        debug!(path = %self.path.display(), entries = written, "namespace.journal.rewrite");
        Ok(())
    }

    /// Reads every complete entry and the byte length they cover.
    fn replay(path: &Path) -> IoResult<(Vec<JournalEntry>, u64)> {
        let mut reader = BufReader::new(File::open(path)?);
        codec::read_header(&mut reader)?;

        let mut entries = Vec::new();
        let mut valid_len = reader.stream_position()?;
        loop {
            match codec::decode::<JournalEntry>(&mut reader) {
                Ok(entry) => {
                    let expected = entries.last().map_or(1, |e: &JournalEntry| e.sequence + 1);
                    if entry.sequence != expected {
                        warn!(sequence = entry.sequence, "namespace.journal.sequence_gap");
                        break;
                    }
                    entries.push(entry);
                    valid_len = reader.stream_position()?;
                }
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
                Err(e) if e.kind() == ErrorKind::InvalidData => {
                    warn!(
                        after_sequence = entries.len(),
                        error = %e,
                        "namespace.journal.corrupt_entry"
                    );
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        Ok((entries, valid_len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespace::PathEntry;
    use tempfile::tempdir;

    fn put(key: &str) -> NamespaceDelta {
        NamespaceDelta::Put {
            key: key.into(),
            entry: PathEntry::section(key),
        }
    }

    #[test]
    fn test_append_and_replay() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("namespace.journal");

        let (journal, entries) = NamespaceJournal::open(&path, false).unwrap();
        assert!(entries.is_empty());
        journal.append(&put("a")).unwrap();
        journal.append(&NamespaceDelta::Remove { key: "a".into() }).unwrap();
        assert_eq!(journal.current_sequence().unwrap(), 2);
        drop(journal);

        let (journal, entries) = NamespaceJournal::open(&path, false).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].sequence, 1);
        assert_eq!(entries[0].delta, put("a"));
        assert_eq!(journal.current_sequence().unwrap(), 2);
    }

    #[test]
    fn test_torn_tail_is_truncated() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("namespace.journal");
        {
            let (journal, _) = NamespaceJournal::open(&path, true).unwrap();
            journal.append(&put("a")).unwrap();
            journal.append(&put("b")).unwrap();
        }
        let full = fs::metadata(&path).unwrap().len();
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(full - 3).unwrap();
        drop(file);

        let (journal, entries) = NamespaceJournal::open(&path, true).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(journal.current_sequence().unwrap(), 1);

        // Appends after recovery land after the last good entry.
        journal.append(&put("c")).unwrap();
        drop(journal);
        let (_, entries) = NamespaceJournal::open(&path, true).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].delta, put("c"));
    }

    #[test]
    fn test_rewrite_compacts() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("namespace.journal");
        let (journal, _) = NamespaceJournal::open(&path, false).unwrap();
        for key in ["a", "b", "c"] {
            journal.append(&put(key)).unwrap();
        }
        journal.append(&NamespaceDelta::Clear).unwrap();
        let before = journal.size_bytes().unwrap();

        let live = [put("z")];
        journal.rewrite(live.iter()).unwrap();
        assert!(journal.size_bytes().unwrap() < before);
        assert_eq!(journal.current_sequence().unwrap(), 1);
        journal.append(&put("y")).unwrap();
        drop(journal);

        let (_, entries) = NamespaceJournal::open(&path, false).unwrap();
        let keys: Vec<_> = entries
            .iter()
            .map(|e| match &e.delta {
                NamespaceDelta::Put { key, .. } => key.as_str(),
                _ => "?",
            })
            .collect();
        assert_eq!(keys, vec!["z", "y"]);
    }

    #[test]
    fn test_rejects_foreign_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("namespace.journal");
        fs::write(&path, b"not a journal").unwrap();
        assert!(NamespaceJournal::open(&path, false).is_err());
    }
}
