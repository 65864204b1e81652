//! Persistent storage backend for HyllaDB.
//!
//! A library directory holds:
//!
//! ```text
//! <dir>/
//!   .lock               exclusive single-process lock
//!   namespace.journal   append-only namespace deltas (replayed on open)
//!   catalog.bin         schema bindings and section metadata
//!   shelves/<a>/<b>.shelf   one checksummed file per shelf
//! ```

mod codec;
mod file_lock;
mod journal;
mod stores;

pub use file_lock::{FileLock, LOCK_FILE};
pub use journal::{JournalEntry, NamespaceJournal};
pub use stores::{
    PersistentCatalogStore, PersistentNamespaceStore, PersistentShelfStore, PersistentStores,
    CATALOG_FILE, JOURNAL_FILE, SHELF_EXTENSION, SHELVES_DIR,
};

use std::path::Path;

use crate::error::{HyllaResult, ValidationError};

/// Configuration for persistent storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistentConfig {
    /// Whether to fsync after every write (slower but safer).
    pub sync_on_write: bool,
    /// Journal size that triggers compaction (bytes).
    pub max_journal_size: u64,
    /// Whether closing the library compacts the journal.
    pub compact_on_close: bool,
}

impl Default for PersistentConfig {
    fn default() -> Self {
        Self {
            sync_on_write: true,
            max_journal_size: 16 * 1024 * 1024, // 16 MiB
            compact_on_close: true,
        }
    }
}

impl PersistentConfig {
    /// Smallest accepted journal limit; avoids compacting on every write.
    pub const MIN_JOURNAL_SIZE: u64 = 4 * 1024;

    pub fn validate(self) -> HyllaResult<Self> {
        if self.max_journal_size < Self::MIN_JOURNAL_SIZE {
            return Err(ValidationError::invalid_field(
                "max_journal_size",
                format!(
                    "must be at least {} bytes (got {})",
                    Self::MIN_JOURNAL_SIZE,
                    self.max_journal_size
                ),
            )
            .into());
        }
        Ok(self)
    }
}

/// Opens or creates the stores of a library directory.
///
/// # Errors
/// - If the configuration is invalid
/// - If the directory cannot be created or accessed
/// - If another handle holds the lock
/// - If the journal or catalog is corrupted
pub fn open_stores(
    path: impl AsRef<Path>,
    config: Option<PersistentConfig>,
) -> HyllaResult<PersistentStores> {
    let cfg = config.unwrap_or_default().validate()?;
    Ok(PersistentStores::open(path.as_ref(), cfg)?)
}
