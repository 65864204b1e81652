//! Persistent store implementations.
//!
//! - The namespace keeps its live table in memory and appends every delta to
//!   the journal before applying it.
//! - Each shelf is one checksummed file under `shelves/`, replaced atomically.
//! - The catalog is a single checksummed file, replaced atomically.

use std::collections::BTreeMap;
use std::fs;
use std::io::{BufReader, ErrorKind, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, RwLock};

use tracing::{debug, info};

use crate::catalog::Catalog;
use crate::namespace::{Location, PathEntry};
use crate::storage::traits::{
    CatalogStore, NamespaceDelta, NamespaceStore, ShelfData, ShelfStore, StorageError,
};

use super::codec;
use super::file_lock::FileLock;
use super::journal::NamespaceJournal;
use super::PersistentConfig;

/// Journal file name inside the library directory.
pub const JOURNAL_FILE: &str = "namespace.journal";

/// Catalog file name inside the library directory.
pub const CATALOG_FILE: &str = "catalog.bin";

/// Directory holding shelf files.
pub const SHELVES_DIR: &str = "shelves";

/// Shelf file extension.
pub const SHELF_EXTENSION: &str = "shelf";

fn lock_err(context: &'static str) -> StorageError {
    StorageError::BackendError(format!("poisoned lock: {context}"))
}

fn corrupted(path: &Path, err: &std::io::Error) -> StorageError {
    StorageError::Corrupted(format!("{}: {err}", path.display()))
}

/// Writes `bytes` to `path` through a temporary file and rename.
fn write_atomic(path: &Path, bytes: &[u8], sync: bool) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        if sync {
            file.sync_all()?;
        }
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Journal-backed namespace table.
#[derive(Debug)]
pub struct PersistentNamespaceStore {
    journal: NamespaceJournal,
    table: RwLock<BTreeMap<String, PathEntry>>,
    max_journal_size: u64,
}

impl PersistentNamespaceStore {
    /// Opens the journal in `dir` and replays it.
    pub fn open(dir: &Path, config: &PersistentConfig) -> Result<Self, StorageError> {
        let path = dir.join(JOURNAL_FILE);
        let (journal, entries) = NamespaceJournal::open(&path, config.sync_on_write)?;

        let mut table = BTreeMap::new();
        for entry in &entries {
            entry.delta.apply_to(&mut table).map_err(|e| {
                StorageError::Corrupted(format!(
                    "journal entry {} does not replay: {e}",
                    entry.sequence
                ))
            })?;
        }
        debug!(entries = entries.len(), keys = table.len(), "namespace.replay");

        Ok(Self {
            journal,
            table: RwLock::new(table),
            max_journal_size: config.max_journal_size,
        })
    }

    /// Journal size in bytes.
    pub fn journal_size(&self) -> Result<u64, StorageError> {
        Ok(self.journal.size_bytes()?)
    }

    fn rewrite(&self, table: &BTreeMap<String, PathEntry>) -> Result<(), StorageError> {
        let deltas: Vec<_> = table
            .iter()
            .map(|(key, entry)| NamespaceDelta::Put {
                key: key.clone(),
                entry: entry.clone(),
            })
            .collect();
        self.journal.rewrite(&deltas)?;
        Ok(())
    }
}

impl NamespaceStore for PersistentNamespaceStore {
    fn load(&self) -> Result<BTreeMap<String, PathEntry>, StorageError> {
        let table = self.table.read().map_err(|_| lock_err("namespace.load"))?;
        Ok(table.clone())
    }

    fn apply(&self, delta: &NamespaceDelta) -> Result<(), StorageError> {
        let mut table = self.table.write().map_err(|_| lock_err("namespace.apply"))?;
        delta.check(&table)?;
        self.journal.append(delta)?;
        delta.apply_to(&mut table)?;

        let size = self.journal.size_bytes()?;
        if size > self.max_journal_size {
            self.rewrite(&table)?;
            info!(
                before = size,
                after = self.journal.size_bytes()?,
                "namespace.journal.compacted"
            );
        }
        Ok(())
    }

    fn len(&self) -> Result<usize, StorageError> {
        let table = self.table.read().map_err(|_| lock_err("namespace.len"))?;
        Ok(table.len())
    }

    fn compact(&self) -> Result<(), StorageError> {
        let table = self.table.read().map_err(|_| lock_err("namespace.compact"))?;
        self.rewrite(&table)
    }
}

/// One file per shelf under `<root>/shelves/`.
#[derive(Debug)]
pub struct PersistentShelfStore {
    root: PathBuf,
    sync_on_write: bool,
}

impl PersistentShelfStore {
    pub fn open(dir: &Path, config: &PersistentConfig) -> Result<Self, StorageError> {
        let root = dir.join(SHELVES_DIR);
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            sync_on_write: config.sync_on_write,
        })
    }

    /// File backing the shelf at `location`.
    ///
    /// Only plain relative segments are accepted, so a location can never
    /// address a file outside the shelves directory.
    pub fn shelf_file(&self, location: &Location) -> Result<PathBuf, StorageError> {
        let relative = Path::new(location.path());
        let plain = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if !plain {
            return Err(StorageError::BackendError(format!(
                "invalid shelf location '{}'",
                location.path()
            )));
        }
        let mut file = self.root.join(relative);
        let name = match file.file_name() {
            Some(name) => format!("{}.{SHELF_EXTENSION}", name.to_string_lossy()),
            None => {
                return Err(StorageError::BackendError(format!(
                    "invalid shelf location '{}'",
                    location.path()
                )))
            }
        };
        file.set_file_name(name);
        Ok(file)
    }

    /// Removes empty directories between `file` and the shelves root.
    fn prune_dirs(&self, file: &Path) {
        let mut dir = file.parent();
        while let Some(d) = dir {
            if d == self.root || fs::remove_dir(d).is_err() {
                break;
            }
            dir = d.parent();
        }
    }
}

impl ShelfStore for PersistentShelfStore {
    fn load(&self, location: &Location) -> Result<Option<ShelfData>, StorageError> {
        let path = self.shelf_file(location)?;
        let file = match fs::File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let shelf =
            codec::decode_file(&mut BufReader::new(file)).map_err(|e| corrupted(&path, &e))?;
        Ok(Some(shelf))
    }

    fn store(&self, location: &Location, shelf: &ShelfData) -> Result<(), StorageError> {
        let path = self.shelf_file(location)?;
        let bytes = codec::encode_file(shelf)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;
        write_atomic(&path, &bytes, self.sync_on_write)
    }

    fn delete(&self, location: &Location) -> Result<(), StorageError> {
        let path = self.shelf_file(location)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                self.prune_dirs(&path);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// The schema catalog in `<root>/catalog.bin`.
#[derive(Debug)]
pub struct PersistentCatalogStore {
    path: PathBuf,
    sync_on_write: bool,
}

impl PersistentCatalogStore {
    pub fn open(dir: &Path, config: &PersistentConfig) -> Self {
        Self {
            path: dir.join(CATALOG_FILE),
            sync_on_write: config.sync_on_write,
        }
    }
}

impl CatalogStore for PersistentCatalogStore {
    fn load(&self) -> Result<Option<Catalog>, StorageError> {
        let file = match fs::File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let catalog = codec::decode_file(&mut BufReader::new(file))
            .map_err(|e| corrupted(&self.path, &e))?;
        Ok(Some(catalog))
    }

    fn save(&self, catalog: &Catalog) -> Result<(), StorageError> {
        let bytes = codec::encode_file(catalog)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;
        write_atomic(&self.path, &bytes, self.sync_on_write)
    }
}

/// All persistent stores of one library directory, plus its lock.
#[derive(Debug)]
pub struct PersistentStores {
    dir: PathBuf,
    lock: FileLock,
    config: PersistentConfig,
    pub namespace: Arc<PersistentNamespaceStore>,
    pub shelves: Arc<PersistentShelfStore>,
    pub catalog: Arc<PersistentCatalogStore>,
}

impl PersistentStores {
    /// Open or create a library directory.
    pub fn open(dir: &Path, config: PersistentConfig) -> Result<Self, StorageError> {
        fs::create_dir_all(dir)?;

        let lock = FileLock::acquire(dir).map_err(|e| {
            if e.kind() == ErrorKind::WouldBlock {
                StorageError::Locked(e.to_string())
            } else {
                StorageError::Io(e)
            }
        })?;

        let namespace = Arc::new(PersistentNamespaceStore::open(dir, &config)?);
        let shelves = Arc::new(PersistentShelfStore::open(dir, &config)?);
        let catalog = Arc::new(PersistentCatalogStore::open(dir, &config));

        info!(dir = %dir.display(), lock = %lock.path().display(), "storage.open");
        Ok(Self {
            dir: dir.to_path_buf(),
            lock,
            config,
            namespace,
            shelves,
            catalog,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn config(&self) -> &PersistentConfig {
        &self.config
    }

    pub fn lock_path(&self) -> &Path {
        self.lock.path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Record, Value};
    use tempfile::tempdir;

    fn config() -> PersistentConfig {
        PersistentConfig {
            sync_on_write: false,
            ..PersistentConfig::default()
        }
    }

    #[test]
    fn test_namespace_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = PersistentNamespaceStore::open(dir.path(), &config()).unwrap();
            store
                .apply(&NamespaceDelta::Put {
                    key: "a".into(),
                    entry: PathEntry::section("a"),
                })
                .unwrap();
            store
                .apply(&NamespaceDelta::Put {
                    key: "a.b".into(),
                    entry: PathEntry::shelf("a.b"),
                })
                .unwrap();
            store.apply(&NamespaceDelta::Remove { key: "a".into() }).unwrap();
        }
        let store = PersistentNamespaceStore::open(dir.path(), &config()).unwrap();
        let table = store.load().unwrap();
        assert_eq!(table.len(), 1);
        assert!(table.get("a.b").unwrap().is_shelf());
    }

    #[test]
    fn test_rejected_delta_is_not_journaled() {
        let dir = tempdir().unwrap();
        let store = PersistentNamespaceStore::open(dir.path(), &config()).unwrap();
        let before = store.journal_size().unwrap();
        assert!(store.apply(&NamespaceDelta::Remove { key: "x".into() }).is_err());
        assert_eq!(store.journal_size().unwrap(), before);
    }

    #[test]
    fn test_journal_compacts_past_limit() {
        let dir = tempdir().unwrap();
        let cfg = PersistentConfig {
            max_journal_size: PersistentConfig::MIN_JOURNAL_SIZE,
            ..config()
        };
        let store = PersistentNamespaceStore::open(dir.path(), &cfg).unwrap();
        for i in 0..200 {
            let key = format!("k{i}");
            store
                .apply(&NamespaceDelta::Put {
                    key: key.clone(),
                    entry: PathEntry::section(&key),
                })
                .unwrap();
            store.apply(&NamespaceDelta::Remove { key }).unwrap();
        }
        assert!(store.journal_size().unwrap() <= cfg.max_journal_size);
        drop(store);
        let store = PersistentNamespaceStore::open(dir.path(), &cfg).unwrap();
        assert_eq!(store.len().unwrap(), 0);
    }

    #[test]
    fn test_shelf_files() {
        let dir = tempdir().unwrap();
        let store = PersistentShelfStore::open(dir.path(), &config()).unwrap();
        let loc = Location::from_key_path("zoo.animals.rex");
        assert!(store.load(&loc).unwrap().is_none());

        let mut data = Record::new();
        data.insert("name".into(), Value::from("Rex"));
        store.store(&loc, &ShelfData::new(data.clone(), None)).unwrap();

        let file = store.shelf_file(&loc).unwrap();
        assert!(file.ends_with("shelves/zoo/animals/rex.shelf"));
        assert_eq!(store.load(&loc).unwrap().unwrap().data, data);

        store.delete(&loc).unwrap();
        assert!(!file.exists());
        assert!(!dir.path().join(SHELVES_DIR).join("zoo").exists());
        store.delete(&loc).unwrap();
    }

    #[test]
    fn test_shelf_location_cannot_escape_root() {
        let dir = tempdir().unwrap();
        let store = PersistentShelfStore::open(dir.path(), &config()).unwrap();
        let evil = Location::new("../outside", "x").unwrap();
        assert!(store.shelf_file(&evil).is_err());
        let absolute = Location::new("/etc/passwd", "x").unwrap();
        assert!(store.shelf_file(&absolute).is_err());
    }

    #[test]
    fn test_corrupt_shelf_file_reported() {
        let dir = tempdir().unwrap();
        let store = PersistentShelfStore::open(dir.path(), &config()).unwrap();
        let loc = Location::from_key_path("a");
        store.store(&loc, &ShelfData::default()).unwrap();
        let file = store.shelf_file(&loc).unwrap();
        let mut bytes = fs::read(&file).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        fs::write(&file, bytes).unwrap();
        assert!(matches!(store.load(&loc), Err(StorageError::Corrupted(_))));
    }

    #[test]
    fn test_catalog_file() {
        let dir = tempdir().unwrap();
        let store = PersistentCatalogStore::open(dir.path(), &config());
        assert!(store.load().unwrap().is_none());
        let mut catalog = Catalog::new();
        catalog.register_section("a", None, None);
        store.save(&catalog).unwrap();
        assert_eq!(store.load().unwrap(), Some(catalog));
    }

    #[test]
    fn test_second_open_is_locked() {
        let dir = tempdir().unwrap();
        let _first = PersistentStores::open(dir.path(), config()).unwrap();
        let err = PersistentStores::open(dir.path(), config()).unwrap_err();
        assert!(matches!(err, StorageError::Locked(_)));
    }
}
