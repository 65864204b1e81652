//! The path namespace.
//!
//! [`PathMap`] is the in-memory registry of every section and shelf in a
//! library, keyed by dotted path. It is loaded once when the library opens
//! and mutated only through [`add`](PathMap::add), [`update`](PathMap::update)
//! and [`remove`](PathMap::remove). Each mutation is persisted through the
//! [`NamespaceStore`] before memory changes, then the key count, the entry
//! count and the persisted count are checked against each other. A mismatch
//! is a [`HyllaError::NamespaceCorrupted`] fault.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::ops::Bound;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::{HyllaError, HyllaResult, ResolutionError, ValidationError};
use crate::hyql::path::{is_within, parent, validate_path};
use crate::storage::{NamespaceDelta, NamespaceStore};

/// Kind of a registered node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathKind {
    Section,
    Shelf,
}

impl fmt::Display for PathKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Section => "section",
            Self::Shelf => "shelf",
        })
    }
}

/// Where a node lives.
///
/// `path` is the physical address relative to the library root (segments
/// joined by `/`); `key_path` is the dotted logical key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "LocationFields")]
pub struct Location {
    path: String,
    key_path: String,
}

#[derive(Deserialize)]
struct LocationFields {
    path: String,
    key_path: String,
}

impl TryFrom<LocationFields> for Location {
    type Error = ValidationError;

    fn try_from(f: LocationFields) -> Result<Self, Self::Error> {
        Self::new(f.path, f.key_path)
    }
}

impl Location {
    /// Creates a location; both parts must be non-empty.
    pub fn new(
        path: impl Into<String>,
        key_path: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let path = path.into();
        let key_path = key_path.into();
        if path.trim().is_empty() {
            return Err(ValidationError::invalid_field(
                "path",
                "location path must not be empty",
            ));
        }
        if key_path.trim().is_empty() {
            return Err(ValidationError::invalid_field(
                "key_path",
                "location key path must not be empty",
            ));
        }
        Ok(Self { path, key_path })
    }

    /// The canonical location of a dotted key: `a.b.c` lives at `a/b/c`.
    pub fn from_key_path(key_path: &str) -> Self {
        Self {
            path: key_path.replace('.', "/"),
            key_path: key_path.to_string(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn key_path(&self) -> &str {
        &self.key_path
    }
}

/// Value of a namespace entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathEntry {
    pub kind: PathKind,
    pub location: Location,
}

impl PathEntry {
    pub fn new(kind: PathKind, location: Location) -> Self {
        Self { kind, location }
    }

    pub fn section(key: &str) -> Self {
        Self::new(PathKind::Section, Location::from_key_path(key))
    }

    pub fn shelf(key: &str) -> Self {
        Self::new(PathKind::Shelf, Location::from_key_path(key))
    }

    pub const fn is_section(&self) -> bool {
        matches!(self.kind, PathKind::Section)
    }

    pub const fn is_shelf(&self) -> bool {
        matches!(self.kind, PathKind::Shelf)
    }
}

/// A full copy of the namespace, used by transactions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamespaceSnapshot {
    entries: BTreeMap<String, PathEntry>,
}

impl NamespaceSnapshot {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&PathEntry> {
        self.entries.get(key)
    }
}

/// In-memory path registry backed by a [`NamespaceStore`].
pub struct PathMap {
    keys: BTreeSet<String>,
    entries: HashMap<String, PathEntry>,
    store: Arc<dyn NamespaceStore>,
}

impl fmt::Debug for PathMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathMap")
            .field("keys", &self.keys.len())
            .field("entries", &self.entries.len())
            .finish_non_exhaustive()
    }
}

impl PathMap {
    /// Loads the whole namespace from `store`.
    pub fn load(store: Arc<dyn NamespaceStore>) -> HyllaResult<Self> {
        let table = store.load()?;
        let mut map = Self {
            keys: BTreeSet::new(),
            entries: HashMap::with_capacity(table.len()),
            store,
        };
        for (key, entry) in table {
            map.keys.insert(key.clone());
            map.entries.insert(key, entry);
        }
        map.verify("load")?;
        debug!(keys = map.keys.len(), "namespace.load");
        Ok(map)
    }

    /// Registers a new key.
    ///
    /// Fails with `DuplicatePath` if the key exists; nothing is persisted or
    /// changed in that case.
    pub fn add(&mut self, key: &str, entry: PathEntry) -> HyllaResult<()> {
        validate_path(key)?;
        if self.entries.contains_key(key) {
            return Err(ResolutionError::DuplicatePath {
                path: key.to_string(),
            }
            .into());
        }
        self.store.apply(&NamespaceDelta::Put {
            key: key.to_string(),
            entry: entry.clone(),
        })?;
        self.keys.insert(key.to_string());
        self.entries.insert(key.to_string(), entry);
        self.verify("add")?;
        debug!(key, "namespace.add");
        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<&PathEntry, ResolutionError> {
        self.entries
            .get(key)
            .ok_or_else(|| ResolutionError::not_found(key))
    }

    pub fn try_get(&self, key: &str) -> Option<&PathEntry> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Replaces the entry of an existing key.
    pub fn update(&mut self, key: &str, entry: PathEntry) -> HyllaResult<()> {
        if !self.entries.contains_key(key) {
            return Err(ResolutionError::not_found(key).into());
        }
        self.store.apply(&NamespaceDelta::Update {
            key: key.to_string(),
            entry: entry.clone(),
        })?;
        self.entries.insert(key.to_string(), entry);
        self.verify("update")?;
        debug!(key, "namespace.update");
        Ok(())
    }

    /// Unregisters a key, returning its entry.
    pub fn remove(&mut self, key: &str) -> HyllaResult<PathEntry> {
        if !self.entries.contains_key(key) {
            return Err(ResolutionError::not_found(key).into());
        }
        self.store.apply(&NamespaceDelta::Remove {
            key: key.to_string(),
        })?;
        self.keys.remove(key);
        let entry = self
            .entries
            .remove(key)
            .ok_or_else(|| HyllaError::corrupted(format!("key '{key}' has no entry")))?;
        self.verify("remove")?;
        debug!(key, "namespace.remove");
        Ok(entry)
    }

    /// Direct children of `parent_key` (`None` = root), ordered by key.
    pub fn children(&self, parent_key: Option<&str>) -> Vec<(&str, &PathEntry)> {
        self.iter()
            .filter(|(key, _)| parent(key) == parent_key)
            .collect()
    }

    /// `key` itself and every key below it, ordered by key.
    pub fn subtree(&self, key: &str) -> Vec<(&str, &PathEntry)> {
        self.keys
            .range::<str, _>((Bound::Included(key), Bound::Unbounded))
            .take_while(|k| k.starts_with(key))
            .filter(|k| is_within(k, key))
            .filter_map(|k| self.entries.get(k).map(|e| (k.as_str(), e)))
            .collect()
    }

    /// Every entry, ordered by key.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &PathEntry)> {
        self.keys
            .iter()
            .filter_map(|k| self.entries.get(k).map(|e| (k.as_str(), e)))
    }

    /// Every shelf, ordered by key.
    pub fn shelves(&self) -> impl Iterator<Item = (&str, &PathEntry)> {
        self.iter().filter(|(_, e)| e.is_shelf())
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn snapshot(&self) -> NamespaceSnapshot {
        NamespaceSnapshot {
            entries: self
                .iter()
                .map(|(k, e)| (k.to_string(), e.clone()))
                .collect(),
        }
    }

    /// Replaces the whole namespace with `snapshot`, clear then restore.
    pub fn restore(&mut self, snapshot: &NamespaceSnapshot) -> HyllaResult<()> {
        self.store.apply(&NamespaceDelta::Clear)?;
        self.keys.clear();
        self.entries.clear();
        for (key, entry) in &snapshot.entries {
            self.store.apply(&NamespaceDelta::Put {
                key: key.clone(),
                entry: entry.clone(),
            })?;
            self.keys.insert(key.clone());
            self.entries.insert(key.clone(), entry.clone());
        }
        self.verify("restore")?;
        debug!(keys = self.keys.len(), "namespace.restore");
        Ok(())
    }

    /// Rewrites the backing store from the live table.
    pub fn compact(&self) -> HyllaResult<()> {
        self.store.compact()?;
        self.verify("compact")
    }

    fn verify(&self, operation: &'static str) -> HyllaResult<()> {
        let persisted = self.store.len()?;
        if self.keys.len() != self.entries.len() || self.keys.len() != persisted {
            error!(
                operation,
                keys = self.keys.len(),
                entries = self.entries.len(),
                persisted,
                "namespace.corrupted"
            );
            return Err(HyllaError::corrupted(format!(
                "after {operation}: {} keys, {} entries, {persisted} persisted",
                self.keys.len(),
                self.entries.len()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryNamespaceStore;
    use crate::storage::StorageError;

    fn map() -> PathMap {
        PathMap::load(Arc::new(MemoryNamespaceStore::new())).unwrap()
    }

    #[test]
    fn test_add_then_get() {
        let mut map = map();
        let entry = PathEntry::shelf("a.b");
        map.add("a.b", entry.clone()).unwrap();
        assert_eq!(map.get("a.b").unwrap(), &entry);
        assert_eq!(entry.location.path(), "a/b");
        assert_eq!(entry.location.key_path(), "a.b");
    }

    #[test]
    fn test_duplicate_add_leaves_map_unchanged() {
        let mut map = map();
        map.add("a", PathEntry::section("a")).unwrap();
        let err = map.add("a", PathEntry::shelf("a")).unwrap_err();
        assert!(matches!(
            err,
            HyllaError::Resolution(ResolutionError::DuplicatePath { .. })
        ));
        assert_eq!(map.len(), 1);
        assert!(map.get("a").unwrap().is_section());
    }

    #[test]
    fn test_remove_then_get_fails() {
        let mut map = map();
        map.add("a", PathEntry::section("a")).unwrap();
        map.remove("a").unwrap();
        assert_eq!(map.get("a").unwrap_err(), ResolutionError::not_found("a"));
        assert!(map.remove("a").is_err());
        assert!(map.update("a", PathEntry::section("a")).is_err());
    }

    #[test]
    fn test_update_replaces_entry() {
        let mut map = map();
        map.add("a", PathEntry::section("a")).unwrap();
        let moved = PathEntry::new(PathKind::Section, Location::new("x/a", "a").unwrap());
        map.update("a", moved.clone()).unwrap();
        assert_eq!(map.get("a").unwrap(), &moved);
    }

    #[test]
    fn test_invalid_key_rejected() {
        let mut map = map();
        let err = map.add("a..b", PathEntry::section("a..b")).unwrap_err();
        assert!(err.is_validation());
        assert!(map.is_empty());
    }

    #[test]
    fn test_location_requires_both_parts() {
        assert!(Location::new("", "a").is_err());
        assert!(Location::new("a", " ").is_err());
        let json = r#"{"path": "", "key_path": "a"}"#;
        assert!(serde_json::from_str::<Location>(json).is_err());
    }

    #[test]
    fn test_children_and_subtree() {
        let mut map = map();
        for (key, section) in [
            ("a", true),
            ("a.b", true),
            ("a.b.c", false),
            ("a.d", false),
            ("ab", false),
        ] {
            let entry = if section {
                PathEntry::section(key)
            } else {
                PathEntry::shelf(key)
            };
            map.add(key, entry).unwrap();
        }
        let roots: Vec<_> = map.children(None).into_iter().map(|(k, _)| k).collect();
        assert_eq!(roots, vec!["a", "ab"]);
        let kids: Vec<_> = map.children(Some("a")).into_iter().map(|(k, _)| k).collect();
        assert_eq!(kids, vec!["a.b", "a.d"]);
        let sub: Vec<_> = map.subtree("a").into_iter().map(|(k, _)| k).collect();
        assert_eq!(sub, vec!["a", "a.b", "a.b.c", "a.d"]);
        assert_eq!(map.shelves().count(), 3);
    }

    #[test]
    fn test_snapshot_restore() {
        let mut map = map();
        map.add("a", PathEntry::section("a")).unwrap();
        let snap = map.snapshot();
        map.add("a.b", PathEntry::shelf("a.b")).unwrap();
        map.remove("a").unwrap();
        map.restore(&snap).unwrap();
        assert_eq!(map.len(), 1);
        assert!(map.contains("a"));
        assert!(!map.contains("a.b"));
    }

    /// A store that reports a different persisted count than it holds.
    struct DriftingStore(MemoryNamespaceStore);

    impl NamespaceStore for DriftingStore {
        fn load(&self) -> Result<BTreeMap<String, PathEntry>, StorageError> {
            self.0.load()
        }

        fn apply(&self, delta: &NamespaceDelta) -> Result<(), StorageError> {
            self.0.apply(delta)
        }

        fn len(&self) -> Result<usize, StorageError> {
            Ok(self.0.len()? + 1)
        }

        fn compact(&self) -> Result<(), StorageError> {
            Ok(())
        }
    }

    #[test]
    fn test_count_mismatch_is_corruption() {
        let err = PathMap::load(Arc::new(DriftingStore(MemoryNamespaceStore::new()))).unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(err, HyllaError::NamespaceCorrupted { .. }));
    }

    #[test]
    fn test_store_failure_leaves_memory_unchanged() {
        struct FailingStore;

        impl NamespaceStore for FailingStore {
            fn load(&self) -> Result<BTreeMap<String, PathEntry>, StorageError> {
                Ok(BTreeMap::new())
            }

            fn apply(&self, _delta: &NamespaceDelta) -> Result<(), StorageError> {
                Err(StorageError::BackendError("disk full".into()))
            }

            fn len(&self) -> Result<usize, StorageError> {
                Ok(0)
            }

            fn compact(&self) -> Result<(), StorageError> {
                Ok(())
            }
        }

        let mut map = PathMap::load(Arc::new(FailingStore)).unwrap();
        let err = map.add("a", PathEntry::section("a")).unwrap_err();
        assert!(matches!(err, HyllaError::Storage(_)));
        assert!(map.is_empty());
    }
}
