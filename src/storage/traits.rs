//! Abstract storage traits for HyllaDB.
//!
//! These traits define the contract that storage backends must implement.
//! By using traits, we enable:
//! - In-memory backends for testing and embedded use
//! - Persistent backends for on-disk libraries

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::Catalog;
use crate::namespace::{Location, PathEntry};
use crate::value::Record;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored bytes failed a checksum or format check.
    #[error("Storage data corrupted: {0}")]
    Corrupted(String),

    /// Another process holds the library.
    #[error("Library is locked: {0}")]
    Locked(String),

    /// Backend error.
    #[error("Storage backend error: {0}")]
    BackendError(String),

    /// Serialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// A change to the persisted namespace table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NamespaceDelta {
    /// Insert a new key.
    Put { key: String, entry: PathEntry },
    /// Replace the entry of an existing key.
    Update { key: String, entry: PathEntry },
    /// Remove a key.
    Remove { key: String },
    /// Remove every key.
    Clear,
}

impl NamespaceDelta {
    /// Checks that the delta applies cleanly to `table`.
    pub fn check(&self, table: &BTreeMap<String, PathEntry>) -> Result<(), StorageError> {
        match self {
            Self::Put { key, .. } if table.contains_key(key) => {
                Err(StorageError::BackendError(format!("duplicate key: {key}")))
            }
            Self::Update { key, .. } | Self::Remove { key } if !table.contains_key(key) => {
                Err(StorageError::BackendError(format!("missing key: {key}")))
            }
            _ => Ok(()),
        }
    }

    /// Applies the delta to an in-memory table.
    pub fn apply_to(&self, table: &mut BTreeMap<String, PathEntry>) -> Result<(), StorageError> {
        self.check(table)?;
        match self {
            Self::Put { key, entry } | Self::Update { key, entry } => {
                table.insert(key.clone(), entry.clone());
            }
            Self::Remove { key } => {
                table.remove(key);
            }
            Self::Clear => table.clear(),
        }
        Ok(())
    }
}

/// Durable key → location table backing the path namespace.
///
/// Every call to [`apply`](Self::apply) must be durable when it returns.
pub trait NamespaceStore: Send + Sync {
    /// Loads the full table.
    fn load(&self) -> Result<BTreeMap<String, PathEntry>, StorageError>;

    /// Persists one delta.
    fn apply(&self, delta: &NamespaceDelta) -> Result<(), StorageError>;

    /// Number of persisted keys.
    fn len(&self) -> Result<usize, StorageError>;

    /// Rewrites the backing representation from the live table.
    fn compact(&self) -> Result<(), StorageError>;
}

/// Contents of one shelf.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShelfData {
    #[serde(default)]
    pub data: Record,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Record>,
}

impl ShelfData {
    pub fn new(data: Record, metadata: Option<Record>) -> Self {
        Self { data, metadata }
    }
}

/// One physical container per shelf.
pub trait ShelfStore: Send + Sync {
    /// Loads a shelf, `None` if it was never stored.
    fn load(&self, location: &Location) -> Result<Option<ShelfData>, StorageError>;

    /// Replaces the stored contents of a shelf.
    fn store(&self, location: &Location, shelf: &ShelfData) -> Result<(), StorageError>;

    /// Deletes a shelf. Deleting a missing shelf is not an error.
    fn delete(&self, location: &Location) -> Result<(), StorageError>;
}

/// Storage for the schema catalog.
pub trait CatalogStore: Send + Sync {
    fn load(&self) -> Result<Option<Catalog>, StorageError>;

    fn save(&self, catalog: &Catalog) -> Result<(), StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespace::PathKind;

    fn entry(key: &str) -> PathEntry {
        PathEntry::new(PathKind::Shelf, Location::from_key_path(key))
    }

    #[test]
    fn test_delta_apply() {
        let mut table = BTreeMap::new();
        NamespaceDelta::Put {
            key: "a".into(),
            entry: entry("a"),
        }
        .apply_to(&mut table)
        .unwrap();
        assert!(NamespaceDelta::Put {
            key: "a".into(),
            entry: entry("a"),
        }
        .apply_to(&mut table)
        .is_err());
        assert!(NamespaceDelta::Remove { key: "b".into() }
            .apply_to(&mut table)
            .is_err());
        NamespaceDelta::Clear.apply_to(&mut table).unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn test_delta_json_tagging() {
        let json = serde_json::to_value(NamespaceDelta::Remove { key: "a.b".into() }).unwrap();
        assert_eq!(json["kind"], "remove");
        assert_eq!(json["key"], "a.b");
    }
}
