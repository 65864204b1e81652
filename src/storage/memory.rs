//! In-memory storage backend.
//!
//! This module provides thread-safe in-memory implementations of the storage traits.
//! It is intended for embedded usage, tests, and as a reference implementation.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use crate::catalog::Catalog;
use crate::namespace::{Location, PathEntry};
use crate::storage::traits::{
    CatalogStore, NamespaceDelta, NamespaceStore, ShelfData, ShelfStore, StorageError,
};

fn lock_err(context: &'static str) -> StorageError {
    StorageError::BackendError(format!("poisoned lock: {context}"))
}

/// In-memory namespace table.
#[derive(Debug, Default)]
pub struct MemoryNamespaceStore {
    table: RwLock<BTreeMap<String, PathEntry>>,
}

impl MemoryNamespaceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NamespaceStore for MemoryNamespaceStore {
    fn load(&self) -> Result<BTreeMap<String, PathEntry>, StorageError> {
        let table = self.table.read().map_err(|_| lock_err("namespace.load"))?;
        Ok(table.clone())
    }

    fn apply(&self, delta: &NamespaceDelta) -> Result<(), StorageError> {
        let mut table = self.table.write().map_err(|_| lock_err("namespace.apply"))?;
        delta.apply_to(&mut table)
    }

    fn len(&self) -> Result<usize, StorageError> {
        let table = self.table.read().map_err(|_| lock_err("namespace.len"))?;
        Ok(table.len())
    }

    fn compact(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

/// In-memory shelf containers keyed by physical path.
#[derive(Debug, Default)]
pub struct MemoryShelfStore {
    shelves: RwLock<HashMap<String, ShelfData>>,
}

impl MemoryShelfStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored shelves.
    pub fn len(&self) -> Result<usize, StorageError> {
        let shelves = self.shelves.read().map_err(|_| lock_err("shelf.len"))?;
        Ok(shelves.len())
    }

    pub fn is_empty(&self) -> Result<bool, StorageError> {
        self.len().map(|n| n == 0)
    }
}

impl ShelfStore for MemoryShelfStore {
    fn load(&self, location: &Location) -> Result<Option<ShelfData>, StorageError> {
        let shelves = self.shelves.read().map_err(|_| lock_err("shelf.load"))?;
        Ok(shelves.get(location.path()).cloned())
    }

    fn store(&self, location: &Location, shelf: &ShelfData) -> Result<(), StorageError> {
        let mut shelves = self.shelves.write().map_err(|_| lock_err("shelf.store"))?;
        shelves.insert(location.path().to_string(), shelf.clone());
        Ok(())
    }

    fn delete(&self, location: &Location) -> Result<(), StorageError> {
        let mut shelves = self.shelves.write().map_err(|_| lock_err("shelf.delete"))?;
        shelves.remove(location.path());
        Ok(())
    }
}

/// In-memory schema catalog.
#[derive(Debug, Default)]
pub struct MemoryCatalogStore {
    catalog: RwLock<Option<Catalog>>,
}

impl MemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CatalogStore for MemoryCatalogStore {
    fn load(&self) -> Result<Option<Catalog>, StorageError> {
        let catalog = self.catalog.read().map_err(|_| lock_err("catalog.load"))?;
        Ok(catalog.clone())
    }

    fn save(&self, catalog: &Catalog) -> Result<(), StorageError> {
        let mut slot = self.catalog.write().map_err(|_| lock_err("catalog.save"))?;
        *slot = Some(catalog.clone());
        Ok(())
    }
}
