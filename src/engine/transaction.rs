//! Transaction snapshots.
//!
//! Before the first query of a batch runs, the library captures the whole
//! namespace, the catalog and the contents of every shelf inside the paths
//! the batch declares it touches. Rollback puts all of it back.

use std::collections::BTreeMap;

use tracing::{debug, error, info};
use uuid::Uuid;

use crate::catalog::Catalog;
use crate::error::{HyllaError, HyllaResult};
use crate::hyql::path::is_within;
use crate::namespace::{Location, NamespaceSnapshot, PathMap};
use crate::storage::{CatalogStore, ShelfData, ShelfStore};

/// State captured at the start of a transaction.
pub(crate) struct TransactionSnapshot {
    id: Uuid,
    namespace: NamespaceSnapshot,
    catalog: Catalog,
    shelves: BTreeMap<String, (Location, Option<ShelfData>)>,
}

impl TransactionSnapshot {
    pub(crate) fn capture(
        namespace: &PathMap,
        catalog: &Catalog,
        shelves: &dyn ShelfStore,
        touched: &[&str],
    ) -> HyllaResult<Self> {
        let id = Uuid::new_v4();
        let mut saved = BTreeMap::new();
        for (key, entry) in namespace.shelves() {
            let affected = touched
                .iter()
                .any(|path| is_within(key, path) || is_within(path, key));
            if affected {
                let contents = shelves.load(&entry.location)?;
                saved.insert(key.to_string(), (entry.location.clone(), contents));
            }
        }
        debug!(
            tx = %id,
            keys = namespace.len(),
            shelves = saved.len(),
            "transaction.snapshot"
        );
        Ok(Self {
            id,
            namespace: namespace.snapshot(),
            catalog: catalog.clone(),
            shelves: saved,
        })
    }

    pub(crate) fn id(&self) -> Uuid {
        self.id
    }

    /// Restores the captured state.
    ///
    /// Shelves created during the batch are deleted, captured shelves are
    /// written back, then the namespace is cleared and restored and the
    /// catalog replaced. Any failure here is a consistency fault.
    pub(crate) fn rollback(
        self,
        namespace: &mut PathMap,
        catalog: &mut Catalog,
        shelves: &dyn ShelfStore,
        catalog_store: &dyn CatalogStore,
    ) -> HyllaResult<()> {
        let id = self.id;
        self.restore(namespace, catalog, shelves, catalog_store)
            .map_err(|e| {
                error!(tx = %id, error = %e, "transaction.rollback_failed");
                HyllaError::corrupted(format!("rollback of transaction {id} failed: {e}"))
            })?;
        info!(tx = %id, "transaction.rollback");
        Ok(())
    }

    fn restore(
        self,
        namespace: &mut PathMap,
        catalog: &mut Catalog,
        shelves: &dyn ShelfStore,
        catalog_store: &dyn CatalogStore,
    ) -> HyllaResult<()> {
        // Any shelf whose location was not a shelf location before the batch
        // is new, including keys that were sections or were moved.
        let created: Vec<Location> = namespace
            .shelves()
            .filter(|(key, entry)| {
                self.namespace
                    .get(key)
                    .map_or(true, |old| !old.is_shelf() || old.location != entry.location)
            })
            .map(|(_, entry)| entry.location.clone())
            .collect();
        for location in &created {
            shelves.delete(location)?;
        }

        for (location, contents) in self.shelves.values() {
            match contents {
                Some(contents) => shelves.store(location, contents)?,
                None => shelves.delete(location)?,
            }
        }

        namespace.restore(&self.namespace)?;
        catalog_store.save(&self.catalog)?;
        *catalog = self.catalog;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::namespace::PathEntry;
    use crate::storage::memory::{MemoryCatalogStore, MemoryNamespaceStore, MemoryShelfStore};
    use crate::value::{Record, Value};

    fn shelf(value: i64) -> ShelfData {
        let mut r = Record::new();
        r.insert("n".into(), Value::Int(value));
        ShelfData::new(r, None)
    }

    #[test]
    fn test_rollback_restores_everything() {
        let shelves = MemoryShelfStore::new();
        let catalog_store = MemoryCatalogStore::new();
        let mut ns = PathMap::load(Arc::new(MemoryNamespaceStore::new())).unwrap();
        let mut catalog = Catalog::new();

        ns.add("a", PathEntry::section("a")).unwrap();
        ns.add("a.x", PathEntry::shelf("a.x")).unwrap();
        ns.add("b", PathEntry::shelf("b")).unwrap();
        let ax = ns.get("a.x").unwrap().location.clone();
        let b = ns.get("b").unwrap().location.clone();
        shelves.store(&ax, &shelf(1)).unwrap();
        shelves.store(&b, &shelf(2)).unwrap();

        let snap = TransactionSnapshot::capture(&ns, &catalog, &shelves, &["a"]).unwrap();
        assert_eq!(snap.shelves.len(), 1);

        // Mutate: change a.x, add a.y, register a section.
        shelves.store(&ax, &shelf(10)).unwrap();
        ns.add("a.y", PathEntry::shelf("a.y")).unwrap();
        let ay = ns.get("a.y").unwrap().location.clone();
        shelves.store(&ay, &shelf(3)).unwrap();
        catalog.register_section("a", None, None);

        snap.rollback(&mut ns, &mut catalog, &shelves, &catalog_store)
            .unwrap();

        assert_eq!(ns.len(), 3);
        assert!(!ns.contains("a.y"));
        assert!(catalog.is_empty());
        assert_eq!(shelves.load(&ax).unwrap(), Some(shelf(1)));
        assert_eq!(shelves.load(&ay).unwrap(), None);
        assert_eq!(shelves.load(&b).unwrap(), Some(shelf(2)));
    }

    #[test]
    fn test_rollback_deletes_shelf_that_replaced_section() {
        let shelves = MemoryShelfStore::new();
        let catalog_store = MemoryCatalogStore::new();
        let mut ns = PathMap::load(Arc::new(MemoryNamespaceStore::new())).unwrap();
        let mut catalog = Catalog::new();
        ns.add("a", PathEntry::section("a")).unwrap();

        let snap = TransactionSnapshot::capture(&ns, &catalog, &shelves, &["a"]).unwrap();

        ns.remove("a").unwrap();
        ns.add("a", PathEntry::shelf("a")).unwrap();
        let a = ns.get("a").unwrap().location.clone();
        shelves.store(&a, &shelf(7)).unwrap();

        snap.rollback(&mut ns, &mut catalog, &shelves, &catalog_store)
            .unwrap();

        assert!(!ns.get("a").unwrap().is_shelf());
        assert_eq!(shelves.load(&a).unwrap(), None);
    }
}
