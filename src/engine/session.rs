//! Scoped shelf access for a single operation.
//!
//! A [`ShelfSession`] opens shelves on first touch and keeps them until it is
//! committed or dropped. Changes are buffered: nothing reaches the
//! [`ShelfStore`] before [`commit`](ShelfSession::commit), so an operation
//! that fails halfway leaves stored shelves untouched.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::error::{HyllaError, HyllaResult};
use crate::namespace::{Location, PathEntry};
use crate::storage::{ShelfData, ShelfStore};
use crate::value::Record;

struct OpenShelf {
    location: Location,
    contents: ShelfData,
    dirty: bool,
}

pub(crate) struct ShelfSession {
    store: Arc<dyn ShelfStore>,
    open: BTreeMap<String, OpenShelf>,
    committed: bool,
}

impl ShelfSession {
    pub(crate) fn new(store: Arc<dyn ShelfStore>) -> Self {
        Self {
            store,
            open: BTreeMap::new(),
            committed: false,
        }
    }

    fn open(&mut self, key: &str, entry: &PathEntry) -> HyllaResult<&mut OpenShelf> {
        if !self.open.contains_key(key) {
            let contents = self.store.load(&entry.location)?.unwrap_or_default();
            trace!(key, fields = contents.data.len(), "shelf_session.load");
            self.open.insert(
                key.to_string(),
                OpenShelf {
                    location: entry.location.clone(),
                    contents,
                    dirty: false,
                },
            );
        }
        self.open
            .get_mut(key)
            .ok_or_else(|| HyllaError::internal(format!("shelf '{key}' vanished from session")))
    }

    /// The record of a shelf, loading it if needed.
    pub(crate) fn record(&mut self, key: &str, entry: &PathEntry) -> HyllaResult<&Record> {
        Ok(&self.open(key, entry)?.contents.data)
    }

    /// Replaces the record of a shelf; written on commit.
    pub(crate) fn replace(
        &mut self,
        key: &str,
        entry: &PathEntry,
        data: Record,
    ) -> HyllaResult<()> {
        let shelf = self.open(key, entry)?;
        shelf.contents.data = data;
        shelf.dirty = true;
        Ok(())
    }

    /// Drops a shelf from the session without writing it.
    pub(crate) fn forget(&mut self, key: &str) {
        self.open.remove(key);
    }

    /// Writes every changed shelf, returning how many were written.
    pub(crate) fn commit(mut self) -> HyllaResult<usize> {
        let mut written = 0;
        for (key, shelf) in &mut self.open {
            if !shelf.dirty {
                continue;
            }
            self.store.store(&shelf.location, &shelf.contents)?;
            shelf.dirty = false;
            written += 1;
            trace!(key = key.as_str(), "shelf_session.store");
        }
        self.committed = true;
        Ok(written)
    }
}

impl Drop for ShelfSession {
    fn drop(&mut self) {
        let pending = self.open.values().filter(|s| s.dirty).count();
        if pending > 0 {
            debug!(pending, committed = self.committed, "shelf_session.discard");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryShelfStore;
    use crate::value::Value;

    fn data(value: i64) -> Record {
        let mut r = Record::new();
        r.insert("n".into(), Value::Int(value));
        r
    }

    #[test]
    fn test_changes_reach_store_only_on_commit() {
        let store = Arc::new(MemoryShelfStore::new());
        let entry = PathEntry::shelf("a.b");

        let mut session = ShelfSession::new(store.clone());
        assert!(session.record("a.b", &entry).unwrap().is_empty());
        session.replace("a.b", &entry, data(1)).unwrap();
        assert!(store.load(&entry.location).unwrap().is_none());
        assert_eq!(session.commit().unwrap(), 1);

        let stored = store.load(&entry.location).unwrap().unwrap();
        assert_eq!(stored.data, data(1));
    }

    #[test]
    fn test_dropped_session_discards_changes() {
        let store = Arc::new(MemoryShelfStore::new());
        let entry = PathEntry::shelf("a");
        {
            let mut session = ShelfSession::new(store.clone());
            session.replace("a", &entry, data(7)).unwrap();
        }
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_shelf_loaded_once() {
        let store = Arc::new(MemoryShelfStore::new());
        let entry = PathEntry::shelf("a");
        store.store(&entry.location, &ShelfData::new(data(1), None)).unwrap();

        let mut session = ShelfSession::new(store.clone());
        session.replace("a", &entry, data(2)).unwrap();
        // A later read sees the buffered change, not the stored record.
        assert_eq!(session.record("a", &entry).unwrap(), &data(2));
        session.forget("a");
        assert_eq!(session.record("a", &entry).unwrap(), &data(1));
    }
}
