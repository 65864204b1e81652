//! Query execution.
//!
//! [`Library`] owns the path namespace and the schema catalog of one library
//! and applies HyQL queries against pluggable storage backends. Execution is
//! synchronous and single-writer: every call takes `&mut self`.

mod filter;
mod session;
mod transaction;

use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

#[cfg(feature = "persistent")]
use std::path::Path;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::catalog::Catalog;
use crate::error::{HyllaError, HyllaResult, ResolutionError, ValidationError};
use crate::hyql::path::parent;
use crate::hyql::{
    BuildSection, BuildShelf, CheckOut, CheckOutItem, Filters, Query, Remove, Reset, Revise,
    SetSchema, SortItem, SortOrder, Transaction, Write,
};
use crate::namespace::{PathEntry, PathKind, PathMap};
use crate::resolve::{resolve, resolve_build_target, resolve_field, resolve_section, resolve_shelf};
use crate::schema::SchemaInstance;
use crate::storage::memory::{MemoryCatalogStore, MemoryNamespaceStore, MemoryShelfStore};
use crate::storage::{CatalogStore, NamespaceStore, ShelfData, ShelfStore};
use crate::value::{lookup, lookup_mut, remove_field, Record, Value};

#[cfg(feature = "persistent")]
use crate::storage::persistent::{open_stores, PersistentConfig, PersistentStores};

use session::ShelfSession;
use transaction::TransactionSnapshot;

/// One row of a checkout result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckOutRow {
    /// Namespace key of the shelf the row was read from.
    pub path: String,
    /// The projected fields.
    #[serde(with = "crate::value::plain_record")]
    pub data: Record,
}

/// Rows returned by a [`CheckOut`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CheckOutResult {
    pub rows: Vec<CheckOutRow>,
}

impl CheckOutResult {
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Shelf keys in result order.
    #[must_use]
    pub fn paths(&self) -> Vec<&str> {
        self.rows.iter().map(|r| r.path.as_str()).collect()
    }

    /// The row read from `path`, if any.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Record> {
        self.rows.iter().find(|r| r.path == path).map(|r| &r.data)
    }
}

/// Result of executing a query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum QueryOutcome {
    /// A section or shelf was registered.
    Built { path: String, kind: PathKind },
    /// Fields were inserted into a shelf.
    Written { path: String, fields: usize },
    /// Rows read by a checkout.
    CheckedOut(CheckOutResult),
    /// Number of shelves revised.
    Revised { count: usize },
    /// Number of nodes or fields removed.
    Removed { count: usize },
    /// Number of shelves or fields reset.
    Reset { count: usize },
    /// A schema was bound; `target` is `None` for the library root.
    SchemaSet { target: Option<String> },
    /// Outcomes of a committed transaction, in query order.
    Transaction(Vec<QueryOutcome>),
}

impl QueryOutcome {
    /// The checkout rows, if this is a checkout outcome.
    #[must_use]
    pub fn into_checkout(self) -> Option<CheckOutResult> {
        match self {
            Self::CheckedOut(result) => Some(result),
            _ => None,
        }
    }

    /// Number of affected shelves, nodes or fields for mutating outcomes.
    #[must_use]
    pub fn count(&self) -> Option<usize> {
        match self {
            Self::Revised { count } | Self::Removed { count } | Self::Reset { count } => {
                Some(*count)
            }
            _ => None,
        }
    }
}

/// A shelf considered by a checkout, revise, remove or reset.
struct Candidate {
    key: String,
    entry: PathEntry,
    /// The shelf key relative to the queried path (`None` when they are equal).
    relative: Option<String>,
    item: usize,
    record: Record,
}

impl Candidate {
    /// Reads `path` from the candidate's own record.
    ///
    /// Tried in order: `path` as a field of the record, then `path` prefixed
    /// with the shelf's full key, then prefixed with its key relative to the
    /// queried path.
    fn local(&self, path: &str) -> Option<&Value> {
        let field = |p: &str| lookup(&self.record, &p.split('.').collect::<Vec<_>>());
        field(path).or_else(|| {
            [Some(self.key.as_str()), self.relative.as_deref()]
                .into_iter()
                .flatten()
                .find_map(|prefix| path.strip_prefix(prefix)?.strip_prefix('.'))
                .and_then(field)
        })
    }
}

/// An open library.
pub struct Library {
    namespace: PathMap,
    catalog: Catalog,
    shelves: Arc<dyn ShelfStore>,
    catalog_store: Arc<dyn CatalogStore>,
    poisoned: bool,
    #[cfg(feature = "persistent")]
    persistent: Option<PersistentStores>,
}

impl fmt::Debug for Library {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Library")
            .field("namespace", &self.namespace)
            .field("sections", &self.catalog.len())
            .field("poisoned", &self.poisoned)
            .finish_non_exhaustive()
    }
}

impl Library {
    /// Opens a library backed by in-memory stores.
    ///
    /// # Errors
    /// Only if a store fails to load, which the memory stores never do.
    pub fn in_memory() -> HyllaResult<Self> {
        Self::with_stores(
            Arc::new(MemoryNamespaceStore::new()),
            Arc::new(MemoryShelfStore::new()),
            Arc::new(MemoryCatalogStore::new()),
        )
    }

    /// Opens a library over the given stores, loading the whole namespace
    /// and catalog.
    ///
    /// # Errors
    /// - If the namespace or catalog cannot be read
    /// - If the loaded namespace disagrees with its store
    pub fn with_stores(
        namespace: Arc<dyn NamespaceStore>,
        shelves: Arc<dyn ShelfStore>,
        catalog_store: Arc<dyn CatalogStore>,
    ) -> HyllaResult<Self> {
        let namespace = PathMap::load(namespace)?;
        let catalog = catalog_store.load()?.unwrap_or_default();
        info!(
            keys = namespace.len(),
            sections = catalog.len(),
            "library.open"
        );
        Ok(Self {
            namespace,
            catalog,
            shelves,
            catalog_store,
            poisoned: false,
            #[cfg(feature = "persistent")]
            persistent: None,
        })
    }

    /// Opens or creates an on-disk library in `dir`.
    ///
    /// # Errors
    /// - If the configuration is invalid
    /// - If another handle holds the library
    /// - If the namespace, catalog or directory cannot be read
    #[cfg(feature = "persistent")]
    pub fn open(dir: impl AsRef<Path>, config: Option<PersistentConfig>) -> HyllaResult<Self> {
        let stores = open_stores(dir, config)?;
        let mut library = Self::with_stores(
            stores.namespace.clone(),
            stores.shelves.clone(),
            stores.catalog.clone(),
        )?;
        library.persistent = Some(stores);
        Ok(library)
    }

    /// Directory of an on-disk library.
    #[cfg(feature = "persistent")]
    #[must_use]
    pub fn dir(&self) -> Option<&Path> {
        self.persistent.as_ref().map(PersistentStores::dir)
    }

    /// Closes the library, compacting the namespace journal when configured.
    ///
    /// Dropping a library releases the same resources without compacting.
    ///
    /// # Errors
    /// If compacting the journal fails.
    pub fn close(self) -> HyllaResult<()> {
        #[cfg(feature = "persistent")]
        if let Some(stores) = &self.persistent {
            if stores.config().compact_on_close && !self.poisoned {
                self.namespace.compact()?;
            }
        }
        info!(
            keys = self.namespace.len(),
            poisoned = self.poisoned,
            "library.close"
        );
        Ok(())
    }

    #[must_use]
    pub fn namespace(&self) -> &PathMap {
        &self.namespace
    }

    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// True once a consistency fault has terminated this session.
    #[must_use]
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Executes one query.
    ///
    /// A consistency fault poisons the library; every later call fails with
    /// [`HyllaError::Poisoned`].
    ///
    /// # Errors
    /// - [`HyllaError::Validation`] if the data breaks a bound schema
    /// - [`HyllaError::Resolution`] if a path does not resolve as required
    /// - [`HyllaError::Storage`] if a store fails
    /// - [`HyllaError::NamespaceCorrupted`] if a rollback fails
    /// - [`HyllaError::Poisoned`] after a consistency fault
    pub fn execute(&mut self, query: impl Into<Query>) -> HyllaResult<QueryOutcome> {
        if self.poisoned {
            return Err(HyllaError::Poisoned);
        }
        let query = query.into();
        let kind = query.kind();
        let result = match &query {
            Query::Transaction(tx) => self.execute_transaction(tx),
            other => self.execute_one(other),
        };
        match &result {
            Ok(_) => debug!(kind, "library.execute"),
            Err(e) if e.is_fatal() => {
                self.poisoned = true;
                error!(kind, error = %e, "library.poisoned");
            }
            Err(e) => debug!(kind, error = %e, "library.execute_failed"),
        }
        result
    }

    /// Decodes a query from its JSON form and executes it.
    ///
    /// # Errors
    /// The error [`from_json`](crate::hyql::from_json) reports for a bad
    /// document, otherwise as [`Library::execute`].
    pub fn execute_json(&mut self, json: &str) -> HyllaResult<QueryOutcome> {
        let query = crate::hyql::from_json(json)?;
        self.execute(query)
    }

    /// Executes a checkout without taking the library mutably.
    ///
    /// # Errors
    /// - [`HyllaError::Resolution`] if a checkout path does not exist
    /// - [`HyllaError::Storage`] if a shelf cannot be read
    /// - [`HyllaError::Poisoned`] after a consistency fault
    pub fn checkout(&self, query: &CheckOut) -> HyllaResult<CheckOutResult> {
        if self.poisoned {
            return Err(HyllaError::Poisoned);
        }
        self.run_checkout(query)
    }

    fn execute_one(&mut self, query: &Query) -> HyllaResult<QueryOutcome> {
        match query {
            Query::BuildSection(q) => self.build_section(q),
            Query::BuildShelf(q) => self.build_shelf(q),
            Query::Write(q) => self.write(q),
            Query::CheckOut(q) => self.run_checkout(q).map(QueryOutcome::CheckedOut),
            Query::Revise(q) => self.revise(q),
            Query::Remove(q) => self.remove(q),
            Query::Reset(q) => self.reset(q),
            Query::SetSchema(q) => self.set_schema(q),
            Query::Transaction(_) => Err(ValidationError::invalid_field(
                "queries",
                "transactions cannot be nested",
            )
            .into()),
        }
    }

    fn execute_transaction(&mut self, tx: &Transaction) -> HyllaResult<QueryOutcome> {
        let touched: Vec<&str> = tx.queries().iter().flat_map(Query::touched_paths).collect();
        let snapshot = TransactionSnapshot::capture(
            &self.namespace,
            &self.catalog,
            self.shelves.as_ref(),
            &touched,
        )?;
        let id = snapshot.id();
        info!(tx = %id, queries = tx.queries().len(), "transaction.begin");

        let mut outcomes = Vec::with_capacity(tx.queries().len());
        for (index, query) in tx.queries().iter().enumerate() {
            match self.execute_one(query) {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    warn!(tx = %id, index, kind = query.kind(), error = %e, "transaction.abort");
                    snapshot.rollback(
                        &mut self.namespace,
                        &mut self.catalog,
                        self.shelves.as_ref(),
                        self.catalog_store.as_ref(),
                    )?;
                    return Err(e);
                }
            }
        }
        info!(tx = %id, "transaction.commit");
        Ok(QueryOutcome::Transaction(outcomes))
    }

    fn session(&self) -> ShelfSession {
        ShelfSession::new(Arc::clone(&self.shelves))
    }

    /// Replaces the catalog with an edited copy once the copy is saved.
    fn update_catalog(&mut self, edit: impl FnOnce(&mut Catalog)) -> HyllaResult<()> {
        let mut next = self.catalog.clone();
        edit(&mut next);
        self.catalog_store.save(&next)?;
        self.catalog = next;
        Ok(())
    }

    /// Validates a shelf record against the schema bound to the shelf's parent.
    fn conform(&self, key: &str, record: Record) -> HyllaResult<Record> {
        match self.catalog.bound_schema(parent(key)) {
            Some(schema) => Ok(schema.validate(&record)?),
            None => Ok(record),
        }
    }

    fn conform_instance(
        &self,
        parent: Option<&str>,
        instance: &SchemaInstance,
    ) -> HyllaResult<Record> {
        let Some(bound) = self.catalog.bound_schema(parent) else {
            return Ok(instance.data().clone());
        };
        if !instance.schema().is_a(bound) {
            return Err(ValidationError::schema(
                bound.name(),
                format!(
                    "an instance of '{}' is not a '{}'",
                    instance.schema().name(),
                    bound.name()
                ),
            )
            .into());
        }
        Ok(bound.validate(instance.data())?)
    }

    fn build_section(&mut self, q: &BuildSection) -> HyllaResult<QueryOutcome> {
        let key = resolve_build_target(q.path(), q.name(), &self.namespace)?;
        self.namespace.add(&key, PathEntry::section(&key))?;

        let schema = q.schema_model().cloned();
        let metadata = q.metadata().cloned();
        if let Err(e) = self.update_catalog(|c| c.register_section(&key, schema, metadata)) {
            self.namespace.remove(&key)?;
            return Err(e);
        }
        info!(key, "library.build_section");
        Ok(QueryOutcome::Built {
            path: key,
            kind: PathKind::Section,
        })
    }

    fn build_shelf(&mut self, q: &BuildShelf) -> HyllaResult<QueryOutcome> {
        let key = resolve_build_target(q.path(), q.name(), &self.namespace)?;
        let data = match q.data() {
            Some(instance) => self.conform_instance(q.path(), instance)?,
            None => Record::new(),
        };
        let entry = PathEntry::shelf(&key);
        self.shelves
            .store(&entry.location, &ShelfData::new(data, q.metadata().cloned()))?;
        if let Err(e) = self.namespace.add(&key, entry.clone()) {
            if let Err(cleanup) = self.shelves.delete(&entry.location) {
                warn!(key, error = %cleanup, "library.build_shelf.cleanup_failed");
            }
            return Err(e);
        }
        info!(key, "library.build_shelf");
        Ok(QueryOutcome::Built {
            path: key,
            kind: PathKind::Shelf,
        })
    }

    fn write(&mut self, q: &Write) -> HyllaResult<QueryOutcome> {
        let entry = resolve_shelf(q.path(), &self.namespace)?.clone();
        let mut session = self.session();
        let mut record = session.record(q.path(), &entry)?.clone();
        for (field, value) in q.data() {
            if record.get(field).is_some_and(|v| !v.is_null()) {
                return Err(ResolutionError::PathAlreadyHasData {
                    path: format!("{}.{field}", q.path()),
                }
                .into());
            }
            record.insert(field.clone(), value.clone());
        }
        let record = self.conform(q.path(), record)?;
        session.replace(q.path(), &entry, record)?;
        session.commit()?;
        debug!(key = q.path(), fields = q.data().len(), "library.write");
        Ok(QueryOutcome::Written {
            path: q.path().to_string(),
            fields: q.data().len(),
        })
    }

    /// Shelves under `path`: the shelf itself, or every shelf in a section's
    /// subtree, ordered by key.
    fn gather(&self, path: &str, session: &mut ShelfSession) -> HyllaResult<Vec<Candidate>> {
        let entry = resolve(path, &self.namespace)?;
        let shelves: Vec<(String, PathEntry)> = match entry.kind {
            PathKind::Shelf => vec![(path.to_string(), entry.clone())],
            PathKind::Section => self
                .namespace
                .subtree(path)
                .into_iter()
                .filter(|(_, e)| e.is_shelf())
                .map(|(k, e)| (k.to_string(), e.clone()))
                .collect(),
        };
        shelves
            .into_iter()
            .map(|(key, entry)| {
                let record = session.record(&key, &entry)?.clone();
                let relative = key
                    .strip_prefix(path)
                    .and_then(|rest| rest.strip_prefix('.'))
                    .map(str::to_string);
                Ok(Candidate {
                    key,
                    entry,
                    relative,
                    item: 0,
                    record,
                })
            })
            .collect()
    }

    /// Reads a path operand for `candidate`: from its own record first, then
    /// absolutely through the namespace. Unresolved paths read as `Null`.
    fn operand(
        &self,
        candidate: &Candidate,
        path: &str,
        session: &mut ShelfSession,
    ) -> HyllaResult<Value> {
        if let Some(value) = candidate.local(path) {
            return Ok(value.clone());
        }
        match resolve_field(path, &self.namespace) {
            Ok(field) => {
                let record = session.record(&field.shelf, &field.entry)?;
                Ok(lookup(record, &field.field).cloned().unwrap_or(Value::Null))
            }
            Err(e) if e.is_recoverable() => Ok(Value::Null),
            Err(e) => Err(e),
        }
    }

    fn select(
        &self,
        candidates: Vec<Candidate>,
        filters: Option<&Filters>,
        session: &mut ShelfSession,
    ) -> HyllaResult<Vec<Candidate>> {
        let Some(filters) = filters else {
            return Ok(candidates);
        };
        let mut selected = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let keep = filter::evaluate(filters.items(), &mut |path: &str| {
                self.operand(&candidate, path, session)
            })?;
            if keep {
                selected.push(candidate);
            }
        }
        Ok(selected)
    }

    fn run_checkout(&self, q: &CheckOut) -> HyllaResult<CheckOutResult> {
        let mut session = self.session();

        let mut seen = HashSet::new();
        let mut candidates = Vec::new();
        for (index, item) in q.checkout().iter().enumerate() {
            for mut candidate in self.gather(item.path(), &mut session)? {
                if seen.insert(candidate.key.clone()) {
                    candidate.item = index;
                    candidates.push(candidate);
                }
            }
        }

        let mut selected = self.select(candidates, q.filters(), &mut session)?;
        if !q.sort().is_empty() {
            selected = self.sort(selected, q.sort(), &mut session)?;
        }

        let rows: Vec<CheckOutRow> = selected
            .into_iter()
            .skip(q.offset().unwrap_or(0))
            .take(q.limit().unwrap_or(usize::MAX))
            .map(|c| CheckOutRow {
                data: project(&q.checkout()[c.item], &c),
                path: c.key,
            })
            .collect();
        debug!(rows = rows.len(), "library.checkout");
        Ok(CheckOutResult { rows })
    }

    fn sort(
        &self,
        candidates: Vec<Candidate>,
        sort: &[SortItem],
        session: &mut ShelfSession,
    ) -> HyllaResult<Vec<Candidate>> {
        let mut keyed = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let keys = sort
                .iter()
                .map(|s| self.operand(&candidate, s.path(), session))
                .collect::<HyllaResult<Vec<_>>>()?;
            keyed.push((keys, candidate));
        }
        // Stable: equal keys keep namespace order.
        keyed.sort_by(|(a, _), (b, _)| {
            sort.iter()
                .zip(a.iter().zip(b))
                .map(|(item, (x, y))| match item.order() {
                    SortOrder::Asc => x.sort_cmp(y),
                    SortOrder::Desc => y.sort_cmp(x),
                })
                .find(|o| *o != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });
        Ok(keyed.into_iter().map(|(_, c)| c).collect())
    }

    fn revise(&mut self, q: &Revise) -> HyllaResult<QueryOutcome> {
        let mut session = self.session();
        let candidates = self.gather(q.path(), &mut session)?;
        let selected = self.select(candidates, q.filters(), &mut session)?;
        let count = selected.len();
        for candidate in selected {
            let mut record = candidate.record;
            record.extend(q.data().iter().map(|(k, v)| (k.clone(), v.clone())));
            let record = self.conform(&candidate.key, record)?;
            session.replace(&candidate.key, &candidate.entry, record)?;
        }
        session.commit()?;
        debug!(path = q.path(), count, "library.revise");
        Ok(QueryOutcome::Revised { count })
    }

    fn remove(&mut self, q: &Remove) -> HyllaResult<QueryOutcome> {
        let count = if let Some(filters) = q.filters() {
            let mut session = self.session();
            let candidates = self.gather(q.path(), &mut session)?;
            let selected = self.select(candidates, Some(filters), &mut session)?;
            drop(session);
            for candidate in &selected {
                self.delete_shelf(&candidate.key, &candidate.entry)?;
            }
            selected.len()
        } else if q.remove_shelf() {
            let entry = resolve_shelf(q.path(), &self.namespace)?.clone();
            self.delete_shelf(q.path(), &entry)?;
            1
        } else if q.remove_section() {
            resolve_section(q.path(), &self.namespace)?;
            self.delete_section(q.path())?
        } else {
            self.edit_field(q.path(), |record, field| remove_field(record, field).map(drop))?;
            1
        };
        info!(path = q.path(), count, "library.remove");
        Ok(QueryOutcome::Removed { count })
    }

    /// Unlinks the key before deleting contents, so a failed delete leaves
    /// an orphaned blob rather than a key pointing at nothing.
    fn delete_shelf(&mut self, key: &str, entry: &PathEntry) -> HyllaResult<()> {
        self.namespace.remove(key)?;
        self.shelves.delete(&entry.location)?;
        Ok(())
    }

    /// Removes a section and everything below it, deepest keys first.
    fn delete_section(&mut self, key: &str) -> HyllaResult<usize> {
        let nodes: Vec<(String, PathEntry)> = self
            .namespace
            .subtree(key)
            .into_iter()
            .map(|(k, e)| (k.to_string(), e.clone()))
            .collect();
        for (node, entry) in nodes.iter().rev() {
            self.namespace.remove(node)?;
            if entry.is_shelf() {
                self.shelves.delete(&entry.location)?;
            }
        }
        self.update_catalog(|c| {
            c.remove_subtree(key);
        })?;
        Ok(nodes.len())
    }

    /// Applies `edit` to the field a path addresses, then revalidates the shelf.
    fn edit_field(
        &mut self,
        path: &str,
        edit: impl FnOnce(&mut Record, &[String]) -> Option<()>,
    ) -> HyllaResult<()> {
        let field = resolve_field(path, &self.namespace)?;
        let mut session = self.session();
        let mut record = session.record(&field.shelf, &field.entry)?.clone();
        if edit(&mut record, &field.field).is_none() {
            return Err(ResolutionError::not_found(path).into());
        }
        let record = self.conform(&field.shelf, record)?;
        session.replace(&field.shelf, &field.entry, record)?;
        session.commit()?;
        Ok(())
    }

    fn reset(&mut self, q: &Reset) -> HyllaResult<QueryOutcome> {
        let count = if q.filters().is_some() || q.reset_shelf() || q.reset_section() {
            let mut session = self.session();
            let targets = match q.filters() {
                Some(filters) => {
                    let candidates = self.gather(q.path(), &mut session)?;
                    self.select(candidates, Some(filters), &mut session)?
                }
                None if q.reset_shelf() => {
                    resolve_shelf(q.path(), &self.namespace)?;
                    self.gather(q.path(), &mut session)?
                }
                None => {
                    resolve_section(q.path(), &self.namespace)?;
                    self.gather(q.path(), &mut session)?
                }
            };
            for target in &targets {
                session.replace(&target.key, &target.entry, Record::new())?;
            }
            session.commit()?;
            targets.len()
        } else {
            self.edit_field(q.path(), |record, field| {
                lookup_mut(record, field).map(|value| *value = Value::Null)
            })?;
            1
        };
        info!(path = q.path(), count, "library.reset");
        Ok(QueryOutcome::Reset { count })
    }

    fn set_schema(&mut self, q: &SetSchema) -> HyllaResult<QueryOutcome> {
        let schema = q.schema_model().clone();
        let target = if q.is_library() {
            self.update_catalog(|c| c.bind_library(schema))?;
            None
        } else {
            let path = q.path().ok_or_else(|| ValidationError::missing("path"))?;
            resolve_section(path, &self.namespace)?;
            self.update_catalog(|c| c.bind_section(path, schema))?;
            Some(path.to_string())
        };
        info!(
            target = target.as_deref().unwrap_or("<library>"),
            schema = q.schema_model().name(),
            "library.set_schema"
        );
        Ok(QueryOutcome::SchemaSet { target })
    }
}

/// Projects the checked-out fields of a candidate.
fn project(item: &CheckOutItem, candidate: &Candidate) -> Record {
    if item.selects_all() {
        return candidate.record.clone();
    }
    item.checkout()
        .iter()
        .map(|field| {
            let value = candidate.local(field).cloned().unwrap_or(Value::Null);
            (field.clone(), value)
        })
        .collect()
}
