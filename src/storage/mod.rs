//! Storage interfaces and backends.
//!
//! The engine talks to storage only through the traits in this module:
//! [`NamespaceStore`] for the path table, [`ShelfStore`] for shelf contents
//! and [`CatalogStore`] for schema bindings.

pub mod memory;
#[cfg(feature = "persistent")]
pub mod persistent;
mod traits;

pub use traits::{
    CatalogStore, NamespaceDelta, NamespaceStore, ShelfData, ShelfStore, StorageError,
};
