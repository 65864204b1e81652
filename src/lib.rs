//! # HyllaDB - an embedded, path-addressed document store
//!
//! A library is a tree of **sections** (containers that may carry a schema)
//! and **shelves** (leaf records), addressed by dotted paths such as
//! `zoo.cats.tom.age`. Data is read and changed through HyQL: validated query
//! values rather than a string language.
//!
//! ## Core Concepts
//!
//! - **Path namespace**: the registry of every section and shelf
//! - **Schema**: a strict field table bound to a section, checked on every write
//! - **Query**: `BuildSection`, `BuildShelf`, `Write`, `CheckOut`, `Revise`,
//!   `Remove`, `Reset`, `SetSchema` and all-or-nothing `Transaction`s
//! - **Filters**: conditions and groups joined by `AND` / `OR`
//!
//! ## Usage
//!
//! ```rust
//! use hylladb::hyql::{BuildSection, BuildShelf, CheckOut, CheckOutItem, Condition, Filters};
//! use hylladb::schema::{FieldType, Schema, SchemaInstance};
//! use hylladb::{Library, Record};
//!
//! let animal = Schema::builder("Animal")
//!     .field("name", FieldType::String)
//!     .field("age", FieldType::Int)
//!     .build()?;
//!
//! let mut library = Library::in_memory()?;
//! library.execute(BuildSection::new(None, "zoo")?.with_schema(animal.clone()))?;
//!
//! let mut rex = Record::new();
//! rex.insert("name".into(), "Rex".into());
//! rex.insert("age".into(), 4.into());
//! let rex = SchemaInstance::new(animal, rex)?;
//! library.execute(BuildShelf::new(Some("zoo"), "rex")?.with_data(rex))?;
//!
//! let query = CheckOut::builder()
//!     .item(CheckOutItem::new("zoo", ["name"])?)
//!     .filters(Filters::single(Condition::new("age", ">=", 2)?))
//!     .build()?;
//! let result = library.checkout(&query)?;
//! assert_eq!(result.paths(), vec!["zoo.rex"]);
//! # Ok::<(), hylladb::HyllaError>(())
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod catalog;
pub mod engine;
pub mod error;
pub mod hyql;
pub mod namespace;
pub mod resolve;
pub mod schema;
pub mod storage;
pub mod value;

// Re-export primary types at crate root for convenience
pub use catalog::Catalog;
pub use engine::{CheckOutResult, CheckOutRow, Library, QueryOutcome};
pub use error::{HyllaError, HyllaResult, ResolutionError, ValidationError};
pub use hyql::Query;
pub use namespace::{Location, PathEntry, PathKind, PathMap};
pub use schema::{FieldDescriptor, FieldType, Schema, SchemaInstance, SchemaModel};
pub use storage::StorageError;
pub use value::{Record, Value};

#[cfg(feature = "persistent")]
pub use storage::persistent::PersistentConfig;
