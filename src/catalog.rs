//! Schema bindings and section metadata.
//!
//! The catalog records which schema constrains the shelves directly below
//! each section (and below the library root), plus the metadata given when a
//! section was built. It is persisted as a whole after every change.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::hyql::path::is_within;
use crate::schema::Schema;
use crate::value::Record;

/// Catalog entry for one section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SectionEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Schema>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Record>,
}

/// Schema bindings for the library root and every section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    library_schema: Option<Schema>,
    #[serde(default)]
    sections: BTreeMap<String, SectionEntry>,
}

impl Catalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Schema constraining shelves directly below `parent` (`None` = root).
    #[must_use]
    pub fn bound_schema(&self, parent: Option<&str>) -> Option<&Schema> {
        match parent {
            None => self.library_schema.as_ref(),
            Some(key) => self.sections.get(key).and_then(|s| s.schema.as_ref()),
        }
    }

    #[must_use]
    pub fn library_schema(&self) -> Option<&Schema> {
        self.library_schema.as_ref()
    }

    #[must_use]
    pub fn section(&self, key: &str) -> Option<&SectionEntry> {
        self.sections.get(key)
    }

    #[must_use]
    pub fn section_metadata(&self, key: &str) -> Option<&Record> {
        self.sections.get(key).and_then(|s| s.metadata.as_ref())
    }

    /// Records a newly built section.
    pub fn register_section(
        &mut self,
        key: &str,
        schema: Option<Schema>,
        metadata: Option<Record>,
    ) {
        self.sections
            .insert(key.to_string(), SectionEntry { schema, metadata });
    }

    /// Binds `schema` to a section, replacing any previous binding.
    pub fn bind_section(&mut self, key: &str, schema: Schema) {
        self.sections.entry(key.to_string()).or_default().schema = Some(schema);
    }

    pub fn bind_library(&mut self, schema: Schema) {
        self.library_schema = Some(schema);
    }

    /// Drops the entries of `key` and every section below it.
    pub fn remove_subtree(&mut self, key: &str) -> usize {
        let before = self.sections.len();
        self.sections.retain(|k, _| !is_within(k, key));
        before - self.sections.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sections.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty() && self.library_schema.is_none()
    }
}
