//! The HyQL query models.
//!
//! Every model is validated when it is constructed and when it is decoded,
//! so a value of any of these types always satisfies its structural
//! invariants. Namespace-dependent checks (does the path exist, does the
//! data match the bound schema) happen when the engine executes the query.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::schema::{Schema, SchemaInstance};
use crate::value::Record;

use super::condition::Filters;
use super::path::{validate_name, validate_path, CHECKOUT_ALL};
use super::validation::{
    validate_data, validate_exclusive, validate_filter_depth, validate_optional_path,
    MAX_TRANSACTION_QUERIES,
};

/// Registers a new section under `path` (the library root when `None`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BuildSectionFields")]
pub struct BuildSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    schema_model: Option<Schema>,
    #[serde(
        with = "crate::value::plain_record_opt",
        skip_serializing_if = "Option::is_none"
    )]
    metadata: Option<Record>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct BuildSectionFields {
    #[serde(default)]
    path: Option<String>,
    name: String,
    #[serde(default)]
    schema_model: Option<Schema>,
    #[serde(default, with = "crate::value::plain_record_opt")]
    metadata: Option<Record>,
}

impl TryFrom<BuildSectionFields> for BuildSection {
    type Error = ValidationError;

    fn try_from(f: BuildSectionFields) -> Result<Self, Self::Error> {
        let query = Self {
            path: f.path,
            name: f.name,
            schema_model: f.schema_model,
            metadata: f.metadata,
        };
        query.validate()?;
        Ok(query)
    }
}

impl BuildSection {
    pub fn new(path: Option<&str>, name: &str) -> Result<Self, ValidationError> {
        let query = Self {
            path: path.map(str::to_string),
            name: name.to_string(),
            schema_model: None,
            metadata: None,
        };
        query.validate()?;
        Ok(query)
    }

    /// Binds `schema` to the new section.
    #[must_use]
    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema_model = Some(schema);
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: Record) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema_model(&self) -> Option<&Schema> {
        self.schema_model.as_ref()
    }

    pub fn metadata(&self) -> Option<&Record> {
        self.metadata.as_ref()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_optional_path(self.path.as_deref())?;
        validate_name(&self.name)?;
        Ok(())
    }
}

/// Registers a new shelf under `path` (the library root when `None`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BuildShelfFields")]
pub struct BuildShelf {
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<SchemaInstance>,
    #[serde(
        with = "crate::value::plain_record_opt",
        skip_serializing_if = "Option::is_none"
    )]
    metadata: Option<Record>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct BuildShelfFields {
    #[serde(default)]
    path: Option<String>,
    name: String,
    #[serde(default)]
    data: Option<SchemaInstance>,
    #[serde(default, with = "crate::value::plain_record_opt")]
    metadata: Option<Record>,
}

impl TryFrom<BuildShelfFields> for BuildShelf {
    type Error = ValidationError;

    fn try_from(f: BuildShelfFields) -> Result<Self, Self::Error> {
        let query = Self {
            path: f.path,
            name: f.name,
            data: f.data,
            metadata: f.metadata,
        };
        query.validate()?;
        Ok(query)
    }
}

impl BuildShelf {
    pub fn new(path: Option<&str>, name: &str) -> Result<Self, ValidationError> {
        let query = Self {
            path: path.map(str::to_string),
            name: name.to_string(),
            data: None,
            metadata: None,
        };
        query.validate()?;
        Ok(query)
    }

    /// Initial shelf contents.
    #[must_use]
    pub fn with_data(mut self, data: SchemaInstance) -> Self {
        self.data = Some(data);
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: Record) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> Option<&SchemaInstance> {
        self.data.as_ref()
    }

    pub fn metadata(&self) -> Option<&Record> {
        self.metadata.as_ref()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_optional_path(self.path.as_deref())?;
        validate_name(&self.name)?;
        Ok(())
    }
}

/// Inserts new fields into an existing shelf. Never overwrites.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WriteFields")]
pub struct Write {
    path: String,
    #[serde(with = "crate::value::plain_record")]
    data: Record,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct WriteFields {
    path: String,
    #[serde(with = "crate::value::plain_record")]
    data: Record,
}

impl TryFrom<WriteFields> for Write {
    type Error = ValidationError;

    fn try_from(f: WriteFields) -> Result<Self, Self::Error> {
        let query = Self {
            path: f.path,
            data: f.data,
        };
        query.validate()?;
        Ok(query)
    }
}

impl Write {
    pub fn new(path: &str, data: Record) -> Result<Self, ValidationError> {
        let query = Self {
            path: path.to_string(),
            data,
        };
        query.validate()?;
        Ok(query)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn data(&self) -> &Record {
        &self.data
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_path(&self.path)?;
        validate_data("data", &self.data)
    }
}

/// One path to read and the fields to project from each record under it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "CheckOutItemFields")]
pub struct CheckOutItem {
    path: String,
    checkout: Vec<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct CheckOutItemFields {
    path: String,
    checkout: Vec<String>,
}

impl TryFrom<CheckOutItemFields> for CheckOutItem {
    type Error = ValidationError;

    fn try_from(f: CheckOutItemFields) -> Result<Self, Self::Error> {
        let item = Self {
            path: f.path,
            checkout: f.checkout,
        };
        item.validate()?;
        Ok(item)
    }
}

impl CheckOutItem {
    pub fn new<I, S>(path: &str, checkout: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let item = Self {
            path: path.to_string(),
            checkout: checkout.into_iter().map(Into::into).collect(),
        };
        item.validate()?;
        Ok(item)
    }

    /// Selects every field of every record under `path`.
    pub fn all(path: &str) -> Result<Self, ValidationError> {
        Self::new(path, [CHECKOUT_ALL])
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn checkout(&self) -> &[String] {
        &self.checkout
    }

    pub fn selects_all(&self) -> bool {
        self.checkout.iter().any(|c| c == CHECKOUT_ALL)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_path(&self.path)?;
        if self.checkout.is_empty() {
            return Err(ValidationError::invalid_field(
                "checkout",
                "at least one field or '*all' is required",
            ));
        }
        if self.selects_all() {
            if self.checkout.len() > 1 {
                return Err(ValidationError::invalid_field(
                    "checkout",
                    "'*all' must be the only entry when present",
                ));
            }
            return Ok(());
        }
        for field in &self.checkout {
            validate_path(field)?;
        }
        Ok(())
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// One sort key of a checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SortItemFields")]
pub struct SortItem {
    path: String,
    order: SortOrder,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SortItemFields {
    path: String,
    #[serde(default)]
    order: SortOrder,
}

impl TryFrom<SortItemFields> for SortItem {
    type Error = ValidationError;

    fn try_from(f: SortItemFields) -> Result<Self, Self::Error> {
        Self::new(&f.path, f.order)
    }
}

impl SortItem {
    pub fn new(path: &str, order: SortOrder) -> Result<Self, ValidationError> {
        validate_path(path)?;
        Ok(Self {
            path: path.to_string(),
            order,
        })
    }

    pub fn asc(path: &str) -> Result<Self, ValidationError> {
        Self::new(path, SortOrder::Asc)
    }

    pub fn desc(path: &str) -> Result<Self, ValidationError> {
        Self::new(path, SortOrder::Desc)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn order(&self) -> SortOrder {
        self.order
    }
}

/// Read query.
///
/// Execution order: gather, filter, sort, offset, limit, project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CheckOutFields")]
pub struct CheckOut {
    checkout: Vec<CheckOutItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    filters: Option<Filters>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    sort: Vec<SortItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<usize>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct CheckOutFields {
    checkout: Vec<CheckOutItem>,
    #[serde(default)]
    filters: Option<Filters>,
    #[serde(default)]
    sort: Option<Vec<SortItem>>,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    offset: Option<usize>,
}

impl TryFrom<CheckOutFields> for CheckOut {
    type Error = ValidationError;

    fn try_from(f: CheckOutFields) -> Result<Self, Self::Error> {
        let query = Self {
            checkout: f.checkout,
            filters: f.filters,
            sort: f.sort.unwrap_or_default(),
            limit: f.limit,
            offset: f.offset,
        };
        query.validate()?;
        Ok(query)
    }
}

impl CheckOut {
    /// Starts a checkout query.
    pub fn builder() -> CheckOutBuilder {
        CheckOutBuilder::default()
    }

    pub fn checkout(&self) -> &[CheckOutItem] {
        &self.checkout
    }

    pub fn filters(&self) -> Option<&Filters> {
        self.filters.as_ref()
    }

    pub fn sort(&self) -> &[SortItem] {
        &self.sort
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    pub fn offset(&self) -> Option<usize> {
        self.offset
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.checkout.is_empty() {
            return Err(ValidationError::missing("checkout"));
        }
        for item in &self.checkout {
            item.validate()?;
        }
        if self.limit == Some(0) {
            return Err(ValidationError::invalid_field("limit", "must be at least 1"));
        }
        validate_filter_depth(self.filters.as_ref())
    }
}

/// Builder for [`CheckOut`]; validates on [`build`](Self::build).
#[derive(Debug, Clone, Default)]
pub struct CheckOutBuilder {
    checkout: Vec<CheckOutItem>,
    filters: Option<Filters>,
    sort: Vec<SortItem>,
    limit: Option<usize>,
    offset: Option<usize>,
}

impl CheckOutBuilder {
    #[must_use]
    pub fn item(mut self, item: CheckOutItem) -> Self {
        self.checkout.push(item);
        self
    }

    #[must_use]
    pub fn filters(mut self, filters: Filters) -> Self {
        self.filters = Some(filters);
        self
    }

    #[must_use]
    pub fn sort(mut self, item: SortItem) -> Self {
        self.sort.push(item);
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn build(self) -> Result<CheckOut, ValidationError> {
        let query = CheckOut {
            checkout: self.checkout,
            filters: self.filters,
            sort: self.sort,
            limit: self.limit,
            offset: self.offset,
        };
        query.validate()?;
        Ok(query)
    }
}

/// Key-wise merge of `data` into every shelf under `path` that passes `filters`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ReviseFields")]
pub struct Revise {
    path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    filters: Option<Filters>,
    #[serde(with = "crate::value::plain_record")]
    data: Record,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ReviseFields {
    path: String,
    #[serde(default)]
    filters: Option<Filters>,
    #[serde(with = "crate::value::plain_record")]
    data: Record,
}

impl TryFrom<ReviseFields> for Revise {
    type Error = ValidationError;

    fn try_from(f: ReviseFields) -> Result<Self, Self::Error> {
        Self::new(&f.path, f.filters, f.data)
    }
}

impl Revise {
    pub fn new(
        path: &str,
        filters: Option<Filters>,
        data: Record,
    ) -> Result<Self, ValidationError> {
        let query = Self {
            path: path.to_string(),
            filters,
            data,
        };
        query.validate()?;
        Ok(query)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn filters(&self) -> Option<&Filters> {
        self.filters.as_ref()
    }

    pub fn data(&self) -> &Record {
        &self.data
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_path(&self.path)?;
        validate_data("data", &self.data)?;
        validate_filter_depth(self.filters.as_ref())
    }
}

/// Deletes shelves, sections or a single field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RemoveFields")]
pub struct Remove {
    path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    filters: Option<Filters>,
    remove_shelf: bool,
    remove_section: bool,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RemoveFields {
    path: String,
    #[serde(default)]
    filters: Option<Filters>,
    #[serde(default)]
    remove_shelf: bool,
    #[serde(default)]
    remove_section: bool,
}

impl TryFrom<RemoveFields> for Remove {
    type Error = ValidationError;

    fn try_from(f: RemoveFields) -> Result<Self, Self::Error> {
        Self::new(&f.path, f.filters, f.remove_shelf, f.remove_section)
    }
}

impl Remove {
    pub fn new(
        path: &str,
        filters: Option<Filters>,
        remove_shelf: bool,
        remove_section: bool,
    ) -> Result<Self, ValidationError> {
        let query = Self {
            path: path.to_string(),
            filters,
            remove_shelf,
            remove_section,
        };
        query.validate()?;
        Ok(query)
    }

    /// Removes the shelf at `path`.
    pub fn shelf(path: &str) -> Result<Self, ValidationError> {
        Self::new(path, None, true, false)
    }

    /// Removes the section at `path` and everything below it.
    pub fn section(path: &str) -> Result<Self, ValidationError> {
        Self::new(path, None, false, true)
    }

    /// Removes the field addressed by `path`.
    pub fn field(path: &str) -> Result<Self, ValidationError> {
        Self::new(path, None, false, false)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn filters(&self) -> Option<&Filters> {
        self.filters.as_ref()
    }

    pub fn remove_shelf(&self) -> bool {
        self.remove_shelf
    }

    pub fn remove_section(&self) -> bool {
        self.remove_section
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_path(&self.path)?;
        validate_exclusive(
            ("remove_shelf", self.remove_shelf),
            ("remove_section", self.remove_section),
        )?;
        validate_filter_depth(self.filters.as_ref())
    }
}

/// Clears data without removing nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ResetFields")]
pub struct Reset {
    path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    filters: Option<Filters>,
    reset_shelf: bool,
    reset_section: bool,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ResetFields {
    path: String,
    #[serde(default)]
    filters: Option<Filters>,
    #[serde(default)]
    reset_shelf: bool,
    #[serde(default)]
    reset_section: bool,
}

impl TryFrom<ResetFields> for Reset {
    type Error = ValidationError;

    fn try_from(f: ResetFields) -> Result<Self, Self::Error> {
        Self::new(&f.path, f.filters, f.reset_shelf, f.reset_section)
    }
}

impl Reset {
    pub fn new(
        path: &str,
        filters: Option<Filters>,
        reset_shelf: bool,
        reset_section: bool,
    ) -> Result<Self, ValidationError> {
        let query = Self {
            path: path.to_string(),
            filters,
            reset_shelf,
            reset_section,
        };
        query.validate()?;
        Ok(query)
    }

    /// Clears the shelf at `path`.
    pub fn shelf(path: &str) -> Result<Self, ValidationError> {
        Self::new(path, None, true, false)
    }

    /// Clears every shelf below the section at `path`.
    pub fn section(path: &str) -> Result<Self, ValidationError> {
        Self::new(path, None, false, true)
    }

    /// Sets the field addressed by `path` to null.
    pub fn field(path: &str) -> Result<Self, ValidationError> {
        Self::new(path, None, false, false)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn filters(&self) -> Option<&Filters> {
        self.filters.as_ref()
    }

    pub fn reset_shelf(&self) -> bool {
        self.reset_shelf
    }

    pub fn reset_section(&self) -> bool {
        self.reset_section
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_path(&self.path)?;
        validate_exclusive(
            ("reset_shelf", self.reset_shelf),
            ("reset_section", self.reset_section),
        )?;
        validate_filter_depth(self.filters.as_ref())
    }
}

/// Binds a schema to a section, or to the library root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SetSchemaFields")]
pub struct SetSchema {
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    schema_model: Schema,
    is_library: bool,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SetSchemaFields {
    #[serde(default)]
    path: Option<String>,
    schema_model: Schema,
    #[serde(default)]
    is_library: bool,
}

impl TryFrom<SetSchemaFields> for SetSchema {
    type Error = ValidationError;

    fn try_from(f: SetSchemaFields) -> Result<Self, Self::Error> {
        Self::new(f.path.as_deref(), f.schema_model, f.is_library)
    }
}

impl SetSchema {
    pub fn new(
        path: Option<&str>,
        schema_model: Schema,
        is_library: bool,
    ) -> Result<Self, ValidationError> {
        let query = Self {
            path: path.map(str::to_string),
            schema_model,
            is_library,
        };
        query.validate()?;
        Ok(query)
    }

    pub fn for_section(path: &str, schema_model: Schema) -> Result<Self, ValidationError> {
        Self::new(Some(path), schema_model, false)
    }

    pub fn for_library(schema_model: Schema) -> Result<Self, ValidationError> {
        Self::new(None, schema_model, true)
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub fn schema_model(&self) -> &Schema {
        &self.schema_model
    }

    pub fn is_library(&self) -> bool {
        self.is_library
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        match (&self.path, self.is_library) {
            (Some(_), true) => Err(ValidationError::MutuallyExclusiveFlags {
                first: "path".to_string(),
                second: "is_library".to_string(),
            }),
            (None, false) => Err(ValidationError::missing("path")),
            (Some(path), false) => validate_path(path).map(|_| ()),
            (None, true) => Ok(()),
        }
    }
}

/// A batch applied all-or-nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TransactionFields")]
pub struct Transaction {
    queries: Vec<Query>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct TransactionFields {
    queries: Vec<Query>,
}

impl TryFrom<TransactionFields> for Transaction {
    type Error = ValidationError;

    fn try_from(f: TransactionFields) -> Result<Self, Self::Error> {
        Self::new(f.queries)
    }
}

impl Transaction {
    pub fn new(queries: Vec<Query>) -> Result<Self, ValidationError> {
        let tx = Self { queries };
        tx.validate()?;
        Ok(tx)
    }

    pub fn queries(&self) -> &[Query] {
        &self.queries
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.queries.is_empty() {
            return Err(ValidationError::invalid_field("queries", "must not be empty"));
        }
        if self.queries.len() > MAX_TRANSACTION_QUERIES {
            return Err(ValidationError::invalid_field(
                "queries",
                format!("at most {MAX_TRANSACTION_QUERIES} queries per transaction"),
            ));
        }
        if let Some(i) = self
            .queries
            .iter()
            .position(|q| matches!(q, Query::Transaction(_)))
        {
            return Err(ValidationError::invalid_field(
                format!("queries[{i}]"),
                "transactions cannot be nested",
            ));
        }
        for query in &self.queries {
            query.validate()?;
        }
        Ok(())
    }
}

/// Any query the engine accepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "payload", rename_all = "snake_case")]
pub enum Query {
    BuildSection(BuildSection),
    BuildShelf(BuildShelf),
    Write(Write),
    #[serde(rename = "checkout")]
    CheckOut(CheckOut),
    Revise(Revise),
    Remove(Remove),
    Reset(Reset),
    SetSchema(SetSchema),
    Transaction(Transaction),
}

impl Query {
    /// Operation name, as used in the JSON tag.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::BuildSection(_) => "build_section",
            Self::BuildShelf(_) => "build_shelf",
            Self::Write(_) => "write",
            Self::CheckOut(_) => "checkout",
            Self::Revise(_) => "revise",
            Self::Remove(_) => "remove",
            Self::Reset(_) => "reset",
            Self::SetSchema(_) => "set_schema",
            Self::Transaction(_) => "transaction",
        }
    }

    pub const fn is_read_only(&self) -> bool {
        matches!(self, Self::CheckOut(_))
    }

    /// Paths whose existing shelves this query may modify.
    pub fn touched_paths(&self) -> Vec<&str> {
        match self {
            Self::Write(q) => vec![q.path()],
            Self::Revise(q) => vec![q.path()],
            Self::Remove(q) => vec![q.path()],
            Self::Reset(q) => vec![q.path()],
            Self::Transaction(tx) => tx.queries.iter().flat_map(Self::touched_paths).collect(),
            Self::BuildSection(_)
            | Self::BuildShelf(_)
            | Self::CheckOut(_)
            | Self::SetSchema(_) => Vec::new(),
        }
    }

    /// Re-runs structural validation.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Self::BuildSection(q) => q.validate(),
            Self::BuildShelf(q) => q.validate(),
            Self::Write(q) => q.validate(),
            Self::CheckOut(q) => q.validate(),
            Self::Revise(q) => q.validate(),
            Self::Remove(q) => q.validate(),
            Self::Reset(q) => q.validate(),
            Self::SetSchema(q) => q.validate(),
            Self::Transaction(q) => q.validate(),
        }
    }

    /// Decodes a query from its tagged JSON form.
    ///
    /// Serde reports a failed model constructor only as a message, so the
    /// payload is decoded here and the constructor's error returned as is.
    /// Errors from nested conditions and items still arrive as messages.
    pub(crate) fn from_value(value: serde_json::Value) -> Result<Self, ValidationError> {
        let serde_json::Value::Object(mut map) = value else {
            return Err(ValidationError::invalid_field("query", "expected an object"));
        };
        let op = match map.remove("op") {
            Some(serde_json::Value::String(op)) => op,
            _ => return Err(ValidationError::invalid_field("op", "expected a string")),
        };
        let payload = map.remove("payload").unwrap_or(serde_json::Value::Null);
        let query = match op.as_str() {
            "build_section" => Self::BuildSection(decode::<BuildSectionFields, _>(payload)?),
            "build_shelf" => Self::BuildShelf(decode::<BuildShelfFields, _>(payload)?),
            "write" => Self::Write(decode::<WriteFields, _>(payload)?),
            "checkout" => Self::CheckOut(decode::<CheckOutFields, _>(payload)?),
            "revise" => Self::Revise(decode::<ReviseFields, _>(payload)?),
            "remove" => Self::Remove(decode::<RemoveFields, _>(payload)?),
            "reset" => Self::Reset(decode::<ResetFields, _>(payload)?),
            "set_schema" => Self::SetSchema(decode::<SetSchemaFields, _>(payload)?),
            "transaction" => {
                let raw: RawTransaction = structural(payload)?;
                let mut queries = Vec::with_capacity(raw.queries.len());
                for (i, value) in raw.queries.into_iter().enumerate() {
                    if value.get("op").and_then(serde_json::Value::as_str) == Some("transaction") {
                        return Err(ValidationError::invalid_field(
                            format!("queries[{i}]"),
                            "transactions cannot be nested",
                        ));
                    }
                    queries.push(Self::from_value(value)?);
                }
                Self::Transaction(Transaction::new(queries)?)
            }
            other => {
                return Err(ValidationError::invalid_field(
                    "op",
                    format!("unknown operation `{other}`"),
                ))
            }
        };
        Ok(query)
    }
}

/// Transaction payload with its queries left undecoded.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTransaction {
    queries: Vec<serde_json::Value>,
}

fn structural<F: DeserializeOwned>(payload: serde_json::Value) -> Result<F, ValidationError> {
    serde_json::from_value(payload)
        .map_err(|e| ValidationError::invalid_field("payload", e.to_string()))
}

fn decode<F, T>(payload: serde_json::Value) -> Result<T, ValidationError>
where
    F: DeserializeOwned,
    T: TryFrom<F, Error = ValidationError>,
{
    T::try_from(structural::<F>(payload)?)
}

macro_rules! impl_from_query {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for Query {
                fn from(q: $variant) -> Self {
                    Self::$variant(q)
                }
            }
        )*
    };
}

impl_from_query!(
    BuildSection,
    BuildShelf,
    Write,
    CheckOut,
    Revise,
    Remove,
    Reset,
    SetSchema,
    Transaction,
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldType;
    use crate::value::Value;

    fn data(json: serde_json::Value) -> Record {
        Value::from_json(json).as_record().cloned().unwrap()
    }

    fn animal() -> Schema {
        Schema::builder("Animal")
            .field("name", FieldType::String)
            .build()
            .unwrap()
    }

    #[test]
    fn test_remove_flags_exclusive() {
        let err = Remove::new("a.b", None, true, true).unwrap_err();
        assert!(matches!(err, ValidationError::MutuallyExclusiveFlags { .. }));
        assert!(Remove::shelf("a.b").is_ok());
        assert!(Reset::new("a.b", None, true, true).is_err());
    }

    #[test]
    fn test_set_schema_path_xor_library() {
        let err = SetSchema::new(Some("a.b"), animal(), true).unwrap_err();
        assert_eq!(
            err,
            ValidationError::MutuallyExclusiveFlags {
                first: "path".into(),
                second: "is_library".into()
            }
        );
        assert!(matches!(
            SetSchema::new(None, animal(), false),
            Err(ValidationError::MissingField { .. })
        ));
        assert!(SetSchema::for_section("a.b", animal()).is_ok());
        assert!(SetSchema::for_library(animal()).is_ok());
    }

    #[test]
    fn test_checkout_item_all_must_be_alone() {
        let err = CheckOutItem::new("a.b", ["*all", "field1"]).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::InvalidField { ref field, .. } if field == "checkout"
        ));
        assert!(CheckOutItem::all("a.b").unwrap().selects_all());
        assert!(CheckOutItem::new("a.b", Vec::<String>::new()).is_err());
        assert!(CheckOutItem::new("a.b", ["bad field"]).is_err());
    }

    #[test]
    fn test_checkout_limit_and_items() {
        assert!(CheckOut::builder().build().is_err());
        let item = CheckOutItem::all("a").unwrap();
        assert!(CheckOut::builder().item(item.clone()).limit(0).build().is_err());
        let q = CheckOut::builder()
            .item(item)
            .sort(SortItem::desc("age").unwrap())
            .limit(5)
            .offset(0)
            .build()
            .unwrap();
        assert_eq!(q.limit(), Some(5));
        assert_eq!(q.sort()[0].order(), SortOrder::Desc);
    }

    #[test]
    fn test_build_names_have_no_dots() {
        assert!(matches!(
            BuildShelf::new(Some("a"), "b.c"),
            Err(ValidationError::InvalidName { .. })
        ));
        assert!(BuildSection::new(None, "animals").is_ok());
        assert!(BuildSection::new(Some("bad path"), "x").is_err());
    }

    #[test]
    fn test_write_requires_data() {
        assert!(Write::new("a.b", Record::new()).is_err());
        assert!(Write::new("a.b", data(serde_json::json!({"name": "Rex"}))).is_ok());
    }

    #[test]
    fn test_transaction_rules() {
        assert!(Transaction::new(vec![]).is_err());
        let inner = Transaction::new(vec![Remove::shelf("a.b").unwrap().into()]).unwrap();
        let err = Transaction::new(vec![inner.into()]).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::InvalidField { ref reason, .. } if reason.contains("nested")
        ));
    }

    #[test]
    fn test_query_json_tagging() {
        let q: Query = Remove::shelf("a.b").unwrap().into();
        let json = serde_json::to_value(&q).unwrap();
        assert_eq!(json["op"], "remove");
        assert_eq!(json["payload"]["remove_shelf"], true);
        let back: Query = serde_json::from_value(json).unwrap();
        assert_eq!(back, q);
    }

    #[test]
    fn test_query_json_decoding_validates() {
        let bad = serde_json::json!({
            "op": "remove",
            "payload": {"path": "a.b", "remove_shelf": true, "remove_section": true}
        });
        assert!(serde_json::from_value::<Query>(bad).is_err());

        let bad = serde_json::json!({
            "op": "checkout",
            "payload": {"checkout": [{"path": "a", "checkout": ["*all", "x"]}]}
        });
        assert!(serde_json::from_value::<Query>(bad).is_err());

        let bad = serde_json::json!({
            "op": "set_schema",
            "payload": {"path": "a", "schema_model": animal(), "is_library": true}
        });
        assert!(serde_json::from_value::<Query>(bad).is_err());
    }

    #[test]
    fn test_checkout_json_full() {
        let q: Query = serde_json::from_value(serde_json::json!({
            "op": "checkout",
            "payload": {
                "checkout": [
                    {
                        "path": "path1.sub_path1",
                        "checkout": ["sub_path1.field1", "sub_path1.field2"]
                    },
                    {"path": "path2", "checkout": ["*all"]}
                ],
                "filters": [
                    {"condition": {"left": "path1.field1", "operator": "==", "right": "value1"}},
                    "AND",
                    {"group": [
                        {"condition": {"left": "path1.field2", "operator": ">", "right": 100}},
                        "OR",
                        {"condition": {"left": "path2.field3", "operator": "<",
                                       "right": "path1.field2", "right_is_path": true}}
                    ]}
                ],
                "sort": [{"path": "path1.field1", "order": "asc"}],
                "limit": 10,
                "offset": 0
            }
        }))
        .unwrap();
        let Query::CheckOut(checkout) = q else {
            panic!("expected checkout");
        };
        assert_eq!(checkout.checkout().len(), 2);
        assert_eq!(checkout.filters().unwrap().items().len(), 3);
        assert_eq!(checkout.limit(), Some(10));
        assert_eq!(checkout.offset(), Some(0));
    }

    #[test]
    fn test_touched_paths() {
        let tx: Query = Transaction::new(vec![
            Write::new("a.b", data(serde_json::json!({"x": 1}))).unwrap().into(),
            Remove::field("c.d.e").unwrap().into(),
            BuildSection::new(None, "z").unwrap().into(),
        ])
        .unwrap()
        .into();
        assert_eq!(tx.touched_paths(), vec!["a.b", "c.d.e"]);
    }
}
