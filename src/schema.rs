//! Schema models bound to sections and the library root.
//!
//! A [`Schema`] is an explicit field-descriptor table built once per record
//! shape. Validation is strict: unknown keys are rejected, required fields
//! must be present, and nested schemas are validated recursively.
//!
//! Schemas extend one another structurally. A schema built with
//! [`Schema::extend`] records its parent in its ancestry and starts from the
//! parent's fields, so its instances are accepted wherever the parent is bound.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::hyql::path::is_valid_name;
use crate::value::{Record, Value};

/// Expected type of a schema field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "of", rename_all = "snake_case")]
pub enum FieldType {
    /// Any value, including null.
    Any,
    Bool,
    Int,
    /// Floats; integers are accepted and widened.
    Float,
    String,
    /// A timestamp; RFC 3339 strings and `YYYY-MM-DD` dates are normalized.
    DateTime,
    /// A list whose elements all have the inner type.
    List(Box<FieldType>),
    /// A free-form nested record.
    Record,
    /// A nested record validated against another schema.
    Nested(Box<Schema>),
}

impl FieldType {
    /// Short description used in violation messages.
    pub fn describe(&self) -> String {
        match self {
            Self::Any => "any".to_string(),
            Self::Bool => "bool".to_string(),
            Self::Int => "int".to_string(),
            Self::Float => "float".to_string(),
            Self::String => "string".to_string(),
            Self::DateTime => "datetime".to_string(),
            Self::List(inner) => format!("list[{}]", inner.describe()),
            Self::Record => "record".to_string(),
            Self::Nested(schema) => schema.name().to_string(),
        }
    }

    /// Checks `value` against this type, returning the normalized value.
    fn check(&self, field: &str, value: &Value, owner: &str) -> Result<Value, ValidationError> {
        let mismatch = || {
            ValidationError::schema(
                owner,
                format!(
                    "field '{field}' expected {}, found {}",
                    self.describe(),
                    value.type_name()
                ),
            )
        };
        match (self, value) {
            (Self::Any, v) => Ok(v.clone()),
            (Self::Bool, Value::Bool(_))
            | (Self::Int, Value::Int(_))
            | (Self::Float, Value::Float(_))
            | (Self::String, Value::String(_))
            | (Self::DateTime, Value::DateTime(_))
            | (Self::Record, Value::Record(_)) => Ok(value.clone()),
            (Self::Float, Value::Int(_)) => value.as_float().map(Value::Float).ok_or_else(mismatch),
            (Self::DateTime, Value::String(_)) => {
                value.as_datetime().map(Value::DateTime).ok_or_else(mismatch)
            }
            (Self::List(inner), Value::List(items)) => items
                .iter()
                .enumerate()
                .map(|(i, item)| inner.check(&format!("{field}[{i}]"), item, owner))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            (Self::Nested(schema), Value::Record(record)) => schema
                .validate(record)
                .map(Value::Record)
                .map_err(|e| match e {
                    ValidationError::SchemaViolation { schema, reason } => ValidationError::schema(
                        owner,
                        format!("field '{field}' ({schema}): {reason}"),
                    ),
                    other => other,
                }),
            _ => Err(mismatch()),
        }
    }
}

/// One row of a schema's descriptor table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub field_type: FieldType,
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

/// A named record shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SchemaFields")]
pub struct Schema {
    name: String,
    fields: Vec<FieldDescriptor>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    ancestors: Vec<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SchemaFields {
    name: String,
    fields: Vec<FieldDescriptor>,
    #[serde(default)]
    ancestors: Vec<String>,
}

impl TryFrom<SchemaFields> for Schema {
    type Error = ValidationError;

    fn try_from(f: SchemaFields) -> Result<Self, Self::Error> {
        SchemaBuilder {
            name: f.name,
            fields: f.fields,
            ancestors: f.ancestors,
        }
        .build()
    }
}

impl Schema {
    /// Starts a new schema.
    pub fn builder(name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            name: name.into(),
            fields: Vec::new(),
            ancestors: Vec::new(),
        }
    }

    /// Starts a schema that structurally extends `self`.
    pub fn extend(&self, name: impl Into<String>) -> SchemaBuilder {
        let mut ancestors = self.ancestors.clone();
        ancestors.push(self.name.clone());
        SchemaBuilder {
            name: name.into(),
            fields: self.fields.clone(),
            ancestors,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Names of the schemas this one extends, oldest first.
    pub fn ancestors(&self) -> &[String] {
        &self.ancestors
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Returns true if instances of `self` are acceptable where `bound` is
    /// bound: the schemas are equal, or `self` extends `bound` and carries
    /// every one of its fields unchanged.
    pub fn is_a(&self, bound: &Self) -> bool {
        if self == bound {
            return true;
        }
        self.ancestors.iter().any(|a| a == &bound.name)
            && bound
                .fields
                .iter()
                .all(|f| self.field(&f.name) == Some(f))
    }

    /// Validates a whole record, returning its normalized form.
    pub fn validate(&self, record: &Record) -> Result<Record, ValidationError> {
        if let Some(unknown) = record.keys().find(|k| self.field(k).is_none()) {
            return Err(ValidationError::schema(
                &self.name,
                format!("unknown field '{unknown}'"),
            ));
        }
        let mut normalized = Record::new();
        for descriptor in &self.fields {
            let missing = || {
                ValidationError::schema(
                    &self.name,
                    format!("missing required field '{}'", descriptor.name),
                )
            };
            match record.get(&descriptor.name) {
                None if descriptor.required => return Err(missing()),
                None => {}
                Some(Value::Null)
                    if descriptor.required && descriptor.field_type != FieldType::Any =>
                {
                    return Err(missing());
                }
                Some(Value::Null) => {
                    normalized.insert(descriptor.name.clone(), Value::Null);
                }
                Some(value) => {
                    let checked = descriptor
                        .field_type
                        .check(&descriptor.name, value, &self.name)?;
                    normalized.insert(descriptor.name.clone(), checked);
                }
            }
        }
        Ok(normalized)
    }
}

/// Builder for [`Schema`]; validates on [`build`](Self::build).
#[derive(Debug, Clone)]
pub struct SchemaBuilder {
    name: String,
    fields: Vec<FieldDescriptor>,
    ancestors: Vec<String>,
}

impl SchemaBuilder {
    /// Adds a required field.
    #[must_use]
    pub fn field(self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.descriptor(name, field_type, true)
    }

    /// Adds an optional field.
    #[must_use]
    pub fn optional(self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.descriptor(name, field_type, false)
    }

    fn descriptor(
        mut self,
        name: impl Into<String>,
        field_type: FieldType,
        required: bool,
    ) -> Self {
        let name = name.into();
        let descriptor = FieldDescriptor {
            name: name.clone(),
            field_type,
            required,
        };
        // Redefining an inherited field replaces it in place.
        match self.fields.iter_mut().find(|f| f.name == name) {
            Some(existing) => *existing = descriptor,
            None => self.fields.push(descriptor),
        }
        self
    }

    /// Builds the schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema name or a field name is not a valid
    /// identifier, or if a field is declared twice.
    pub fn build(self) -> Result<Schema, ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::missing("name"));
        }
        for (i, field) in self.fields.iter().enumerate() {
            if !is_valid_name(&field.name) {
                return Err(ValidationError::InvalidName {
                    name: field.name.clone(),
                });
            }
            if self.fields[..i].iter().any(|f| f.name == field.name) {
                return Err(ValidationError::schema(
                    &self.name,
                    format!("field '{}' declared twice", field.name),
                ));
            }
        }
        Ok(Schema {
            name: self.name,
            fields: self.fields,
            ancestors: self.ancestors,
        })
    }
}

/// A record validated against a schema.
///
/// Every mutation goes through [`set`](Self::set), which revalidates the
/// whole record and leaves the instance untouched on failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "InstanceFields")]
pub struct SchemaInstance {
    schema: Schema,
    #[serde(with = "crate::value::plain_record")]
    data: Record,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct InstanceFields {
    schema: Schema,
    #[serde(with = "crate::value::plain_record")]
    data: Record,
}

impl TryFrom<InstanceFields> for SchemaInstance {
    type Error = ValidationError;

    fn try_from(f: InstanceFields) -> Result<Self, Self::Error> {
        Self::new(f.schema, f.data)
    }
}

impl SchemaInstance {
    /// Validates `data` against `schema`.
    pub fn new(schema: Schema, data: Record) -> Result<Self, ValidationError> {
        let data = schema.validate(&data)?;
        Ok(Self { schema, data })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn data(&self) -> &Record {
        &self.data
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.data.get(field)
    }

    /// Assigns a field and revalidates.
    pub fn set(
        &mut self,
        field: impl Into<String>,
        value: impl Into<Value>,
    ) -> Result<(), ValidationError> {
        let mut candidate = self.data.clone();
        candidate.insert(field.into(), value.into());
        self.data = self.schema.validate(&candidate)?;
        Ok(())
    }

    pub fn into_parts(self) -> (Schema, Record) {
        (self.schema, self.data)
    }
}

/// A Rust type with a fixed schema.
///
/// ```
/// use hylladb::schema::{FieldType, Schema, SchemaModel};
/// use serde::Serialize;
///
/// #[derive(Serialize)]
/// struct Animal {
///     name: String,
///     age: i64,
/// }
///
/// impl SchemaModel for Animal {
///     fn schema() -> Schema {
///         Schema::builder("Animal")
///             .field("name", FieldType::String)
///             .field("age", FieldType::Int)
///             .build()
///             .unwrap()
///     }
/// }
///
/// let rex = Animal { name: "Rex".into(), age: 4 }.to_instance().unwrap();
/// assert_eq!(rex.schema().name(), "Animal");
/// ```
pub trait SchemaModel: Serialize {
    /// The descriptor table for this type.
    fn schema() -> Schema;

    /// Converts `self` into a validated instance.
    fn to_instance(&self) -> Result<SchemaInstance, ValidationError>
    where
        Self: Sized,
    {
        let schema = Self::schema();
        let json = serde_json::to_value(self)
            .map_err(|e| ValidationError::schema(schema.name(), e.to_string()))?;
        match Value::from_json(json) {
            Value::Record(record) => SchemaInstance::new(schema, record),
            other => Err(ValidationError::schema(
                schema.name(),
                format!("expected a record, found {}", other.type_name()),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn animal() -> Schema {
        Schema::builder("Animal")
            .field("name", FieldType::String)
            .optional("age", FieldType::Int)
            .build()
            .unwrap()
    }

    fn record(json: serde_json::Value) -> Record {
        Value::from_json(json).as_record().cloned().unwrap()
    }

    #[test]
    fn test_validate_accepts_conforming_record() {
        let data = animal()
            .validate(&record(serde_json::json!({"name": "Rex", "age": 4})))
            .unwrap();
        assert_eq!(data.get("name"), Some(&Value::from("Rex")));
    }

    #[test]
    fn test_validate_rejects_unknown_field() {
        let err = animal()
            .validate(&record(serde_json::json!({"name": "Rex", "colour": "brown"})))
            .unwrap_err();
        assert!(matches!(
            err,
            ValidationError::SchemaViolation { ref reason, .. } if reason.contains("colour")
        ));
    }

    #[test]
    fn test_validate_rejects_missing_required() {
        let err = animal().validate(&record(serde_json::json!({"age": 4}))).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::SchemaViolation { ref reason, .. } if reason.contains("name")
        ));
        assert!(animal()
            .validate(&record(serde_json::json!({"name": null})))
            .is_err());
    }

    #[test]
    fn test_validate_rejects_type_mismatch() {
        let err = animal()
            .validate(&record(serde_json::json!({"name": "Rex", "age": "four"})))
            .unwrap_err();
        assert!(matches!(
            err,
            ValidationError::SchemaViolation { ref reason, .. } if reason.contains("expected int")
        ));
    }

    #[test]
    fn test_float_widens_and_datetime_normalizes() {
        let schema = Schema::builder("Reading")
            .field("value", FieldType::Float)
            .field("at", FieldType::DateTime)
            .build()
            .unwrap();
        let data = schema
            .validate(&record(serde_json::json!({"value": 3, "at": "2024-03-01"})))
            .unwrap();
        assert_eq!(data.get("value"), Some(&Value::Float(3.0)));
        assert_eq!(
            data.get("at"),
            Some(&Value::DateTime(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()))
        );
    }

    #[test]
    fn test_nested_and_list_fields() {
        let owner = Schema::builder("Owner").field("name", FieldType::String).build().unwrap();
        let pet = Schema::builder("Pet")
            .field("owner", FieldType::Nested(Box::new(owner)))
            .field("tags", FieldType::List(Box::new(FieldType::String)))
            .build()
            .unwrap();
        assert!(pet
            .validate(&record(serde_json::json!({"owner": {"name": "Sam"}, "tags": ["a"]})))
            .is_ok());
        let err = pet
            .validate(&record(serde_json::json!({"owner": {"name": 1}, "tags": []})))
            .unwrap_err();
        assert!(matches!(
            err,
            ValidationError::SchemaViolation { ref schema, .. } if schema == "Pet"
        ));
        assert!(pet
            .validate(&record(serde_json::json!({"owner": {"name": "Sam"}, "tags": [1]})))
            .is_err());
    }

    #[test]
    fn test_builder_rejects_bad_names() {
        assert!(matches!(
            Schema::builder("Bad").field("a.b", FieldType::Int).build(),
            Err(ValidationError::InvalidName { .. })
        ));
        assert!(Schema::builder("").build().is_err());
    }

    #[test]
    fn test_extend_is_a() {
        let base = animal();
        let dog = base.extend("Dog").field("breed", FieldType::String).build().unwrap();
        assert_eq!(dog.ancestors(), ["Animal".to_string()]);
        assert!(dog.is_a(&base));
        assert!(base.is_a(&base));
        assert!(!base.is_a(&dog));

        // Same name chain but a changed inherited descriptor is not compatible.
        let odd = base.extend("Odd").field("name", FieldType::Int).build().unwrap();
        assert!(!odd.is_a(&base));

        let unrelated = Schema::builder("Plant").field("name", FieldType::String).build().unwrap();
        assert!(!unrelated.is_a(&base));
    }

    #[test]
    fn test_instance_set_revalidates() {
        let mut rex =
            SchemaInstance::new(animal(), record(serde_json::json!({"name": "Rex"}))).unwrap();
        rex.set("age", 5).unwrap();
        assert_eq!(rex.get("age"), Some(&Value::Int(5)));

        assert!(rex.set("age", "old").is_err());
        assert_eq!(rex.get("age"), Some(&Value::Int(5)));
        assert!(rex.set("unknown", 1).is_err());
        assert!(rex.get("unknown").is_none());
    }

    #[test]
    fn test_schema_model_trait() {
        #[derive(Serialize)]
        struct Animal {
            name: String,
            age: i64,
        }

        impl SchemaModel for Animal {
            fn schema() -> Schema {
                animal()
            }
        }

        let inst = Animal {
            name: "Rex".into(),
            age: 4,
        }
        .to_instance()
        .unwrap();
        assert_eq!(inst.get("age"), Some(&Value::Int(4)));
    }

    #[test]
    fn test_schema_json_round_trip_revalidates() {
        let json = serde_json::to_string(&animal()).unwrap();
        let back: Schema = serde_json::from_str(&json).unwrap();
        assert_eq!(back, animal());

        let bad = r#"{"name": "X", "fields": [{"name": "a b", "field_type": {"kind": "int"}}]}"#;
        assert!(serde_json::from_str::<Schema>(bad).is_err());
    }

    #[test]
    fn test_instance_json_uses_plain_data() {
        let inst =
            SchemaInstance::new(animal(), record(serde_json::json!({"name": "Rex"}))).unwrap();
        let json = serde_json::to_value(&inst).unwrap();
        assert_eq!(json["data"]["name"], "Rex");
        let back: SchemaInstance = serde_json::from_value(json).unwrap();
        assert_eq!(back, inst);

        let bad = serde_json::json!({
            "schema": serde_json::to_value(animal()).unwrap(),
            "data": {"age": 1}
        });
        assert!(serde_json::from_value::<SchemaInstance>(bad).is_err());
    }
}
