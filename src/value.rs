//! Values stored on shelves and used as condition literals.
//!
//! A shelf holds a [`Record`]: an ordered map from field key to [`Value`].
//! Records nest, so a dotted field path such as `owner.name` addresses a
//! value inside a nested record.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Field key → value map held by a shelf.
pub type Record = BTreeMap<String, Value>;

/// Possible values a record field can hold.
///
/// # Examples
///
/// ```
/// use hylladb::Value;
///
/// let int_val = Value::Int(3);
/// let float_val = Value::Float(3.0);
/// let string_val = Value::String("hello".to_string());
///
/// assert!(int_val.loose_eq(&float_val));
/// assert!(string_val.is_string());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    DateTime(DateTime<Utc>),
    List(Vec<Value>),
    Record(Record),
    Null,
}

impl Value {
    pub const fn is_bool(&self) -> bool {
        matches!(self, Self::Bool(_))
    }

    pub const fn is_int(&self) -> bool {
        matches!(self, Self::Int(_))
    }

    pub const fn is_float(&self) -> bool {
        matches!(self, Self::Float(_))
    }

    pub const fn is_number(&self) -> bool {
        matches!(self, Self::Int(_) | Self::Float(_))
    }

    pub const fn is_string(&self) -> bool {
        matches!(self, Self::String(_))
    }

    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(v) => Some(v),
            _ => None,
        }
    }

    pub const fn as_record(&self) -> Option<&Record> {
        match self {
            Self::Record(v) => Some(v),
            _ => None,
        }
    }

    /// Reads the value as a UTC timestamp.
    ///
    /// Strings are accepted in RFC 3339 form or as a plain `YYYY-MM-DD` date
    /// (midnight UTC).
    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::DateTime(v) => Some(*v),
            Self::String(s) => {
                if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                    return Some(dt.with_timezone(&Utc));
                }
                NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
                    .map(|naive| naive.and_utc())
            }
            _ => None,
        }
    }

    /// Returns a human-readable type name.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::DateTime(_) => "datetime",
            Self::List(_) => "list",
            Self::Record(_) => "record",
            Self::Null => "null",
        }
    }

    /// Length of strings (in chars), lists and records.
    pub fn len(&self) -> Option<usize> {
        match self {
            Self::String(s) => Some(s.chars().count()),
            Self::List(v) => Some(v.len()),
            Self::Record(r) => Some(r.len()),
            _ => None,
        }
    }

    /// Truthiness used by the logical condition operators.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Bool(v) => *v,
            Self::Int(v) => *v != 0,
            Self::Float(v) => *v != 0.0,
            Self::String(s) => !s.is_empty(),
            Self::DateTime(_) => true,
            Self::List(v) => !v.is_empty(),
            Self::Record(r) => !r.is_empty(),
            Self::Null => false,
        }
    }

    /// Equality with int/float coercion.
    pub fn loose_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a == b,
            (a, b) if a.is_number() && b.is_number() => a.as_float() == b.as_float(),
            (Self::List(a), Self::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.loose_eq(y))
            }
            (a, b) => a == b,
        }
    }

    /// Ordering of comparable values; `None` when the kinds differ.
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
            (a, b) if a.is_number() && b.is_number() => {
                a.as_float()?.partial_cmp(&b.as_float()?)
            }
            (Self::String(a), Self::String(b)) => Some(a.cmp(b)),
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::DateTime(a), Self::DateTime(b)) => Some(a.cmp(b)),
            (Self::DateTime(a), b @ Self::String(_)) => Some(a.cmp(&b.as_datetime()?)),
            (a @ Self::String(_), Self::DateTime(b)) => Some(a.as_datetime()?.cmp(b)),
            _ => None,
        }
    }

    const fn sort_rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Bool(_) => 1,
            Self::Int(_) | Self::Float(_) => 2,
            Self::String(_) => 3,
            Self::DateTime(_) => 4,
            Self::List(_) => 5,
            Self::Record(_) => 6,
        }
    }

    /// Total ordering used for sorting result rows.
    pub fn sort_cmp(&self, other: &Self) -> Ordering {
        let by_rank = self.sort_rank().cmp(&other.sort_rank());
        if by_rank != Ordering::Equal {
            return by_rank;
        }
        match (self, other) {
            (Self::List(a), Self::List(b)) => a
                .iter()
                .zip(b)
                .map(|(x, y)| x.sort_cmp(y))
                .find(|o| *o != Ordering::Equal)
                .unwrap_or_else(|| a.len().cmp(&b.len())),
            (Self::Record(a), Self::Record(b)) => a.len().cmp(&b.len()),
            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            (Self::Int(a), Self::Float(b)) => cmp_int_float(*a, *b),
            (Self::Float(a), Self::Int(b)) => cmp_int_float(*b, *a).reverse(),
            (Self::Float(a), Self::Float(b)) => cmp_float(*a, *b),
            (a, b) => a.compare(b).unwrap_or(Ordering::Equal),
        }
    }

    /// Converts a JSON document into a value.
    ///
    /// Integers that fit `i64` become [`Value::Int`], other numbers
    /// [`Value::Float`]; objects become records.
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => n.as_f64().map_or(Self::Null, Self::Float),
            },
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => {
                Self::List(items.into_iter().map(Self::from_json).collect())
            }
            serde_json::Value::Object(map) => Self::Record(
                map.into_iter()
                    .map(|(k, v)| (k, Self::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Converts the value back into plain JSON.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Int(i) => serde_json::Value::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::DateTime(dt) => serde_json::Value::String(dt.to_rfc3339()),
            Self::List(items) => {
                serde_json::Value::Array(items.iter().map(Self::to_json).collect())
            }
            Self::Record(r) => serde_json::Value::Object(
                r.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Self::Null
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::String(v) => write!(f, "{v:?}"),
            Self::DateTime(v) => write!(f, "{}", v.to_rfc3339()),
            Self::List(v) => write!(f, "list[{}]", v.len()),
            Self::Record(r) => write!(f, "record{{{}}}", r.len()),
            Self::Null => write!(f, "null"),
        }
    }
}

/// Looks up a nested field by path segments.
pub fn lookup<'r, S: AsRef<str>>(record: &'r Record, segments: &[S]) -> Option<&'r Value> {
    let (first, rest) = segments.split_first()?;
    let value = record.get(first.as_ref())?;
    if rest.is_empty() {
        return Some(value);
    }
    lookup(value.as_record()?, rest)
}

/// Mutable variant of [`lookup`].
pub fn lookup_mut<'r, S: AsRef<str>>(
    record: &'r mut Record,
    segments: &[S],
) -> Option<&'r mut Value> {
    let (first, rest) = segments.split_first()?;
    let value = record.get_mut(first.as_ref())?;
    if rest.is_empty() {
        return Some(value);
    }
    match value {
        Value::Record(inner) => lookup_mut(inner, rest),
        _ => None,
    }
}

/// Removes a nested field, returning its previous value.
pub fn remove_field<S: AsRef<str>>(record: &mut Record, segments: &[S]) -> Option<Value> {
    let (last, parents) = segments.split_last()?;
    if parents.is_empty() {
        return record.remove(last.as_ref());
    }
    match lookup_mut(record, parents)? {
        Value::Record(inner) => inner.remove(last.as_ref()),
        _ => None,
    }
}

/// Serde adapter storing a [`Value`] as plain JSON (`"Rex"`, `4`, `{...}`)
/// instead of the tagged form. Used by the HyQL query shapes.
pub mod plain {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::Value;

    pub fn serialize<S: Serializer>(value: &Value, serializer: S) -> Result<S::Ok, S::Error> {
        value.to_json().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Value, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from_json)
    }
}

/// Serde adapter storing a [`Record`] as a plain JSON object.
pub mod plain_record {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::{Record, Value};

    pub fn serialize<S: Serializer>(record: &Record, serializer: S) -> Result<S::Ok, S::Error> {
        Value::Record(record.clone()).to_json().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Record, D::Error> {
        match Value::from_json(serde_json::Value::deserialize(deserializer)?) {
            Value::Record(record) => Ok(record),
            other => Err(D::Error::custom(format!(
                "expected an object, found {}",
                other.type_name()
            ))),
        }
    }
}

/// Serde adapter for an optional plain JSON record.
pub mod plain_record_opt {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::Record;

    pub fn serialize<S: Serializer>(
        record: &Option<Record>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match record {
            Some(r) => super::plain_record::serialize(r, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Record>, D::Error> {
        #[derive(Deserialize)]
        struct Wrapper(#[serde(with = "super::plain_record")] Record);

        Ok(Option::<Wrapper>::deserialize(deserializer)?.map(|Wrapper(r)| r))
    }
}

// Convenient From implementations
impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Self::DateTime(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Self::List(v)
    }
}

impl From<Record> for Value {
    fn from(v: Record) -> Self {
        Self::Record(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Self::from_json(v)
    }
}

/// Float ordering for sorting: NaN after every number, `-0.0 == 0.0`.
fn cmp_float(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

/// Exact int/float ordering; going through `f64` would merge large ints.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn cmp_int_float(a: i64, b: f64) -> Ordering {
    const LIMIT: f64 = 9_223_372_036_854_775_808.0; // 2^63
    if b.is_nan() || b >= LIMIT {
        return Ordering::Less;
    }
    if b < -LIMIT {
        return Ordering::Greater;
    }
    let whole = b.trunc();
    match a.cmp(&(whole as i64)) {
        Ordering::Equal => 0.0_f64.partial_cmp(&(b - whole)).unwrap_or(Ordering::Equal),
        other => other,
    }
}
