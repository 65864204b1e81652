//! Condition and group grammar for HyQL filters.
//!
//! A filter is an infix boolean expression written as a flat list that
//! alternates operands ([`ConditionDict`] or nested [`Group`]) with the
//! logical connectives `"AND"` / `"OR"`:
//!
//! ```text
//! [ {"condition": {...}}, "AND", {"group": [ {...}, "OR", {...} ]} ]
//! ```
//!
//! Every type here is validated on construction and on deserialization, so a
//! value that exists is always well formed.

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::value::Value;

use super::operators::Operator;
use super::path::is_valid_path;

/// A leaf comparison: `left <operator> right`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ConditionFields")]
pub struct Condition {
    #[serde(with = "crate::value::plain")]
    left: Value,
    operator: Operator,
    #[serde(with = "crate::value::plain")]
    right: Value,
    left_is_path: bool,
    right_is_path: bool,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ConditionFields {
    #[serde(with = "crate::value::plain")]
    left: Value,
    operator: String,
    #[serde(with = "crate::value::plain")]
    right: Value,
    #[serde(default = "default_true")]
    left_is_path: bool,
    #[serde(default)]
    right_is_path: bool,
}

fn default_true() -> bool {
    true
}

impl TryFrom<ConditionFields> for Condition {
    type Error = ValidationError;

    fn try_from(f: ConditionFields) -> Result<Self, Self::Error> {
        Self::with_flags(f.left, &f.operator, f.right, f.left_is_path, f.right_is_path)
    }
}

impl Condition {
    /// Creates a condition whose left operand is a path and right operand a literal.
    pub fn new(
        left: impl Into<Value>,
        operator: &str,
        right: impl Into<Value>,
    ) -> Result<Self, ValidationError> {
        Self::with_flags(left, operator, right, true, false)
    }

    /// Creates a condition comparing two paths.
    pub fn between_paths(
        left: impl Into<String>,
        operator: &str,
        right: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        Self::with_flags(left.into(), operator, right.into(), true, true)
    }

    /// Creates a condition with explicit path flags.
    pub fn with_flags(
        left: impl Into<Value>,
        operator: &str,
        right: impl Into<Value>,
        left_is_path: bool,
        right_is_path: bool,
    ) -> Result<Self, ValidationError> {
        let condition = Self {
            left: left.into(),
            operator: operator.parse()?,
            right: right.into(),
            left_is_path,
            right_is_path,
        };
        validate_condition(&condition)?;
        Ok(condition)
    }

    pub fn left(&self) -> &Value {
        &self.left
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn right(&self) -> &Value {
        &self.right
    }

    pub fn left_is_path(&self) -> bool {
        self.left_is_path
    }

    pub fn right_is_path(&self) -> bool {
        self.right_is_path
    }

    /// Paths referenced by this condition.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        let left = self.left_is_path.then(|| self.left.as_string()).flatten();
        let right = self.right_is_path.then(|| self.right.as_string()).flatten();
        left.into_iter().chain(right)
    }
}

fn validate_operand(side: &'static str, value: &Value) -> Result<(), ValidationError> {
    match value.as_string() {
        Some(path) if is_valid_path(path) => Ok(()),
        Some(path) => Err(ValidationError::InvalidPathSyntax {
            path: path.to_string(),
        }),
        None => Err(ValidationError::invalid_field(
            side,
            format!("expected a path string, found {}", value.type_name()),
        )),
    }
}

/// Validates the structure of a condition.
///
/// The operator is already a member of the taxonomy by construction; this
/// checks the path flags and, for a literal `matches` pattern, that the
/// pattern compiles.
pub fn validate_condition(condition: &Condition) -> Result<(), ValidationError> {
    if !condition.left_is_path && !condition.right_is_path {
        return Err(ValidationError::AmbiguousCondition);
    }
    if condition.left_is_path {
        validate_operand("left", &condition.left)?;
    }
    if condition.right_is_path {
        validate_operand("right", &condition.right)?;
    }
    if condition.operator == Operator::Matches && !condition.right_is_path {
        let Some(pattern) = condition.right.as_string() else {
            return Err(ValidationError::invalid_field(
                "right",
                "the `matches` operator requires a regular expression string",
            ));
        };
        Regex::new(pattern).map_err(|e| {
            ValidationError::invalid_field("right", format!("invalid regex '{pattern}': {e}"))
        })?;
    }
    Ok(())
}

/// Wrapper distinguishing a condition from groups and connectives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConditionDict {
    pub condition: Condition,
}

impl From<Condition> for ConditionDict {
    fn from(condition: Condition) -> Self {
        Self { condition }
    }
}

/// Logical connective between two filter operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum LogicalOp {
    #[serde(rename = "AND")]
    And,
    #[serde(rename = "OR")]
    Or,
}

impl LogicalOp {
    /// Parses the exact tokens `"AND"` and `"OR"`.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "AND" => Some(Self::And),
            "OR" => Some(Self::Or),
            _ => None,
        }
    }

    /// Applies the connective.
    pub const fn apply(self, left: bool, right: bool) -> bool {
        match self {
            Self::And => left && right,
            Self::Or => left || right,
        }
    }
}

impl fmt::Display for LogicalOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::And => "AND",
            Self::Or => "OR",
        })
    }
}

/// One element of a group or filter list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum GroupItem {
    Condition(ConditionDict),
    Group(Group),
    Logical(LogicalOp),
}

impl GroupItem {
    /// Parses a connective token, rejecting anything but `"AND"` / `"OR"`.
    pub fn token(token: &str) -> Result<Self, ValidationError> {
        LogicalOp::from_token(token)
            .map(Self::Logical)
            .ok_or_else(|| ValidationError::MalformedGroup {
                position: 0,
                reason: format!("invalid logical operator '{token}', expected 'AND' or 'OR'"),
            })
    }

    pub const fn is_logical(&self) -> bool {
        matches!(self, Self::Logical(_))
    }

    fn from_json(position: usize, json: serde_json::Value) -> Result<Self, ValidationError> {
        let malformed = |reason: String| ValidationError::MalformedGroup { position, reason };
        match json {
            serde_json::Value::String(token) => LogicalOp::from_token(&token)
                .map(Self::Logical)
                .ok_or_else(|| {
                    malformed(format!(
                        "invalid logical operator '{token}', expected 'AND' or 'OR'"
                    ))
                }),
            serde_json::Value::Object(map) if map.contains_key("condition") => {
                serde_json::from_value(serde_json::Value::Object(map))
                    .map(Self::Condition)
                    .map_err(|e| malformed(e.to_string()))
            }
            serde_json::Value::Object(map) if map.contains_key("group") => {
                serde_json::from_value(serde_json::Value::Object(map))
                    .map(Self::Group)
                    .map_err(|e| malformed(e.to_string()))
            }
            other => Err(malformed(format!(
                "expected a condition, a group or a logical operator, found {other}"
            ))),
        }
    }
}

impl From<Condition> for GroupItem {
    fn from(condition: Condition) -> Self {
        Self::Condition(condition.into())
    }
}

impl From<ConditionDict> for GroupItem {
    fn from(dict: ConditionDict) -> Self {
        Self::Condition(dict)
    }
}

impl From<Group> for GroupItem {
    fn from(group: Group) -> Self {
        Self::Group(group)
    }
}

impl From<LogicalOp> for GroupItem {
    fn from(op: LogicalOp) -> Self {
        Self::Logical(op)
    }
}

fn items_from_json(values: Vec<serde_json::Value>) -> Result<Vec<GroupItem>, ValidationError> {
    values
        .into_iter()
        .enumerate()
        .map(|(i, v)| GroupItem::from_json(i, v))
        .collect()
}

/// Validates that `items` forms a well formed infix expression.
///
/// The list must be non-empty, start and end with an operand, and strictly
/// alternate operands and connectives.
pub fn validate_group(items: &[GroupItem]) -> Result<(), ValidationError> {
    if items.is_empty() {
        return Err(ValidationError::EmptyGroup);
    }
    let last = items.len() - 1;
    for (i, item) in items.iter().enumerate() {
        if item.is_logical() && (i == 0 || i == last) {
            return Err(ValidationError::MalformedGroup {
                position: i,
                reason: "logical operators must sit between conditions or groups, not at the ends"
                    .to_string(),
            });
        }
        if i > 0 && item.is_logical() == items[i - 1].is_logical() {
            let reason = if item.is_logical() {
                "two consecutive logical operators"
            } else {
                "conditions or groups must be separated by 'AND' or 'OR'"
            };
            return Err(ValidationError::MalformedGroup {
                position: i,
                reason: reason.to_string(),
            });
        }
    }
    Ok(())
}

/// A parenthesised sub-expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "GroupFields")]
pub struct Group {
    group: Vec<GroupItem>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct GroupFields {
    group: Vec<serde_json::Value>,
}

impl TryFrom<GroupFields> for Group {
    type Error = ValidationError;

    fn try_from(f: GroupFields) -> Result<Self, Self::Error> {
        Self::new(items_from_json(f.group)?)
    }
}

impl Group {
    /// Creates a validated group.
    pub fn new(items: Vec<GroupItem>) -> Result<Self, ValidationError> {
        validate_group(&items)?;
        Ok(Self { group: items })
    }

    pub fn items(&self) -> &[GroupItem] {
        &self.group
    }
}

/// Top-level filter list of a query; same grammar as a group body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Filters(#[serde(deserialize_with = "deserialize_filter_items")] Vec<GroupItem>);

fn deserialize_filter_items<'de, D>(deserializer: D) -> Result<Vec<GroupItem>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error as _;

    let raw = Vec::<serde_json::Value>::deserialize(deserializer)?;
    let items = items_from_json(raw).map_err(D::Error::custom)?;
    validate_group(&items).map_err(D::Error::custom)?;
    Ok(items)
}

impl Filters {
    /// Creates a validated filter list.
    pub fn new(items: Vec<GroupItem>) -> Result<Self, ValidationError> {
        validate_group(&items)?;
        Ok(Self(items))
    }

    /// A filter made of a single condition.
    pub fn single(condition: Condition) -> Self {
        Self(vec![condition.into()])
    }

    pub fn items(&self) -> &[GroupItem] {
        &self.0
    }

    /// Every path referenced anywhere in the expression.
    pub fn paths(&self) -> Vec<&str> {
        fn walk<'a>(items: &'a [GroupItem], out: &mut Vec<&'a str>) {
            for item in items {
                match item {
                    GroupItem::Condition(dict) => out.extend(dict.condition.paths()),
                    GroupItem::Group(group) => walk(group.items(), out),
                    GroupItem::Logical(_) => {}
                }
            }
        }
        let mut out = Vec::new();
        walk(&self.0, &mut out);
        out
    }
}
