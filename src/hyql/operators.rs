//! The closed set of HyQL condition operators.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Operator families, used for documentation and grouping only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatorFamily {
    /// `==`, `!=`, `>`, `<`, `>=`, `<=`.
    Comparison,
    /// `contains`, `starts_with`, `ends_with`, `matches`.
    String,
    /// `in`, `not in`, `any`, `all`, `none`, `length_*`.
    Collection,
    /// `and`, `or`, `not`.
    Logical,
    /// `is`, `is_not`, `isinstance`.
    Identity,
    /// `abs_eq`, `abs_gt`, `abs_lt`.
    Numeric,
    /// `date_eq`, `date_before`, `date_after`, `date_within`.
    DateTime,
}

/// A condition operator.
///
/// Serialized as its token, e.g. `"=="` or `"starts_with"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Operator {
    Equal,
    NotEqual,
    GreaterThan,
    LessThan,
    GreaterThanOrEqual,
    LessThanOrEqual,
    Contains,
    StartsWith,
    EndsWith,
    Matches,
    In,
    NotIn,
    Any,
    All,
    None,
    LengthEqual,
    LengthGreaterThan,
    LengthLessThan,
    And,
    Or,
    Not,
    Is,
    IsNot,
    IsInstance,
    AbsEqual,
    AbsGreaterThan,
    AbsLessThan,
    DateEqual,
    DateBefore,
    DateAfter,
    DateWithin,
}

impl Operator {
    /// Every operator, in taxonomy order.
    pub const ALL: [Self; 31] = [
        Self::Equal,
        Self::NotEqual,
        Self::GreaterThan,
        Self::LessThan,
        Self::GreaterThanOrEqual,
        Self::LessThanOrEqual,
        Self::Contains,
        Self::StartsWith,
        Self::EndsWith,
        Self::Matches,
        Self::In,
        Self::NotIn,
        Self::Any,
        Self::All,
        Self::None,
        Self::LengthEqual,
        Self::LengthGreaterThan,
        Self::LengthLessThan,
        Self::And,
        Self::Or,
        Self::Not,
        Self::Is,
        Self::IsNot,
        Self::IsInstance,
        Self::AbsEqual,
        Self::AbsGreaterThan,
        Self::AbsLessThan,
        Self::DateEqual,
        Self::DateBefore,
        Self::DateAfter,
        Self::DateWithin,
    ];

    /// The textual token of this operator.
    #[must_use]
    pub const fn token(self) -> &'static str {
        match self {
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::GreaterThan => ">",
            Self::LessThan => "<",
            Self::GreaterThanOrEqual => ">=",
            Self::LessThanOrEqual => "<=",
            Self::Contains => "contains",
            Self::StartsWith => "starts_with",
            Self::EndsWith => "ends_with",
            Self::Matches => "matches",
            Self::In => "in",
            Self::NotIn => "not in",
            Self::Any => "any",
            Self::All => "all",
            Self::None => "none",
            Self::LengthEqual => "length_eq",
            Self::LengthGreaterThan => "length_gt",
            Self::LengthLessThan => "length_lt",
            Self::And => "and",
            Self::Or => "or",
            Self::Not => "not",
            Self::Is => "is",
            Self::IsNot => "is_not",
            Self::IsInstance => "isinstance",
            Self::AbsEqual => "abs_eq",
            Self::AbsGreaterThan => "abs_gt",
            Self::AbsLessThan => "abs_lt",
            Self::DateEqual => "date_eq",
            Self::DateBefore => "date_before",
            Self::DateAfter => "date_after",
            Self::DateWithin => "date_within",
        }
    }

    /// The family this operator belongs to.
    #[must_use]
    pub const fn family(self) -> OperatorFamily {
        match self {
            Self::Equal
            | Self::NotEqual
            | Self::GreaterThan
            | Self::LessThan
            | Self::GreaterThanOrEqual
            | Self::LessThanOrEqual => OperatorFamily::Comparison,
            Self::Contains | Self::StartsWith | Self::EndsWith | Self::Matches => {
                OperatorFamily::String
            }
            Self::In
            | Self::NotIn
            | Self::Any
            | Self::All
            | Self::None
            | Self::LengthEqual
            | Self::LengthGreaterThan
            | Self::LengthLessThan => OperatorFamily::Collection,
            Self::And | Self::Or | Self::Not => OperatorFamily::Logical,
            Self::Is | Self::IsNot | Self::IsInstance => OperatorFamily::Identity,
            Self::AbsEqual | Self::AbsGreaterThan | Self::AbsLessThan => OperatorFamily::Numeric,
            Self::DateEqual | Self::DateBefore | Self::DateAfter | Self::DateWithin => {
                OperatorFamily::DateTime
            }
        }
    }

    /// Looks up an operator by its token.
    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.token() == token)
    }

    /// Comma separated list of every allowed token, for error messages.
    #[must_use]
    pub fn allowed_tokens() -> String {
        Self::ALL.map(Self::token).join(", ")
    }
}

/// Returns true if `token` names an operator in the taxonomy.
pub fn is_valid_operator(token: &str) -> bool {
    Operator::from_token(token).is_some()
}

impl FromStr for Operator {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_token(s).ok_or_else(|| ValidationError::InvalidOperator {
            operator: s.to_string(),
        })
    }
}

impl TryFrom<String> for Operator {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Operator> for String {
    fn from(op: Operator) -> Self {
        op.token().to_string()
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}
