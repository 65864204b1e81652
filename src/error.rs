//! Error types for HyllaDB.
//!
//! All errors are strongly typed using thiserror and follow three classes:
//! - validation errors, raised while constructing or submitting a query
//! - resolution errors, raised against namespace or shelf state
//! - consistency faults, which terminate the current library session

use thiserror::Error;

use crate::storage::StorageError;

/// Validation errors that occur during input validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Invalid operator '{operator}'")]
    InvalidOperator {
        operator: String,
    },

    #[error(
        "Invalid path '{path}': expected dot separated alphanumeric segments, \
         e.g. 'section.shelf.field'"
    )]
    InvalidPathSyntax {
        path: String,
    },

    #[error("Invalid name '{name}': expected alphanumeric characters with optional '_' separators")]
    InvalidName {
        name: String,
    },

    #[error("Ambiguous condition: at least one of `left_is_path` or `right_is_path` must be true")]
    AmbiguousCondition,

    #[error("Malformed group at position {position}: {reason}")]
    MalformedGroup {
        position: usize,
        reason: String,
    },

    #[error("Group cannot be empty")]
    EmptyGroup,

    #[error("Schema '{schema}' violated: {reason}")]
    SchemaViolation {
        schema: String,
        reason: String,
    },

    #[error("Only one of '{first}' and '{second}' can be set")]
    MutuallyExclusiveFlags {
        first: String,
        second: String,
    },

    #[error("Required field '{field}' is missing")]
    MissingField {
        field: String,
    },

    #[error("Invalid field '{field}': {reason}")]
    InvalidField {
        field: String,
        reason: String,
    },
}

impl ValidationError {
    pub(crate) fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn missing(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    pub(crate) fn schema(schema: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SchemaViolation {
            schema: schema.into(),
            reason: reason.into(),
        }
    }
}

/// Errors raised when a query is resolved against namespace or storage state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    #[error("Path not found: {path}")]
    PathNotFound {
        path: String,
    },

    #[error("Path already exists: {path}")]
    DuplicatePath {
        path: String,
    },

    #[error("Path '{path}' is not a section")]
    NotASection {
        path: String,
    },

    #[error("Path '{path}' is not a shelf")]
    NotAShelf {
        path: String,
    },

    #[error("Path '{path}' already holds data")]
    PathAlreadyHasData {
        path: String,
    },
}

impl ResolutionError {
    pub(crate) fn not_found(path: impl Into<String>) -> Self {
        Self::PathNotFound { path: path.into() }
    }
}

/// Top-level error type for HyllaDB.
#[derive(Debug, Error)]
pub enum HyllaError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Resolution error: {0}")]
    Resolution(#[from] ResolutionError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// The in-memory namespace diverged from what was persisted.
    #[error("Namespace corrupted: {message}")]
    NamespaceCorrupted {
        message: String,
    },

    /// A previous fault terminated this library session.
    #[error("Library session terminated after a consistency fault")]
    Poisoned,

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl HyllaError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates a namespace corruption fault.
    #[must_use]
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::NamespaceCorrupted {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is a resolution error.
    #[must_use]
    pub const fn is_resolution(&self) -> bool {
        matches!(self, Self::Resolution(_))
    }

    /// Returns true if the error ends the current library session.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::NamespaceCorrupted { .. } | Self::Poisoned)
    }

    /// Returns true if the caller can fix the input and submit again.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::Resolution(_))
    }

    /// Returns the validation error, if this is one.
    #[must_use]
    pub const fn as_validation(&self) -> Option<&ValidationError> {
        match self {
            Self::Validation(e) => Some(e),
            _ => None,
        }
    }

    /// Returns the resolution error, if this is one.
    #[must_use]
    pub const fn as_resolution(&self) -> Option<&ResolutionError> {
        match self {
            Self::Resolution(e) => Some(e),
            _ => None,
        }
    }
}

/// Result type alias for HyllaDB operations.
pub type HyllaResult<T> = Result<T, HyllaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_operator() {
        let err = ValidationError::InvalidOperator {
            operator: "~=".to_string(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("~="));
        assert!(msg.contains("Invalid operator"));
    }

    #[test]
    fn test_malformed_group_mentions_position() {
        let err = ValidationError::MalformedGroup {
            position: 2,
            reason: "two consecutive logical operators".to_string(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("position 2"));
    }

    #[test]
    fn test_resolution_error_path() {
        let err = ResolutionError::not_found("a.b");
        assert_eq!(format!("{err}"), "Path not found: a.b");
    }

    #[test]
    fn test_hylla_error_from_validation() {
        let err: HyllaError = ValidationError::EmptyGroup.into();
        assert!(err.is_validation());
        assert!(err.is_recoverable());
        assert!(!err.is_fatal());
        assert_eq!(err.as_validation(), Some(&ValidationError::EmptyGroup));
    }

    #[test]
    fn test_hylla_error_from_resolution() {
        let err: HyllaError = ResolutionError::NotAShelf {
            path: "a".to_string(),
        }
        .into();
        assert!(err.is_resolution());
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_corruption_is_fatal() {
        let err = HyllaError::corrupted("key count 3 != entry count 2");
        assert!(err.is_fatal());
        assert!(!err.is_recoverable());
        assert!(HyllaError::Poisoned.is_fatal());
    }

    #[test]
    fn test_internal_error() {
        let err = HyllaError::internal("unexpected state");
        assert!(!err.is_fatal());
        assert!(!err.is_recoverable());
        assert!(format!("{err}").contains("unexpected state"));
    }
}
