//! Path and name grammar.
//!
//! A *path* addresses a library node or a field inside a shelf record:
//! `section.subsection.shelf.field`. A *name* is a single identifier for a
//! section or shelf that is about to be created and therefore carries no dots.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::ValidationError;

/// Regular expression every path matches.
pub const PATH_PATTERN: &str = r"^[A-Za-z0-9]+(?:[._][A-Za-z0-9]+)*$";

/// Regular expression every node name matches.
pub const NAME_PATTERN: &str = r"^[A-Za-z0-9]+(?:_[A-Za-z0-9]+)*$";

/// Sentinel in a checkout list selecting every field of a record.
pub const CHECKOUT_ALL: &str = "*all";

fn path_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(PATH_PATTERN).expect("valid regex"))
}

fn name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(NAME_PATTERN).expect("valid regex"))
}

/// Returns true if `s` is a syntactically valid path.
pub fn is_valid_path(s: &str) -> bool {
    path_regex().is_match(s)
}

/// Returns true if `s` is a syntactically valid node name.
pub fn is_valid_name(s: &str) -> bool {
    name_regex().is_match(s)
}

/// Validates a path, returning it unchanged.
pub fn validate_path(path: &str) -> Result<&str, ValidationError> {
    if is_valid_path(path) {
        Ok(path)
    } else {
        Err(ValidationError::InvalidPathSyntax {
            path: path.to_string(),
        })
    }
}

/// Validates a node name, returning it unchanged.
pub fn validate_name(name: &str) -> Result<&str, ValidationError> {
    if is_valid_name(name) {
        Ok(name)
    } else {
        Err(ValidationError::InvalidName {
            name: name.to_string(),
        })
    }
}

/// Splits a validated path into its dot separated segments.
pub fn segments(path: &str) -> Result<Vec<&str>, ValidationError> {
    Ok(validate_path(path)?.split('.').collect())
}

/// Joins a parent path and a child name into a full path.
pub fn join(parent: Option<&str>, name: &str) -> String {
    match parent {
        Some(p) => format!("{p}.{name}"),
        None => name.to_string(),
    }
}

/// Parent path of `path`, or `None` for a root-level path.
pub fn parent(path: &str) -> Option<&str> {
    path.rsplit_once('.').map(|(p, _)| p)
}

/// Returns true if `path` equals `ancestor` or lies below it.
pub fn is_within(path: &str, ancestor: &str) -> bool {
    path == ancestor
        || path
            .strip_prefix(ancestor)
            .is_some_and(|rest| rest.starts_with('.'))
}
