//! Path resolution.
//!
//! Maps dotted paths onto namespace entries. Every proper prefix of a node
//! path must be a registered section: shelves are leaves and cannot be
//! traversed, except by a field path, which continues into the shelf's
//! record.

use crate::error::{HyllaResult, ResolutionError, ValidationError};
use crate::hyql::path::{join, segments, validate_name, validate_path};
use crate::namespace::{PathEntry, PathKind, PathMap};

/// A path that addresses a field inside a shelf record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    /// Namespace key of the shelf.
    pub shelf: String,
    /// The shelf's namespace entry.
    pub entry: PathEntry,
    /// Field segments inside the shelf record (never empty).
    pub field: Vec<String>,
}

/// Resolves a node path.
///
/// # Errors
/// - `InvalidPathSyntax` if the path does not match the path grammar
/// - `PathNotFound` if the path or one of its prefixes is not registered
/// - `NotASection` if a prefix is registered as a shelf
pub fn resolve<'a>(path: &str, namespace: &'a PathMap) -> HyllaResult<&'a PathEntry> {
    let segs = segments(path)?;
    let mut prefix = String::with_capacity(path.len());
    for (i, seg) in segs.iter().enumerate() {
        if i > 0 {
            prefix.push('.');
        }
        prefix.push_str(seg);
        let entry = namespace.get(&prefix)?;
        if i + 1 < segs.len() && !entry.is_section() {
            return Err(ResolutionError::NotASection { path: prefix }.into());
        }
    }
    Ok(namespace.get(path)?)
}

/// Resolves a path that must be a section.
pub fn resolve_section<'a>(path: &str, namespace: &'a PathMap) -> HyllaResult<&'a PathEntry> {
    let entry = resolve(path, namespace)?;
    match entry.kind {
        PathKind::Section => Ok(entry),
        PathKind::Shelf => Err(ResolutionError::NotASection {
            path: path.to_string(),
        }
        .into()),
    }
}

/// Resolves a path that must be a shelf.
pub fn resolve_shelf<'a>(path: &str, namespace: &'a PathMap) -> HyllaResult<&'a PathEntry> {
    let entry = resolve(path, namespace)?;
    match entry.kind {
        PathKind::Shelf => Ok(entry),
        PathKind::Section => Err(ResolutionError::NotAShelf {
            path: path.to_string(),
        }
        .into()),
    }
}

/// Resolves where a new node called `name` goes below `parent`
/// (`None` = library root), returning its full key.
///
/// # Errors
/// - `InvalidName` if `name` is not a valid node name
/// - any error of [`resolve_section`] for `parent`
/// - `DuplicatePath` if the key is already registered
pub fn resolve_build_target(
    parent: Option<&str>,
    name: &str,
    namespace: &PathMap,
) -> HyllaResult<String> {
    validate_name(name)?;
    if let Some(parent) = parent {
        resolve_section(parent, namespace)?;
    }
    let key = join(parent, name);
    if namespace.contains(&key) {
        return Err(ResolutionError::DuplicatePath { path: key }.into());
    }
    Ok(key)
}

/// Splits a field path into its shelf and the field segments below it.
///
/// # Errors
/// - `InvalidPathSyntax` for a malformed path
/// - `PathNotFound` if no shelf is found along the path
/// - `InvalidField` if the path names a node rather than a field
pub fn resolve_field(path: &str, namespace: &PathMap) -> HyllaResult<FieldPath> {
    validate_path(path)?;
    let segs: Vec<&str> = path.split('.').collect();
    for i in 1..=segs.len() {
        let prefix = segs[..i].join(".");
        match namespace.try_get(&prefix) {
            None => return Err(ResolutionError::not_found(prefix).into()),
            Some(entry) if entry.is_section() => continue,
            Some(entry) => {
                if i == segs.len() {
                    break;
                }
                return Ok(FieldPath {
                    shelf: prefix,
                    entry: entry.clone(),
                    field: segs[i..].iter().map(|s| (*s).to_string()).collect(),
                });
            }
        }
    }
    Err(ValidationError::invalid_field(
        "path",
        format!("'{path}' addresses a node, not a field inside a shelf"),
    )
    .into())
}
