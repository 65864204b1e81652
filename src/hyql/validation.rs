//! Shared field validators for the query models.
//!
//! Constructors already validate their inputs; deserialization goes through
//! the same constructors, so decoded JSON obeys the same rules. The limits
//! below bound what a single query may ask of the engine.

use crate::error::ValidationError;
use crate::value::Record;

use super::condition::{Filters, GroupItem};
use super::path::{is_valid_name, validate_path};

/// Maximum nesting depth of groups inside a filter list.
pub const MAX_FILTER_DEPTH: usize = 32;

/// Maximum number of queries in one transaction.
pub const MAX_TRANSACTION_QUERIES: usize = 4096;

/// Validates an optional path field.
pub(crate) fn validate_optional_path(path: Option<&str>) -> Result<(), ValidationError> {
    if let Some(p) = path {
        validate_path(p)?;
    }
    Ok(())
}

/// Validates a data record: non-empty, every key a valid field name.
pub(crate) fn validate_data(field: &'static str, data: &Record) -> Result<(), ValidationError> {
    if data.is_empty() {
        return Err(ValidationError::invalid_field(field, "must not be empty"));
    }
    if let Some(key) = data.keys().find(|k| !is_valid_name(k)) {
        return Err(ValidationError::InvalidName { name: key.clone() });
    }
    Ok(())
}

/// Rejects two flags that are both set.
pub(crate) fn validate_exclusive(
    first: (&str, bool),
    second: (&str, bool),
) -> Result<(), ValidationError> {
    if first.1 && second.1 {
        return Err(ValidationError::MutuallyExclusiveFlags {
            first: first.0.to_string(),
            second: second.0.to_string(),
        });
    }
    Ok(())
}

/// Rejects filter expressions nested deeper than [`MAX_FILTER_DEPTH`].
pub(crate) fn validate_filter_depth(filters: Option<&Filters>) -> Result<(), ValidationError> {
    fn depth(items: &[GroupItem]) -> usize {
        items
            .iter()
            .map(|item| match item {
                GroupItem::Group(group) => 1 + depth(group.items()),
                _ => 0,
            })
            .max()
            .unwrap_or(0)
    }

    let Some(filters) = filters else { return Ok(()) };
    let found = depth(filters.items());
    if found > MAX_FILTER_DEPTH {
        return Err(ValidationError::invalid_field(
            "filters",
            format!("groups nested {found} deep, at most {MAX_FILTER_DEPTH} allowed"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hyql::condition::{Condition, Group, LogicalOp};
    use crate::value::Value;

    #[test]
    fn test_validate_data() {
        let mut data = Record::new();
        assert!(matches!(
            validate_data("data", &data),
            Err(ValidationError::InvalidField { .. })
        ));
        data.insert("name".into(), Value::from("Rex"));
        assert!(validate_data("data", &data).is_ok());
        data.insert("bad key".into(), Value::Null);
        assert!(matches!(
            validate_data("data", &data),
            Err(ValidationError::InvalidName { .. })
        ));
    }

    #[test]
    fn test_validate_exclusive() {
        assert!(validate_exclusive(("a", true), ("b", false)).is_ok());
        assert!(validate_exclusive(("a", false), ("b", false)).is_ok());
        assert_eq!(
            validate_exclusive(("a", true), ("b", true)).unwrap_err(),
            ValidationError::MutuallyExclusiveFlags {
                first: "a".into(),
                second: "b".into()
            }
        );
    }

    #[test]
    fn test_filter_depth_limit() {
        let leaf: GroupItem = Condition::new("a.b", "==", 1).unwrap().into();
        let mut item = leaf.clone();
        for _ in 0..=MAX_FILTER_DEPTH {
            item = Group::new(vec![item, LogicalOp::And.into(), leaf.clone()])
                .unwrap()
                .into();
        }
        let filters = Filters::new(vec![item]).unwrap();
        assert!(validate_filter_depth(Some(&filters)).is_err());
        assert!(validate_filter_depth(Some(&Filters::new(vec![leaf]).unwrap())).is_ok());
        assert!(validate_filter_depth(None).is_ok());
    }
}
