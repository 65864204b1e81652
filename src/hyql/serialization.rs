//! HyQL serialization helpers.
//!
//! Serde already provides JSON serialization for every query model. This
//! module centralizes the helpers used by embedding applications and keeps
//! formatting stable. Decoding runs the same validation as the constructors.

use crate::error::{HyllaError, HyllaResult, ValidationError};

use super::query::Query;

/// Serialize a query to pretty JSON.
pub fn to_json_pretty(query: &Query) -> HyllaResult<String> {
    serde_json::to_string_pretty(query)
        .map_err(|e| HyllaError::internal(format!("serialize query: {e}")))
}

/// Deserialize a query from JSON.
///
/// A query model that rejects its payload returns the same error its
/// constructor would. Malformed JSON is reported as an invalid `query`
/// field and payloads of the wrong shape as an invalid `payload` field.
pub fn from_json(s: &str) -> HyllaResult<Query> {
    let value: serde_json::Value = serde_json::from_str(s)
        .map_err(|e| ValidationError::invalid_field("query", e.to_string()))?;
    Ok(Query::from_value(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hyql::{CheckOut, CheckOutItem, Condition, Filters, SortItem};

    #[test]
    fn json_roundtrip_works() {
        let query: Query = CheckOut::builder()
            .item(CheckOutItem::new("animals", ["name", "age"]).unwrap())
            .filters(Filters::single(Condition::new("age", ">=", 3).unwrap()))
            .sort(SortItem::asc("name").unwrap())
            .limit(2)
            .build()
            .unwrap()
            .into();

        let json = to_json_pretty(&query).unwrap();
        let decoded = from_json(&json).unwrap();
        assert_eq!(query, decoded);
    }

    #[test]
    fn decoding_errors_are_validation_errors() {
        let err = from_json(r#"{"op": "remove", "payload": {"path": "a b"}}"#).unwrap_err();
        assert!(err.is_validation());
        let err = from_json("not json").unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn decoding_keeps_the_constructor_error() {
        let err = from_json(r#"{"op": "write", "payload": {"path": "a..b", "data": {}}}"#)
            .unwrap_err();
        assert!(matches!(
            err,
            HyllaError::Validation(ValidationError::InvalidPathSyntax { .. })
        ));

        let err = from_json(r#"{"op": "shelve", "payload": {}}"#).unwrap_err();
        assert!(matches!(
            err,
            HyllaError::Validation(ValidationError::InvalidField { ref field, .. }) if field == "op"
        ));
    }
}
