//! HyQL: the structured query model.
//!
//! Queries are plain validated values rather than strings to parse:
//! - [`operators`]: the closed operator taxonomy
//! - [`path`]: path and name grammar
//! - [`condition`]: conditions, groups and filter lists
//! - [`query`]: the query models accepted by the engine

pub mod condition;
pub mod operators;
pub mod path;
pub mod query;
mod serialization;
mod validation;

pub use condition::{
    validate_condition, validate_group, Condition, ConditionDict, Filters, Group, GroupItem,
    LogicalOp,
};
pub use operators::{is_valid_operator, Operator, OperatorFamily};
pub use path::{is_valid_name, is_valid_path, CHECKOUT_ALL, NAME_PATTERN, PATH_PATTERN};
pub use query::{
    BuildSection, BuildShelf, CheckOut, CheckOutBuilder, CheckOutItem, Query, Remove, Reset,
    Revise, SetSchema, SortItem, SortOrder, Transaction, Write,
};
pub use serialization::{from_json, to_json_pretty};
pub use validation::{MAX_FILTER_DEPTH, MAX_TRANSACTION_QUERIES};
