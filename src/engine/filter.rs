//! Filter evaluation.
//!
//! A filter list is folded strictly left to right: `a AND b OR c` is
//! `(a AND b) OR c`. Groups scope precedence explicitly. Operands flagged as
//! paths are read through a caller-supplied resolver; unresolved paths read
//! as `Null`.

use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};

use regex::Regex;
use tracing::trace;

use crate::error::{HyllaError, HyllaResult, ValidationError};
use crate::hyql::{Condition, GroupItem, LogicalOp, Operator};
use crate::value::Value;

const REGEX_CACHE_MAX: usize = 1024;

static REGEX_CACHE: OnceLock<RwLock<HashMap<String, Regex>>> = OnceLock::new();

fn cached_regex(pattern: &str) -> HyllaResult<Regex> {
    let cache = REGEX_CACHE.get_or_init(|| RwLock::new(HashMap::new()));

    {
        let guard = cache
            .read()
            .map_err(|_| HyllaError::internal("regex cache lock poisoned"))?;
        if let Some(re) = guard.get(pattern) {
            return Ok(re.clone());
        }
    }

    let compiled = Regex::new(pattern).map_err(|e| {
        ValidationError::invalid_field("right", format!("invalid regex '{pattern}': {e}"))
    })?;

    let mut guard = cache
        .write()
        .map_err(|_| HyllaError::internal("regex cache lock poisoned"))?;

    if guard.len() >= REGEX_CACHE_MAX {
        guard.clear();
    }

    // Another thread may have inserted it while we compiled.
    guard
        .entry(pattern.to_string())
        .or_insert_with(|| compiled.clone());
    Ok(compiled)
}

/// Evaluates a filter list or group body.
///
/// `items` has already passed group validation, so operands and connectives
/// alternate and the first item is never a connective.
pub(crate) fn evaluate<F>(items: &[GroupItem], resolve: &mut F) -> HyllaResult<bool>
where
    F: FnMut(&str) -> HyllaResult<Value>,
{
    let mut iter = items.iter();
    let Some(first) = iter.next() else {
        return Ok(true);
    };
    let mut acc = evaluate_item(first, resolve)?;

    while let Some(item) = iter.next() {
        let GroupItem::Logical(op) = item else {
            return Err(HyllaError::internal("filter operands are not separated by a connective"));
        };
        let Some(operand) = iter.next() else {
            return Err(HyllaError::internal("filter ends with a connective"));
        };
        let settled = matches!((op, acc), (LogicalOp::And, false) | (LogicalOp::Or, true));
        if !settled {
            acc = op.apply(acc, evaluate_item(operand, resolve)?);
        }
    }
    Ok(acc)
}

fn evaluate_item<F>(item: &GroupItem, resolve: &mut F) -> HyllaResult<bool>
where
    F: FnMut(&str) -> HyllaResult<Value>,
{
    match item {
        GroupItem::Condition(dict) => evaluate_condition(&dict.condition, resolve),
        GroupItem::Group(group) => evaluate(group.items(), resolve),
        GroupItem::Logical(op) => Err(HyllaError::internal(format!(
            "connective '{op}' in operand position"
        ))),
    }
}

fn operand<'v, F>(value: &'v Value, is_path: bool, resolve: &mut F) -> HyllaResult<Cow<'v, Value>>
where
    F: FnMut(&str) -> HyllaResult<Value>,
{
    if !is_path {
        return Ok(Cow::Borrowed(value));
    }
    match value.as_string() {
        Some(path) => resolve(path).map(Cow::Owned),
        None => Ok(Cow::Owned(Value::Null)),
    }
}

/// Evaluates one condition.
pub(crate) fn evaluate_condition<F>(condition: &Condition, resolve: &mut F) -> HyllaResult<bool>
where
    F: FnMut(&str) -> HyllaResult<Value>,
{
    let left = operand(condition.left(), condition.left_is_path(), resolve)?;
    let right = operand(condition.right(), condition.right_is_path(), resolve)?;
    let result = apply(condition.operator(), &left, &right)?;
    trace!(operator = %condition.operator(), result, "filter.condition");
    Ok(result)
}

/// Applies an operator to two resolved operands.
pub(crate) fn apply(operator: Operator, left: &Value, right: &Value) -> HyllaResult<bool> {
    use Operator as Op;

    let ordered = |accept: fn(Ordering) -> bool| left.compare(right).is_some_and(accept);

    let result = match operator {
        Op::Equal => left.loose_eq(right),
        Op::NotEqual => !left.loose_eq(right),
        Op::GreaterThan => ordered(Ordering::is_gt),
        Op::LessThan => ordered(Ordering::is_lt),
        Op::GreaterThanOrEqual => ordered(Ordering::is_ge),
        Op::LessThanOrEqual => ordered(Ordering::is_le),

        Op::Contains => contains(left, right),
        Op::StartsWith => strings(left, right).is_some_and(|(l, r)| l.starts_with(r)),
        Op::EndsWith => strings(left, right).is_some_and(|(l, r)| l.ends_with(r)),
        Op::Matches => match strings(left, right) {
            Some((text, pattern)) => cached_regex(pattern)?.is_match(text),
            None => false,
        },

        Op::In => contains(right, left),
        Op::NotIn => !contains(right, left),
        Op::Any => elements(left).is_some_and(|items| items.iter().any(|v| member(v, right))),
        Op::All => elements(left)
            .is_some_and(|items| !items.is_empty() && items.iter().all(|v| member(v, right))),
        Op::None => elements(left).is_some_and(|items| !items.iter().any(|v| member(v, right))),
        Op::LengthEqual => length_cmp(left, right).is_some_and(Ordering::is_eq),
        Op::LengthGreaterThan => length_cmp(left, right).is_some_and(Ordering::is_gt),
        Op::LengthLessThan => length_cmp(left, right).is_some_and(Ordering::is_lt),

        Op::And => left.is_truthy() && right.is_truthy(),
        Op::Or => left.is_truthy() || right.is_truthy(),
        Op::Not => left.is_truthy() && !right.is_truthy(),

        Op::Is => left == right,
        Op::IsNot => left != right,
        Op::IsInstance => right.as_string().is_some_and(|name| {
            name == left.type_name() || (name == "number" && left.is_number())
        }),

        Op::AbsEqual => abs_cmp(left, right).is_some_and(Ordering::is_eq),
        Op::AbsGreaterThan => abs_cmp(left, right).is_some_and(Ordering::is_gt),
        Op::AbsLessThan => abs_cmp(left, right).is_some_and(Ordering::is_lt),

        Op::DateEqual => dates(left, right).is_some_and(|(l, r)| l.date_naive() == r.date_naive()),
        Op::DateBefore => dates(left, right).is_some_and(|(l, r)| l < r),
        Op::DateAfter => dates(left, right).is_some_and(|(l, r)| l > r),
        Op::DateWithin => date_within(left, right),
    };
    Ok(result)
}

fn strings<'a>(left: &'a Value, right: &'a Value) -> Option<(&'a str, &'a str)> {
    Some((left.as_string()?, right.as_string()?))
}

/// Substring, list element or record key membership of `needle` in `haystack`.
fn contains(haystack: &Value, needle: &Value) -> bool {
    match haystack {
        Value::String(s) => needle.as_string().is_some_and(|n| s.contains(n)),
        Value::List(items) => items.iter().any(|v| v.loose_eq(needle)),
        Value::Record(record) => needle.as_string().is_some_and(|k| record.contains_key(k)),
        _ => false,
    }
}

fn elements(value: &Value) -> Option<&[Value]> {
    value.as_list()
}

/// Whether `value` matches `right`, which is either one value or a list of them.
fn member(value: &Value, right: &Value) -> bool {
    match right {
        Value::List(options) => options.iter().any(|o| value.loose_eq(o)),
        other => value.loose_eq(other),
    }
}

fn length_cmp(left: &Value, right: &Value) -> Option<Ordering> {
    let len = i64::try_from(left.len()?).ok()?;
    Some(len.cmp(&right.as_int()?))
}

fn abs_cmp(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Some(a.unsigned_abs().cmp(&b.unsigned_abs())),
        _ => left.as_float()?.abs().partial_cmp(&right.as_float()?.abs()),
    }
}

fn dates(
    left: &Value,
    right: &Value,
) -> Option<(chrono::DateTime<chrono::Utc>, chrono::DateTime<chrono::Utc>)> {
    Some((left.as_datetime()?, right.as_datetime()?))
}

fn date_within(left: &Value, right: &Value) -> bool {
    let (Some(at), Some([start, end])) = (left.as_datetime(), right.as_list()) else {
        return false;
    };
    match (start.as_datetime(), end.as_datetime()) {
        (Some(start), Some(end)) => start <= at && at <= end,
        _ => false,
    }
}
