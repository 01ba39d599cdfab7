//! Filter constraints and ordering.
//!
//! A query carries an ordered list of [`Constraint`]s that combine with AND.
//! There is no OR and no grouping. Drivers translate constraints into their
//! native filter language; [`Constraint::matches`] is the reference
//! evaluation used by in-process drivers.
//!
//! # Matching rules
//!
//! - A missing field never matches, whatever the operator (including `Neq`).
//! - Numbers compare numerically, so `10` equals `10.0`.
//! - Range operators only match values of the same scalar JSON type
//!   (number/number, string/string, bool/bool); `null`, arrays and objects
//!   never match a range.
//! - `In` matches when the field equals any listed value.
//! - `ArrayContains` matches when the field is an array holding the value.

use crate::document::{Document, Value};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Comparison operator of a [`Constraint`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operator {
    /// Field equals value.
    Eq,
    /// Field is present and differs from value.
    Neq,
    /// Field is greater than value.
    Gt,
    /// Field is greater than or equal to value.
    Gte,
    /// Field is less than value.
    Lt,
    /// Field is less than or equal to value.
    Lte,
    /// Field equals one of the values in a list.
    In,
    /// Field is an array containing value.
    ArrayContains,
}

impl Operator {
    /// Short textual form, used in logs and error messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Neq => "neq",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::In => "in",
            Self::ArrayContains => "array-contains",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `(field, operator, value)` filter condition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    /// Field name, possibly a dotted path.
    pub field: String,
    /// Comparison operator.
    pub operator: Operator,
    /// Right-hand side. For [`Operator::In`] this is a JSON array.
    pub value: Value,
}

impl Constraint {
    /// Create a constraint.
    #[must_use]
    pub fn new(field: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }

    /// Evaluate this constraint against a document.
    #[must_use]
    pub fn matches(&self, document: &Document) -> bool {
        let Some(actual) = document.get_path(&self.field) else {
            return false;
        };

        match self.operator {
            Operator::Eq => values_equal(actual, &self.value),
            Operator::Neq => !values_equal(actual, &self.value),
            Operator::Gt => compare_range(actual, &self.value) == Some(Ordering::Greater),
            Operator::Gte => matches!(
                compare_range(actual, &self.value),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Operator::Lt => compare_range(actual, &self.value) == Some(Ordering::Less),
            Operator::Lte => matches!(
                compare_range(actual, &self.value),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Operator::In => self
                .value
                .as_array()
                .is_some_and(|candidates| candidates.iter().any(|c| values_equal(actual, c))),
            Operator::ArrayContains => actual
                .as_array()
                .is_some_and(|items| items.iter().any(|item| values_equal(item, &self.value))),
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.field, self.operator, self.value)
    }
}

/// Whether every constraint in `constraints` matches `document`.
#[must_use]
pub fn matches_all(constraints: &[Constraint], document: &Document) -> bool {
    constraints.iter().all(|c| c.matches(document))
}

/// Sort direction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Smallest first.
    #[default]
    Asc,
    /// Largest first.
    Desc,
}

/// Result ordering: one field and a direction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSpec {
    /// Field name, possibly a dotted path.
    pub field: String,
    /// Sort direction.
    pub direction: Direction,
}

impl OrderSpec {
    /// Create an ordering.
    #[must_use]
    pub fn new(field: impl Into<String>, direction: Direction) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }

    /// Compare two documents under this ordering.
    ///
    /// Values are ranked by [`compare_values`]; missing fields sort first in
    /// ascending order.
    #[must_use]
    pub fn compare(&self, a: &Document, b: &Document) -> Ordering {
        let ordering = match (a.get_path(&self.field), b.get_path(&self.field)) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(x), Some(y)) => compare_values(x, y),
        };
        match self.direction {
            Direction::Asc => ordering,
            Direction::Desc => ordering.reverse(),
        }
    }
}

/// Structural equality with numeric comparison for numbers.
#[must_use]
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => compare_numbers(x, y) == Ordering::Equal,
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| values_equal(x, y)))
        }
        _ => a == b,
    }
}

/// Total order over JSON values used for sorting.
///
/// Values of different types rank `null < bool < number < string < array <
/// object`; values of the same type compare naturally.
#[must_use]
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    compare_same_type(a, b).unwrap_or_else(|| type_rank(a).cmp(&type_rank(b)))
}

/// Ordering for range operators: scalar pairs of one type only.
fn compare_range(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Bool(_), Value::Bool(_))
        | (Value::Number(_), Value::Number(_))
        | (Value::String(_), Value::String(_)) => compare_same_type(a, b),
        _ => None,
    }
}

fn compare_same_type(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Number(x), Value::Number(y)) => Some(compare_numbers(x, y)),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Array(xs), Value::Array(ys)) => Some(
            xs.iter()
                .zip(ys)
                .map(|(x, y)| compare_values(x, y))
                .find(|o| o.is_ne())
                .unwrap_or_else(|| xs.len().cmp(&ys.len())),
        ),
        _ => None,
    }
}

fn compare_numbers(x: &serde_json::Number, y: &serde_json::Number) -> Ordering {
    if let (Some(a), Some(b)) = (x.as_i64(), y.as_i64()) {
        return a.cmp(&b);
    }
    if let (Some(a), Some(b)) = (x.as_u64(), y.as_u64()) {
        return a.cmp(&b);
    }
    let a = x.as_f64().unwrap_or(f64::NAN);
    let b = y.as_f64().unwrap_or(f64::NAN);
    a.total_cmp(&b)
}

const fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}
