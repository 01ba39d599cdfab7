//! Translation of constraints and ordering into `JSONB` SQL.
//!
//! Every field resolves to a `jsonb` expression: `id` maps to the key column,
//! anything else to `data #> '{a,b}'`. A missing path is SQL `NULL`, which no
//! comparison matches, so documents lacking the field are excluded for every
//! operator (including `Neq`).
//!
//! Range operators are guarded by `jsonb_typeof` so that only values of the
//! same scalar JSON type are compared; a range over `null`, an array or an
//! object matches nothing. String ranges compare bytewise (`COLLATE "C"`);
//! `ORDER BY` still follows the database collation.

use docquery_core::constraint::{Constraint, Direction, Operator, OrderSpec};
use docquery_core::document::{ID_FIELD, Value};
use docquery_core::store::StoreError;
use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder};

/// Append `AND <predicate>` for each constraint.
///
/// # Errors
///
/// Returns [`StoreError::InvalidArgument`] for an empty field path or an
/// `In` constraint whose value is not a list.
pub fn push_constraints(
    builder: &mut QueryBuilder<'_, Postgres>,
    constraints: &[Constraint],
) -> Result<(), StoreError> {
    for constraint in constraints {
        validate(constraint)?;
        builder.push(" AND ");
        push_predicate(builder, constraint);
    }
    Ok(())
}

/// Append `ORDER BY`, falling back to id order for a stable result.
pub fn push_order(builder: &mut QueryBuilder<'_, Postgres>, order: Option<&OrderSpec>) {
    builder.push(" ORDER BY ");
    if let Some(order) = order {
        push_field(builder, &order.field);
        // Missing fields sort first ascending, last descending.
        builder.push(match order.direction {
            Direction::Asc => " ASC NULLS FIRST, ",
            Direction::Desc => " DESC NULLS LAST, ",
        });
    }
    builder.push("id ASC");
}

fn validate(constraint: &Constraint) -> Result<(), StoreError> {
    if constraint.field.split('.').any(str::is_empty) {
        return Err(StoreError::InvalidArgument(format!(
            "invalid field path `{}`",
            constraint.field
        )));
    }
    if constraint.operator == Operator::In && !constraint.value.is_array() {
        return Err(StoreError::InvalidArgument(format!(
            "`in` on `{}` needs a list, got {}",
            constraint.field, constraint.value
        )));
    }
    Ok(())
}

fn push_predicate(builder: &mut QueryBuilder<'_, Postgres>, constraint: &Constraint) {
    let field = constraint.field.as_str();
    let value = constraint.value.clone();

    match constraint.operator {
        Operator::Eq => push_comparison(builder, field, "=", value),
        Operator::Neq => push_comparison(builder, field, "<>", value),
        Operator::Gt => push_range(builder, field, ">", value),
        Operator::Gte => push_range(builder, field, ">=", value),
        Operator::Lt => push_range(builder, field, "<", value),
        Operator::Lte => push_range(builder, field, "<=", value),
        Operator::In => {
            push_field(builder, field);
            builder.push(" IN (SELECT jsonb_array_elements(");
            builder.push_bind(Json(value));
            builder.push("))");
        }
        Operator::ArrayContains => {
            builder.push("(jsonb_typeof(");
            push_field(builder, field);
            builder.push(") = 'array' AND ");
            push_field(builder, field);
            builder.push(" @> jsonb_build_array(");
            builder.push_bind(Json(value));
            builder.push("))");
        }
    }
}

fn push_comparison(builder: &mut QueryBuilder<'_, Postgres>, field: &str, op: &str, value: Value) {
    push_field(builder, field);
    builder.push(format!(" {op} "));
    builder.push_bind(Json(value));
}

fn push_range(builder: &mut QueryBuilder<'_, Postgres>, field: &str, op: &str, value: Value) {
    if let Value::String(text) = value {
        builder.push("(jsonb_typeof(");
        push_field(builder, field);
        builder.push(") = 'string' AND (");
        push_field(builder, field);
        builder.push(format!(" #>> '{{}}') COLLATE \"C\" {op} "));
        builder.push_bind(text);
        builder.push(")");
        return;
    }
    if !(value.is_number() || value.is_boolean()) {
        // null, arrays and objects never satisfy a range.
        builder.push("FALSE");
        return;
    }
    builder.push("(jsonb_typeof(");
    push_field(builder, field);
    builder.push(") = jsonb_typeof(");
    builder.push_bind(Json(value.clone()));
    builder.push(") AND ");
    push_comparison(builder, field, op, value);
    builder.push(")");
}

fn push_field(builder: &mut QueryBuilder<'_, Postgres>, field: &str) {
    if field == ID_FIELD {
        builder.push("to_jsonb(id)");
        return;
    }
    let path: Vec<String> = field.split('.').map(str::to_string).collect();
    builder.push("(data #> ");
    builder.push_bind(path);
    builder.push("::text[])");
}
