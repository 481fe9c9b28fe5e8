//! Shaping stages
//!
//! Pure functions applied to fetched data, in pipeline order: property
//! extraction, join, filter, shape reconciliation, transform and sort.
//! Lookups need nested fetches and live with [`DataSource`](super::DataSource).

use crate::config::{FilterClause, Join, SortClause, Transform};
use crate::error::{Error, Result};
use crate::expression::{compare_values, loose_equals, CompiledExpression, ExpressionEngine};
use crate::template::{resolve_tokens, TokenContext};
use crate::types::{ResultKind, SortOrder};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::sync::Arc;

/// Select the rows from a response body
pub fn extract_property(
    engine: &dyn ExpressionEngine,
    property: Option<&str>,
    body: &Value,
) -> Result<Value> {
    match property {
        Some(expression) => engine.compile(expression)?.evaluate(body),
        None => Ok(body.clone()),
    }
}

/// Inner join: one output row per matching (left, right) pair
///
/// Each output row is the left row with the right row attached under
/// `join.name`. Left rows with no match are dropped.
pub fn join_rows(
    engine: &dyn ExpressionEngine,
    data_set: &str,
    join: &Join,
    left: Value,
    right: &Value,
) -> Result<Value> {
    let not_array = |side: &str| Error::JoinNotArray {
        data_set: data_set.to_string(),
        join: join.name.clone(),
        side: side.to_string(),
    };
    let Value::Array(left_rows) = left else {
        return Err(not_array("left"));
    };
    let Value::Array(right_rows) = right else {
        return Err(not_array("right"));
    };

    let conditions: Vec<(Arc<dyn CompiledExpression>, Arc<dyn CompiledExpression>)> = join
        .on
        .iter()
        .map(|c| Ok((engine.compile(&c.left)?, engine.compile(&c.right)?)))
        .collect::<Result<_>>()?;

    let right_keys = right_rows
        .iter()
        .map(|row| {
            conditions
                .iter()
                .map(|(_, right)| right.evaluate(row))
                .collect::<Result<Vec<_>>>()
        })
        .collect::<Result<Vec<_>>>()?;

    let mut joined = Vec::new();
    for row in left_rows {
        let left_key = conditions
            .iter()
            .map(|(left, _)| left.evaluate(&row))
            .collect::<Result<Vec<_>>>()?;

        for (right_row, right_key) in right_rows.iter().zip(&right_keys) {
            let matched = left_key
                .iter()
                .zip(right_key)
                .all(|(l, r)| loose_equals(l, r));
            if matched {
                let mut merged = match &row {
                    Value::Object(map) => map.clone(),
                    _ => Map::new(),
                };
                merged.insert(join.name.clone(), right_row.clone());
                joined.push(Value::Object(merged));
            }
        }
    }
    Ok(Value::Array(joined))
}

/// Keep the rows where every clause equals its resolved target
///
/// With an object result the filter must leave exactly one row, which is
/// returned unwrapped. Null data is an empty row set.
pub fn filter_rows(
    engine: &dyn ExpressionEngine,
    data_set: &str,
    clauses: &[FilterClause],
    result: ResultKind,
    data: Value,
    ctx: &TokenContext,
) -> Result<Value> {
    if clauses.is_empty() {
        return Ok(data);
    }
    let rows = match data {
        Value::Array(rows) => rows,
        Value::Null => Vec::new(),
        _ => {
            return Err(Error::FilterNotArray {
                data_set: data_set.to_string(),
            })
        }
    };

    let compiled = clauses
        .iter()
        .map(|clause| {
            Ok((
                engine.compile(&clause.expression)?,
                resolve_tokens(&clause.value, ctx, false)?,
            ))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut kept = Vec::new();
    for row in rows {
        let mut keep = true;
        for (expression, target) in &compiled {
            if !loose_equals(&expression.evaluate(&row)?, target) {
                keep = false;
                break;
            }
        }
        if keep {
            kept.push(row);
        }
    }

    match result {
        ResultKind::Array => Ok(Value::Array(kept)),
        ResultKind::Object => match kept.len() {
            1 => Ok(kept.swap_remove(0)),
            0 => Err(Error::FilteredObjectCount {
                data_set: data_set.to_string(),
                message: "filtered result had no items".to_string(),
            }),
            n => Err(Error::FilteredObjectCount {
                data_set: data_set.to_string(),
                message: format!("filtered result had {n} items"),
            }),
        },
    }
}

/// Reconcile the data with the declared result shape
///
/// A one-element array is unwrapped for an object result and `null` is an
/// empty array for an array result. Any other mismatch is an error.
pub fn reconcile_shape(data_set: &str, result: ResultKind, data: Value) -> Result<Value> {
    let mismatch = |data: &Value| Error::ResultMismatch {
        data_set: data_set.to_string(),
        expected: result.as_str().to_string(),
        actual: ResultKind::describe(data).to_string(),
    };

    match (result, data) {
        (ResultKind::Array, data @ Value::Array(_)) => Ok(data),
        (ResultKind::Array, Value::Null) => Ok(Value::Array(Vec::new())),
        (ResultKind::Object, data @ Value::Object(_)) => Ok(data),
        (ResultKind::Object, Value::Array(mut rows)) if rows.len() == 1 => Ok(rows.swap_remove(0)),
        (_, data) => Err(mismatch(&data)),
    }
}

/// Rewrite each row (or the single object) through the transform
pub fn transform_data(
    engine: &dyn ExpressionEngine,
    transform: &Transform,
    data: Value,
) -> Result<Value> {
    let expression = engine.compile(&transform.source())?;
    match data {
        Value::Array(rows) => rows
            .iter()
            .map(|row| expression.evaluate(row))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        other => expression.evaluate(&other),
    }
}

/// Stable multi-key sort
pub fn sort_rows(engine: &dyn ExpressionEngine, clauses: &[SortClause], data: Value) -> Result<Value> {
    let Value::Array(rows) = data else {
        return Ok(data);
    };
    if clauses.is_empty() {
        return Ok(Value::Array(rows));
    }

    let keys = clauses
        .iter()
        .map(|clause| Ok((engine.compile(&clause.expression)?, clause.order)))
        .collect::<Result<Vec<_>>>()?;

    let mut keyed = rows
        .into_iter()
        .map(|row| {
            let values = keys
                .iter()
                .map(|(expression, _)| expression.evaluate(&row))
                .collect::<Result<Vec<_>>>()?;
            Ok((values, row))
        })
        .collect::<Result<Vec<_>>>()?;

    keyed.sort_by(|(a, _), (b, _)| {
        for ((x, y), (_, order)) in a.iter().zip(b).zip(&keys) {
            let ordering = match order {
                SortOrder::Asc => compare_values(x, y),
                SortOrder::Desc => compare_values(y, x),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });

    Ok(Value::Array(keyed.into_iter().map(|(_, row)| row).collect()))
}
