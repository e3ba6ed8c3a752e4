//! Aggregate and window evaluation.
//!
//! Aggregates consume the group partition handed down by the projection:
//! the GROUP BY group, or the whole filtered set for ungrouped aggregate
//! queries. A window call filters that set down to the current row's
//! partition, orders it, and delegates to the plain aggregate.

use crate::{
    ast::AggregateFn,
    context::{QueryContext, SelectRecord},
    exec,
    expr::{Expr, SortKey, eval::eval},
};
use std::cmp::Ordering;
use tarn_core::{
    error::{StoreError, ValidationError},
    value::{Value, ValueKind},
};

pub(crate) fn eval_aggregate(
    func: AggregateFn,
    arg: Option<&Expr>,
    path: &str,
    ctx: &mut QueryContext<'_>,
    group: Option<&[SelectRecord]>,
) -> Result<Value, StoreError> {
    let rows = group.unwrap_or(&[]);

    let Some(arg) = arg else {
        // Only count may take `*`.
        if func == AggregateFn::Count {
            return Ok(Value::from(i64::try_from(rows.len()).unwrap_or(i64::MAX)));
        }
        ctx.record(ValidationError::new(
            path.to_string(),
            format!("Aggregate '{}' requires an argument", func_name(func)),
        ));
        return Ok(safe_default(func));
    };

    let mut values = Vec::with_capacity(rows.len());
    for row in rows {
        values.push(eval(arg, row, ctx, None)?);
    }

    Ok(fold(func, &values, path, ctx))
}

fn fold(func: AggregateFn, values: &[Value], path: &str, ctx: &mut QueryContext<'_>) -> Value {
    match func {
        AggregateFn::Count => {
            let count = values.iter().filter(|v| !v.is_null()).count();
            Value::from(i64::try_from(count).unwrap_or(i64::MAX))
        }
        AggregateFn::Sum | AggregateFn::Avg => {
            let mut sum = 0.0;
            let mut count = 0_usize;
            for value in values {
                if value.is_null() {
                    continue;
                }
                let Some(n) = value.as_number() else {
                    ctx.record(
                        ValidationError::new(
                            path.to_string(),
                            format!(
                                "Aggregate '{}' requires numeric input",
                                func_name(func)
                            ),
                        )
                        .with_types(ValueKind::Number.to_string(), value.kind().to_string()),
                    );
                    return safe_default(func);
                };
                sum += n;
                count += 1;
            }

            match func {
                AggregateFn::Sum => Value::Number(sum),
                _ if count == 0 => Value::Null,
                #[expect(clippy::cast_precision_loss)]
                _ => Value::Number(sum / count as f64),
            }
        }
        AggregateFn::Min | AggregateFn::Max => {
            let mut best: Option<&Value> = None;
            for value in values {
                if value.is_null() {
                    continue;
                }
                let replace = best.is_none_or(|current| {
                    let ordering = value.compare(current);
                    match func {
                        AggregateFn::Min => ordering == Ordering::Less,
                        _ => ordering == Ordering::Greater,
                    }
                });
                if replace {
                    best = Some(value);
                }
            }
            best.cloned().unwrap_or(Value::Null)
        }
    }
}

#[expect(clippy::too_many_arguments)]
pub(crate) fn eval_window(
    func: AggregateFn,
    value: &Expr,
    partition_by: &[Expr],
    order_by: &[SortKey],
    path: &str,
    record: &SelectRecord,
    ctx: &mut QueryContext<'_>,
    group: Option<&[SelectRecord]>,
) -> Result<Value, StoreError> {
    let rows = group.unwrap_or(&[]);

    // The current row's partition key selects its peers.
    let mut keys = Vec::with_capacity(partition_by.len());
    for expr in partition_by {
        keys.push(eval(expr, record, ctx, None)?);
    }

    let mut partition: Vec<SelectRecord> = Vec::new();
    'rows: for row in rows {
        for (expr, key) in partition_by.iter().zip(&keys) {
            let candidate = eval(expr, row, ctx, None)?;
            if candidate.compare(key) != Ordering::Equal {
                continue 'rows;
            }
        }
        partition.push(row.clone());
    }

    if !order_by.is_empty() {
        partition = exec::sort_records(partition, order_by, ctx)?;
    }

    eval_aggregate(func, Some(value), path, ctx, Some(&partition))
}

const fn func_name(func: AggregateFn) -> &'static str {
    match func {
        AggregateFn::Count => "count",
        AggregateFn::Sum => "sum",
        AggregateFn::Avg => "avg",
        AggregateFn::Min => "min",
        AggregateFn::Max => "max",
    }
}

const fn safe_default(func: AggregateFn) -> Value {
    match func {
        AggregateFn::Sum => Value::Number(0.0),
        _ => Value::Null,
    }
}
