//! Expression evaluation.
//!
//! `eval` is total: user mistakes append a `ValidationError` to the context
//! and yield a safe default (usually null) so one pass surfaces every
//! problem. Only store failures abort, via `Result`.

use crate::{
    ast::{BinaryOp, UnaryOp},
    context::{QueryContext, SelectRecord, TEMP_SOURCE},
    exec,
    expr::{Expr, ExprKind, aggregate, functions, predicate},
};
use std::rc::Rc;
use tarn_core::{
    error::{StoreError, ValidationError},
    record::DataRecord,
    value::{Value, ValueKind},
};

pub(crate) fn eval(
    expr: &Expr,
    record: &SelectRecord,
    ctx: &mut QueryContext<'_>,
    group: Option<&[SelectRecord]>,
) -> Result<Value, StoreError> {
    match &expr.kind {
        ExprKind::Constant(value) => Ok(value.clone()),
        ExprKind::Column { source, column } => eval_column(expr, source, column, record, ctx),
        ExprKind::Binary { op, left, right } => {
            let l = eval(left, record, ctx, group)?;
            let r = eval(right, record, ctx, group)?;
            Ok(eval_binary(*op, &l, &r, &expr.path, ctx))
        }
        ExprKind::Unary { op: UnaryOp::Neg, value } => {
            let v = eval(value, record, ctx, group)?;
            if v.is_null() {
                return Ok(Value::Null);
            }
            match v.as_number() {
                Some(n) => Ok(Value::Number(-n)),
                None => {
                    ctx.record(
                        ValidationError::new(
                            expr.path.clone(),
                            "Unary '-' requires a numeric operand",
                        )
                        .with_types(ValueKind::Number.to_string(), v.kind().to_string()),
                    );
                    Ok(Value::Null)
                }
            }
        }
        ExprKind::Aggregate { func, arg } => {
            aggregate::eval_aggregate(*func, arg.as_deref(), &expr.path, ctx, group)
        }
        ExprKind::Function { name, args } => {
            let mut evaluated = Vec::with_capacity(args.len());
            for arg in args {
                evaluated.push(eval(arg, record, ctx, group)?);
            }
            Ok(functions::call(name, &expr.path, &evaluated, ctx))
        }
        ExprKind::Window {
            func,
            value,
            partition_by,
            order_by,
        } => aggregate::eval_window(
            *func,
            value,
            partition_by,
            order_by,
            &expr.path,
            record,
            ctx,
            group,
        ),
        ExprKind::Case { branches, else_ } => {
            for (when, then) in branches {
                let test = eval(when, record, ctx, group)?;
                if predicate::truth(&test, &when.path, ctx) == Some(true) {
                    return eval(then, record, ctx, group);
                }
            }
            match else_ {
                Some(else_) => eval(else_, record, ctx, group),
                None => Ok(Value::Null),
            }
        }
        ExprKind::Subquery(plan) => {
            let rows =
                ctx.with_correlation(record, |ctx| exec::execute_row_plan(plan, ctx))?;
            Ok(rows
                .first()
                .and_then(|row| row.first().cloned())
                .unwrap_or(Value::Null))
        }
        ExprKind::SemanticSimilarity { table, query } => {
            Ok(Value::Number(ctx.similarity_score(table, query)))
        }
        ExprKind::Comparison { .. }
        | ExprKind::InList { .. }
        | ExprKind::InQuery { .. }
        | ExprKind::Between { .. }
        | ExprKind::IsNull(_)
        | ExprKind::Exists(_)
        | ExprKind::And(_)
        | ExprKind::Or(_)
        | ExprKind::Not(_) => predicate::eval_predicate(expr, record, ctx, group),
    }
}

// ─────────────────────────────────────────────────────────────
// Columns
// ─────────────────────────────────────────────────────────────

fn eval_column(
    expr: &Expr,
    source: &str,
    column: &str,
    record: &SelectRecord,
    ctx: &mut QueryContext<'_>,
) -> Result<Value, StoreError> {
    let Some((binding, rec)) = resolve_source(source, record, ctx) else {
        // A source registered elsewhere in the query but absent from this
        // row is the unmatched side of an outer join; its columns read as
        // null. Anything else is an unknown name and gets reported.
        if ctx.bindings.contains_key(source) {
            return Ok(Value::Null);
        }

        let available = if record.is_empty() {
            "none".to_string()
        } else {
            record.keys().cloned().collect::<Vec<_>>().join(", ")
        };
        ctx.record(
            ValidationError::new(
                expr.path.clone(),
                format!("Source '{source}' not found; available sources: {available}"),
            )
            .with_suggestion(format!("Reference one of the bound sources: {available}")),
        );
        return Ok(Value::Null);
    };

    if column == "*" {
        return Ok(Value::Record(rec.merged()));
    }

    if let Some(value) = rec.get(column) {
        return Ok(value);
    }

    // Absent column: a schema-bound source can tell a missing column from a
    // sparse row; synthetic sources cannot and read as null.
    if let Some(Some(table)) = ctx.bindings.get(&binding)
        && ctx.schema.field(table, column).is_none()
    {
        let table = table.clone();
        ctx.record(ValidationError::new(
            expr.path.clone(),
            format!("Unknown column '{column}' on table '{table}'"),
        ));
    }

    Ok(Value::Null)
}

// Resolution order: the row's own sources, the synthesized sort source,
// then the enclosing row's bindings when a correlated subquery is running.
// Unmatched outer-join rows simply lack the other side's binding and fall
// through to none, reading as null.
fn resolve_source(
    source: &str,
    record: &SelectRecord,
    ctx: &QueryContext<'_>,
) -> Option<(String, Rc<DataRecord>)> {
    if let Some(rec) = record.get(source) {
        return Some((source.to_string(), Rc::clone(rec)));
    }
    if let Some(rec) = record.get(TEMP_SOURCE) {
        return Some((TEMP_SOURCE.to_string(), Rc::clone(rec)));
    }
    if let Some(rec) = ctx.correlated.get(source) {
        return Some((source.to_string(), Rc::clone(rec)));
    }

    None
}

// ─────────────────────────────────────────────────────────────
// Binary arithmetic
// ─────────────────────────────────────────────────────────────

fn eval_binary(
    op: BinaryOp,
    left: &Value,
    right: &Value,
    path: &str,
    ctx: &mut QueryContext<'_>,
) -> Value {
    if left.is_null() || right.is_null() {
        return Value::Null;
    }

    if left.kind() != right.kind() {
        ctx.record(
            ValidationError::new(
                path.to_string(),
                format!("Operands of '{}' must share a type", op_token(op)),
            )
            .with_types(left.kind().to_string(), right.kind().to_string()),
        );
        return Value::Null;
    }

    match (left, right) {
        (Value::Text(a), Value::Text(b)) if op == BinaryOp::Add => {
            Value::Text(format!("{a}{b}"))
        }
        (Value::Number(a), Value::Number(b)) => match op {
            BinaryOp::Add => Value::Number(a + b),
            BinaryOp::Sub => Value::Number(a - b),
            BinaryOp::Mul => Value::Number(a * b),
            BinaryOp::Div => {
                if *b == 0.0 {
                    ctx.record(ValidationError::new(path.to_string(), "Division by zero"));
                    Value::Null
                } else {
                    Value::Number(a / b)
                }
            }
        },
        _ => {
            ctx.record(
                ValidationError::new(
                    path.to_string(),
                    format!(
                        "Cannot apply '{}' to {} operands",
                        op_token(op),
                        left.kind()
                    ),
                )
                .with_types(ValueKind::Number.to_string(), left.kind().to_string()),
            );
            Value::Null
        }
    }
}

const fn op_token(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
    }
}
