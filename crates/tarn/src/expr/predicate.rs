//! Three-valued predicate evaluation.
//!
//! A predicate yields true, false, or null; WHERE keeps a row only when
//! every predicate is literally true. `null = null` is true only when both
//! sides are the literal null constant; a null reaching a comparison any
//! other way yields null.

use crate::{
    ast::ComparisonOp,
    context::{QueryContext, SelectRecord},
    exec,
    expr::{Expr, ExprKind, eval::eval},
};
use std::cmp::Ordering;
use tarn_core::{
    error::{StoreError, ValidationError},
    value::{CompareOp, Value, ValueKind},
};

/// Collapse a value into predicate truth. Null is unknown; a non-boolean
/// value in predicate position is a recorded type error and unknown.
pub(crate) fn truth(value: &Value, path: &str, ctx: &mut QueryContext<'_>) -> Option<bool> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(*b),
        other => {
            ctx.record(
                ValidationError::new(path.to_string(), "Expected a boolean predicate")
                    .with_types(ValueKind::Bool.to_string(), other.kind().to_string()),
            );
            None
        }
    }
}

pub(crate) fn eval_predicate(
    expr: &Expr,
    record: &SelectRecord,
    ctx: &mut QueryContext<'_>,
    group: Option<&[SelectRecord]>,
) -> Result<Value, StoreError> {
    match &expr.kind {
        ExprKind::Comparison { op, left, right } => {
            // Documented special case: the literal comparison null = null.
            if *op == ComparisonOp::Eq && is_null_literal(left) && is_null_literal(right) {
                return Ok(Value::Bool(true));
            }

            let l = eval(left, record, ctx, group)?;
            let r = eval(right, record, ctx, group)?;
            Ok(compare(*op, &l, &r, &expr.path, ctx))
        }
        ExprKind::InList { value, items } => {
            let probe = eval(value, record, ctx, group)?;
            if probe.is_null() {
                return Ok(Value::Null);
            }
            for item in items {
                let candidate = eval(item, record, ctx, group)?;
                if !candidate.is_null() && probe.compare(&candidate) == Ordering::Equal {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }
        ExprKind::InQuery { value, query } => {
            let probe = eval(value, record, ctx, group)?;
            if probe.is_null() {
                return Ok(Value::Null);
            }
            let rows = ctx.with_correlation(record, |ctx| exec::execute_row_plan(query, ctx))?;
            let matched = rows.iter().any(|row| {
                row.first()
                    .is_some_and(|v| !v.is_null() && probe.compare(v) == Ordering::Equal)
            });
            Ok(Value::Bool(matched))
        }
        ExprKind::Between { value, low, high } => {
            let probe = eval(value, record, ctx, group)?;
            let lo = eval(low, record, ctx, group)?;
            let hi = eval(high, record, ctx, group)?;
            if probe.is_null() || lo.is_null() || hi.is_null() {
                return Ok(Value::Null);
            }
            if !probe.comparable_with(&lo, CompareOp::Gte)
                || !probe.comparable_with(&hi, CompareOp::Lte)
            {
                ctx.record(
                    ValidationError::new(
                        expr.path.clone(),
                        "BETWEEN bounds must share the probe's type",
                    )
                    .with_types(probe.kind().to_string(), lo.kind().to_string()),
                );
                return Ok(Value::Null);
            }

            let inside = probe.compare(&lo) != Ordering::Less
                && probe.compare(&hi) != Ordering::Greater;
            Ok(Value::Bool(inside))
        }
        ExprKind::IsNull(value) => {
            let v = eval(value, record, ctx, group)?;
            Ok(Value::Bool(v.is_null()))
        }
        ExprKind::Exists(plan) => {
            let rows = ctx.with_correlation(record, |ctx| exec::execute_row_plan(plan, ctx))?;
            Ok(Value::Bool(!rows.is_empty()))
        }
        ExprKind::And(items) => {
            let mut unknown = false;
            for item in items {
                let v = eval(item, record, ctx, group)?;
                match truth(&v, &item.path, ctx) {
                    Some(false) => return Ok(Value::Bool(false)),
                    None => unknown = true,
                    Some(true) => {}
                }
            }
            Ok(if unknown { Value::Null } else { Value::Bool(true) })
        }
        ExprKind::Or(items) => {
            let mut unknown = false;
            for item in items {
                let v = eval(item, record, ctx, group)?;
                match truth(&v, &item.path, ctx) {
                    Some(true) => return Ok(Value::Bool(true)),
                    None => unknown = true,
                    Some(false) => {}
                }
            }
            Ok(if unknown { Value::Null } else { Value::Bool(false) })
        }
        ExprKind::Not(inner) => {
            let v = eval(inner, record, ctx, group)?;
            Ok(match truth(&v, &inner.path, ctx) {
                Some(b) => Value::Bool(!b),
                None => Value::Null,
            })
        }
        _ => Ok(Value::Null),
    }
}

fn is_null_literal(expr: &Expr) -> bool {
    matches!(&expr.kind, ExprKind::Constant(Value::Null))
}

// ─────────────────────────────────────────────────────────────
// Comparison
// ─────────────────────────────────────────────────────────────

fn compare(
    op: ComparisonOp,
    left: &Value,
    right: &Value,
    path: &str,
    ctx: &mut QueryContext<'_>,
) -> Value {
    if left.is_null() || right.is_null() {
        return Value::Null;
    }

    let core_op = core_op(op);
    if !left.comparable_with(right, core_op) {
        let message = if core_op.is_text_only() {
            "LIKE requires string operands".to_string()
        } else {
            format!("Cannot compare {} with {}", left.kind(), right.kind())
        };
        ctx.record(
            ValidationError::new(path.to_string(), message)
                .with_types(left.kind().to_string(), right.kind().to_string()),
        );
        return Value::Null;
    }

    let result = match op {
        ComparisonOp::Eq => left.compare(right) == Ordering::Equal,
        ComparisonOp::Ne => left.compare(right) != Ordering::Equal,
        ComparisonOp::Lt => left.compare(right) == Ordering::Less,
        ComparisonOp::Gt => left.compare(right) == Ordering::Greater,
        ComparisonOp::Lte => left.compare(right) != Ordering::Greater,
        ComparisonOp::Gte => left.compare(right) != Ordering::Less,
        ComparisonOp::Like | ComparisonOp::NotLike => {
            let matched = match (left, right) {
                (Value::Text(text), Value::Text(pattern)) => like_match(text, pattern),
                _ => false,
            };
            if op == ComparisonOp::Like { matched } else { !matched }
        }
    };

    Value::Bool(result)
}

const fn core_op(op: ComparisonOp) -> CompareOp {
    match op {
        ComparisonOp::Eq => CompareOp::Eq,
        ComparisonOp::Ne => CompareOp::Ne,
        ComparisonOp::Lt => CompareOp::Lt,
        ComparisonOp::Lte => CompareOp::Lte,
        ComparisonOp::Gt => CompareOp::Gt,
        ComparisonOp::Gte => CompareOp::Gte,
        ComparisonOp::Like => CompareOp::Like,
        ComparisonOp::NotLike => CompareOp::NotLike,
    }
}

/// SQL LIKE: `%` matches any run of characters, `_` exactly one.
fn like_match(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();

    // matched[i] == true: pattern[..p] can consume text[..i].
    let mut matched = vec![false; text.len() + 1];
    matched[0] = true;

    for p in &pattern {
        if *p == '%' {
            // A run of anything: every position reachable before stays
            // reachable, and everything after the first reachable one is.
            let first = matched.iter().position(|m| *m);
            if let Some(first) = first {
                for slot in matched.iter_mut().skip(first) {
                    *slot = true;
                }
            }
            continue;
        }

        let mut next = vec![false; text.len() + 1];
        for (i, ch) in text.iter().enumerate() {
            if matched[i] && (*p == '_' || p == ch) {
                next[i + 1] = true;
            }
        }
        matched = next;
    }

    matched[text.len()]
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::like_match;

    #[test]
    fn like_wildcards() {
        assert!(like_match("hello", "hello"));
        assert!(like_match("hello", "h%"));
        assert!(like_match("hello", "%llo"));
        assert!(like_match("hello", "h_llo"));
        assert!(like_match("hello", "%"));
        assert!(like_match("", "%"));
        assert!(!like_match("hello", "h_lo"));
        assert!(!like_match("hello", "bye%"));
        assert!(!like_match("", "_"));
    }

    #[test]
    fn like_is_case_sensitive_and_anchored() {
        assert!(!like_match("Hello", "hello"));
        assert!(!like_match("hello world", "hello"));
        assert!(like_match("hello world", "hello%"));
    }

    #[test]
    fn like_handles_adjacent_wildcards() {
        assert!(like_match("abc", "a%%c"));
        assert!(like_match("abc", "%_%"));
        assert!(!like_match("", "%_%"));
    }
}
