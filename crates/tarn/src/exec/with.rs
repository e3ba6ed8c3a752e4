//! Common table expressions.
//!
//! Bindings execute in declaration order and land in the context as
//! synthesized read-only rows, so later bindings and the final statement
//! see them as sources. A recursive binding runs its anchor once, then
//! iterates the recursive arm, which sees the cumulative rows, until an
//! iteration adds nothing new or the safety bound trips.

use crate::{
    RECURSIVE_CTE_LIMIT,
    context::QueryContext,
    exec::{self, select::execute_select},
    plan::{CtePlan, RowPlan, SetOpKind},
    result::Row,
};
use std::{collections::BTreeSet, rc::Rc};
use tarn_core::{
    error::{StoreError, ValidationError},
    record::DataRecord,
};

pub(crate) fn execute_ctes(
    ctes: &[CtePlan],
    ctx: &mut QueryContext<'_>,
) -> Result<(), StoreError> {
    for cte in ctes {
        if cte.recursive
            && let RowPlan::SetOp(op) = &cte.body
            && op.kind == SetOpKind::Union
        {
            execute_recursive(cte, ctx)?;
            continue;
        }

        let rows = exec::execute_row_plan(&cte.body, ctx)?;
        let records = synthesize(&cte.name, rows, 0, ctx.now_ms);
        ctx.ctes.insert(cte.name.clone(), records);
    }

    Ok(())
}

fn execute_recursive(cte: &CtePlan, ctx: &mut QueryContext<'_>) -> Result<(), StoreError> {
    let RowPlan::SetOp(op) = &cte.body else {
        return Ok(());
    };

    let anchor = execute_select(&op.left, ctx)?;
    let mut seen: BTreeSet<String> = anchor.iter().map(Row::structural_key).collect();
    let mut total = anchor.len();
    ctx.ctes
        .insert(cte.name.clone(), synthesize(&cte.name, anchor, 0, ctx.now_ms));

    let mut iterations = 0;
    loop {
        if iterations >= RECURSIVE_CTE_LIMIT {
            ctx.record(ValidationError::new(
                cte.path.clone(),
                format!(
                    "Recursive CTE '{}' exceeded {RECURSIVE_CTE_LIMIT} iterations",
                    cte.name
                ),
            ));
            break;
        }
        iterations += 1;

        // The recursive arm sees everything accumulated so far.
        let step = execute_select(&op.right, ctx)?;
        let fresh: Vec<Row> = step
            .into_iter()
            .filter(|row| seen.insert(row.structural_key()))
            .collect();
        if fresh.is_empty() {
            break;
        }

        let records = synthesize(&cte.name, fresh, total, ctx.now_ms);
        total += records.len();
        if let Some(bound) = ctx.ctes.get_mut(&cte.name) {
            bound.extend(records);
        }
    }

    tracing::trace!(cte = %cte.name, rows = total, iterations, "recursive cte settled");
    Ok(())
}

fn synthesize(name: &str, rows: Vec<Row>, offset: usize, now_ms: i64) -> Vec<Rc<DataRecord>> {
    rows.into_iter()
        .enumerate()
        .map(|(i, row)| {
            Rc::new(DataRecord::new(
                format!("{name}_{}", offset + i),
                now_ms,
                row.into_fields(),
            ))
        })
        .collect()
}
