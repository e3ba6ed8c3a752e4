//! UPDATE execution.
//!
//! The target table's rows seed the row set, FROM/JOIN/WHERE filter it like
//! a SELECT, and each surviving row stages a partial update on its target
//! record. RETURNING projects the post-update record.

use crate::{
    context::{QueryContext, SelectRecord},
    exec::{
        insert::check_assignable,
        select::{filter_records, project},
        source::{apply_join, resolve_source},
    },
    expr::eval,
    plan::UpdatePlan,
    result::Row,
};
use std::{
    collections::{BTreeMap, BTreeSet},
    rc::Rc,
};
use tarn_core::error::{StoreError, ValidationError};

pub(crate) fn execute_update(
    plan: &UpdatePlan,
    ctx: &mut QueryContext<'_>,
) -> Result<(Vec<Row>, usize), StoreError> {
    if !ctx.ensure_table(&plan.table)? {
        ctx.record(ValidationError::new(
            plan.path.clone(),
            format!("Unknown table '{}'", plan.table),
        ));
        return Ok((Vec::new(), 0));
    }

    let mut records = bind_target(plan, ctx);

    // FROM is a cross product with an extra source, then joins and filters.
    if let Some(from) = &plan.from {
        let extra = resolve_source(from, ctx)?;
        let mut widened = Vec::with_capacity(records.len() * extra.len().max(1));
        for record in &records {
            for right in &extra {
                let mut candidate = record.clone();
                candidate.insert(from.binding.clone(), Rc::clone(right));
                widened.push(candidate);
            }
        }
        records = widened;
    }
    for join in &plan.joins {
        records = apply_join(records, join, ctx)?;
    }
    records = filter_records(records, &plan.filters, ctx)?;

    let mut returning_rows = Vec::new();
    let mut touched = BTreeSet::new();
    let now_ms = ctx.now_ms;

    for record in records {
        // Outer-join survivors may not bind the target side.
        let Some(target) = record.get(&plan.binding).cloned() else {
            continue;
        };
        let id = target.id.clone();

        let mut partial = BTreeMap::new();
        for item in &plan.set {
            let value = eval(&item.expr, &record, ctx, None)?;
            match ctx.schema.field(&plan.table, &item.column).cloned() {
                Some(field) => {
                    check_assignable(&value, &field, &plan.table, &item.expr.path, ctx);
                }
                None => ctx.record(ValidationError::new(
                    item.path.clone(),
                    format!("Unknown column '{}' on table '{}'", item.column, plan.table),
                )),
            }
            partial.insert(item.column.clone(), value);
        }

        if let Some(state) = ctx.state_mut(&plan.table) {
            state.update(&id, partial, now_ms);
        }
        touched.insert(id.clone());

        if !plan.returning.is_empty()
            && let Some(updated) = ctx.state(&plan.table).and_then(|s| s.find(&id)).cloned()
        {
            let mut post = record.clone();
            post.insert(plan.binding.clone(), updated);
            returning_rows.push(project(&plan.returning, &post, ctx, None)?);
        }
    }

    tracing::debug!(table = %plan.table, affected = touched.len(), "update staged");
    Ok((returning_rows, touched.len()))
}

// Seed the row set from the target table and register its binding.
fn bind_target(plan: &UpdatePlan, ctx: &mut QueryContext<'_>) -> Vec<SelectRecord> {
    let rows = ctx
        .state(&plan.table)
        .map(|state| state.current.clone())
        .unwrap_or_default();

    ctx.bindings
        .insert(plan.binding.clone(), Some(plan.table.clone()));

    rows.into_iter()
        .map(|record| {
            let mut select_record = SelectRecord::new();
            select_record.insert(plan.binding.clone(), record);
            select_record
        })
        .collect()
}
