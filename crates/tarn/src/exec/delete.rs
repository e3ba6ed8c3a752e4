//! DELETE execution.
//!
//! Filtering mirrors UPDATE. RETURNING rows are materialized before any
//! delete is staged, so they project the records as they were.

use crate::{
    context::{QueryContext, SelectRecord},
    exec::{
        select::{filter_records, project},
        source::apply_join,
    },
    plan::DeletePlan,
    result::Row,
};
use std::collections::BTreeSet;
use tarn_core::error::{StoreError, ValidationError};

pub(crate) fn execute_delete(
    plan: &DeletePlan,
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
    for join in &plan.joins {
        records = apply_join(records, join, ctx)?;
    }
    records = filter_records(records, &plan.filters, ctx)?;

    // Returning first, then stage: projections see the doomed records.
    let mut ids = Vec::new();
    let mut seen = BTreeSet::new();
    let mut returning_rows = Vec::new();

    for record in records {
        let Some(target) = record.get(&plan.binding) else {
            continue;
        };
        let id = target.id.clone();
        if !seen.insert(id.clone()) {
            continue;
        }

        if !plan.returning.is_empty() {
            returning_rows.push(project(&plan.returning, &record, ctx, None)?);
        }
        ids.push(id);
    }

    let affected = ids.len();
    if let Some(state) = ctx.state_mut(&plan.table) {
        for id in &ids {
            state.delete(id);
        }
    }

    tracing::debug!(table = %plan.table, affected, "delete staged");
    Ok((returning_rows, affected))
}

fn bind_target(plan: &DeletePlan, ctx: &mut QueryContext<'_>) -> Vec<SelectRecord> {
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
