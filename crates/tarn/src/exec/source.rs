//! Data sources, joins, and sorting.
//!
//! A source resolves to rows in CTE > table > subquery order. Resolution
//! registers the source's binding in the context so column references can
//! validate against the backing table. Rows only answer to sources bound
//! in their own select-record; correlated subqueries get the enclosing row
//! through `QueryContext::with_correlation`.

use crate::{
    context::{QueryContext, SelectRecord},
    exec,
    expr::{SortKey, compare_sort_keys, eval, truth},
    plan::{JoinPlan, SourceKind, SourcePlan},
};
use std::rc::Rc;
use tarn_core::{
    error::{StoreError, ValidationError},
    record::DataRecord,
};

/// Resolve a source to its rows and register its binding.
pub(crate) fn resolve_source(
    source: &SourcePlan,
    ctx: &mut QueryContext<'_>,
) -> Result<Vec<Rc<DataRecord>>, StoreError> {
    let rows = match &source.kind {
        SourceKind::Table { table } => {
            if let Some(rows) = ctx.ctes.get(table) {
                let rows = rows.clone();
                ctx.bindings.insert(source.binding.clone(), None);
                rows
            } else if ctx.ensure_table(table)? {
                ctx.bindings
                    .insert(source.binding.clone(), Some(table.clone()));
                ctx.state(table).map(|state| state.current.clone()).unwrap_or_default()
            } else {
                ctx.record(ValidationError::new(
                    source.path.clone(),
                    format!("Unknown table '{table}'"),
                ));
                Vec::new()
            }
        }
        SourceKind::Subquery(plan) => {
            let produced = exec::execute_row_plan(plan, ctx)?;
            ctx.bindings.insert(source.binding.clone(), None);
            produced
                .into_iter()
                .map(|row| {
                    let id = format!("subquery_{}", ctx.next_index());
                    Rc::new(DataRecord::new(id, ctx.now_ms, row.into_fields()))
                })
                .collect()
        }
    };

    Ok(rows)
}

/// Nested-loop join of the running row set against one more source.
/// Outer joins keep unmatched rows with the absent side simply unbound.
pub(crate) fn apply_join(
    rows: Vec<SelectRecord>,
    join: &JoinPlan,
    ctx: &mut QueryContext<'_>,
) -> Result<Vec<SelectRecord>, StoreError> {
    use crate::ast::JoinType;

    let right = resolve_source(&join.source, ctx)?;
    let binding = &join.source.binding;

    let mut out = Vec::new();
    let mut right_matched = vec![false; right.len()];

    for left in &rows {
        let mut matched = false;
        for (ri, right_record) in right.iter().enumerate() {
            let mut candidate = left.clone();
            candidate.insert(binding.clone(), Rc::clone(right_record));

            let mut keep = true;
            for on in &join.on {
                let test = eval(on, &candidate, ctx, None)?;
                if truth(&test, &on.path, ctx) != Some(true) {
                    keep = false;
                    break;
                }
            }
            if keep {
                out.push(candidate);
                matched = true;
                right_matched[ri] = true;
            }
        }

        if !matched && matches!(join.join_type, JoinType::Left | JoinType::Full) {
            out.push(left.clone());
        }
    }

    if matches!(join.join_type, JoinType::Right | JoinType::Full) {
        for (ri, right_record) in right.iter().enumerate() {
            if !right_matched[ri] {
                let mut only_right = SelectRecord::new();
                only_right.insert(binding.clone(), Rc::clone(right_record));
                out.push(only_right);
            }
        }
    }

    Ok(out)
}

/// Stable sort by evaluated keys; each key is evaluated once per row.
pub(crate) fn sort_records(
    rows: Vec<SelectRecord>,
    keys: &[SortKey],
    ctx: &mut QueryContext<'_>,
) -> Result<Vec<SelectRecord>, StoreError> {
    let mut keyed = Vec::with_capacity(rows.len());
    for row in rows {
        let mut row_keys = Vec::with_capacity(keys.len());
        for key in keys {
            row_keys.push(eval(&key.expr, &row, ctx, None)?);
        }
        keyed.push((row, row_keys));
    }

    keyed.sort_by(|(_, a), (_, b)| compare_sort_keys(keys, a, b));

    Ok(keyed.into_iter().map(|(row, _)| row).collect())
}
