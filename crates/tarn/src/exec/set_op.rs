//! UNION / INTERSECT / EXCEPT.
//!
//! Column correspondence is by order of projection, so rows are keyed on
//! their positional value tuple; the output keeps the left side's column
//! names. ALL retains duplicates, otherwise rows deduplicate structurally.

use crate::{
    context::QueryContext,
    exec::select::execute_select,
    plan::{SetOpKind, SetOpPlan},
    result::Row,
};
use std::collections::BTreeSet;
use tarn_core::error::StoreError;

pub(crate) fn execute_set_op(
    plan: &SetOpPlan,
    ctx: &mut QueryContext<'_>,
) -> Result<Vec<Row>, StoreError> {
    let left = execute_select(&plan.left, ctx)?;
    let right = execute_select(&plan.right, ctx)?;

    let rows = match plan.kind {
        SetOpKind::Union => {
            let mut rows = left;
            rows.extend(right);
            if plan.all {
                rows
            } else {
                dedup(rows)
            }
        }
        SetOpKind::Intersect => {
            let right_keys: BTreeSet<String> =
                right.iter().map(Row::positional_key).collect();
            let kept: Vec<Row> = left
                .into_iter()
                .filter(|row| right_keys.contains(&row.positional_key()))
                .collect();
            if plan.all { kept } else { dedup(kept) }
        }
        SetOpKind::Except => {
            let right_keys: BTreeSet<String> =
                right.iter().map(Row::positional_key).collect();
            let kept: Vec<Row> = left
                .into_iter()
                .filter(|row| !right_keys.contains(&row.positional_key()))
                .collect();
            if plan.all { kept } else { dedup(kept) }
        }
    };

    Ok(rows)
}

fn dedup(rows: Vec<Row>) -> Vec<Row> {
    let mut seen = BTreeSet::new();
    rows.into_iter()
        .filter(|row| seen.insert(row.positional_key()))
        .collect()
}
