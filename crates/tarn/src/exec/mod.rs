//! Statement executors.
//!
//! Execution is staged: statements mutate `TableState` overlays through the
//! context, never a store. The result of `execute_plan` is the statement's
//! rows plus the affected-row count for mutations; deltas and summaries are
//! assembled by the engine afterwards.

mod delete;
mod insert;
mod select;
mod set_op;
mod source;
mod update;
mod with;

#[cfg(test)]
mod tests;

pub(crate) use source::sort_records;

use crate::{
    context::QueryContext,
    plan::{QueryPlan, RowPlan, StatementPlan},
    result::Row,
};
use tarn_core::error::StoreError;

///
/// StatementOutcome
///

pub(crate) struct StatementOutcome {
    pub rows: Vec<Row>,
    pub affected: Option<usize>,
}

/// Run a full query plan: preload every referenced table, bind the CTEs,
/// then execute the statement.
pub(crate) fn execute_plan(
    plan: &QueryPlan,
    ctx: &mut QueryContext<'_>,
) -> Result<StatementOutcome, StoreError> {
    for table in plan.referenced_tables() {
        // Unknown names surface when the statement resolves its sources.
        ctx.ensure_table(&table)?;
    }

    with::execute_ctes(&plan.ctes, ctx)?;

    match &plan.statement {
        StatementPlan::Select(select) => Ok(StatementOutcome {
            rows: select::execute_select(select, ctx)?,
            affected: None,
        }),
        StatementPlan::SetOp(op) => Ok(StatementOutcome {
            rows: set_op::execute_set_op(op, ctx)?,
            affected: None,
        }),
        StatementPlan::Insert(insert) => {
            let (rows, affected) = insert::execute_insert(insert, ctx)?;
            Ok(StatementOutcome {
                rows,
                affected: Some(affected),
            })
        }
        StatementPlan::Update(update) => {
            let (rows, affected) = update::execute_update(update, ctx)?;
            Ok(StatementOutcome {
                rows,
                affected: Some(affected),
            })
        }
        StatementPlan::Delete(delete) => {
            let (rows, affected) = delete::execute_delete(delete, ctx)?;
            Ok(StatementOutcome {
                rows,
                affected: Some(affected),
            })
        }
    }
}

/// Run a row-producing plan (subqueries, CTE bodies, INSERT … SELECT).
pub(crate) fn execute_row_plan(
    plan: &RowPlan,
    ctx: &mut QueryContext<'_>,
) -> Result<Vec<Row>, StoreError> {
    match plan {
        RowPlan::Select(select) => select::execute_select(select, ctx),
        RowPlan::SetOp(op) => set_op::execute_set_op(op, ctx),
    }
}
