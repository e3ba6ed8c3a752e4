//! INSERT execution.
//!
//! Rows come from an inline values row or a row-producing select, zipped to
//! the column list by position. Every cell is validated against its schema
//! field; failures are recorded and staging continues so all problems
//! surface in one pass. ON CONFLICT turns an insert into a no-op or an
//! update of the conflicting row.

use crate::{
    context::{QueryContext, SelectRecord},
    exec::{self, select::project},
    expr::eval,
    plan::{InsertPlan, SetItemPlan},
    result::Row,
};
use std::{cmp::Ordering, collections::BTreeMap, rc::Rc};
use tarn_core::{
    error::{StoreError, ValidationError},
    record::DataRecord,
    schema::FieldDef,
    value::{AssignIssue, Value},
};
use ulid::Ulid;

pub(crate) fn execute_insert(
    plan: &InsertPlan,
    ctx: &mut QueryContext<'_>,
) -> Result<(Vec<Row>, usize), StoreError> {
    if !ctx.ensure_table(&plan.table)? {
        ctx.record(ValidationError::new(
            plan.path.clone(),
            format!("Unknown table '{}'", plan.table),
        ));
        return Ok((Vec::new(), 0));
    }
    ctx.bindings
        .insert(plan.binding.clone(), Some(plan.table.clone()));

    // Resolve the column list once; unknown columns are reported but the
    // remaining cells still validate.
    let columns: Vec<(String, Option<FieldDef>)> = plan
        .columns
        .iter()
        .enumerate()
        .map(|(i, column)| {
            let field = ctx.schema.field(&plan.table, column).cloned();
            if field.is_none() {
                ctx.record(ValidationError::new(
                    format!("{}.columns[{i}]", plan.path),
                    format!("Unknown column '{column}' on table '{}'", plan.table),
                ));
            }
            (column.clone(), field)
        })
        .collect();

    let pending = build_rows(plan, &columns, ctx)?;

    let mut returning_rows = Vec::new();
    let mut affected = 0;
    let now_ms = ctx.now_ms;

    for fields in pending {
        if let Some(conflict) = &plan.on_conflict
            && let Some(existing) = find_conflict(plan, &conflict.columns, &fields, ctx)
        {
            if conflict.do_nothing {
                continue;
            }

            let partial = conflict_update(plan, &conflict.update, &existing, ctx)?;
            let id = existing.id.clone();
            if let Some(state) = ctx.state_mut(&plan.table) {
                state.update(&id, partial, now_ms);
            }
            affected += 1;
            push_returning(plan, &id, ctx, &mut returning_rows)?;
            continue;
        }

        let temp_id = Ulid::new().to_string();
        if let Some(state) = ctx.state_mut(&plan.table) {
            state.insert(temp_id.clone(), fields, now_ms);
        }
        affected += 1;
        push_returning(plan, &temp_id, ctx, &mut returning_rows)?;
    }

    tracing::debug!(table = %plan.table, affected, "insert staged");
    Ok((returning_rows, affected))
}

// Produce the field maps to stage, from VALUES or from INSERT … SELECT.
fn build_rows(
    plan: &InsertPlan,
    columns: &[(String, Option<FieldDef>)],
    ctx: &mut QueryContext<'_>,
) -> Result<Vec<BTreeMap<String, Value>>, StoreError> {
    let mut pending = Vec::new();

    if let Some(values) = &plan.values {
        if values.len() != columns.len() {
            ctx.record(ValidationError::new(
                plan.path.clone(),
                format!(
                    "Column count ({}) does not match value count ({})",
                    columns.len(),
                    values.len()
                ),
            ));
            return Ok(pending);
        }

        let empty = SelectRecord::new();
        let mut fields = BTreeMap::new();
        for ((column, field), expr) in columns.iter().zip(values) {
            let value = eval(expr, &empty, ctx, None)?;
            if let Some(field) = field {
                check_assignable(&value, field, &plan.table, &expr.path, ctx);
            }
            fields.insert(column.clone(), value);
        }
        pending.push(fields);
    } else if let Some(select) = &plan.select {
        let rows = exec::execute_row_plan(select, ctx)?;
        let select_path = format!("{}.select", plan.path);

        for row in rows {
            if row.len() > columns.len() {
                ctx.record(ValidationError::new(
                    select_path.clone(),
                    format!(
                        "Select produces {} columns but only {} target column(s) are named",
                        row.len(),
                        columns.len()
                    ),
                ));
                continue;
            }

            let mut fields = BTreeMap::new();
            for ((column, field), value) in columns.iter().zip(row.values()) {
                if let Some(field) = field {
                    check_assignable(value, field, &plan.table, &select_path, ctx);
                }
                fields.insert(column.clone(), value.clone());
            }
            pending.push(fields);
        }
    } else {
        ctx.record(ValidationError::new(
            plan.path.clone(),
            "INSERT requires either values or a select",
        ));
    }

    Ok(pending)
}

// Locate a current row whose conflict-key columns all equal the incoming
// row's values.
fn find_conflict(
    plan: &InsertPlan,
    columns: &[String],
    fields: &BTreeMap<String, Value>,
    ctx: &QueryContext<'_>,
) -> Option<Rc<DataRecord>> {
    let state = ctx.state(&plan.table)?;

    state
        .current
        .iter()
        .find(|record| {
            columns.iter().all(|column| {
                let incoming = fields.get(column).cloned().unwrap_or(Value::Null);
                let existing = record.get(column).unwrap_or(Value::Null);
                incoming.compare(&existing) == Ordering::Equal
            })
        })
        .map(Rc::clone)
}

// Evaluate the DO UPDATE set list against the conflicting row.
fn conflict_update(
    plan: &InsertPlan,
    set: &[SetItemPlan],
    existing: &Rc<DataRecord>,
    ctx: &mut QueryContext<'_>,
) -> Result<BTreeMap<String, Value>, StoreError> {
    let mut record = SelectRecord::new();
    record.insert(plan.binding.clone(), Rc::clone(existing));

    let mut partial = BTreeMap::new();
    for item in set {
        let value = eval(&item.expr, &record, ctx, None)?;
        match ctx.schema.field(&plan.table, &item.column).cloned() {
            Some(field) => check_assignable(&value, &field, &plan.table, &item.expr.path, ctx),
            None => ctx.record(ValidationError::new(
                item.path.clone(),
                format!("Unknown column '{}' on table '{}'", item.column, plan.table),
            )),
        }
        partial.insert(item.column.clone(), value);
    }

    Ok(partial)
}

fn push_returning(
    plan: &InsertPlan,
    id: &str,
    ctx: &mut QueryContext<'_>,
    rows: &mut Vec<Row>,
) -> Result<(), StoreError> {
    if plan.returning.is_empty() {
        return Ok(());
    }
    let Some(record) = ctx.state(&plan.table).and_then(|state| state.find(id)).cloned() else {
        return Ok(());
    };

    let mut select_record = SelectRecord::new();
    select_record.insert(plan.binding.clone(), record);
    rows.push(project(&plan.returning, &select_record, ctx, None)?);

    Ok(())
}

/// Record an assignability finding against the offending AST path.
pub(crate) fn check_assignable(
    value: &Value,
    field: &FieldDef,
    table: &str,
    path: &str,
    ctx: &mut QueryContext<'_>,
) {
    match value.assignable_to(field) {
        Ok(()) => {}
        Err(AssignIssue::RequiredNull) => {
            ctx.record(ValidationError::new(
                path.to_string(),
                format!("Required field '{table}.{}' cannot be null", field.name),
            ));
        }
        Err(AssignIssue::NotInEnum { actual, options }) => {
            ctx.record(
                ValidationError::new(
                    path.to_string(),
                    format!(
                        "Value '{actual}' is not a valid option for '{table}.{}'",
                        field.name
                    ),
                )
                .with_suggestion(format!("Use one of: {}", options.join(", "))),
            );
        }
        Err(AssignIssue::TypeMismatch { expected, actual }) => {
            ctx.record(
                ValidationError::new(
                    path.to_string(),
                    format!(
                        "Type mismatch for '{table}.{}': expected {expected}, got {actual}",
                        field.name
                    ),
                )
                .with_types(expected, actual),
            );
        }
    }
}
