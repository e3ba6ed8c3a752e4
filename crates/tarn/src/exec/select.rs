//! The SELECT pipeline.
//!
//! Stage order is fixed: FROM, JOINs, WHERE, projection (with grouping and
//! the ungrouped-aggregate collapse), HAVING, DISTINCT, ORDER BY over the
//! projected rows, then OFFSET and LIMIT.

use crate::{
    context::{QueryContext, SelectRecord, TEMP_SOURCE},
    exec::source::{apply_join, resolve_source},
    expr::{Expr, compare_sort_keys, contains_aggregate, eval, truth},
    plan::{ProjectionItem, SelectPlan},
    result::Row,
};
use std::{
    collections::{BTreeMap, BTreeSet},
    rc::Rc,
};
use tarn_core::{error::StoreError, record::DataRecord, value::Value};

pub(crate) fn execute_select(
    plan: &SelectPlan,
    ctx: &mut QueryContext<'_>,
) -> Result<Vec<Row>, StoreError> {
    // FROM: one select-record per source row; no FROM means one empty row.
    let mut records: Vec<SelectRecord> = match &plan.from {
        Some(from) => {
            let binding = from.binding.clone();
            resolve_source(from, ctx)?
                .into_iter()
                .map(|record| {
                    let mut select_record = SelectRecord::new();
                    select_record.insert(binding.clone(), record);
                    select_record
                })
                .collect()
        }
        None => vec![SelectRecord::new()],
    };

    for join in &plan.joins {
        records = apply_join(records, join, ctx)?;
    }

    records = filter_records(records, &plan.filters, ctx)?;

    // Projection, with grouping or the ungrouped-aggregate collapse.
    let mut rows = if plan.group_by.is_empty() {
        let aggregating = plan.values.iter().any(|item| contains_aggregate(&item.expr));
        if aggregating {
            // Exactly one row, even over an empty filtered set.
            let witness = records.first().cloned().unwrap_or_default();
            vec![project(&plan.values, &witness, ctx, Some(&records))?]
        } else {
            let all = records.clone();
            let mut rows = Vec::with_capacity(records.len());
            for record in &records {
                rows.push(project(&plan.values, record, ctx, Some(&all))?);
            }
            rows
        }
    } else {
        project_groups(plan, records, ctx)?
    };

    if plan.distinct {
        rows = distinct(rows);
    }

    if !plan.order_by.is_empty() {
        rows = order_rows(rows, plan, ctx)?;
    }

    if let Some(offset) = plan.offset {
        rows = rows.into_iter().skip(offset).collect();
    }
    if let Some(limit) = plan.limit {
        rows.truncate(limit);
    }

    Ok(rows)
}

/// Retain the rows where every predicate is literally true.
pub(crate) fn filter_records(
    records: Vec<SelectRecord>,
    filters: &[Expr],
    ctx: &mut QueryContext<'_>,
) -> Result<Vec<SelectRecord>, StoreError> {
    if filters.is_empty() {
        return Ok(records);
    }

    let mut kept = Vec::with_capacity(records.len());
    'records: for record in records {
        for filter in filters {
            let test = eval(filter, &record, ctx, None)?;
            if truth(&test, &filter.path, ctx) != Some(true) {
                continue 'records;
            }
        }
        kept.push(record);
    }

    Ok(kept)
}

/// Project one output row. Wildcard values splice their columns into the
/// row directly; collisions are last-writer-wins.
pub(crate) fn project(
    items: &[ProjectionItem],
    record: &SelectRecord,
    ctx: &mut QueryContext<'_>,
    group: Option<&[SelectRecord]>,
) -> Result<Row, StoreError> {
    let mut row = Row::new();
    for item in items {
        let value = eval(&item.expr, record, ctx, group)?;
        match value {
            Value::Record(columns) if item.expr.is_wildcard() => {
                for (column, value) in columns {
                    row.set(column, value);
                }
            }
            value => row.set(item.alias.clone(), value),
        }
    }

    Ok(row)
}

// GROUP BY: rows bucket by the JSON form of their group-key tuple, in
// first-seen order; the group's first record is the scalar witness.
fn project_groups(
    plan: &SelectPlan,
    records: Vec<SelectRecord>,
    ctx: &mut QueryContext<'_>,
) -> Result<Vec<Row>, StoreError> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: BTreeMap<String, Vec<SelectRecord>> = BTreeMap::new();

    for record in records {
        let mut key_values = Vec::with_capacity(plan.group_by.len());
        for expr in &plan.group_by {
            key_values.push(eval(expr, &record, ctx, None)?);
        }
        let key = serde_json::to_string(&key_values).unwrap_or_default();

        if let Some(bucket) = groups.get_mut(&key) {
            bucket.push(record);
        } else {
            order.push(key.clone());
            groups.insert(key, vec![record]);
        }
    }

    let mut rows = Vec::with_capacity(order.len());
    'groups: for key in order {
        let group = groups.remove(&key).unwrap_or_default();
        let witness = group.first().cloned().unwrap_or_default();

        for having in &plan.having {
            let test = eval(having, &witness, ctx, Some(&group))?;
            if truth(&test, &having.path, ctx) != Some(true) {
                continue 'groups;
            }
        }

        rows.push(project(&plan.values, &witness, ctx, Some(&group))?);
    }

    Ok(rows)
}

// DISTINCT: structural equality over the projected row, first wins.
fn distinct(rows: Vec<Row>) -> Vec<Row> {
    let mut seen = BTreeSet::new();
    rows.into_iter()
        .filter(|row| seen.insert(row.structural_key()))
        .collect()
}

// ORDER BY runs against the projected rows, each wrapped as the sole
// record of a synthesized source so column references resolve by output
// column name.
fn order_rows(
    rows: Vec<Row>,
    plan: &SelectPlan,
    ctx: &mut QueryContext<'_>,
) -> Result<Vec<Row>, StoreError> {
    let mut keyed = Vec::with_capacity(rows.len());
    for row in rows {
        let record = Rc::new(DataRecord::new(
            format!("{TEMP_SOURCE}{}", ctx.next_index()),
            ctx.now_ms,
            row.clone().into_fields(),
        ));
        let mut select_record = SelectRecord::new();
        select_record.insert(TEMP_SOURCE.to_string(), record);

        let mut keys = Vec::with_capacity(plan.order_by.len());
        for key in &plan.order_by {
            keys.push(eval(&key.expr, &select_record, ctx, None)?);
        }
        keyed.push((row, keys));
    }

    keyed.sort_by(|(_, a), (_, b)| compare_sort_keys(&plan.order_by, a, b));

    Ok(keyed.into_iter().map(|(row, _)| row).collect())
}
