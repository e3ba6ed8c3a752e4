//! Post-execution integrity pass.
//!
//! Two phases over the staged table states, after the statement finishes
//! and before the payload is assembled. First, deleted ids resolve their
//! referential actions (restrict / cascade / setNull) through a worklist;
//! cascades grow the deleted set, so the worklist follows the closure
//! without recursion. Second, every inserted or updated record is checked
//! for required fields, enum membership, and foreign-key existence. The
//! pass records findings and never throws.

use crate::context::QueryContext;
use std::collections::BTreeSet;
use tarn_core::{
    error::{StoreError, ValidationError},
    schema::{FieldDef, OnDelete},
    value::Value,
};

pub(crate) fn run(ctx: &mut QueryContext<'_>) -> Result<(), StoreError> {
    resolve_cascades(ctx)?;
    validate_staged(ctx)?;

    Ok(())
}

// ─────────────────────────────────────────────────────────────
// Cascade resolution
// ─────────────────────────────────────────────────────────────

fn resolve_cascades(ctx: &mut QueryContext<'_>) -> Result<(), StoreError> {
    // The schema reference outlives the context borrow, so referencing
    // fields can be consulted while the loop mutates states.
    let schema = ctx.schema;

    let mut work: Vec<(String, String)> = ctx
        .table_states
        .iter()
        .flat_map(|(table, state)| {
            state
                .deleted
                .iter()
                .map(|id| (table.clone(), id.clone()))
                .collect::<Vec<_>>()
        })
        .collect();
    let mut processed: BTreeSet<(String, String)> = BTreeSet::new();

    while let Some((table, id)) = work.pop() {
        if !processed.insert((table.clone(), id.clone())) {
            continue;
        }

        for (referrer_def, field) in schema.referencing_fields(&table) {
            let source_table = &referrer_def.name;

            // The referencing table may not have been touched by the query.
            ctx.ensure_table(source_table)?;
            let referring: Vec<String> = ctx
                .state(source_table)
                .map(|state| {
                    state
                        .current
                        .iter()
                        .filter(|record| {
                            record.fields.get(&field.name)
                                == Some(&Value::Text(id.clone()))
                        })
                        .map(|record| record.id.clone())
                        .collect()
                })
                .unwrap_or_default();
            if referring.is_empty() {
                continue;
            }

            match field.on_delete {
                OnDelete::Restrict => {
                    for referrer in &referring {
                        ctx.record(
                            ValidationError::new(
                                "query",
                                format!(
                                    "Cannot delete '{id}' from '{table}': referenced by \
                                     '{source_table}.{}' on record '{referrer}'",
                                    field.name
                                ),
                            )
                            .with_metadata(serde_json::json!({
                                "table": table,
                                "referencedBy": source_table,
                                "field": field.name,
                            })),
                        );
                    }
                }
                OnDelete::Cascade => {
                    tracing::debug!(
                        from = %table,
                        to = %source_table,
                        count = referring.len(),
                        "cascade delete"
                    );
                    for referrer in referring {
                        if let Some(state) = ctx.state_mut(source_table) {
                            state.delete(&referrer);
                        }
                        work.push((source_table.clone(), referrer));
                    }
                }
                OnDelete::SetNull => {
                    if field.required {
                        ctx.record(ValidationError::new(
                            "query",
                            format!(
                                "Cannot delete '{id}' from '{table}': setNull would null \
                                 required field '{source_table}.{}'",
                                field.name
                            ),
                        ));
                        continue;
                    }
                    let now_ms = ctx.now_ms;
                    for referrer in referring {
                        if let Some(state) = ctx.state_mut(source_table) {
                            let mut partial = std::collections::BTreeMap::new();
                            partial.insert(field.name.clone(), Value::Null);
                            state.update(&referrer, partial, now_ms);
                        }
                    }
                }
            }
        }
    }

    Ok(())
}

// ─────────────────────────────────────────────────────────────
// Field and referential checks
// ─────────────────────────────────────────────────────────────

fn validate_staged(ctx: &mut QueryContext<'_>) -> Result<(), StoreError> {
    let staged: Vec<(String, String)> = ctx
        .table_states
        .iter()
        .flat_map(|(table, state)| {
            state
                .inserted
                .keys()
                .chain(state.updated.keys())
                .map(|id| (table.clone(), id.clone()))
                .collect::<Vec<_>>()
        })
        .collect();

    for (table, id) in staged {
        let Some(record) = ctx.state(&table).and_then(|state| state.find(&id)).cloned() else {
            continue;
        };
        let Some(def) = ctx.schema.get(&table).cloned() else {
            continue;
        };

        for field in &def.fields {
            let value = record.fields.get(&field.name).cloned().unwrap_or(Value::Null);

            if value.is_null() {
                if field.required {
                    ctx.record(ValidationError::new(
                        "query",
                        format!("Required field '{table}.{}' is null on record '{id}'", field.name),
                    ));
                }
                continue;
            }

            if !field.enum_options.is_empty() {
                let actual = value.display_string();
                if !field.enum_options.iter().any(|option| *option == actual) {
                    ctx.record(
                        ValidationError::new(
                            "query",
                            format!(
                                "Value '{actual}' is not a valid option for '{table}.{}'",
                                field.name
                            ),
                        )
                        .with_suggestion(format!("Use one of: {}", field.enum_options.join(", "))),
                    );
                }
                continue;
            }

            if let Some(target) = field.ty.reference() {
                let target = target.to_string();
                check_reference(ctx, &table, &id, field, &value, &target)?;
            }
        }
    }

    Ok(())
}

// Foreign keys must be string ids that exist in the target table's current
// set, cascades already applied.
fn check_reference(
    ctx: &mut QueryContext<'_>,
    table: &str,
    id: &str,
    field: &FieldDef,
    value: &Value,
    target: &str,
) -> Result<(), StoreError> {
    let Value::Text(fk) = value else {
        ctx.record(
            ValidationError::new(
                "query",
                format!(
                    "Foreign key '{table}.{}' on record '{id}' must be a string id",
                    field.name
                ),
            )
            .with_types("string".to_string(), value.kind().to_string()),
        );
        return Ok(());
    };

    ctx.ensure_table(target)?;
    let exists = ctx
        .state(target)
        .is_some_and(|state| state.find(fk).is_some());
    if !exists {
        ctx.record(
            ValidationError::new(
                "query",
                format!(
                    "Foreign key '{table}.{}' references missing id '{fk}' in '{target}'",
                    field.name
                ),
            )
            .with_metadata(serde_json::json!({ "table": target, "id": fk })),
        );
    }

    Ok(())
}
