//! The commit gate.
//!
//! The only code that writes to stores. A payload commits in three steps:
//! refuse when execution collected validation errors, reload every touched
//! table and compare snapshot versions, then apply each delta inside its
//! table's atomic `save` scope: deletes, then updates, then inserts.

use crate::result::{CommitCheck, QueryExecutionPayload};
use tarn_core::{
    error::EngineError,
    hash::version_hash,
    record::DataRecord,
    store::{Store, StoreProvider},
};

/// Verify a payload against the live stores without writing.
pub(crate) fn check<P: StoreProvider>(
    provider: &P,
    payload: &QueryExecutionPayload,
) -> Result<CommitCheck, EngineError> {
    if !payload.result.can_commit {
        return Ok(CommitCheck {
            can_commit: false,
            reason: Some("query has validation errors".to_string()),
            modified_tables: Vec::new(),
        });
    }

    let mut modified = Vec::new();
    for delta in &payload.deltas {
        let store = provider.store(&delta.table_name);
        store.load()?;
        let rows = store.get_all()?;
        if version_hash(&rows) != delta.version {
            modified.push(delta.table_name.clone());
        }
    }

    if modified.is_empty() {
        Ok(CommitCheck {
            can_commit: true,
            reason: None,
            modified_tables: Vec::new(),
        })
    } else {
        Ok(CommitCheck {
            can_commit: false,
            reason: Some("table contents changed since execution".to_string()),
            modified_tables: modified,
        })
    }
}

/// Verify and apply. Refusals surface as errors; nothing is written unless
/// every delta passes the version check.
pub(crate) fn apply<P: StoreProvider>(
    provider: &P,
    payload: &QueryExecutionPayload,
    now_ms: i64,
) -> Result<(), EngineError> {
    let check = check(provider, payload)?;
    if !check.can_commit {
        if !payload.result.can_commit {
            return Err(EngineError::Validation {
                errors: payload.result.validation_errors.clone(),
            });
        }
        return Err(EngineError::VersionConflict {
            modified_tables: check.modified_tables,
        });
    }

    for delta in &payload.deltas {
        let store = provider.store(&delta.table_name);
        store.save(&mut |file| {
            file.data.retain(|record| !delta.deletes.contains(&record.id));

            for update in &delta.updates {
                if let Some(record) = file.data.iter_mut().find(|r| r.id == update.id) {
                    record.apply(&update.fields, now_ms);
                }
            }

            for insert in &delta.inserts {
                file.data.push(DataRecord::new(
                    insert.temp_id.clone(),
                    now_ms,
                    insert.fields.clone(),
                ));
            }

            file.updated = now_ms;
        })?;

        tracing::debug!(
            table = %delta.table_name,
            inserts = delta.inserts.len(),
            updates = delta.updates.len(),
            deletes = delta.deletes.len(),
            "delta applied"
        );
    }

    Ok(())
}
