//! Per-table transactional staging.
//!
//! A `TableState` is the overlay a query works against: the snapshot taken
//! at first touch, the live `current` view with staged mutations applied,
//! and the pending insert/update/delete books. Nothing here reaches a
//! store; the commit gate turns the books into durable writes.

use crate::result::{InsertDelta, TableDelta, UpdateDelta};
use std::{
    collections::{BTreeMap, BTreeSet},
    rc::Rc,
};
use tarn_core::{hash::version_hash, record::DataRecord, value::Value};

///
/// TableState
///
/// Invariants, maintained by the staging methods:
/// - ids in `deleted` are absent from `current`
/// - ids in `inserted` appear in `current` with `created == updated`
/// - ids in `updated` appear in `current` and are not in `deleted`
///

#[derive(Clone, Debug)]
pub(crate) struct TableState {
    pub table: String,
    pub original: Vec<Rc<DataRecord>>,
    pub current: Vec<Rc<DataRecord>>,
    pub deleted: BTreeSet<String>,
    pub updated: BTreeMap<String, BTreeMap<String, Value>>,
    pub inserted: BTreeMap<String, BTreeMap<String, Value>>,
    pub version: u64,
}

impl TableState {
    /// Snapshot a table at first touch; the version is computed once here.
    #[must_use]
    pub fn load(table: impl Into<String>, records: Vec<DataRecord>) -> Self {
        let version = version_hash(&records);
        let original: Vec<Rc<DataRecord>> = records.into_iter().map(Rc::new).collect();

        Self {
            table: table.into(),
            current: original.clone(),
            original,
            deleted: BTreeSet::new(),
            updated: BTreeMap::new(),
            inserted: BTreeMap::new(),
            version,
        }
    }

    #[must_use]
    pub fn find(&self, id: &str) -> Option<&Rc<DataRecord>> {
        self.current.iter().find(|record| record.id == id)
    }

    /// Stage an insert; the id is the caller-generated temp id.
    pub fn insert(&mut self, id: impl Into<String>, fields: BTreeMap<String, Value>, now_ms: i64) {
        let id = id.into();
        self.deleted.remove(&id);
        self.current
            .push(Rc::new(DataRecord::new(id.clone(), now_ms, fields.clone())));
        self.inserted.insert(id, fields);
    }

    /// Stage a partial update; merges into a pending insert when the row is
    /// not yet durable.
    pub fn update(&mut self, id: &str, partial: BTreeMap<String, Value>, now_ms: i64) {
        let Some(index) = self.current.iter().position(|record| record.id == id) else {
            return;
        };

        let mut record = (*self.current[index]).clone();
        record.apply(&partial, now_ms);

        if let Some(pending) = self.inserted.get_mut(id) {
            // Still an insert: fold the change in and keep created == updated.
            record.updated = record.created;
            pending.extend(partial);
        } else {
            self.updated.entry(id.to_string()).or_default().extend(partial);
        }

        self.current[index] = Rc::new(record);
    }

    /// Stage a delete; a pending insert is simply discarded.
    pub fn delete(&mut self, id: &str) {
        self.current.retain(|record| record.id != id);

        if self.inserted.remove(id).is_none() {
            self.updated.remove(id);
            self.deleted.insert(id.to_string());
        }
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        !self.inserted.is_empty() || !self.updated.is_empty() || !self.deleted.is_empty()
    }

    #[must_use]
    pub fn delta(&self) -> TableDelta {
        TableDelta {
            table_name: self.table.clone(),
            version: self.version,
            inserts: self
                .inserted
                .iter()
                .map(|(temp_id, fields)| InsertDelta {
                    temp_id: temp_id.clone(),
                    fields: fields.clone(),
                })
                .collect(),
            updates: self
                .updated
                .iter()
                .map(|(id, fields)| UpdateDelta {
                    id: id.clone(),
                    fields: fields.clone(),
                })
                .collect(),
            deletes: self.deleted.iter().cloned().collect(),
        }
    }
}

///
/// TESTS
///
