use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

///
/// DataRecord
///
/// The row unit. `id`, `created`, and `updated` are implicit system columns
/// present on every record; `fields` holds the schema-declared columns with
/// lowercased keys.
///
/// Column reads check `fields` before the system columns so synthesized
/// rows (CTE and subquery sources) may project their own `id`.
///

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct DataRecord {
    pub id: String,
    pub created: i64,
    pub updated: i64,
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
}

impl DataRecord {
    #[must_use]
    pub fn new(id: impl Into<String>, now_ms: i64, fields: BTreeMap<String, Value>) -> Self {
        Self {
            id: id.into(),
            created: now_ms,
            updated: now_ms,
            fields,
        }
    }

    /// Read one column; `None` means the column does not exist at all,
    /// which callers report differently from an explicit null.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<Value> {
        if let Some(value) = self.fields.get(column) {
            return Some(value.clone());
        }

        match column {
            "id" => Some(Value::Text(self.id.clone())),
            "created" => Some(Value::from(self.created)),
            "updated" => Some(Value::from(self.updated)),
            _ => None,
        }
    }

    /// System columns overlaid with `fields`; the wildcard expansion source.
    #[must_use]
    pub fn merged(&self) -> BTreeMap<String, Value> {
        let mut merged = BTreeMap::new();
        merged.insert("id".to_string(), Value::Text(self.id.clone()));
        merged.insert("created".to_string(), Value::from(self.created));
        merged.insert("updated".to_string(), Value::from(self.updated));
        for (column, value) in &self.fields {
            merged.insert(column.clone(), value.clone());
        }

        merged
    }

    /// Merge a partial field update into this record, bumping `updated`.
    pub fn apply(&mut self, partial: &BTreeMap<String, Value>, now_ms: i64) {
        for (column, value) in partial {
            self.fields.insert(column.clone(), value.clone());
        }
        self.updated = now_ms;
    }
}

///
/// DataFile
///
/// The unit a store loads and saves: a table's rows plus the file-level
/// modification timestamp.
///

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct DataFile {
    pub updated: i64,
    #[serde(default)]
    pub data: Vec<DataRecord>,
}

///
/// TESTS
///
