//! Result and delta shapes returned to callers.
//!
//! These types are the external contract: key names (`rows`,
//! `affectedCount`, `validationErrors`, `canCommit`, `tempId`, …) and the
//! nested `{type, ids}` mutation summaries serialize exactly as consumers
//! expect them.

use serde::{Serialize, Serializer, ser::SerializeMap};
use std::collections::BTreeMap;
use tarn_core::{error::ValidationError, value::Value};

///
/// Row
///
/// One projected output row. Column order is projection order, which set
/// operations and serialization depend on; `set` replaces an existing
/// column's value in place (last writer wins, first position kept).
///

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Row {
    columns: Vec<(String, Value)>,
}

impl Row {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            columns: Vec::new(),
        }
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        if let Some(slot) = self.columns.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = value;
        } else {
            self.columns.push((name, value));
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// First projected column; scalar subqueries read this.
    #[must_use]
    pub fn first(&self) -> Option<&Value> {
        self.columns.first().map(|(_, v)| v)
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.columns.iter().map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, Value)> {
        self.columns.iter()
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Column map for synthesizing a record from this row.
    #[must_use]
    pub fn into_fields(self) -> BTreeMap<String, Value> {
        self.columns.into_iter().collect()
    }

    /// Structural identity including column names; DISTINCT and recursive
    /// CTE dedup key on this.
    #[must_use]
    pub fn structural_key(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Positional identity ignoring column names; set operations key on
    /// this because column correspondence is by order of projection.
    #[must_use]
    pub fn positional_key(&self) -> String {
        let values: Vec<&Value> = self.values().collect();
        serde_json::to_string(&values).unwrap_or_default()
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (name, value) in &self.columns {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

///
/// MutationSummary
///
/// `{type, ids}`: one table's share of a mutation result.
///

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MutationSummary {
    #[serde(rename = "type")]
    pub table: String,
    pub ids: Vec<String>,
}

///
/// QueryResult
///

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub rows: Vec<Row>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affected_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inserted: Option<Vec<MutationSummary>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated: Option<Vec<MutationSummary>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted: Option<Vec<MutationSummary>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub validation_errors: Vec<ValidationError>,
    pub can_commit: bool,
}

///
/// TableDelta
///
/// A table's staged mutations plus the snapshot version they were computed
/// against. The commit gate refuses the delta when the live version moved.
///

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableDelta {
    pub table_name: String,
    pub version: u64,
    pub inserts: Vec<InsertDelta>,
    pub updates: Vec<UpdateDelta>,
    pub deletes: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertDelta {
    pub temp_id: String,
    pub fields: BTreeMap<String, Value>,
}

#[derive(Clone, Debug, Serialize)]
pub struct UpdateDelta {
    pub id: String,
    pub fields: BTreeMap<String, Value>,
}

///
/// QueryExecutionPayload
///

#[derive(Clone, Debug, Serialize)]
pub struct QueryExecutionPayload {
    pub result: QueryResult,
    pub deltas: Vec<TableDelta>,
}

///
/// CommitCheck
///
/// Outcome of the pre-commit verification pass.
///

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitCheck {
    pub can_commit: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub modified_tables: Vec<String>,
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_replaces_in_place_keeping_first_position() {
        let mut row = Row::new();
        row.set("a", Value::from(1));
        row.set("b", Value::from(2));
        row.set("a", Value::from(3));

        let names: Vec<&str> = row.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(row.get("a"), Some(&Value::from(3)));
    }

    #[test]
    fn serialization_preserves_projection_order() {
        let mut row = Row::new();
        row.set("zeta", Value::from(1));
        row.set("alpha", Value::from(2));

        let json = serde_json::to_string(&row).expect("serialize");
        assert_eq!(json, "{\"zeta\":1,\"alpha\":2}");
    }

    #[test]
    fn positional_key_ignores_names_structural_key_does_not() {
        let mut left = Row::new();
        left.set("a", Value::from(1));
        let mut right = Row::new();
        right.set("b", Value::from(1));

        assert_eq!(left.positional_key(), right.positional_key());
        assert_ne!(left.structural_key(), right.structural_key());
    }

    #[test]
    fn result_serializes_contract_key_names() {
        let result = QueryResult {
            rows: vec![],
            affected_count: Some(1),
            inserted: None,
            updated: None,
            deleted: Some(vec![MutationSummary {
                table: "transaction".to_string(),
                ids: vec!["1".to_string()],
            }]),
            validation_errors: vec![],
            can_commit: true,
        };

        let json = serde_json::to_value(&result).expect("serialize");
        assert_eq!(json["affectedCount"], 1);
        assert_eq!(json["canCommit"], true);
        assert_eq!(json["deleted"][0]["type"], "transaction");
        assert!(json.get("validationErrors").is_none());
        assert!(json.get("inserted").is_none());
    }
}
