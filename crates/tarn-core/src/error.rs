use serde::Serialize;
use thiserror::Error as ThisError;

///
/// ValidationError
///
/// One structured finding produced while evaluating a query. Findings are
/// data, not control flow: evaluation keeps going so a caller sees every
/// problem in a single pass. `path` is the dotted location of the offending
/// node inside the query AST (e.g. `query.where[1].left.args[0]`).
///

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationError {
    pub path: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            expected_type: None,
            actual_type: None,
            suggestion: None,
            metadata: None,
        }
    }

    #[must_use]
    pub fn with_types(mut self, expected: impl Into<String>, actual: impl Into<String>) -> Self {
        self.expected_type = Some(expected.into());
        self.actual_type = Some(actual.into());
        self
    }

    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

///
/// StoreError
///
/// Failures raised by an injected record store. These are infrastructure
/// errors and abort the query, unlike `ValidationError` findings.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum StoreError {
    #[error("store load failed for '{table}': {message}")]
    Load { table: String, message: String },

    #[error("store save failed for '{table}': {message}")]
    Save { table: String, message: String },
}

///
/// SchemaError
///
/// Invariant violations in a user-supplied schema, reported at build time.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum SchemaError {
    #[error("type '{type_name}' declares system column '{column}'")]
    SystemColumn { type_name: String, column: String },

    #[error("duplicate type definition '{type_name}'")]
    DuplicateType { type_name: String },

    #[error("type '{type_name}' declares duplicate field '{column}'")]
    DuplicateField { type_name: String, column: String },
}

///
/// EngineError
///
/// Errors surfaced at the engine boundary. Validation findings only become
/// an `EngineError` when the caller asks to commit a payload that failed
/// validation; version conflicts are detected by the commit gate.
///

#[derive(Debug, ThisError)]
pub enum EngineError {
    #[error("Cannot commit query with validation errors")]
    Validation { errors: Vec<ValidationError> },

    #[error("commit rejected: table contents changed since execution: {}", modified_tables.join(", "))]
    VersionConflict { modified_tables: Vec<String> },

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_serializes_camel_case_and_skips_absent_fields() {
        let err = ValidationError::new("query.values[1]", "type mismatch")
            .with_types("number", "string");
        let json = serde_json::to_value(&err).expect("serialize");

        assert_eq!(json["path"], "query.values[1]");
        assert_eq!(json["expectedType"], "number");
        assert_eq!(json["actualType"], "string");
        assert!(json.get("suggestion").is_none());
        assert!(json.get("metadata").is_none());
    }

    #[test]
    fn commit_refusal_message_is_stable() {
        let err = EngineError::Validation { errors: vec![] };
        assert_eq!(err.to_string(), "Cannot commit query with validation errors");
    }
}
