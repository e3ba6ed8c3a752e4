//! INSERT / UPDATE / DELETE scenarios, including alias resolution, cell
//! validation, and ON CONFLICT handling.

use crate::test_fixtures::{engine, field, record, required, run, type_def};
use serde_json::json;
use tarn_core::value::Value;

fn transaction_engine() -> (
    crate::engine::Engine<tarn_core::store::MemoryStoreProvider>,
    tarn_core::store::MemoryStoreProvider,
) {
    engine(
        vec![type_def(
            "transaction",
            vec![
                required("accountid", "string"),
                field("description", "string"),
            ],
        )],
        vec![(
            "transaction",
            vec![
                record(
                    "1",
                    &[
                        ("accountid", Value::from("acc123")),
                        ("description", Value::from("coffee")),
                    ],
                ),
                record(
                    "2",
                    &[
                        ("accountid", Value::from("acc456")),
                        ("description", Value::from("tea")),
                    ],
                ),
            ],
        )],
    )
}

#[test]
fn delete_with_alias_mismatch_touches_nothing_and_names_the_bound_source() {
    // DELETE FROM transaction AS t WHERE transaction.accountid = '...'
    // RETURNING transaction.*: the filter references the unbound table
    // name, so no row matches and the mistake is reported on the where path.
    let (engine, provider) = transaction_engine();
    let payload = run(
        &engine,
        json!({
            "kind": "delete",
            "table": "transaction",
            "as": "t",
            "where": [{"kind": "comparison",
                "left": {"source": "transaction", "column": "accountid"},
                "cmp": "=",
                "right": "OPENROUTER_API_KEY"}],
            "returning": [{"alias": "*", "value": {"source": "transaction", "column": "*"}}]
        }),
    );

    assert_eq!(payload.result.affected_count, Some(0));
    assert!(payload.result.rows.is_empty());
    assert!(payload.result.deleted.is_none());

    let source_errors: Vec<_> = payload
        .result
        .validation_errors
        .iter()
        .filter(|e| e.message.starts_with("Source 'transaction' not found"))
        .collect();
    assert!(!source_errors.is_empty(), "expected a source-not-found error");
    assert!(
        source_errors
            .iter()
            .any(|e| e.message.contains("available sources: t")),
        "the error names the bound source"
    );
    assert!(
        source_errors.iter().any(|e| e.path.contains("where")),
        "one source error must sit on a where path"
    );

    // Nothing staged, nothing durable.
    assert!(payload.deltas.is_empty());
    assert_eq!(provider.snapshot("transaction").data.len(), 2);
}

#[test]
fn delete_with_alias_bound_filter_removes_the_row() {
    let (engine, provider) = transaction_engine();
    let payload = run(
        &engine,
        json!({
            "kind": "delete",
            "table": "transaction",
            "as": "t",
            "where": [{"kind": "comparison",
                "left": {"source": "t", "column": "accountid"},
                "cmp": "=",
                "right": "acc123"}],
            "returning": [{"alias": "*", "value": {"source": "t", "column": "*"}}]
        }),
    );

    assert_eq!(payload.result.affected_count, Some(1));
    assert_eq!(payload.result.rows.len(), 1);
    assert_eq!(
        payload.result.rows[0].get("accountid"),
        Some(&Value::from("acc123"))
    );
    let deleted = payload.result.deleted.as_ref().expect("deleted summary");
    assert_eq!(deleted.len(), 1);
    assert_eq!(deleted[0].table, "transaction");
    assert_eq!(deleted[0].ids, vec!["1".to_string()]);

    engine.commit(&payload).expect("commit");
    let remaining = provider.snapshot("transaction");
    assert_eq!(remaining.data.len(), 1);
    assert_eq!(remaining.data[0].id, "2");
}

#[test]
fn insert_type_mismatches_report_cell_paths_and_block_commit() {
    // INSERT INTO users (name, age, active) VALUES ('Alice', 'twenty-five', 1)
    let (engine, provider) = engine(
        vec![type_def(
            "users",
            vec![
                required("name", "string"),
                required("age", "number"),
                required("active", "boolean"),
            ],
        )],
        vec![],
    );
    let payload = run(
        &engine,
        json!({
            "kind": "insert",
            "table": "users",
            "columns": ["name", "age", "active"],
            "values": ["Alice", "twenty-five", 1]
        }),
    );

    assert!(!payload.result.can_commit);
    let errors = &payload.result.validation_errors;

    let age = errors
        .iter()
        .find(|e| e.path.contains("values[1]"))
        .expect("age cell error");
    assert_eq!(age.expected_type.as_deref(), Some("number"));
    assert_eq!(age.actual_type.as_deref(), Some("string"));

    let active = errors
        .iter()
        .find(|e| e.path.contains("values[2]"))
        .expect("active cell error");
    assert_eq!(active.expected_type.as_deref(), Some("boolean"));
    assert_eq!(active.actual_type.as_deref(), Some("number"));

    let err = engine.commit(&payload).expect_err("commit must refuse");
    assert_eq!(err.to_string(), "Cannot commit query with validation errors");
    assert!(provider.snapshot("users").data.is_empty(), "store untouched");
}

#[test]
fn insert_on_conflict_updates_the_existing_row() {
    // users(email, login_count) with (alice@x, 5); inserting (alice@x, 10)
    // with ON CONFLICT (email) DO UPDATE SET login_count = 10.
    let (engine, provider) = engine(
        vec![type_def(
            "users",
            vec![required("email", "string"), field("login_count", "number")],
        )],
        vec![(
            "users",
            vec![record(
                "u1",
                &[
                    ("email", Value::from("alice@x")),
                    ("login_count", Value::from(5)),
                ],
            )],
        )],
    );

    let payload = run(
        &engine,
        json!({
            "kind": "insert",
            "table": "users",
            "columns": ["email", "login_count"],
            "values": ["alice@x", 10],
            "onConflict": {
                "columns": ["email"],
                "update": [{"column": "login_count", "value": 10}]
            }
        }),
    );

    assert_eq!(payload.result.affected_count, Some(1));
    assert!(payload.result.inserted.is_none(), "no new row staged");
    let updated = payload.result.updated.as_ref().expect("updated summary");
    assert_eq!(updated[0].ids, vec!["u1".to_string()]);
    assert_eq!(payload.deltas.len(), 1);
    assert!(payload.deltas[0].inserts.is_empty());

    engine.commit(&payload).expect("commit");
    let file = provider.snapshot("users");
    assert_eq!(file.data.len(), 1);
    assert_eq!(
        file.data[0].fields.get("login_count"),
        Some(&Value::from(10))
    );
}

#[test]
fn insert_on_conflict_do_nothing_skips_the_row() {
    let (engine, _) = engine(
        vec![type_def(
            "users",
            vec![required("email", "string"), field("login_count", "number")],
        )],
        vec![(
            "users",
            vec![record("u1", &[("email", Value::from("alice@x"))])],
        )],
    );

    let payload = run(
        &engine,
        json!({
            "kind": "insert",
            "table": "users",
            "columns": ["email"],
            "values": ["alice@x"],
            "onConflict": {"columns": ["email"], "doNothing": true}
        }),
    );

    assert_eq!(payload.result.affected_count, Some(0));
    assert!(payload.deltas.is_empty());
    assert!(payload.result.can_commit);
}

#[test]
fn insert_returning_projects_the_staged_record() {
    let (engine, _) = engine(
        vec![type_def("users", vec![required("name", "string")])],
        vec![],
    );
    let payload = run(
        &engine,
        json!({
            "kind": "insert",
            "table": "users",
            "columns": ["name"],
            "values": ["Grace"],
            "returning": [
                {"alias": "id", "value": {"source": "users", "column": "id"}},
                {"alias": "name", "value": {"source": "users", "column": "name"}}
            ]
        }),
    );

    assert_eq!(payload.result.rows.len(), 1);
    assert_eq!(payload.result.rows[0].get("name"), Some(&Value::from("Grace")));
    let temp_id = payload.result.rows[0]
        .get("id")
        .and_then(Value::as_text)
        .expect("temp id in returning");
    assert_eq!(payload.deltas[0].inserts[0].temp_id, temp_id);
}

#[test]
fn insert_select_with_surplus_columns_is_an_error() {
    let (engine, _) = engine(
        vec![
            type_def("src", vec![required("a", "string"), required("b", "string")]),
            type_def("dst", vec![required("a", "string")]),
        ],
        vec![(
            "src",
            vec![record(
                "s1",
                &[("a", Value::from("x")), ("b", Value::from("y"))],
            )],
        )],
    );

    let payload = run(
        &engine,
        json!({
            "kind": "insert",
            "table": "dst",
            "columns": ["a"],
            "select": {
                "kind": "select",
                "values": [
                    {"alias": "a", "value": {"source": "src", "column": "a"}},
                    {"alias": "b", "value": {"source": "src", "column": "b"}}
                ],
                "from": {"kind": "table", "table": "src"}
            }
        }),
    );

    assert!(!payload.result.can_commit);
    assert!(payload
        .result
        .validation_errors
        .iter()
        .any(|e| e.message.contains("target column")));
    assert!(payload.deltas.is_empty(), "surplus rows are not staged");
}

#[test]
fn insert_select_zips_rows_by_position() {
    let (engine, provider) = engine(
        vec![
            type_def("src", vec![required("name", "string")]),
            type_def("dst", vec![required("title", "string")]),
        ],
        vec![(
            "src",
            vec![
                record("s1", &[("name", Value::from("one"))]),
                record("s2", &[("name", Value::from("two"))]),
            ],
        )],
    );

    let payload = run(
        &engine,
        json!({
            "kind": "insert",
            "table": "dst",
            "columns": ["title"],
            "select": {
                "kind": "select",
                "values": [{"alias": "name", "value": {"source": "src", "column": "name"}}],
                "from": {"kind": "table", "table": "src"}
            }
        }),
    );

    assert_eq!(payload.result.affected_count, Some(2));
    engine.commit(&payload).expect("commit");
    assert_eq!(provider.snapshot("dst").data.len(), 2);
}

#[test]
fn update_stages_partials_and_returning_sees_the_new_values() {
    let (engine, provider) = transaction_engine();
    let payload = run(
        &engine,
        json!({
            "kind": "update",
            "table": "transaction",
            "set": [{"column": "description", "value": "espresso"}],
            "where": [{"kind": "comparison",
                "left": {"source": "transaction", "column": "accountid"},
                "cmp": "=", "right": "acc123"}],
            "returning": [{"alias": "description",
                           "value": {"source": "transaction", "column": "description"}}]
        }),
    );

    assert_eq!(payload.result.affected_count, Some(1));
    assert_eq!(
        payload.result.rows[0].get("description"),
        Some(&Value::from("espresso"))
    );
    assert_eq!(payload.deltas[0].updates[0].id, "1");

    engine.commit(&payload).expect("commit");
    let file = provider.snapshot("transaction");
    let updated = file.data.iter().find(|r| r.id == "1").expect("row 1");
    assert_eq!(
        updated.fields.get("description"),
        Some(&Value::from("espresso"))
    );
}

#[test]
fn update_to_unknown_column_is_reported_on_the_set_path() {
    let (engine, _) = transaction_engine();
    let payload = run(
        &engine,
        json!({
            "kind": "update",
            "table": "transaction",
            "set": [{"column": "ghost", "value": "x"}],
            "where": []
        }),
    );

    assert!(!payload.result.can_commit);
    assert!(payload
        .result
        .validation_errors
        .iter()
        .any(|e| e.path.contains("set[0]") && e.message.contains("Unknown column 'ghost'")));
}

#[test]
fn insert_column_count_mismatch_is_reported() {
    let (engine, _) = engine(
        vec![type_def(
            "users",
            vec![required("name", "string"), field("age", "number")],
        )],
        vec![],
    );
    let payload = run(
        &engine,
        json!({
            "kind": "insert",
            "table": "users",
            "columns": ["name", "age"],
            "values": ["Alice"]
        }),
    );

    assert!(!payload.result.can_commit);
    assert!(payload
        .result
        .validation_errors
        .iter()
        .any(|e| e.message.contains("Column count")));
    assert_eq!(payload.result.affected_count, Some(0));
}
