//! Commit-gate behavior: version integrity, isolation, replay.

use crate::test_fixtures::{engine, record, required, run, type_def};
use serde_json::json;
use tarn_core::{error::EngineError, value::Value};

fn counter_engine() -> (
    crate::engine::Engine<tarn_core::store::MemoryStoreProvider>,
    tarn_core::store::MemoryStoreProvider,
) {
    engine(
        vec![type_def("counters", vec![required("n", "number")])],
        vec![(
            "counters",
            vec![record("c1", &[("n", Value::from(1))])],
        )],
    )
}

fn bump() -> serde_json::Value {
    json!({
        "kind": "update",
        "table": "counters",
        "set": [{"column": "n", "value": 2}],
        "where": []
    })
}

#[test]
fn commit_is_rejected_when_the_table_moved_underneath() {
    let (engine, provider) = counter_engine();
    let payload = run(&engine, bump());

    // Out-of-band writer bumps the row's updated stamp between execute and
    // commit; the snapshot version no longer matches.
    let mut moved = record("c1", &[("n", Value::from(99))]);
    moved.updated = 777;
    provider.seed("counters", vec![moved]);

    let check = engine.can_commit(&payload).expect("check runs");
    assert!(!check.can_commit);
    assert_eq!(check.modified_tables, vec!["counters".to_string()]);

    let err = engine.commit(&payload).expect_err("commit must refuse");
    let EngineError::VersionConflict { modified_tables } = err else {
        panic!("expected a version conflict, got {err:?}");
    };
    assert_eq!(modified_tables, vec!["counters".to_string()]);

    // The out-of-band value survives.
    assert_eq!(
        provider.snapshot("counters").data[0].fields.get("n"),
        Some(&Value::from(99))
    );
}

#[test]
fn commit_check_is_idempotent_on_an_unmodified_store() {
    let (engine, _) = counter_engine();
    let payload = run(&engine, bump());

    let first = engine.can_commit(&payload).expect("first check");
    let second = engine.can_commit(&payload).expect("second check");
    assert!(first.can_commit);
    assert!(second.can_commit, "checking must not disturb the store");
}

#[test]
fn execution_is_deterministic_up_to_temp_ids() {
    let (engine, _) = counter_engine();

    let query = json!({
        "kind": "select",
        "values": [
            {"alias": "id", "value": {"source": "counters", "column": "id"}},
            {"alias": "n", "value": {"source": "counters", "column": "n"}}
        ],
        "from": {"kind": "table", "table": "counters"},
        "orderBy": [{"value": {"source": "counters", "column": "n"}, "dir": "desc"}]
    });
    let first = run(&engine, query.clone());
    let second = run(&engine, query);

    assert_eq!(first.result.rows, second.result.rows);
    assert_eq!(first.deltas.len(), second.deltas.len());

    // Mutations replay identically apart from generated temp ids.
    let insert = json!({
        "kind": "insert",
        "table": "counters",
        "columns": ["n"],
        "values": [7]
    });
    let a = run(&engine, insert.clone());
    let b = run(&engine, insert);
    assert_eq!(a.deltas[0].version, b.deltas[0].version);
    assert_eq!(a.deltas[0].inserts[0].fields, b.deltas[0].inserts[0].fields);
    assert_ne!(a.deltas[0].inserts[0].temp_id, b.deltas[0].inserts[0].temp_id);
}

#[test]
fn failed_validation_leaves_the_store_bit_identical() {
    let (engine, provider) = counter_engine();
    let before = provider.snapshot("counters");

    let payload = run(
        &engine,
        json!({
            "kind": "update",
            "table": "counters",
            "set": [{"column": "n", "value": "not-a-number"}],
            "where": []
        }),
    );
    assert!(!payload.result.can_commit);
    engine.commit(&payload).expect_err("commit refuses");

    assert_eq!(provider.snapshot("counters"), before);
}

#[test]
fn commit_stamps_updated_and_the_file_timestamp() {
    let (engine, provider) = counter_engine();
    let payload = run(&engine, bump());
    engine.commit(&payload).expect("commit");

    let file = provider.snapshot("counters");
    assert_eq!(file.updated, crate::test_fixtures::TEST_NOW_MS);
    assert_eq!(file.data[0].updated, crate::test_fixtures::TEST_NOW_MS);
    assert_eq!(file.data[0].created, 10, "created is untouched by updates");
}

#[test]
fn inserts_become_durable_with_their_temp_id_and_fresh_stamps() {
    let (engine, provider) = counter_engine();
    let payload = run(
        &engine,
        json!({
            "kind": "insert",
            "table": "counters",
            "columns": ["n"],
            "values": [5]
        }),
    );
    let temp_id = payload.deltas[0].inserts[0].temp_id.clone();
    engine.commit(&payload).expect("commit");

    let file = provider.snapshot("counters");
    let inserted = file.data.iter().find(|r| r.id == temp_id).expect("row");
    assert_eq!(inserted.created, inserted.updated);
    assert_eq!(inserted.fields.get("n"), Some(&Value::from(5)));
}

#[test]
fn replaying_a_committed_payload_is_rejected_by_the_version_gate() {
    let (engine, _) = counter_engine();
    let payload = run(&engine, bump());
    engine.commit(&payload).expect("first commit");

    // The commit itself moved the version; the stale payload cannot reapply.
    let check = engine.can_commit(&payload).expect("check");
    assert!(!check.can_commit);
    assert_eq!(check.modified_tables, vec!["counters".to_string()]);
}
