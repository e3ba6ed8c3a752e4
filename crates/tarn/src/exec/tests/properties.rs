//! Property tests for the evaluator's null semantics.

use crate::test_fixtures::{engine, record, required, run, type_def};
use proptest::prelude::*;
use serde_json::json;
use tarn_core::value::Value;

fn scalar() -> impl Strategy<Value = serde_json::Value> {
    prop_oneof![
        Just(serde_json::Value::Null),
        any::<bool>().prop_map(serde_json::Value::from),
        (-1_000_i64..1_000).prop_map(serde_json::Value::from),
        "[a-z]{0,8}".prop_map(serde_json::Value::from),
    ]
}

fn arithmetic_op() -> impl Strategy<Value = &'static str> {
    prop_oneof![Just("+"), Just("-"), Just("*"), Just("/")]
}

fn comparison_op() -> impl Strategy<Value = &'static str> {
    prop_oneof![
        Just("="),
        Just("<"),
        Just(">"),
        Just("<="),
        Just(">="),
        Just("<>")
    ]
}

proptest! {
    // For all x and all binary ops: null op x = x op null = null, and the
    // null never surfaces as a validation error.
    #[test]
    fn null_propagates_through_binary_arithmetic(x in scalar(), op in arithmetic_op()) {
        let (engine, _) = engine(vec![], vec![]);

        for (left, right) in [
            (serde_json::Value::Null, x.clone()),
            (x.clone(), serde_json::Value::Null),
        ] {
            let payload = run(&engine, json!({
                "kind": "select",
                "values": [{"alias": "v", "value":
                    {"kind": "binary", "left": left, "op": op, "right": right}}]
            }));

            prop_assert_eq!(payload.result.rows[0].get("v"), Some(&Value::Null));
            prop_assert!(payload.result.can_commit);
        }
    }

    // A predicate that evaluates to null excludes the row, same as false.
    #[test]
    fn null_comparisons_exclude_rows_in_where(op in comparison_op()) {
        let (engine, _) = engine(
            vec![type_def("t", vec![required("v", "number")])],
            vec![("t", vec![record("r1", &[("v", Value::from(1))])])],
        );

        let payload = run(&engine, json!({
            "kind": "select",
            "values": [{"alias": "v", "value": {"source": "t", "column": "v"}}],
            "from": {"kind": "table", "table": "t"},
            "where": [{"kind": "comparison",
                "left": {"source": "t", "column": "v"},
                "cmp": op,
                "right": null}]
        }));

        prop_assert!(payload.result.rows.is_empty());
    }
}

#[test]
fn literal_null_equals_literal_null_only() {
    let (engine, _) = engine(
        vec![type_def("t", vec![required("v", "number")])],
        vec![("t", vec![record("r1", &[("v", Value::from(1))])])],
    );

    // The documented exception: a literal null = null comparison is true.
    let literal = run(
        &engine,
        json!({
            "kind": "select",
            "values": [{"alias": "v", "value": {"source": "t", "column": "v"}}],
            "from": {"kind": "table", "table": "t"},
            "where": [{"kind": "comparison", "left": null, "cmp": "=", "right": null}]
        }),
    );
    assert_eq!(literal.result.rows.len(), 1);

    // A null that arrives through evaluation is unknown, not equal.
    let evaluated = run(
        &engine,
        json!({
            "kind": "select",
            "values": [{"alias": "v", "value": {"source": "t", "column": "v"}}],
            "from": {"kind": "table", "table": "t"},
            "where": [{"kind": "comparison",
                "left": {"kind": "function", "function": "coalesce", "args": [null]},
                "cmp": "=",
                "right": null}]
        }),
    );
    assert!(evaluated.result.rows.is_empty());
}

#[test]
fn is_null_is_two_valued() {
    let (engine, _) = engine(
        vec![type_def("t", vec![field_opt()])],
        vec![(
            "t",
            vec![
                record("r1", &[("v", Value::Null)]),
                record("r2", &[("v", Value::from(1))]),
            ],
        )],
    );

    let payload = run(
        &engine,
        json!({
            "kind": "select",
            "values": [{"alias": "id", "value": {"source": "t", "column": "id"}}],
            "from": {"kind": "table", "table": "t"},
            "where": [{"kind": "isNull", "isNull": {"source": "t", "column": "v"}}]
        }),
    );

    assert_eq!(payload.result.rows.len(), 1);
    assert_eq!(payload.result.rows[0].get("id"), Some(&Value::from("r1")));
}

fn field_opt() -> tarn_core::schema::FieldDef {
    crate::test_fixtures::field("v", "number")
}
