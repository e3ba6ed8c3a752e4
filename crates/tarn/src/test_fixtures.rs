//! Shared builders for executor and commit tests.

use crate::{ast::Query, clock::FixedClock, engine::Engine, result::QueryExecutionPayload};
use std::collections::BTreeMap;
use tarn_core::{
    record::DataRecord,
    schema::{FieldDef, FieldType, OnDelete, Schema, TypeDef},
    store::MemoryStoreProvider,
    value::Value,
};

/// Deterministic query-time clock used by every engine fixture.
pub(crate) const TEST_NOW_MS: i64 = 1_700_000_000_000;

pub(crate) fn field(name: &str, ty: &str) -> FieldDef {
    FieldDef {
        name: name.to_string(),
        ty: FieldType::parse(ty),
        required: false,
        enum_options: Vec::new(),
        on_delete: OnDelete::Restrict,
    }
}

pub(crate) fn required(name: &str, ty: &str) -> FieldDef {
    FieldDef {
        required: true,
        ..field(name, ty)
    }
}

pub(crate) fn reference(name: &str, target: &str, on_delete: OnDelete) -> FieldDef {
    FieldDef {
        on_delete,
        ..field(name, target)
    }
}

pub(crate) fn type_def(name: &str, fields: Vec<FieldDef>) -> TypeDef {
    TypeDef {
        name: name.to_string(),
        fields,
    }
}

pub(crate) fn record(id: &str, pairs: &[(&str, Value)]) -> DataRecord {
    let fields: BTreeMap<String, Value> = pairs
        .iter()
        .map(|(name, value)| ((*name).to_string(), value.clone()))
        .collect();
    DataRecord::new(id, 10, fields)
}

/// Engine over a seeded memory store with a fixed clock; the provider is
/// returned too so tests can inspect and perturb the backing files.
pub(crate) fn engine(
    types: Vec<TypeDef>,
    seeds: Vec<(&str, Vec<DataRecord>)>,
) -> (Engine<MemoryStoreProvider>, MemoryStoreProvider) {
    let provider = MemoryStoreProvider::new();
    for (table, records) in seeds {
        provider.seed(table, records);
    }

    let engine = Engine::new(Schema::new(types).expect("schema"), provider.clone())
        .with_clock(FixedClock(TEST_NOW_MS));

    (engine, provider)
}

pub(crate) fn run(
    engine: &Engine<MemoryStoreProvider>,
    query: serde_json::Value,
) -> QueryExecutionPayload {
    let query: Query = serde_json::from_value(query).expect("query decodes");
    engine.execute(&query).expect("query executes")
}

/// The orders fixture used by the grouping scenarios.
pub(crate) fn orders_engine() -> (Engine<MemoryStoreProvider>, MemoryStoreProvider) {
    engine(
        vec![type_def(
            "orders",
            vec![required("customer", "string"), required("amount", "number")],
        )],
        vec![(
            "orders",
            vec![
                record("1", &[("customer", Value::from("Alice")), ("amount", Value::from(100))]),
                record("2", &[("customer", Value::from("Alice")), ("amount", Value::from(200))]),
                record("3", &[("customer", Value::from("Bob")), ("amount", Value::from(50))]),
                record("4", &[("customer", Value::from("Bob")), ("amount", Value::from(150))]),
                record("5", &[("customer", Value::from("Charlie")), ("amount", Value::from(400))]),
                record("6", &[("customer", Value::from("Charlie")), ("amount", Value::from(250))]),
                record("7", &[("customer", Value::from("Dave")), ("amount", Value::from(10))]),
                record("8", &[("customer", Value::from("Dave")), ("amount", Value::from(20))]),
            ],
        )],
    )
}
