//! Tarn: a transactional query engine executing JSON query ASTs over
//! schema-typed record tables.
//!
//! A query arrives as the AST of [`ast::Query`], is compiled into a
//! path-annotated expression tree, and runs against per-table staging
//! overlays. Execution never throws for user mistakes; findings accumulate
//! as [`ValidationError`]s, and nothing touches a store until the commit
//! gate verifies snapshot versions and applies the staged deltas.

pub mod ast;
pub mod clock;
pub mod engine;
pub mod result;
pub mod similarity;

mod commit;
mod context;
mod exec;
mod expr;
mod integrity;
mod plan;
mod state;

#[cfg(test)]
pub(crate) mod test_fixtures;

pub use tarn_core::{
    error::{EngineError, SchemaError, StoreError, ValidationError},
    record::{DataFile, DataRecord},
    schema::{FieldDef, FieldType, OnDelete, Schema, TypeDef},
    store::{MemoryStore, MemoryStoreProvider, Store, StoreProvider},
    value::Value,
};

///
/// CONSTANTS
///

/// Iteration bound for recursive common table expressions.
pub const RECURSIVE_CTE_LIMIT: usize = 1_000;

///
/// Prelude
///
/// Prelude contains only domain vocabulary.
///

pub mod prelude {
    pub use crate::{
        ast::Query,
        engine::Engine,
        result::{QueryExecutionPayload, QueryResult},
        Schema, TypeDef, Value,
    };
}
