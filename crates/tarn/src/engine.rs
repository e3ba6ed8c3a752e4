//! The engine facade.
//!
//! `execute` runs a query against snapshots and returns the payload
//! (result plus staged deltas) without touching any store. `commit` passes
//! the payload through the commit gate. The split lets callers inspect,
//! ship, or drop a query's effects before anything becomes durable.

use crate::{
    ast,
    clock::{Clock, SystemClock},
    commit,
    context::QueryContext,
    exec, integrity, plan,
    result::{CommitCheck, MutationSummary, QueryExecutionPayload, QueryResult, TableDelta},
    similarity::Similarity,
    state::TableState,
};
use std::collections::BTreeSet;
use tarn_core::{
    error::EngineError,
    schema::{Schema, TypeDef},
    store::StoreProvider,
};

///
/// Engine
///

pub struct Engine<P: StoreProvider> {
    schema: Schema,
    provider: P,
    similarity: Option<Box<dyn Similarity>>,
    clock: Box<dyn Clock>,
}

impl<P: StoreProvider> Engine<P> {
    #[must_use]
    pub fn new(schema: Schema, provider: P) -> Self {
        Self {
            schema,
            provider,
            similarity: None,
            clock: Box::new(SystemClock),
        }
    }

    /// Build an engine straight from type definitions.
    pub fn from_types(types: Vec<TypeDef>, provider: P) -> Result<Self, EngineError> {
        Ok(Self::new(Schema::new(types)?, provider))
    }

    #[must_use]
    pub fn with_similarity(mut self, similarity: impl Similarity + 'static) -> Self {
        self.similarity = Some(Box::new(similarity));
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Execute a query without committing. The returned payload carries the
    /// rows, all validation findings, and the staged per-table deltas.
    pub fn execute(&self, query: &ast::Query) -> Result<QueryExecutionPayload, EngineError> {
        let plan = plan::compile_query(query);
        let now_ms = self.clock.now_ms();
        let mut ctx = QueryContext::new(
            &self.schema,
            &self.provider,
            self.similarity.as_deref(),
            now_ms,
        );

        let outcome = exec::execute_plan(&plan, &mut ctx)?;
        integrity::run(&mut ctx)?;

        // The same finding can be reached through more than one pass; keep
        // the first occurrence per (path, message).
        let mut seen = BTreeSet::new();
        let mut errors = ctx.errors;
        errors.retain(|error| seen.insert((error.path.clone(), error.message.clone())));

        let deltas: Vec<TableDelta> = ctx
            .table_states
            .values()
            .filter(|state| state.is_dirty())
            .map(TableState::delta)
            .collect();

        let inserted = summaries(&ctx.table_states, |state| {
            state.inserted.keys().cloned().collect()
        });
        let updated = summaries(&ctx.table_states, |state| {
            state.updated.keys().cloned().collect()
        });
        let deleted = summaries(&ctx.table_states, |state| {
            state.deleted.iter().cloned().collect()
        });

        let can_commit = errors.is_empty();
        tracing::debug!(
            rows = outcome.rows.len(),
            deltas = deltas.len(),
            errors = errors.len(),
            can_commit,
            "query executed"
        );

        Ok(QueryExecutionPayload {
            result: QueryResult {
                rows: outcome.rows,
                affected_count: outcome.affected,
                inserted,
                updated,
                deleted,
                validation_errors: errors,
                can_commit,
            },
            deltas,
        })
    }

    /// Verify a payload against the live stores without writing.
    pub fn can_commit(&self, payload: &QueryExecutionPayload) -> Result<CommitCheck, EngineError> {
        commit::check(&self.provider, payload)
    }

    /// Verify and apply a payload's deltas.
    pub fn commit(&self, payload: &QueryExecutionPayload) -> Result<(), EngineError> {
        commit::apply(&self.provider, payload, self.clock.now_ms())
    }

    /// Execute and, when validation passed, commit in one call.
    pub fn execute_and_commit(
        &self,
        query: &ast::Query,
    ) -> Result<QueryExecutionPayload, EngineError> {
        let payload = self.execute(query)?;
        self.commit(&payload)?;

        Ok(payload)
    }
}

fn summaries(
    states: &std::collections::BTreeMap<String, TableState>,
    ids: impl Fn(&TableState) -> Vec<String>,
) -> Option<Vec<MutationSummary>> {
    let summaries: Vec<MutationSummary> = states
        .values()
        .filter_map(|state| {
            let ids = ids(state);
            if ids.is_empty() {
                None
            } else {
                Some(MutationSummary {
                    table: state.table.clone(),
                    ids,
                })
            }
        })
        .collect();

    if summaries.is_empty() {
        None
    } else {
        Some(summaries)
    }
}
