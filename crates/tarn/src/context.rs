//! Per-query execution context.
//!
//! One `QueryContext` lives for one query: it owns the staged table states,
//! the source bindings, CTE results, the accumulated findings, and the
//! clock snapshot. Subqueries share the parent's context, so they observe
//! the parent's staged mutations.

use crate::{similarity::Similarity, state::TableState};
use std::{collections::BTreeMap, rc::Rc};
use tarn_core::{
    error::{StoreError, ValidationError},
    record::DataRecord,
    schema::Schema,
    store::{Store, StoreProvider},
};

/// One row of a join product: source binding → record.
pub(crate) type SelectRecord = BTreeMap<String, Rc<DataRecord>>;

/// Synthesized binding used when sorting projected rows.
pub(crate) const TEMP_SOURCE: &str = "__temp__";

///
/// TableLoader
///
/// Object-safe loading facade over a `StoreProvider`, so the context does
/// not carry the provider's generics around.
///

pub(crate) trait TableLoader {
    fn load_rows(&self, table: &str) -> Result<Vec<DataRecord>, StoreError>;
}

impl<P: StoreProvider> TableLoader for P {
    fn load_rows(&self, table: &str) -> Result<Vec<DataRecord>, StoreError> {
        let store = self.store(table);
        store.load()?;
        store.get_all()
    }
}

///
/// QueryContext
///

pub(crate) struct QueryContext<'a> {
    pub schema: &'a Schema,
    loader: &'a dyn TableLoader,
    similarity: Option<&'a dyn Similarity>,
    pub now_ms: i64,
    pub table_states: BTreeMap<String, TableState>,
    /// Outer-row bindings visible to a running correlated subquery. Only
    /// `with_correlation` writes here; outside a subquery the map is empty,
    /// so a stray table can never answer for an unbound source.
    pub correlated: BTreeMap<String, Rc<DataRecord>>,
    /// Source binding → backing table name (`None` for synthetic sources).
    pub bindings: BTreeMap<String, Option<String>>,
    pub ctes: BTreeMap<String, Vec<Rc<DataRecord>>>,
    pub errors: Vec<ValidationError>,
    counter: usize,
}

impl<'a> QueryContext<'a> {
    pub fn new(
        schema: &'a Schema,
        loader: &'a dyn TableLoader,
        similarity: Option<&'a dyn Similarity>,
        now_ms: i64,
    ) -> Self {
        Self {
            schema,
            loader,
            similarity,
            now_ms,
            table_states: BTreeMap::new(),
            correlated: BTreeMap::new(),
            bindings: BTreeMap::new(),
            ctes: BTreeMap::new(),
            errors: Vec::new(),
            counter: 0,
        }
    }

    pub fn record(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    #[must_use]
    pub fn can_commit(&self) -> bool {
        self.errors.is_empty()
    }

    /// Snapshot a table on first touch. Returns false when the schema does
    /// not know the table; callers report that with their own path.
    pub fn ensure_table(&mut self, table: &str) -> Result<bool, StoreError> {
        if self.table_states.contains_key(table) {
            return Ok(true);
        }
        if !self.schema.contains(table) {
            return Ok(false);
        }

        let records = self.loader.load_rows(table)?;
        tracing::trace!(table, rows = records.len(), "table snapshot loaded");
        self.table_states
            .insert(table.to_string(), TableState::load(table, records));

        Ok(true)
    }

    #[must_use]
    pub fn state(&self, table: &str) -> Option<&TableState> {
        self.table_states.get(table)
    }

    pub fn state_mut(&mut self, table: &str) -> Option<&mut TableState> {
        self.table_states.get_mut(table)
    }

    /// Monotonic index for synthesized subquery row ids.
    pub fn next_index(&mut self) -> usize {
        let index = self.counter;
        self.counter += 1;
        index
    }

    pub fn similarity_score(&self, table: &str, query: &str) -> f64 {
        self.similarity
            .map_or(0.0, |provider| provider.score(table, query))
    }

    /// Run `f` with every source of `record` bound in `correlated`,
    /// restoring the previous bindings afterwards. This is how a correlated
    /// subquery sees exactly the enclosing row, and nothing else.
    pub fn with_correlation<T>(
        &mut self,
        record: &SelectRecord,
        f: impl FnOnce(&mut Self) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let saved = self.correlated.clone();
        for (source, rec) in record {
            self.correlated.insert(source.clone(), Rc::clone(rec));
        }

        let result = f(&mut *self);
        self.correlated = saved;
        result
    }
}
