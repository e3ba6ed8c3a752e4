//! Compiled statement plans.
//!
//! Plans are the statement-level half of the factory: AST statements with
//! every nested expression compiled, names lowercased, and paths attached.
//! `referenced_tables` drives table-state preloading before execution.

use crate::{
    ast,
    expr::{Expr, ExprKind, SortKey, compile_expr, compile_sort_keys, item, seg},
};
use std::collections::BTreeSet;

///
/// QueryPlan
///

#[derive(Clone, Debug)]
pub(crate) struct QueryPlan {
    pub ctes: Vec<CtePlan>,
    pub statement: StatementPlan,
}

#[derive(Clone, Debug)]
pub(crate) struct CtePlan {
    pub name: String,
    pub recursive: bool,
    pub body: RowPlan,
    pub path: String,
}

#[derive(Clone, Debug)]
pub(crate) enum StatementPlan {
    Select(SelectPlan),
    Insert(InsertPlan),
    Update(UpdatePlan),
    Delete(DeletePlan),
    SetOp(SetOpPlan),
}

#[derive(Clone, Debug)]
pub(crate) enum RowPlan {
    Select(SelectPlan),
    SetOp(SetOpPlan),
}

///
/// SelectPlan
///

#[derive(Clone, Debug)]
pub(crate) struct SelectPlan {
    pub path: String,
    pub distinct: bool,
    pub values: Vec<ProjectionItem>,
    pub from: Option<SourcePlan>,
    pub joins: Vec<JoinPlan>,
    pub filters: Vec<Expr>,
    pub group_by: Vec<Expr>,
    pub having: Vec<Expr>,
    pub order_by: Vec<SortKey>,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

#[derive(Clone, Debug)]
pub(crate) struct ProjectionItem {
    pub alias: String,
    pub expr: Expr,
}

///
/// SourcePlan
///
/// `binding` is the name rows of this source answer to inside the query:
/// the alias when present, the table or subquery name otherwise.
///

#[derive(Clone, Debug)]
pub(crate) struct SourcePlan {
    pub kind: SourceKind,
    pub binding: String,
    pub path: String,
}

#[derive(Clone, Debug)]
pub(crate) enum SourceKind {
    Table { table: String },
    Subquery(Box<RowPlan>),
}

#[derive(Clone, Debug)]
pub(crate) struct JoinPlan {
    pub source: SourcePlan,
    pub join_type: ast::JoinType,
    pub on: Vec<Expr>,
}

///
/// SetOpPlan
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum SetOpKind {
    Union,
    Intersect,
    Except,
}

#[derive(Clone, Debug)]
pub(crate) struct SetOpPlan {
    pub path: String,
    pub kind: SetOpKind,
    pub left: Box<SelectPlan>,
    pub right: Box<SelectPlan>,
    pub all: bool,
}

///
/// Mutation plans
///

#[derive(Clone, Debug)]
pub(crate) struct InsertPlan {
    pub path: String,
    pub table: String,
    pub binding: String,
    pub columns: Vec<String>,
    pub values: Option<Vec<Expr>>,
    pub select: Option<Box<RowPlan>>,
    pub returning: Vec<ProjectionItem>,
    pub on_conflict: Option<OnConflictPlan>,
}

#[derive(Clone, Debug)]
pub(crate) struct OnConflictPlan {
    pub columns: Vec<String>,
    pub do_nothing: bool,
    pub update: Vec<SetItemPlan>,
}

#[derive(Clone, Debug)]
pub(crate) struct SetItemPlan {
    pub column: String,
    pub expr: Expr,
    pub path: String,
}

#[derive(Clone, Debug)]
pub(crate) struct UpdatePlan {
    pub path: String,
    pub table: String,
    pub binding: String,
    pub set: Vec<SetItemPlan>,
    pub from: Option<SourcePlan>,
    pub joins: Vec<JoinPlan>,
    pub filters: Vec<Expr>,
    pub returning: Vec<ProjectionItem>,
}

#[derive(Clone, Debug)]
pub(crate) struct DeletePlan {
    pub path: String,
    pub table: String,
    pub binding: String,
    pub joins: Vec<JoinPlan>,
    pub filters: Vec<Expr>,
    pub returning: Vec<ProjectionItem>,
}

// ─────────────────────────────────────────────────────────────
// Compilation
// ─────────────────────────────────────────────────────────────

pub(crate) fn compile_query(query: &ast::Query) -> QueryPlan {
    match query {
        ast::Query::Withs(block) => {
            let ctes = block
                .withs
                .iter()
                .enumerate()
                .map(|(i, with)| {
                    let path = item("query", "withs", i);
                    CtePlan {
                        name: with.name.to_lowercase(),
                        recursive: with.recursive,
                        body: compile_row_query(&with.select, &seg(&path, "select")),
                        path,
                    }
                })
                .collect();

            QueryPlan {
                ctes,
                statement: compile_statement(&block.final_, &seg("query", "final")),
            }
        }
        ast::Query::Select(select) => plain(StatementPlan::Select(compile_select(select, "query"))),
        ast::Query::Insert(insert) => plain(StatementPlan::Insert(compile_insert(insert, "query"))),
        ast::Query::Update(update) => plain(StatementPlan::Update(compile_update(update, "query"))),
        ast::Query::Delete(delete) => plain(StatementPlan::Delete(compile_delete(delete, "query"))),
        ast::Query::Union(op) => plain(StatementPlan::SetOp(compile_set_op(
            op,
            SetOpKind::Union,
            "query",
        ))),
        ast::Query::Intersect(op) => plain(StatementPlan::SetOp(compile_set_op(
            op,
            SetOpKind::Intersect,
            "query",
        ))),
        ast::Query::Except(op) => plain(StatementPlan::SetOp(compile_set_op(
            op,
            SetOpKind::Except,
            "query",
        ))),
    }
}

const fn plain(statement: StatementPlan) -> QueryPlan {
    QueryPlan {
        ctes: Vec::new(),
        statement,
    }
}

fn compile_statement(statement: &ast::Statement, path: &str) -> StatementPlan {
    match statement {
        ast::Statement::Select(select) => StatementPlan::Select(compile_select(select, path)),
        ast::Statement::Insert(insert) => StatementPlan::Insert(compile_insert(insert, path)),
        ast::Statement::Update(update) => StatementPlan::Update(compile_update(update, path)),
        ast::Statement::Delete(delete) => StatementPlan::Delete(compile_delete(delete, path)),
        ast::Statement::Union(op) => StatementPlan::SetOp(compile_set_op(op, SetOpKind::Union, path)),
        ast::Statement::Intersect(op) => {
            StatementPlan::SetOp(compile_set_op(op, SetOpKind::Intersect, path))
        }
        ast::Statement::Except(op) => {
            StatementPlan::SetOp(compile_set_op(op, SetOpKind::Except, path))
        }
    }
}

pub(crate) fn compile_row_query(query: &ast::RowQuery, path: &str) -> RowPlan {
    match query {
        ast::RowQuery::Select(select) => RowPlan::Select(compile_select(select, path)),
        ast::RowQuery::Union(op) => RowPlan::SetOp(compile_set_op(op, SetOpKind::Union, path)),
        ast::RowQuery::Intersect(op) => {
            RowPlan::SetOp(compile_set_op(op, SetOpKind::Intersect, path))
        }
        ast::RowQuery::Except(op) => RowPlan::SetOp(compile_set_op(op, SetOpKind::Except, path)),
    }
}

pub(crate) fn compile_select(select: &ast::Select, path: &str) -> SelectPlan {
    SelectPlan {
        path: path.to_string(),
        distinct: select.distinct,
        values: compile_projection(&select.values, path, "values"),
        from: select
            .from
            .as_ref()
            .map(|source| compile_source(source, &seg(path, "from"))),
        joins: compile_joins(&select.joins, path),
        filters: compile_filters(&select.where_, path, "where"),
        group_by: compile_filters(&select.group_by, path, "groupBy"),
        having: compile_filters(&select.having, path, "having"),
        order_by: compile_sort_keys(&select.order_by, path),
        offset: select.offset.map(|n| usize::try_from(n).unwrap_or(usize::MAX)),
        limit: select.limit.map(|n| usize::try_from(n).unwrap_or(usize::MAX)),
    }
}

pub(crate) fn compile_set_op(op: &ast::SetOperation, kind: SetOpKind, path: &str) -> SetOpPlan {
    SetOpPlan {
        path: path.to_string(),
        kind,
        left: Box::new(compile_select(&op.left, &seg(path, "left"))),
        right: Box::new(compile_select(&op.right, &seg(path, "right"))),
        all: op.all,
    }
}

fn compile_insert(insert: &ast::Insert, path: &str) -> InsertPlan {
    let table = insert.table.to_lowercase();
    let binding = insert
        .alias
        .as_deref()
        .map_or_else(|| table.clone(), str::to_lowercase);

    InsertPlan {
        path: path.to_string(),
        table,
        binding,
        columns: insert.columns.iter().map(|c| c.to_lowercase()).collect(),
        values: insert.values.as_ref().map(|values| {
            values
                .iter()
                .enumerate()
                .map(|(i, value)| compile_expr(value, &item(path, "values", i)))
                .collect()
        }),
        select: insert
            .select
            .as_ref()
            .map(|query| Box::new(compile_row_query(query, &seg(path, "select")))),
        returning: compile_projection(&insert.returning, path, "returning"),
        on_conflict: insert.on_conflict.as_ref().map(|conflict| OnConflictPlan {
            columns: conflict.columns.iter().map(|c| c.to_lowercase()).collect(),
            do_nothing: conflict.do_nothing,
            update: compile_set_items(&conflict.update, &seg(path, "onConflict")),
        }),
    }
}

fn compile_update(update: &ast::Update, path: &str) -> UpdatePlan {
    let table = update.table.to_lowercase();
    let binding = update
        .alias
        .as_deref()
        .map_or_else(|| table.clone(), str::to_lowercase);

    UpdatePlan {
        path: path.to_string(),
        table,
        binding,
        set: compile_set_items(&update.set, path),
        from: update
            .from
            .as_ref()
            .map(|source| compile_source(source, &seg(path, "from"))),
        joins: compile_joins(&update.joins, path),
        filters: compile_filters(&update.where_, path, "where"),
        returning: compile_projection(&update.returning, path, "returning"),
    }
}

fn compile_delete(delete: &ast::Delete, path: &str) -> DeletePlan {
    let table = delete.table.to_lowercase();
    let binding = delete
        .alias
        .as_deref()
        .map_or_else(|| table.clone(), str::to_lowercase);

    DeletePlan {
        path: path.to_string(),
        table,
        binding,
        joins: compile_joins(&delete.joins, path),
        filters: compile_filters(&delete.where_, path, "where"),
        returning: compile_projection(&delete.returning, path, "returning"),
    }
}

fn compile_source(source: &ast::DataSource, path: &str) -> SourcePlan {
    match source {
        ast::DataSource::Table(table) => {
            let name = table.table.to_lowercase();
            SourcePlan {
                binding: table
                    .alias
                    .as_deref()
                    .map_or_else(|| name.clone(), str::to_lowercase),
                kind: SourceKind::Table { table: name },
                path: path.to_string(),
            }
        }
        ast::DataSource::Subquery(subquery) => SourcePlan {
            binding: subquery.alias.to_lowercase(),
            kind: SourceKind::Subquery(Box::new(compile_row_query(
                &subquery.subquery,
                &seg(path, "subquery"),
            ))),
            path: path.to_string(),
        },
    }
}

fn compile_joins(joins: &[ast::Join], path: &str) -> Vec<JoinPlan> {
    joins
        .iter()
        .enumerate()
        .map(|(i, join)| {
            let join_path = item(path, "joins", i);
            JoinPlan {
                source: compile_source(&join.source, &seg(&join_path, "source")),
                join_type: join.join_type,
                on: join
                    .on
                    .iter()
                    .enumerate()
                    .map(|(j, on)| compile_expr(on, &item(&join_path, "on", j)))
                    .collect(),
            }
        })
        .collect()
}

fn compile_filters(filters: &[ast::ValueExpr], path: &str, segment: &str) -> Vec<Expr> {
    filters
        .iter()
        .enumerate()
        .map(|(i, filter)| compile_expr(filter, &item(path, segment, i)))
        .collect()
}

fn compile_projection(items: &[ast::AliasValue], path: &str, segment: &str) -> Vec<ProjectionItem> {
    items
        .iter()
        .enumerate()
        .map(|(i, entry)| ProjectionItem {
            alias: entry.alias.to_lowercase(),
            expr: compile_expr(&entry.value, &format!("{}.value", item(path, segment, i))),
        })
        .collect()
}

fn compile_set_items(items: &[ast::SetItem], path: &str) -> Vec<SetItemPlan> {
    items
        .iter()
        .enumerate()
        .map(|(i, entry)| SetItemPlan {
            column: entry.column.to_lowercase(),
            expr: compile_expr(&entry.value, &format!("{}.value", item(path, "set", i))),
            path: item(path, "set", i),
        })
        .collect()
}

// ─────────────────────────────────────────────────────────────
// Referenced tables
// ─────────────────────────────────────────────────────────────

impl QueryPlan {
    /// Every table name the query may touch, CTE bindings excluded.
    pub fn referenced_tables(&self) -> BTreeSet<String> {
        let mut tables = BTreeSet::new();
        for cte in &self.ctes {
            collect_row_plan(&cte.body, &mut tables);
        }
        match &self.statement {
            StatementPlan::Select(select) => collect_select(select, &mut tables),
            StatementPlan::SetOp(op) => collect_set_op(op, &mut tables),
            StatementPlan::Insert(insert) => {
                tables.insert(insert.table.clone());
                if let Some(values) = &insert.values {
                    for expr in values {
                        collect_expr(expr, &mut tables);
                    }
                }
                if let Some(select) = &insert.select {
                    collect_row_plan(select, &mut tables);
                }
                for item in &insert.returning {
                    collect_expr(&item.expr, &mut tables);
                }
                if let Some(conflict) = &insert.on_conflict {
                    for set in &conflict.update {
                        collect_expr(&set.expr, &mut tables);
                    }
                }
            }
            StatementPlan::Update(update) => {
                tables.insert(update.table.clone());
                for set in &update.set {
                    collect_expr(&set.expr, &mut tables);
                }
                if let Some(from) = &update.from {
                    collect_source(from, &mut tables);
                }
                for join in &update.joins {
                    collect_join(join, &mut tables);
                }
                for filter in &update.filters {
                    collect_expr(filter, &mut tables);
                }
                for item in &update.returning {
                    collect_expr(&item.expr, &mut tables);
                }
            }
            StatementPlan::Delete(delete) => {
                tables.insert(delete.table.clone());
                for join in &delete.joins {
                    collect_join(join, &mut tables);
                }
                for filter in &delete.filters {
                    collect_expr(filter, &mut tables);
                }
                for item in &delete.returning {
                    collect_expr(&item.expr, &mut tables);
                }
            }
        }

        for cte in &self.ctes {
            tables.remove(&cte.name);
        }

        tables
    }
}

fn collect_row_plan(plan: &RowPlan, tables: &mut BTreeSet<String>) {
    match plan {
        RowPlan::Select(select) => collect_select(select, tables),
        RowPlan::SetOp(op) => collect_set_op(op, tables),
    }
}

fn collect_set_op(op: &SetOpPlan, tables: &mut BTreeSet<String>) {
    collect_select(&op.left, tables);
    collect_select(&op.right, tables);
}

fn collect_select(select: &SelectPlan, tables: &mut BTreeSet<String>) {
    if let Some(from) = &select.from {
        collect_source(from, tables);
    }
    for join in &select.joins {
        collect_join(join, tables);
    }
    for item in &select.values {
        collect_expr(&item.expr, tables);
    }
    for expr in select
        .filters
        .iter()
        .chain(&select.group_by)
        .chain(&select.having)
    {
        collect_expr(expr, tables);
    }
    for key in &select.order_by {
        collect_expr(&key.expr, tables);
    }
}

fn collect_source(source: &SourcePlan, tables: &mut BTreeSet<String>) {
    match &source.kind {
        SourceKind::Table { table } => {
            tables.insert(table.clone());
        }
        SourceKind::Subquery(plan) => collect_row_plan(plan, tables),
    }
}

fn collect_join(join: &JoinPlan, tables: &mut BTreeSet<String>) {
    collect_source(&join.source, tables);
    for on in &join.on {
        collect_expr(on, tables);
    }
}

fn collect_expr(expr: &Expr, tables: &mut BTreeSet<String>) {
    expr.walk(&mut |node| match &node.kind {
        ExprKind::Subquery(plan) | ExprKind::Exists(plan) => collect_row_plan(plan, tables),
        ExprKind::InQuery { query, .. } => collect_row_plan(query, tables),
        _ => {}
    });
}

///
/// TESTS
///
