//! Path-annotated expression tree and its factory.
//!
//! The factory is a pure structural translation from AST nodes to evaluable
//! nodes. Every node carries the dotted path of the AST node it came from
//! (e.g. `query.where[1].left.args[0]`) so findings point back at the
//! original query. Names are lowercased here, once, on the way in.

mod aggregate;
mod eval;
mod functions;
mod predicate;

pub(crate) use eval::eval;
pub(crate) use predicate::truth;

use crate::{
    ast::{self, AggregateFn, BinaryOp, ComparisonOp, OrderDirection, UnaryOp},
    plan::{self, RowPlan},
};
use tarn_core::value::Value;

///
/// Expr
///
/// One evaluable node. Boolean forms are ordinary expressions that evaluate
/// to a boolean (or null) value.
///

#[derive(Clone, Debug)]
pub(crate) struct Expr {
    pub path: String,
    pub kind: ExprKind,
}

#[derive(Clone, Debug)]
pub(crate) enum ExprKind {
    Constant(Value),
    Column {
        source: String,
        column: String,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        value: Box<Expr>,
    },
    Aggregate {
        func: AggregateFn,
        /// `None` is `count(*)`.
        arg: Option<Box<Expr>>,
    },
    Function {
        name: String,
        args: Vec<Expr>,
    },
    Window {
        func: AggregateFn,
        value: Box<Expr>,
        partition_by: Vec<Expr>,
        order_by: Vec<SortKey>,
    },
    Case {
        branches: Vec<(Expr, Expr)>,
        else_: Option<Box<Expr>>,
    },
    Subquery(Box<RowPlan>),
    SemanticSimilarity {
        table: String,
        query: String,
    },
    Comparison {
        op: ComparisonOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    InList {
        value: Box<Expr>,
        items: Vec<Expr>,
    },
    InQuery {
        value: Box<Expr>,
        query: Box<RowPlan>,
    },
    Between {
        value: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
    },
    IsNull(Box<Expr>),
    Exists(Box<RowPlan>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
}

///
/// SortKey
///

#[derive(Clone, Debug)]
pub(crate) struct SortKey {
    pub expr: Expr,
    pub descending: bool,
}

/// Compare two rows' evaluated sort-key tuples, applying each key's
/// direction in turn.
pub(crate) fn compare_sort_keys(
    keys: &[SortKey],
    a: &[Value],
    b: &[Value],
) -> std::cmp::Ordering {
    for (key, (left, right)) in keys.iter().zip(a.iter().zip(b.iter())) {
        let ordering = left.compare(right);
        let ordering = if key.descending {
            ordering.reverse()
        } else {
            ordering
        };
        if ordering != std::cmp::Ordering::Equal {
            return ordering;
        }
    }

    std::cmp::Ordering::Equal
}

impl Expr {
    /// Visit this node and every nested expression, depth-first. Subquery
    /// plans are boundaries; their inner expressions have their own paths.
    pub fn walk(&self, visit: &mut impl FnMut(&Self)) {
        visit(self);
        match &self.kind {
            ExprKind::Constant(_)
            | ExprKind::Column { .. }
            | ExprKind::SemanticSimilarity { .. }
            | ExprKind::Subquery(_)
            | ExprKind::Exists(_) => {}
            ExprKind::Binary { left, right, .. } | ExprKind::Comparison { left, right, .. } => {
                left.walk(visit);
                right.walk(visit);
            }
            ExprKind::Unary { value, .. } | ExprKind::IsNull(value) | ExprKind::Not(value) => {
                value.walk(visit);
            }
            ExprKind::Aggregate { arg, .. } => {
                if let Some(arg) = arg {
                    arg.walk(visit);
                }
            }
            ExprKind::Function { args, .. } => {
                for arg in args {
                    arg.walk(visit);
                }
            }
            ExprKind::Window {
                value,
                partition_by,
                order_by,
                ..
            } => {
                value.walk(visit);
                for expr in partition_by {
                    expr.walk(visit);
                }
                for key in order_by {
                    key.expr.walk(visit);
                }
            }
            ExprKind::Case { branches, else_ } => {
                for (when, then) in branches {
                    when.walk(visit);
                    then.walk(visit);
                }
                if let Some(else_) = else_ {
                    else_.walk(visit);
                }
            }
            ExprKind::InList { value, items } => {
                value.walk(visit);
                for item in items {
                    item.walk(visit);
                }
            }
            ExprKind::InQuery { value, .. } => value.walk(visit),
            ExprKind::Between { value, low, high } => {
                value.walk(visit);
                low.walk(visit);
                high.walk(visit);
            }
            ExprKind::And(items) | ExprKind::Or(items) => {
                for item in items {
                    item.walk(visit);
                }
            }
        }
    }

    /// True when the node is the wildcard column of some source.
    pub fn is_wildcard(&self) -> bool {
        matches!(&self.kind, ExprKind::Column { column, .. } if column == "*")
    }
}

/// Whether a projection expression contains an aggregate call. Window
/// functions evaluate per row and do not make a projection aggregating.
pub(crate) fn contains_aggregate(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Aggregate { .. } => true,
        ExprKind::Window { .. }
        | ExprKind::Subquery(_)
        | ExprKind::Exists(_)
        | ExprKind::Constant(_)
        | ExprKind::Column { .. }
        | ExprKind::SemanticSimilarity { .. } => false,
        ExprKind::Binary { left, right, .. } | ExprKind::Comparison { left, right, .. } => {
            contains_aggregate(left) || contains_aggregate(right)
        }
        ExprKind::Unary { value, .. } | ExprKind::IsNull(value) | ExprKind::Not(value) => {
            contains_aggregate(value)
        }
        ExprKind::InQuery { value, .. } => contains_aggregate(value),
        ExprKind::Function { args, .. } => args.iter().any(contains_aggregate),
        ExprKind::Case { branches, else_ } => {
            branches
                .iter()
                .any(|(when, then)| contains_aggregate(when) || contains_aggregate(then))
                || else_.as_deref().is_some_and(contains_aggregate)
        }
        ExprKind::InList { value, items } => {
            contains_aggregate(value) || items.iter().any(contains_aggregate)
        }
        ExprKind::Between { value, low, high } => {
            contains_aggregate(value) || contains_aggregate(low) || contains_aggregate(high)
        }
        ExprKind::And(items) | ExprKind::Or(items) => items.iter().any(contains_aggregate),
    }
}

// ─────────────────────────────────────────────────────────────
// Factory
// ─────────────────────────────────────────────────────────────

pub(crate) fn compile_expr(node: &ast::ValueExpr, path: &str) -> Expr {
    match node {
        ast::ValueExpr::Constant(value) => Expr {
            path: path.to_string(),
            kind: ExprKind::Constant(value.clone()),
        },
        ast::ValueExpr::Column(column) => Expr {
            path: path.to_string(),
            kind: ExprKind::Column {
                source: column.source.to_lowercase(),
                column: column.column.to_lowercase(),
            },
        },
        ast::ValueExpr::Node(node) => compile_node(node, path),
    }
}

fn compile_node(node: &ast::ExprNode, path: &str) -> Expr {
    let kind = match node {
        ast::ExprNode::Binary { left, op, right } => ExprKind::Binary {
            op: *op,
            left: Box::new(compile_expr(left, &seg(path, "left"))),
            right: Box::new(compile_expr(right, &seg(path, "right"))),
        },
        ast::ExprNode::Unary { unary, value } => ExprKind::Unary {
            op: *unary,
            value: Box::new(compile_expr(value, &seg(path, "value"))),
        },
        ast::ExprNode::Aggregate { aggregate, value } => ExprKind::Aggregate {
            func: *aggregate,
            arg: aggregate_arg(value, path),
        },
        ast::ExprNode::Function { function, args } => ExprKind::Function {
            name: function.to_lowercase(),
            args: args
                .iter()
                .enumerate()
                .map(|(i, arg)| compile_expr(arg, &item(path, "args", i)))
                .collect(),
        },
        ast::ExprNode::Window {
            function,
            value,
            partition_by,
            order_by,
        } => ExprKind::Window {
            func: *function,
            value: Box::new(compile_expr(value, &seg(path, "value"))),
            partition_by: partition_by
                .iter()
                .enumerate()
                .map(|(i, expr)| compile_expr(expr, &item(path, "partitionBy", i)))
                .collect(),
            order_by: compile_sort_keys(order_by, path),
        },
        ast::ExprNode::Case { case, else_ } => ExprKind::Case {
            branches: case
                .iter()
                .enumerate()
                .map(|(i, branch)| {
                    (
                        compile_expr(&branch.when, &format!("{}.when", item(path, "case", i))),
                        compile_expr(&branch.then, &format!("{}.then", item(path, "case", i))),
                    )
                })
                .collect(),
            else_: else_
                .as_ref()
                .map(|expr| Box::new(compile_expr(expr, &seg(path, "else")))),
        },
        ast::ExprNode::SemanticSimilarity { table, query } => ExprKind::SemanticSimilarity {
            table: table.to_lowercase(),
            query: query.clone(),
        },
        ast::ExprNode::Select(select) => ExprKind::Subquery(Box::new(RowPlan::Select(
            plan::compile_select(select, path),
        ))),
        ast::ExprNode::Union(op) => subquery_set_op(op, plan::SetOpKind::Union, path),
        ast::ExprNode::Intersect(op) => subquery_set_op(op, plan::SetOpKind::Intersect, path),
        ast::ExprNode::Except(op) => subquery_set_op(op, plan::SetOpKind::Except, path),
        ast::ExprNode::Comparison { left, cmp, right } => ExprKind::Comparison {
            op: *cmp,
            left: Box::new(compile_expr(left, &seg(path, "left"))),
            right: Box::new(compile_expr(right, &seg(path, "right"))),
        },
        ast::ExprNode::In { value, list } => {
            let value = Box::new(compile_expr(value, &seg(path, "value")));
            match list {
                ast::InList::Values(items) => ExprKind::InList {
                    value,
                    items: items
                        .iter()
                        .enumerate()
                        .map(|(i, expr)| compile_expr(expr, &item(path, "in", i)))
                        .collect(),
                },
                ast::InList::Query(query) => ExprKind::InQuery {
                    value,
                    query: Box::new(plan::compile_row_query(query, &seg(path, "in"))),
                },
            }
        }
        ast::ExprNode::Between { value, between } => ExprKind::Between {
            value: Box::new(compile_expr(value, &seg(path, "value"))),
            low: Box::new(compile_expr(&between.0, &item(path, "between", 0))),
            high: Box::new(compile_expr(&between.1, &item(path, "between", 1))),
        },
        ast::ExprNode::IsNull { value } => {
            ExprKind::IsNull(Box::new(compile_expr(value, &seg(path, "isNull"))))
        }
        ast::ExprNode::Exists { exists } => ExprKind::Exists(Box::new(plan::compile_row_query(
            exists,
            &seg(path, "exists"),
        ))),
        ast::ExprNode::And { and } => ExprKind::And(
            and.iter()
                .enumerate()
                .map(|(i, expr)| compile_expr(expr, &item(path, "and", i)))
                .collect(),
        ),
        ast::ExprNode::Or { or } => ExprKind::Or(
            or.iter()
                .enumerate()
                .map(|(i, expr)| compile_expr(expr, &item(path, "or", i)))
                .collect(),
        ),
        ast::ExprNode::Not { not } => {
            ExprKind::Not(Box::new(compile_expr(not, &seg(path, "not"))))
        }
    };

    Expr {
        path: path.to_string(),
        kind,
    }
}

pub(crate) fn compile_sort_keys(order_by: &[ast::OrderBy], path: &str) -> Vec<SortKey> {
    order_by
        .iter()
        .enumerate()
        .map(|(i, entry)| SortKey {
            expr: compile_expr(&entry.value, &format!("{}.value", item(path, "orderBy", i))),
            descending: entry.dir == OrderDirection::Desc,
        })
        .collect()
}

// `count(*)` travels as the constant string "*".
fn aggregate_arg(value: &ast::ValueExpr, path: &str) -> Option<Box<Expr>> {
    if let ast::ValueExpr::Constant(Value::Text(star)) = value
        && star == "*"
    {
        return None;
    }

    Some(Box::new(compile_expr(value, &seg(path, "value"))))
}

fn subquery_set_op(op: &ast::SetOperation, kind: plan::SetOpKind, path: &str) -> ExprKind {
    ExprKind::Subquery(Box::new(RowPlan::SetOp(plan::compile_set_op(
        op, kind, path,
    ))))
}

/// `path.segment`
pub(crate) fn seg(path: &str, segment: &str) -> String {
    format!("{path}.{segment}")
}

/// `path.segment[index]`
pub(crate) fn item(path: &str, segment: &str, index: usize) -> String {
    format!("{path}.{segment}[{index}]")
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn expr(value: serde_json::Value) -> Expr {
        let node: ast::ValueExpr = serde_json::from_value(value).expect("expr decodes");
        compile_expr(&node, "query.values[0].value")
    }

    #[test]
    fn paths_follow_the_ast_shape() {
        let compiled = expr(json!({
            "kind": "binary",
            "left": {"kind": "function", "function": "ABS", "args": [-1]},
            "op": "+",
            "right": 1
        }));

        let mut paths = Vec::new();
        compiled.walk(&mut |node| paths.push(node.path.clone()));
        assert!(paths.contains(&"query.values[0].value.left.args[0]".to_string()));
        assert!(paths.contains(&"query.values[0].value.right".to_string()));
    }

    #[test]
    fn names_are_lowercased_once() {
        let compiled = expr(json!({"source": "Orders", "column": "Amount"}));
        let ExprKind::Column { source, column } = &compiled.kind else {
            panic!("expected column");
        };
        assert_eq!(source, "orders");
        assert_eq!(column, "amount");
    }

    #[test]
    fn count_star_compiles_without_an_argument() {
        let compiled = expr(json!({"kind": "aggregate", "aggregate": "count", "value": "*"}));
        assert!(matches!(
            compiled.kind,
            ExprKind::Aggregate { func: AggregateFn::Count, arg: None }
        ));

        let compiled = expr(json!({"kind": "aggregate", "aggregate": "sum",
                                   "value": {"source": "t", "column": "amount"}}));
        assert!(matches!(
            compiled.kind,
            ExprKind::Aggregate { func: AggregateFn::Sum, arg: Some(_) }
        ));
    }

    #[test]
    fn aggregate_detection_stops_at_window_boundaries() {
        let plain = expr(json!({"kind": "aggregate", "aggregate": "sum",
                                "value": {"source": "t", "column": "v"}}));
        assert!(contains_aggregate(&plain));

        let windowed = expr(json!({
            "kind": "window", "function": "sum",
            "value": {"source": "t", "column": "v"},
            "partitionBy": [{"source": "t", "column": "g"}]
        }));
        assert!(!contains_aggregate(&windowed));
    }
}
