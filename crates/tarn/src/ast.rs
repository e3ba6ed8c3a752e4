//! Wire shape of the query language.
//!
//! Queries arrive as JSON: statements and expression nodes are maps tagged
//! by `kind`, constants are bare scalars, and source-column references are
//! `{source, column}` pairs. The types below mirror that grammar exactly;
//! no normalization happens here; names keep their wire casing until the
//! expression factory lowercases them.

use serde::Deserialize;
use tarn_core::value::Value;

///
/// Query
///
/// A full query: one statement, or a `withs` block naming common table
/// expressions over a final statement.
///

#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Query {
    Select(Select),
    Insert(Insert),
    Update(Update),
    Delete(Delete),
    Union(SetOperation),
    Intersect(SetOperation),
    Except(SetOperation),
    Withs(WithBlock),
}

impl Query {
    /// Decode a query from its JSON wire form.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

///
/// Statement
///
/// A statement position that does not admit a nested `withs` block.
///

#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Statement {
    Select(Select),
    Insert(Insert),
    Update(Update),
    Delete(Delete),
    Union(SetOperation),
    Intersect(SetOperation),
    Except(SetOperation),
}

///
/// RowQuery
///
/// A row-producing query: plain selects and set operations. Used for
/// subqueries, CTE bodies, INSERT … SELECT, IN, and EXISTS.
///

#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RowQuery {
    Select(Select),
    Union(SetOperation),
    Intersect(SetOperation),
    Except(SetOperation),
}

///
/// Select
///

#[derive(Clone, Debug, Deserialize)]
pub struct Select {
    #[serde(default)]
    pub distinct: bool,
    pub values: Vec<AliasValue>,
    #[serde(default)]
    pub from: Option<DataSource>,
    #[serde(default)]
    pub joins: Vec<Join>,
    #[serde(default, rename = "where")]
    pub where_: Vec<ValueExpr>,
    #[serde(default, rename = "groupBy")]
    pub group_by: Vec<ValueExpr>,
    #[serde(default)]
    pub having: Vec<ValueExpr>,
    #[serde(default, rename = "orderBy")]
    pub order_by: Vec<OrderBy>,
    #[serde(default)]
    pub offset: Option<u64>,
    #[serde(default)]
    pub limit: Option<u64>,
}

///
/// Insert
///
/// Row values come from either an inline `values` row or a row-producing
/// `select`, zipped to `columns` by position.
///

#[derive(Clone, Debug, Deserialize)]
pub struct Insert {
    pub table: String,
    #[serde(default, rename = "as")]
    pub alias: Option<String>,
    pub columns: Vec<String>,
    #[serde(default)]
    pub values: Option<Vec<ValueExpr>>,
    #[serde(default)]
    pub select: Option<Box<RowQuery>>,
    #[serde(default)]
    pub returning: Vec<AliasValue>,
    #[serde(default, rename = "onConflict")]
    pub on_conflict: Option<OnConflict>,
}

///
/// OnConflict
///

#[derive(Clone, Debug, Deserialize)]
pub struct OnConflict {
    pub columns: Vec<String>,
    #[serde(default, rename = "doNothing")]
    pub do_nothing: bool,
    #[serde(default)]
    pub update: Vec<SetItem>,
}

///
/// Update
///

#[derive(Clone, Debug, Deserialize)]
pub struct Update {
    pub table: String,
    #[serde(default, rename = "as")]
    pub alias: Option<String>,
    pub set: Vec<SetItem>,
    #[serde(default)]
    pub from: Option<DataSource>,
    #[serde(default)]
    pub joins: Vec<Join>,
    #[serde(default, rename = "where")]
    pub where_: Vec<ValueExpr>,
    #[serde(default)]
    pub returning: Vec<AliasValue>,
}

///
/// Delete
///

#[derive(Clone, Debug, Deserialize)]
pub struct Delete {
    pub table: String,
    #[serde(default, rename = "as")]
    pub alias: Option<String>,
    #[serde(default)]
    pub joins: Vec<Join>,
    #[serde(default, rename = "where")]
    pub where_: Vec<ValueExpr>,
    #[serde(default)]
    pub returning: Vec<AliasValue>,
}

///
/// SetOperation
///
/// The `kind` (union / intersect / except) lives on the enclosing enum
/// variant; `all` keeps duplicates.
///

#[derive(Clone, Debug, Deserialize)]
pub struct SetOperation {
    pub left: Box<Select>,
    pub right: Box<Select>,
    #[serde(default)]
    pub all: bool,
}

///
/// WithBlock
///

#[derive(Clone, Debug, Deserialize)]
pub struct WithBlock {
    pub withs: Vec<WithStatement>,
    #[serde(rename = "final")]
    pub final_: Statement,
}

///
/// WithStatement
///
/// One CTE binding. A recursive binding's body is a union whose left arm is
/// the anchor and whose right arm may reference the binding's own name.
///

#[derive(Clone, Debug, Deserialize)]
pub struct WithStatement {
    #[serde(alias = "as")]
    pub name: String,
    #[serde(default)]
    pub recursive: bool,
    pub select: RowQuery,
}

///
/// SetItem
///
/// One `column = value` assignment in UPDATE or ON CONFLICT DO UPDATE.
///

#[derive(Clone, Debug, Deserialize)]
pub struct SetItem {
    pub column: String,
    pub value: ValueExpr,
}

///
/// AliasValue
///
/// One projection or RETURNING item.
///

#[derive(Clone, Debug, Deserialize)]
pub struct AliasValue {
    pub alias: String,
    pub value: ValueExpr,
}

///
/// DataSource
///

#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum DataSource {
    Table(TableSource),
    Subquery(SubquerySource),
}

#[derive(Clone, Debug, Deserialize)]
pub struct TableSource {
    pub table: String,
    #[serde(default, rename = "as")]
    pub alias: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SubquerySource {
    pub subquery: Box<RowQuery>,
    #[serde(rename = "as")]
    pub alias: String,
}

///
/// Join
///

#[derive(Clone, Debug, Deserialize)]
pub struct Join {
    pub source: DataSource,
    #[serde(default, rename = "type")]
    pub join_type: JoinType,
    #[serde(default)]
    pub on: Vec<ValueExpr>,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum JoinType {
    #[default]
    Inner,
    Left,
    Right,
    Full,
}

///
/// OrderBy
///

#[derive(Clone, Debug, Deserialize)]
pub struct OrderBy {
    pub value: ValueExpr,
    #[serde(default)]
    pub dir: OrderDirection,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

///
/// ValueExpr
///
/// The expression grammar. Constants are bare scalars, kinded nodes carry a
/// `kind` tag, and anything else shaped `{source, column}` is a column
/// reference.
///

#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum ValueExpr {
    Constant(Value),
    Node(Box<ExprNode>),
    Column(ColumnRef),
}

///
/// ColumnRef
///
/// `column` may be `*` for wildcard expansion.
///

#[derive(Clone, Debug, Deserialize)]
pub struct ColumnRef {
    pub source: String,
    pub column: String,
}

///
/// ExprNode
///
/// Every kinded expression node, value-producing and boolean alike; boolean
/// forms evaluate to a boolean value and may appear wherever a value may.
///

#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ExprNode {
    Binary {
        left: ValueExpr,
        op: BinaryOp,
        right: ValueExpr,
    },
    Unary {
        unary: UnaryOp,
        value: ValueExpr,
    },
    Aggregate {
        aggregate: AggregateFn,
        value: ValueExpr,
    },
    Function {
        function: String,
        #[serde(default)]
        args: Vec<ValueExpr>,
    },
    Window {
        function: AggregateFn,
        value: ValueExpr,
        #[serde(default, rename = "partitionBy")]
        partition_by: Vec<ValueExpr>,
        #[serde(default, rename = "orderBy")]
        order_by: Vec<OrderBy>,
    },
    Case {
        case: Vec<CaseBranch>,
        #[serde(default, rename = "else")]
        else_: Option<ValueExpr>,
    },
    SemanticSimilarity {
        table: String,
        query: String,
    },
    Select(Select),
    Union(SetOperation),
    Intersect(SetOperation),
    Except(SetOperation),
    Comparison {
        left: ValueExpr,
        cmp: ComparisonOp,
        right: ValueExpr,
    },
    In {
        value: ValueExpr,
        #[serde(rename = "in")]
        list: InList,
    },
    Between {
        value: ValueExpr,
        between: (ValueExpr, ValueExpr),
    },
    IsNull {
        #[serde(rename = "isNull")]
        value: ValueExpr,
    },
    Exists {
        exists: RowQuery,
    },
    And {
        and: Vec<ValueExpr>,
    },
    Or {
        or: Vec<ValueExpr>,
    },
    Not {
        not: ValueExpr,
    },
}

///
/// CaseBranch
///

#[derive(Clone, Debug, Deserialize)]
pub struct CaseBranch {
    pub when: ValueExpr,
    pub then: ValueExpr,
}

///
/// InList
///
/// The right-hand side of IN: an inline list or a row-producing subquery
/// whose first projected column is the membership list.
///

#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum InList {
    Values(Vec<ValueExpr>),
    Query(Box<RowQuery>),
}

///
/// OPERATORS
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
pub enum BinaryOp {
    #[serde(rename = "+")]
    Add,
    #[serde(rename = "-")]
    Sub,
    #[serde(rename = "*")]
    Mul,
    #[serde(rename = "/")]
    Div,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
pub enum UnaryOp {
    #[serde(rename = "-")]
    Neg,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum AggregateFn {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
pub enum ComparisonOp {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<>")]
    Ne,
    #[serde(rename = "like")]
    Like,
    #[serde(rename = "notLike")]
    NotLike,
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn query(value: serde_json::Value) -> Query {
        serde_json::from_value(value).expect("query decodes")
    }

    #[test]
    fn from_json_parses_the_wire_text() {
        let q = Query::from_json(
            r#"{"kind": "select", "values": [{"alias": "one", "value": 1}]}"#,
        )
        .expect("wire text decodes");
        assert!(matches!(q, Query::Select(_)));
        assert!(Query::from_json("{}").is_err());
    }

    #[test]
    fn decodes_a_minimal_select() {
        let q = query(json!({
            "kind": "select",
            "values": [{"alias": "two", "value": {"kind": "binary", "left": 1, "op": "+", "right": 1}}]
        }));

        let Query::Select(select) = q else {
            panic!("expected select");
        };
        assert!(select.from.is_none());
        assert_eq!(select.values.len(), 1);
        assert!(matches!(
            select.values[0].value,
            ValueExpr::Node(ref node) if matches!(**node, ExprNode::Binary { op: BinaryOp::Add, .. })
        ));
    }

    #[test]
    fn column_refs_do_not_shadow_kinded_nodes() {
        let q = query(json!({
            "kind": "select",
            "values": [{"alias": "n", "value": {"source": "t", "column": "name"}}],
            "from": {"kind": "table", "table": "t"},
            "where": [{"kind": "isNull", "isNull": {"source": "t", "column": "name"}}]
        }));

        let Query::Select(select) = q else {
            panic!("expected select");
        };
        assert!(matches!(select.values[0].value, ValueExpr::Column(_)));
        assert!(matches!(
            select.where_[0],
            ValueExpr::Node(ref node) if matches!(**node, ExprNode::IsNull { .. })
        ));
    }

    #[test]
    fn scalar_constants_stay_scalars() {
        let q = query(json!({
            "kind": "select",
            "values": [
                {"alias": "a", "value": null},
                {"alias": "b", "value": true},
                {"alias": "c", "value": 2.5},
                {"alias": "d", "value": "text"}
            ]
        }));

        let Query::Select(select) = q else {
            panic!("expected select");
        };
        let constants: Vec<_> = select
            .values
            .iter()
            .map(|item| match &item.value {
                ValueExpr::Constant(v) => v.clone(),
                other => panic!("expected constant, got {other:?}"),
            })
            .collect();
        assert_eq!(
            constants,
            vec![Value::Null, Value::from(true), Value::from(2.5), Value::from("text")]
        );
    }

    #[test]
    fn decodes_insert_with_on_conflict() {
        let q = query(json!({
            "kind": "insert",
            "table": "users",
            "columns": ["email", "login_count"],
            "values": ["alice@example.com", 10],
            "onConflict": {
                "columns": ["email"],
                "update": [{"column": "login_count", "value": 10}]
            }
        }));

        let Query::Insert(insert) = q else {
            panic!("expected insert");
        };
        let conflict = insert.on_conflict.expect("conflict clause");
        assert_eq!(conflict.columns, vec!["email"]);
        assert!(!conflict.do_nothing);
        assert_eq!(conflict.update.len(), 1);
    }

    #[test]
    fn decodes_withs_with_recursive_union() {
        let q = query(json!({
            "kind": "withs",
            "withs": [{
                "name": "chain",
                "recursive": true,
                "select": {
                    "kind": "union",
                    "all": true,
                    "left": {"kind": "select", "values": [{"alias": "n", "value": 1}]},
                    "right": {"kind": "select", "values": [{"alias": "n", "value": 2}]}
                }
            }],
            "final": {
                "kind": "select",
                "values": [{"alias": "n", "value": {"source": "chain", "column": "n"}}],
                "from": {"kind": "table", "table": "chain"}
            }
        }));

        let Query::Withs(block) = q else {
            panic!("expected withs");
        };
        assert!(block.withs[0].recursive);
        assert!(matches!(block.withs[0].select, RowQuery::Union(_)));
        assert!(matches!(block.final_, Statement::Select(_)));
    }

    #[test]
    fn in_accepts_lists_and_subqueries() {
        let list = query(json!({
            "kind": "select",
            "values": [{"alias": "x", "value": 1}],
            "where": [{"kind": "in", "value": 1, "in": [1, 2, 3]}]
        }));
        let Query::Select(select) = list else {
            panic!("expected select");
        };
        assert!(matches!(
            select.where_[0],
            ValueExpr::Node(ref n) if matches!(**n, ExprNode::In { list: InList::Values(_), .. })
        ));

        let sub = query(json!({
            "kind": "select",
            "values": [{"alias": "x", "value": 1}],
            "where": [{"kind": "in", "value": 1, "in": {
                "kind": "select",
                "values": [{"alias": "id", "value": {"source": "t", "column": "id"}}],
                "from": {"kind": "table", "table": "t"}
            }}]
        }));
        let Query::Select(select) = sub else {
            panic!("expected select");
        };
        assert!(matches!(
            select.where_[0],
            ValueExpr::Node(ref n) if matches!(**n, ExprNode::In { list: InList::Query(_), .. })
        ));
    }

    #[test]
    fn join_type_defaults_to_inner() {
        let q = query(json!({
            "kind": "select",
            "values": [{"alias": "x", "value": 1}],
            "from": {"kind": "table", "table": "a"},
            "joins": [{
                "source": {"kind": "table", "table": "b", "as": "bb"},
                "on": [{"kind": "comparison",
                        "left": {"source": "a", "column": "id"},
                        "cmp": "=",
                        "right": {"source": "bb", "column": "a_id"}}]
            }]
        }));

        let Query::Select(select) = q else {
            panic!("expected select");
        };
        assert_eq!(select.joins[0].join_type, JoinType::Inner);
    }

    #[test]
    fn comparison_operator_spellings() {
        for (token, expected) in [
            ("=", ComparisonOp::Eq),
            ("<>", ComparisonOp::Ne),
            ("<=", ComparisonOp::Lte),
            ("like", ComparisonOp::Like),
            ("notLike", ComparisonOp::NotLike),
        ] {
            let op: ComparisonOp =
                serde_json::from_value(json!(token)).expect("operator decodes");
            assert_eq!(op, expected);
        }
    }
}
