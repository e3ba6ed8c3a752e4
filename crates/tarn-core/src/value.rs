use crate::{
    date,
    schema::{FieldDef, FieldType},
};
use serde::{Deserialize, Deserializer, Serialize, de};
use std::{cmp::Ordering, collections::BTreeMap, fmt};

///
/// Value
///
/// Runtime scalar wrapper. A value is what the evaluator produces and what
/// record fields hold; all three-valued logic and type classification is
/// centralized here.
///
/// Null      → SQL NULL; also the read of an absent column.
/// Record    → internal-only merged row produced by wildcard column reads;
///             never accepted on the wire.
///

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    Record(BTreeMap<String, Value>),
}

///
/// ValueKind
///
/// Runtime type classification used by comparison and assignability checks.
/// `Date` only arises when a classification is given a field hint declaring
/// the `date` type and the text parses as an ISO-8601 literal.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ValueKind {
    Null,
    Number,
    Text,
    Bool,
    Date,
    Unknown,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Null => "null",
            Self::Number => "number",
            Self::Text => "string",
            Self::Bool => "boolean",
            Self::Date => "date",
            Self::Unknown => "unknown",
        };
        write!(f, "{label}")
    }
}

///
/// CompareOp
///
/// Comparison operators of the query grammar; used by comparability checks
/// and predicate evaluation.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    Like,
    NotLike,
}

impl CompareOp {
    /// LIKE and NOT LIKE only accept text operands.
    #[must_use]
    pub const fn is_text_only(self) -> bool {
        matches!(self, Self::Like | Self::NotLike)
    }
}

///
/// AssignIssue
///
/// Why a value cannot be assigned to a schema field. The engine turns these
/// into `ValidationError`s with the offending AST path attached.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AssignIssue {
    RequiredNull,
    NotInEnum { actual: String, options: Vec<String> },
    TypeMismatch { expected: String, actual: String },
}

impl Value {
    ///
    /// TYPES
    ///

    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Runtime kind without schema hints.
    #[must_use]
    pub const fn kind(&self) -> ValueKind {
        match self {
            Self::Null => ValueKind::Null,
            Self::Bool(_) => ValueKind::Bool,
            Self::Number(_) => ValueKind::Number,
            Self::Text(_) => ValueKind::Text,
            Self::Record(_) => ValueKind::Unknown,
        }
    }

    /// Runtime kind refined by an optional schema field hint.
    #[must_use]
    pub fn kind_with(&self, field: Option<&FieldDef>) -> ValueKind {
        if let (Self::Text(s), Some(field)) = (self, field)
            && matches!(field.ty, FieldType::Date)
            && date::is_date_literal(s)
        {
            return ValueKind::Date;
        }

        self.kind()
    }

    #[must_use]
    pub const fn as_text(&self) -> Option<&str> {
        if let Self::Text(s) = self {
            Some(s.as_str())
        } else {
            None
        }
    }

    #[must_use]
    pub const fn as_number(&self) -> Option<f64> {
        if let Self::Number(n) = self {
            Some(*n)
        } else {
            None
        }
    }

    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        if let Self::Bool(b) = self {
            Some(*b)
        } else {
            None
        }
    }

    ///
    /// COMPARISON
    ///

    /// Total order over values: nulls first, numbers numerically, everything
    /// else by its textual form.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Ordering {
        match (self.is_null(), other.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => match (self, other) {
                (Self::Number(a), Self::Number(b)) => a.total_cmp(b),
                _ => self.display_string().cmp(&other.display_string()),
            },
        }
    }

    /// Whether two values may meet under the given operator. Null is always
    /// comparable; the comparison itself resolves the null semantics.
    #[must_use]
    pub fn comparable_with(&self, other: &Self, op: CompareOp) -> bool {
        if self.is_null() || other.is_null() {
            return true;
        }
        if op.is_text_only() {
            return self.kind() == ValueKind::Text && other.kind() == ValueKind::Text;
        }

        self.kind() == other.kind()
    }

    ///
    /// RENDERING
    ///

    /// Textual form used for lexicographic comparison, concatenation, and
    /// enum membership. Integral numbers render without a fraction.
    #[must_use]
    pub fn display_string(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(b) => b.to_string(),
            Self::Number(n) => format_number(*n),
            Self::Text(s) => s.clone(),
            Self::Record(_) => serde_json::to_string(self).unwrap_or_default(),
        }
    }

    ///
    /// ASSIGNABILITY
    ///

    /// Check this value against a schema field declaration.
    pub fn assignable_to(&self, field: &FieldDef) -> Result<(), AssignIssue> {
        if self.is_null() {
            if field.required {
                return Err(AssignIssue::RequiredNull);
            }
            return Ok(());
        }

        if !field.enum_options.is_empty() {
            let actual = self.display_string();
            if field.enum_options.iter().any(|option| *option == actual) {
                return Ok(());
            }
            return Err(AssignIssue::NotInEnum {
                actual,
                options: field.enum_options.clone(),
            });
        }

        match &field.ty {
            // Foreign keys hold the target record's string id.
            FieldType::Ref(_) => match self {
                Self::Text(_) => Ok(()),
                _ => Err(AssignIssue::TypeMismatch {
                    expected: ValueKind::Text.to_string(),
                    actual: self.kind().to_string(),
                }),
            },
            FieldType::Date => match self {
                Self::Text(s) if date::is_date_literal(s) => Ok(()),
                _ => Err(AssignIssue::TypeMismatch {
                    expected: ValueKind::Date.to_string(),
                    actual: self.kind().to_string(),
                }),
            },
            FieldType::Text => self.expect_kind(ValueKind::Text),
            FieldType::Number => self.expect_kind(ValueKind::Number),
            FieldType::Bool => self.expect_kind(ValueKind::Bool),
        }
    }

    fn expect_kind(&self, expected: ValueKind) -> Result<(), AssignIssue> {
        if self.kind() == expected {
            Ok(())
        } else {
            Err(AssignIssue::TypeMismatch {
                expected: expected.to_string(),
                actual: self.kind().to_string(),
            })
        }
    }
}

// JS-compatible number rendering: integral floats print without a fraction.
#[expect(clippy::cast_possible_truncation)]
fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<i64> for Value {
    #[expect(clippy::cast_precision_loss)]
    fn from(v: i64) -> Self {
        Self::Number(v as f64)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

// Only scalar constants are accepted on the wire; arrays and objects have
// dedicated AST shapes and must not decode as values.
impl<'de> Deserialize<'de> for Value {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct ScalarVisitor;

        impl<'de> de::Visitor<'de> for ScalarVisitor {
            type Value = Value;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a scalar constant (null, boolean, number, or string)")
            }

            fn visit_unit<E: de::Error>(self) -> Result<Value, E> {
                Ok(Value::Null)
            }

            fn visit_none<E: de::Error>(self) -> Result<Value, E> {
                Ok(Value::Null)
            }

            fn visit_some<D: Deserializer<'de>>(self, d: D) -> Result<Value, D::Error> {
                Value::deserialize(d)
            }

            fn visit_bool<E: de::Error>(self, v: bool) -> Result<Value, E> {
                Ok(Value::Bool(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Value, E> {
                Ok(Value::from(v))
            }

            #[expect(clippy::cast_precision_loss)]
            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Value, E> {
                Ok(Value::Number(v as f64))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Value, E> {
                Ok(Value::Number(v))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Value, E> {
                Ok(Value::Text(v.to_string()))
            }

            fn visit_string<E: de::Error>(self, v: String) -> Result<Value, E> {
                Ok(Value::Text(v))
            }
        }

        deserializer.deserialize_any(ScalarVisitor)
    }
}

///
/// TESTS
///
