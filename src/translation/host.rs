//! Host query model.
//!
//! The chain of query operations an upstream front end hands over, already
//! reduced to a closed set of shapes. Both enums are internally tagged so a
//! query reads naturally as JSON:
//!
//! ```json
//! { "op": "filter",
//!   "source": { "op": "source", "entity": "Customer" },
//!   "predicate": { "kind": "compare", "op": "eq",
//!                  "left":  { "kind": "member", "path": "Name" },
//!                  "right": { "kind": "literal", "value": "Ada" } } }
//! ```

use serde::{Deserialize, Serialize};

use crate::sql::{BinaryOperator, Literal};

/// A query operation over a data set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum QueryExpr {
    /// Every row of an entity's table.
    Source { entity: String },

    Filter {
        source: Box<QueryExpr>,
        predicate: HostExpr,
    },

    /// Select a new row shape. Dotted field names nest.
    Project {
        source: Box<QueryExpr>,
        fields: Vec<ProjectField>,
    },

    /// Equi-join; the result row exposes both sides under their names.
    Join {
        outer: Box<QueryExpr>,
        inner: Box<QueryExpr>,
        outer_key: HostExpr,
        inner_key: HostExpr,
        outer_name: String,
        inner_name: String,
        #[serde(default)]
        left: bool,
    },

    /// Group by `keys`; the result row holds the keys and the aggregates.
    GroupBy {
        source: Box<QueryExpr>,
        keys: Vec<ProjectField>,
        #[serde(default)]
        aggregates: Vec<ProjectField>,
    },

    OrderBy {
        source: Box<QueryExpr>,
        key: HostExpr,
        #[serde(default)]
        descending: bool,
        /// Refine the existing order instead of replacing it.
        #[serde(default)]
        then_by: bool,
    },

    Take {
        source: Box<QueryExpr>,
        count: HostExpr,
    },

    Skip {
        source: Box<QueryExpr>,
        count: HostExpr,
    },

    Distinct { source: Box<QueryExpr> },

    /// UNION, or UNION ALL (concatenation) with `all`.
    Union {
        left: Box<QueryExpr>,
        right: Box<QueryExpr>,
        #[serde(default)]
        all: bool,
    },

    /// Rows of `anchor` plus, repeatedly, the rows `recursive` derives from
    /// the rows produced so far.
    RecursiveUnion {
        anchor: Box<QueryExpr>,
        recursive: Box<QueryExpr>,
    },

    /// Inside `recursive`: the rows produced so far.
    RecursiveSelf,
}

/// A named output field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectField {
    pub name: String,
    pub expr: HostExpr,
}

impl ProjectField {
    pub fn new(name: &str, expr: HostExpr) -> Self {
        Self {
            name: name.to_string(),
            expr,
        }
    }
}

/// A scalar or predicate over the current row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HostExpr {
    /// Member of the current row; dots walk fields and to-one navigations.
    Member { path: String },

    /// Member of an enclosing row; depth 1 is the innermost enclosing query.
    OuterMember { depth: usize, path: String },

    Literal { value: HostLiteral },

    Parameter { name: String, value: HostLiteral },

    Compare {
        op: CompareOp,
        left: Box<HostExpr>,
        right: Box<HostExpr>,
    },

    And {
        left: Box<HostExpr>,
        right: Box<HostExpr>,
    },

    Or {
        left: Box<HostExpr>,
        right: Box<HostExpr>,
    },

    Not { operand: Box<HostExpr> },

    Arithmetic {
        op: ArithmeticOp,
        left: Box<HostExpr>,
        right: Box<HostExpr>,
    },

    IsNull {
        operand: Box<HostExpr>,
        #[serde(default)]
        negated: bool,
    },

    /// Whether `source` has a row, optionally one matching `predicate`.
    Any {
        source: Box<QueryExpr>,
        #[serde(default)]
        predicate: Option<Box<HostExpr>>,
    },

    /// CASE WHEN `test` THEN `if_true` ELSE `if_false` END
    Conditional {
        test: Box<HostExpr>,
        if_true: Box<HostExpr>,
        if_false: Box<HostExpr>,
    },

    /// The single value `source` produces, correlated like [`HostExpr::Any`].
    Scalar { source: Box<QueryExpr> },

    /// Aggregate over the rows of the current group.
    Aggregate {
        function: AggregateFunction,
        #[serde(default)]
        operand: Option<Box<HostExpr>>,
    },
}

impl HostExpr {
    pub fn member(path: &str) -> Self {
        HostExpr::Member {
            path: path.to_string(),
        }
    }

    pub fn outer(depth: usize, path: &str) -> Self {
        HostExpr::OuterMember {
            depth,
            path: path.to_string(),
        }
    }

    pub fn literal(value: impl Into<HostLiteral>) -> Self {
        HostExpr::Literal {
            value: value.into(),
        }
    }

    pub fn compare(op: CompareOp, left: HostExpr, right: HostExpr) -> Self {
        HostExpr::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn and(left: HostExpr, right: HostExpr) -> Self {
        HostExpr::And {
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn or(left: HostExpr, right: HostExpr) -> Self {
        HostExpr::Or {
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// The same expression with every current-row member moved under `prefix`.
    ///
    /// Nested query sources are left alone; their members belong to them.
    pub fn with_prefix(&self, prefix: &str) -> HostExpr {
        let nest = |e: &HostExpr| Box::new(e.with_prefix(prefix));
        match self {
            HostExpr::Member { path } if !prefix.is_empty() => HostExpr::Member {
                path: format!("{}.{}", prefix, path),
            },
            HostExpr::Compare { op, left, right } => HostExpr::Compare {
                op: *op,
                left: nest(left),
                right: nest(right),
            },
            HostExpr::And { left, right } => HostExpr::And {
                left: nest(left),
                right: nest(right),
            },
            HostExpr::Or { left, right } => HostExpr::Or {
                left: nest(left),
                right: nest(right),
            },
            HostExpr::Not { operand } => HostExpr::Not {
                operand: nest(operand),
            },
            HostExpr::Arithmetic { op, left, right } => HostExpr::Arithmetic {
                op: *op,
                left: nest(left),
                right: nest(right),
            },
            HostExpr::IsNull { operand, negated } => HostExpr::IsNull {
                operand: nest(operand),
                negated: *negated,
            },
            HostExpr::Conditional {
                test,
                if_true,
                if_false,
            } => HostExpr::Conditional {
                test: nest(test),
                if_true: nest(if_true),
                if_false: nest(if_false),
            },
            HostExpr::Aggregate { function, operand } => HostExpr::Aggregate {
                function: *function,
                operand: operand.as_deref().map(nest),
            },
            other => other.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl From<CompareOp> for BinaryOperator {
    fn from(op: CompareOp) -> Self {
        match op {
            CompareOp::Eq => BinaryOperator::Eq,
            CompareOp::Ne => BinaryOperator::Ne,
            CompareOp::Lt => BinaryOperator::Lt,
            CompareOp::Lte => BinaryOperator::Lte,
            CompareOp::Gt => BinaryOperator::Gt,
            CompareOp::Gte => BinaryOperator::Gte,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArithmeticOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Concat,
}

impl From<ArithmeticOp> for BinaryOperator {
    fn from(op: ArithmeticOp) -> Self {
        match op {
            ArithmeticOp::Add => BinaryOperator::Plus,
            ArithmeticOp::Subtract => BinaryOperator::Minus,
            ArithmeticOp::Multiply => BinaryOperator::Mul,
            ArithmeticOp::Divide => BinaryOperator::Div,
            ArithmeticOp::Modulo => BinaryOperator::Mod,
            ArithmeticOp::Concat => BinaryOperator::Concat,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateFunction {
    Count,
    Sum,
    Min,
    Max,
    Avg,
}

impl AggregateFunction {
    pub fn sql_name(self) -> &'static str {
        match self {
            AggregateFunction::Count => "COUNT",
            AggregateFunction::Sum => "SUM",
            AggregateFunction::Min => "MIN",
            AggregateFunction::Max => "MAX",
            AggregateFunction::Avg => "AVG",
        }
    }
}

/// A constant as written in the host query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HostLiteral {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Null,
}

impl From<HostLiteral> for Literal {
    fn from(value: HostLiteral) -> Self {
        match value {
            HostLiteral::Bool(b) => Literal::Bool(b),
            HostLiteral::Int(n) => Literal::Int(n),
            HostLiteral::Float(n) => Literal::Float(n),
            HostLiteral::String(s) => Literal::String(s),
            HostLiteral::Null => Literal::Null,
        }
    }
}

impl From<i64> for HostLiteral {
    fn from(n: i64) -> Self {
        HostLiteral::Int(n)
    }
}

impl From<bool> for HostLiteral {
    fn from(b: bool) -> Self {
        HostLiteral::Bool(b)
    }
}

impl From<&str> for HostLiteral {
    fn from(s: &str) -> Self {
        HostLiteral::String(s.to_string())
    }
}
