//! Expression AST: scalar values and predicates.
//!
//! Expressions never carry table names. A column is a pair of the producing
//! data source's [`AliasId`] and the column name that source exposes, so a
//! reference stays valid when the source is moved into a derived table or
//! renamed for output.

use serde::Serialize;

use super::alias::AliasId;
use super::query::DerivedTable;

// =============================================================================
// Expression AST
// =============================================================================

/// Column exposed by a data source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ColumnRef {
    pub source: AliasId,
    pub column: String,
}

impl ColumnRef {
    pub fn new(source: AliasId, column: impl Into<String>) -> Self {
        Self {
            source,
            column: column.into(),
        }
    }
}

/// Literal values
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Literal {
    Int(i64),
    Float(f64),
    String(String),
    Bool(bool),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BinaryOperator {
    // Comparison
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    // Logical
    And,
    Or,
    // Arithmetic
    Plus,
    Minus,
    Mul,
    Div,
    Mod,
    // String
    Concat,
    Like,
}

impl BinaryOperator {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            Self::Eq | Self::Ne | Self::Lt | Self::Lte | Self::Gt | Self::Gte
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, Self::And | Self::Or)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum UnaryOperator {
    Not,
    Minus,
}

/// A SQL expression.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SqlExpr {
    Literal(Literal),

    /// Named query parameter with the value captured at conversion time.
    Parameter { name: String, value: Literal },

    /// Column produced by a data source in scope.
    Column(ColumnRef),

    /// Reference to an output column of the enclosing unit's projection.
    /// Only valid inside ORDER BY.
    SelectAlias(String),

    Binary {
        left: Box<SqlExpr>,
        op: BinaryOperator,
        right: Box<SqlExpr>,
    },

    Unary {
        op: UnaryOperator,
        expr: Box<SqlExpr>,
    },

    /// Function or aggregate call. An aggregate with no arguments means `*`.
    Function {
        name: String,
        args: Vec<SqlExpr>,
        distinct: bool,
    },

    /// CASE WHEN test THEN if_true ELSE if_false END
    Conditional {
        test: Box<SqlExpr>,
        if_true: Box<SqlExpr>,
        if_false: Box<SqlExpr>,
    },

    IsNull {
        expr: Box<SqlExpr>,
        negated: bool,
    },

    InList {
        expr: Box<SqlExpr>,
        values: Vec<SqlExpr>,
        negated: bool,
    },

    /// [NOT] EXISTS (SELECT ...)
    Exists {
        query: Box<DerivedTable>,
        negated: bool,
    },

    /// Scalar subquery: (SELECT ...)
    Subquery(Box<DerivedTable>),
}

impl SqlExpr {
    pub fn as_column(&self) -> Option<&ColumnRef> {
        match self {
            SqlExpr::Column(column) => Some(column),
            _ => None,
        }
    }

    pub fn is_true_literal(&self) -> bool {
        matches!(self, SqlExpr::Literal(Literal::Bool(true)))
    }

    pub fn is_comparison(&self) -> bool {
        matches!(self, SqlExpr::Binary { op, .. } if op.is_comparison())
    }

    /// Whether any column reference occurs in this expression, subqueries included.
    pub fn has_column_reference(&self) -> bool {
        match self {
            SqlExpr::Column(_) => true,
            SqlExpr::Literal(_) | SqlExpr::Parameter { .. } | SqlExpr::SelectAlias(_) => false,
            SqlExpr::Binary { left, right, .. } => {
                left.has_column_reference() || right.has_column_reference()
            }
            SqlExpr::Unary { expr, .. } | SqlExpr::IsNull { expr, .. } => {
                expr.has_column_reference()
            }
            SqlExpr::Function { args, .. } => args.iter().any(SqlExpr::has_column_reference),
            SqlExpr::Conditional {
                test,
                if_true,
                if_false,
            } => {
                test.has_column_reference()
                    || if_true.has_column_reference()
                    || if_false.has_column_reference()
            }
            SqlExpr::InList { expr, values, .. } => {
                expr.has_column_reference() || values.iter().any(SqlExpr::has_column_reference)
            }
            SqlExpr::Exists { .. } | SqlExpr::Subquery(_) => true,
        }
    }

    /// Split a tree of ANDs into its conjuncts, left to right.
    pub fn into_conjuncts(self) -> Vec<SqlExpr> {
        match self {
            SqlExpr::Binary {
                left,
                op: BinaryOperator::And,
                right,
            } => {
                let mut conjuncts = left.into_conjuncts();
                conjuncts.extend(right.into_conjuncts());
                conjuncts
            }
            other => vec![other],
        }
    }

    /// AND a list of predicates together, left-associative.
    pub fn conjunction(exprs: impl IntoIterator<Item = SqlExpr>) -> Option<SqlExpr> {
        exprs.into_iter().reduce(|acc, expr| acc.and(expr))
    }
}

// =============================================================================
// Conversions
// =============================================================================

impl From<Literal> for SqlExpr {
    fn from(lit: Literal) -> Self {
        SqlExpr::Literal(lit)
    }
}

impl From<ColumnRef> for SqlExpr {
    fn from(column: ColumnRef) -> Self {
        SqlExpr::Column(column)
    }
}

impl From<i64> for SqlExpr {
    fn from(n: i64) -> Self {
        lit_int(n)
    }
}

impl From<bool> for SqlExpr {
    fn from(b: bool) -> Self {
        lit_bool(b)
    }
}

impl From<&str> for SqlExpr {
    fn from(s: &str) -> Self {
        lit_str(s)
    }
}

// =============================================================================
// Constructors
// =============================================================================

pub fn col(source: AliasId, column: &str) -> SqlExpr {
    SqlExpr::Column(ColumnRef::new(source, column))
}

pub fn lit_int(n: i64) -> SqlExpr {
    SqlExpr::Literal(Literal::Int(n))
}

pub fn lit_float(n: f64) -> SqlExpr {
    SqlExpr::Literal(Literal::Float(n))
}

pub fn lit_str(s: &str) -> SqlExpr {
    SqlExpr::Literal(Literal::String(s.to_string()))
}

pub fn lit_bool(b: bool) -> SqlExpr {
    SqlExpr::Literal(Literal::Bool(b))
}

pub fn lit_null() -> SqlExpr {
    SqlExpr::Literal(Literal::Null)
}

pub fn param(name: &str, value: Literal) -> SqlExpr {
    SqlExpr::Parameter {
        name: name.to_string(),
        value,
    }
}

pub fn func(name: &str, args: Vec<SqlExpr>) -> SqlExpr {
    SqlExpr::Function {
        name: name.to_string(),
        args,
        distinct: false,
    }
}

/// COUNT(*)
pub fn count_star() -> SqlExpr {
    func("COUNT", Vec::new())
}

pub fn exists(query: DerivedTable) -> SqlExpr {
    SqlExpr::Exists {
        query: Box::new(query),
        negated: false,
    }
}

pub fn not_exists(query: DerivedTable) -> SqlExpr {
    SqlExpr::Exists {
        query: Box::new(query),
        negated: true,
    }
}

pub fn scalar_subquery(query: DerivedTable) -> SqlExpr {
    SqlExpr::Subquery(Box::new(query))
}

pub fn conditional(test: SqlExpr, if_true: SqlExpr, if_false: SqlExpr) -> SqlExpr {
    SqlExpr::Conditional {
        test: Box::new(test),
        if_true: Box::new(if_true),
        if_false: Box::new(if_false),
    }
}

// =============================================================================
// Fluent operators
// =============================================================================

/// Operator methods for building expressions fluently.
pub trait ExprExt: Sized {
    fn into_expr(self) -> SqlExpr;

    fn binary(self, op: BinaryOperator, other: impl Into<SqlExpr>) -> SqlExpr {
        SqlExpr::Binary {
            left: Box::new(self.into_expr()),
            op,
            right: Box::new(other.into()),
        }
    }

    // Comparison operators
    fn eq(self, other: impl Into<SqlExpr>) -> SqlExpr {
        self.binary(BinaryOperator::Eq, other)
    }

    fn ne(self, other: impl Into<SqlExpr>) -> SqlExpr {
        self.binary(BinaryOperator::Ne, other)
    }

    fn gt(self, other: impl Into<SqlExpr>) -> SqlExpr {
        self.binary(BinaryOperator::Gt, other)
    }

    fn gte(self, other: impl Into<SqlExpr>) -> SqlExpr {
        self.binary(BinaryOperator::Gte, other)
    }

    fn lt(self, other: impl Into<SqlExpr>) -> SqlExpr {
        self.binary(BinaryOperator::Lt, other)
    }

    fn lte(self, other: impl Into<SqlExpr>) -> SqlExpr {
        self.binary(BinaryOperator::Lte, other)
    }

    // Logical operators
    fn and(self, other: impl Into<SqlExpr>) -> SqlExpr {
        self.binary(BinaryOperator::And, other)
    }

    fn or(self, other: impl Into<SqlExpr>) -> SqlExpr {
        self.binary(BinaryOperator::Or, other)
    }

    fn not(self) -> SqlExpr {
        SqlExpr::Unary {
            op: UnaryOperator::Not,
            expr: Box::new(self.into_expr()),
        }
    }

    // Arithmetic
    fn add(self, other: impl Into<SqlExpr>) -> SqlExpr {
        self.binary(BinaryOperator::Plus, other)
    }

    fn sub(self, other: impl Into<SqlExpr>) -> SqlExpr {
        self.binary(BinaryOperator::Minus, other)
    }

    fn is_null(self) -> SqlExpr {
        SqlExpr::IsNull {
            expr: Box::new(self.into_expr()),
            negated: false,
        }
    }

    fn is_not_null(self) -> SqlExpr {
        SqlExpr::IsNull {
            expr: Box::new(self.into_expr()),
            negated: true,
        }
    }
}

impl ExprExt for SqlExpr {
    fn into_expr(self) -> SqlExpr {
        self
    }
}
