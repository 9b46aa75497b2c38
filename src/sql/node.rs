//! Node kinds of the SQL AST.

use serde::Serialize;

use super::expr::SqlExpr;
use super::query::{DataSource, SqlStatement};

/// The closed set of node kinds a converted tree can contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum NodeType {
    // Expressions
    Literal,
    Parameter,
    Column,
    SelectAlias,
    Binary,
    Unary,
    Function,
    Conditional,
    IsNull,
    InList,
    Exists,
    ScalarSubquery,
    // Data sources
    Table,
    DerivedTable,
    CteReference,
    // Statements
    Query,
    Update,
    Delete,
}

impl SqlExpr {
    pub fn node_type(&self) -> NodeType {
        match self {
            SqlExpr::Literal(_) => NodeType::Literal,
            SqlExpr::Parameter { .. } => NodeType::Parameter,
            SqlExpr::Column(_) => NodeType::Column,
            SqlExpr::SelectAlias(_) => NodeType::SelectAlias,
            SqlExpr::Binary { .. } => NodeType::Binary,
            SqlExpr::Unary { .. } => NodeType::Unary,
            SqlExpr::Function { .. } => NodeType::Function,
            SqlExpr::Conditional { .. } => NodeType::Conditional,
            SqlExpr::IsNull { .. } => NodeType::IsNull,
            SqlExpr::InList { .. } => NodeType::InList,
            SqlExpr::Exists { .. } => NodeType::Exists,
            SqlExpr::Subquery(_) => NodeType::ScalarSubquery,
        }
    }
}

impl DataSource {
    pub fn node_type(&self) -> NodeType {
        match self {
            DataSource::Table(_) => NodeType::Table,
            DataSource::Derived(_) => NodeType::DerivedTable,
            DataSource::CteReference { .. } => NodeType::CteReference,
        }
    }
}

impl SqlStatement {
    pub fn node_type(&self) -> NodeType {
        match self {
            SqlStatement::Query(_) => NodeType::Query,
            SqlStatement::Update(_) => NodeType::Update,
            SqlStatement::Delete(_) => NodeType::Delete,
        }
    }
}
