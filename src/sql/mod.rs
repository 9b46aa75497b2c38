//! SQL AST module.
//!
//! The normalized tree every conversion produces:
//!
//! - [`alias`] - data source identities and their generator
//! - [`model_path`] - member paths that tag columns and sources
//! - [`expr`] - expression AST and builder DSL
//! - [`query`] - derived tables, data sources, clauses and statements
//! - [`node`] - the closed set of node kinds
//! - [`visit`] - owned rewriting and read-only visiting

pub mod alias;
pub mod expr;
pub mod model_path;
pub mod node;
pub mod query;
pub mod visit;

pub use alias::{AliasGenerator, AliasId};
pub use expr::{
    col, conditional, count_star, exists, func, lit_bool, lit_float, lit_int, lit_null, lit_str,
    not_exists, param, scalar_subquery, BinaryOperator, ColumnRef, ExprExt, Literal, SqlExpr,
    UnaryOperator,
};
pub use model_path::ModelPath;
pub use node::NodeType;
pub use query::{
    combine_filters, entry_under_or, AliasedDataSource, Assignment, CteColumn, CteDefinition, DataSource,
    DeleteStatement, DerivedTable, FilterPredicate, Join, JoinKind, OrderByExpr, SelectColumn,
    SqlStatement, TableColumn, TableSource, UnionBranch, UpdateStatement,
};
pub use visit::{SqlRewriter, SqlVisitor, Transformed};
