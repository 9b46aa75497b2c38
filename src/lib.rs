//! # Quarry
//!
//! Turns host query trees into a normalized SQL AST.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │               Host query (QueryExpr / HostExpr)          │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [translation]
//! ┌─────────────────────────────────────────────────────────┐
//! │   QueryBuilder: wrap table, model paths, navigations,   │
//! │   CTE promotion, recursive unions                       │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [postprocess, to a fixed point]
//! ┌─────────────────────────────────────────────────────────┐
//! │   SqlStatement (query / update / delete)                │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! Rendering the AST as SQL text is left to the consumer.

pub mod builder;
pub mod config;
pub mod cte;
pub mod metadata;
pub mod postprocess;
pub mod rewrite;
pub mod sql;
pub mod translation;

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::builder::{ConversionContext, Operation, QueryBuilder, QueryError, QueryResult};
    pub use crate::config::Settings;
    pub use crate::metadata::{EntityMetadata, InMemoryMetadata, MetadataProvider};
    pub use crate::postprocess::{PostprocessOrchestrator, Postprocessor};
    pub use crate::sql::{
        col, exists, lit_bool, lit_int, lit_str, AliasId, DerivedTable, ExprExt, ModelPath,
        SqlExpr, SqlStatement,
    };
    pub use crate::translation::{translate, HostExpr, QueryExpr};
}

pub use builder::{ConversionContext, QueryBuilder};
pub use sql::{SqlExpr, SqlStatement};
pub use translation::translate;
