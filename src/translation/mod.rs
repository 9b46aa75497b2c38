//! Translation of host queries into normalized SQL statements.
//!
//! ```ignore
//! let metadata = InMemoryMetadata::from_file("metadata.toml")?;
//! let query: QueryExpr = serde_json::from_str(&json)?;
//! let statement = translate(&query, &metadata, &Settings::default())?;
//! ```

mod host;
mod translator;

use thiserror::Error;

pub use host::{
    AggregateFunction, ArithmeticOp, CompareOp, HostExpr, HostLiteral, ProjectField, QueryExpr,
};
pub use translator::Translator;

use crate::builder::{ConversionContext, QueryError};
use crate::config::Settings;
use crate::metadata::MetadataProvider;
use crate::postprocess::{PostprocessError, PostprocessOrchestrator};
use crate::sql::{DerivedTable, SqlStatement};

/// Translation error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TranslationError {
    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Postprocess(#[from] PostprocessError),

    #[error("Outer member '{path}' at depth {depth} has no enclosing query")]
    UnresolvedOuterMember { depth: usize, path: String },

    #[error("Recursive self-reference outside a recursive union")]
    RecursiveSelfOutsideRecursion,

    #[error("Unsupported expression: {0}")]
    UnsupportedExpression(String),
}

pub type TranslationResult<T> = Result<T, TranslationError>;

/// Build the unit for `query` without postprocessing it.
pub fn build_unit(
    ctx: &mut ConversionContext,
    query: &QueryExpr,
    provider: &dyn MetadataProvider,
) -> TranslationResult<DerivedTable> {
    let builder = Translator::new(provider).convert_query(ctx, query, &[])?;
    Ok(builder.close(ctx)?)
}

/// Translate `query` and run the postprocessing pipeline over the result.
pub fn translate(
    query: &QueryExpr,
    provider: &dyn MetadataProvider,
    settings: &Settings,
) -> TranslationResult<SqlStatement> {
    let mut ctx = ConversionContext::with_settings(settings);
    let unit = build_unit(&mut ctx, query, provider)?;
    log::debug!(
        "Built unit over {} using {} aliases",
        ctx.alias_name(unit.from.alias),
        ctx.aliases().allocated()
    );

    let outcome = PostprocessOrchestrator::from_settings(settings).run(SqlStatement::Query(unit))?;
    Ok(outcome.statement)
}
