//! Recursive UNION ALL construction.
//!
//! ```text
//! WITH r AS (
//!     <anchor>
//!     UNION ALL
//!     <recursive member, reading r>
//! )
//! SELECT ... FROM r
//! ```

use super::scope::check_cte_body;
use crate::builder::{ConversionContext, QueryBuilder, QueryError};
use crate::sql::{
    AliasId, AliasedDataSource, CteColumn, CteDefinition, DataSource, DerivedTable, ModelPath,
    UnionBranch,
};

/// The accumulating result set, as seen by the recursive member.
#[derive(Debug, Clone, PartialEq)]
pub struct RecursiveSource {
    cte: AliasId,
    columns: Vec<CteColumn>,
}

impl RecursiveSource {
    pub fn cte_alias(&self) -> AliasId {
        self.cte
    }

    pub fn columns(&self) -> &[CteColumn] {
        &self.columns
    }

    /// A fresh reference to the CTE, bound to the body under construction.
    pub fn data_source(&self, ctx: &mut ConversionContext, model_path: ModelPath) -> AliasedDataSource {
        let alias = ctx.allocate_alias("recursive");
        ctx.register_cte_alias(alias);
        AliasedDataSource::new(
            alias,
            DataSource::CteReference {
                cte: self.cte,
                columns: self.columns.clone(),
            },
        )
        .with_model_path(model_path)
    }
}

fn cte_columns(unit: &DerivedTable) -> Vec<CteColumn> {
    unit.output_columns()
        .iter()
        .map(|c| CteColumn {
            name: c.alias.clone(),
            model_path: c.model_path.clone(),
        })
        .collect()
}

/// Combine `anchor` and the member built by `recursive_member` into one
/// recursive CTE and return a builder reading from it.
///
/// The member must project as many columns as the anchor and may only read
/// its own sources, the [`RecursiveSource`] included. Callers with their own
/// error type can fail from inside `recursive_member`.
pub fn recursive_union<F, E>(
    ctx: &mut ConversionContext,
    mut anchor: QueryBuilder,
    recursive_member: F,
) -> Result<QueryBuilder, E>
where
    F: FnOnce(&mut ConversionContext, &RecursiveSource) -> Result<QueryBuilder, E>,
    E: From<QueryError>,
{
    anchor.mark_cte_body();
    let mut anchor = anchor.close(ctx)?;
    check_cte_body(&anchor)?;

    let columns = cte_columns(&anchor);
    let source = RecursiveSource {
        cte: ctx.allocate_alias("cte"),
        columns: columns.clone(),
    };

    ctx.begin_cte_scope();
    let member = recursive_member(ctx, &source);
    ctx.end_cte_scope();

    let mut member = member?;
    member.mark_cte_body();
    let member = member.close(ctx)?;

    let left = anchor.output_columns().len();
    let right = member.output_columns().len();
    if left != right {
        return Err(QueryError::UnionShapeMismatch { left, right }.into());
    }
    check_cte_body(&member)?;

    anchor.unions.push(UnionBranch {
        all: true,
        query: member,
    });

    let reference = ctx.allocate_alias("cte");
    let mut builder = QueryBuilder::new(
        ctx,
        AliasedDataSource::new(
            reference,
            DataSource::CteReference {
                cte: source.cte,
                columns,
            },
        ),
    )?;
    builder.unit.ctes.push(CteDefinition {
        alias: source.cte,
        body: anchor,
        recursive: true,
    });

    log::debug!(
        "Built recursive CTE {} read as {}",
        ctx.alias_name(source.cte),
        ctx.alias_name(reference)
    );
    Ok(builder)
}
