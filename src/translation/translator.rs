//! Converter dispatch: one arm per host operation, driving the builder.
//!
//! Every operation first converts its source into a [`QueryBuilder`], settles
//! any wrap it forces, then converts its arguments and applies itself through
//! the builder's public methods only. Expressions are converted against the
//! builder of the row they read; enclosing rows (for correlated `Any`
//! subqueries) are passed down as a read-only scope stack.

use super::host::{AggregateFunction, CompareOp, HostExpr, ProjectField, QueryExpr};
use super::{TranslationError, TranslationResult};
use crate::builder::{ColumnRemap, ConversionContext, Operation, QueryBuilder, QueryError};
use crate::cte::{recursive_union, RecursiveSource};
use crate::metadata::MetadataProvider;
use crate::sql::{
    conditional, count_star, exists, func, param, scalar_subquery, DataSource, ExprExt, JoinKind,
    Literal, ModelPath, OrderByExpr, SelectColumn, SqlExpr,
};

/// Walks a host query once, bottom-up.
pub struct Translator<'a> {
    provider: &'a dyn MetadataProvider,
    /// Innermost last; `RecursiveSelf` reads the top.
    recursive: Vec<RecursiveSource>,
}

impl<'a> Translator<'a> {
    pub fn new(provider: &'a dyn MetadataProvider) -> Self {
        Self {
            provider,
            recursive: Vec::new(),
        }
    }

    /// Convert `query` into a live builder. `outer` holds the rows of the
    /// enclosing queries, innermost last.
    pub fn convert_query(
        &mut self,
        ctx: &mut ConversionContext,
        query: &QueryExpr,
        outer: &[&QueryBuilder],
    ) -> TranslationResult<QueryBuilder> {
        match query {
            QueryExpr::Source { entity } => {
                Ok(QueryBuilder::from_table(ctx, self.provider, entity)?)
            }

            QueryExpr::Filter { source, predicate } => {
                let mut builder = self.convert_query(ctx, source, outer)?;
                builder.prepare_for(ctx, Operation::Where)?;
                let predicate = self.convert_expr(ctx, predicate, &mut builder, outer)?;
                builder.apply_where(ctx, predicate, false)?;
                Ok(builder)
            }

            QueryExpr::Project { source, fields } => {
                let mut builder = self.convert_query(ctx, source, outer)?;
                builder.prepare_for(ctx, Operation::Select)?;
                let columns = self.convert_fields(ctx, fields, &mut builder, outer)?;
                builder.apply_projection(ctx, columns)?;
                Ok(builder)
            }

            QueryExpr::Join {
                outer: outer_query,
                inner,
                outer_key,
                inner_key,
                outer_name,
                inner_name,
                left,
            } => self.convert_join(
                ctx,
                outer_query,
                inner,
                (outer_key, inner_key),
                (outer_name, inner_name),
                *left,
                outer,
            ),

            QueryExpr::GroupBy {
                source,
                keys,
                aggregates,
            } => {
                let mut builder = self.convert_query(ctx, source, outer)?;
                builder.prepare_for(ctx, Operation::GroupBy)?;
                let mut group_keys = Vec::with_capacity(keys.len());
                for key in keys {
                    group_keys.push(self.convert_expr(ctx, &key.expr, &mut builder, outer)?);
                }
                builder.apply_group_by(ctx, group_keys)?;

                // Converted after grouping so they see any wrap it caused.
                let fields: Vec<ProjectField> = keys.iter().chain(aggregates).cloned().collect();
                let columns = self.convert_fields(ctx, &fields, &mut builder, outer)?;
                builder.apply_projection(ctx, columns)?;
                Ok(builder)
            }

            QueryExpr::OrderBy {
                source,
                key,
                descending,
                then_by,
            } => {
                let mut builder = self.convert_query(ctx, source, outer)?;
                builder.prepare_for(ctx, Operation::OrderBy)?;
                let expr = self.convert_expr(ctx, key, &mut builder, outer)?;
                let item = if *descending {
                    OrderByExpr::desc(expr)
                } else {
                    OrderByExpr::asc(expr)
                };
                builder.apply_order_by(ctx, vec![item], *then_by)?;
                Ok(builder)
            }

            QueryExpr::Take { source, count } => {
                let mut builder = self.convert_query(ctx, source, outer)?;
                // Skip(n).Take(m) is a page, not a TOP over the offset rows.
                let paging = builder.last_operation() == Some(Operation::RowOffset);
                let op = if paging {
                    Operation::RowsPerPage
                } else {
                    Operation::Top
                };
                builder.prepare_for(ctx, op)?;
                let count = self.convert_expr(ctx, count, &mut builder, outer)?;
                if paging {
                    builder.apply_rows_per_page(ctx, count)?;
                } else {
                    builder.apply_top(ctx, count)?;
                }
                Ok(builder)
            }

            QueryExpr::Skip { source, count } => {
                let mut builder = self.convert_query(ctx, source, outer)?;
                builder.prepare_for(ctx, Operation::RowOffset)?;
                let count = self.convert_expr(ctx, count, &mut builder, outer)?;
                builder.apply_row_offset(ctx, count)?;
                Ok(builder)
            }

            QueryExpr::Distinct { source } => {
                let mut builder = self.convert_query(ctx, source, outer)?;
                builder.apply_distinct(ctx)?;
                Ok(builder)
            }

            QueryExpr::Union { left, right, all } => {
                let mut builder = self.convert_query(ctx, left, outer)?;
                let branch = self.convert_query(ctx, right, outer)?.close(ctx)?;
                builder.apply_union(ctx, branch, *all)?;
                Ok(builder)
            }

            QueryExpr::RecursiveUnion { anchor, recursive } => {
                let anchor = self.convert_query(ctx, anchor, outer)?;
                recursive_union(ctx, anchor, |ctx, source| {
                    self.recursive.push(source.clone());
                    let member = self.convert_query(ctx, recursive, outer);
                    self.recursive.pop();
                    member
                })
            }

            QueryExpr::RecursiveSelf => {
                let source = self
                    .recursive
                    .last()
                    .ok_or(TranslationError::RecursiveSelfOutsideRecursion)?;
                let data_source = source.data_source(ctx, ModelPath::empty());
                Ok(QueryBuilder::new(ctx, data_source)?)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn convert_join(
        &mut self,
        ctx: &mut ConversionContext,
        outer_query: &QueryExpr,
        inner: &QueryExpr,
        (outer_key, inner_key): (&HostExpr, &HostExpr),
        (outer_name, inner_name): (&String, &String),
        left: bool,
        outer: &[&QueryBuilder],
    ) -> TranslationResult<QueryBuilder> {
        if inner_name.is_empty() || outer_name == inner_name {
            return Err(QueryError::InvalidArgument(format!(
                "join sides need distinct names, got '{}' and '{}'",
                outer_name, inner_name
            ))
            .into());
        }

        let mut builder = self.convert_query(ctx, outer_query, outer)?;
        let outer_path = ModelPath::parse(outer_name);
        builder.reshape(&ModelPath::empty(), &outer_path);

        let mut inner_builder = self.convert_query(ctx, inner, outer)?;
        let inner_key = self.convert_expr(ctx, inner_key, &mut inner_builder, outer)?;
        let bare = inner_builder.unit().is_bare_source();
        let mut source = inner_builder.into_data_source(ctx)?;
        let inner_key = match &source.source {
            DataSource::Derived(unit) if !bare => {
                ColumnRemap::for_projection(unit, source.alias).apply(inner_key)
            }
            _ => inner_key,
        };
        source.model_path = ModelPath::parse(inner_name);

        // May wrap; the outer key is resolved afterwards, under its new name.
        let alias = builder.add_data_source(ctx, source)?;
        let outer_key = self.convert_expr(
            ctx,
            &outer_key.with_prefix(outer_name),
            &mut builder,
            outer,
        )?;

        let kind = if left { JoinKind::Left } else { JoinKind::Inner };
        builder.apply_join(alias, kind, Some(outer_key.eq(inner_key)))?;
        Ok(builder)
    }

    fn convert_fields(
        &mut self,
        ctx: &mut ConversionContext,
        fields: &[ProjectField],
        builder: &mut QueryBuilder,
        outer: &[&QueryBuilder],
    ) -> TranslationResult<Vec<SelectColumn>> {
        let mut columns = Vec::with_capacity(fields.len());
        for field in fields {
            columns.push(SelectColumn {
                expr: self.convert_expr(ctx, &field.expr, builder, outer)?,
                alias: String::new(),
                model_path: ModelPath::parse(&field.name),
            });
        }
        Ok(columns)
    }

    /// Column for `path` on the current row, joining to-one navigations the
    /// path walks through if needed.
    fn member(
        &mut self,
        ctx: &mut ConversionContext,
        builder: &mut QueryBuilder,
        path: &ModelPath,
    ) -> TranslationResult<SqlExpr> {
        if let Ok(expr) = builder.resolve_member(path) {
            return Ok(expr);
        }

        let mut reached = ModelPath::empty();
        for segment in path.parent().segments() {
            let next = reached.child(segment);
            if builder.resolve_source(&next).is_none() {
                builder.navigate(ctx, self.provider, &reached, segment)?;
            }
            reached = next;
        }
        Ok(builder.resolve_member(path)?)
    }

    pub fn convert_expr(
        &mut self,
        ctx: &mut ConversionContext,
        expr: &HostExpr,
        builder: &mut QueryBuilder,
        outer: &[&QueryBuilder],
    ) -> TranslationResult<SqlExpr> {
        Ok(match expr {
            HostExpr::Member { path } => self.member(ctx, builder, &ModelPath::parse(path))?,

            HostExpr::OuterMember { depth, path } => {
                let scope = outer
                    .len()
                    .checked_sub(*depth)
                    .filter(|_| *depth > 0)
                    .and_then(|i| outer.get(i))
                    .ok_or_else(|| TranslationError::UnresolvedOuterMember {
                        depth: *depth,
                        path: path.clone(),
                    })?;
                scope.resolve_member(&ModelPath::parse(path))?
            }

            HostExpr::Literal { value } => SqlExpr::Literal(Literal::from(value.clone())),

            HostExpr::Parameter { name, value } => param(name, Literal::from(value.clone())),

            HostExpr::Compare { op, left, right } => {
                let left = self.convert_expr(ctx, left, builder, outer)?;
                let right = self.convert_expr(ctx, right, builder, outer)?;
                let null_left = matches!(left, SqlExpr::Literal(Literal::Null));
                let null_right = matches!(right, SqlExpr::Literal(Literal::Null));
                match op {
                    // Equality with NULL is IS NULL in SQL.
                    CompareOp::Eq | CompareOp::Ne if null_left || null_right => {
                        let operand = if null_right { left } else { right };
                        if *op == CompareOp::Eq {
                            operand.is_null()
                        } else {
                            operand.is_not_null()
                        }
                    }
                    _ => left.binary((*op).into(), right),
                }
            }

            HostExpr::And { left, right } => {
                let left = self.convert_expr(ctx, left, builder, outer)?;
                left.and(self.convert_expr(ctx, right, builder, outer)?)
            }

            HostExpr::Or { left, right } => {
                let left = self.convert_expr(ctx, left, builder, outer)?;
                left.or(self.convert_expr(ctx, right, builder, outer)?)
            }

            HostExpr::Not { operand } => self.convert_expr(ctx, operand, builder, outer)?.not(),

            HostExpr::Arithmetic { op, left, right } => {
                let left = self.convert_expr(ctx, left, builder, outer)?;
                left.binary((*op).into(), self.convert_expr(ctx, right, builder, outer)?)
            }

            HostExpr::IsNull { operand, negated } => SqlExpr::IsNull {
                expr: Box::new(self.convert_expr(ctx, operand, builder, outer)?),
                negated: *negated,
            },

            HostExpr::Any { source, predicate } => {
                let mut scopes: Vec<&QueryBuilder> = outer.to_vec();
                scopes.push(&*builder);

                let mut inner = self.convert_query(ctx, source, &scopes)?;
                if let Some(predicate) = predicate {
                    let condition = self.convert_expr(ctx, predicate, &mut inner, &scopes)?;
                    inner.apply_where(ctx, condition, false)?;
                }
                exists(inner.close(ctx)?)
            }

            HostExpr::Scalar { source } => {
                let mut scopes: Vec<&QueryBuilder> = outer.to_vec();
                scopes.push(&*builder);

                let unit = self.convert_query(ctx, source, &scopes)?.close(ctx)?;
                if unit.output_columns().len() != 1 {
                    return Err(TranslationError::UnsupportedExpression(format!(
                        "scalar subquery yields {} columns",
                        unit.output_columns().len()
                    )));
                }
                scalar_subquery(unit)
            }

            HostExpr::Conditional {
                test,
                if_true,
                if_false,
            } => conditional(
                self.convert_expr(ctx, test, builder, outer)?,
                self.convert_expr(ctx, if_true, builder, outer)?,
                self.convert_expr(ctx, if_false, builder, outer)?,
            ),

            HostExpr::Aggregate { function, operand } => {
                let operand = match operand {
                    Some(operand) => Some(self.convert_expr(ctx, operand, builder, outer)?),
                    None => None,
                };
                match (function, operand) {
                    (AggregateFunction::Count, None) => count_star(),
                    (function, Some(operand)) => func(function.sql_name(), vec![operand]),
                    (function, None) => {
                        return Err(TranslationError::UnsupportedExpression(format!(
                            "{} needs an operand",
                            function.sql_name()
                        )))
                    }
                }
            }
        })
    }
}
