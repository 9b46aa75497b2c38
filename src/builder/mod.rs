//! Query builder - construct one SELECT-shaped unit clause by clause.
//!
//! Converters drive a [`QueryBuilder`] through its `apply_*` methods. The
//! builder remembers the last clause it applied and, when the next clause
//! cannot legally sit in the same SELECT (see [`Operation::requires_wrap`]),
//! nests the current unit inside a derived table first and redirects the
//! incoming expressions to the wrapper's columns.
//!
//! ```ignore
//! let mut ctx = ConversionContext::new();
//! let mut query = QueryBuilder::from_table(&mut ctx, &metadata, "Customer")?;
//! let name = query.resolve_member(&ModelPath::parse("Name"))?;
//! query.apply_where(&mut ctx, name.eq("Ada"), false)?;
//! let unit = query.close(&mut ctx)?;
//! ```

mod context;
mod navigation;
mod operation;
mod projection;
mod remap;

use std::collections::HashMap;
use thiserror::Error;

pub use context::ConversionContext;
pub use operation::Operation;
pub use projection::{auto_projection_columns, ColumnNames};
pub use remap::ColumnRemap;

use crate::metadata::MetadataProvider;
use crate::sql::visit::free_aliases;
use crate::sql::{
    lit_int, AliasId, AliasedDataSource, Assignment, CteColumn, CteDefinition, DataSource,
    DeleteStatement, DerivedTable, FilterPredicate, Join, JoinKind, ModelPath, OrderByExpr,
    SelectColumn, SqlExpr, SqlStatement, UnionBranch, UpdateStatement,
};

/// Errors raised while building a unit.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueryError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unknown entity: {0}")]
    UnknownEntity(String),

    #[error("Data source {0} is already attached to a query")]
    DataSourceAlreadyAttached(AliasId),

    #[error("Data source {0} is not part of this query")]
    UnknownDataSource(AliasId),

    #[error("{clause} has already been applied to this query")]
    ClauseAlreadySet { clause: Operation },

    #[error("Data source {0} is not a table and cannot be updated or deleted")]
    NotATableTarget(AliasId),

    #[error("Reference to {alias} crosses a CTE scope boundary")]
    IllegalCteReference { alias: AliasId },

    #[error("Cannot resolve member '{path}'")]
    UnresolvedMember { path: ModelPath },

    #[error("Navigation '{member}' on '{entity}' is not a to-one relationship")]
    NotAToOneNavigation { entity: String, member: String },

    #[error("Union branches have different column counts ({left} vs {right})")]
    UnionShapeMismatch { left: usize, right: usize },
}

pub type QueryResult<T> = Result<T, QueryError>;

/// Stateful builder for one unit.
#[derive(Debug, Clone)]
#[must_use = "builders have no effect until closed"]
pub struct QueryBuilder {
    pub(crate) unit: DerivedTable,
    last_operation: Option<Operation>,
    /// Navigation joins already attached, by the member path they reach.
    navigations: HashMap<ModelPath, AliasId>,
}

impl QueryBuilder {
    /// Start a unit reading from `source`.
    pub fn new(ctx: &mut ConversionContext, source: AliasedDataSource) -> QueryResult<Self> {
        ctx.attach(source.alias)?;
        Ok(Self {
            unit: DerivedTable::new(source),
            last_operation: None,
            navigations: HashMap::new(),
        })
    }

    /// Start a unit reading the table mapped from `entity`.
    pub fn from_table(
        ctx: &mut ConversionContext,
        provider: &dyn MetadataProvider,
        entity: &str,
    ) -> QueryResult<Self> {
        let source = ctx.table_source(provider, entity)?;
        Self::new(ctx, source)
    }

    pub fn unit(&self) -> &DerivedTable {
        &self.unit
    }

    pub fn last_operation(&self) -> Option<Operation> {
        self.last_operation
    }

    pub fn initial_alias(&self) -> AliasId {
        self.unit.from.alias
    }

    pub fn is_cte(&self) -> bool {
        self.unit.is_cte
    }

    /// Flag the unit as a CTE body. Clauses applied afterwards may not read
    /// another CTE body's sources; they fail instead of promoting.
    pub fn mark_cte_body(&mut self) {
        self.unit.is_cte = true;
    }

    /// Auto-project if needed and hand out the finished unit.
    pub fn close(mut self, ctx: &mut ConversionContext) -> QueryResult<DerivedTable> {
        self.apply_auto_projection(ctx, false)?;
        Ok(self.unit)
    }

    /// Close into a data source another unit can read from. A bare table is
    /// handed over as is, without a derived table around it.
    pub fn into_data_source(self, ctx: &mut ConversionContext) -> QueryResult<AliasedDataSource> {
        if self.unit.is_bare_source() {
            ctx.detach(self.unit.from.alias);
            let mut source = self.unit.from;
            source.model_path = ModelPath::empty();
            return Ok(source);
        }
        let unit = self.close(ctx)?;
        Ok(ctx.derived_source(unit))
    }

    // =========================================================================
    // Nesting
    // =========================================================================

    /// Swap the live unit for a fresh one reading from `from`; returns the old unit.
    fn take_unit(&mut self, from: AliasedDataSource) -> DerivedTable {
        self.last_operation = None;
        self.navigations.clear();
        std::mem::replace(&mut self.unit, DerivedTable::new(from))
    }

    /// Nest the whole unit inside a derived table and read from it.
    ///
    /// The returned remap redirects expressions over the old projection to
    /// the wrapper's columns.
    pub fn wrap_in_subquery(&mut self, ctx: &mut ConversionContext) -> QueryResult<ColumnRemap> {
        self.apply_auto_projection(ctx, true)?;

        let alias = ctx.allocate_alias("derived");
        let remap = ColumnRemap::for_projection(&self.unit, alias);

        // Placeholder source, replaced by the old unit below.
        let placeholder = DataSource::CteReference {
            cte: alias,
            columns: Vec::new(),
        };
        let inner = self.take_unit(AliasedDataSource::new(alias, placeholder));
        self.unit.from.source = DataSource::Derived(Box::new(inner));
        ctx.attach(alias)?;

        log::debug!("Wrapped unit in derived table {}", ctx.alias_name(alias));
        Ok(remap)
    }

    /// Turn the unit into a CTE body and continue from a reference to it.
    pub fn make_cte(&mut self, ctx: &mut ConversionContext) -> QueryResult<ColumnRemap> {
        self.apply_auto_projection(ctx, true)?;

        let cte = ctx.allocate_alias("cte");
        let reference = ctx.allocate_alias("cte");
        let columns = self
            .unit
            .output_columns()
            .iter()
            .map(|c| CteColumn {
                name: c.alias.clone(),
                model_path: c.model_path.clone(),
            })
            .collect();
        let remap = ColumnRemap::for_projection(&self.unit, reference);

        let mut body = self.take_unit(AliasedDataSource::new(
            reference,
            DataSource::CteReference { cte, columns },
        ));
        ctx.attach(reference)?;

        body.is_cte = true;
        self.unit.ctes = std::mem::take(&mut body.ctes);
        self.unit.ctes.push(CteDefinition {
            alias: cte,
            body,
            recursive: false,
        });

        log::debug!("Promoted unit to CTE {}", ctx.alias_name(cte));
        Ok(remap)
    }

    /// First alias `incoming` reads from a CTE body under construction while
    /// not being one of this unit's sources.
    fn cross_scope_reference(
        &self,
        ctx: &ConversionContext,
        incoming: &[&SqlExpr],
    ) -> Option<AliasId> {
        if ctx.cte_depth() == 0 {
            return None;
        }
        let declared = self.unit.declared_aliases();
        incoming
            .iter()
            .flat_map(|expr| free_aliases(expr))
            .find(|alias| !declared.contains(alias) && ctx.is_cte_scoped(*alias))
    }

    /// Wrap now if `op` would force a wrap, so that members read by its
    /// arguments resolve, and navigate, against the unit `op` lands in.
    pub fn prepare_for(&mut self, ctx: &mut ConversionContext, op: Operation) -> QueryResult<()> {
        if Operation::requires_wrap(self.last_operation, op) {
            log::trace!("{:?} -> {} wraps before its arguments", self.last_operation, op);
            self.wrap_in_subquery(ctx)?;
        }
        Ok(())
    }

    /// Promote or wrap as `op` requires before it is applied.
    fn prepare(
        &mut self,
        ctx: &mut ConversionContext,
        op: Operation,
        incoming: &[&SqlExpr],
    ) -> QueryResult<ColumnRemap> {
        if let Some(alias) = self.cross_scope_reference(ctx, incoming) {
            if self.unit.is_cte {
                return Err(QueryError::IllegalCteReference { alias });
            }
            return self.make_cte(ctx);
        }

        if Operation::requires_wrap(self.last_operation, op) {
            log::trace!("{:?} -> {} requires a wrap", self.last_operation, op);
            return self.wrap_in_subquery(ctx);
        }

        Ok(ColumnRemap::identity())
    }

    // =========================================================================
    // Joins
    // =========================================================================

    /// Attach `source` as a cross join; narrow it with [`Self::apply_join`].
    pub fn add_data_source(
        &mut self,
        ctx: &mut ConversionContext,
        source: AliasedDataSource,
    ) -> QueryResult<AliasId> {
        self.prepare(ctx, Operation::Join, &[])?;
        ctx.attach(source.alias)?;

        let alias = source.alias;
        self.unit.joins.push(Join {
            kind: JoinKind::Cross,
            source,
            condition: None,
            navigation: false,
        });
        self.last_operation = Some(Operation::Join);
        Ok(alias)
    }

    /// Set the kind and condition of the join that attached `alias`.
    pub fn apply_join(
        &mut self,
        alias: AliasId,
        kind: JoinKind,
        condition: Option<SqlExpr>,
    ) -> QueryResult<()> {
        let join = self
            .unit
            .joins
            .iter_mut()
            .find(|j| j.source.alias == alias)
            .ok_or(QueryError::UnknownDataSource(alias))?;

        if matches!(kind, JoinKind::Inner | JoinKind::Left) && condition.is_none() {
            return Err(QueryError::InvalidArgument(format!(
                "{:?} join requires a condition",
                kind
            )));
        }

        join.kind = kind;
        join.condition = condition;
        Ok(())
    }

    // =========================================================================
    // Clauses
    // =========================================================================

    /// Add a filter. Goes to HAVING once the unit is grouped.
    pub fn apply_where(
        &mut self,
        ctx: &mut ConversionContext,
        predicate: SqlExpr,
        use_or: bool,
    ) -> QueryResult<()> {
        let remap = self.prepare(ctx, Operation::Where, &[&predicate])?;
        let filter = FilterPredicate {
            predicate: remap.apply(predicate),
            use_or,
        };

        if self.unit.group_by.is_some() {
            self.unit.having.push(filter);
        } else {
            self.unit.filters.push(filter);
        }
        self.last_operation = Some(Operation::Where);
        Ok(())
    }

    /// Set the projection. Blank aliases are named after the column's model
    /// path; colliding names get a numeric suffix.
    pub fn apply_projection(
        &mut self,
        ctx: &mut ConversionContext,
        columns: Vec<SelectColumn>,
    ) -> QueryResult<()> {
        if columns.is_empty() {
            return Err(QueryError::InvalidArgument(
                "projection needs at least one column".to_string(),
            ));
        }
        for (i, column) in columns.iter().enumerate() {
            if columns[..i].iter().any(|c| c.model_path == column.model_path) {
                return Err(QueryError::InvalidArgument(format!(
                    "projection maps '{}' twice",
                    column.model_path
                )));
            }
        }

        let incoming: Vec<&SqlExpr> = columns.iter().map(|c| &c.expr).collect();
        let remap = self.prepare(ctx, Operation::Select, &incoming)?;

        // ORDER BY entries pointing at the outgoing projection go back to
        // the expressions they named.
        if let Some(previous) = &self.unit.projection {
            for order in &mut self.unit.order_by {
                if let SqlExpr::SelectAlias(name) = &order.expr {
                    if let Some(column) = previous.iter().find(|c| &c.alias == name) {
                        order.expr = column.expr.clone();
                    }
                }
            }
        }

        let mut names = ColumnNames::new(ctx.collision_separator());
        let projection = columns
            .into_iter()
            .map(|column| {
                let requested = if column.alias.is_empty() {
                    column.model_path.last().unwrap_or("Column").to_string()
                } else {
                    column.alias
                };
                SelectColumn {
                    expr: remap.apply(column.expr),
                    alias: names.claim(&requested),
                    model_path: column.model_path,
                }
            })
            .collect();

        self.unit.projection = Some(projection);
        self.unit.auto_projection = false;
        self.last_operation = Some(Operation::Select);
        Ok(())
    }

    pub fn apply_group_by(
        &mut self,
        ctx: &mut ConversionContext,
        keys: Vec<SqlExpr>,
    ) -> QueryResult<()> {
        if keys.is_empty() {
            return Err(QueryError::InvalidArgument(
                "GROUP BY needs at least one key".to_string(),
            ));
        }

        let incoming: Vec<&SqlExpr> = keys.iter().collect();
        let remap = self.prepare(ctx, Operation::GroupBy, &incoming)?;
        if self.unit.group_by.is_some() {
            return Err(QueryError::ClauseAlreadySet {
                clause: Operation::GroupBy,
            });
        }

        self.unit.group_by = Some(keys.into_iter().map(|k| remap.apply(k)).collect());
        self.last_operation = Some(Operation::GroupBy);
        Ok(())
    }

    /// Order by `items`. With `then_by` the items refine the existing order;
    /// otherwise they replace it.
    pub fn apply_order_by(
        &mut self,
        ctx: &mut ConversionContext,
        items: Vec<OrderByExpr>,
        then_by: bool,
    ) -> QueryResult<()> {
        let incoming: Vec<&SqlExpr> = items.iter().map(|o| &o.expr).collect();
        let remap = self.prepare(ctx, Operation::OrderBy, &incoming)?;

        let items: Vec<OrderByExpr> = items
            .into_iter()
            .map(|item| {
                let expr = remap.apply(item.expr);
                let expr = match self
                    .unit
                    .projection
                    .as_ref()
                    .and_then(|p| p.iter().find(|c| c.expr == expr))
                {
                    Some(column) => SqlExpr::SelectAlias(column.alias.clone()),
                    None => expr,
                };
                OrderByExpr {
                    expr,
                    descending: item.descending,
                }
            })
            .collect();

        if !then_by {
            self.unit.order_by.clear();
        }
        self.unit.order_by.extend(items);
        self.last_operation = Some(Operation::OrderBy);
        Ok(())
    }

    pub fn apply_top(&mut self, ctx: &mut ConversionContext, count: SqlExpr) -> QueryResult<()> {
        let remap = self.prepare(ctx, Operation::Top, &[&count])?;
        if self.unit.top.is_some() {
            return Err(QueryError::ClauseAlreadySet {
                clause: Operation::Top,
            });
        }
        self.unit.top = Some(remap.apply(count));
        self.last_operation = Some(Operation::Top);
        Ok(())
    }

    pub fn apply_distinct(&mut self, ctx: &mut ConversionContext) -> QueryResult<()> {
        self.prepare(ctx, Operation::Distinct, &[])?;
        if self.unit.distinct {
            return Err(QueryError::ClauseAlreadySet {
                clause: Operation::Distinct,
            });
        }
        self.unit.distinct = true;
        self.last_operation = Some(Operation::Distinct);
        Ok(())
    }

    pub fn apply_row_offset(
        &mut self,
        ctx: &mut ConversionContext,
        offset: SqlExpr,
    ) -> QueryResult<()> {
        let remap = self.prepare(ctx, Operation::RowOffset, &[&offset])?;
        if self.unit.row_offset.is_some() {
            return Err(QueryError::ClauseAlreadySet {
                clause: Operation::RowOffset,
            });
        }
        self.unit.row_offset = Some(remap.apply(offset));
        self.ensure_order();
        self.last_operation = Some(Operation::RowOffset);
        Ok(())
    }

    pub fn apply_rows_per_page(
        &mut self,
        ctx: &mut ConversionContext,
        count: SqlExpr,
    ) -> QueryResult<()> {
        let remap = self.prepare(ctx, Operation::RowsPerPage, &[&count])?;
        if self.unit.rows_per_page.is_some() {
            return Err(QueryError::ClauseAlreadySet {
                clause: Operation::RowsPerPage,
            });
        }
        self.unit.rows_per_page = Some(remap.apply(count));
        self.ensure_order();
        self.last_operation = Some(Operation::RowsPerPage);
        Ok(())
    }

    /// Paging needs a deterministic order; fall back to `ORDER BY 1`.
    fn ensure_order(&mut self) {
        if self.unit.order_by.is_empty() {
            self.unit.order_by.push(OrderByExpr::asc(lit_int(1)));
        }
    }

    /// Append a UNION branch. The branch must be closed and match this
    /// unit's column count.
    pub fn apply_union(
        &mut self,
        ctx: &mut ConversionContext,
        other: DerivedTable,
        all: bool,
    ) -> QueryResult<()> {
        if other.projection.is_none() {
            return Err(QueryError::InvalidArgument(
                "union branch must be closed".to_string(),
            ));
        }
        self.prepare(ctx, Operation::Union, &[])?;
        self.apply_auto_projection(ctx, false)?;

        let left = self.unit.output_columns().len();
        let right = other.output_columns().len();
        if left != right {
            return Err(QueryError::UnionShapeMismatch { left, right });
        }

        self.unit.unions.push(UnionBranch { all, query: other });
        self.last_operation = Some(Operation::Union);
        Ok(())
    }

    // =========================================================================
    // Statements
    // =========================================================================

    fn table_target(&self, target: AliasId) -> QueryResult<()> {
        let source = self
            .unit
            .find_source(target)
            .ok_or(QueryError::UnknownDataSource(target))?;
        if source.table().is_none() {
            return Err(QueryError::NotATableTarget(target));
        }
        Ok(())
    }

    /// UPDATE `target` with `assignments` for every row of the unit.
    pub fn into_update(
        self,
        target: AliasId,
        assignments: Vec<Assignment>,
    ) -> QueryResult<SqlStatement> {
        if assignments.is_empty() {
            return Err(QueryError::InvalidArgument(
                "UPDATE needs at least one assignment".to_string(),
            ));
        }
        self.table_target(target)?;
        Ok(SqlStatement::Update(UpdateStatement {
            query: self.unit,
            target,
            assignments,
        }))
    }

    /// DELETE the rows of `target` selected by the unit.
    pub fn into_delete(self, target: AliasId) -> QueryResult<SqlStatement> {
        self.table_target(target)?;
        Ok(SqlStatement::Delete(DeleteStatement {
            query: self.unit,
            target,
        }))
    }
}
