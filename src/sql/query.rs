//! Derived tables: the SELECT-shaped unit every conversion builds.
//!
//! A [`DerivedTable`] owns its data sources, its clauses and any CTEs defined
//! for it. Nesting is expressed by ownership: a wrapped unit lives inside the
//! [`DataSource::Derived`] of its wrapper, a subquery inside its expression.

use serde::Serialize;
use std::collections::HashSet;

use super::alias::AliasId;
use super::expr::{ExprExt, SqlExpr};
use super::model_path::ModelPath;

// =============================================================================
// Data Sources
// =============================================================================

/// Physical column of a table, tagged with the member it maps to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableColumn {
    pub column: String,
    pub model_path: ModelPath,
}

impl TableColumn {
    pub fn new(column: &str, model_path: ModelPath) -> Self {
        Self {
            column: column.to_string(),
            model_path,
        }
    }
}

/// A base table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableSource {
    /// Host entity the table is mapped from.
    pub entity: String,
    pub schema: Option<String>,
    pub name: String,
    pub columns: Vec<TableColumn>,
}

/// Column exposed by a CTE to the units that read from it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CteColumn {
    pub name: String,
    pub model_path: ModelPath,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum DataSource {
    Table(TableSource),
    Derived(Box<DerivedTable>),
    /// Reads from the CTE declared under `cte`.
    CteReference {
        cte: AliasId,
        columns: Vec<CteColumn>,
    },
}

/// A data source placed in a unit under an alias.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[must_use = "data sources have no effect until attached to a query"]
pub struct AliasedDataSource {
    pub alias: AliasId,
    pub source: DataSource,
    /// Where this source's row sits in the host query's row shape.
    pub model_path: ModelPath,
    /// Rows missing on this side surface as nulls (outer-joined navigation).
    pub default_if_empty: bool,
}

impl AliasedDataSource {
    pub fn new(alias: AliasId, source: DataSource) -> Self {
        Self {
            alias,
            source,
            model_path: ModelPath::empty(),
            default_if_empty: false,
        }
    }

    pub fn with_model_path(mut self, model_path: ModelPath) -> Self {
        self.model_path = model_path;
        self
    }

    pub fn with_default_if_empty(mut self, default_if_empty: bool) -> Self {
        self.default_if_empty = default_if_empty;
        self
    }

    pub fn table(&self) -> Option<&TableSource> {
        match &self.source {
            DataSource::Table(table) => Some(table),
            _ => None,
        }
    }

    /// Entity whose rows this source yields. A derived table keeps the
    /// entity of its root source while it still exposes every source column.
    pub fn entity(&self) -> Option<&str> {
        match &self.source {
            DataSource::Table(table) => Some(&table.entity),
            DataSource::Derived(unit) if unit.auto_projection => {
                unit.source_at_path(&ModelPath::empty())?.entity()
            }
            _ => None,
        }
    }

    /// Columns visible through this source's alias, with their member paths
    /// relative to the source.
    pub fn output_columns(&self) -> Vec<(String, ModelPath)> {
        match &self.source {
            DataSource::Table(table) => table
                .columns
                .iter()
                .map(|c| (c.column.clone(), c.model_path.clone()))
                .collect(),
            DataSource::Derived(unit) => unit
                .output_columns()
                .iter()
                .map(|c| (c.alias.clone(), c.model_path.clone()))
                .collect(),
            DataSource::CteReference { columns, .. } => columns
                .iter()
                .map(|c| (c.name.clone(), c.model_path.clone()))
                .collect(),
        }
    }

    /// Name of the column mapped to `member`, relative to this source.
    pub fn column_for_path(&self, member: &ModelPath) -> Option<String> {
        match &self.source {
            DataSource::Table(table) => table
                .columns
                .iter()
                .find(|c| &c.model_path == member)
                .map(|c| c.column.clone()),
            DataSource::Derived(unit) => unit
                .output_columns()
                .iter()
                .find(|c| &c.model_path == member)
                .map(|c| c.alias.clone()),
            DataSource::CteReference { columns, .. } => columns
                .iter()
                .find(|c| &c.model_path == member)
                .map(|c| c.name.clone()),
        }
    }
}

// =============================================================================
// Clauses
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum JoinKind {
    Inner,
    Left,
    #[default]
    Cross,
    CrossApply,
    OuterApply,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Join {
    pub kind: JoinKind,
    pub source: AliasedDataSource,
    pub condition: Option<SqlExpr>,
    /// Added automatically to reach a navigation member.
    pub navigation: bool,
}

/// One WHERE or HAVING entry. `use_or` combines it with the previous entry
/// by OR instead of AND.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterPredicate {
    pub predicate: SqlExpr,
    pub use_or: bool,
}

impl FilterPredicate {
    pub fn and(predicate: SqlExpr) -> Self {
        Self {
            predicate,
            use_or: false,
        }
    }

    pub fn or(predicate: SqlExpr) -> Self {
        Self {
            predicate,
            use_or: true,
        }
    }
}

/// A SELECT list item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectColumn {
    pub expr: SqlExpr,
    /// Output name; unique within the projection.
    pub alias: String,
    pub model_path: ModelPath,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderByExpr {
    pub expr: SqlExpr,
    pub descending: bool,
}

impl OrderByExpr {
    pub fn asc(expr: SqlExpr) -> Self {
        Self {
            expr,
            descending: false,
        }
    }

    pub fn desc(expr: SqlExpr) -> Self {
        Self {
            expr,
            descending: true,
        }
    }
}

/// Common table expression declared by a unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CteDefinition {
    pub alias: AliasId,
    pub body: DerivedTable,
    pub recursive: bool,
}

/// A UNION branch appended to a unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnionBranch {
    pub all: bool,
    pub query: DerivedTable,
}

// =============================================================================
// Derived Table
// =============================================================================

/// A SELECT-shaped unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DerivedTable {
    pub ctes: Vec<CteDefinition>,
    pub from: AliasedDataSource,
    pub joins: Vec<Join>,
    pub filters: Vec<FilterPredicate>,
    pub group_by: Option<Vec<SqlExpr>>,
    pub having: Vec<FilterPredicate>,
    pub projection: Option<Vec<SelectColumn>>,
    /// The projection was generated from the data sources, not requested.
    pub auto_projection: bool,
    pub order_by: Vec<OrderByExpr>,
    pub top: Option<SqlExpr>,
    pub row_offset: Option<SqlExpr>,
    pub rows_per_page: Option<SqlExpr>,
    pub distinct: bool,
    pub unions: Vec<UnionBranch>,
    /// This unit is the body of a CTE.
    pub is_cte: bool,
}

impl DerivedTable {
    pub fn new(from: AliasedDataSource) -> Self {
        Self {
            ctes: Vec::new(),
            from,
            joins: Vec::new(),
            filters: Vec::new(),
            group_by: None,
            having: Vec::new(),
            projection: None,
            auto_projection: false,
            order_by: Vec::new(),
            top: None,
            row_offset: None,
            rows_per_page: None,
            distinct: false,
            unions: Vec::new(),
            is_cte: false,
        }
    }

    /// The initial source followed by every joined source.
    pub fn data_sources(&self) -> impl Iterator<Item = &AliasedDataSource> {
        std::iter::once(&self.from).chain(self.joins.iter().map(|j| &j.source))
    }

    pub fn data_sources_mut(&mut self) -> impl Iterator<Item = &mut AliasedDataSource> {
        std::iter::once(&mut self.from).chain(self.joins.iter_mut().map(|j| &mut j.source))
    }

    pub fn find_source(&self, alias: AliasId) -> Option<&AliasedDataSource> {
        self.data_sources().find(|s| s.alias == alias)
    }

    pub fn source_at_path(&self, path: &ModelPath) -> Option<&AliasedDataSource> {
        self.data_sources().find(|s| &s.model_path == path)
    }

    /// Aliases this unit's own clauses may reference.
    pub fn declared_aliases(&self) -> HashSet<AliasId> {
        self.data_sources().map(|s| s.alias).collect()
    }

    pub fn output_columns(&self) -> &[SelectColumn] {
        self.projection.as_deref().unwrap_or(&[])
    }

    /// The WHERE clause as a single predicate.
    pub fn where_predicate(&self) -> Option<SqlExpr> {
        combine_filters(&self.filters)
    }

    pub fn having_predicate(&self) -> Option<SqlExpr> {
        combine_filters(&self.having)
    }

    /// Nothing has been applied on top of the initial source.
    pub fn is_bare_source(&self) -> bool {
        self.ctes.is_empty()
            && self.joins.is_empty()
            && self.filters.is_empty()
            && self.group_by.is_none()
            && self.having.is_empty()
            && self.projection.is_none()
            && self.order_by.is_empty()
            && self.top.is_none()
            && self.row_offset.is_none()
            && self.rows_per_page.is_none()
            && !self.distinct
            && self.unions.is_empty()
    }
}

/// Fold filter entries left to right, honouring each entry's `use_or`.
pub fn combine_filters(filters: &[FilterPredicate]) -> Option<SqlExpr> {
    let mut iter = filters.iter();
    let first = iter.next()?.predicate.clone();
    Some(iter.fold(first, |acc, f| {
        if f.use_or {
            acc.or(f.predicate.clone())
        } else {
            acc.and(f.predicate.clone())
        }
    }))
}

/// Whether entry `index` of `filters` takes part in an OR once they are
/// combined. The fold is left-associative, so any later OR entry puts every
/// entry before it under that OR.
pub fn entry_under_or(filters: &[FilterPredicate], index: usize) -> bool {
    (index > 0 && filters.get(index).map_or(false, |f| f.use_or))
        || filters.iter().skip(index + 1).any(|f| f.use_or)
}

// =============================================================================
// Statements
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assignment {
    pub column: String,
    pub value: SqlExpr,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateStatement {
    pub query: DerivedTable,
    /// Table data source of `query` receiving the assignments.
    pub target: AliasId,
    pub assignments: Vec<Assignment>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeleteStatement {
    pub query: DerivedTable,
    pub target: AliasId,
}

/// Root of a converted tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SqlStatement {
    Query(DerivedTable),
    Update(UpdateStatement),
    Delete(DeleteStatement),
}

impl SqlStatement {
    pub fn query(&self) -> &DerivedTable {
        match self {
            SqlStatement::Query(query) => query,
            SqlStatement::Update(update) => &update.query,
            SqlStatement::Delete(delete) => &delete.query,
        }
    }

    pub fn query_mut(&mut self) -> &mut DerivedTable {
        match self {
            SqlStatement::Query(query) => query,
            SqlStatement::Update(update) => &mut update.query,
            SqlStatement::Delete(delete) => &mut delete.query,
        }
    }
}
