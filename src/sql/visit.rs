//! Tree walking over the SQL AST.
//!
//! [`SqlRewriter`] consumes nodes and hands back [`Transformed`] values: a
//! rewriter that leaves a subtree alone returns it as `No`, and a parent is
//! rebuilt as `Yes` only when one of its children changed. [`SqlVisitor`] is
//! the read-only counterpart used by the collectors at the bottom of this file.

use std::collections::{BTreeSet, HashSet};

use super::alias::AliasId;
use super::expr::SqlExpr;
use super::query::{
    AliasedDataSource, Assignment, CteDefinition, DataSource, DeleteStatement, DerivedTable,
    FilterPredicate, Join, OrderByExpr, SelectColumn, SqlStatement, UnionBranch, UpdateStatement,
};

// =============================================================================
// Change tracking
// =============================================================================

/// A node after a rewrite, tagged with whether anything changed.
#[derive(Debug, Clone, PartialEq)]
pub enum Transformed<T> {
    Yes(T),
    No(T),
}

impl<T> Transformed<T> {
    pub fn yes_if(changed: bool, value: T) -> Self {
        if changed {
            Transformed::Yes(value)
        } else {
            Transformed::No(value)
        }
    }

    pub fn is_yes(&self) -> bool {
        matches!(self, Transformed::Yes(_))
    }

    pub fn get(&self) -> &T {
        match self {
            Transformed::Yes(value) | Transformed::No(value) => value,
        }
    }

    pub fn into_inner(self) -> T {
        match self {
            Transformed::Yes(value) | Transformed::No(value) => value,
        }
    }

    /// Rebuild the wrapped value, keeping the change flag.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Transformed<U> {
        match self {
            Transformed::Yes(value) => Transformed::Yes(f(value)),
            Transformed::No(value) => Transformed::No(f(value)),
        }
    }
}

// =============================================================================
// Rewriting
// =============================================================================

/// Owned rewrite over the tree. Override a method to intercept a node kind;
/// call the matching `walk_*` function to continue into its children.
pub trait SqlRewriter {
    fn rewrite_expr(&mut self, expr: SqlExpr) -> Transformed<SqlExpr> {
        walk_expr(self, expr)
    }

    fn rewrite_derived_table(&mut self, table: DerivedTable) -> Transformed<DerivedTable> {
        walk_derived_table(self, table)
    }

    fn rewrite_data_source(&mut self, source: AliasedDataSource) -> Transformed<AliasedDataSource> {
        walk_data_source(self, source)
    }

    fn rewrite_statement(&mut self, statement: SqlStatement) -> Transformed<SqlStatement> {
        walk_statement(self, statement)
    }
}

fn rewrite_all<T>(items: Vec<T>, mut f: impl FnMut(T) -> Transformed<T>) -> (Vec<T>, bool) {
    let mut changed = false;
    let items = items
        .into_iter()
        .map(|item| {
            let result = f(item);
            changed |= result.is_yes();
            result.into_inner()
        })
        .collect();
    (items, changed)
}

fn rewrite_boxed<R: SqlRewriter + ?Sized>(
    rewriter: &mut R,
    expr: Box<SqlExpr>,
) -> (Box<SqlExpr>, bool) {
    let result = rewriter.rewrite_expr(*expr);
    let changed = result.is_yes();
    (Box::new(result.into_inner()), changed)
}

fn rewrite_optional<R: SqlRewriter + ?Sized>(
    rewriter: &mut R,
    expr: Option<SqlExpr>,
) -> (Option<SqlExpr>, bool) {
    match expr {
        Some(expr) => {
            let result = rewriter.rewrite_expr(expr);
            let changed = result.is_yes();
            (Some(result.into_inner()), changed)
        }
        None => (None, false),
    }
}

fn rewrite_filters<R: SqlRewriter + ?Sized>(
    rewriter: &mut R,
    filters: Vec<FilterPredicate>,
) -> (Vec<FilterPredicate>, bool) {
    rewrite_all(filters, |FilterPredicate { predicate, use_or }| {
        rewriter
            .rewrite_expr(predicate)
            .map(|predicate| FilterPredicate { predicate, use_or })
    })
}

pub fn walk_expr<R: SqlRewriter + ?Sized>(rewriter: &mut R, expr: SqlExpr) -> Transformed<SqlExpr> {
    match expr {
        SqlExpr::Binary { left, op, right } => {
            let (left, l) = rewrite_boxed(rewriter, left);
            let (right, r) = rewrite_boxed(rewriter, right);
            Transformed::yes_if(l || r, SqlExpr::Binary { left, op, right })
        }
        SqlExpr::Unary { op, expr } => {
            let (expr, changed) = rewrite_boxed(rewriter, expr);
            Transformed::yes_if(changed, SqlExpr::Unary { op, expr })
        }
        SqlExpr::Function {
            name,
            args,
            distinct,
        } => {
            let (args, changed) = rewrite_all(args, |arg| rewriter.rewrite_expr(arg));
            Transformed::yes_if(
                changed,
                SqlExpr::Function {
                    name,
                    args,
                    distinct,
                },
            )
        }
        SqlExpr::Conditional {
            test,
            if_true,
            if_false,
        } => {
            let (test, a) = rewrite_boxed(rewriter, test);
            let (if_true, b) = rewrite_boxed(rewriter, if_true);
            let (if_false, c) = rewrite_boxed(rewriter, if_false);
            Transformed::yes_if(
                a || b || c,
                SqlExpr::Conditional {
                    test,
                    if_true,
                    if_false,
                },
            )
        }
        SqlExpr::IsNull { expr, negated } => {
            let (expr, changed) = rewrite_boxed(rewriter, expr);
            Transformed::yes_if(changed, SqlExpr::IsNull { expr, negated })
        }
        SqlExpr::InList {
            expr,
            values,
            negated,
        } => {
            let (expr, a) = rewrite_boxed(rewriter, expr);
            let (values, b) = rewrite_all(values, |v| rewriter.rewrite_expr(v));
            Transformed::yes_if(
                a || b,
                SqlExpr::InList {
                    expr,
                    values,
                    negated,
                },
            )
        }
        SqlExpr::Exists { query, negated } => rewriter
            .rewrite_derived_table(*query)
            .map(|query| SqlExpr::Exists {
                query: Box::new(query),
                negated,
            }),
        SqlExpr::Subquery(query) => rewriter
            .rewrite_derived_table(*query)
            .map(|query| SqlExpr::Subquery(Box::new(query))),
        leaf @ (SqlExpr::Literal(_)
        | SqlExpr::Parameter { .. }
        | SqlExpr::Column(_)
        | SqlExpr::SelectAlias(_)) => Transformed::No(leaf),
    }
}

pub fn walk_data_source<R: SqlRewriter + ?Sized>(
    rewriter: &mut R,
    source: AliasedDataSource,
) -> Transformed<AliasedDataSource> {
    let AliasedDataSource {
        alias,
        source,
        model_path,
        default_if_empty,
    } = source;

    let rebuild = |source| AliasedDataSource {
        alias,
        source,
        model_path,
        default_if_empty,
    };

    match source {
        DataSource::Derived(unit) => rewriter
            .rewrite_derived_table(*unit)
            .map(|unit| rebuild(DataSource::Derived(Box::new(unit)))),
        other => Transformed::No(rebuild(other)),
    }
}

pub fn walk_derived_table<R: SqlRewriter + ?Sized>(
    rewriter: &mut R,
    table: DerivedTable,
) -> Transformed<DerivedTable> {
    let DerivedTable {
        ctes,
        from,
        joins,
        filters,
        group_by,
        having,
        projection,
        auto_projection,
        order_by,
        top,
        row_offset,
        rows_per_page,
        distinct,
        unions,
        is_cte,
    } = table;

    let mut changed = false;

    let (ctes, c) = rewrite_all(ctes, |CteDefinition { alias, body, recursive }| {
        rewriter
            .rewrite_derived_table(body)
            .map(|body| CteDefinition {
                alias,
                body,
                recursive,
            })
    });
    changed |= c;

    let from = rewriter.rewrite_data_source(from);
    changed |= from.is_yes();
    let from = from.into_inner();

    let (joins, c) = rewrite_all(joins, |join| {
        let Join {
            kind,
            source,
            condition,
            navigation,
        } = join;
        let source = rewriter.rewrite_data_source(source);
        let (condition, c) = rewrite_optional(rewriter, condition);
        let changed = source.is_yes() || c;
        Transformed::yes_if(
            changed,
            Join {
                kind,
                source: source.into_inner(),
                condition,
                navigation,
            },
        )
    });
    changed |= c;

    let (filters, c) = rewrite_filters(rewriter, filters);
    changed |= c;

    let group_by = match group_by {
        Some(keys) => {
            let (keys, c) = rewrite_all(keys, |k| rewriter.rewrite_expr(k));
            changed |= c;
            Some(keys)
        }
        None => None,
    };

    let (having, c) = rewrite_filters(rewriter, having);
    changed |= c;

    let projection = match projection {
        Some(columns) => {
            let (columns, c) = rewrite_all(columns, |column| {
                let SelectColumn {
                    expr,
                    alias,
                    model_path,
                } = column;
                rewriter.rewrite_expr(expr).map(|expr| SelectColumn {
                    expr,
                    alias,
                    model_path,
                })
            });
            changed |= c;
            Some(columns)
        }
        None => None,
    };

    let (order_by, c) = rewrite_all(order_by, |OrderByExpr { expr, descending }| {
        rewriter
            .rewrite_expr(expr)
            .map(|expr| OrderByExpr { expr, descending })
    });
    changed |= c;

    let (top, c) = rewrite_optional(rewriter, top);
    changed |= c;
    let (row_offset, c) = rewrite_optional(rewriter, row_offset);
    changed |= c;
    let (rows_per_page, c) = rewrite_optional(rewriter, rows_per_page);
    changed |= c;

    let (unions, c) = rewrite_all(unions, |UnionBranch { all, query }| {
        rewriter
            .rewrite_derived_table(query)
            .map(|query| UnionBranch { all, query })
    });
    changed |= c;

    Transformed::yes_if(
        changed,
        DerivedTable {
            ctes,
            from,
            joins,
            filters,
            group_by,
            having,
            projection,
            auto_projection,
            order_by,
            top,
            row_offset,
            rows_per_page,
            distinct,
            unions,
            is_cte,
        },
    )
}

pub fn walk_statement<R: SqlRewriter + ?Sized>(
    rewriter: &mut R,
    statement: SqlStatement,
) -> Transformed<SqlStatement> {
    match statement {
        SqlStatement::Query(query) => rewriter
            .rewrite_derived_table(query)
            .map(SqlStatement::Query),
        SqlStatement::Update(UpdateStatement {
            query,
            target,
            assignments,
        }) => {
            let query = rewriter.rewrite_derived_table(query);
            let (assignments, c) = rewrite_all(assignments, |Assignment { column, value }| {
                rewriter
                    .rewrite_expr(value)
                    .map(|value| Assignment { column, value })
            });
            let changed = query.is_yes() || c;
            Transformed::yes_if(
                changed,
                SqlStatement::Update(UpdateStatement {
                    query: query.into_inner(),
                    target,
                    assignments,
                }),
            )
        }
        SqlStatement::Delete(DeleteStatement { query, target }) => rewriter
            .rewrite_derived_table(query)
            .map(|query| SqlStatement::Delete(DeleteStatement { query, target })),
    }
}

// =============================================================================
// Read-only visiting
// =============================================================================

pub trait SqlVisitor {
    fn visit_expr(&mut self, expr: &SqlExpr) {
        walk_expr_ref(self, expr)
    }

    fn visit_derived_table(&mut self, table: &DerivedTable) {
        walk_derived_table_ref(self, table)
    }

    fn visit_data_source(&mut self, source: &AliasedDataSource) {
        walk_data_source_ref(self, source)
    }
}

pub fn walk_expr_ref<V: SqlVisitor + ?Sized>(visitor: &mut V, expr: &SqlExpr) {
    match expr {
        SqlExpr::Binary { left, right, .. } => {
            visitor.visit_expr(left);
            visitor.visit_expr(right);
        }
        SqlExpr::Unary { expr, .. } | SqlExpr::IsNull { expr, .. } => visitor.visit_expr(expr),
        SqlExpr::Function { args, .. } => args.iter().for_each(|a| visitor.visit_expr(a)),
        SqlExpr::Conditional {
            test,
            if_true,
            if_false,
        } => {
            visitor.visit_expr(test);
            visitor.visit_expr(if_true);
            visitor.visit_expr(if_false);
        }
        SqlExpr::InList { expr, values, .. } => {
            visitor.visit_expr(expr);
            values.iter().for_each(|v| visitor.visit_expr(v));
        }
        SqlExpr::Exists { query, .. } | SqlExpr::Subquery(query) => {
            visitor.visit_derived_table(query)
        }
        SqlExpr::Literal(_)
        | SqlExpr::Parameter { .. }
        | SqlExpr::Column(_)
        | SqlExpr::SelectAlias(_) => {}
    }
}

pub fn walk_data_source_ref<V: SqlVisitor + ?Sized>(visitor: &mut V, source: &AliasedDataSource) {
    if let DataSource::Derived(unit) = &source.source {
        visitor.visit_derived_table(unit);
    }
}

pub fn walk_derived_table_ref<V: SqlVisitor + ?Sized>(visitor: &mut V, table: &DerivedTable) {
    for cte in &table.ctes {
        visitor.visit_derived_table(&cte.body);
    }
    visitor.visit_data_source(&table.from);
    for join in &table.joins {
        visitor.visit_data_source(&join.source);
        if let Some(condition) = &join.condition {
            visitor.visit_expr(condition);
        }
    }
    for filter in table.filters.iter().chain(&table.having) {
        visitor.visit_expr(&filter.predicate);
    }
    for key in table.group_by.iter().flatten() {
        visitor.visit_expr(key);
    }
    for column in table.output_columns() {
        visitor.visit_expr(&column.expr);
    }
    for order in &table.order_by {
        visitor.visit_expr(&order.expr);
    }
    for expr in [&table.top, &table.row_offset, &table.rows_per_page]
        .into_iter()
        .flatten()
    {
        visitor.visit_expr(expr);
    }
    for branch in &table.unions {
        visitor.visit_derived_table(&branch.query);
    }
}

pub fn walk_statement_ref<V: SqlVisitor + ?Sized>(visitor: &mut V, statement: &SqlStatement) {
    visitor.visit_derived_table(statement.query());
    if let SqlStatement::Update(update) = statement {
        for assignment in &update.assignments {
            visitor.visit_expr(&assignment.value);
        }
    }
}

// =============================================================================
// Collectors
// =============================================================================

/// Collects column references to aliases not declared inside the visited tree.
struct FreeAliasCollector {
    scopes: Vec<HashSet<AliasId>>,
    found: BTreeSet<AliasId>,
}

impl SqlVisitor for FreeAliasCollector {
    fn visit_expr(&mut self, expr: &SqlExpr) {
        if let SqlExpr::Column(column) = expr {
            if !self.scopes.iter().any(|s| s.contains(&column.source)) {
                self.found.insert(column.source);
            }
        }
        walk_expr_ref(self, expr);
    }

    fn visit_derived_table(&mut self, table: &DerivedTable) {
        self.scopes.push(table.declared_aliases());
        walk_derived_table_ref(self, table);
        self.scopes.pop();
    }
}

/// Aliases an expression references that it does not declare itself.
///
/// Columns of subqueries bound to the subquery's own sources are not free.
pub fn free_aliases(expr: &SqlExpr) -> BTreeSet<AliasId> {
    let mut collector = FreeAliasCollector {
        scopes: Vec::new(),
        found: BTreeSet::new(),
    };
    collector.visit_expr(expr);
    collector.found
}

/// Aliases a unit references without declaring them (correlation).
pub fn free_aliases_in_table(table: &DerivedTable) -> BTreeSet<AliasId> {
    let mut collector = FreeAliasCollector {
        scopes: Vec::new(),
        found: BTreeSet::new(),
    };
    collector.visit_derived_table(table);
    collector.found
}

struct CteReferenceCollector {
    found: BTreeSet<AliasId>,
}

impl SqlVisitor for CteReferenceCollector {
    fn visit_data_source(&mut self, source: &AliasedDataSource) {
        if let DataSource::CteReference { cte, .. } = &source.source {
            self.found.insert(*cte);
        }
        walk_data_source_ref(self, source);
    }
}

/// CTEs read anywhere inside `table`.
pub fn referenced_ctes(table: &DerivedTable) -> BTreeSet<AliasId> {
    let mut collector = CteReferenceCollector {
        found: BTreeSet::new(),
    };
    collector.visit_derived_table(table);
    collector.found
}

struct MaxAlias {
    max: Option<AliasId>,
}

impl MaxAlias {
    fn see(&mut self, alias: AliasId) {
        self.max = Some(self.max.map_or(alias, |m| m.max(alias)));
    }
}

impl SqlVisitor for MaxAlias {
    fn visit_derived_table(&mut self, table: &DerivedTable) {
        for cte in &table.ctes {
            self.see(cte.alias);
        }
        walk_derived_table_ref(self, table);
    }

    fn visit_data_source(&mut self, source: &AliasedDataSource) {
        self.see(source.alias);
        walk_data_source_ref(self, source);
    }
}

/// Highest alias declared anywhere in the statement.
pub fn max_alias(statement: &SqlStatement) -> Option<AliasId> {
    let mut visitor = MaxAlias { max: None };
    walk_statement_ref(&mut visitor, statement);
    visitor.max
}
