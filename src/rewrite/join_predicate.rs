//! Join-predicate extraction: turn a correlated subquery into a join.
//!
//! A subquery such as
//!
//! ```text
//! EXISTS (SELECT * FROM orders o WHERE o.customer_id = c.id AND o.total > 10)
//! ```
//!
//! reads the outer alias `c` only through top-level AND-combined comparisons.
//! Those comparisons become the join condition; what is left of the WHERE
//! clause stays with the joined source.

use std::collections::HashSet;

use super::redundant_true::remove_redundant_true;
use crate::builder::{auto_projection_columns, ColumnRemap};
use crate::sql::visit::{free_aliases, free_aliases_in_table};
use crate::sql::{
    entry_under_or, lit_bool, AliasGenerator, AliasId, AliasedDataSource, BinaryOperator,
    DataSource, DerivedTable, ExprExt, FilterPredicate, SqlExpr,
};

/// A source and condition that can replace a correlated subquery.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinPromotion {
    pub source: AliasedDataSource,
    pub condition: SqlExpr,
}

/// Whether `unit` has the plain shape a join can absorb: one source and a
/// WHERE clause, nothing that depends on the subquery being evaluated apart.
pub fn is_joinable(unit: &DerivedTable) -> bool {
    unit.joins.is_empty()
        && unit.ctes.is_empty()
        && !unit.filters.is_empty()
        && unit.group_by.is_none()
        && unit.having.is_empty()
        && unit.order_by.is_empty()
        && unit.top.is_none()
        && unit.row_offset.is_none()
        && unit.rows_per_page.is_none()
        && !unit.distinct
        && unit.unions.is_empty()
        && !unit.is_cte
        && (unit.projection.is_none() || unit.auto_projection)
}

struct Extraction<'a> {
    external: &'a HashSet<AliasId>,
    extracted: Vec<SqlExpr>,
    aborted: bool,
}

impl Extraction<'_> {
    fn references_external(&self, expr: &SqlExpr) -> bool {
        free_aliases(expr).iter().any(|a| self.external.contains(a))
    }

    /// Pull external comparisons out of an AND tree, leaving `true` behind.
    fn extract(&mut self, expr: SqlExpr, under_or: bool) -> SqlExpr {
        if self.aborted || !self.references_external(&expr) {
            return expr;
        }

        match expr {
            SqlExpr::Binary {
                left,
                op: BinaryOperator::And,
                right,
            } => {
                let left = self.extract(*left, under_or);
                let right = self.extract(*right, under_or);
                left.and(right)
            }
            expr if expr.is_comparison() && !under_or => {
                self.extracted.push(expr);
                lit_bool(true)
            }
            expr => {
                self.aborted = true;
                expr
            }
        }
    }
}

/// Extract the join condition tying `unit` to the `external` aliases.
///
/// Returns `None` when the unit is not joinable, reads no external alias, or
/// reads one anywhere but a top-level AND-combined comparison of its WHERE
/// clause (an OR over an external reference keeps it a subquery). New aliases
/// come from `aliases`.
pub fn extract_join(
    aliases: &mut AliasGenerator,
    unit: &DerivedTable,
    external: &HashSet<AliasId>,
    separator: &str,
) -> Option<JoinPromotion> {
    if !is_joinable(unit) {
        return None;
    }

    // Outside the WHERE clause the unit must be self-contained.
    let mut rest = unit.clone();
    rest.filters.clear();
    if !free_aliases_in_table(&rest).is_empty() {
        return None;
    }

    let mut extraction = Extraction {
        external,
        extracted: Vec::new(),
        aborted: false,
    };
    let filters: Vec<FilterPredicate> = unit
        .filters
        .iter()
        .enumerate()
        .map(|(i, filter)| {
            let under_or = entry_under_or(&unit.filters, i);
            FilterPredicate {
                predicate: extraction.extract(filter.predicate.clone(), under_or),
                use_or: filter.use_or,
            }
        })
        .collect();

    if extraction.aborted {
        log::trace!("Subquery over {} stays correlated", unit.from.alias);
        return None;
    }
    let condition = SqlExpr::conjunction(extraction.extracted)?;
    let filters = remove_redundant_true(filters);

    if filters.is_empty() {
        return Some(JoinPromotion {
            source: unit.from.clone(),
            condition,
        });
    }

    let mut inner = unit.clone();
    inner.filters = filters;
    // A joined derived table cannot read the enclosing query.
    if !free_aliases_in_table(&inner).is_empty() {
        return None;
    }
    if inner.projection.is_none() {
        inner.projection = Some(auto_projection_columns(&inner, false, separator));
        inner.auto_projection = true;
    }

    let alias = aliases.allocate("join");
    let condition = ColumnRemap::for_projection(&inner, alias).apply(condition);
    // Every inner column the condition reads must be exposed by the projection.
    if free_aliases(&condition).contains(&unit.from.alias) {
        return None;
    }

    Some(JoinPromotion {
        source: AliasedDataSource::new(alias, DataSource::Derived(Box::new(inner)))
            .with_model_path(unit.from.model_path.clone()),
        condition,
    })
}
