//! Drops `true` operands left behind after predicates are moved elsewhere.

use crate::sql::visit::{walk_expr, SqlRewriter, Transformed};
use crate::sql::{BinaryOperator, FilterPredicate, SqlExpr};

/// Collapses `true AND x` and `x AND true` to `x`, bottom-up.
pub struct RedundantTrueRemover;

impl SqlRewriter for RedundantTrueRemover {
    fn rewrite_expr(&mut self, expr: SqlExpr) -> Transformed<SqlExpr> {
        let walked = walk_expr(self, expr);
        let changed = walked.is_yes();

        match walked.into_inner() {
            SqlExpr::Binary {
                left,
                op: BinaryOperator::And,
                right,
            } if left.is_true_literal() => Transformed::Yes(*right),
            SqlExpr::Binary {
                left,
                op: BinaryOperator::And,
                right,
            } if right.is_true_literal() => Transformed::Yes(*left),
            other => Transformed::yes_if(changed, other),
        }
    }
}

/// Simplify every entry and drop those that reduced to `true`.
///
/// Only AND-combined entries may reduce to `true`, so dropping them never
/// changes how the remaining entries combine.
pub fn remove_redundant_true(filters: Vec<FilterPredicate>) -> Vec<FilterPredicate> {
    let mut kept: Vec<FilterPredicate> = filters
        .into_iter()
        .map(|f| FilterPredicate {
            predicate: RedundantTrueRemover.rewrite_expr(f.predicate).into_inner(),
            use_or: f.use_or,
        })
        .filter(|f| !f.predicate.is_true_literal())
        .collect();

    if let Some(first) = kept.first_mut() {
        first.use_or = false;
    }
    kept
}
