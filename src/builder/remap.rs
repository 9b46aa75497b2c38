//! Redirecting expressions after a unit moves behind a new alias.

use crate::sql::visit::{walk_expr, SqlRewriter, Transformed};
use crate::sql::{col, AliasId, DerivedTable, SqlExpr};

/// Maps expressions computed by a unit's projection onto the columns that
/// expose them once the unit is read through another alias.
///
/// Matching is structural and top-down, so the largest matching subtree wins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnRemap {
    pairs: Vec<(SqlExpr, SqlExpr)>,
}

impl ColumnRemap {
    pub fn identity() -> Self {
        Self::default()
    }

    /// Remap for reading `unit` through `alias`. Constant projection columns
    /// are skipped: a literal elsewhere in a predicate is not a column.
    pub fn for_projection(unit: &DerivedTable, alias: AliasId) -> Self {
        let pairs = unit
            .output_columns()
            .iter()
            .filter(|c| c.expr.has_column_reference())
            .map(|c| (c.expr.clone(), col(alias, &c.alias)))
            .collect();
        Self { pairs }
    }

    pub fn is_identity(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn apply(&self, expr: SqlExpr) -> SqlExpr {
        if self.is_identity() {
            return expr;
        }
        Replacer { pairs: &self.pairs }
            .rewrite_expr(expr)
            .into_inner()
    }
}

struct Replacer<'a> {
    pairs: &'a [(SqlExpr, SqlExpr)],
}

impl SqlRewriter for Replacer<'_> {
    fn rewrite_expr(&mut self, expr: SqlExpr) -> Transformed<SqlExpr> {
        if let Some((_, replacement)) = self.pairs.iter().find(|(from, _)| *from == expr) {
            return Transformed::Yes(replacement.clone());
        }
        walk_expr(self, expr)
    }
}
