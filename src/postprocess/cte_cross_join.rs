//! CROSS JOIN onto a CTE reference plus a WHERE equality -> INNER JOIN.
//!
//! ```text
//! SELECT ... FROM e CROSS JOIN r WHERE r.id = e.manager_id AND e.active
//! SELECT ... FROM e INNER JOIN r ON r.id = e.manager_id WHERE e.active
//! ```

use std::collections::HashSet;

use super::{PostprocessResult, Postprocessor};
use crate::sql::visit::walk_derived_table;
use crate::sql::{
    entry_under_or, AliasId, BinaryOperator, DataSource, DerivedTable, FilterPredicate, JoinKind, SqlExpr,
    SqlRewriter, SqlStatement, Transformed,
};

/// Whether `expr` is `target.x = other.y` (either way round) with `other`
/// declared before the join.
fn links(expr: &SqlExpr, target: AliasId, visible: &HashSet<AliasId>) -> bool {
    let SqlExpr::Binary {
        left,
        op: BinaryOperator::Eq,
        right,
    } = expr
    else {
        return false;
    };
    match (left.as_column(), right.as_column()) {
        (Some(l), Some(r)) => {
            (l.source == target && visible.contains(&r.source))
                || (r.source == target && visible.contains(&l.source))
        }
        _ => false,
    }
}

/// Remove and return the first AND-level equality linking `target` to a
/// visible source. Entries combined with OR are left alone.
fn take_link(
    filters: &mut Vec<FilterPredicate>,
    target: AliasId,
    visible: &HashSet<AliasId>,
) -> Option<SqlExpr> {
    for i in 0..filters.len() {
        if entry_under_or(filters, i) {
            continue;
        }

        let mut conjuncts = filters[i].predicate.clone().into_conjuncts();
        let Some(position) = conjuncts.iter().position(|c| links(c, target, visible)) else {
            continue;
        };
        let link = conjuncts.remove(position);
        match SqlExpr::conjunction(conjuncts) {
            Some(rest) => filters[i].predicate = rest,
            None => {
                filters.remove(i);
            }
        }
        return Some(link);
    }
    None
}

fn promote_cross_joins(table: &mut DerivedTable) -> bool {
    let mut promoted = false;
    let mut visible = HashSet::from([table.from.alias]);

    for index in 0..table.joins.len() {
        let target = table.joins[index].source.alias;
        let candidate = table.joins[index].kind == JoinKind::Cross
            && matches!(table.joins[index].source.source, DataSource::CteReference { .. });

        if candidate {
            if let Some(condition) = take_link(&mut table.filters, target, &visible) {
                let join = &mut table.joins[index];
                join.kind = JoinKind::Inner;
                join.condition = Some(condition);
                promoted = true;
                log::trace!("Cross join to CTE reference {} became an inner join", target);
            }
        }
        visible.insert(target);
    }
    promoted
}

struct CrossJoinRewriter;

impl SqlRewriter for CrossJoinRewriter {
    fn rewrite_derived_table(&mut self, table: DerivedTable) -> Transformed<DerivedTable> {
        let walked = walk_derived_table(self, table);
        let changed = walked.is_yes();
        let mut table = walked.into_inner();
        let promoted = promote_cross_joins(&mut table);
        Transformed::yes_if(changed || promoted, table)
    }
}

/// Turns cross joins to CTE references into inner joins on a WHERE equality.
#[derive(Debug, Default)]
pub struct CteCrossJoinPass;

impl CteCrossJoinPass {
    pub fn new() -> Self {
        Self
    }
}

impl Postprocessor for CteCrossJoinPass {
    fn name(&self) -> &'static str {
        "cte-cross-join"
    }

    fn process(&mut self, statement: SqlStatement) -> PostprocessResult<Transformed<SqlStatement>> {
        Ok(CrossJoinRewriter.rewrite_statement(statement))
    }
}
