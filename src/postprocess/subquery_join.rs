//! `WHERE EXISTS (correlated unit)` -> INNER JOIN.
//!
//! Only top-level AND-combined, non-negated EXISTS filters are candidates;
//! the correlated unit must pass [`extract_join`].

use std::collections::HashSet;

use super::{PostprocessResult, Postprocessor};
use crate::rewrite::{extract_join, JoinPromotion};
use crate::sql::visit::{max_alias, walk_derived_table};
use crate::sql::{
    entry_under_or, AliasGenerator, AliasId, DerivedTable, Join, JoinKind, SqlExpr, SqlRewriter, SqlStatement,
    Transformed,
};

struct SubqueryJoiner<'a> {
    aliases: AliasGenerator,
    separator: &'a str,
}

impl SubqueryJoiner<'_> {
    fn promote(&mut self, table: &mut DerivedTable) -> bool {
        let mut promoted = false;
        let mut i = 0;

        while i < table.filters.len() {
            let under_or = entry_under_or(&table.filters, i);
            let external: HashSet<AliasId> = table.declared_aliases();

            let promotion = match &table.filters[i].predicate {
                SqlExpr::Exists {
                    query,
                    negated: false,
                } if !under_or => extract_join(&mut self.aliases, query, &external, self.separator),
                _ => None,
            };

            match promotion {
                Some(JoinPromotion { source, condition }) => {
                    log::debug!("Promoted EXISTS subquery to inner join on {}", source.alias);
                    table.filters.remove(i);
                    table.joins.push(Join {
                        kind: JoinKind::Inner,
                        source,
                        condition: Some(condition),
                        navigation: false,
                    });
                    promoted = true;
                }
                None => i += 1,
            }
        }
        promoted
    }
}

impl SqlRewriter for SubqueryJoiner<'_> {
    fn rewrite_derived_table(&mut self, table: DerivedTable) -> Transformed<DerivedTable> {
        let walked = walk_derived_table(self, table);
        let changed = walked.is_yes();
        let mut table = walked.into_inner();
        let promoted = self.promote(&mut table);
        Transformed::yes_if(changed || promoted, table)
    }
}

/// Turns correlated EXISTS filters into inner joins where the shape allows.
#[derive(Debug, Clone)]
pub struct SubqueryJoinPass {
    separator: String,
}

impl SubqueryJoinPass {
    /// `separator` names colliding columns of a wrapped join source.
    pub fn new(separator: &str) -> Self {
        Self {
            separator: separator.to_string(),
        }
    }
}

impl Default for SubqueryJoinPass {
    fn default() -> Self {
        Self::new("_")
    }
}

impl Postprocessor for SubqueryJoinPass {
    fn name(&self) -> &'static str {
        "subquery-join"
    }

    fn process(&mut self, statement: SqlStatement) -> PostprocessResult<Transformed<SqlStatement>> {
        let mut joiner = SubqueryJoiner {
            aliases: AliasGenerator::resume_after(max_alias(&statement)),
            separator: &self.separator,
        };
        Ok(joiner.rewrite_statement(statement))
    }
}
