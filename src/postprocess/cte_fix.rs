//! Hoists CTE definitions out of nested units onto the root statement.
//!
//! CTEs can only be declared at the top of a statement. Units built on their
//! own (a derived table, a subquery, a union branch) may still carry the CTEs
//! they promoted; this pass lifts them to the root and, when a dependency
//! would be read before its definition, reorders the root list topologically.

use std::collections::HashMap;

use petgraph::algo::toposort;
use petgraph::graph::DiGraph;

use super::{PostprocessError, PostprocessResult, Postprocessor};
use crate::sql::visit::{referenced_ctes, walk_derived_table};
use crate::sql::{CteDefinition, DerivedTable, SqlRewriter, SqlStatement, Transformed};

/// Collects the CTEs of every unit it walks.
#[derive(Default)]
struct CteHoister {
    hoisted: Vec<CteDefinition>,
}

impl SqlRewriter for CteHoister {
    fn rewrite_derived_table(&mut self, table: DerivedTable) -> Transformed<DerivedTable> {
        let walked = walk_derived_table(self, table);
        let changed = walked.is_yes();
        let mut table = walked.into_inner();

        if table.ctes.is_empty() {
            return Transformed::yes_if(changed, table);
        }
        self.hoisted.append(&mut table.ctes);
        Transformed::Yes(table)
    }
}

/// Whether every CTE only reads CTEs defined before it (or itself).
fn is_ordered(ctes: &[CteDefinition]) -> bool {
    let position: HashMap<_, _> = ctes.iter().enumerate().map(|(i, c)| (c.alias, i)).collect();
    ctes.iter().enumerate().all(|(i, cte)| {
        referenced_ctes(&cte.body)
            .iter()
            .filter(|alias| **alias != cte.alias)
            .all(|alias| position.get(alias).map_or(true, |p| *p < i))
    })
}

/// Dependency order for `ctes`.
fn topological_order(ctes: Vec<CteDefinition>) -> PostprocessResult<Vec<CteDefinition>> {
    let mut graph = DiGraph::<usize, ()>::new();
    let nodes: Vec<_> = (0..ctes.len()).map(|i| graph.add_node(i)).collect();
    let position: HashMap<_, _> = ctes.iter().enumerate().map(|(i, c)| (c.alias, i)).collect();

    for (i, cte) in ctes.iter().enumerate() {
        for dependency in referenced_ctes(&cte.body) {
            if dependency == cte.alias {
                continue;
            }
            if let Some(&j) = position.get(&dependency) {
                graph.add_edge(nodes[j], nodes[i], ());
            }
        }
    }

    let order = toposort(&graph, None).map_err(|cycle| PostprocessError::CteCycle {
        alias: ctes[graph[cycle.node_id()]].alias,
    })?;

    let mut slots: Vec<Option<CteDefinition>> = ctes.into_iter().map(Some).collect();
    Ok(order
        .into_iter()
        .filter_map(|node| slots[graph[node]].take())
        .collect())
}

/// Lifts nested CTE definitions to the root statement.
#[derive(Debug, Default)]
pub struct CteFixPass;

impl CteFixPass {
    pub fn new() -> Self {
        Self
    }
}

impl Postprocessor for CteFixPass {
    fn name(&self) -> &'static str {
        "cte-fix"
    }

    fn process(
        &mut self,
        mut statement: SqlStatement,
    ) -> PostprocessResult<Transformed<SqlStatement>> {
        // The root keeps its own definitions; only their bodies are searched.
        let own = std::mem::take(&mut statement.query_mut().ctes);
        let mut hoister = CteHoister::default();
        let mut ctes: Vec<CteDefinition> = own
            .into_iter()
            .map(|mut cte| {
                cte.body = hoister.rewrite_derived_table(cte.body).into_inner();
                cte
            })
            .collect();
        let mut statement = hoister.rewrite_statement(statement).into_inner();

        let hoisted = hoister.hoisted.len();
        ctes.append(&mut hoister.hoisted);

        let reordered = !is_ordered(&ctes);
        if reordered {
            ctes = topological_order(ctes)?;
        }
        statement.query_mut().ctes = ctes;

        if hoisted > 0 || reordered {
            log::trace!("Hoisted {} CTEs (reordered: {})", hoisted, reordered);
        }
        Ok(Transformed::yes_if(hoisted > 0 || reordered, statement))
    }
}
