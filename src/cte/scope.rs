//! CTE scope validation.
//!
//! A CTE body is compiled on its own: nothing inside it may read a data
//! source declared outside its own tree. The validator walks a tree keeping a
//! stack of declared aliases per unit and flags any column whose alias is not
//! declared between the innermost CTE boundary and the reference.

use std::collections::{BTreeSet, HashSet};

use crate::builder::{QueryError, QueryResult};
use crate::sql::visit::{walk_derived_table_ref, walk_expr_ref, walk_statement_ref, SqlVisitor};
use crate::sql::{AliasId, DerivedTable, SqlExpr, SqlStatement};

struct Frame {
    declared: HashSet<AliasId>,
    boundary: bool,
}

/// Scope-tracking visitor collecting CTE boundary violations.
pub struct CteScopeValidator {
    frames: Vec<Frame>,
    violations: BTreeSet<AliasId>,
    /// Treat the first unit visited as a CTE body even if it is not flagged.
    root_is_boundary: bool,
}

impl CteScopeValidator {
    pub fn new() -> Self {
        Self {
            frames: Vec::new(),
            violations: BTreeSet::new(),
            root_is_boundary: false,
        }
    }

    fn check(&mut self, alias: AliasId) {
        let Some(boundary) = self.frames.iter().rposition(|f| f.boundary) else {
            return;
        };
        let visible = self.frames[boundary..]
            .iter()
            .any(|f| f.declared.contains(&alias));
        if !visible {
            self.violations.insert(alias);
        }
    }

    pub fn violations(&self) -> impl Iterator<Item = AliasId> + '_ {
        self.violations.iter().copied()
    }
}

impl Default for CteScopeValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlVisitor for CteScopeValidator {
    fn visit_derived_table(&mut self, table: &DerivedTable) {
        let boundary = table.is_cte || (self.frames.is_empty() && self.root_is_boundary);
        self.frames.push(Frame {
            declared: table.declared_aliases(),
            boundary,
        });
        walk_derived_table_ref(self, table);
        self.frames.pop();
    }

    fn visit_expr(&mut self, expr: &SqlExpr) {
        if let SqlExpr::Column(column) = expr {
            self.check(column.source);
        }
        walk_expr_ref(self, expr);
    }
}

/// Aliases read across a CTE boundary anywhere in `statement`.
pub fn validate_cte_scopes(statement: &SqlStatement) -> Vec<AliasId> {
    let mut validator = CteScopeValidator::new();
    walk_statement_ref(&mut validator, statement);
    let violations: Vec<AliasId> = validator.violations().collect();
    violations
}

/// Check `body` as a CTE body, whether or not it is flagged as one.
pub fn check_cte_body(body: &DerivedTable) -> QueryResult<()> {
    let mut validator = CteScopeValidator {
        root_is_boundary: true,
        ..CteScopeValidator::new()
    };
    validator.visit_derived_table(body);
    let first = validator.violations().next();
    match first {
        Some(alias) => Err(QueryError::IllegalCteReference { alias }),
        None => Ok(()),
    }
}
