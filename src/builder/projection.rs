//! Auto-projection and model-path resolution.
//!
//! A unit closed without an explicit SELECT list exposes every column of its
//! sources. Each output column keeps the model path of the member it came
//! from, which is how a later member access finds it again after the unit has
//! been nested one or more times.

use std::collections::HashSet;

use super::{ConversionContext, QueryBuilder, QueryError, QueryResult};
use crate::sql::{col, AliasId, DerivedTable, ModelPath, SelectColumn, SqlExpr};

/// Hands out unique output column names, suffixing repeats with a counter.
#[derive(Debug, Clone)]
pub struct ColumnNames {
    separator: String,
    taken: HashSet<String>,
}

impl ColumnNames {
    pub fn new(separator: &str) -> Self {
        Self {
            separator: separator.to_string(),
            taken: HashSet::new(),
        }
    }

    /// `name` if still free, else the first free `name{sep}{n}` for n = 1, 2, ...
    pub fn claim(&mut self, name: &str) -> String {
        if self.taken.insert(name.to_string()) {
            return name.to_string();
        }
        let mut n = 1;
        loop {
            let candidate = format!("{}{}{}", name, self.separator, n);
            if self.taken.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }
}

/// Columns exposing every source of `unit`. Navigation joins are left out
/// unless `apply_all` is set.
pub fn auto_projection_columns(
    unit: &DerivedTable,
    apply_all: bool,
    separator: &str,
) -> Vec<SelectColumn> {
    let navigation: HashSet<AliasId> = unit
        .joins
        .iter()
        .filter(|j| j.navigation)
        .map(|j| j.source.alias)
        .collect();

    let mut names = ColumnNames::new(separator);
    let mut paths = HashSet::new();
    let mut columns = Vec::new();

    for source in unit.data_sources() {
        if navigation.contains(&source.alias) && !apply_all {
            continue;
        }
        for (column, member) in source.output_columns() {
            let alias = names.claim(&column);
            let mut model_path = source.model_path.append(&member);
            // Two sources mapped onto the same path: the later one is only
            // reachable through its output name.
            if !paths.insert(model_path.clone()) {
                model_path = ModelPath::parse(&alias);
                paths.insert(model_path.clone());
            }
            columns.push(SelectColumn {
                expr: col(source.alias, &column),
                alias,
                model_path,
            });
        }
    }
    columns
}

impl QueryBuilder {
    /// Project every source's columns if no projection is set.
    pub fn apply_auto_projection(
        &mut self,
        ctx: &ConversionContext,
        apply_all: bool,
    ) -> QueryResult<()> {
        if self.unit.projection.is_some() {
            return Ok(());
        }

        let columns = auto_projection_columns(&self.unit, apply_all, ctx.collision_separator());
        if columns.is_empty() {
            return Err(QueryError::InvalidArgument(format!(
                "data source {} exposes no columns",
                ctx.alias_name(self.unit.from.alias)
            )));
        }

        log::trace!(
            "Auto-projected {} columns for {}",
            columns.len(),
            ctx.alias_name(self.unit.from.alias)
        );
        self.unit.projection = Some(columns);
        self.unit.auto_projection = true;
        Ok(())
    }

    /// The expression a host member access at `path` denotes in this unit.
    ///
    /// An explicit projection is authoritative. Otherwise the source with the
    /// longest model path leading `path` supplies the column.
    pub fn resolve_member(&self, path: &ModelPath) -> QueryResult<SqlExpr> {
        if let Some(projection) = &self.unit.projection {
            if let Some(column) = projection.iter().find(|c| &c.model_path == path) {
                return Ok(column.expr.clone());
            }
            if !self.unit.auto_projection {
                return Err(QueryError::UnresolvedMember { path: path.clone() });
            }
        }

        let mut best: Option<(usize, SqlExpr)> = None;
        for source in self.unit.data_sources() {
            let Some(member) = path.strip_prefix(&source.model_path) else {
                continue;
            };
            let Some(column) = source.column_for_path(&member) else {
                continue;
            };
            let depth = source.model_path.len();
            if best.as_ref().map_or(true, |(d, _)| depth > *d) {
                best = Some((depth, col(source.alias, &column)));
            }
        }

        best.map(|(_, expr)| expr)
            .ok_or_else(|| QueryError::UnresolvedMember { path: path.clone() })
    }

    /// Alias of the source sitting exactly at `path`, if any.
    pub fn resolve_source(&self, path: &ModelPath) -> Option<AliasId> {
        self.unit.source_at_path(path).map(|s| s.alias)
    }

    /// Every column of source `alias` as select columns, tagged under `prefix`.
    pub fn source_columns(&self, alias: AliasId, prefix: &ModelPath) -> QueryResult<Vec<SelectColumn>> {
        let source = self
            .unit
            .find_source(alias)
            .ok_or(QueryError::UnknownDataSource(alias))?;

        Ok(source
            .output_columns()
            .into_iter()
            .map(|(column, member)| SelectColumn {
                expr: col(alias, &column),
                alias: column,
                model_path: prefix.append(&member),
            })
            .collect())
    }

    /// Move everything tagged under `old` to `new`, keeping column references.
    /// Returns how many paths changed.
    pub fn reshape(&mut self, old: &ModelPath, new: &ModelPath) -> usize {
        let mut changed = 0;

        for source in self.unit.data_sources_mut() {
            if let Some(path) = source.model_path.replace_prefix(old, new) {
                source.model_path = path;
                changed += 1;
            }
        }
        if let Some(projection) = &mut self.unit.projection {
            for column in projection {
                if let Some(path) = column.model_path.replace_prefix(old, new) {
                    column.model_path = path;
                    changed += 1;
                }
            }
        }

        self.navigations = std::mem::take(&mut self.navigations)
            .into_iter()
            .map(|(path, alias)| (path.replace_prefix(old, new).unwrap_or(path), alias))
            .collect();

        changed
    }
}
