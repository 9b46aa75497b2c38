//! Per-conversion state shared by every builder of one host query.

use std::collections::HashSet;

use super::{QueryError, QueryResult};
use crate::config::Settings;
use crate::metadata::MetadataProvider;
use crate::sql::{
    AliasGenerator, AliasId, AliasedDataSource, DataSource, DerivedTable, ModelPath, TableColumn,
    TableSource,
};

/// State of one conversion: alias allocation, which data sources already
/// belong to a unit, and the CTE bodies currently being built.
#[derive(Debug, Clone)]
pub struct ConversionContext {
    aliases: AliasGenerator,
    attached: HashSet<AliasId>,
    cte_scopes: Vec<HashSet<AliasId>>,
    collision_separator: String,
}

impl Default for ConversionContext {
    fn default() -> Self {
        Self::with_settings(&Settings::default())
    }
}

impl ConversionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: &Settings) -> Self {
        Self {
            aliases: AliasGenerator::new(),
            attached: HashSet::new(),
            cte_scopes: Vec::new(),
            collision_separator: settings.projection.collision_separator.clone(),
        }
    }

    pub fn allocate_alias(&mut self, hint: &str) -> AliasId {
        self.aliases.allocate(hint)
    }

    pub fn alias_name(&self, alias: AliasId) -> String {
        self.aliases.debug_name(alias)
    }

    pub fn aliases(&self) -> &AliasGenerator {
        &self.aliases
    }

    pub fn collision_separator(&self) -> &str {
        &self.collision_separator
    }

    /// Record that `alias` now belongs to a unit. A data source has one parent.
    pub(crate) fn attach(&mut self, alias: AliasId) -> QueryResult<()> {
        if !self.attached.insert(alias) {
            return Err(QueryError::DataSourceAlreadyAttached(alias));
        }
        Ok(())
    }

    /// Release a source whose unit was dissolved, so it can be attached again.
    pub(crate) fn detach(&mut self, alias: AliasId) {
        self.attached.remove(&alias);
    }

    pub fn is_attached(&self, alias: AliasId) -> bool {
        self.attached.contains(&alias)
    }

    // =========================================================================
    // Data source construction
    // =========================================================================

    /// A fresh, unattached table source for `entity`.
    pub fn table_source(
        &mut self,
        provider: &dyn MetadataProvider,
        entity: &str,
    ) -> QueryResult<AliasedDataSource> {
        let metadata = provider
            .entity(entity)
            .ok_or_else(|| QueryError::UnknownEntity(entity.to_string()))?;

        let table = TableSource {
            entity: metadata.name.clone(),
            schema: metadata.schema.clone(),
            name: metadata.table.clone(),
            columns: metadata
                .columns
                .iter()
                .map(|c| TableColumn::new(&c.column, ModelPath::parse(&c.property)))
                .collect(),
        };

        let alias = self.allocate_alias(entity);
        Ok(AliasedDataSource::new(alias, DataSource::Table(table)))
    }

    /// A fresh, unattached source reading from a finished unit.
    pub fn derived_source(&mut self, unit: DerivedTable) -> AliasedDataSource {
        let alias = self.allocate_alias("derived");
        AliasedDataSource::new(alias, DataSource::Derived(Box::new(unit)))
    }

    // =========================================================================
    // CTE scopes
    // =========================================================================

    /// Enter the body of a CTE under construction.
    pub fn begin_cte_scope(&mut self) {
        self.cte_scopes.push(HashSet::new());
    }

    pub fn end_cte_scope(&mut self) {
        self.cte_scopes.pop();
    }

    /// Register a source that only exists inside the innermost CTE body.
    pub fn register_cte_alias(&mut self, alias: AliasId) {
        if let Some(scope) = self.cte_scopes.last_mut() {
            scope.insert(alias);
        }
    }

    /// Whether `alias` is bound to a CTE body under construction.
    pub fn is_cte_scoped(&self, alias: AliasId) -> bool {
        self.cte_scopes.iter().any(|scope| scope.contains(&alias))
    }

    pub fn cte_depth(&self) -> usize {
        self.cte_scopes.len()
    }
}
