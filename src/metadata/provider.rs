//! MetadataProvider trait definition.
//!
//! Conversion asks the provider two things: how an entity maps onto a table,
//! and how a navigation member of an entity reaches another entity. Lookups
//! are synchronous and return borrowed metadata; a provider that fetches
//! remotely is expected to have loaded what it serves before conversion starts.

use serde::{Deserialize, Serialize};

/// How a navigation member relates its entity to the target entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationKind {
    /// Required many-to-one: every row has a parent.
    ToParent,
    /// Optional many-to-one.
    ToParentOptional,
    /// One-to-many.
    ToChildren,
    /// One-to-zero-or-one.
    ToSingleChild,
}

impl NavigationKind {
    pub fn is_to_one(self) -> bool {
        !matches!(self, NavigationKind::ToChildren)
    }
}

/// Property on the source entity matched to a property on the target.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct KeyPair {
    pub from: String,
    pub to: String,
}

/// A navigation member of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Navigation {
    pub member: String,
    pub target: String,
    pub kind: NavigationKind,
    pub keys: Vec<KeyPair>,
}

impl Navigation {
    pub fn new(member: &str, target: &str, kind: NavigationKind) -> Self {
        Self {
            member: member.to_string(),
            target: target.to_string(),
            kind,
            keys: Vec::new(),
        }
    }

    pub fn key(mut self, from: &str, to: &str) -> Self {
        self.keys.push(KeyPair {
            from: from.to_string(),
            to: to.to_string(),
        });
        self
    }
}

/// Scalar property stored in a column.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PropertyColumn {
    pub property: String,
    pub column: String,
}

/// Mapping of one host entity onto a table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct EntityMetadata {
    pub name: String,
    pub table: String,
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub columns: Vec<PropertyColumn>,
    #[serde(default)]
    pub primary_key: Vec<String>,
    #[serde(default)]
    pub navigations: Vec<Navigation>,
}

impl EntityMetadata {
    pub fn new(name: &str, table: &str) -> Self {
        Self {
            name: name.to_string(),
            table: table.to_string(),
            schema: None,
            columns: Vec::new(),
            primary_key: Vec::new(),
            navigations: Vec::new(),
        }
    }

    pub fn schema(mut self, schema: &str) -> Self {
        self.schema = Some(schema.to_string());
        self
    }

    pub fn column(mut self, property: &str, column: &str) -> Self {
        self.columns.push(PropertyColumn {
            property: property.to_string(),
            column: column.to_string(),
        });
        self
    }

    pub fn primary_key(mut self, property: &str) -> Self {
        self.primary_key.push(property.to_string());
        self
    }

    pub fn navigation(mut self, navigation: Navigation) -> Self {
        self.navigations.push(navigation);
        self
    }

    /// Column storing `property`.
    pub fn column_for(&self, property: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|c| c.property == property)
            .map(|c| c.column.as_str())
    }

    pub fn find_navigation(&self, member: &str) -> Option<&Navigation> {
        self.navigations.iter().find(|n| n.member == member)
    }
}

/// Trait for looking up entity mappings.
pub trait MetadataProvider {
    /// Mapping of the named entity, if known.
    fn entity(&self, name: &str) -> Option<&EntityMetadata>;

    /// Navigation `member` of `entity`, if both exist.
    fn navigation(&self, entity: &str, member: &str) -> Option<&Navigation> {
        self.entity(entity)
            .and_then(|metadata| metadata.find_navigation(member))
    }
}
