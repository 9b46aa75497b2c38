//! In-memory metadata provider, loadable from TOML.
//!
//! ```toml
//! [[entities]]
//! name = "Customer"
//! table = "customers"
//! columns = [
//!     { property = "Id", column = "id" },
//!     { property = "Name", column = "name" },
//! ]
//! primary_key = ["Id"]
//!
//! [[entities.navigations]]
//! member = "Orders"
//! target = "Order"
//! kind = "to_children"
//! keys = [{ from = "Id", to = "CustomerId" }]
//! ```

use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::provider::{EntityMetadata, MetadataProvider};

/// Error type for metadata loading.
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("Metadata file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read metadata file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse metadata: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Entity defined twice: {0}")]
    DuplicateEntity(String),

    #[error("Navigation {entity}.{member} targets unknown entity {target}")]
    UnknownTarget {
        entity: String,
        member: String,
        target: String,
    },
}

#[derive(Debug, Deserialize)]
struct MetadataFile {
    #[serde(default)]
    entities: Vec<EntityMetadata>,
}

/// Provider backed by a map of entity mappings.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMetadata {
    entities: HashMap<String, EntityMetadata>,
}

impl InMemoryMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an entity.
    pub fn with_entity(mut self, entity: EntityMetadata) -> Self {
        self.entities.insert(entity.name.clone(), entity);
        self
    }

    pub fn from_toml_str(content: &str) -> Result<Self, MetadataError> {
        let file: MetadataFile = toml::from_str(content)?;

        let mut metadata = Self::new();
        for entity in file.entities {
            if metadata.entities.contains_key(&entity.name) {
                return Err(MetadataError::DuplicateEntity(entity.name));
            }
            metadata.entities.insert(entity.name.clone(), entity);
        }
        metadata.check_navigation_targets()?;
        Ok(metadata)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, MetadataError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(MetadataError::FileNotFound(path.to_path_buf()));
        }
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Entities sorted by name.
    pub fn entities(&self) -> Vec<&EntityMetadata> {
        let mut entities: Vec<_> = self.entities.values().collect();
        entities.sort_by(|a, b| a.name.cmp(&b.name));
        entities
    }

    fn check_navigation_targets(&self) -> Result<(), MetadataError> {
        for entity in self.entities.values() {
            for navigation in &entity.navigations {
                if !self.entities.contains_key(&navigation.target) {
                    return Err(MetadataError::UnknownTarget {
                        entity: entity.name.clone(),
                        member: navigation.member.clone(),
                        target: navigation.target.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

impl MetadataProvider for InMemoryMetadata {
    fn entity(&self, name: &str) -> Option<&EntityMetadata> {
        self.entities.get(name)
    }
}
