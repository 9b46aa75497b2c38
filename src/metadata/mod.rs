//! Metadata provider module.
//!
//! Entity-to-table mappings and navigation members, consulted while a host
//! query is converted.
//!
//! # Example
//!
//! ```ignore
//! use quarry::metadata::{InMemoryMetadata, MetadataProvider};
//!
//! let metadata = InMemoryMetadata::from_file("model.toml")?;
//! let customer = metadata.entity("Customer");
//! let orders = metadata.navigation("Customer", "Orders");
//! ```

mod memory;
mod provider;

pub use memory::{InMemoryMetadata, MetadataError};
pub use provider::{
    EntityMetadata, KeyPair, MetadataProvider, Navigation, NavigationKind, PropertyColumn,
};
