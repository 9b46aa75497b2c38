//! Common table expressions.
//!
//! - [`scope`] - rejects CTE bodies that read sources declared outside them
//! - [`recursive`] - anchor plus recursive member under one recursive CTE
//!
//! Promotion of a unit into a CTE lives on the builder
//! ([`crate::builder::QueryBuilder::make_cte`]); it fires automatically when a
//! clause reads a source bound to a CTE body under construction.

pub mod recursive;
pub mod scope;

pub use recursive::{recursive_union, RecursiveSource};
pub use scope::{check_cte_body, validate_cte_scopes, CteScopeValidator};
