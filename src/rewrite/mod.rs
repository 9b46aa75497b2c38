//! Expression-level rewrites shared by the postprocessing passes.
//!
//! - [`join_predicate`] - correlated subquery to join condition
//! - [`redundant_true`] - cleanup of `true` operands left by extraction

pub mod join_predicate;
pub mod redundant_true;

pub use join_predicate::{extract_join, is_joinable, JoinPromotion};
pub use redundant_true::{remove_redundant_true, RedundantTrueRemover};
