//! Data source aliases.
//!
//! Every data source in a conversion carries an [`AliasId`] handed out by the
//! conversion's [`AliasGenerator`]. Identity checks (is this column produced by
//! that source? is this source already attached?) compare ids, never names.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Stable identifier of a data source within one conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AliasId(u32);

impl AliasId {
    /// Wrap a raw index. Only the generator guarantees uniqueness.
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for AliasId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a{}", self.0)
    }
}

/// Allocates alias ids and remembers a human-readable name for each.
///
/// One generator belongs to one conversion and is threaded through it
/// explicitly, so independent conversions on different threads never share
/// naming state.
#[derive(Debug, Default, Clone)]
pub struct AliasGenerator {
    next: u32,
    names: HashMap<AliasId, String>,
}

impl AliasGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Continue numbering after `last`, for rewrites that run on a finished tree.
    pub fn resume_after(last: Option<AliasId>) -> Self {
        Self {
            next: last.map_or(0, |id| id.0 + 1),
            names: HashMap::new(),
        }
    }

    /// Allocate a fresh alias. The hint only feeds the debug name.
    pub fn allocate(&mut self, hint: &str) -> AliasId {
        let id = AliasId(self.next);
        self.next += 1;

        let prefix = hint
            .chars()
            .find(|c| c.is_ascii_alphabetic())
            .map(|c| c.to_ascii_lowercase())
            .unwrap_or('t');
        self.names.insert(id, format!("{}{}", prefix, id.0));
        id
    }

    /// Debug name of an alias (`c0`, `o1`, ...), falling back to `a<n>`.
    pub fn debug_name(&self, id: AliasId) -> String {
        self.names
            .get(&id)
            .cloned()
            .unwrap_or_else(|| id.to_string())
    }

    /// Number of aliases handed out so far.
    pub fn allocated(&self) -> u32 {
        self.next
    }
}
