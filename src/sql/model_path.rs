//! Model paths: where a column sits in the object graph the host query projects.
//!
//! A path like `Customer.Address.City` tags a column (or a whole data source)
//! so that a later member access in the host language finds the right physical
//! column, even after the unit has been re-projected or nested several times.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordered sequence of member names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelPath {
    segments: Vec<String>,
}

impl ModelPath {
    /// The root path (the row itself).
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse a dot-separated path. Empty segments are dropped, so `""` is the root.
    pub fn parse(dotted: &str) -> Self {
        Self::new(dotted.split('.').filter(|s| !s.is_empty()))
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn last(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Path without its last segment; the root stays the root.
    pub fn parent(&self) -> ModelPath {
        let mut segments = self.segments.clone();
        segments.pop();
        Self { segments }
    }

    /// `self` followed by `suffix`.
    pub fn append(&self, suffix: &ModelPath) -> ModelPath {
        let mut segments = self.segments.clone();
        segments.extend(suffix.segments.iter().cloned());
        Self { segments }
    }

    /// `prefix` followed by `self`.
    pub fn prepend(&self, prefix: &ModelPath) -> ModelPath {
        prefix.append(self)
    }

    pub fn child(&self, segment: &str) -> ModelPath {
        let mut segments = self.segments.clone();
        segments.push(segment.to_string());
        Self { segments }
    }

    pub fn starts_with(&self, prefix: &ModelPath) -> bool {
        self.segments.starts_with(&prefix.segments)
    }

    /// Remainder after `prefix`, or `None` when `prefix` does not lead this path.
    pub fn strip_prefix(&self, prefix: &ModelPath) -> Option<ModelPath> {
        self.segments
            .strip_prefix(prefix.segments.as_slice())
            .map(|rest| Self {
                segments: rest.to_vec(),
            })
    }

    /// Swap the leading `old` segments for `new`.
    pub fn replace_prefix(&self, old: &ModelPath, new: &ModelPath) -> Option<ModelPath> {
        self.strip_prefix(old).map(|rest| new.append(&rest))
    }
}

impl fmt::Display for ModelPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

impl From<&str> for ModelPath {
    fn from(dotted: &str) -> Self {
        Self::parse(dotted)
    }
}
