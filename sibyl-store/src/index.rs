//! Secondary index entries as they travel with a write.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Storage kind of a secondary index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    Integer,
    Binary,
}

impl IndexKind {
    /// Wire suffix appended to the field name (`artist_id_int`, `genre_bin`).
    #[must_use]
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Integer => "_int",
            Self::Binary => "_bin",
        }
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer => f.write_str("integer"),
            Self::Binary => f.write_str("binary"),
        }
    }
}

/// One indexed value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IndexValue {
    Int(i64),
    Bin(String),
}

impl IndexValue {
    #[must_use]
    pub fn kind(&self) -> IndexKind {
        match self {
            Self::Int(_) => IndexKind::Integer,
            Self::Bin(_) => IndexKind::Binary,
        }
    }
}

impl fmt::Display for IndexValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Bin(s) => f.write_str(s),
        }
    }
}

/// The index entries attached to one envelope, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Indexes(BTreeMap<String, BTreeSet<IndexValue>>);

impl Indexes {
    #[must_use]
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Adds a value under `field`. Duplicate values collapse.
    pub fn insert(&mut self, field: impl Into<String>, value: IndexValue) {
        self.0.entry(field.into()).or_default().insert(value);
    }

    /// Values indexed under `field`.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&BTreeSet<IndexValue>> {
        self.0.get(field)
    }

    /// Returns true if `value` is indexed under `field`.
    #[must_use]
    pub fn contains(&self, field: &str, value: &IndexValue) -> bool {
        self.0.get(field).is_some_and(|values| values.contains(value))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &BTreeSet<IndexValue>)> {
        self.0.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
