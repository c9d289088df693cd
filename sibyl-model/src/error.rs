//! Error types for the object layer.

use sibyl_store::{IndexKind, StoreError};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Result type for object-layer operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors that can occur while declaring, saving, loading or querying records.
#[derive(Debug, Error)]
pub enum ModelError {
    /// No schema is registered under this kind.
    #[error("unknown record kind: {0}")]
    UnknownKind(String),

    /// A schema declaration is inconsistent.
    #[error("invalid schema for {kind}: {reason}")]
    Schema { kind: String, reason: String },

    /// A value was assigned to a name the kind does not declare.
    #[error("{kind} has no field {field}")]
    UnknownField { kind: String, field: String },

    /// The operation needs a key and the record has none.
    #[error("{0} record has no key")]
    MissingKey(String),

    /// The index is not declared for this kind.
    #[error("{kind} has no secondary index on {field}")]
    UnknownIndex { kind: String, field: String },

    /// The link tag is not declared for this kind.
    #[error("{kind} has no link tagged {tag}")]
    UnknownLink { kind: String, tag: String },

    /// A single-valued operation was used on a multi-valued tag or vice versa.
    #[error("link {tag} is {declared}-valued")]
    LinkArity { tag: String, declared: &'static str },

    /// An assigned key cannot be changed.
    #[error("key of {kind} {key} cannot change")]
    KeyImmutable { kind: String, key: String },

    /// Field-level rules failed; the store was not contacted.
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),

    /// A non-nullable index field has no value.
    #[error("missing value for index {field}")]
    MissingIndex { field: String },

    /// An index field's value cannot be represented as the declared kind.
    #[error("value of index {field} is not a valid {kind} index value")]
    IndexType { field: String, kind: IndexKind },

    /// The key does not exist in the store.
    #[error("{kind} {key} not found")]
    NotFound { kind: String, key: String },

    /// Siblings could not be reduced to one record.
    #[error("cannot resolve siblings of {key}: {reason}")]
    ConflictResolution { key: String, reason: String },

    /// Store transport or server failure, passed through as-is.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Per-field validation messages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors(BTreeMap<String, String>);

impl ValidationErrors {
    #[must_use]
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Records a message for `field`, replacing any earlier one.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.insert(field.into(), message.into());
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub(crate) fn to_json(&self) -> serde_json::Value {
        self.0
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect::<serde_json::Map<_, _>>()
            .into()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, message) in &self.0 {
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "{field} {message}")?;
            first = false;
        }
        Ok(())
    }
}
