//! The payload exchanged with the store for one key.

use serde::{Deserialize, Serialize};

use crate::causal::CausalToken;
use crate::error::StoreResult;
use crate::index::Indexes;

/// Content type of JSON-encoded record data.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// A tagged, directed reference to another key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Link {
    /// Relation tag (e.g. `"artist"`).
    pub tag: String,
    /// Key of the target record.
    pub key: String,
    /// Bucket of the target, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
}

impl Link {
    pub fn new(tag: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            key: key.into(),
            bucket: None,
        }
    }

    #[must_use]
    pub fn in_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = Some(bucket.into());
        self
    }
}

/// One stored version of a key: raw data plus metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Absent only on a write that asks the store to assign a key.
    pub key: Option<String>,
    pub raw_data: Vec<u8>,
    pub content_type: String,
    /// Causal context of the read this envelope descends from.
    pub context: Option<CausalToken>,
    pub links: Vec<Link>,
    pub indexes: Indexes,
}

impl Envelope {
    /// Creates an empty JSON envelope.
    pub fn new(key: Option<String>) -> Self {
        Self {
            key,
            raw_data: Vec::new(),
            content_type: JSON_CONTENT_TYPE.to_string(),
            context: None,
            links: Vec::new(),
            indexes: Indexes::new(),
        }
    }

    /// Replaces the payload with JSON-encoded `data`.
    pub fn set_data(&mut self, data: &serde_json::Value) -> StoreResult<()> {
        self.raw_data = serde_json::to_vec(data)?;
        Ok(())
    }

    /// Decodes the payload as JSON. An empty payload decodes as `null`.
    pub fn data(&self) -> StoreResult<serde_json::Value> {
        if self.raw_data.is_empty() {
            return Ok(serde_json::Value::Null);
        }
        Ok(serde_json::from_slice(&self.raw_data)?)
    }
}

/// Outcome of reading one key.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    /// Exactly one version exists.
    Found(Envelope),
    /// Two or more concurrent versions exist, in store-returned order.
    Conflicted(Vec<Envelope>),
    /// The key does not exist.
    NotFound,
}

impl Lookup {
    #[must_use]
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    #[must_use]
    pub fn is_conflicted(&self) -> bool {
        matches!(self, Self::Conflicted(_))
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    /// Number of versions returned (0 when not found).
    #[must_use]
    pub fn version_count(&self) -> usize {
        match self {
            Self::Found(_) => 1,
            Self::Conflicted(siblings) => siblings.len(),
            Self::NotFound => 0,
        }
    }
}
