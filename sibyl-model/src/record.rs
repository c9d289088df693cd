//! A record instance: key, typed values, links and lifecycle flags.

use chrono::{DateTime, Utc};
use sibyl_store::{CausalToken, Envelope, Indexes, Link};
use sibyl_types::{InstanceId, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::error::{ModelError, ModelResult, ValidationErrors};
use crate::schema::RecordSchema;

/// A record's id: its key as an integer when the key parses as one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RecordId {
    Int(i64),
    Str(String),
}

impl RecordId {
    pub fn from_key(key: &str) -> Self {
        key.parse().map_or_else(|_| Self::Str(key.to_string()), Self::Int)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Str(s) => f.write_str(s),
        }
    }
}

impl From<RecordId> for Value {
    fn from(id: RecordId) -> Self {
        match id {
            RecordId::Int(i) => Value::Int(i),
            RecordId::Str(s) => Value::Str(s),
        }
    }
}

/// One instance of a record kind.
///
/// Not synchronized: a record belongs to one execution context at a time.
/// Persisting and loading go through a [`Session`](crate::Session).
#[derive(Debug, Clone)]
pub struct Record {
    schema: Arc<RecordSchema>,
    instance: InstanceId,
    key: Option<String>,
    values: BTreeMap<String, Value>,
    pub(crate) links: Vec<Link>,
    context: Option<CausalToken>,
    content_type: String,
    pub(crate) is_new: bool,
    is_merged: bool,
    pub(crate) errors: ValidationErrors,
}

impl Record {
    /// Creates a new, unsaved record with field defaults applied.
    pub fn new(schema: Arc<RecordSchema>, key: Option<&str>) -> Self {
        let mut record = Self {
            schema,
            instance: InstanceId::new(),
            key: key.map(str::to_string),
            values: BTreeMap::new(),
            links: Vec::new(),
            context: None,
            content_type: sibyl_store::JSON_CONTENT_TYPE.to_string(),
            is_new: true,
            is_merged: false,
            errors: ValidationErrors::new(),
        };
        record.apply_defaults();
        record
    }

    /// Decodes one stored version without running any hooks.
    pub(crate) fn decode(schema: Arc<RecordSchema>, envelope: &Envelope) -> Self {
        let mut record = Self::new(schema, envelope.key.as_deref());
        record.load_envelope(envelope);
        record
    }

    pub fn schema(&self) -> &Arc<RecordSchema> {
        &self.schema
    }

    pub fn kind(&self) -> &str {
        &self.schema.kind
    }

    pub fn bucket(&self) -> &str {
        &self.schema.bucket
    }

    pub fn instance_id(&self) -> InstanceId {
        self.instance
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    /// Assigns the key. Once a key is set it cannot change.
    pub fn set_key(&mut self, key: impl Into<String>) -> ModelResult<()> {
        let key = key.into();
        match &self.key {
            Some(current) if *current != key => Err(ModelError::KeyImmutable {
                kind: self.schema.kind.clone(),
                key: current.clone(),
            }),
            _ => {
                self.key = Some(key);
                Ok(())
            }
        }
    }

    /// The key parsed as an integer when possible.
    pub fn id(&self) -> Option<RecordId> {
        self.key.as_deref().map(RecordId::from_key)
    }

    pub fn is_new(&self) -> bool {
        self.is_new
    }

    /// True only right after a load that reconciled siblings.
    pub fn is_merged(&self) -> bool {
        self.is_merged
    }

    /// Messages from the most recent validation.
    pub fn errors(&self) -> &ValidationErrors {
        &self.errors
    }

    /// Causal context of the read this record descends from.
    pub fn context(&self) -> Option<&CausalToken> {
        self.context.as_ref()
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    // ── Values ──────────────────────────────────────────────────────

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    /// Assigns a declared field (or an index field).
    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> ModelResult<()> {
        if !self.schema.is_assignable(field) {
            return Err(ModelError::UnknownField {
                kind: self.schema.kind.clone(),
                field: field.to_string(),
            });
        }
        self.values.insert(field.to_string(), value.into());
        Ok(())
    }

    /// Assigns several fields. Stops at the first unknown one.
    pub fn assign<I, K, V>(&mut self, values: I) -> ModelResult<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        for (field, value) in values {
            self.set(field.as_ref(), value)?;
        }
        Ok(())
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.values.remove(field)
    }

    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_str)
    }

    pub fn get_i64(&self, field: &str) -> Option<i64> {
        self.get(field).and_then(Value::as_i64)
    }

    pub fn get_f64(&self, field: &str) -> Option<f64> {
        self.get(field).and_then(Value::as_f64)
    }

    pub fn get_bool(&self, field: &str) -> Option<bool> {
        self.get(field).and_then(Value::as_bool)
    }

    pub fn get_timestamp(&self, field: &str) -> Option<DateTime<Utc>> {
        self.get(field).and_then(Value::as_timestamp)
    }

    /// Values plus `key`, and `errors` when there are any.
    pub fn as_json(&self) -> serde_json::Value {
        let mut map = self.encode_values();
        map.insert(
            "key".to_string(),
            self.key
                .clone()
                .map_or(serde_json::Value::Null, serde_json::Value::String),
        );
        if !self.errors.is_empty() {
            map.insert("errors".to_string(), self.errors.to_json());
        }
        serde_json::Value::Object(map)
    }

    // ── Store plumbing ──────────────────────────────────────────────

    fn apply_defaults(&mut self) {
        for field in &self.schema.fields {
            let Some(default) = &field.default else {
                continue;
            };
            let missing = self.values.get(&field.name).is_none_or(Value::is_null);
            if missing {
                self.values.insert(field.name.clone(), default.clone());
            }
        }
    }

    fn encode_values(&self) -> serde_json::Map<String, serde_json::Value> {
        self.values
            .iter()
            .map(|(name, value)| (name.clone(), self.schema.field_type(name).encode(value)))
            .collect()
    }

    /// Builds the outgoing write for this record.
    pub(crate) fn to_envelope(&self, indexes: Indexes, content_type: &str) -> ModelResult<Envelope> {
        let mut envelope = Envelope::new(self.key.clone());
        envelope.set_data(&serde_json::Value::Object(self.encode_values()))?;
        envelope.content_type = content_type.to_string();
        envelope.context = self.context.clone();
        envelope.links = self.links.clone();
        envelope.indexes = indexes;
        Ok(envelope)
    }

    /// Replaces values, links and context with one stored version.
    ///
    /// Decoding is lenient: undecodable data loads as an empty record.
    pub(crate) fn load_envelope(&mut self, envelope: &Envelope) {
        let data = match envelope.data() {
            Ok(serde_json::Value::Object(map)) => map,
            Ok(serde_json::Value::Null) => serde_json::Map::new(),
            Ok(other) => {
                debug!(
                    "Ignoring non-object data for {}/{:?}: {}",
                    self.schema.bucket, envelope.key, other
                );
                serde_json::Map::new()
            }
            Err(e) => {
                debug!(
                    "Ignoring undecodable data for {}/{:?}: {}",
                    self.schema.bucket, envelope.key, e
                );
                serde_json::Map::new()
            }
        };

        self.values = data
            .iter()
            .map(|(name, raw)| (name.clone(), self.schema.field_type(name).cast(raw)))
            .collect();
        self.apply_defaults();

        if self.key.is_none() {
            self.key.clone_from(&envelope.key);
        }
        self.links.clone_from(&envelope.links);
        self.context.clone_from(&envelope.context);
        self.content_type.clone_from(&envelope.content_type);
        self.is_new = false;
        self.is_merged = false;
    }

    /// Takes over the state of a merge result, keeping this instance's
    /// identity.
    pub(crate) fn adopt(&mut self, resolved: Record) {
        if self.key.is_none() {
            self.key = resolved.key;
        }
        self.values = resolved.values;
        self.links = resolved.links;
        self.context = resolved.context;
        self.content_type = resolved.content_type;
        self.is_new = false;
        self.is_merged = true;
    }

    /// Records the outcome of a successful write.
    pub(crate) fn apply_write(&mut self, stored: &Envelope) {
        if self.key.is_none() {
            self.key.clone_from(&stored.key);
        }
        self.context.clone_from(&stored.context);
        self.is_merged = false;
    }
}

impl PartialEq for Record {
    /// Same kind, and the same key. Two keyless records are equal only when
    /// they share an instance; a keyed record never equals a keyless one.
    fn eq(&self, other: &Self) -> bool {
        if self.schema.kind != other.schema.kind {
            return false;
        }
        match (&self.key, &other.key) {
            (Some(mine), Some(theirs)) => mine == theirs,
            (None, None) => self.instance == other.instance,
            _ => false,
        }
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#<{} {} {}>",
            self.schema.kind,
            self.key.as_deref().unwrap_or(""),
            serde_json::Value::Object(self.encode_values())
        )
    }
}
