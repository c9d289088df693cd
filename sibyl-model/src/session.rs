//! The lifecycle pipeline: save, delete, reload and lookups.
//!
//! A [`Session`] ties a [`SchemaRegistry`] to a [`ClientProvider`] for one
//! execution context. Every store call goes through the handle the provider
//! caches for that context; after a failed call the caller may
//! [`invalidate_client`](Session::invalidate_client) and retry by hand. The
//! session itself never retries.

use sibyl_store::{
    ALLOW_MULT, BucketProps, ClientProvider, DeleteOptions, GetOptions, JSON_CONTENT_TYPE, Lookup,
    PutOptions, StoreClient,
};
use sibyl_types::{ContextId, Value};
use std::sync::Arc;
use tracing::{debug, info};

use crate::conflict::bind;
use crate::error::{ModelError, ModelResult, ValidationErrors};
use crate::handler::RecordHandler;
use crate::index::{declared_index, indexes_for_save, to_index_value};
use crate::record::Record;
use crate::registry::SchemaRegistry;
use crate::schema::RecordSchema;

/// Defaults applied to every store call a session makes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Content type written on every envelope.
    pub content_type: String,
    pub get: GetOptions,
    pub put: PutOptions,
    pub delete: DeleteOptions,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            content_type: JSON_CONTENT_TYPE.to_string(),
            get: GetOptions::default(),
            put: PutOptions::default(),
            delete: DeleteOptions::default(),
        }
    }
}

/// Options for one save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveOptions {
    /// Run validation before writing.
    pub validate: bool,
    pub put: PutOptions,
}

impl SaveOptions {
    /// Skips validation. Index checks still run.
    #[must_use]
    pub fn without_validation() -> Self {
        Self {
            validate: false,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_put(mut self, put: PutOptions) -> Self {
        self.put = put;
        self
    }
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            validate: true,
            put: PutOptions::default(),
        }
    }
}

/// Options for one load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    /// Resolve siblings. When off, a conflicted key fails the load.
    pub merge: bool,
    pub get: GetOptions,
}

impl LoadOptions {
    #[must_use]
    pub fn without_merge() -> Self {
        Self {
            merge: false,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_get(mut self, get: GetOptions) -> Self {
        self.get = get;
        self
    }
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            merge: true,
            get: GetOptions::default(),
        }
    }
}

/// Persists and loads records for one execution context.
///
/// A session created with [`Session::new`] owns its context and releases the
/// provider's handles for it when dropped. Sessions joined to an existing
/// context with [`Session::with_context`] leave the handles cached.
#[derive(Debug)]
pub struct Session {
    registry: Arc<SchemaRegistry>,
    provider: Arc<ClientProvider>,
    context: ContextId,
    owns_context: bool,
    config: SessionConfig,
}

impl Session {
    /// Creates a session with a fresh execution context.
    pub fn new(registry: Arc<SchemaRegistry>, provider: Arc<ClientProvider>) -> Self {
        let mut session = Self::with_context(registry, provider, ContextId::new());
        session.owns_context = true;
        session
    }

    /// Creates a session bound to an existing execution context, sharing its
    /// cached store handle.
    pub fn with_context(
        registry: Arc<SchemaRegistry>,
        provider: Arc<ClientProvider>,
        context: ContextId,
    ) -> Self {
        Self {
            registry,
            provider,
            context,
            owns_context: false,
            config: SessionConfig::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn context(&self) -> ContextId {
        self.context
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// The store handle for `kind` in this session's context.
    pub fn client(&self, kind: &str) -> ModelResult<Arc<dyn StoreClient>> {
        Ok(self.provider.acquire(self.context, kind)?)
    }

    /// Drops this context's cached handles so the next call gets fresh ones.
    pub fn invalidate_client(&self) -> bool {
        self.provider.invalidate(self.context)
    }

    fn kind(&self, kind: &str) -> ModelResult<(&Arc<RecordSchema>, &Arc<dyn RecordHandler>)> {
        Ok((self.registry.schema(kind)?, self.registry.handler(kind)?))
    }

    // ── Construction ────────────────────────────────────────────────

    /// A new, unsaved record with defaults applied.
    pub fn new_record(&self, kind: &str, key: Option<&str>) -> ModelResult<Record> {
        let (schema, _) = self.kind(kind)?;
        Ok(Record::new(Arc::clone(schema), key))
    }

    /// A new, unsaved record with `values` assigned over the defaults.
    pub fn build<I, K, V>(&self, kind: &str, key: Option<&str>, values: I) -> ModelResult<Record>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let mut record = self.new_record(kind, key)?;
        record.assign(values)?;
        Ok(record)
    }

    /// Builds and saves a record.
    pub fn create<I, K, V>(
        &self,
        kind: &str,
        key: Option<&str>,
        values: I,
        opts: &SaveOptions,
    ) -> ModelResult<Record>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let mut record = self.build(kind, key, values)?;
        self.save(&mut record, opts)?;
        Ok(record)
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Clears prior errors and runs validation. True when no errors were
    /// recorded.
    ///
    /// The built-in rules: the record needs a non-empty key, and
    /// non-nullable fields need a value. The kind's handler adds its own.
    pub fn valid(&self, record: &mut Record) -> ModelResult<bool> {
        let (_, handler) = self.kind(record.kind())?;

        let mut errors = ValidationErrors::new();
        if record.key().is_none_or(str::is_empty) {
            errors.add("key", "is missing");
        }
        for field in record.schema().fields.iter().filter(|f| !f.nullable) {
            if record.get(&field.name).is_none_or(Value::is_null) {
                errors.add(field.name.clone(), "can't be null");
            }
        }
        handler.validate(record, &mut errors);

        let valid = errors.is_empty();
        record.errors = errors;
        Ok(valid)
    }

    /// Runs the save pipeline.
    ///
    /// Hooks run in order `before_create` (new records only), `before_save`,
    /// then validation, index computation and the write, then `after_create`
    /// (new records only) and `after_save`. A validation or index failure
    /// returns before the store is contacted; index violations are also
    /// recorded in the record's errors.
    pub fn save(&self, record: &mut Record, opts: &SaveOptions) -> ModelResult<()> {
        let (schema, handler) = self.kind(record.kind())?;
        let was_new = record.is_new();

        if was_new {
            handler.before_create(record);
        }
        handler.before_save(record);

        if opts.validate && !self.valid(record)? {
            return Err(ModelError::Validation(record.errors().clone()));
        }

        let indexes = indexes_for_save(schema, record)?;
        let envelope = record.to_envelope(indexes, &self.config.content_type)?;
        let put = opts.put.or(&self.config.put);
        let stored = self.client(record.kind())?.put(&schema.bucket, &envelope, &put)?;
        record.apply_write(&stored);
        debug!("Saved {}/{:?}", schema.bucket, record.key());

        if was_new {
            handler.after_create(record);
        }
        handler.after_save(record);
        record.is_new = false;
        Ok(())
    }

    /// Deletes the record's key. Returns true if it existed.
    pub fn delete(&self, record: &mut Record, opts: &DeleteOptions) -> ModelResult<bool> {
        let (schema, handler) = self.kind(record.kind())?;
        let key = record
            .key()
            .map(str::to_string)
            .ok_or_else(|| ModelError::MissingKey(schema.kind.clone()))?;

        handler.before_delete(record);
        let delete = opts.or(&self.config.delete);
        let existed = self.client(&schema.kind)?.delete(&schema.bucket, &key, &delete)?;
        debug!("Deleted {}/{} (existed: {})", schema.bucket, key, existed);
        handler.after_delete(record);
        Ok(existed)
    }

    /// Re-reads the record from the store, resolving siblings, then runs
    /// `after_load`.
    pub fn reload(&self, record: &mut Record, opts: &LoadOptions) -> ModelResult<()> {
        let (schema, handler) = self.kind(record.kind())?;
        let key = record
            .key()
            .map(str::to_string)
            .ok_or_else(|| ModelError::MissingKey(schema.kind.clone()))?;

        let get = opts.get.or(&self.config.get);
        let lookup = self.client(&schema.kind)?.get(&schema.bucket, &key, &get)?;
        debug!(
            "Reloaded {}/{} ({} version(s))",
            schema.bucket,
            key,
            lookup.version_count()
        );
        if !bind(record, &**handler, &key, &lookup, opts.merge)? {
            return Err(ModelError::NotFound {
                kind: schema.kind.clone(),
                key,
            });
        }
        handler.after_load(record);
        Ok(())
    }

    /// Assigns one field and saves.
    pub fn update_attribute(
        &self,
        record: &mut Record,
        field: &str,
        value: impl Into<Value>,
    ) -> ModelResult<()> {
        record.set(field, value)?;
        self.save(record, &SaveOptions::default())
    }

    /// Assigns several fields and saves.
    pub fn update_attributes<I, K, V>(&self, record: &mut Record, values: I) -> ModelResult<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        record.assign(values)?;
        self.save(record, &SaveOptions::default())
    }

    // ── Lookups by key ──────────────────────────────────────────────

    /// Loads a record. `Ok(None)` when the key does not exist.
    pub fn find(&self, kind: &str, key: &str) -> ModelResult<Option<Record>> {
        self.find_with(kind, key, &LoadOptions::default())
    }

    pub fn find_with(&self, kind: &str, key: &str, opts: &LoadOptions) -> ModelResult<Option<Record>> {
        let (schema, handler) = self.kind(kind)?;
        let get = opts.get.or(&self.config.get);
        let lookup = self.client(kind)?.get(&schema.bucket, key, &get)?;
        self.bind_lookup(schema, handler, key, &lookup, opts.merge)
    }

    /// Builds a record from an already-fetched lookup and runs `after_load`.
    pub fn from_envelope(&self, kind: &str, lookup: &Lookup) -> ModelResult<Option<Record>> {
        let (schema, handler) = self.kind(kind)?;
        let key = match lookup {
            Lookup::Found(envelope) => envelope.key.clone(),
            Lookup::Conflicted(siblings) => siblings.first().and_then(|s| s.key.clone()),
            Lookup::NotFound => return Ok(None),
        }
        .unwrap_or_default();
        self.bind_lookup(schema, handler, &key, lookup, true)
    }

    /// Loads several keys in one batch. Missing keys are dropped; the rest
    /// keep the input order.
    pub fn find_all_by_key(&self, kind: &str, keys: &[&str]) -> ModelResult<Vec<Record>> {
        let (schema, handler) = self.kind(kind)?;
        let keys: Vec<String> = keys.iter().map(|k| (*k).to_string()).collect();
        let lookups = self.client(kind)?.get_many(&schema.bucket, &keys)?;

        let mut records = Vec::with_capacity(keys.len());
        for key in &keys {
            let Some(lookup) = lookups.get(key) else {
                continue;
            };
            if let Some(record) = self.bind_lookup(schema, handler, key, lookup, true)? {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Loads the record, or builds a new unsaved one under `key`.
    pub fn get_or_new(&self, kind: &str, key: &str) -> ModelResult<Record> {
        match self.find(kind, key)? {
            Some(record) => Ok(record),
            None => self.new_record(kind, Some(key)),
        }
    }

    /// Checks a key. A `None` key never exists.
    pub fn exists(&self, kind: &str, key: Option<&str>) -> ModelResult<bool> {
        let Some(key) = key else {
            return Ok(false);
        };
        let (schema, _) = self.kind(kind)?;
        Ok(self.client(kind)?.exists(&schema.bucket, key)?)
    }

    /// Deletes a key without loading it. A `None` key is a no-op.
    pub fn delete_key(
        &self,
        kind: &str,
        key: Option<&str>,
        opts: &DeleteOptions,
    ) -> ModelResult<bool> {
        let Some(key) = key else {
            return Ok(false);
        };
        let (schema, _) = self.kind(kind)?;
        let delete = opts.or(&self.config.delete);
        Ok(self.client(kind)?.delete(&schema.bucket, key, &delete)?)
    }

    /// Lets the kind's bucket keep siblings. Returns true if the property
    /// changed.
    pub fn allow_mult(&self, kind: &str) -> ModelResult<bool> {
        let (schema, _) = self.kind(kind)?;
        let client = self.client(kind)?;
        let props = client.bucket_properties(&schema.bucket)?;
        if props.get(ALLOW_MULT).and_then(serde_json::Value::as_bool) == Some(true) {
            return Ok(false);
        }

        let mut update = BucketProps::new();
        update.insert(ALLOW_MULT.to_string(), serde_json::Value::Bool(true));
        client.set_bucket_properties(&schema.bucket, &update)?;
        info!("Enabled {} on bucket {}", ALLOW_MULT, schema.bucket);
        Ok(true)
    }

    /// Enables siblings on the bucket of every registered kind that declares
    /// `allow_mult`. Returns how many buckets changed.
    pub fn apply_bucket_properties(&self) -> ModelResult<usize> {
        let mut changed = 0;
        for kind in self.registry.kinds() {
            if self.registry.schema(kind)?.allow_mult && self.allow_mult(kind)? {
                changed += 1;
            }
        }
        Ok(changed)
    }

    fn bind_lookup(
        &self,
        schema: &Arc<RecordSchema>,
        handler: &Arc<dyn RecordHandler>,
        key: &str,
        lookup: &Lookup,
        merge: bool,
    ) -> ModelResult<Option<Record>> {
        let mut record = Record::new(Arc::clone(schema), Some(key));
        if !bind(&mut record, &**handler, key, lookup, merge)? {
            return Ok(None);
        }
        handler.after_load(&mut record);
        Ok(Some(record))
    }

    // ── Lookups by index ────────────────────────────────────────────

    /// Keys whose `field` index holds `value`, in store order.
    pub fn index_keys(&self, kind: &str, field: &str, value: impl Into<Value>) -> ModelResult<Vec<String>> {
        let (schema, _) = self.kind(kind)?;
        let index = declared_index(schema, field)?;
        let value = to_index_value(index, &value.into())?;
        Ok(self
            .client(kind)?
            .query_index(&schema.bucket, &index.wire_name(), &value)?)
    }

    /// First record whose `field` index holds `value`.
    pub fn find_one_by_index(
        &self,
        kind: &str,
        field: &str,
        value: impl Into<Value>,
    ) -> ModelResult<Option<Record>> {
        for key in self.index_keys(kind, field, value)? {
            if let Some(record) = self.find(kind, &key)? {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    /// Every record whose `field` index holds `value`, each resolved on its
    /// own. Keys deleted since the query are skipped.
    pub fn find_all_by_index(
        &self,
        kind: &str,
        field: &str,
        value: impl Into<Value>,
    ) -> ModelResult<Vec<Record>> {
        let mut records = Vec::new();
        for key in self.index_keys(kind, field, value)? {
            if let Some(record) = self.find(kind, &key)? {
                records.push(record);
            }
        }
        Ok(records)
    }

    // ── Typed associations ──────────────────────────────────────────

    /// Loads the record an associated index field points at.
    pub fn index_association(&self, record: &Record, field: &str) -> ModelResult<Option<Record>> {
        let index = declared_index(record.schema(), field)?;
        let Some(association) = &index.association else {
            return Err(ModelError::Schema {
                kind: record.kind().to_string(),
                reason: format!("index {field} has no association"),
            });
        };
        match record.get(field) {
            Some(Value::Int(i)) => self.find(&association.target_kind, &i.to_string()),
            Some(Value::Str(key)) => self.find(&association.target_kind, key),
            _ => Ok(None),
        }
    }

    /// Loads the record a single-valued link points at.
    pub fn linked(&self, record: &Record, tag: &str) -> ModelResult<Option<Record>> {
        let target_kind = self.link_target(record, tag)?;
        match record.link(tag)? {
            Some(key) => self.find(&target_kind, key),
            None => Ok(None),
        }
    }

    /// Loads every record a multi-valued link points at. Targets that no
    /// longer exist are skipped.
    pub fn linked_all(&self, record: &Record, tag: &str) -> ModelResult<Vec<Record>> {
        let target_kind = self.link_target(record, tag)?;
        let keys = record.linked_keys(tag)?;
        self.find_all_by_key(&target_kind, &keys)
    }

    fn link_target(&self, record: &Record, tag: &str) -> ModelResult<String> {
        record
            .declared_link(tag)?
            .target_kind
            .clone()
            .ok_or_else(|| ModelError::Schema {
                kind: record.kind().to_string(),
                reason: format!("link {tag} has no target kind"),
            })
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.owns_context {
            self.provider.release(self.context);
        }
    }
}
