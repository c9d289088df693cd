//! Kind → declaration lookup.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{ModelError, ModelResult};
use crate::handler::{DefaultHandler, RecordHandler};
use crate::schema::RecordSchema;

#[derive(Clone)]
struct KindEntry {
    schema: Arc<RecordSchema>,
    handler: Arc<dyn RecordHandler>,
}

/// Schemas and handlers for every record kind, registered once at startup.
#[derive(Clone, Default)]
pub struct SchemaRegistry {
    kinds: HashMap<String, KindEntry>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a kind with the no-op handler.
    pub fn register(&mut self, schema: RecordSchema) -> ModelResult<Arc<RecordSchema>> {
        self.register_with_handler(schema, Arc::new(DefaultHandler))
    }

    /// Registers a kind. The schema is validated and a kind can be
    /// registered only once.
    pub fn register_with_handler(
        &mut self,
        schema: RecordSchema,
        handler: Arc<dyn RecordHandler>,
    ) -> ModelResult<Arc<RecordSchema>> {
        schema.validate()?;
        if self.kinds.contains_key(&schema.kind) {
            return Err(ModelError::Schema {
                kind: schema.kind,
                reason: "already registered".into(),
            });
        }
        let schema = Arc::new(schema);
        self.kinds.insert(
            schema.kind.clone(),
            KindEntry {
                schema: Arc::clone(&schema),
                handler,
            },
        );
        Ok(schema)
    }

    pub fn schema(&self, kind: &str) -> ModelResult<&Arc<RecordSchema>> {
        self.entry(kind).map(|e| &e.schema)
    }

    pub fn handler(&self, kind: &str) -> ModelResult<&Arc<dyn RecordHandler>> {
        self.entry(kind).map(|e| &e.handler)
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.kinds.contains_key(kind)
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.kinds.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    fn entry(&self, kind: &str) -> ModelResult<&KindEntry> {
        self.kinds
            .get(kind)
            .ok_or_else(|| ModelError::UnknownKind(kind.to_string()))
    }
}

impl fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}
