#![allow(dead_code)]

use sibyl_model::{
    FieldDescriptor, IndexDescriptor, LinkDescriptor, MergeStrategy, Record, RecordHandler,
    RecordSchema, SchemaRegistry, Session, ValidationErrors,
};
use sibyl_store::{ClientProvider, ClientSource, InMemoryStore};
use std::sync::{Arc, Mutex};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

// ── Schemas ──────────────────────────────────────────────────────

pub fn album_schema() -> RecordSchema {
    RecordSchema::new("album", "albums")
        .with_field(FieldDescriptor::string("name"))
        .with_field(FieldDescriptor::integer("year").with_default(0))
        .with_field(FieldDescriptor::timestamp("released_at"))
        .with_field(FieldDescriptor::any("tags").with_default(Vec::<sibyl_types::Value>::new()))
        .with_index(IndexDescriptor::integer("artist_id").maps_to("artist").allow_nil())
        .with_index(IndexDescriptor::binary("label_key").maps_to_key("label").allow_nil())
        .with_index(IndexDescriptor::binary("genre").allow_nil())
        .with_index(IndexDescriptor::binary("tags").multi().allow_nil())
        .with_link(LinkDescriptor::one("artist").to("artist"))
        .with_link(LinkDescriptor::many("similar").to("album"))
        .with_allow_mult()
}

pub fn artist_schema() -> RecordSchema {
    RecordSchema::new("artist", "artists").with_field(FieldDescriptor::string("name"))
}

pub fn label_schema() -> RecordSchema {
    RecordSchema::new("label", "labels").with_field(FieldDescriptor::string("name"))
}

/// A kind with a non-nullable index.
pub fn city_schema() -> RecordSchema {
    RecordSchema::new("city", "cities")
        .with_field(FieldDescriptor::string("name"))
        .with_index(IndexDescriptor::integer("country_id"))
}

/// A sibling-friendly kind that merges by set union of `members`.
pub fn band_schema() -> RecordSchema {
    RecordSchema::new("band", "bands")
        .with_field(FieldDescriptor::any("members").with_default(Vec::<sibyl_types::Value>::new()))
        .with_allow_mult()
        .with_merge_strategy(MergeStrategy::Custom)
}

// ── Handlers ─────────────────────────────────────────────────────

/// Records the order hooks fire in and rejects an empty `name`.
#[derive(Default)]
pub struct RecordingHandler {
    pub calls: Mutex<Vec<&'static str>>,
}

impl RecordingHandler {
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    fn push(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
    }
}

impl RecordHandler for RecordingHandler {
    fn before_create(&self, _: &mut Record) {
        self.push("before_create");
    }

    fn before_save(&self, _: &mut Record) {
        self.push("before_save");
    }

    fn after_create(&self, _: &mut Record) {
        self.push("after_create");
    }

    fn after_save(&self, _: &mut Record) {
        self.push("after_save");
    }

    fn before_delete(&self, _: &mut Record) {
        self.push("before_delete");
    }

    fn after_delete(&self, _: &mut Record) {
        self.push("after_delete");
    }

    fn after_load(&self, _: &mut Record) {
        self.push("after_load");
    }

    fn validate(&self, record: &Record, errors: &mut ValidationErrors) {
        self.push("validate");
        if record.get_str("name") == Some("") {
            errors.add("name", "can't be blank");
        }
    }
}

/// Union of every sibling's `members`, in first-seen order.
pub struct UnionMembers;

impl RecordHandler for UnionMembers {
    fn merge(&self, candidates: Vec<Record>) -> Result<Record, String> {
        let mut members: Vec<sibyl_types::Value> = Vec::new();
        for candidate in &candidates {
            for member in candidate.get("members").and_then(|v| v.as_list()).unwrap_or_default() {
                if !members.contains(member) {
                    members.push(member.clone());
                }
            }
        }
        let mut merged = candidates.into_iter().next().ok_or("no candidates")?;
        merged.set("members", members).map_err(|e| e.to_string())?;
        Ok(merged)
    }
}

/// A merge that always fails.
pub struct RefuseMerge;

impl RecordHandler for RefuseMerge {
    fn merge(&self, _: Vec<Record>) -> Result<Record, String> {
        Err("manual repair required".to_string())
    }
}

// ── Fixtures ─────────────────────────────────────────────────────

pub fn registry() -> SchemaRegistry {
    let mut registry = SchemaRegistry::new();
    registry.register(album_schema()).unwrap();
    registry.register(artist_schema()).unwrap();
    registry.register(label_schema()).unwrap();
    registry.register(city_schema()).unwrap();
    registry
        .register_with_handler(band_schema(), Arc::new(UnionMembers))
        .unwrap();
    registry
}

pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub provider: Arc<ClientProvider>,
    pub session: Session,
}

impl Harness {
    pub fn new(registry: SchemaRegistry) -> Self {
        init_tracing();
        let store = Arc::new(InMemoryStore::new());
        let provider = Arc::new(ClientProvider::new(ClientSource::fixed(store.clone())));
        let session = Session::new(Arc::new(registry), Arc::clone(&provider));
        session.apply_bucket_properties().unwrap();
        Self {
            store,
            provider,
            session,
        }
    }

    /// A second session over the same store, in its own context.
    pub fn other_session(&self) -> Session {
        Session::new(Arc::new(registry()), Arc::clone(&self.provider))
    }
}

pub fn harness() -> Harness {
    Harness::new(registry())
}
