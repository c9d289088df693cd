mod common;

use common::{harness, Harness, RecordingHandler};
use pretty_assertions::assert_eq;
use serde_json::json;
use sibyl_model::{
    FieldDescriptor, LoadOptions, ModelError, RecordSchema, SaveOptions, SchemaRegistry, Session,
    SessionConfig,
};
use sibyl_store::{
    ALLOW_MULT, ClientProvider, ClientSource, DeleteOptions, InMemoryStore, PutOptions,
    StoreClient, StoreError,
};
use sibyl_types::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn recorded() -> (Harness, Arc<RecordingHandler>) {
    let handler = Arc::new(RecordingHandler::default());
    let mut registry = SchemaRegistry::new();
    registry
        .register_with_handler(
            RecordSchema::new("artist", "artists")
                .with_field(FieldDescriptor::string("name"))
                .with_field(FieldDescriptor::integer("formed").required()),
            handler.clone(),
        )
        .unwrap();
    (Harness::new(registry), handler)
}

// ── Save ─────────────────────────────────────────────────────────

#[test]
fn first_save_runs_create_hooks() {
    let (h, handler) = recorded();
    let mut artist = h.session.build("artist", Some("1"), [("formed", 1970)]).unwrap();
    h.session.save(&mut artist, &SaveOptions::default()).unwrap();

    assert_eq!(
        handler.calls(),
        vec!["before_create", "before_save", "validate", "after_create", "after_save"]
    );
    assert!(!artist.is_new());
}

#[test]
fn later_saves_skip_create_hooks() {
    let (h, handler) = recorded();
    let mut artist = h.session.build("artist", Some("1"), [("formed", 1970)]).unwrap();
    h.session.save(&mut artist, &SaveOptions::default()).unwrap();
    handler.calls.lock().unwrap().clear();

    h.session.save(&mut artist, &SaveOptions::default()).unwrap();
    assert_eq!(handler.calls(), vec!["before_save", "validate", "after_save"]);
}

#[test]
fn missing_key_fails_validation_without_write() {
    let h = harness();
    let mut artist = h.session.new_record("artist", None).unwrap();
    let err = h.session.save(&mut artist, &SaveOptions::default()).unwrap_err();

    let ModelError::Validation(errors) = &err else {
        panic!("expected a validation failure, got {err:?}");
    };
    assert_eq!(errors.get("key"), Some("is missing"));
    assert_eq!(artist.errors().get("key"), Some("is missing"));
    assert_eq!(h.store.put_count(), 0);
    assert!(artist.is_new());
}

#[test]
fn blank_key_counts_as_missing() {
    let h = harness();
    let mut album = h.session.new_record("album", Some("")).unwrap();
    let err = h.session.save(&mut album, &SaveOptions::default()).unwrap_err();

    assert!(matches!(err, ModelError::Validation(_)));
    assert_eq!(album.errors().get("key"), Some("is missing"));
    assert_eq!(h.store.put_count(), 0);
    assert!(!h.session.exists("album", Some("")).unwrap());
}

#[test]
fn skipping_validation_lets_store_assign_key() {
    let h = harness();
    let mut artist = h.session.new_record("artist", None).unwrap();
    h.session
        .save(&mut artist, &SaveOptions::without_validation())
        .unwrap();

    let key = artist.key().expect("store assigned a key").to_string();
    assert!(h.session.exists("artist", Some(&key)).unwrap());
}

#[test]
fn handler_validation_blocks_save() {
    let (h, handler) = recorded();
    let mut artist = h
        .session
        .build("artist", Some("1"), [("name", Value::from("")), ("formed", Value::from(1))])
        .unwrap();

    assert!(matches!(
        h.session.save(&mut artist, &SaveOptions::default()),
        Err(ModelError::Validation(_))
    ));
    assert_eq!(artist.errors().get("name"), Some("can't be blank"));
    assert!(!handler.calls().contains(&"after_save"));
    assert_eq!(h.store.put_count(), 0);
    assert_eq!(
        artist.as_json()["errors"],
        json!({"name": "can't be blank"})
    );
}

#[test]
fn required_field_must_be_set() {
    let (h, _) = recorded();
    let mut artist = h.session.new_record("artist", Some("1")).unwrap();
    assert!(!h.session.valid(&mut artist).unwrap());
    assert_eq!(artist.errors().get("formed"), Some("can't be null"));

    artist.set("formed", 1975).unwrap();
    assert!(h.session.valid(&mut artist).unwrap());
    assert!(artist.errors().is_empty());
}

#[test]
fn save_writes_defaults_and_content_type() {
    let h = harness();
    let mut album = h.session.new_record("album", Some("1")).unwrap();
    h.session.save(&mut album, &SaveOptions::default()).unwrap();

    let lookup = h.store.get("albums", "1", &Default::default()).unwrap();
    let sibyl_store::Lookup::Found(env) = lookup else {
        panic!("expected a single version");
    };
    assert_eq!(env.data().unwrap(), json!({"year": 0, "tags": []}));
    assert_eq!(env.content_type, "application/json");
    assert!(album.context().is_some());
}

#[test]
fn session_content_type_is_written() {
    let h = harness();
    let session = h.other_session().with_config(SessionConfig {
        content_type: "application/x-sibyl+json".into(),
        ..SessionConfig::default()
    });
    let mut album = session.new_record("album", Some("1")).unwrap();
    session.save(&mut album, &SaveOptions::default()).unwrap();

    let reloaded = session.find("album", "1").unwrap().unwrap();
    assert_eq!(reloaded.content_type(), "application/x-sibyl+json");
}

#[test]
fn put_options_are_accepted() {
    let h = harness();
    let opts = SaveOptions::default().with_put(PutOptions::default().with_w(3).with_dw(2));
    h.session
        .create("artist", Some("1"), [("name", "x")], &opts)
        .unwrap();
    assert_eq!(h.store.put_count(), 1);
}

#[test]
fn update_attributes_assigns_and_saves() {
    let h = harness();
    let mut album = h
        .session
        .create("album", Some("1"), [("name", "Old")], &SaveOptions::default())
        .unwrap();
    h.session
        .update_attributes(&mut album, [("name", Value::from("New")), ("year", Value::from(1960))])
        .unwrap();

    let loaded = h.session.find("album", "1").unwrap().unwrap();
    assert_eq!(loaded.get_str("name"), Some("New"));
    assert_eq!(loaded.get_i64("year"), Some(1960));
}

#[test]
fn update_attribute_rejects_unknown_field() {
    let h = harness();
    let mut album = h.session.new_record("album", Some("1")).unwrap();
    assert!(matches!(
        h.session.update_attribute(&mut album, "colour", "red"),
        Err(ModelError::UnknownField { .. })
    ));
    assert_eq!(h.store.put_count(), 0);
}

// ── Delete ───────────────────────────────────────────────────────

#[test]
fn delete_runs_hooks_and_removes_key() {
    let (h, handler) = recorded();
    let mut artist = h
        .session
        .create("artist", Some("1"), [("formed", 1970)], &SaveOptions::default())
        .unwrap();
    handler.calls.lock().unwrap().clear();

    assert!(h.session.delete(&mut artist, &DeleteOptions::default()).unwrap());
    assert_eq!(handler.calls(), vec!["before_delete", "after_delete"]);
    assert!(!h.session.exists("artist", Some("1")).unwrap());
}

#[test]
fn delete_without_key_fails() {
    let h = harness();
    let mut artist = h.session.new_record("artist", None).unwrap();
    assert!(matches!(
        h.session.delete(&mut artist, &DeleteOptions::default()),
        Err(ModelError::MissingKey(kind)) if kind == "artist"
    ));
}

#[test]
fn delete_key_helpers() {
    let h = harness();
    h.session
        .create("artist", Some("1"), [("name", "x")], &SaveOptions::default())
        .unwrap();
    assert!(!h.session.delete_key("artist", None, &DeleteOptions::default()).unwrap());
    assert!(h.session.delete_key("artist", Some("1"), &DeleteOptions::default()).unwrap());
    assert!(!h.session.exists("artist", None).unwrap());
    assert!(!h.session.exists("artist", Some("1")).unwrap());
}

// ── Reload and lookups ───────────────────────────────────────────

#[test]
fn reload_replaces_local_changes_and_runs_after_load() {
    let (h, handler) = recorded();
    let mut artist = h
        .session
        .create(
            "artist",
            Some("1"),
            [("name", Value::from("Saved")), ("formed", Value::from(1))],
            &SaveOptions::default(),
        )
        .unwrap();
    artist.set("name", "Unsaved").unwrap();
    handler.calls.lock().unwrap().clear();

    h.session.reload(&mut artist, &LoadOptions::default()).unwrap();
    assert_eq!(artist.get_str("name"), Some("Saved"));
    assert_eq!(handler.calls(), vec!["after_load"]);
}

#[test]
fn reload_of_deleted_key_is_not_found() {
    let h = harness();
    let mut artist = h
        .session
        .create("artist", Some("1"), [("name", "x")], &SaveOptions::default())
        .unwrap();
    h.session.delete_key("artist", Some("1"), &DeleteOptions::default()).unwrap();

    assert!(matches!(
        h.session.reload(&mut artist, &LoadOptions::default()),
        Err(ModelError::NotFound { key, .. }) if key == "1"
    ));
}

#[test]
fn reload_without_key_fails() {
    let h = harness();
    let mut artist = h.session.new_record("artist", None).unwrap();
    assert!(matches!(
        h.session.reload(&mut artist, &LoadOptions::default()),
        Err(ModelError::MissingKey(_))
    ));
}

#[test]
fn find_missing_is_none() {
    let h = harness();
    assert!(h.session.find("artist", "nobody").unwrap().is_none());
}

#[test]
fn find_runs_after_load_once() {
    let (h, handler) = recorded();
    h.session
        .create("artist", Some("1"), [("formed", 1970)], &SaveOptions::default())
        .unwrap();
    handler.calls.lock().unwrap().clear();

    h.session.find("artist", "1").unwrap().unwrap();
    assert_eq!(handler.calls(), vec!["after_load"]);
}

#[test]
fn find_unknown_kind_fails() {
    let h = harness();
    assert!(matches!(
        h.session.find("planet", "1"),
        Err(ModelError::UnknownKind(_))
    ));
}

#[test]
fn loaded_values_are_cast_leniently() {
    let h = harness();
    let mut env = sibyl_store::Envelope::new(Some("1".into()));
    env.set_data(&json!({
        "year": "nineteen",
        "released_at": "2001-02-03T04:05:06Z",
        "extra": {"nested": true}
    }))
    .unwrap();
    h.store.put("albums", &env, &PutOptions::default()).unwrap();

    let album = h.session.find("album", "1").unwrap().unwrap();
    assert_eq!(album.get_str("year"), Some("nineteen"));
    assert!(album.get_timestamp("released_at").is_some());
    assert_eq!(album.get("extra"), Some(&Value::Raw(json!({"nested": true}))));
    assert_eq!(album.get("tags"), Some(&Value::List(vec![])));
}

#[test]
fn find_all_by_key_keeps_order_and_drops_missing() {
    let h = harness();
    for key in ["1", "2", "3"] {
        h.session
            .create("artist", Some(key), [("name", key)], &SaveOptions::default())
            .unwrap();
    }
    let found = h.session.find_all_by_key("artist", &["3", "404", "1"]).unwrap();
    let keys: Vec<_> = found.iter().map(|r| r.key().unwrap()).collect();
    assert_eq!(keys, vec!["3", "1"]);
}

#[test]
fn get_or_new_loads_or_builds() {
    let h = harness();
    h.session
        .create("artist", Some("1"), [("name", "x")], &SaveOptions::default())
        .unwrap();

    let existing = h.session.get_or_new("artist", "1").unwrap();
    assert!(!existing.is_new());
    assert_eq!(existing.get_str("name"), Some("x"));

    let fresh = h.session.get_or_new("artist", "2").unwrap();
    assert!(fresh.is_new());
    assert_eq!(fresh.key(), Some("2"));
}

// ── Bucket properties ────────────────────────────────────────────

#[test]
fn allow_mult_is_set_once() {
    let h = harness();
    assert!(h.session.allow_mult("artist").unwrap());
    assert!(!h.session.allow_mult("artist").unwrap());
    assert_eq!(
        h.store.bucket_properties("artists").unwrap()[ALLOW_MULT],
        json!(true)
    );
}

#[test]
fn declared_allow_mult_applied_at_startup() {
    let h = harness();
    assert_eq!(h.store.bucket_properties("albums").unwrap()[ALLOW_MULT], json!(true));
    assert_eq!(h.store.bucket_properties("cities").unwrap()[ALLOW_MULT], json!(false));
}

// ── Store failures ───────────────────────────────────────────────

#[test]
fn store_errors_pass_through_verbatim() {
    let h = harness();
    h.store.fail_with("connection refused");
    let err = h.session.find("artist", "1").unwrap_err();
    assert!(matches!(
        err,
        ModelError::Store(StoreError::Unavailable(ref reason)) if reason == "connection refused"
    ));
    assert_eq!(err.to_string(), "store unavailable: connection refused");
}

#[test]
fn failed_write_is_not_retried() {
    let h = harness();
    h.store.fail_with("timeout");
    let mut artist = h.session.new_record("artist", Some("1")).unwrap();
    assert!(h.session.save(&mut artist, &SaveOptions::default()).is_err());
    assert_eq!(h.store.put_count(), 1);
    assert!(artist.is_new());
}

#[test]
fn invalidate_then_retry_reaches_another_host() {
    let down = Arc::new(InMemoryStore::new());
    down.fail_with("host down");
    let up = Arc::new(InMemoryStore::new());
    let hosts: Vec<Arc<dyn StoreClient>> = vec![down, up.clone()];
    let next = Arc::new(AtomicUsize::new(0));
    let provider = Arc::new(ClientProvider::new(ClientSource::factory(move |_kind| {
        let i = next.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::clone(&hosts[i % hosts.len()]))
    })));
    let session = Session::new(Arc::new(common::registry()), provider);

    let mut artist = session.new_record("artist", Some("1")).unwrap();
    assert!(session.save(&mut artist, &SaveOptions::default()).is_err());

    assert!(session.invalidate_client());
    session.save(&mut artist, &SaveOptions::default()).unwrap();
    assert!(up.exists("artists", "1").unwrap());
}

// ── Context handles ──────────────────────────────────────────────

#[test]
fn dropped_sessions_release_their_handles() {
    let h = harness();
    let baseline = h.provider.cached_handles();

    for _ in 0..50 {
        let session = h.other_session();
        session.find("artist", "1").unwrap();
    }
    assert_eq!(h.provider.cached_handles(), baseline);
}

#[test]
fn joined_sessions_keep_the_shared_handle() {
    let h = harness();
    let registry = Arc::new(common::registry());
    let before = h.session.client("artist").unwrap();

    let joined = Session::with_context(registry, Arc::clone(&h.provider), h.session.context());
    let shared = joined.client("artist").unwrap();
    assert!(Arc::ptr_eq(&before, &shared));
    drop(joined);

    let after = h.session.client("artist").unwrap();
    assert!(Arc::ptr_eq(&before, &after));
    assert_eq!(h.provider.cached_handles(), 1);
}
