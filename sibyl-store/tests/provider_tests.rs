use sibyl_store::{
    ClientProvider, ClientSource, GetOptions, InMemoryStore, StoreClient, StoreError,
};
use sibyl_types::ContextId;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

fn counting_factory(counter: Arc<AtomicUsize>) -> ClientSource {
    ClientSource::factory(move |_kind| {
        counter.fetch_add(1, Ordering::SeqCst);
        let client: Arc<dyn StoreClient> = Arc::new(InMemoryStore::new());
        Ok(client)
    })
}

// ── Caching ──────────────────────────────────────────────────────

#[test]
fn fixed_source_shares_one_handle() {
    let store = Arc::new(InMemoryStore::new());
    let provider = ClientProvider::new(ClientSource::fixed(store.clone()));

    let a = provider.acquire(ContextId::new(), "album").unwrap();
    let b = provider.acquire(ContextId::new(), "album").unwrap();
    assert!(Arc::ptr_eq(&a, &b));
}

#[test]
fn acquire_caches_per_context() {
    let calls = Arc::new(AtomicUsize::new(0));
    let provider = ClientProvider::new(counting_factory(calls.clone()));
    let ctx = ContextId::new();

    let first = provider.acquire(ctx, "album").unwrap();
    let second = provider.acquire(ctx, "album").unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn contexts_get_distinct_handles() {
    let calls = Arc::new(AtomicUsize::new(0));
    let provider = ClientProvider::new(counting_factory(calls.clone()));

    let a = provider.acquire(ContextId::new(), "album").unwrap();
    let b = provider.acquire(ContextId::new(), "album").unwrap();
    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(provider.cached_handles(), 2);
}

#[test]
fn factory_receives_record_kind() {
    let provider = ClientProvider::new(ClientSource::factory(|kind| {
        if kind == "album" {
            let client: Arc<dyn StoreClient> = Arc::new(InMemoryStore::new());
            Ok(client)
        } else {
            Err(StoreError::NoClient(kind.to_string()))
        }
    }));

    assert!(provider.acquire(ContextId::new(), "album").is_ok());
    assert!(matches!(
        provider.acquire(ContextId::new(), "artist"),
        Err(StoreError::NoClient(kind)) if kind == "artist"
    ));
}

// ── Invalidation ─────────────────────────────────────────────────

#[test]
fn invalidate_forces_fresh_handle() {
    let calls = Arc::new(AtomicUsize::new(0));
    let provider = ClientProvider::new(counting_factory(calls.clone()));
    let ctx = ContextId::new();

    let before = provider.acquire(ctx, "album").unwrap();
    assert!(provider.invalidate(ctx));
    let after = provider.acquire(ctx, "album").unwrap();

    assert!(!Arc::ptr_eq(&before, &after));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn invalidate_unknown_context_is_noop() {
    let provider = ClientProvider::new(ClientSource::fixed(Arc::new(InMemoryStore::new())));
    assert!(!provider.invalidate(ContextId::new()));
}

#[test]
fn invalidate_leaves_other_contexts_alone() {
    let calls = Arc::new(AtomicUsize::new(0));
    let provider = ClientProvider::new(counting_factory(calls.clone()));
    let keep = ContextId::new();
    let drop = ContextId::new();

    let kept = provider.acquire(keep, "album").unwrap();
    provider.acquire(drop, "album").unwrap();
    provider.invalidate(drop);

    assert!(Arc::ptr_eq(&kept, &provider.acquire(keep, "album").unwrap()));
}

#[test]
fn release_forgets_every_handle_of_a_context() {
    let provider = ClientProvider::new(ClientSource::fixed(Arc::new(InMemoryStore::new())))
        .with_kind_source("artist", ClientSource::fixed(Arc::new(InMemoryStore::new())));
    let ended = ContextId::new();
    let live = ContextId::new();

    provider.acquire(ended, "album").unwrap();
    provider.acquire(ended, "artist").unwrap();
    provider.acquire(live, "album").unwrap();
    assert_eq!(provider.cached_handles(), 3);

    assert_eq!(provider.release(ended), 2);
    assert_eq!(provider.cached_handles(), 1);
    assert_eq!(provider.release(ended), 0);
}

#[test]
fn reacquire_fails_over_to_next_host() {
    let primary = Arc::new(InMemoryStore::new());
    let secondary = Arc::new(InMemoryStore::new());
    primary.fail_with("primary down");

    let hosts: Vec<Arc<dyn StoreClient>> = vec![primary.clone(), secondary.clone()];
    let next = Arc::new(AtomicUsize::new(0));
    let provider = ClientProvider::new(ClientSource::factory(move |_| {
        let i = next.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::clone(&hosts[i % hosts.len()]))
    }));
    let ctx = ContextId::new();

    let client = provider.acquire(ctx, "album").unwrap();
    assert!(client.get("albums", "1", &GetOptions::default()).is_err());

    let client = provider.reacquire(ctx, "album").unwrap();
    assert!(client.get("albums", "1", &GetOptions::default()).is_ok());
}

// ── Per-kind sources ─────────────────────────────────────────────

#[test]
fn kind_source_overrides_default() {
    let default_store = Arc::new(InMemoryStore::new());
    let archive_store = Arc::new(InMemoryStore::new());
    let provider = ClientProvider::new(ClientSource::fixed(default_store.clone()))
        .with_kind_source("archive", ClientSource::fixed(archive_store.clone()));
    let ctx = ContextId::new();

    let archive: Arc<dyn StoreClient> = archive_store;
    let default: Arc<dyn StoreClient> = default_store;
    assert!(Arc::ptr_eq(&provider.acquire(ctx, "archive").unwrap(), &archive));
    assert!(Arc::ptr_eq(&provider.acquire(ctx, "album").unwrap(), &default));
}

#[test]
fn no_source_is_an_error() {
    let provider = ClientProvider::without_default();
    assert!(matches!(
        provider.acquire(ContextId::new(), "album"),
        Err(StoreError::NoClient(_))
    ));
}

// ── Concurrency ──────────────────────────────────────────────────

#[test]
fn concurrent_contexts_never_share_factory_handles() {
    let calls = Arc::new(AtomicUsize::new(0));
    let provider = Arc::new(ClientProvider::new(counting_factory(calls.clone())));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let provider = Arc::clone(&provider);
            thread::spawn(move || {
                let ctx = ContextId::new();
                let a = provider.acquire(ctx, "album").unwrap();
                let b = provider.acquire(ctx, "album").unwrap();
                assert!(Arc::ptr_eq(&a, &b));
                Arc::as_ptr(&a) as *const () as usize
            })
        })
        .collect();

    let mut ptrs: Vec<usize> = handles
        .into_iter()
        .map(|h| h.join().expect("thread should not panic"))
        .collect();
    ptrs.sort_unstable();
    ptrs.dedup();
    assert_eq!(ptrs.len(), 8);
    assert_eq!(calls.load(Ordering::SeqCst), 8);
}
