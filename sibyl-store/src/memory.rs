//! Sibling-aware in-memory backend for tests and embedding.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use sibyl_types::ActorId;
use tracing::debug;
use uuid::Uuid;

use crate::causal::VectorClock;
use crate::client::{BucketProps, StoreClient, ALLOW_MULT};
use crate::envelope::{Envelope, Lookup};
use crate::error::{StoreError, StoreResult};
use crate::index::IndexValue;
use crate::options::{DeleteOptions, GetOptions, PutOptions};

struct Version {
    envelope: Envelope,
    clock: VectorClock,
}

#[derive(Default)]
struct Bucket {
    props: BucketProps,
    objects: BTreeMap<String, Vec<Version>>,
}

impl Bucket {
    fn allow_mult(&self) -> bool {
        self.props
            .get(ALLOW_MULT)
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
    }
}

/// In-memory store with sibling semantics.
///
/// Intended for tests and embedding. Each key holds a set of versions tagged
/// with vector clocks. Every write is stamped by a fresh actor, so two writes
/// that did not observe each other are always concurrent. With `allow_mult`
/// set on the bucket they are both kept as siblings; otherwise the latest
/// write replaces everything.
///
/// Index queries return keys in ascending order.
pub struct InMemoryStore {
    buckets: RwLock<HashMap<String, Bucket>>,
    outage: RwLock<Option<String>>,
    puts: AtomicU64,
}

impl InMemoryStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self {
            buckets: RwLock::new(HashMap::new()),
            outage: RwLock::new(None),
            puts: AtomicU64::new(0),
        }
    }

    /// Makes every subsequent call fail with [`StoreError::Unavailable`].
    pub fn fail_with(&self, reason: impl Into<String>) {
        *self.outage.write().unwrap_or_else(PoisonError::into_inner) = Some(reason.into());
    }

    /// Ends an outage started by [`InMemoryStore::fail_with`].
    pub fn recover(&self) {
        *self.outage.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Number of `put` calls received, including failed ones.
    pub fn put_count(&self) -> u64 {
        self.puts.load(Ordering::SeqCst)
    }

    /// Number of keys stored in `bucket`.
    pub fn key_count(&self, bucket: &str) -> usize {
        self.read_buckets().get(bucket).map_or(0, |b| b.objects.len())
    }

    /// Number of versions currently held for a key.
    pub fn version_count(&self, bucket: &str, key: &str) -> usize {
        self.read_buckets()
            .get(bucket)
            .and_then(|b| b.objects.get(key))
            .map_or(0, Vec::len)
    }

    /// Removes all data and bucket properties.
    pub fn clear(&self) {
        self.write_buckets().clear();
    }

    fn read_buckets(&self) -> RwLockReadGuard<'_, HashMap<String, Bucket>> {
        self.buckets.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_buckets(&self) -> RwLockWriteGuard<'_, HashMap<String, Bucket>> {
        self.buckets.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_available(&self) -> StoreResult<()> {
        match &*self.outage.read().unwrap_or_else(PoisonError::into_inner) {
            Some(reason) => Err(StoreError::Unavailable(reason.clone())),
            None => Ok(()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreClient for InMemoryStore {
    fn get(&self, bucket: &str, key: &str, _opts: &GetOptions) -> StoreResult<Lookup> {
        self.check_available()?;
        let buckets = self.read_buckets();
        let Some(versions) = buckets.get(bucket).and_then(|b| b.objects.get(key)) else {
            return Ok(Lookup::NotFound);
        };

        // All siblings share the merged context, so a write presenting it
        // supersedes every one of them.
        let clock = versions
            .iter()
            .fold(VectorClock::new(), |acc, v| acc.joined(&v.clock));
        let token = clock.to_token()?;

        let mut envelopes: Vec<Envelope> = versions
            .iter()
            .map(|v| Envelope {
                context: Some(token.clone()),
                ..v.envelope.clone()
            })
            .collect();

        Ok(match envelopes.len() {
            0 => Lookup::NotFound,
            1 => Lookup::Found(envelopes.remove(0)),
            _ => Lookup::Conflicted(envelopes),
        })
    }

    fn put(&self, bucket: &str, envelope: &Envelope, _opts: &PutOptions) -> StoreResult<Envelope> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;

        let incoming = match &envelope.context {
            Some(token) => VectorClock::from_token(token)?,
            None => VectorClock::new(),
        };
        let key = envelope
            .key
            .clone()
            .unwrap_or_else(|| Uuid::now_v7().to_string());

        let mut buckets = self.write_buckets();
        let bucket_state = buckets.entry(bucket.to_string()).or_default();
        let allow_mult = bucket_state.allow_mult();
        let versions = bucket_state.objects.entry(key.clone()).or_default();

        let mut clock = if allow_mult {
            versions.retain(|v| !incoming.descends_from(&v.clock));
            incoming
        } else {
            let merged = versions
                .iter()
                .fold(incoming, |acc, v| acc.joined(&v.clock));
            versions.clear();
            merged
        };
        clock.tick(ActorId::new());

        let stored = Envelope {
            key: Some(key.clone()),
            context: Some(clock.to_token()?),
            ..envelope.clone()
        };
        versions.push(Version {
            envelope: Envelope {
                context: None,
                ..stored.clone()
            },
            clock,
        });
        debug!("Stored {}/{} ({} version(s))", bucket, key, versions.len());

        Ok(stored)
    }

    fn delete(&self, bucket: &str, key: &str, _opts: &DeleteOptions) -> StoreResult<bool> {
        self.check_available()?;
        let mut buckets = self.write_buckets();
        Ok(buckets
            .get_mut(bucket)
            .and_then(|b| b.objects.remove(key))
            .is_some())
    }

    fn exists(&self, bucket: &str, key: &str) -> StoreResult<bool> {
        self.check_available()?;
        Ok(self
            .read_buckets()
            .get(bucket)
            .and_then(|b| b.objects.get(key))
            .is_some_and(|versions| !versions.is_empty()))
    }

    fn query_index(&self, bucket: &str, field: &str, value: &IndexValue) -> StoreResult<Vec<String>> {
        self.check_available()?;
        let buckets = self.read_buckets();
        let Some(bucket_state) = buckets.get(bucket) else {
            return Ok(Vec::new());
        };
        Ok(bucket_state
            .objects
            .iter()
            .filter(|(_, versions)| {
                versions
                    .iter()
                    .any(|v| v.envelope.indexes.contains(field, value))
            })
            .map(|(key, _)| key.clone())
            .collect())
    }

    fn bucket_properties(&self, bucket: &str) -> StoreResult<BucketProps> {
        self.check_available()?;
        let buckets = self.read_buckets();
        let mut props = buckets
            .get(bucket)
            .map(|b| b.props.clone())
            .unwrap_or_default();
        props
            .entry(ALLOW_MULT.to_string())
            .or_insert(serde_json::Value::Bool(false));
        Ok(props)
    }

    fn set_bucket_properties(&self, bucket: &str, props: &BucketProps) -> StoreResult<()> {
        self.check_available()?;
        let mut buckets = self.write_buckets();
        let bucket_state = buckets.entry(bucket.to_string()).or_default();
        for (name, value) in props {
            bucket_state.props.insert(name.clone(), value.clone());
        }
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let buckets = self.read_buckets();
        f.debug_struct("InMemoryStore")
            .field("buckets", &buckets.len())
            .field("puts", &self.put_count())
            .finish()
    }
}
