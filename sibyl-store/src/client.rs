//! The narrow interface the object layer calls the store through.

use std::collections::BTreeMap;

use crate::envelope::{Envelope, Lookup};
use crate::error::StoreResult;
use crate::index::IndexValue;
use crate::options::{DeleteOptions, GetOptions, PutOptions};

/// Bucket properties as reported by the store.
pub type BucketProps = BTreeMap<String, serde_json::Value>;

/// Bucket property that lets the store keep concurrent siblings.
pub const ALLOW_MULT: &str = "allow_mult";

/// A handle to the backing key/value store.
///
/// All calls block the caller. Implementations own timeouts and transport
/// retries; errors are returned as-is and the object layer never retries.
pub trait StoreClient: Send + Sync {
    /// Reads a key. Concurrent versions come back as [`Lookup::Conflicted`].
    fn get(&self, bucket: &str, key: &str, opts: &GetOptions) -> StoreResult<Lookup>;

    /// Writes an envelope and returns the stored version, carrying the key
    /// (assigned by the store if the envelope had none) and a fresh causal
    /// token.
    fn put(&self, bucket: &str, envelope: &Envelope, opts: &PutOptions) -> StoreResult<Envelope>;

    /// Deletes a key. Returns `true` if it existed.
    fn delete(&self, bucket: &str, key: &str, opts: &DeleteOptions) -> StoreResult<bool>;

    /// Checks whether a key exists.
    fn exists(&self, bucket: &str, key: &str) -> StoreResult<bool>;

    /// Reads several keys. Missing keys map to [`Lookup::NotFound`].
    ///
    /// Default implementation calls `get()` for each key.
    fn get_many(&self, bucket: &str, keys: &[String]) -> StoreResult<BTreeMap<String, Lookup>> {
        let opts = GetOptions::default();
        keys.iter()
            .map(|key| Ok((key.clone(), self.get(bucket, key, &opts)?)))
            .collect()
    }

    /// Exact-match secondary index query. Returns matching keys in the
    /// order the store reports them.
    fn query_index(&self, bucket: &str, field: &str, value: &IndexValue) -> StoreResult<Vec<String>>;

    fn bucket_properties(&self, bucket: &str) -> StoreResult<BucketProps>;

    /// Merges `props` into the bucket's properties.
    fn set_bucket_properties(&self, bucket: &str, props: &BucketProps) -> StoreResult<()>;
}
