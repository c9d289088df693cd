//! Store boundary for sibyl.
//!
//! The object layer talks to the backing key/value store only through the
//! [`StoreClient`] trait defined here. This crate also provides:
//!
//! - [`Envelope`] / [`Lookup`]: one stored version, and the tri-state
//!   outcome of a read (found, conflicted siblings, not found)
//! - [`Link`] and [`Indexes`]: relation and secondary-index metadata that
//!   travel inside an envelope
//! - [`VectorClock`] / [`CausalToken`]: causal context for writes
//! - [`ClientProvider`]: per-execution-context handle caching with explicit
//!   invalidation for host failover
//! - [`InMemoryStore`]: a sibling-aware reference backend for tests and
//!   embedding
//!
//! # Failure model
//!
//! Transport and server errors are surfaced as [`StoreError`] and never
//! retried here. A missing key is a normal [`Lookup::NotFound`], not an error.

mod causal;
mod client;
mod envelope;
mod error;
mod index;
mod memory;
mod options;
mod provider;

pub use causal::{Ancestry, CausalToken, VectorClock};
pub use client::{BucketProps, StoreClient, ALLOW_MULT};
pub use envelope::{Envelope, Link, Lookup, JSON_CONTENT_TYPE};
pub use error::{StoreError, StoreResult};
pub use index::{IndexKind, IndexValue, Indexes};
pub use memory::InMemoryStore;
pub use options::{DeleteOptions, GetOptions, PutOptions};
pub use provider::{ClientFactory, ClientProvider, ClientSource};
