//! Context-scoped store client handles.
//!
//! A [`ClientProvider`] hands out one cached handle per execution context.
//! When a call fails, the caller invalidates its context; the next acquire
//! runs the configured source again, which for a factory may pick a
//! different backend host.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use sibyl_types::ContextId;
use tracing::{debug, info, warn};

use crate::client::StoreClient;
use crate::error::{StoreError, StoreResult};

/// Produces a client for a record kind.
pub type ClientFactory = Arc<dyn Fn(&str) -> StoreResult<Arc<dyn StoreClient>> + Send + Sync>;

/// Where store clients come from.
#[derive(Clone)]
pub enum ClientSource {
    /// The same handle every time. It must be internally synchronized since
    /// every context shares it.
    Fixed(Arc<dyn StoreClient>),
    /// Called with the record kind each time a context needs a handle.
    Factory(ClientFactory),
}

impl ClientSource {
    pub fn fixed(client: Arc<dyn StoreClient>) -> Self {
        Self::Fixed(client)
    }

    pub fn factory<F>(f: F) -> Self
    where
        F: Fn(&str) -> StoreResult<Arc<dyn StoreClient>> + Send + Sync + 'static,
    {
        Self::Factory(Arc::new(f))
    }

    fn produce(&self, kind: &str) -> StoreResult<Arc<dyn StoreClient>> {
        match self {
            Self::Fixed(client) => Ok(Arc::clone(client)),
            Self::Factory(factory) => factory(kind),
        }
    }
}

impl fmt::Debug for ClientSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(_) => f.write_str("ClientSource::Fixed"),
            Self::Factory(_) => f.write_str("ClientSource::Factory"),
        }
    }
}

/// Which source a cached handle came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Scope {
    Default,
    Kind(String),
}

/// Caches one store handle per (context, source).
pub struct ClientProvider {
    default_source: Option<ClientSource>,
    kind_sources: HashMap<String, ClientSource>,
    handles: RwLock<HashMap<(ContextId, Scope), Arc<dyn StoreClient>>>,
}

impl ClientProvider {
    /// Creates a provider backed by `source`.
    pub fn new(source: ClientSource) -> Self {
        Self {
            default_source: Some(source),
            kind_sources: HashMap::new(),
            handles: RwLock::new(HashMap::new()),
        }
    }

    /// Creates a provider with no default source; every record kind must
    /// have its own.
    pub fn without_default() -> Self {
        Self {
            default_source: None,
            kind_sources: HashMap::new(),
            handles: RwLock::new(HashMap::new()),
        }
    }

    /// Routes one record kind to its own source.
    #[must_use]
    pub fn with_kind_source(mut self, kind: impl Into<String>, source: ClientSource) -> Self {
        self.kind_sources.insert(kind.into(), source);
        self
    }

    /// Returns the handle cached for `context`, producing and caching one if
    /// there is none.
    pub fn acquire(&self, context: ContextId, kind: &str) -> StoreResult<Arc<dyn StoreClient>> {
        let (scope, source) = self.source_for(kind)?;
        let slot = (context, scope);

        if let Some(client) = self
            .handles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&slot)
        {
            return Ok(Arc::clone(client));
        }

        // Produced outside the lock; a factory may block on connection setup.
        let client = source.produce(kind)?;
        info!("Acquired store client for context {} ({})", context, kind);

        let mut handles = self.handles.write().unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(handles.entry(slot).or_insert(client)))
    }

    /// Drops every handle cached for `context` after a failure. Returns true
    /// if any existed.
    pub fn invalidate(&self, context: ContextId) -> bool {
        let dropped = self.evict(context);
        if dropped > 0 {
            warn!("Invalidated {} store client(s) for context {}", dropped, context);
        }
        dropped > 0
    }

    /// Forgets `context` once it has ended. Returns how many handles were
    /// released.
    pub fn release(&self, context: ContextId) -> usize {
        let released = self.evict(context);
        if released > 0 {
            debug!("Released {} store client(s) for context {}", released, context);
        }
        released
    }

    /// Invalidates `context` and immediately acquires a fresh handle.
    pub fn reacquire(&self, context: ContextId, kind: &str) -> StoreResult<Arc<dyn StoreClient>> {
        self.invalidate(context);
        self.acquire(context, kind)
    }

    /// Number of cached handles across all contexts.
    pub fn cached_handles(&self) -> usize {
        self.handles.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn evict(&self, context: ContextId) -> usize {
        let mut handles = self.handles.write().unwrap_or_else(PoisonError::into_inner);
        let before = handles.len();
        handles.retain(|(ctx, _), _| *ctx != context);
        before - handles.len()
    }

    fn source_for(&self, kind: &str) -> StoreResult<(Scope, &ClientSource)> {
        if let Some(source) = self.kind_sources.get(kind) {
            return Ok((Scope::Kind(kind.to_string()), source));
        }
        self.default_source
            .as_ref()
            .map(|source| (Scope::Default, source))
            .ok_or_else(|| StoreError::NoClient(kind.to_string()))
    }
}

impl fmt::Debug for ClientProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientProvider")
            .field("default_source", &self.default_source)
            .field("kind_sources", &self.kind_sources.len())
            .field("cached_handles", &self.cached_handles())
            .finish()
    }
}
