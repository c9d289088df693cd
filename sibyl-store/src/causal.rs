//! Causal context for writes.
//!
//! Every stored version carries a vector clock. A read hands the caller an
//! opaque [`CausalToken`] encoding the clock it observed; a write presenting
//! that token replaces exactly the versions the token descends from. Versions
//! it does not descend from were written concurrently and survive as siblings.

use serde::{Deserialize, Serialize};
use sibyl_types::ActorId;
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{StoreError, StoreResult};

/// How one stored version relates to another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ancestry {
    /// `self` is an ancestor: the other version saw everything it saw.
    Ancestor,
    /// `self` descends from the other version.
    Descendant,
    /// Written without seeing each other; both survive as siblings.
    Sibling,
    Same,
}

/// Opaque causal-context token handed out on read and presented on write.
///
/// The core never looks inside; only the backend that minted it can decode it.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CausalToken(Vec<u8>);

impl CausalToken {
    /// Wraps backend-specific token bytes.
    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for CausalToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CausalToken({} bytes)", self.0.len())
    }
}

/// Per-actor write counters for one stored version.
///
/// Ordered by actor so the encoded token is byte-stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VectorClock(BTreeMap<ActorId, u64>);

impl VectorClock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes `actor` has contributed (0 if none).
    #[must_use]
    pub fn get(&self, actor: &ActorId) -> u64 {
        self.0.get(actor).copied().unwrap_or_default()
    }

    /// Number of actors that have written.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Records one more write by `actor`, returning its new count.
    pub fn tick(&mut self, actor: ActorId) -> u64 {
        let count = self.0.entry(actor).or_default();
        *count += 1;
        *count
    }

    /// Folds `other` in so the result descends from both.
    pub fn join(&mut self, other: &Self) {
        for (actor, &count) in &other.0 {
            let mine = self.0.entry(*actor).or_default();
            *mine = (*mine).max(count);
        }
    }

    /// Like [`join`](Self::join), leaving both inputs untouched.
    #[must_use]
    pub fn joined(&self, other: &Self) -> Self {
        let mut out = self.clone();
        out.join(other);
        out
    }

    #[must_use]
    pub fn ancestry(&self, other: &Self) -> Ancestry {
        let actors = self.0.keys().chain(other.0.keys());
        let (mut ahead, mut behind) = (false, false);
        for actor in actors {
            match self.get(actor).cmp(&other.get(actor)) {
                std::cmp::Ordering::Greater => ahead = true,
                std::cmp::Ordering::Less => behind = true,
                std::cmp::Ordering::Equal => {}
            }
        }
        match (ahead, behind) {
            (false, false) => Ancestry::Same,
            (true, false) => Ancestry::Descendant,
            (false, true) => Ancestry::Ancestor,
            (true, true) => Ancestry::Sibling,
        }
    }

    /// True when a write carrying `self` supersedes a version stamped with
    /// `other`.
    #[must_use]
    pub fn descends_from(&self, other: &Self) -> bool {
        matches!(self.ancestry(other), Ancestry::Descendant | Ancestry::Same)
    }

    #[must_use]
    pub fn is_sibling_of(&self, other: &Self) -> bool {
        self.ancestry(other) == Ancestry::Sibling
    }

    /// Encodes the clock as an opaque token.
    pub fn to_token(&self) -> StoreResult<CausalToken> {
        Ok(CausalToken(serde_json::to_vec(self)?))
    }

    /// Decodes a token minted by [`VectorClock::to_token`].
    pub fn from_token(token: &CausalToken) -> StoreResult<Self> {
        serde_json::from_slice(token.as_bytes()).map_err(|e| StoreError::InvalidContext(e.to_string()))
    }
}
