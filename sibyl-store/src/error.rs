//! Error types for the store boundary.

use std::time::Duration;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors reported by a store client.
///
/// A missing key is not an error; lookups report it as
/// [`Lookup::NotFound`](crate::Lookup::NotFound).
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The backend could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The per-call deadline elapsed.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The backend refused the request (e.g. quorum not met).
    #[error("request rejected: {0}")]
    Rejected(String),

    /// A causal-context token could not be decoded.
    #[error("invalid causal context: {0}")]
    InvalidContext(String),

    /// Payload encoding error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// No client could be produced for the requested record kind.
    #[error("no store client for {0}")]
    NoClient(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
