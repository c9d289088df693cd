//! Core type definitions for sibyl.
//!
//! This crate defines the store-agnostic types shared by every other crate:
//! - Execution-context, actor and record-instance identifiers (UUID v7)
//! - [`Value`], the typed value held in a record's value map
//! - [`FieldType`], the declared semantic type of a field, and the lenient
//!   casting rules between stored JSON scalars and [`Value`]s
//! - The fixed textual timestamp format used on the wire

mod cast;
mod ids;
mod timestamp;
mod value;

pub use cast::FieldType;
pub use ids::{ActorId, ContextId, InstanceId};
pub use timestamp::{format_timestamp, parse_timestamp};
pub use value::Value;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
}
