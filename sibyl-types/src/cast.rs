//! Casting between stored JSON scalars and declared semantic types.
//!
//! Decoding is lenient: a stored value that does not fit its declared type is
//! kept as whatever [`Value::from_raw`] makes of it, never an error.

use serde::{Deserialize, Serialize};

use crate::timestamp::parse_timestamp;
use crate::Value;

/// The declared semantic type of a record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Integer,
    Float,
    Boolean,
    Timestamp,
    /// Untyped passthrough.
    #[default]
    Any,
}

impl FieldType {
    /// Casts a stored JSON value to this type, falling back to the untyped
    /// decoding when it does not fit.
    #[must_use]
    pub fn cast(&self, raw: &serde_json::Value) -> Value {
        let cast = match (self, raw) {
            (_, serde_json::Value::Null) => Some(Value::Null),
            (Self::String, serde_json::Value::String(s)) => Some(Value::Str(s.clone())),
            (Self::Integer, serde_json::Value::Number(n)) => n.as_i64().map(Value::Int),
            (Self::Float, serde_json::Value::Number(n)) => n.as_f64().map(Value::Float),
            (Self::Boolean, serde_json::Value::Bool(b)) => Some(Value::Bool(*b)),
            (Self::Timestamp, serde_json::Value::String(s)) => {
                parse_timestamp(s).ok().map(Value::Timestamp)
            }
            _ => None,
        };
        cast.unwrap_or_else(|| Value::from_raw(raw))
    }

    /// Encodes a value for storage. The declared type does not change the
    /// encoding; it is only consulted when decoding.
    #[must_use]
    pub fn encode(&self, value: &Value) -> serde_json::Value {
        value.to_raw()
    }

    /// Returns true if `value` already has this semantic type (nulls always
    /// match).
    #[must_use]
    pub fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (_, v) if v.is_null() => true,
            (Self::Any, _) => true,
            (Self::String, Value::Str(_))
            | (Self::Integer, Value::Int(_))
            | (Self::Float, Value::Float(_))
            | (Self::Boolean, Value::Bool(_))
            | (Self::Timestamp, Value::Timestamp(_)) => true,
            _ => false,
        }
    }

    /// Infers the declared type from a default value.
    #[must_use]
    pub fn infer(value: &Value) -> Self {
        match value {
            Value::Str(_) => Self::String,
            Value::Int(_) => Self::Integer,
            Value::Float(_) => Self::Float,
            Value::Bool(_) => Self::Boolean,
            Value::Timestamp(_) => Self::Timestamp,
            Value::Null | Value::List(_) | Value::Raw(_) => Self::Any,
        }
    }
}
