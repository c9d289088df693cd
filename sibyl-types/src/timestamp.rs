//! The textual timestamp format used for stored timestamp fields.
//!
//! Timestamps are written as RFC 3339 in UTC with a `Z` suffix and
//! nanosecond precision, e.g. `2024-03-01T12:00:00.000000000Z`. Any RFC 3339
//! offset is accepted on read and normalized to UTC.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::{Error, Result};

/// Formats a timestamp in the stored representation.
#[must_use]
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Parses a stored timestamp.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::InvalidTimestamp(format!("{s:?}: {e}")))
}
