//! Sibling resolution on load.
//!
//! Each sibling envelope is decoded into a candidate record on its own (no
//! hooks, no validation, no index work). The candidates then go through the
//! kind's [`MergeStrategy`] and exactly one record comes out. Resolution does
//! no I/O and is deterministic for a given sibling order.

use sibyl_store::{Envelope, Lookup};
use std::sync::Arc;
use tracing::warn;

use crate::error::{ModelError, ModelResult};
use crate::handler::RecordHandler;
use crate::record::Record;
use crate::schema::{MergeStrategy, RecordSchema};

/// Decodes every sibling into a candidate record, preserving order.
pub fn decode_siblings(schema: &Arc<RecordSchema>, siblings: &[Envelope]) -> Vec<Record> {
    siblings
        .iter()
        .map(|envelope| Record::decode(Arc::clone(schema), envelope))
        .collect()
}

/// Reduces siblings to one record according to the kind's merge strategy.
pub fn resolve(
    schema: &Arc<RecordSchema>,
    handler: &dyn RecordHandler,
    key: &str,
    siblings: &[Envelope],
) -> ModelResult<Record> {
    let fail = |reason: String| ModelError::ConflictResolution {
        key: key.to_string(),
        reason,
    };

    if siblings.is_empty() {
        return Err(fail("no siblings".into()));
    }
    warn!(
        "Resolving {} siblings for {}/{} ({:?})",
        siblings.len(),
        schema.bucket,
        key,
        schema.merge_strategy
    );
    if !schema.allow_mult {
        warn!("{} does not declare allow_mult but has siblings", schema.kind);
    }

    let candidates = decode_siblings(schema, siblings);
    match schema.merge_strategy {
        MergeStrategy::FirstSibling => candidates
            .into_iter()
            .next()
            .ok_or_else(|| fail("no candidates".into())),
        MergeStrategy::Custom => handler.merge(candidates).map_err(fail),
    }
}

/// Binds a lookup onto `record`. Returns false when the key was not found.
///
/// With `merge` off, siblings are an error rather than being resolved.
pub(crate) fn bind(
    record: &mut Record,
    handler: &dyn RecordHandler,
    key: &str,
    lookup: &Lookup,
    merge: bool,
) -> ModelResult<bool> {
    match lookup {
        Lookup::NotFound => Ok(false),
        Lookup::Found(envelope) => {
            record.load_envelope(envelope);
            Ok(true)
        }
        Lookup::Conflicted(_) if !merge => Err(ModelError::ConflictResolution {
            key: key.to_string(),
            reason: format!("{} siblings and merging is disabled", lookup.version_count()),
        }),
        Lookup::Conflicted(siblings) => {
            let resolved = resolve(record.schema(), handler, key, siblings)?;
            record.adopt(resolved);
            Ok(true)
        }
    }
}
