//! Secondary index entries derived from record values at save time.

use sibyl_store::{IndexKind, IndexValue, Indexes};
use sibyl_types::{Value, format_timestamp};
use std::sync::Arc;

use crate::error::{ModelError, ModelResult};
use crate::record::Record;
use crate::schema::{AssociationKey, IndexDescriptor, RecordSchema};

/// Computes the index entries for `record`, checking every declared index.
///
/// Fails with [`ModelError::MissingIndex`] when a non-nullable index has no
/// value and [`ModelError::IndexType`] when a value cannot be represented as
/// the declared kind.
pub fn compute_indexes(schema: &RecordSchema, record: &Record) -> ModelResult<Indexes> {
    let mut indexes = Indexes::new();
    for index in &schema.indexes {
        let wire = index.wire_name();
        for value in index_values(index, record.get(&index.field))? {
            indexes.insert(wire.clone(), value);
        }
    }
    Ok(indexes)
}

/// [`compute_indexes`] for a save: a violation is also recorded in the
/// record's errors under the offending field.
pub(crate) fn indexes_for_save(schema: &RecordSchema, record: &mut Record) -> ModelResult<Indexes> {
    compute_indexes(schema, record).inspect_err(|e| match e {
        ModelError::MissingIndex { field } => record.errors.add(field.clone(), "can't be null"),
        ModelError::IndexType { field, kind } => {
            record.errors.add(field.clone(), format!("is not a valid {kind} index value"));
        }
        _ => {}
    })
}

fn index_values(index: &IndexDescriptor, value: Option<&Value>) -> ModelResult<Vec<IndexValue>> {
    let missing = || {
        if index.allow_nil {
            Ok(Vec::new())
        } else {
            Err(ModelError::MissingIndex {
                field: index.field.clone(),
            })
        }
    };

    let value = match value {
        Some(v) if !v.is_null() => v,
        _ => return missing(),
    };

    if !index.multi {
        return Ok(vec![to_index_value(index, value)?]);
    }

    let Some(items) = value.as_list() else {
        return Err(type_error(index));
    };
    let values: Vec<IndexValue> = items
        .iter()
        .filter(|item| !item.is_null())
        .map(|item| to_index_value(index, item))
        .collect::<ModelResult<_>>()?;
    if values.is_empty() {
        return missing();
    }
    Ok(values)
}

/// Converts one scalar to the index's declared kind.
pub fn to_index_value(index: &IndexDescriptor, value: &Value) -> ModelResult<IndexValue> {
    let converted = match (index.kind, value) {
        (IndexKind::Integer, Value::Int(i)) => Some(IndexValue::Int(*i)),
        (IndexKind::Integer, _) => None,
        (IndexKind::Binary, Value::Str(s)) => Some(IndexValue::Bin(s.clone())),
        (IndexKind::Binary, Value::Int(i)) => Some(IndexValue::Bin(i.to_string())),
        (IndexKind::Binary, Value::Float(f)) => Some(IndexValue::Bin(f.to_string())),
        (IndexKind::Binary, Value::Bool(b)) => Some(IndexValue::Bin(b.to_string())),
        (IndexKind::Binary, Value::Timestamp(ts)) => Some(IndexValue::Bin(format_timestamp(ts))),
        (IndexKind::Binary, _) => None,
    };
    converted.ok_or_else(|| type_error(index))
}

fn type_error(index: &IndexDescriptor) -> ModelError {
    ModelError::IndexType {
        field: index.field.clone(),
        kind: index.kind,
    }
}

impl Record {
    /// Stores `target`'s id (or key) in an associated index field. `None`,
    /// or a target with no key, clears the field.
    pub fn set_index_association(&mut self, field: &str, target: Option<&Record>) -> ModelResult<()> {
        let schema = Arc::clone(self.schema());
        let index = declared_index(&schema, field)?;
        let Some(association) = &index.association else {
            return Err(ModelError::Schema {
                kind: schema.kind.clone(),
                reason: format!("index {field} has no association"),
            });
        };

        let value = match target {
            Some(t) if t.kind() != association.target_kind => {
                return Err(ModelError::Schema {
                    kind: schema.kind.clone(),
                    reason: format!(
                        "index {field} associates {} records, got {}",
                        association.target_kind,
                        t.kind()
                    ),
                });
            }
            Some(t) => match association.by {
                AssociationKey::Id => t.id().map(Value::from),
                AssociationKey::Key => t.key().map(Value::from),
            },
            None => None,
        };
        self.set(field, Value::from(value))
    }
}

pub(crate) fn declared_index<'a>(
    schema: &'a RecordSchema,
    field: &str,
) -> ModelResult<&'a IndexDescriptor> {
    schema.index(field).ok_or_else(|| ModelError::UnknownIndex {
        kind: schema.kind.clone(),
        field: field.to_string(),
    })
}
