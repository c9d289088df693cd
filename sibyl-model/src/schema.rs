use serde::{Deserialize, Serialize};
use sibyl_store::IndexKind;
use sibyl_types::{FieldType, Value};
use std::collections::HashSet;

use crate::error::{ModelError, ModelResult};

/// Declares one record kind: its bucket, value fields, secondary indexes,
/// link tags and sibling policy.
///
/// Built once at startup and registered with a
/// [`SchemaRegistry`](crate::SchemaRegistry), which checks it with
/// [`RecordSchema::validate`].
#[derive(Debug, Clone)]
pub struct RecordSchema {
    pub kind: String,
    pub bucket: String,
    pub fields: Vec<FieldDescriptor>,
    pub indexes: Vec<IndexDescriptor>,
    pub links: Vec<LinkDescriptor>,
    /// Whether the bucket may legally hold concurrent siblings.
    pub allow_mult: bool,
    pub merge_strategy: MergeStrategy,
}

impl RecordSchema {
    pub fn new(kind: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            bucket: bucket.into(),
            fields: Vec::new(),
            indexes: Vec::new(),
            links: Vec::new(),
            allow_mult: false,
            merge_strategy: MergeStrategy::default(),
        }
    }

    #[must_use]
    pub fn with_field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    #[must_use]
    pub fn with_index(mut self, index: IndexDescriptor) -> Self {
        self.indexes.push(index);
        self
    }

    #[must_use]
    pub fn with_link(mut self, link: LinkDescriptor) -> Self {
        self.links.push(link);
        self
    }

    /// Marks the kind as admitting siblings.
    #[must_use]
    pub fn with_allow_mult(mut self) -> Self {
        self.allow_mult = true;
        self
    }

    #[must_use]
    pub fn with_merge_strategy(mut self, strategy: MergeStrategy) -> Self {
        self.merge_strategy = strategy;
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn index(&self, field: &str) -> Option<&IndexDescriptor> {
        self.indexes.iter().find(|i| i.field == field)
    }

    pub fn link(&self, tag: &str) -> Option<&LinkDescriptor> {
        self.links.iter().find(|l| l.tag == tag)
    }

    /// Declared type of `name`, or untyped if the field is not declared.
    pub fn field_type(&self, name: &str) -> FieldType {
        self.field(name).map_or(FieldType::Any, |f| f.field_type)
    }

    /// Returns true if `name` may be assigned: a declared field or the field
    /// behind a declared index.
    pub fn is_assignable(&self, name: &str) -> bool {
        self.field(name).is_some() || self.index(name).is_some()
    }

    /// Checks the declaration for internal consistency.
    pub fn validate(&self) -> ModelResult<()> {
        let fail = |reason: String| ModelError::Schema {
            kind: self.kind.clone(),
            reason,
        };

        if self.kind.is_empty() {
            return Err(fail("kind is empty".into()));
        }
        if self.bucket.is_empty() {
            return Err(fail("bucket is empty".into()));
        }
        if self.fields.iter().any(|f| f.name == "key") {
            return Err(fail("field name `key` is reserved".into()));
        }

        let mut seen = HashSet::new();
        for field in &self.fields {
            if !seen.insert(field.name.as_str()) {
                return Err(fail(format!("duplicate field {}", field.name)));
            }
        }

        let mut indexed = HashSet::new();
        for index in &self.indexes {
            if !indexed.insert(index.field.as_str()) {
                return Err(fail(format!("duplicate index on {}", index.field)));
            }
            if let Some(field) = self.field(&index.field) {
                let compatible = match index.kind {
                    IndexKind::Integer => {
                        matches!(field.field_type, FieldType::Integer | FieldType::Any)
                    }
                    IndexKind::Binary => true,
                };
                if !compatible && !index.multi {
                    return Err(fail(format!(
                        "index {} is {} but the field is {:?}",
                        index.field, index.kind, field.field_type
                    )));
                }
            }
        }

        let mut tags = HashSet::new();
        for link in &self.links {
            if !tags.insert(link.tag.as_str()) {
                return Err(fail(format!("duplicate link tag {}", link.tag)));
            }
            if seen.contains(link.tag.as_str()) || indexed.contains(link.tag.as_str()) {
                return Err(fail(format!("link tag {} collides with a field", link.tag)));
            }
        }

        Ok(())
    }
}

/// A typed value field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    pub name: String,
    pub field_type: FieldType,
    /// Cloned into every new or loaded record that lacks the field.
    pub default: Option<Value>,
    pub nullable: bool,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            default: None,
            nullable: true,
        }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::String)
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Integer)
    }

    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Float)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Boolean)
    }

    pub fn timestamp(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Timestamp)
    }

    /// Untyped passthrough field.
    pub fn any(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Any)
    }

    /// Sets the default. An untyped field takes its type from the default.
    #[must_use]
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        let default = default.into();
        if self.field_type == FieldType::Any {
            self.field_type = FieldType::infer(&default);
        }
        self.default = Some(default);
        self
    }

    /// Makes the field non-nullable; a null or absent value fails validation.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.nullable = false;
        self
    }
}

/// A secondary index over one value field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDescriptor {
    pub field: String,
    pub kind: IndexKind,
    /// The field holds a list; each element is indexed.
    pub multi: bool,
    /// An absent value is skipped instead of failing the save.
    pub allow_nil: bool,
    pub association: Option<IndexAssociation>,
}

impl IndexDescriptor {
    pub fn integer(field: impl Into<String>) -> Self {
        Self::new(field, IndexKind::Integer)
    }

    pub fn binary(field: impl Into<String>) -> Self {
        Self::new(field, IndexKind::Binary)
    }

    fn new(field: impl Into<String>, kind: IndexKind) -> Self {
        Self {
            field: field.into(),
            kind,
            multi: false,
            allow_nil: false,
            association: None,
        }
    }

    #[must_use]
    pub fn multi(mut self) -> Self {
        self.multi = true;
        self
    }

    #[must_use]
    pub fn allow_nil(mut self) -> Self {
        self.allow_nil = true;
        self
    }

    /// Stores the id of a `target_kind` record in this field.
    #[must_use]
    pub fn maps_to(mut self, target_kind: impl Into<String>) -> Self {
        self.association = Some(IndexAssociation {
            target_kind: target_kind.into(),
            by: AssociationKey::Id,
        });
        self
    }

    /// Stores the raw key of a `target_kind` record in this field.
    #[must_use]
    pub fn maps_to_key(mut self, target_kind: impl Into<String>) -> Self {
        self.association = Some(IndexAssociation {
            target_kind: target_kind.into(),
            by: AssociationKey::Key,
        });
        self
    }

    /// Name the store indexes this field under (`artist_id_int`).
    pub fn wire_name(&self) -> String {
        format!("{}{}", self.field, self.kind.suffix())
    }
}

/// Typed association layered on an index field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexAssociation {
    pub target_kind: String,
    pub by: AssociationKey,
}

/// What an associated record contributes to the index field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationKey {
    /// The record id: the key as an integer when it parses as one.
    Id,
    /// The key string as-is.
    Key,
}

/// A link tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkDescriptor {
    pub tag: String,
    pub multi: bool,
    /// Kind of the linked records, for typed lookups.
    pub target_kind: Option<String>,
}

impl LinkDescriptor {
    /// A tag holding at most one target.
    pub fn one(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            multi: false,
            target_kind: None,
        }
    }

    /// A tag holding a set of targets.
    pub fn many(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            multi: true,
            target_kind: None,
        }
    }

    #[must_use]
    pub fn to(mut self, target_kind: impl Into<String>) -> Self {
        self.target_kind = Some(target_kind.into());
        self
    }

    pub(crate) fn arity(&self) -> &'static str {
        if self.multi { "multi" } else { "single" }
    }
}

/// How siblings are reduced to one record on load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Take the first sibling in the order the store returned them.
    #[default]
    FirstSibling,
    /// Delegate to the kind's [`RecordHandler::merge`](crate::RecordHandler::merge).
    Custom,
}
