//! Object mapping for sibyl.
//!
//! Applications declare record kinds once and persist them through a store
//! that may hand back concurrent siblings:
//! - [`RecordSchema`]: bucket, typed fields with defaults, secondary
//!   indexes, link tags and the sibling merge policy for one kind
//! - [`SchemaRegistry`]: kind → schema and [`RecordHandler`]
//! - [`Record`]: one instance: key, typed values, links, lifecycle flags
//! - [`resolve`]: reduces sibling envelopes to one record
//! - [`Session`]: the save/delete/reload pipeline and key/index lookups
//!   for one execution context
//!
//! Stored values are cast leniently: a value that does not fit its declared
//! type loads as-is instead of failing the read.

mod conflict;
mod error;
mod handler;
mod index;
mod links;
mod record;
mod registry;
mod schema;
mod session;

pub use conflict::{decode_siblings, resolve};
pub use error::{ModelError, ModelResult, ValidationErrors};
pub use handler::{DefaultHandler, RecordHandler};
pub use index::{compute_indexes, to_index_value};
pub use record::{Record, RecordId};
pub use registry::SchemaRegistry;
pub use schema::{
    AssociationKey, FieldDescriptor, IndexAssociation, IndexDescriptor, LinkDescriptor,
    MergeStrategy, RecordSchema,
};
pub use session::{LoadOptions, SaveOptions, Session, SessionConfig};
