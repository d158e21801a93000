//! Record schemas and the Path Resolver
//!
//! A schema describes one record kind well enough to answer a single
//! question: is the declared type at a given path an array, an object
//! or a scalar? The resolver turns that into the array structure of a
//! dotted path.

mod resolver;
mod types;

pub use resolver::{resolve, resolve_array_path, ArrayPath, ArraySegment};
pub use types::{FieldDef, FieldShape, FieldType, RecordSchema, Schema};
