//! Path Resolver
//!
//! Walks a dotted field reference through a schema and reports which
//! segments are array-valued. The compiler uses the result to decide
//! where nested-array filtering has to be injected.
//!
//! Resolution never fails. A segment whose type is unknown or cannot be
//! decided statically ends the walk, and whatever was accumulated so far
//! is returned. An empty result means "treat this path as flat".

use std::collections::HashMap;

use super::types::{FieldDef, FieldShape, Schema};

/// One array-valued segment on a resolved path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArraySegment {
    /// Name of the array field itself
    pub name: String,
    /// Dotted path to this array from the enclosing array element,
    /// or from the record root for the outermost array
    pub relative_path: String,
}

/// The array structure of one dotted path
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ArrayPath {
    /// Array segments, outermost first
    pub segments: Vec<ArraySegment>,
    /// Remainder of the path below the innermost array element.
    /// Equal to the full path when there are no array segments, and
    /// empty when the path ends on the array itself.
    pub field: String,
}

impl ArrayPath {
    /// Returns true when the path crosses no arrays
    pub fn is_flat(&self) -> bool {
        self.segments.is_empty()
    }

    /// Number of arrays crossed
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// Array segment names, outermost first
    pub fn names(&self) -> Vec<String> {
        self.segments.iter().map(|s| s.name.clone()).collect()
    }

    /// Relative paths of the array segments, outermost first
    pub fn relative_paths(&self) -> Vec<&str> {
        self.segments
            .iter()
            .map(|s| s.relative_path.as_str())
            .collect()
    }
}

/// Resolves the ordered list of array segment names on `dotted_path`.
pub fn resolve_array_path(schema: &Schema, dotted_path: &str) -> Vec<String> {
    resolve(schema, dotted_path).names()
}

/// Resolves the full array structure of `dotted_path`.
pub fn resolve(schema: &Schema, dotted_path: &str) -> ArrayPath {
    let parts: Vec<&str> = dotted_path.split('.').filter(|p| !p.is_empty()).collect();

    let mut segments = Vec::new();
    let mut fields: &HashMap<String, FieldDef> = &schema.fields;
    // Index of the first part below the most recent array
    let mut anchor = 0;

    for (i, part) in parts.iter().enumerate() {
        let Some(def) = fields.get(*part) else {
            break;
        };

        match def.field_type.shape() {
            FieldShape::Array(element) => {
                segments.push(ArraySegment {
                    name: (*part).to_string(),
                    relative_path: parts[anchor..=i].join("."),
                });
                anchor = i + 1;

                match element.shape() {
                    FieldShape::Object(inner) => fields = inner,
                    _ => break,
                }
            }
            FieldShape::Object(inner) => fields = inner,
            FieldShape::Scalar | FieldShape::Unresolved => break,
        }
    }

    let field = if segments.is_empty() {
        parts.join(".")
    } else {
        parts[anchor.min(parts.len())..].join(".")
    };

    ArrayPath { segments, field }
}
