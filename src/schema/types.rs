//! Record type descriptions
//!
//! Supported types:
//! - string, int, bool, float: terminal scalars
//! - object: nested object with its own field map
//! - array: homogeneous array with an element type
//! - union: one of several types, only resolvable when it has a single variant
//!
//! Schemas are supplied by the caller per call. Only the shape of each
//! declared type matters here: array, object or scalar.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Declared field types
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FieldType {
    /// UTF-8 string
    String,
    /// 64-bit signed integer
    Int,
    /// Boolean
    Bool,
    /// 64-bit floating point
    Float,
    /// Nested object with its own field schema
    Object {
        /// Nested field definitions
        fields: HashMap<String, FieldDef>,
    },
    /// Homogeneous array with single element type
    Array {
        /// Element type (boxed to allow recursive types)
        #[serde(rename = "element_type")]
        element_type: Box<FieldType>,
    },
    /// One of several types
    Union {
        /// Candidate types
        variants: Vec<FieldType>,
    },
}

/// Structural classification of a declared type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldShape<'a> {
    /// Array whose elements have the given type
    Array(&'a FieldType),
    /// Object with the given fields
    Object(&'a HashMap<String, FieldDef>),
    /// Terminal value
    Scalar,
    /// Cannot be decided statically
    Unresolved,
}

impl FieldType {
    /// Returns the type name for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Int => "int",
            FieldType::Bool => "bool",
            FieldType::Float => "float",
            FieldType::Object { .. } => "object",
            FieldType::Array { .. } => "array",
            FieldType::Union { .. } => "union",
        }
    }

    /// Classifies this type as array, object or scalar.
    ///
    /// A union resolves only when it has exactly one variant.
    pub fn shape(&self) -> FieldShape<'_> {
        match self {
            FieldType::Array { element_type } => FieldShape::Array(element_type),
            FieldType::Object { fields } => FieldShape::Object(fields),
            FieldType::Union { variants } => match variants.as_slice() {
                [only] => only.shape(),
                _ => FieldShape::Unresolved,
            },
            _ => FieldShape::Scalar,
        }
    }

    /// Shorthand for an array of the given element type
    pub fn array_of(element_type: FieldType) -> Self {
        FieldType::Array {
            element_type: Box::new(element_type),
        }
    }

    /// Shorthand for an object with the given fields
    pub fn object_of(fields: HashMap<String, FieldDef>) -> Self {
        FieldType::Object { fields }
    }
}

/// A single field declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Field data type
    #[serde(flatten)]
    pub field_type: FieldType,
    /// Whether field must be present
    #[serde(default)]
    pub required: bool,
}

impl FieldDef {
    /// Create a required field of any type
    pub fn required(field_type: FieldType) -> Self {
        Self {
            field_type,
            required: true,
        }
    }

    /// Create an optional field of any type
    pub fn optional(field_type: FieldType) -> Self {
        Self {
            field_type,
            required: false,
        }
    }

    /// Create a required string field
    pub fn required_string() -> Self {
        Self::required(FieldType::String)
    }

    /// Create a required int field
    pub fn required_int() -> Self {
        Self::required(FieldType::Int)
    }

    /// Create a required float field
    pub fn required_float() -> Self {
        Self::required(FieldType::Float)
    }

    /// Create a required object field
    pub fn required_object(fields: HashMap<String, FieldDef>) -> Self {
        Self::required(FieldType::object_of(fields))
    }

    /// Create a required array field
    pub fn required_array(element_type: FieldType) -> Self {
        Self::required(FieldType::array_of(element_type))
    }

    /// Create an optional array field
    pub fn optional_array(element_type: FieldType) -> Self {
        Self::optional(FieldType::array_of(element_type))
    }
}

/// Type description of one record kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    /// Record kind name
    pub name: String,
    /// Top-level field definitions
    pub fields: HashMap<String, FieldDef>,
}

impl Schema {
    /// Create a new schema
    pub fn new(name: impl Into<String>, fields: HashMap<String, FieldDef>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }

    /// A schema that declares nothing. Every path resolves as flat.
    pub fn empty(name: impl Into<String>) -> Self {
        Self::new(name, HashMap::new())
    }

    /// Builder-style field declaration
    pub fn with_field(mut self, name: impl Into<String>, def: FieldDef) -> Self {
        self.fields.insert(name.into(), def);
        self
    }

    /// Looks up a top-level field
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.get(name)
    }
}

/// Implemented by record types that can describe their own layout.
///
/// Lets a caller build the schema once per type instead of per call.
pub trait RecordSchema {
    /// Returns the schema for this record type
    fn schema() -> Schema;
}
