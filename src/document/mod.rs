//! JSON document helpers
//!
//! Records are plain `serde_json::Value` objects keyed by `_id`. Every
//! component that reads fields by dotted path, compares values, or keys
//! records by identifier goes through this module so that the compiled
//! pipelines and the in-memory predicate evaluator agree on semantics.

mod compare;
mod path;

pub use compare::{compare_values, type_rank, values_equal};
pub use path::{
    apply_partial, candidates, id_key, id_of, project, remove_path, set_path, ID_FIELD,
};
