//! Document store interface
//!
//! The change engine needs five operations from its backing store:
//! insert-many, upsert-by-id, find-by-ids, a faceted query that runs
//! several independent pipelines in one request, and dropping an area.
//! An "area" is a named record set: a collection or a staging area.
//!
//! `MemoryStore` implements the interface over in-process maps and is
//! the reference for other backends.

mod errors;
mod memory;
mod staging;

use std::collections::HashMap;

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::pipeline::Pipeline;

pub use errors::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use staging::{StagingArea, StagingKind};

/// One named sub-pipeline of a faceted query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Facet {
    pub name: String,
    pub pipeline: Pipeline,
}

impl Facet {
    pub fn new(name: impl Into<String>, pipeline: Pipeline) -> Self {
        Self {
            name: name.into(),
            pipeline,
        }
    }
}

/// Asynchronous document store
pub trait DocumentStore: Send + Sync {
    /// Inserts records; each must carry an `_id` not already present.
    fn insert_many<'a>(&'a self, area: &'a str, records: Vec<Value>)
        -> BoxFuture<'a, StoreResult<()>>;

    /// Inserts or replaces records by `_id`.
    fn upsert_many<'a>(&'a self, area: &'a str, records: Vec<Value>)
        -> BoxFuture<'a, StoreResult<()>>;

    /// Returns the records whose `_id` is in `ids`, in store order.
    fn find_by_ids<'a>(
        &'a self,
        area: &'a str,
        ids: &'a [Value],
    ) -> BoxFuture<'a, StoreResult<Vec<Value>>>;

    /// Runs every facet over `area` against one consistent read and
    /// returns each facet's output under its name.
    fn facet<'a>(
        &'a self,
        area: &'a str,
        facets: &'a [Facet],
    ) -> BoxFuture<'a, StoreResult<HashMap<String, Vec<Value>>>>;

    /// Drops an area. Dropping a missing area succeeds.
    fn drop_area<'a>(&'a self, area: &'a str) -> BoxFuture<'a, StoreResult<()>>;
}
