//! pagediff - change detection for paginated, filtered and sorted views
//!
//! A client watches pages of a collection. Before a batch of mutations
//! is applied, the engine answers which records each page gains, loses
//! or sees changed, without touching the collection itself.

pub mod changes;
pub mod config;
pub mod document;
pub mod executor;
pub mod observability;
pub mod pipeline;
pub mod predicate;
pub mod query;
pub mod schema;
pub mod store;

pub use changes::{
    ChangeDetector, ChangeError, ChangeRecord, ChangeResult, MutationBatch, PageChanges,
    PageDefinition,
};
pub use config::{EngineConfig, MiddleShiftPolicy};
pub use query::{FilterSpec, MembershipType, Pagination, SortDirection, SortSpec, TextMatch};
pub use schema::Schema;
pub use store::{DocumentStore, MemoryStore};
