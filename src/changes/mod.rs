//! Change detection over paginated views
//!
//! Given the pages a client watches and a batch of mutations that is
//! about to be applied, `ChangeDetector` reports per page which records
//! enter, leave or change in place, flagging records that became a new
//! window boundary.

mod engine;
mod errors;
mod reconcile;
mod types;

pub use engine::ChangeDetector;
pub use errors::{ChangeError, ChangeResult};
pub use reconcile::{BatchView, Reconciler, StagedUpdate};
pub use types::{ChangeRecord, MutationBatch, PageChanges, PageDefinition, NEW_BOTTOM, NEW_TOP};
