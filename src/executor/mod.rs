//! Pipeline executor subsystem
//!
//! A pure in-memory interpreter for compiled pipelines. The memory store
//! runs facets through it, and the change engine uses it to project
//! single records without a store round trip.
//!
//! # Execution Flow
//!
//! 1. Stages apply strictly in order
//! 2. Expressions evaluate against one record at a time
//! 3. Sorts are stable, so equal keys keep their input order
//!
//! # Invariants
//!
//! - Deterministic execution
//! - Record content never causes an error; only malformed pipelines do

mod errors;
mod eval;
mod executor;
mod sorter;

pub use errors::{ExecutorError, ExecutorResult};
pub use eval::{is_truthy, magnitude, ExprEvaluator};
pub use executor::{AreaSource, NoAreas, PipelineExecutor};
pub use sorter::ResultSorter;
