//! Staged query pipelines
//!
//! A page's filters, sort order and pagination compile into a
//! [`Pipeline`]: an ordered list of [`Stage`]s whose expressions are small
//! trees ([`Expr`]). Pipelines are plain data. A store executes them;
//! [`crate::executor`] interprets them in memory.

mod compiler;
mod expr;
mod stage;

pub use compiler::{PipelineCompiler, ABS_SORT_PREFIX};
pub use expr::{Expr, Test};
pub use stage::{Pipeline, SortKey, Stage};
