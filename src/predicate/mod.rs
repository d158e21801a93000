//! Predicate Evaluator
//!
//! Classifies single records against page filters without touching the
//! store, and decides whether an update matters to a page.
//!
//! Membership and text semantics are the same as the compiled pipeline's.
//! Paths through arrays are not correlated here: a nested filter holds
//! when any value on its path passes. Relevance compensates by treating
//! any change to a filtered field as relevant.

mod evaluator;
mod relevance;

pub use evaluator::PredicateFilter;
pub use relevance::{differs_in_fields, filter_outcome_changed, is_relevant};
