//! Query request types
//!
//! Filters, sort keys and pagination as supplied by callers inside page
//! definitions. They carry no behavior beyond small accessors; the
//! pipeline compiler and the predicate evaluator give them meaning.

mod types;

pub use types::{
    compile_pattern, FilterSpec, MembershipType, Pagination, SortDirection, SortSpec,
    TextMatch,
};
