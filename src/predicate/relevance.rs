//! Update relevance

use serde_json::Value;

use super::evaluator::PredicateFilter;
use crate::document::{self, values_equal};
use crate::query::{FilterSpec, SortSpec};

/// Returns true if `before` and `after` differ at any of `fields`.
pub fn differs_in_fields<'a>(
    before: &Value,
    after: &Value,
    fields: impl IntoIterator<Item = &'a str>,
) -> bool {
    fields.into_iter().any(|field| {
        !values_equal(
            &document::project(before, field),
            &document::project(after, field),
        )
    })
}

/// Returns true if the record moves into or out of the filtered set.
pub fn filter_outcome_changed(before: &Value, after: &Value, filters: &[FilterSpec]) -> bool {
    PredicateFilter::matches(before, filters) != PredicateFilter::matches(after, filters)
}

/// Decides whether an update needs recomputing for a page.
///
/// Relevant when the filter outcome flips, a sort field changes, or any
/// filtered field changes. Irrelevant updates keep their place in the
/// collection and are only re-emitted if the record is visible.
pub fn is_relevant(
    before: &Value,
    after: &Value,
    filters: &[FilterSpec],
    sort_order: &[SortSpec],
) -> bool {
    filter_outcome_changed(before, after, filters)
        || differs_in_fields(before, after, sort_order.iter().map(|s| s.sort_by.as_str()))
        || differs_in_fields(
            before,
            after,
            filters
                .iter()
                .filter(|f| !f.is_empty())
                .map(|f| f.column_name.as_str()),
        )
}
