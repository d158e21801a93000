//! Filter matching over a single record

use serde_json::Value;

use crate::document::{self, values_equal};
use crate::query::{compile_pattern, FilterSpec, MembershipType};

/// Evaluates page filters against records
pub struct PredicateFilter;

impl PredicateFilter {
    /// Checks if a record matches all filters (AND semantics).
    ///
    /// Filters that constrain nothing always match.
    pub fn matches(record: &Value, filters: &[FilterSpec]) -> bool {
        filters
            .iter()
            .all(|filter| Self::matches_filter(record, filter))
    }

    /// Checks a single filter. Membership and text parts are ANDed.
    pub fn matches_filter(record: &Value, filter: &FilterSpec) -> bool {
        let value = document::project(record, &filter.column_name);
        let candidates = document::candidates(&value);

        if let Some((kind, values)) = filter.membership() {
            let found = candidates
                .iter()
                .any(|c| values.iter().any(|v| values_equal(c, v)));
            let passes = match kind {
                MembershipType::In => found,
                MembershipType::NotIn => !found,
            };
            if !passes {
                return false;
            }
        }

        if let Some((mode, needle)) = filter.text_test() {
            // A pattern that fails to compile matches no string.
            let found = match compile_pattern(&mode.pattern(needle)) {
                Ok(regex) => candidates
                    .iter()
                    .filter_map(|c| c.as_str())
                    .any(|text| regex.is_match(text)),
                Err(_) => false,
            };
            if found == mode.is_negated() {
                return false;
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::TextMatch;
    use serde_json::json;

    #[test]
    fn test_membership() {
        let record = json!({"_id": 1, "status": "OPEN", "qty": 3});
        assert!(PredicateFilter::matches(
            &record,
            &[FilterSpec::is_in("status", vec![json!("OPEN"), json!("NEW")])]
        ));
        assert!(!PredicateFilter::matches(
            &record,
            &[FilterSpec::not_in("status", vec![json!("OPEN")])]
        ));
        assert!(PredicateFilter::matches(
            &record,
            &[FilterSpec::is_in("qty", vec![json!(3.0)])]
        ));
    }

    #[test]
    fn test_missing_field_is_null() {
        let record = json!({"_id": 1});
        assert!(PredicateFilter::matches(
            &record,
            &[FilterSpec::is_in("owner", vec![Value::Null])]
        ));
        assert!(PredicateFilter::matches(
            &record,
            &[FilterSpec::not_in("owner", vec![json!("me")])]
        ));
    }

    #[test]
    fn test_text_modes() {
        let record = json!({"name": "Alpha Beta"});
        let check = |mode, needle: &str| {
            PredicateFilter::matches(&record, &[FilterSpec::text("name", mode, needle)])
        };

        assert!(check(TextMatch::Equals, "alpha beta"));
        assert!(!check(TextMatch::Equals, "alpha"));
        assert!(check(TextMatch::NotEqual, "alpha"));
        assert!(check(TextMatch::Contains, "HA B"));
        assert!(check(TextMatch::NotContains, "gamma"));
        assert!(!check(TextMatch::NotContains, "beta"));
        assert!(check(TextMatch::BeginsWith, "alp"));
        assert!(!check(TextMatch::BeginsWith, "beta"));
        assert!(check(TextMatch::EndsWith, "ETA"));
    }

    #[test]
    fn test_text_ignores_non_strings() {
        let record = json!({"n": 42});
        assert!(!PredicateFilter::matches(
            &record,
            &[FilterSpec::text("n", TextMatch::Contains, "4")]
        ));
        assert!(PredicateFilter::matches(
            &record,
            &[FilterSpec::text("n", TextMatch::NotContains, "4")]
        ));
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        let record = json!({"sym": "a.b"});
        assert!(PredicateFilter::matches(
            &record,
            &[FilterSpec::text("sym", TextMatch::Equals, "a.b")]
        ));
        assert!(!PredicateFilter::matches(
            &json!({"sym": "axb"}),
            &[FilterSpec::text("sym", TextMatch::Equals, "a.b")]
        ));
    }

    #[test]
    fn test_nested_paths_fan_out() {
        let record = json!({"legs": [{"side": "SELL"}, {"side": "BUY"}]});
        assert!(PredicateFilter::matches(
            &record,
            &[FilterSpec::is_in("legs.side", vec![json!("BUY")])]
        ));
        assert!(!PredicateFilter::matches(
            &record,
            &[FilterSpec::not_in("legs.side", vec![json!("BUY")])]
        ));
    }

    #[test]
    fn test_empty_filters_match_everything() {
        let empty = FilterSpec {
            column_name: "status".into(),
            filtered_values: Some(vec![]),
            ..Default::default()
        };
        assert!(PredicateFilter::matches(&json!({}), &[empty]));
        assert!(PredicateFilter::matches(&json!({}), &[]));
    }
}
