//! Filter, sort and pagination requests
//!
//! These are plain data, deserialized straight from page definitions.

use std::fmt;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Membership filter direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MembershipType {
    /// Value must be one of the listed values
    #[default]
    In,
    /// Value must be none of the listed values
    NotIn,
}

/// Text match modes. All of them are case-insensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TextMatch {
    Equals,
    NotEqual,
    #[default]
    Contains,
    NotContains,
    BeginsWith,
    EndsWith,
}

impl TextMatch {
    /// Returns true for the negated modes
    pub fn is_negated(&self) -> bool {
        matches!(self, TextMatch::NotEqual | TextMatch::NotContains)
    }

    /// Builds the (positive) regular expression source for `needle`.
    ///
    /// Negated modes return the pattern of their positive counterpart;
    /// callers invert the outcome using [`TextMatch::is_negated`].
    pub fn pattern(&self, needle: &str) -> String {
        let escaped = regex::escape(needle);
        match self {
            TextMatch::Equals | TextMatch::NotEqual => format!("^{}$", escaped),
            TextMatch::Contains | TextMatch::NotContains => escaped,
            TextMatch::BeginsWith => format!("^{}", escaped),
            TextMatch::EndsWith => format!("{}$", escaped),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TextMatch::Equals => "equals",
            TextMatch::NotEqual => "notEqual",
            TextMatch::Contains => "contains",
            TextMatch::NotContains => "notContains",
            TextMatch::BeginsWith => "beginsWith",
            TextMatch::EndsWith => "endsWith",
        }
    }
}

/// Compiles a pattern produced by [`TextMatch::pattern`], case-insensitively.
pub fn compile_pattern(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).case_insensitive(true).build()
}

impl fmt::Display for TextMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One filter over a dotted path.
///
/// A filter carries a membership test, a text test, or both (ANDed).
/// A filter with neither contributes nothing.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FilterSpec {
    /// Dotted path of the filtered field
    pub column_name: String,
    /// Literal values for the membership test
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filtered_values: Option<Vec<Value>>,
    /// Membership direction, `in` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_type: Option<MembershipType>,
    /// Text to match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_filter: Option<String>,
    /// Text match mode, `contains` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_filter_type: Option<TextMatch>,
}

impl FilterSpec {
    /// Membership filter: field value in `values`
    pub fn is_in(column: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            column_name: column.into(),
            filtered_values: Some(values),
            filter_type: Some(MembershipType::In),
            ..Default::default()
        }
    }

    /// Membership filter: field value not in `values`
    pub fn not_in(column: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            column_name: column.into(),
            filtered_values: Some(values),
            filter_type: Some(MembershipType::NotIn),
            ..Default::default()
        }
    }

    /// Text filter with the given mode
    pub fn text(column: impl Into<String>, mode: TextMatch, needle: impl Into<String>) -> Self {
        Self {
            column_name: column.into(),
            text_filter: Some(needle.into()),
            text_filter_type: Some(mode),
            ..Default::default()
        }
    }

    /// The membership test, if this filter has any values
    pub fn membership(&self) -> Option<(MembershipType, &[Value])> {
        match &self.filtered_values {
            Some(values) if !values.is_empty() => {
                Some((self.filter_type.unwrap_or_default(), values.as_slice()))
            }
            _ => None,
        }
    }

    /// The text test, if this filter has a non-empty needle
    pub fn text_test(&self) -> Option<(TextMatch, &str)> {
        match &self.text_filter {
            Some(needle) if !needle.is_empty() => {
                Some((self.text_filter_type.unwrap_or_default(), needle.as_str()))
            }
            _ => None,
        }
    }

    /// Returns true when the filter constrains nothing
    pub fn is_empty(&self) -> bool {
        self.membership().is_none() && self.text_test().is_none()
    }
}

/// Sort direction, `1` ascending and `-1` descending on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }

    /// Applies this direction to an ascending comparison
    pub fn apply(&self, ordering: std::cmp::Ordering) -> std::cmp::Ordering {
        match self {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    }
}

impl TryFrom<i64> for SortDirection {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(SortDirection::Asc),
            -1 => Ok(SortDirection::Desc),
            other => Err(format!("sort direction must be 1 or -1, got {}", other)),
        }
    }
}

impl From<SortDirection> for i64 {
    fn from(direction: SortDirection) -> Self {
        match direction {
            SortDirection::Asc => 1,
            SortDirection::Desc => -1,
        }
    }
}

/// One key of a composite sort
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    /// Dotted path of the sort field
    pub sort_by: String,
    /// Direction
    pub sort_direction: SortDirection,
    /// Sort by magnitude first, then by the signed value
    #[serde(default)]
    pub is_absolute_sort: bool,
}

impl SortSpec {
    /// Ascending sort on `field`
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            sort_by: field.into(),
            sort_direction: SortDirection::Asc,
            is_absolute_sort: false,
        }
    }

    /// Descending sort on `field`
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            sort_by: field.into(),
            sort_direction: SortDirection::Desc,
            is_absolute_sort: false,
        }
    }

    /// Turns this key into a magnitude-first sort
    pub fn absolute(mut self) -> Self {
        self.is_absolute_sort = true;
        self
    }
}

/// 1-based page selection.
///
/// Only takes effect when both numbers are positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Pagination {
    pub page_number: i64,
    pub page_size: i64,
}

impl Pagination {
    pub fn new(page_number: i64, page_size: i64) -> Self {
        Self {
            page_number,
            page_size,
        }
    }

    /// Pagination that selects everything
    pub fn none() -> Self {
        Self::default()
    }

    /// Returns true when both numbers are positive
    pub fn is_active(&self) -> bool {
        self.page_number > 0 && self.page_size > 0
    }

    /// Number of records before the window. Zero when inactive.
    pub fn skip(&self) -> u64 {
        if self.is_active() {
            ((self.page_number - 1) as u64).saturating_mul(self.page_size as u64)
        } else {
            0
        }
    }

    /// Window size, if active
    pub fn limit(&self) -> Option<u64> {
        self.is_active().then_some(self.page_size as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_filter_deserializes_wire_names() {
        let filter: FilterSpec = serde_json::from_value(json!({
            "column_name": "status",
            "filtered_values": ["OPEN"],
            "filter_type": "notIn",
            "text_filter": "abc",
            "text_filter_type": "beginsWith"
        }))
        .unwrap();

        assert_eq!(filter.filter_type, Some(MembershipType::NotIn));
        assert_eq!(filter.text_filter_type, Some(TextMatch::BeginsWith));
        assert!(!filter.is_empty());
    }

    #[test]
    fn test_empty_filter_parts_are_skipped() {
        let filter = FilterSpec {
            column_name: "status".into(),
            filtered_values: Some(vec![]),
            text_filter: Some(String::new()),
            ..Default::default()
        };
        assert!(filter.membership().is_none());
        assert!(filter.text_test().is_none());
        assert!(filter.is_empty());
    }

    #[test]
    fn test_text_patterns_are_escaped_and_anchored() {
        assert_eq!(TextMatch::Equals.pattern("a.b"), "^a\\.b$");
        assert_eq!(TextMatch::NotEqual.pattern("x"), "^x$");
        assert_eq!(TextMatch::Contains.pattern("x+"), "x\\+");
        assert_eq!(TextMatch::BeginsWith.pattern("x"), "^x");
        assert_eq!(TextMatch::EndsWith.pattern("x"), "x$");
        assert!(TextMatch::NotContains.is_negated());
        assert!(!TextMatch::EndsWith.is_negated());
    }

    #[test]
    fn test_compiled_patterns_ignore_case() {
        let regex = compile_pattern(&TextMatch::BeginsWith.pattern("ab.")).unwrap();
        assert!(regex.is_match("AB.cd"));
        assert!(!regex.is_match("abx"));
        assert!(!regex.is_match("xab."));
    }

    #[test]
    fn test_sort_direction_wire_format() {
        let sort: SortSpec =
            serde_json::from_value(json!({"sort_by": "priority", "sort_direction": -1})).unwrap();
        assert_eq!(sort.sort_direction, SortDirection::Desc);
        assert!(!sort.is_absolute_sort);

        let back = serde_json::to_value(SortSpec::asc("x").absolute()).unwrap();
        assert_eq!(back["sort_direction"], 1);
        assert_eq!(back["is_absolute_sort"], true);

        let bad: Result<SortSpec, _> =
            serde_json::from_value(json!({"sort_by": "x", "sort_direction": 0}));
        assert!(bad.is_err());
    }

    #[test]
    fn test_pagination_window() {
        let page = Pagination::new(3, 25);
        assert!(page.is_active());
        assert_eq!(page.skip(), 50);
        assert_eq!(page.limit(), Some(25));

        for inactive in [Pagination::none(), Pagination::new(0, 10), Pagination::new(2, -1)] {
            assert!(!inactive.is_active());
            assert_eq!(inactive.skip(), 0);
            assert_eq!(inactive.limit(), None);
        }
    }

    #[test]
    fn test_far_pages_saturate() {
        let far = Pagination::new(i64::MAX, 4);
        assert_eq!(far.skip(), u64::MAX);
        assert_eq!(far.limit(), Some(4));
        assert_eq!(Pagination::new(3, 10).skip(), 20);
        assert_eq!(Pagination::new(0, 10).skip(), 0);
    }
}
