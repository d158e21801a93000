//! Record sorting
//!
//! Sorts are stable and total: values compare by type rank first, and
//! `_id` settles ties whenever a page sort order is applied.

use std::cmp::Ordering;

use serde_json::Value;

use super::eval::magnitude;
use crate::document::{self, compare_values, ID_FIELD};
use crate::pipeline::SortKey;
use crate::query::SortSpec;

/// Sorts records
pub struct ResultSorter;

impl ResultSorter {
    /// Sorts records by compiled sort keys. Stable.
    pub fn sort(documents: &mut [Value], keys: &[SortKey]) {
        documents.sort_by(|a, b| Self::compare_by_keys(a, b, keys));
    }

    /// Compares two records by compiled sort keys.
    pub fn compare_by_keys(a: &Value, b: &Value, keys: &[SortKey]) -> Ordering {
        for key in keys {
            let ordering = compare_values(
                &document::project(a, &key.path),
                &document::project(b, &key.path),
            );
            if ordering != Ordering::Equal {
                return key.direction.apply(ordering);
            }
        }
        Ordering::Equal
    }

    /// Compares two records by a page sort order.
    ///
    /// Matches what the compiled sort does: absolute keys compare by
    /// magnitude and then by signed value, and `_id` ascending breaks
    /// remaining ties.
    pub fn compare_by_specs(a: &Value, b: &Value, sort_order: &[SortSpec]) -> Ordering {
        let left = Self::sort_key(a, sort_order);
        let right = Self::sort_key(b, sort_order);

        let mut directions = Vec::with_capacity(left.len());
        for spec in sort_order {
            if spec.is_absolute_sort {
                directions.push(spec.sort_direction);
            }
            directions.push(spec.sort_direction);
        }

        for (i, (l, r)) in left.iter().zip(right.iter()).enumerate() {
            let ordering = compare_values(l, r);
            if ordering != Ordering::Equal {
                return match directions.get(i) {
                    Some(direction) => direction.apply(ordering),
                    None => ordering,
                };
            }
        }
        Ordering::Equal
    }

    /// Deterministic sort key of a record: every sort value (magnitude
    /// first for absolute keys) followed by the identifier.
    pub fn sort_key(record: &Value, sort_order: &[SortSpec]) -> Vec<Value> {
        let mut key = Vec::with_capacity(sort_order.len() + 1);
        for spec in sort_order {
            let value = document::project(record, &spec.sort_by);
            if spec.is_absolute_sort {
                key.push(magnitude(&value));
            }
            key.push(value);
        }
        key.push(document::project(record, ID_FIELD));
        key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::SortDirection;
    use serde_json::json;

    fn ids(docs: &[Value]) -> Vec<&str> {
        docs.iter().map(|d| d["_id"].as_str().unwrap()).collect()
    }

    #[test]
    fn test_sort_descending_with_id_tiebreak() {
        let mut docs = vec![
            json!({"_id": "c", "p": 5}),
            json!({"_id": "a", "p": 9}),
            json!({"_id": "b", "p": 5}),
        ];
        ResultSorter::sort(
            &mut docs,
            &[
                SortKey::new("p", SortDirection::Desc),
                SortKey::new("_id", SortDirection::Asc),
            ],
        );
        assert_eq!(ids(&docs), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_sort_stable_without_tiebreak() {
        let mut docs = vec![
            json!({"_id": "z", "p": 1}),
            json!({"_id": "y", "p": 1}),
        ];
        ResultSorter::sort(&mut docs, &[SortKey::new("p", SortDirection::Asc)]);
        assert_eq!(ids(&docs), vec!["z", "y"]);
    }

    #[test]
    fn test_missing_values_sort_first_ascending() {
        let mut docs = vec![json!({"_id": "a", "p": 1}), json!({"_id": "b"})];
        ResultSorter::sort(&mut docs, &[SortKey::new("p", SortDirection::Asc)]);
        assert_eq!(ids(&docs), vec!["b", "a"]);
    }

    #[test]
    fn test_compare_by_specs_absolute() {
        let order = vec![SortSpec::asc("delta").absolute()];
        let neg = json!({"_id": "n", "delta": -5});
        let pos = json!({"_id": "p", "delta": 5});
        let small = json!({"_id": "s", "delta": 1});

        assert_eq!(ResultSorter::compare_by_specs(&neg, &pos, &order), Ordering::Less);
        assert_eq!(ResultSorter::compare_by_specs(&small, &neg, &order), Ordering::Less);

        let desc = vec![SortSpec::desc("delta").absolute()];
        assert_eq!(ResultSorter::compare_by_specs(&pos, &neg, &desc), Ordering::Less);
    }

    #[test]
    fn test_sort_key_appends_id() {
        let record = json!({"_id": 7, "delta": -3});
        assert_eq!(
            ResultSorter::sort_key(&record, &[SortSpec::asc("delta").absolute()]),
            vec![json!(3), json!(-3), json!(7)]
        );
    }
}
