//! Window reconciliation
//!
//! Compares a page's "before" and "after" windows and classifies every
//! record that entered, left or changed. Pure: no store access.
//!
//! Rules, applied per page:
//! - deleted records that were visible become deletion markers
//! - updated records that left the window become deletion markers
//! - updated records that entered the window are emitted in full
//! - updated records that stayed are emitted in full; flagged only when
//!   their sort key changed and they sit at a window edge
//! - created records that landed in the window are emitted in full
//! - on paginated pages, untouched records pushed out of the window
//!   become deletion markers, and untouched records shifted in are
//!   flagged at the edges or, when middle shifts are surfaced, emitted
//!   unflagged
//!
//! Boundary flags are only set on sorted pages.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use serde_json::{json, Value};

use super::types::{ChangeRecord, MutationBatch, PageDefinition};
use crate::document::{self, compare_values, id_key};
use crate::executor::{ExecutorResult, PipelineExecutor, ResultSorter};
use crate::pipeline::Pipeline;
use crate::predicate;

/// An update as it will be staged
#[derive(Debug, Clone, PartialEq)]
pub struct StagedUpdate {
    pub id: Value,
    /// Stored version before the update, if it could be read
    pub current: Option<Value>,
    /// Stored version with the partial applied, or the partial alone
    /// when the stored version is unknown
    pub merged: Value,
}

/// A mutation batch indexed for reconciliation
#[derive(Debug, Clone, Default)]
pub struct BatchView {
    created: Vec<Value>,
    created_keys: HashSet<String>,
    deleted: Vec<Value>,
    deleted_keys: HashSet<String>,
    updates: Vec<StagedUpdate>,
    update_index: HashMap<String, usize>,
}

impl BatchView {
    /// Indexes a validated batch.
    ///
    /// `current` holds the stored versions of updated records, or None
    /// when they could not be read. With stored versions, partials for
    /// records that do not exist are dropped; without them, every
    /// partial is staged as is, to be merged onto the stored record by
    /// the "after" query, and treated as relevant to every page.
    pub fn from_batch(batch: &MutationBatch, current: Option<Vec<Value>>) -> Self {
        let mut view = BatchView::default();

        match batch {
            MutationBatch::Created(records) => {
                for record in records {
                    if let Some(id) = document::id_of(record) {
                        if view.created_keys.insert(id_key(id)) {
                            view.created.push(record.clone());
                        }
                    }
                }
            }
            MutationBatch::Deleted(ids) => {
                for id in ids {
                    if view.deleted_keys.insert(id_key(id)) {
                        view.deleted.push(id.clone());
                    }
                }
            }
            MutationBatch::Updated(partials) => {
                let stored: Option<HashMap<String, Value>> = current.map(|records| {
                    records
                        .into_iter()
                        .filter_map(|r| document::id_of(&r).map(id_key).map(|k| (k, r)))
                        .collect()
                });

                for partial in partials {
                    let Some(id) = document::id_of(partial) else {
                        continue;
                    };
                    let key = id_key(id);

                    if let Some(&i) = view.update_index.get(&key) {
                        let merged = document::apply_partial(&view.updates[i].merged, partial);
                        view.updates[i].merged = merged;
                        continue;
                    }

                    let existing = match &stored {
                        Some(stored) => match stored.get(&key) {
                            Some(record) => Some(record.clone()),
                            None => continue,
                        },
                        None => None,
                    };
                    let base = existing.clone().unwrap_or_else(|| json!({ "_id": id }));

                    view.update_index.insert(key, view.updates.len());
                    view.updates.push(StagedUpdate {
                        id: id.clone(),
                        current: existing,
                        merged: document::apply_partial(&base, partial),
                    });
                }
            }
        }

        view
    }

    pub fn created(&self) -> &[Value] {
        &self.created
    }

    pub fn deleted(&self) -> &[Value] {
        &self.deleted
    }

    pub fn updates(&self) -> &[StagedUpdate] {
        &self.updates
    }

    pub fn is_created(&self, key: &str) -> bool {
        self.created_keys.contains(key)
    }

    pub fn is_deleted(&self, key: &str) -> bool {
        self.deleted_keys.contains(key)
    }

    pub fn update(&self, key: &str) -> Option<&StagedUpdate> {
        self.update_index.get(key).map(|&i| &self.updates[i])
    }

    /// Keys of the updates relevant to `page`.
    ///
    /// Updates without a stored version, and every update on a page with
    /// custom pre-stages, count as relevant.
    pub fn relevant_for(&self, page: &PageDefinition) -> HashSet<String> {
        self.updates
            .iter()
            .filter(|u| match &u.current {
                Some(current) if page.custom_pre_stages.is_empty() => predicate::is_relevant(
                    current,
                    &u.merged,
                    &page.filters,
                    &page.sort_order,
                ),
                _ => true,
            })
            .map(|u| id_key(&u.id))
            .collect()
    }
}

/// Reconciles one page
pub struct Reconciler<'a> {
    page: &'a PageDefinition,
    view: &'a BatchView,
    relevant: &'a HashSet<String>,
    /// Pre-stages plus filters, used to project records that did not move
    projection: &'a Pipeline,
    surface_middle: bool,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        page: &'a PageDefinition,
        view: &'a BatchView,
        relevant: &'a HashSet<String>,
        projection: &'a Pipeline,
        surface_middle: bool,
    ) -> Self {
        Self {
            page,
            view,
            relevant,
            projection,
            surface_middle,
        }
    }

    /// Classifies the differences between two windows.
    ///
    /// Deletion markers come first in before-window order, then full
    /// records in after-window order.
    pub fn reconcile(
        &self,
        before: &[Value],
        after: &[Value],
        executor: &mut PipelineExecutor,
    ) -> ExecutorResult<Vec<ChangeRecord>> {
        let before_pos = positions(before);
        let after_pos = positions(after);
        let paginated = self.page.is_paginated();
        let mut changes = ChangeSet::default();

        for record in before {
            let Some(id) = document::id_of(record) else {
                continue;
            };
            let key = id_key(id);
            if after_pos.contains_key(&key) {
                continue;
            }
            let touched = self.view.is_deleted(&key) || self.view.update(&key).is_some();
            if touched || (paginated && !self.view.is_created(&key)) {
                changes.push(&key, ChangeRecord::deleted(id.clone()));
            }
        }

        for (position, record) in after.iter().enumerate() {
            let Some(id) = document::id_of(record) else {
                continue;
            };
            let key = id_key(id);
            let (top, bottom) = self.edges(position, after.len());

            if self.view.is_created(&key) {
                changes.push(&key, ChangeRecord::flagged(record.clone(), top, bottom));
            } else if let Some(update) = self.view.update(&key) {
                let Some(&was) = before_pos.get(&key) else {
                    changes.push(&key, ChangeRecord::flagged(record.clone(), top, bottom));
                    continue;
                };
                if self.relevant.contains(&key) {
                    let moved = sort_key_changed(&before[was], record, self.page);
                    changes.push(
                        &key,
                        ChangeRecord::flagged(record.clone(), top && moved, bottom && moved),
                    );
                } else {
                    let body = executor
                        .project_one(self.projection, update.merged.clone())?
                        .unwrap_or_else(|| update.merged.clone());
                    changes.push(&key, ChangeRecord::upsert(body));
                }
            } else if paginated && !before_pos.contains_key(&key) {
                if top || bottom {
                    changes.push(&key, ChangeRecord::flagged(record.clone(), top, bottom));
                } else if self.surface_middle {
                    changes.push(&key, ChangeRecord::upsert(record.clone()));
                }
            }
        }

        Ok(changes.into_vec())
    }

    /// Edge flags for a window position; never set on unsorted pages
    fn edges(&self, position: usize, len: usize) -> (bool, bool) {
        if !self.page.is_sorted() {
            return (false, false);
        }
        (position == 0, position + 1 == len)
    }

    /// Orders changes by the page sort order.
    ///
    /// Deletion markers sort by the last known values in `known`, keyed
    /// by identifier; markers without known values sort by `_id` alone.
    /// Unsorted pages keep the reconciliation order.
    pub fn order(
        changes: &mut [ChangeRecord],
        page: &PageDefinition,
        known: &HashMap<String, Value>,
    ) {
        if !page.is_sorted() {
            return;
        }
        let value_of = |change: &ChangeRecord| -> Value {
            match change {
                ChangeRecord::Upsert { record, .. } => record.clone(),
                ChangeRecord::Deleted { id } => known
                    .get(&id_key(id))
                    .cloned()
                    .unwrap_or_else(|| json!({ "_id": id })),
            }
        };
        changes.sort_by(|a, b| {
            ResultSorter::compare_by_specs(&value_of(a), &value_of(b), &page.sort_order)
        });
    }
}

/// Position of every identified record in a window
fn positions(window: &[Value]) -> HashMap<String, usize> {
    window
        .iter()
        .enumerate()
        .filter_map(|(i, r)| document::id_of(r).map(|id| (id_key(id), i)))
        .collect()
}

/// Returns true if the deterministic sort key differs between versions
fn sort_key_changed(before: &Value, after: &Value, page: &PageDefinition) -> bool {
    let old = ResultSorter::sort_key(before, &page.sort_order);
    let new = ResultSorter::sort_key(after, &page.sort_order);
    old.len() != new.len()
        || old
            .iter()
            .zip(new.iter())
            .any(|(a, b)| compare_values(a, b) != Ordering::Equal)
}

/// Change list deduplicated by (identifier, kind). Repeated full
/// records merge their flags.
#[derive(Default)]
struct ChangeSet {
    changes: Vec<ChangeRecord>,
    seen: HashMap<(String, bool), usize>,
}

impl ChangeSet {
    fn push(&mut self, key: &str, change: ChangeRecord) {
        let slot = (key.to_string(), change.is_deletion());
        match self.seen.get(&slot) {
            Some(&i) => {
                if let (
                    ChangeRecord::Upsert {
                        new_top, new_bottom, ..
                    },
                    ChangeRecord::Upsert {
                        new_top: top,
                        new_bottom: bottom,
                        ..
                    },
                ) = (&mut self.changes[i], &change)
                {
                    *new_top |= *top;
                    *new_bottom |= *bottom;
                }
            }
            None => {
                self.seen.insert(slot, self.changes.len());
                self.changes.push(change);
            }
        }
    }

    fn into_vec(self) -> Vec<ChangeRecord> {
        self.changes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{FilterSpec, SortSpec};

    fn sorted_page() -> PageDefinition {
        PageDefinition::new("open")
            .with_filter(FilterSpec::is_in("status", vec![json!("OPEN")]))
            .with_sort(SortSpec::desc("p"))
            .with_pagination(1, 2)
    }

    fn run(
        page: &PageDefinition,
        view: &BatchView,
        before: &[Value],
        after: &[Value],
        surface_middle: bool,
    ) -> Vec<ChangeRecord> {
        let relevant = view.relevant_for(page);
        let projection = Pipeline::new();
        Reconciler::new(page, view, &relevant, &projection, surface_middle)
            .reconcile(before, after, &mut PipelineExecutor::new())
            .unwrap()
    }

    #[test]
    fn test_view_merges_partials_onto_current() {
        let batch = MutationBatch::Updated(vec![
            json!({"_id": "a", "p": 2}),
            json!({"_id": "ghost", "p": 1}),
            json!({"_id": "a", "status": "CLOSED"}),
        ]);
        let view = BatchView::from_batch(&batch, Some(vec![json!({"_id": "a", "status": "OPEN", "p": 1})]));

        assert_eq!(view.updates().len(), 1);
        assert_eq!(view.updates()[0].merged, json!({"_id": "a", "status": "CLOSED", "p": 2}));
        assert!(view.update("\"ghost\"").is_none());
    }

    #[test]
    fn test_view_without_lookup_is_all_relevant() {
        let batch = MutationBatch::Updated(vec![json!({"_id": "a", "note": "x"})]);
        let view = BatchView::from_batch(&batch, None);
        assert_eq!(view.updates()[0].merged, json!({"_id": "a", "note": "x"}));
        assert!(view.relevant_for(&sorted_page()).contains("\"a\""));
    }

    #[test]
    fn test_filtered_out_update_becomes_marker_and_neighbour_slides_in() {
        let a = json!({"_id": "A", "status": "OPEN", "p": 9});
        let b = json!({"_id": "B", "status": "OPEN", "p": 5});
        let c = json!({"_id": "C", "status": "OPEN", "p": 4});
        let batch = MutationBatch::Updated(vec![json!({"_id": "B", "status": "CLOSED"})]);
        let view = BatchView::from_batch(&batch, Some(vec![b.clone()]));

        let changes = run(&sorted_page(), &view, &[a.clone(), b], &[a, c.clone()], false);
        assert_eq!(
            changes,
            vec![
                ChangeRecord::deleted(json!("B")),
                ChangeRecord::flagged(c, false, true),
            ]
        );
    }

    #[test]
    fn test_created_records_flag_edges_only_when_sorted() {
        let new = json!({"_id": "N", "status": "OPEN", "p": 10});
        let old = json!({"_id": "A", "status": "OPEN", "p": 9});
        let batch = MutationBatch::Created(vec![new.clone()]);
        let view = BatchView::from_batch(&batch, None);

        let sorted = run(&sorted_page(), &view, &[old.clone()], &[new.clone(), old.clone()], false);
        assert_eq!(sorted, vec![ChangeRecord::flagged(new.clone(), true, false)]);

        let unsorted_page = PageDefinition::new("all").with_pagination(1, 10);
        let unsorted = run(&unsorted_page, &view, &[old.clone()], &[old, new.clone()], false);
        assert_eq!(unsorted, vec![ChangeRecord::upsert(new)]);
    }

    #[test]
    fn test_pushed_out_record_becomes_marker() {
        let new = json!({"_id": "N", "status": "OPEN", "p": 10});
        let a = json!({"_id": "A", "status": "OPEN", "p": 9});
        let b = json!({"_id": "B", "status": "OPEN", "p": 5});
        let view = BatchView::from_batch(&MutationBatch::Created(vec![new.clone()]), None);

        let changes = run(&sorted_page(), &view, &[a.clone(), b], &[new.clone(), a], false);
        assert_eq!(
            changes,
            vec![
                ChangeRecord::deleted(json!("B")),
                ChangeRecord::flagged(new, true, false),
            ]
        );
    }

    #[test]
    fn test_irrelevant_update_is_projected_unflagged() {
        let a = json!({"_id": "A", "status": "OPEN", "p": 9, "note": "x"});
        let b = json!({"_id": "B", "status": "OPEN", "p": 5});
        let batch = MutationBatch::Updated(vec![json!({"_id": "A", "note": "y"})]);
        let view = BatchView::from_batch(&batch, Some(vec![a.clone()]));

        let changes = run(&sorted_page(), &view, &[a.clone(), b.clone()], &[a, b], false);
        assert_eq!(
            changes,
            vec![ChangeRecord::upsert(
                json!({"_id": "A", "status": "OPEN", "p": 9, "note": "y"})
            )]
        );
    }

    #[test]
    fn test_sort_move_within_window_flags_edge() {
        let a = json!({"_id": "A", "status": "OPEN", "p": 9});
        let b = json!({"_id": "B", "status": "OPEN", "p": 5});
        let b_after = json!({"_id": "B", "status": "OPEN", "p": 20});
        let batch = MutationBatch::Updated(vec![json!({"_id": "B", "p": 20})]);
        let view = BatchView::from_batch(&batch, Some(vec![b.clone()]));

        let changes = run(&sorted_page(), &view, &[a.clone(), b], &[b_after.clone(), a], false);
        assert_eq!(changes, vec![ChangeRecord::flagged(b_after, true, false)]);
    }

    #[test]
    fn test_middle_shift_follows_policy() {
        let page = PageDefinition::new("p")
            .with_sort(SortSpec::asc("p"))
            .with_pagination(1, 3);
        let x = json!({"_id": "X", "p": 1});
        let d = json!({"_id": "D", "p": 2});
        let m = json!({"_id": "M", "p": 3});
        let y = json!({"_id": "Y", "p": 4});
        let view = BatchView::from_batch(&MutationBatch::Deleted(vec![json!("D")]), None);

        let before = [x.clone(), d, m.clone()];
        let after = [x, m, y.clone()];

        let quiet = run(&page, &view, &before, &after, false);
        assert_eq!(
            quiet,
            vec![
                ChangeRecord::deleted(json!("D")),
                ChangeRecord::flagged(y.clone(), false, true),
            ]
        );

        let shifted = [json!({"_id": "X", "p": 1}), json!({"_id": "Z", "p": 1.5}), y.clone()];
        let loud = run(&page, &view, &before, &shifted, true);
        assert!(loud.contains(&ChangeRecord::upsert(json!({"_id": "Z", "p": 1.5}))));
        assert!(loud.contains(&ChangeRecord::deleted(json!("M"))));
    }

    #[test]
    fn test_order_uses_last_known_values_for_markers() {
        let page = sorted_page();
        let mut changes = vec![
            ChangeRecord::flagged(json!({"_id": "C", "p": 4}), false, true),
            ChangeRecord::deleted(json!("B")),
            ChangeRecord::upsert(json!({"_id": "A", "p": 9})),
        ];
        let mut known = HashMap::new();
        known.insert(id_key(&json!("B")), json!({"_id": "B", "p": 5}));

        Reconciler::order(&mut changes, &page, &known);
        let ids: Vec<Value> = changes.iter().map(ChangeRecord::id).collect();
        assert_eq!(ids, vec![json!("A"), json!("B"), json!("C")]);
    }

    #[test]
    fn test_change_set_dedupes_by_kind() {
        let mut set = ChangeSet::default();
        set.push("k", ChangeRecord::deleted(json!("k")));
        set.push("k", ChangeRecord::upsert(json!({"_id": "k"})));
        set.push("k", ChangeRecord::flagged(json!({"_id": "k"}), false, true));
        set.push("k", ChangeRecord::deleted(json!("k")));

        let changes = set.into_vec();
        assert_eq!(changes.len(), 2);
        assert!(changes[1].is_new_bottom());
    }
}
