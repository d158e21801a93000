//! Change-Detection Engine
//!
//! Flow of one call:
//!
//! 1. Validate the batch (no I/O before this passes)
//! 2. Read stored versions of updated records and merge the partials
//! 3. Stage created and merged records in scoped staging areas. If the
//!    stored versions could not be read, the partials are staged instead
//!    and merged onto the collection inside the "after" query
//! 4. Compile a "before" and an "after" pipeline per page and run them
//!    all as facets of one store request
//! 5. Reconcile each page, look past shrunken windows, order the result
//! 6. Release staging areas on every exit path
//!
//! The engine must see the collection as it was before the mutation.
//!
//! The "after" window is computed over the full unioned set, so against
//! a store that returns complete facet results it is never short while
//! records remain past it. The look-ahead in step 5 guards against
//! stores that truncate facet results: it only fires when a paginated
//! window came back shorter than both its page size and its "before"
//! window.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::Value;

use super::errors::ChangeResult;
use super::reconcile::{BatchView, Reconciler};
use super::types::{ChangeRecord, MutationBatch, PageChanges, PageDefinition};
use crate::config::EngineConfig;
use crate::document::{self, id_key, ID_FIELD};
use crate::executor::PipelineExecutor;
use crate::observability::{log_event, Event, ObservationScope};
use crate::pipeline::{Expr, Pipeline, PipelineCompiler, Stage, Test};
use crate::schema::Schema;
use crate::store::{DocumentStore, Facet, StagingArea, StagingKind};

/// Compiled pipelines of one page
struct PagePlan {
    before: Pipeline,
    /// Everything of `after` except skip and limit
    after_unpaged: Pipeline,
    after: Pipeline,
    /// Pre-stages plus filters
    projection: Pipeline,
    relevant: HashSet<String>,
}

impl PagePlan {
    fn build(
        schema: &Schema,
        page: &PageDefinition,
        view: &BatchView,
        created_area: Option<&str>,
        updated_area: Option<&str>,
    ) -> Self {
        let filters = PipelineCompiler::filter_stages(schema, &page.filters);
        let sort = PipelineCompiler::sort_stages(&page.sort_order);
        let paging = PipelineCompiler::page_stages(&page.pagination);
        let pre = page.custom_pre_stages.clone();
        let relevant = view.relevant_for(page);

        let before = pre
            .clone()
            .then(filters.clone())
            .then(sort.clone())
            .then(paging.clone());

        // Updates with a known stored version are excluded and re-staged
        // in full; the rest are merged onto the stored record in place.
        let relevant_ids: Vec<Value> = view
            .updates()
            .iter()
            .filter(|u| u.current.is_some() && relevant.contains(&id_key(&u.id)))
            .map(|u| u.id.clone())
            .collect();
        let patched = view.updates().iter().any(|u| u.current.is_none());
        let mut excluded: Vec<Value> = view.deleted().to_vec();
        excluded.extend(relevant_ids.iter().cloned());

        let mut after_unpaged = Pipeline::new();
        if let Some(area) = updated_area.filter(|_| patched) {
            after_unpaged.push(Stage::MergeFrom {
                area: area.to_string(),
            });
        }
        after_unpaged.extend(pre.clone());
        if !excluded.is_empty() {
            after_unpaged.push(Stage::Match(Expr::test(
                Expr::field(ID_FIELD),
                Test::NotIn(excluded),
            )));
        }
        if let Some(area) = created_area {
            after_unpaged.push(Stage::UnionWith {
                area: area.to_string(),
                pipeline: pre.clone(),
            });
        }
        match updated_area {
            Some(area) if !relevant_ids.is_empty() => {
                let reinjected = pre.clone().then(vec![Stage::Match(Expr::test(
                    Expr::field(ID_FIELD),
                    Test::In(relevant_ids),
                ))]);
                after_unpaged.push(Stage::UnionWith {
                    area: area.to_string(),
                    pipeline: reinjected,
                });
            }
            _ => {}
        }
        after_unpaged.extend(filters.clone());
        after_unpaged.extend(sort);

        let after = after_unpaged.clone().then(paging);
        let projection = pre.then(filters);

        Self {
            before,
            after_unpaged,
            after,
            projection,
            relevant,
        }
    }
}

/// Computes per-page changes for mutation batches
pub struct ChangeDetector {
    store: Arc<dyn DocumentStore>,
    config: EngineConfig,
}

impl ChangeDetector {
    /// Detector with the default configuration. Leaves the process-wide
    /// log level alone.
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            config: EngineConfig::default(),
        }
    }

    /// Detector with `config`; its `log_level` is applied to the
    /// process-wide logger.
    pub fn with_config(store: Arc<dyn DocumentStore>, config: EngineConfig) -> Self {
        config.apply_logging();
        Self { store, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Computes the visible changes `batch` would cause on each page.
    ///
    /// Returns one entry per page, in input order. Fails only on an
    /// invalid batch or a failed primary store request.
    pub async fn detect_changes(
        &self,
        collection: &str,
        schema: &Schema,
        pages: &[PageDefinition],
        batch: &MutationBatch,
    ) -> ChangeResult<Vec<PageChanges>> {
        batch.validate()?;
        if pages.is_empty() {
            return Ok(Vec::new());
        }

        let scope = ObservationScope::with_fields(
            Event::ChangeDetection,
            vec![
                ("collection", collection.to_string()),
                ("kind", batch.kind().to_string()),
                ("pages", pages.len().to_string()),
            ],
        );

        match self.detect(collection, schema, pages, batch).await {
            Ok(result) => {
                let total: usize = result.iter().map(|p| p.changes.len()).sum();
                scope.complete(&[("changes", total.to_string().as_str())]);
                Ok(result)
            }
            Err(e) => {
                scope.fail(&e.to_string());
                Err(e)
            }
        }
    }

    /// Current window of a page, as the "before" side of change
    /// detection sees it.
    pub async fn snapshot(
        &self,
        collection: &str,
        schema: &Schema,
        page: &PageDefinition,
    ) -> ChangeResult<Vec<Value>> {
        let scope = ObservationScope::with_fields(
            Event::PageSnapshot,
            vec![
                ("collection", collection.to_string()),
                ("page_id", page.page_id.clone()),
            ],
        );

        let pipeline = page.custom_pre_stages.clone().then(PipelineCompiler::compile(
            schema,
            &page.filters,
            &page.sort_order,
            &page.pagination,
        ));
        let facets = [Facet::new(page.page_id.clone(), pipeline)];

        match self.store.facet(collection, &facets).await {
            Ok(mut results) => {
                let window = results.remove(&page.page_id).unwrap_or_default();
                scope.complete(&[("records", window.len().to_string().as_str())]);
                Ok(window)
            }
            Err(e) => {
                scope.fail(&e.to_string());
                Err(e.into())
            }
        }
    }

    async fn detect(
        &self,
        collection: &str,
        schema: &Schema,
        pages: &[PageDefinition],
        batch: &MutationBatch,
    ) -> ChangeResult<Vec<PageChanges>> {
        let view = self.prepare(collection, batch).await;

        let created_area = self
            .stage(collection, StagingKind::Created, view.created().to_vec())
            .await?;
        let merged: Vec<Value> = view.updates().iter().map(|u| u.merged.clone()).collect();
        let updated_area = match self.stage(collection, StagingKind::Updated, merged).await {
            Ok(area) => area,
            Err(e) => {
                if let Some(area) = created_area {
                    area.release().await;
                }
                return Err(e);
            }
        };

        let result = self
            .reconcile_pages(
                collection,
                schema,
                pages,
                &view,
                created_area.as_ref().map(StagingArea::name),
                updated_area.as_ref().map(StagingArea::name),
            )
            .await;

        if let Some(area) = created_area {
            area.release().await;
        }
        if let Some(area) = updated_area {
            area.release().await;
        }
        result
    }

    /// Indexes the batch, reading stored versions of updated records.
    async fn prepare(&self, collection: &str, batch: &MutationBatch) -> BatchView {
        let MutationBatch::Updated(_) = batch else {
            return BatchView::from_batch(batch, None);
        };

        let ids = batch.ids();
        match self.store.find_by_ids(collection, &ids).await {
            Ok(current) => BatchView::from_batch(batch, Some(current)),
            Err(e) => {
                log_event(
                    Event::UpdateLookupFailed,
                    &[
                        ("collection", collection),
                        ("reason", e.to_string().as_str()),
                    ],
                );
                BatchView::from_batch(batch, None)
            }
        }
    }

    async fn stage(
        &self,
        collection: &str,
        kind: StagingKind,
        records: Vec<Value>,
    ) -> ChangeResult<Option<StagingArea>> {
        if records.is_empty() {
            return Ok(None);
        }
        let area = StagingArea::acquire(
            Arc::clone(&self.store),
            &self.config.staging_prefix,
            collection,
            kind,
            records,
        )
        .await?;
        Ok(Some(area))
    }

    async fn reconcile_pages(
        &self,
        collection: &str,
        schema: &Schema,
        pages: &[PageDefinition],
        view: &BatchView,
        created_area: Option<&str>,
        updated_area: Option<&str>,
    ) -> ChangeResult<Vec<PageChanges>> {
        let plans: Vec<PagePlan> = pages
            .iter()
            .map(|page| PagePlan::build(schema, page, view, created_area, updated_area))
            .collect();

        let mut facets = Vec::with_capacity(plans.len() * 2);
        for (i, (page, plan)) in pages.iter().zip(&plans).enumerate() {
            log_event(
                Event::PipelineCompiled,
                &[
                    ("page_id", page.page_id.as_str()),
                    ("before", plan.before.explain().as_str()),
                    ("after", plan.after.explain().as_str()),
                ],
            );
            facets.push(Facet::new(before_facet(i), plan.before.clone()));
            facets.push(Facet::new(after_facet(i), plan.after.clone()));
        }

        let mut results = self.store.facet(collection, &facets).await?;
        let surface_middle = self.config.middle_shift_policy.surfaces(pages.len());
        let mut executor = PipelineExecutor::new();
        let mut out = Vec::with_capacity(pages.len());

        for (i, (page, plan)) in pages.iter().zip(&plans).enumerate() {
            let before = results.remove(&before_facet(i)).unwrap_or_default();
            let after = results.remove(&after_facet(i)).unwrap_or_default();

            let reconciler =
                Reconciler::new(page, view, &plan.relevant, &plan.projection, surface_middle);
            let mut changes = reconciler.reconcile(&before, &after, &mut executor)?;

            if self.window_shrank(page, &before, &after) {
                self.look_ahead(collection, page, plan, after.len(), &mut changes)
                    .await;
            }

            let known = self.last_known_values(collection, page, &changes, &before).await;
            Reconciler::order(&mut changes, page, &known);

            log_event(
                Event::PageReconciled,
                &[
                    ("page_id", page.page_id.as_str()),
                    ("changes", changes.len().to_string().as_str()),
                ],
            );
            out.push(PageChanges {
                page_id: page.page_id.clone(),
                changes,
            });
        }

        Ok(out)
    }

    /// True when a paginated window lost records and is now short
    fn window_shrank(&self, page: &PageDefinition, before: &[Value], after: &[Value]) -> bool {
        let Some(limit) = page.pagination.limit() else {
            return false;
        };
        self.config.shrink_lookahead
            && after.len() < before.len()
            && (after.len() as u64) < limit
    }

    /// Queries the record right after a shrunken window and, if one
    /// exists and is not already reported, adds it as the new bottom.
    /// Finds nothing unless the store truncated the "after" facet.
    /// Failures are logged and leave the changes as they are.
    async fn look_ahead(
        &self,
        collection: &str,
        page: &PageDefinition,
        plan: &PagePlan,
        window_len: usize,
        changes: &mut Vec<ChangeRecord>,
    ) {
        let skip = page.pagination.skip().saturating_add(window_len as u64);
        let pipeline = plan
            .after_unpaged
            .clone()
            .then(vec![Stage::Skip(skip), Stage::Limit(1)]);
        let facets = [Facet::new("lookahead", pipeline)];

        let next = match self.store.facet(collection, &facets).await {
            Ok(mut results) => results
                .remove("lookahead")
                .and_then(|found| found.into_iter().next()),
            Err(e) => {
                log_event(
                    Event::LookaheadFailed,
                    &[
                        ("page_id", page.page_id.as_str()),
                        ("reason", e.to_string().as_str()),
                    ],
                );
                return;
            }
        };

        let Some(record) = next else {
            return;
        };
        let key = document::id_of(&record).map(id_key);
        let reported = changes
            .iter()
            .any(|c| !c.is_deletion() && Some(id_key(&c.id())) == key);
        if reported {
            return;
        }

        let sorted = page.is_sorted();
        if sorted {
            for change in changes.iter_mut() {
                change.clear_bottom();
            }
        }
        changes.push(ChangeRecord::flagged(record, false, sorted));
    }

    /// Last known values of deletion markers, for ordering.
    ///
    /// Taken from the before window; anything missing there is read from
    /// the collection. A failed read is logged and those markers sort by
    /// identifier only.
    async fn last_known_values(
        &self,
        collection: &str,
        page: &PageDefinition,
        changes: &[ChangeRecord],
        before: &[Value],
    ) -> HashMap<String, Value> {
        let mut known = HashMap::new();
        if !page.is_sorted() {
            return known;
        }

        for record in before {
            if let Some(id) = document::id_of(record) {
                known.insert(id_key(id), record.clone());
            }
        }

        let missing: Vec<Value> = changes
            .iter()
            .filter(|c| c.is_deletion())
            .map(ChangeRecord::id)
            .filter(|id| !known.contains_key(&id_key(id)))
            .collect();
        if missing.is_empty() {
            return known;
        }

        match self.store.find_by_ids(collection, &missing).await {
            Ok(found) => {
                for record in found {
                    if let Some(key) = document::id_of(&record).map(id_key) {
                        known.insert(key, record);
                    }
                }
            }
            Err(e) => log_event(
                Event::MarkerLookupFailed,
                &[
                    ("page_id", page.page_id.as_str()),
                    ("reason", e.to_string().as_str()),
                ],
            ),
        }
        known
    }
}

fn before_facet(page_index: usize) -> String {
    format!("{}:before", page_index)
}

fn after_facet(page_index: usize) -> String {
    format!("{}:after", page_index)
}
