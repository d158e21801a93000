//! In-memory document store
//!
//! Areas are ordered record lists behind a tokio `RwLock`. Facets run
//! through the pipeline executor under a single read lock, so every
//! facet of one request sees the same state.

use std::collections::{HashMap, HashSet};

use futures_util::future::{BoxFuture, FutureExt};
use serde_json::Value;
use tokio::sync::RwLock;

use super::errors::{StoreError, StoreResult};
use super::{DocumentStore, Facet};
use crate::changes::{ChangeResult, MutationBatch};
use crate::document::{self, id_key};
use crate::executor::PipelineExecutor;

/// Document store held in process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    areas: RwLock<HashMap<String, Vec<Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of an area's records, empty if the area does not exist
    pub async fn records(&self, area: &str) -> Vec<Value> {
        self.areas.read().await.get(area).cloned().unwrap_or_default()
    }

    /// Names of all existing areas, sorted
    pub async fn area_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.areas.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Applies a mutation batch to a collection.
    ///
    /// Creates are inserted, deletes remove matching records, and partial
    /// updates are merged into the records they name. Updates naming
    /// missing records are ignored.
    pub async fn apply(&self, collection: &str, batch: &MutationBatch) -> ChangeResult<()> {
        batch.validate()?;

        match batch {
            MutationBatch::Created(records) => {
                self.insert_many(collection, records.clone()).await?;
            }
            MutationBatch::Deleted(ids) => {
                let doomed: HashSet<String> = ids.iter().map(id_key).collect();
                let mut areas = self.areas.write().await;
                if let Some(records) = areas.get_mut(collection) {
                    records.retain(|r| {
                        document::id_of(r).map_or(true, |id| !doomed.contains(&id_key(id)))
                    });
                }
            }
            MutationBatch::Updated(partials) => {
                let mut areas = self.areas.write().await;
                if let Some(records) = areas.get_mut(collection) {
                    for partial in partials {
                        let Some(key) = document::id_of(partial).map(id_key) else {
                            continue;
                        };
                        let existing = records.iter_mut().find(|r| {
                            document::id_of(r).map(id_key).as_deref() == Some(key.as_str())
                        });
                        if let Some(record) = existing {
                            *record = document::apply_partial(record, partial);
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

fn record_key(area: &str, record: &Value) -> StoreResult<String> {
    document::id_of(record)
        .map(id_key)
        .ok_or_else(|| StoreError::MissingId {
            area: area.to_string(),
        })
}

impl DocumentStore for MemoryStore {
    fn insert_many<'a>(
        &'a self,
        area: &'a str,
        records: Vec<Value>,
    ) -> BoxFuture<'a, StoreResult<()>> {
        async move {
            let mut areas = self.areas.write().await;
            let existing = areas.entry(area.to_string()).or_default();

            let mut seen: HashSet<String> = existing
                .iter()
                .filter_map(|r| document::id_of(r).map(id_key))
                .collect();
            for record in &records {
                let key = record_key(area, record)?;
                if !seen.insert(key.clone()) {
                    return Err(StoreError::DuplicateId {
                        area: area.to_string(),
                        id: key,
                    });
                }
            }

            existing.extend(records);
            Ok(())
        }
        .boxed()
    }

    fn upsert_many<'a>(
        &'a self,
        area: &'a str,
        records: Vec<Value>,
    ) -> BoxFuture<'a, StoreResult<()>> {
        async move {
            let mut areas = self.areas.write().await;
            let existing = areas.entry(area.to_string()).or_default();

            let mut positions: HashMap<String, usize> = existing
                .iter()
                .enumerate()
                .filter_map(|(i, r)| document::id_of(r).map(|id| (id_key(id), i)))
                .collect();

            for record in records {
                let key = record_key(area, &record)?;
                match positions.get(&key) {
                    Some(&i) => existing[i] = record,
                    None => {
                        positions.insert(key, existing.len());
                        existing.push(record);
                    }
                }
            }
            Ok(())
        }
        .boxed()
    }

    fn find_by_ids<'a>(
        &'a self,
        area: &'a str,
        ids: &'a [Value],
    ) -> BoxFuture<'a, StoreResult<Vec<Value>>> {
        async move {
            let wanted: HashSet<String> = ids.iter().map(id_key).collect();
            let areas = self.areas.read().await;
            Ok(areas
                .get(area)
                .map(|records| {
                    records
                        .iter()
                        .filter(|r| {
                            document::id_of(r).map_or(false, |id| wanted.contains(&id_key(id)))
                        })
                        .cloned()
                        .collect()
                })
                .unwrap_or_default())
        }
        .boxed()
    }

    fn facet<'a>(
        &'a self,
        area: &'a str,
        facets: &'a [Facet],
    ) -> BoxFuture<'a, StoreResult<HashMap<String, Vec<Value>>>> {
        async move {
            let areas = self.areas.read().await;
            let source = areas.get(area).cloned().unwrap_or_default();
            let mut executor = PipelineExecutor::new();

            let mut results = HashMap::with_capacity(facets.len());
            for facet in facets {
                let output = executor.run(&facet.pipeline, source.clone(), &*areas)?;
                results.insert(facet.name.clone(), output);
            }
            Ok(results)
        }
        .boxed()
    }

    fn drop_area<'a>(&'a self, area: &'a str) -> BoxFuture<'a, StoreResult<()>> {
        async move {
            self.areas.write().await.remove(area);
            Ok(())
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{Expr, Pipeline, Stage, Test};
    use serde_json::json;

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .insert_many(
                "orders",
                vec![
                    json!({"_id": "a", "status": "OPEN", "p": 1}),
                    json!({"_id": "b", "status": "CLOSED", "p": 2}),
                ],
            )
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicates_and_missing_ids() {
        let store = seeded().await;
        let dup = store.insert_many("orders", vec![json!({"_id": "a"})]).await;
        assert_eq!(dup.unwrap_err().code(), "STORE_DUPLICATE_ID");

        let missing = store.insert_many("orders", vec![json!({"x": 1})]).await;
        assert_eq!(missing.unwrap_err().code(), "STORE_MISSING_ID");

        assert_eq!(store.records("orders").await.len(), 2);
    }

    #[tokio::test]
    async fn test_upsert_replaces_in_place() {
        let store = seeded().await;
        store
            .upsert_many(
                "orders",
                vec![json!({"_id": "b", "status": "OPEN"}), json!({"_id": "c"})],
            )
            .await
            .unwrap();

        let records = store.records("orders").await;
        assert_eq!(records.len(), 3);
        assert_eq!(records[1], json!({"_id": "b", "status": "OPEN"}));
        assert_eq!(records[2]["_id"], "c");
    }

    #[tokio::test]
    async fn test_find_by_ids() {
        let store = seeded().await;
        let ids = vec![json!("b"), json!("zz")];
        let found = store.find_by_ids("orders", &ids).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0]["_id"], "b");
        assert!(store.find_by_ids("missing", &ids).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_facets_share_one_read() {
        let store = seeded().await;
        store
            .insert_many("staged", vec![json!({"_id": "n", "status": "OPEN", "p": 0})])
            .await
            .unwrap();

        let open = Stage::Match(Expr::test(Expr::field("status"), Test::In(vec![json!("OPEN")])));
        let facets = vec![
            Facet::new("before", Pipeline::from(vec![open.clone()])),
            Facet::new(
                "after",
                Pipeline::from(vec![
                    Stage::UnionWith {
                        area: "staged".into(),
                        pipeline: Pipeline::new(),
                    },
                    open,
                ]),
            ),
        ];

        let results = store.facet("orders", &facets).await.unwrap();
        assert_eq!(results["before"].len(), 1);
        assert_eq!(results["after"].len(), 2);
    }

    #[tokio::test]
    async fn test_drop_area() {
        let store = seeded().await;
        store.drop_area("orders").await.unwrap();
        store.drop_area("orders").await.unwrap();
        assert!(store.area_names().await.is_empty());
    }

    #[tokio::test]
    async fn test_apply_batches() {
        let store = seeded().await;

        store
            .apply("orders", &MutationBatch::Updated(vec![json!({"_id": "a", "p": 5})]))
            .await
            .unwrap();
        store
            .apply("orders", &MutationBatch::Deleted(vec![json!("b")]))
            .await
            .unwrap();
        store
            .apply("orders", &MutationBatch::Created(vec![json!({"_id": "c"})]))
            .await
            .unwrap();

        let records = store.records("orders").await;
        assert_eq!(
            records,
            vec![json!({"_id": "a", "status": "OPEN", "p": 5}), json!({"_id": "c"})]
        );

        let invalid = store
            .apply("orders", &MutationBatch::Updated(vec![json!({"_id": "a"})]))
            .await;
        assert!(invalid.is_err());
    }
}
