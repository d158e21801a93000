//! Pipeline executor
//!
//! Runs a compiled pipeline over an in-memory record list. Stages apply
//! in order; `union_with` reads other areas through an [`AreaSource`].

use std::collections::HashMap;

use serde_json::Value;

use crate::document;
use crate::pipeline::{Pipeline, Stage};

use super::errors::ExecutorResult;
use super::eval::ExprEvaluator;
use super::sorter::ResultSorter;

/// Read access to named record areas
pub trait AreaSource {
    /// Records of `area`, or None if the area does not exist
    fn documents(&self, area: &str) -> Option<&[Value]>;
}

impl AreaSource for HashMap<String, Vec<Value>> {
    fn documents(&self, area: &str) -> Option<&[Value]> {
        self.get(area).map(Vec::as_slice)
    }
}

/// An area source with no areas
pub struct NoAreas;

impl AreaSource for NoAreas {
    fn documents(&self, _area: &str) -> Option<&[Value]> {
        None
    }
}

/// Executes pipelines over record lists
#[derive(Debug, Default)]
pub struct PipelineExecutor {
    evaluator: ExprEvaluator,
}

impl PipelineExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `pipeline` over `input`.
    ///
    /// Deterministic: same pipeline and same input give the same output.
    pub fn run(
        &mut self,
        pipeline: &Pipeline,
        input: Vec<Value>,
        areas: &dyn AreaSource,
    ) -> ExecutorResult<Vec<Value>> {
        let mut docs = input;

        for stage in pipeline.iter() {
            docs = match stage {
                Stage::Match(cond) => {
                    let mut kept = Vec::with_capacity(docs.len());
                    for doc in docs {
                        if self.evaluator.matches(cond, &doc)? {
                            kept.push(doc);
                        }
                    }
                    kept
                }
                Stage::Set { field, value } => {
                    let mut out = Vec::with_capacity(docs.len());
                    for mut doc in docs {
                        let computed = self.evaluator.eval(value, &doc)?;
                        document::set_path(&mut doc, field, computed);
                        out.push(doc);
                    }
                    out
                }
                Stage::Unset(fields) => {
                    for doc in docs.iter_mut() {
                        for field in fields {
                            document::remove_path(doc, field);
                        }
                    }
                    docs
                }
                Stage::Sort(keys) => {
                    ResultSorter::sort(&mut docs, keys);
                    docs
                }
                Stage::Skip(n) => docs.into_iter().skip(to_usize(*n)).collect(),
                Stage::Limit(n) => {
                    docs.truncate(to_usize(*n));
                    docs
                }
                Stage::UnionWith { area, pipeline } => {
                    let source = areas.documents(area).map(<[Value]>::to_vec);
                    if let Some(source) = source {
                        let extra = self.run(pipeline, source, areas)?;
                        docs.extend(extra);
                    }
                    docs
                }
                Stage::MergeFrom { area } => match areas.documents(area) {
                    Some(patches) => merge_by_id(docs, patches),
                    None => docs,
                },
            };
        }

        Ok(docs)
    }

    /// Runs `pipeline` over a single record, returning what is left of it.
    ///
    /// Used to project a record locally when it is known not to move.
    pub fn project_one(
        &mut self,
        pipeline: &Pipeline,
        record: Value,
    ) -> ExecutorResult<Option<Value>> {
        Ok(self.run(pipeline, vec![record], &NoAreas)?.into_iter().next())
    }
}

/// Applies each patch to the record sharing its identifier
fn merge_by_id(docs: Vec<Value>, patches: &[Value]) -> Vec<Value> {
    let by_id: HashMap<String, &Value> = patches
        .iter()
        .filter_map(|p| document::id_of(p).map(|id| (document::id_key(id), p)))
        .collect();

    docs.into_iter()
        .map(|doc| {
            let patch = document::id_of(&doc).and_then(|id| by_id.get(&document::id_key(id)));
            match patch {
                Some(patch) => document::apply_partial(&doc, patch),
                None => doc,
            }
        })
        .collect()
}

fn to_usize(n: u64) -> usize {
    usize::try_from(n).unwrap_or(usize::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{Expr, SortKey, Test};
    use crate::query::SortDirection;
    use serde_json::json;

    fn ids(docs: &[Value]) -> Vec<&str> {
        docs.iter().map(|d| d["_id"].as_str().unwrap()).collect()
    }

    fn orders() -> Vec<Value> {
        vec![
            json!({"_id": "a", "status": "OPEN", "p": 3}),
            json!({"_id": "b", "status": "CLOSED", "p": 9}),
            json!({"_id": "c", "status": "OPEN", "p": 7}),
            json!({"_id": "d", "status": "OPEN", "p": 1}),
        ]
    }

    #[test]
    fn test_match_sort_skip_limit() {
        let pipeline = Pipeline::from(vec![
            Stage::Match(Expr::test(Expr::field("status"), Test::In(vec![json!("OPEN")]))),
            Stage::Sort(vec![SortKey::new("p", SortDirection::Desc)]),
            Stage::Skip(1),
            Stage::Limit(1),
        ]);
        let out = PipelineExecutor::new().run(&pipeline, orders(), &NoAreas).unwrap();
        assert_eq!(ids(&out), vec!["a"]);
    }

    #[test]
    fn test_set_and_unset() {
        let pipeline = Pipeline::from(vec![
            Stage::Set {
                field: "tmp".into(),
                value: Expr::Abs(Box::new(Expr::field("p"))),
            },
            Stage::Unset(vec!["tmp".into(), "status".into()]),
        ]);
        let out = PipelineExecutor::new()
            .run(&pipeline, vec![json!({"_id": "x", "p": -2, "status": "OPEN"})], &NoAreas)
            .unwrap();
        assert_eq!(out, vec![json!({"_id": "x", "p": -2})]);
    }

    #[test]
    fn test_union_with_runs_sub_pipeline() {
        let mut areas = HashMap::new();
        areas.insert(
            "staged".to_string(),
            vec![json!({"_id": "e", "p": 4}), json!({"_id": "f", "p": 0})],
        );
        let sub = Pipeline::from(vec![Stage::Match(Expr::test(
            Expr::field("p"),
            Test::NotIn(vec![json!(0)]),
        ))]);
        let pipeline = Pipeline::from(vec![
            Stage::Limit(1),
            Stage::UnionWith {
                area: "staged".into(),
                pipeline: sub,
            },
            Stage::UnionWith {
                area: "missing".into(),
                pipeline: Pipeline::new(),
            },
        ]);

        let out = PipelineExecutor::new().run(&pipeline, orders(), &areas).unwrap();
        assert_eq!(ids(&out), vec!["a", "e"]);
    }

    #[test]
    fn test_project_one() {
        let pipeline = Pipeline::from(vec![Stage::Match(Expr::test(
            Expr::field("status"),
            Test::In(vec![json!("OPEN")]),
        ))]);
        let mut executor = PipelineExecutor::new();
        assert!(executor
            .project_one(&pipeline, json!({"_id": "x", "status": "OPEN"}))
            .unwrap()
            .is_some());
        assert!(executor
            .project_one(&pipeline, json!({"_id": "y", "status": "CLOSED"}))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_merge_from_patches_matching_ids() {
        let mut areas = HashMap::new();
        areas.insert(
            "patches".to_string(),
            vec![json!({"_id": "c", "note": "rush"}), json!({"_id": "z", "p": 0})],
        );
        let pipeline = Pipeline::from(vec![
            Stage::MergeFrom {
                area: "patches".into(),
            },
            Stage::Match(Expr::test(Expr::field("status"), Test::In(vec![json!("OPEN")]))),
        ]);

        let out = PipelineExecutor::new().run(&pipeline, orders(), &areas).unwrap();
        assert_eq!(ids(&out), vec!["a", "c", "d"]);
        assert_eq!(out[1], json!({"_id": "c", "status": "OPEN", "p": 7, "note": "rush"}));
    }
}
