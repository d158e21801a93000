//! Pipeline stages

use serde::{Deserialize, Serialize};

use super::expr::Expr;
use crate::query::SortDirection;

/// One key of a compiled sort stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub path: String,
    pub direction: SortDirection,
}

impl SortKey {
    pub fn new(path: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            path: path.into(),
            direction,
        }
    }
}

/// A single stage of a staged query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Keeps records for which the expression is truthy
    Match(Expr),
    /// Writes the expression result to a dotted field
    Set { field: String, value: Expr },
    /// Removes dotted fields
    Unset(Vec<String>),
    /// Stable composite sort
    Sort(Vec<SortKey>),
    /// Drops the first n records
    Skip(u64),
    /// Keeps at most n records
    Limit(u64),
    /// Appends the output of `pipeline` run over another area
    UnionWith { area: String, pipeline: Pipeline },
    /// Merges records of another area onto records with the same `_id`,
    /// as partial updates
    MergeFrom { area: String },
}

impl Stage {
    /// Stage name for explain output and logs
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Match(_) => "match",
            Stage::Set { .. } => "set",
            Stage::Unset(_) => "unset",
            Stage::Sort(_) => "sort",
            Stage::Skip(_) => "skip",
            Stage::Limit(_) => "limit",
            Stage::UnionWith { .. } => "union_with",
            Stage::MergeFrom { .. } => "merge_from",
        }
    }
}

/// An ordered list of stages
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pipeline {
    pub stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, stage: Stage) {
        self.stages.push(stage);
    }

    pub fn extend(&mut self, stages: impl IntoIterator<Item = Stage>) {
        self.stages.extend(stages);
    }

    /// Builder-style append
    pub fn then(mut self, stages: impl IntoIterator<Item = Stage>) -> Self {
        self.extend(stages);
        self
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Stage> {
        self.stages.iter()
    }

    /// Stage names in order, e.g. `match -> sort -> limit`
    pub fn explain(&self) -> String {
        self.stages
            .iter()
            .map(Stage::name)
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}

impl From<Vec<Stage>> for Pipeline {
    fn from(stages: Vec<Stage>) -> Self {
        Self { stages }
    }
}

impl IntoIterator for Pipeline {
    type Item = Stage;
    type IntoIter = std::vec::IntoIter<Stage>;

    fn into_iter(self) -> Self::IntoIter {
        self.stages.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explain_lists_stage_names() {
        let pipeline = Pipeline::new().then(vec![
            Stage::Match(Expr::And(vec![])),
            Stage::Sort(vec![SortKey::new("a", SortDirection::Asc)]),
            Stage::Skip(10),
            Stage::Limit(5),
        ]);
        assert_eq!(pipeline.explain(), "match -> sort -> skip -> limit");
        assert_eq!(pipeline.len(), 4);
    }

    #[test]
    fn test_pipeline_serializes_as_stage_list() {
        let pipeline = Pipeline::from(vec![Stage::Limit(1)]);
        let json = serde_json::to_value(&pipeline).unwrap();
        assert_eq!(json, serde_json::json!([{"limit": 1}]));
    }
}
