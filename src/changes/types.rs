//! Page definitions, mutation batches and change records

use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use super::errors::{ChangeError, ChangeResult};
use crate::document::{self, ID_FIELD};
use crate::pipeline::Pipeline;
use crate::query::{FilterSpec, Pagination, SortSpec};

/// Boundary flag set on a record that became the first of its window
pub const NEW_TOP: &str = "_new_top";
/// Boundary flag set on a record that became the last of its window
pub const NEW_BOTTOM: &str = "_new_bottom";

/// One named view over a collection
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PageDefinition {
    pub page_id: String,
    #[serde(default)]
    pub filters: Vec<FilterSpec>,
    #[serde(default)]
    pub sort_order: Vec<SortSpec>,
    #[serde(default)]
    pub pagination: Pagination,
    /// Collection-specific shaping applied before the filters
    #[serde(default)]
    pub custom_pre_stages: Pipeline,
}

impl PageDefinition {
    pub fn new(page_id: impl Into<String>) -> Self {
        Self {
            page_id: page_id.into(),
            ..Default::default()
        }
    }

    pub fn with_filter(mut self, filter: FilterSpec) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn with_sort(mut self, sort: SortSpec) -> Self {
        self.sort_order.push(sort);
        self
    }

    pub fn with_pagination(mut self, page_number: i64, page_size: i64) -> Self {
        self.pagination = Pagination::new(page_number, page_size);
        self
    }

    pub fn with_pre_stages(mut self, stages: Pipeline) -> Self {
        self.custom_pre_stages = stages;
        self
    }

    pub fn is_paginated(&self) -> bool {
        self.pagination.is_active()
    }

    pub fn is_sorted(&self) -> bool {
        !self.sort_order.is_empty()
    }
}

/// A batch of mutations of exactly one kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationBatch {
    /// Full new records, each with a unique `_id`
    Created(Vec<Value>),
    /// Identifiers of records to delete
    Deleted(Vec<Value>),
    /// Partial records: `_id` plus the changed fields
    Updated(Vec<Value>),
}

impl MutationBatch {
    /// Builds a batch from optional lists, exactly one of which must be
    /// non-empty.
    pub fn from_parts(
        created: Option<Vec<Value>>,
        deleted_ids: Option<Vec<Value>>,
        updated: Option<Vec<Value>>,
    ) -> ChangeResult<Self> {
        let non_empty = |list: Option<Vec<Value>>| list.filter(|l| !l.is_empty());

        match (non_empty(created), non_empty(deleted_ids), non_empty(updated)) {
            (Some(records), None, None) => Ok(MutationBatch::Created(records)),
            (None, Some(ids), None) => Ok(MutationBatch::Deleted(ids)),
            (None, None, Some(partials)) => Ok(MutationBatch::Updated(partials)),
            (None, None, None) => Err(ChangeError::invalid("no mutation supplied")),
            _ => Err(ChangeError::invalid(
                "exactly one of created, deleted_ids or updated may be supplied",
            )),
        }
    }

    /// Checks the batch contract: non-empty, identifiers everywhere, and
    /// at least one changed field per partial update.
    pub fn validate(&self) -> ChangeResult<()> {
        if self.is_empty() {
            return Err(ChangeError::invalid(format!("empty {} batch", self.kind())));
        }

        match self {
            MutationBatch::Created(records) => {
                for (i, record) in records.iter().enumerate() {
                    if !record.is_object() || document::id_of(record).is_none() {
                        return Err(ChangeError::invalid(format!(
                            "created record {} has no _id",
                            i
                        )));
                    }
                }
            }
            MutationBatch::Deleted(ids) => {
                if let Some(i) = ids.iter().position(Value::is_null) {
                    return Err(ChangeError::invalid(format!("deleted id {} is null", i)));
                }
            }
            MutationBatch::Updated(partials) => {
                for (i, partial) in partials.iter().enumerate() {
                    let Some(fields) = partial.as_object() else {
                        return Err(ChangeError::invalid(format!(
                            "updated record {} is not an object",
                            i
                        )));
                    };
                    if document::id_of(partial).is_none() {
                        return Err(ChangeError::invalid(format!(
                            "updated record {} has no _id",
                            i
                        )));
                    }
                    if !fields.keys().any(|k| k != ID_FIELD) {
                        return Err(ChangeError::invalid(format!(
                            "updated record {} changes no field",
                            i
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            MutationBatch::Created(_) => "created",
            MutationBatch::Deleted(_) => "deleted",
            MutationBatch::Updated(_) => "updated",
        }
    }

    pub fn len(&self) -> usize {
        match self {
            MutationBatch::Created(v) | MutationBatch::Deleted(v) | MutationBatch::Updated(v) => {
                v.len()
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Identifiers touched by the batch, in batch order
    pub fn ids(&self) -> Vec<Value> {
        match self {
            MutationBatch::Deleted(ids) => ids.clone(),
            MutationBatch::Created(records) | MutationBatch::Updated(records) => records
                .iter()
                .filter_map(|r| document::id_of(r).cloned())
                .collect(),
        }
    }
}

/// One visible change on a page
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeRecord {
    /// The record left the page
    Deleted { id: Value },
    /// The record is new to the page or changed in place
    Upsert {
        record: Value,
        new_top: bool,
        new_bottom: bool,
    },
}

impl ChangeRecord {
    pub fn deleted(id: Value) -> Self {
        ChangeRecord::Deleted { id }
    }

    /// An unflagged full record
    pub fn upsert(record: Value) -> Self {
        ChangeRecord::Upsert {
            record,
            new_top: false,
            new_bottom: false,
        }
    }

    pub fn flagged(record: Value, new_top: bool, new_bottom: bool) -> Self {
        ChangeRecord::Upsert {
            record,
            new_top,
            new_bottom,
        }
    }

    pub fn id(&self) -> Value {
        match self {
            ChangeRecord::Deleted { id } => id.clone(),
            ChangeRecord::Upsert { record, .. } => {
                document::id_of(record).cloned().unwrap_or(Value::Null)
            }
        }
    }

    pub fn is_deletion(&self) -> bool {
        matches!(self, ChangeRecord::Deleted { .. })
    }

    pub fn is_new_top(&self) -> bool {
        matches!(self, ChangeRecord::Upsert { new_top: true, .. })
    }

    pub fn is_new_bottom(&self) -> bool {
        matches!(self, ChangeRecord::Upsert { new_bottom: true, .. })
    }

    /// Drops the `_new_bottom` flag
    pub fn clear_bottom(&mut self) {
        if let ChangeRecord::Upsert { new_bottom, .. } = self {
            *new_bottom = false;
        }
    }

    /// The full record, if this is not a deletion marker
    pub fn record(&self) -> Option<&Value> {
        match self {
            ChangeRecord::Upsert { record, .. } => Some(record),
            ChangeRecord::Deleted { .. } => None,
        }
    }

    /// Wire shape: `{"_id": ..}` for deletions, the record with
    /// `_new_top` / `_new_bottom` set to true when flagged otherwise.
    pub fn to_value(&self) -> Value {
        match self {
            ChangeRecord::Deleted { id } => {
                let mut marker = Map::new();
                marker.insert(ID_FIELD.to_string(), id.clone());
                Value::Object(marker)
            }
            ChangeRecord::Upsert {
                record,
                new_top,
                new_bottom,
            } => {
                let mut out = record.clone();
                if let Value::Object(fields) = &mut out {
                    if *new_top {
                        fields.insert(NEW_TOP.to_string(), Value::Bool(true));
                    }
                    if *new_bottom {
                        fields.insert(NEW_BOTTOM.to_string(), Value::Bool(true));
                    }
                }
                out
            }
        }
    }
}

impl Serialize for ChangeRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

/// Changes for one page, in the order the page sorts them
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageChanges {
    pub page_id: String,
    pub changes: Vec<ChangeRecord>,
}

impl PageChanges {
    pub fn ids(&self) -> Vec<Value> {
        self.changes.iter().map(ChangeRecord::id).collect()
    }
}
