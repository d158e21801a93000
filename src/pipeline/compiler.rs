//! Pipeline Compiler
//!
//! Turns filters, a sort order and pagination into a staged query:
//!
//! 1. One match stage ANDing every flat filter
//! 2. One set stage per filtered top-level array, rewriting the array
//!    into its pruned form, followed by a match that drops records whose
//!    pruned array is empty
//! 3. Sort, materializing magnitudes for absolute sort keys
//! 4. Skip and limit
//!
//! Nested pruning cascades: an array element survives only when it
//! satisfies the conditions placed at its depth and every filtered child
//! array it owns still has at least one element.

use crate::document::ID_FIELD;
use crate::query::{FilterSpec, MembershipType, Pagination, SortDirection, SortSpec};
use crate::schema::{self, Schema};

use super::expr::{Expr, Test};
use super::stage::{Pipeline, SortKey, Stage};

/// Prefix of the temporary fields holding absolute sort magnitudes
pub const ABS_SORT_PREFIX: &str = "__abs_sort_";

const INPUT: &str = "input";

/// Compiles page queries
pub struct PipelineCompiler;

impl PipelineCompiler {
    /// Compiles the full staged query for one page.
    pub fn compile(
        schema: &Schema,
        filters: &[FilterSpec],
        sort_order: &[SortSpec],
        pagination: &Pagination,
    ) -> Pipeline {
        Pipeline::new()
            .then(Self::filter_stages(schema, filters))
            .then(Self::sort_stages(sort_order))
            .then(Self::page_stages(pagination))
    }

    /// Compiles the filtering stages only.
    pub fn filter_stages(schema: &Schema, filters: &[FilterSpec]) -> Vec<Stage> {
        let mut flat = Vec::new();
        let mut roots: Vec<ArrayNode<'_>> = Vec::new();

        for filter in filters.iter().filter(|f| !f.is_empty()) {
            let path = schema::resolve(schema, &filter.column_name);
            if path.is_flat() {
                flat.extend(Self::condition(filter, Expr::field(&filter.column_name)));
            } else {
                ArrayNode::insert(&mut roots, &path.relative_paths(), &path.field, filter);
            }
        }

        let mut stages = Vec::new();
        if !flat.is_empty() {
            stages.push(Stage::Match(Expr::and(flat)));
        }

        for root in &roots {
            let pruned = root
                .build(0)
                .substitute(INPUT, &Expr::field(&root.relative_path));
            stages.push(Stage::Set {
                field: root.relative_path.clone(),
                value: pruned,
            });
            stages.push(Stage::Match(Expr::non_empty(Expr::field(
                &root.relative_path,
            ))));
        }

        stages
    }

    /// Compiles the sort stages.
    ///
    /// Absolute keys sort by magnitude first and then by the signed value,
    /// both in the requested direction. `_id` ascending is appended as the
    /// final tie-break unless already present.
    pub fn sort_stages(sort_order: &[SortSpec]) -> Vec<Stage> {
        let mut stages = Vec::new();
        let mut keys = Vec::new();
        let mut temporaries = Vec::new();

        for (i, spec) in sort_order.iter().enumerate() {
            if spec.is_absolute_sort {
                let temp = format!("{}{}", ABS_SORT_PREFIX, i);
                stages.push(Stage::Set {
                    field: temp.clone(),
                    value: Expr::Abs(Box::new(Expr::field(&spec.sort_by))),
                });
                keys.push(SortKey::new(&temp, spec.sort_direction));
                temporaries.push(temp);
            }
            keys.push(SortKey::new(&spec.sort_by, spec.sort_direction));
        }

        if keys.is_empty() {
            return stages;
        }
        if !keys.iter().any(|k| k.path == ID_FIELD) {
            keys.push(SortKey::new(ID_FIELD, SortDirection::Asc));
        }

        stages.push(Stage::Sort(keys));
        if !temporaries.is_empty() {
            stages.push(Stage::Unset(temporaries));
        }
        stages
    }

    /// Compiles skip and limit. Inactive pagination compiles to nothing.
    pub fn page_stages(pagination: &Pagination) -> Vec<Stage> {
        match pagination.limit() {
            Some(limit) => vec![Stage::Skip(pagination.skip()), Stage::Limit(limit)],
            None => Vec::new(),
        }
    }

    /// Builds the condition of one filter against `subject`.
    /// Returns nothing when the filter constrains nothing.
    fn condition(filter: &FilterSpec, subject: Expr) -> Option<Expr> {
        let mut parts = Vec::new();

        if let Some((kind, values)) = filter.membership() {
            let test = match kind {
                MembershipType::In => Test::In(values.to_vec()),
                MembershipType::NotIn => Test::NotIn(values.to_vec()),
            };
            parts.push(Expr::test(subject.clone(), test));
        }

        if let Some((mode, needle)) = filter.text_test() {
            let pattern = mode.pattern(needle);
            let test = if mode.is_negated() {
                Test::NotPattern(pattern)
            } else {
                Test::Pattern(pattern)
            };
            parts.push(Expr::test(subject, test));
        }

        (!parts.is_empty()).then(|| Expr::and(parts))
    }
}

/// One array level of the nested filter tree
struct ArrayNode<'a> {
    /// Path to this array from the enclosing element (or the record)
    relative_path: String,
    /// Filters evaluated against elements of this array, with the field
    /// path relative to the element
    filters: Vec<(String, &'a FilterSpec)>,
    children: Vec<ArrayNode<'a>>,
}

impl<'a> ArrayNode<'a> {
    fn insert(
        nodes: &mut Vec<ArrayNode<'a>>,
        path: &[&str],
        field: &str,
        filter: &'a FilterSpec,
    ) {
        let Some((head, rest)) = path.split_first() else {
            return;
        };

        let index = match nodes.iter().position(|n| n.relative_path == *head) {
            Some(index) => index,
            None => {
                nodes.push(ArrayNode {
                    relative_path: (*head).to_string(),
                    filters: Vec::new(),
                    children: Vec::new(),
                });
                nodes.len() - 1
            }
        };

        let node = &mut nodes[index];
        if rest.is_empty() {
            node.filters.push((field.to_string(), filter));
        } else {
            Self::insert(&mut node.children, rest, field, filter);
        }
    }

    /// Builds the pruning expression for this level, bottom-up.
    ///
    /// The result reads its array from `Placeholder(INPUT)`.
    fn build(&self, depth: usize) -> Expr {
        let element = format!("e{}", depth);

        let mut conditions: Vec<Expr> = self
            .filters
            .iter()
            .filter_map(|(field, filter)| {
                PipelineCompiler::condition(filter, Expr::var_field(&element, field))
            })
            .collect();

        if self.children.is_empty() {
            return Expr::Filter {
                input: Box::new(Expr::placeholder(INPUT)),
                bind: element,
                cond: Box::new(Expr::and(conditions)),
            };
        }

        // Replace each child array with its pruned form, then require
        // every pruned child to be non-empty.
        let mut body = Expr::Var(element.clone());
        for child in &self.children {
            let pruned = child
                .build(depth + 1)
                .substitute(INPUT, &Expr::var_field(&element, &child.relative_path));
            body = Expr::With {
                base: Box::new(body),
                field: child.relative_path.clone(),
                value: Box::new(pruned),
            };
            conditions.push(Expr::non_empty(Expr::var_field(
                &element,
                &child.relative_path,
            )));
        }

        Expr::Filter {
            input: Box::new(Expr::Map {
                input: Box::new(Expr::placeholder(INPUT)),
                bind: element.clone(),
                body: Box::new(body),
            }),
            bind: element,
            cond: Box::new(Expr::and(conditions)),
        }
    }
}
