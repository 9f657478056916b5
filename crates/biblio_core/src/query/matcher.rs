//! In-process evaluation of queries and updates over [`Document`]s.
//!
//! # Invariants
//! - A path segment over an array applies to every document element
//!   (`loanHistory.memberId` matches any loan's member).
//! - Equality against an array field matches when any element is equal.
//! - Range comparisons only match values of the same type class.

use super::{Filter, Projection, ProjectionMode, Sort, SortOrder, Update, UpdateOp};
use crate::document::{Document, Value};
use crate::store::{StoreError, StoreResult};
use regex::{Regex, RegexBuilder};
use std::cmp::Ordering;

static NULL_VALUE: Value = Value::Null;

#[derive(Debug, Clone, Copy)]
enum RangeOp {
    Gt,
    Gte,
    Lt,
    Lte,
}

impl RangeOp {
    fn accepts(self, ordering: Ordering) -> bool {
        match self {
            Self::Gt => ordering == Ordering::Greater,
            Self::Gte => ordering != Ordering::Less,
            Self::Lt => ordering == Ordering::Less,
            Self::Lte => ordering != Ordering::Greater,
        }
    }
}

#[derive(Debug)]
enum Node {
    All,
    Eq(Vec<String>, Value),
    Range(Vec<String>, RangeOp, Value),
    In(Vec<String>, Vec<Value>),
    Regex(Vec<String>, Regex),
    Exists(Vec<String>, bool),
    ElemMatch(Vec<String>, Box<Node>),
    And(Vec<Node>),
    Or(Vec<Node>),
    Not(Box<Node>),
}

/// Compiled [`Filter`]. Compilation validates paths and regex patterns.
#[derive(Debug)]
pub(crate) struct Matcher {
    root: Node,
}

impl Matcher {
    pub(crate) fn compile(filter: &Filter) -> StoreResult<Self> {
        Ok(Self {
            root: compile_node(filter)?,
        })
    }

    pub(crate) fn matches(&self, document: &Document) -> bool {
        evaluate(&self.root, document)
    }
}

fn compile_node(filter: &Filter) -> StoreResult<Node> {
    Ok(match filter {
        Filter::All => Node::All,
        Filter::Eq(field, value) => Node::Eq(path(field)?, value.clone()),
        Filter::Ne(field, value) => {
            Node::Not(Box::new(Node::Eq(path(field)?, value.clone())))
        }
        Filter::Gt(field, value) => Node::Range(path(field)?, RangeOp::Gt, value.clone()),
        Filter::Gte(field, value) => Node::Range(path(field)?, RangeOp::Gte, value.clone()),
        Filter::Lt(field, value) => Node::Range(path(field)?, RangeOp::Lt, value.clone()),
        Filter::Lte(field, value) => Node::Range(path(field)?, RangeOp::Lte, value.clone()),
        Filter::In(field, values) => Node::In(path(field)?, values.clone()),
        Filter::Regex {
            field,
            pattern,
            case_insensitive,
        } => {
            let regex = RegexBuilder::new(pattern)
                .case_insensitive(*case_insensitive)
                .build()
                .map_err(|err| {
                    StoreError::InvalidQuery(format!("invalid pattern for `{field}`: {err}"))
                })?;
            Node::Regex(path(field)?, regex)
        }
        Filter::Exists(field, present) => Node::Exists(path(field)?, *present),
        Filter::ElemMatch(field, inner) => {
            Node::ElemMatch(path(field)?, Box::new(compile_node(inner)?))
        }
        Filter::And(filters) => Node::And(filters.iter().map(compile_node).collect::<StoreResult<_>>()?),
        Filter::Or(filters) => Node::Or(filters.iter().map(compile_node).collect::<StoreResult<_>>()?),
        Filter::Not(inner) => Node::Not(Box::new(compile_node(inner)?)),
    })
}

fn path(field: &str) -> StoreResult<Vec<String>> {
    crate::document::split_path(field)
        .map(|segments| segments.into_iter().map(str::to_string).collect())
        .map_err(|err| StoreError::InvalidQuery(err.to_string()))
}

fn evaluate(node: &Node, document: &Document) -> bool {
    match node {
        Node::All => true,
        Node::Eq(path, expected) => matches_eq(&candidates(document, path), expected),
        Node::Range(path, op, bound) => candidates(document, path)
            .into_iter()
            .any(|value| any_scalar(value, |scalar| in_range(scalar, *op, bound))),
        Node::In(path, expected) => {
            let found = candidates(document, path);
            expected.iter().any(|value| matches_eq(&found, value))
        }
        Node::Regex(path, regex) => candidates(document, path).into_iter().any(|value| {
            any_scalar(value, |scalar| {
                scalar.as_str().is_some_and(|text| regex.is_match(text))
            })
        }),
        Node::Exists(path, present) => !candidates(document, path).is_empty() == *present,
        Node::ElemMatch(path, inner) => candidates(document, path).into_iter().any(|value| {
            value.as_array().is_some_and(|items| {
                items.iter().any(|item| {
                    item.as_document()
                        .is_some_and(|element| evaluate(inner, element))
                })
            })
        }),
        Node::And(nodes) => nodes.iter().all(|node| evaluate(node, document)),
        Node::Or(nodes) => nodes.iter().any(|node| evaluate(node, document)),
        Node::Not(inner) => !evaluate(inner, document),
    }
}

/// Values reachable through `path`, fanning out over arrays of documents.
fn candidates<'d>(document: &'d Document, path: &[String]) -> Vec<&'d Value> {
    let mut found = Vec::new();
    if let Some((head, rest)) = path.split_first() {
        if let Some(value) = document.get(head) {
            collect(value, rest, &mut found);
        }
    }
    found
}

fn collect<'d>(value: &'d Value, path: &[String], found: &mut Vec<&'d Value>) {
    let Some((head, rest)) = path.split_first() else {
        found.push(value);
        return;
    };
    match value {
        Value::Document(doc) => {
            if let Some(child) = doc.get(head) {
                collect(child, rest, found);
            }
        }
        Value::Array(items) => {
            if let Ok(index) = head.parse::<usize>() {
                if let Some(item) = items.get(index) {
                    collect(item, rest, found);
                }
            }
            for item in items {
                if matches!(item, Value::Document(_)) {
                    collect(item, path, found);
                }
            }
        }
        _ => {}
    }
}

fn matches_eq(found: &[&Value], expected: &Value) -> bool {
    if found.is_empty() {
        return expected.is_null();
    }
    found.iter().any(|value| {
        value.loosely_equals(expected)
            || value
                .as_array()
                .is_some_and(|items| items.iter().any(|item| item.loosely_equals(expected)))
    })
}

fn any_scalar(value: &Value, test: impl Fn(&Value) -> bool) -> bool {
    match value {
        Value::Array(items) => items.iter().any(&test),
        other => test(other),
    }
}

fn in_range(value: &Value, op: RangeOp, bound: &Value) -> bool {
    value.type_rank() == bound.type_rank() && op.accepts(value.canonical_cmp(bound))
}

/// Sorts documents in place; ties keep their incoming order.
pub(crate) fn sort_documents(documents: &mut [Document], sort: &Sort) {
    let keys: Vec<(Vec<String>, SortOrder)> = sort
        .keys()
        .iter()
        .map(|(field, order)| (field.split('.').map(str::to_string).collect(), *order))
        .collect();

    documents.sort_by(|left, right| {
        for (path, order) in &keys {
            let ordering = sort_key(left, path).canonical_cmp(sort_key(right, path));
            let ordering = match order {
                SortOrder::Ascending => ordering,
                SortOrder::Descending => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

fn sort_key<'d>(document: &'d Document, path: &[String]) -> &'d Value {
    candidates(document, path)
        .into_iter()
        .next()
        .unwrap_or(&NULL_VALUE)
}

/// Applies `projection` to `document`. `id_field` follows `include_id`.
pub(crate) fn project(document: &Document, projection: &Projection, id_field: &str) -> Document {
    let paths: Vec<Vec<&str>> = projection
        .fields()
        .iter()
        .map(|field| field.split('.').collect())
        .collect();

    let mut projected = match projection.mode() {
        ProjectionMode::Include => {
            let slices: Vec<&[&str]> = paths.iter().map(Vec::as_slice).collect();
            let mut projected = include_paths(document, &slices);
            if projection.include_id() {
                if let Some(id) = document.get(id_field) {
                    projected.prepend(id_field, id.clone());
                }
            }
            projected
        }
        ProjectionMode::Exclude => {
            let mut projected = document.clone();
            for path in &paths {
                exclude_in_document(&mut projected, path);
            }
            projected
        }
    };

    if !projection.include_id() {
        projected.remove(id_field);
    }
    projected
}

fn include_paths(document: &Document, paths: &[&[&str]]) -> Document {
    let mut projected = Document::new();
    for (key, value) in document.iter() {
        let mut whole = false;
        let mut nested: Vec<&[&str]> = Vec::new();
        for path in paths {
            match path.split_first() {
                Some((head, rest)) if *head == key => {
                    if rest.is_empty() {
                        whole = true;
                    } else {
                        nested.push(rest);
                    }
                }
                _ => {}
            }
        }

        if whole {
            projected.insert(key, value.clone());
        } else if !nested.is_empty() {
            if let Some(value) = include_in_value(value, &nested) {
                projected.insert(key, value);
            }
        }
    }
    projected
}

fn include_in_value(value: &Value, paths: &[&[&str]]) -> Option<Value> {
    match value {
        Value::Document(doc) => Some(Value::Document(include_paths(doc, paths))),
        Value::Array(items) => Some(Value::Array(
            items
                .iter()
                .filter_map(|item| item.as_document())
                .map(|doc| Value::Document(include_paths(doc, paths)))
                .collect(),
        )),
        _ => None,
    }
}

fn exclude_in_document(document: &mut Document, path: &[&str]) {
    let Some((head, rest)) = path.split_first() else {
        return;
    };
    if rest.is_empty() {
        document.remove(head);
    } else if let Some(child) = document.get_mut(head) {
        exclude_in_value(child, rest);
    }
}

fn exclude_in_value(value: &mut Value, path: &[&str]) {
    match value {
        Value::Document(doc) => exclude_in_document(doc, path),
        Value::Array(items) => {
            for item in items {
                exclude_in_value(item, path);
            }
        }
        _ => {}
    }
}

/// Applies a validated update to `document`.
pub(crate) fn apply_update(document: &mut Document, update: &Update) -> StoreResult<()> {
    for op in update.ops() {
        match op {
            UpdateOp::Set(field, value) => {
                document
                    .set_path(field, value.clone())
                    .map_err(|err| StoreError::InvalidQuery(err.to_string()))?;
            }
            UpdateOp::Unset(field) => {
                document.remove_path(field);
            }
            UpdateOp::Inc(field, delta) => {
                let next = increment(document.get_path(field), delta).ok_or_else(|| {
                    StoreError::InvalidQuery(format!("cannot increment non-numeric field `{field}`"))
                })?;
                document
                    .set_path(field, next)
                    .map_err(|err| StoreError::InvalidQuery(err.to_string()))?;
            }
        }
    }
    Ok(())
}

fn increment(current: Option<&Value>, delta: &Value) -> Option<Value> {
    match (current, delta) {
        (None | Some(Value::Null), delta) if delta.is_number() => Some(delta.clone()),
        (Some(Value::Int(base)), Value::Int(step)) => Some(
            base.checked_add(*step)
                .map_or(Value::Double(*base as f64 + *step as f64), Value::Int),
        ),
        (Some(base), step) if base.is_number() && step.is_number() => {
            Some(Value::Double(base.as_f64()? + step.as_f64()?))
        }
        _ => None,
    }
}
