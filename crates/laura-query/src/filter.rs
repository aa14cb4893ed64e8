//! Filter grammar: field-value equality, operator documents
//! (`$eq,$ne,$gt,$gte,$lt,$lte,$in,$nin,$exists,$regex`), and top-level
//! `$and`/`$or` arrays of sub-filters.
//!
//! Walks the filter document field-by-field, dispatching between plain
//! equality and operator sub-documents, over owned `bson::Document`/`Bson`
//! values (matching the rest of this workspace's choice to use `bson` as
//! the in-memory document model) rather than raw BSON byte scanning.

use bson::{Bson, Document};
use regex::Regex;

use crate::error::QueryError;
use crate::value::{compare_values, extract, values_equal};

/// A parsed filter expression tree.
#[derive(Debug, Clone)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Eq(String, Bson),
    Ne(String, Bson),
    Gt(String, Bson),
    Gte(String, Bson),
    Lt(String, Bson),
    Lte(String, Bson),
    In(String, Vec<Bson>),
    Nin(String, Vec<Bson>),
    Exists(String, bool),
    Regex(String, Regex),
}

impl Filter {
    /// The empty filter matches every document.
    pub fn matches_all() -> Filter {
        Filter::And(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Filter::And(children) if children.is_empty())
    }

    /// Evaluates this expression against `doc`.
    pub fn evaluate(&self, doc: &Document) -> bool {
        match self {
            Filter::And(children) => children.iter().all(|c| c.evaluate(doc)),
            Filter::Or(children) => children.iter().any(|c| c.evaluate(doc)),
            Filter::Eq(field, value) => match extract(doc, field) {
                Some(v) => values_equal(v, value),
                None => matches!(value, Bson::Null),
            },
            Filter::Ne(field, value) => match extract(doc, field) {
                Some(v) => !values_equal(v, value),
                None => !matches!(value, Bson::Null),
            },
            Filter::Gt(field, value) => {
                matches!(extract(doc, field), Some(v) if compare_values(v, value) == std::cmp::Ordering::Greater)
            }
            Filter::Gte(field, value) => {
                matches!(extract(doc, field), Some(v) if compare_values(v, value) != std::cmp::Ordering::Less)
            }
            Filter::Lt(field, value) => {
                matches!(extract(doc, field), Some(v) if compare_values(v, value) == std::cmp::Ordering::Less)
            }
            Filter::Lte(field, value) => {
                matches!(extract(doc, field), Some(v) if compare_values(v, value) != std::cmp::Ordering::Greater)
            }
            Filter::In(field, values) => match extract(doc, field) {
                Some(v) => values.iter().any(|candidate| values_equal(v, candidate)),
                None => values.iter().any(|candidate| matches!(candidate, Bson::Null)),
            },
            Filter::Nin(field, values) => !Filter::In(field.clone(), values.clone()).evaluate(doc),
            Filter::Exists(field, want) => extract(doc, field).is_some() == *want,
            Filter::Regex(field, re) => match extract(doc, field) {
                Some(Bson::String(s)) => re.is_match(s),
                _ => false,
            },
        }
    }

    /// Field paths constrained by an `$eq` or range operator at the
    /// top level — the planner's hook for identifying candidate indexes
    /// whose key field is constrained. Only direct top-level conjuncts
    /// are considered — a field nested inside `$or` cannot be satisfied
    /// by a single index lookup.
    pub fn indexable_fields(&self) -> Vec<(&str, IndexableConstraint<'_>)> {
        let mut out = Vec::new();
        self.collect_indexable(&mut out);
        out
    }

    fn collect_indexable<'a>(&'a self, out: &mut Vec<(&'a str, IndexableConstraint<'a>)>) {
        match self {
            Filter::And(children) => {
                for c in children {
                    c.collect_indexable(out);
                }
            }
            Filter::Eq(field, value) => out.push((field, IndexableConstraint::Eq(value))),
            Filter::Gt(field, value) => out.push((field, IndexableConstraint::Gt(value))),
            Filter::Gte(field, value) => out.push((field, IndexableConstraint::Gte(value))),
            Filter::Lt(field, value) => out.push((field, IndexableConstraint::Lt(value))),
            Filter::Lte(field, value) => out.push((field, IndexableConstraint::Lte(value))),
            _ => {}
        }
    }
}

/// A single field constraint a planner can satisfy with an index range
/// scan or point lookup.
#[derive(Debug, Clone, Copy)]
pub enum IndexableConstraint<'a> {
    Eq(&'a Bson),
    Gt(&'a Bson),
    Gte(&'a Bson),
    Lt(&'a Bson),
    Lte(&'a Bson),
}

/// Parses a filter document into a [`Filter`] tree. An empty
/// document matches every document.
pub fn parse_filter(doc: &Document) -> Result<Filter, QueryError> {
    if doc.is_empty() {
        return Ok(Filter::matches_all());
    }
    let mut children = Vec::with_capacity(doc.len());
    for (key, value) in doc {
        if key == "$and" {
            children.push(parse_logical_array(value, Filter::And)?);
        } else if key == "$or" {
            children.push(parse_logical_array(value, Filter::Or)?);
        } else if key.starts_with('$') {
            return Err(QueryError::InvalidFilter(format!(
                "unknown top-level operator: {key}"
            )));
        } else {
            children.push(parse_field_condition(key, value)?);
        }
    }
    if children.len() == 1 {
        Ok(children.pop().unwrap())
    } else {
        Ok(Filter::And(children))
    }
}

fn parse_logical_array(
    value: &Bson,
    make: fn(Vec<Filter>) -> Filter,
) -> Result<Filter, QueryError> {
    let Bson::Array(items) = value else {
        return Err(QueryError::InvalidFilter("$and/$or value must be an array".into()));
    };
    let mut children = Vec::with_capacity(items.len());
    for item in items {
        let Bson::Document(sub) = item else {
            return Err(QueryError::InvalidFilter(
                "$and/$or array elements must be documents".into(),
            ));
        };
        children.push(parse_filter(sub)?);
    }
    if children.is_empty() {
        return Err(QueryError::InvalidFilter("$and/$or array must not be empty".into()));
    }
    Ok(make(children))
}

fn parse_field_condition(field: &str, value: &Bson) -> Result<Filter, QueryError> {
    if let Bson::Document(sub) = value {
        let is_operator_doc = sub.keys().next().map(|k| k.starts_with('$')).unwrap_or(false);
        if is_operator_doc {
            return parse_operator_doc(field, sub);
        }
    }
    Ok(Filter::Eq(field.to_string(), value.clone()))
}

fn parse_operator_doc(field: &str, doc: &Document) -> Result<Filter, QueryError> {
    if doc.contains_key("$regex") {
        return parse_regex(field, doc);
    }
    let mut conditions = Vec::with_capacity(doc.len());
    for (op, value) in doc {
        let condition = match op.as_str() {
            "$eq" => Filter::Eq(field.to_string(), value.clone()),
            "$ne" => Filter::Ne(field.to_string(), value.clone()),
            "$gt" => Filter::Gt(field.to_string(), value.clone()),
            "$gte" => Filter::Gte(field.to_string(), value.clone()),
            "$lt" => Filter::Lt(field.to_string(), value.clone()),
            "$lte" => Filter::Lte(field.to_string(), value.clone()),
            "$in" => Filter::In(field.to_string(), array_operand(value)?),
            "$nin" => Filter::Nin(field.to_string(), array_operand(value)?),
            "$exists" => match value {
                Bson::Boolean(b) => Filter::Exists(field.to_string(), *b),
                _ => return Err(QueryError::InvalidFilter("$exists value must be a boolean".into())),
            },
            other => {
                return Err(QueryError::InvalidFilter(format!("unknown field operator: {other}")))
            }
        };
        conditions.push(condition);
    }
    match conditions.len() {
        0 => Err(QueryError::InvalidFilter("empty operator document".into())),
        1 => Ok(conditions.pop().unwrap()),
        _ => Ok(Filter::And(conditions)),
    }
}

fn array_operand(value: &Bson) -> Result<Vec<Bson>, QueryError> {
    match value {
        Bson::Array(items) => Ok(items.clone()),
        _ => Err(QueryError::InvalidFilter("$in/$nin value must be an array".into())),
    }
}

fn parse_regex(field: &str, doc: &Document) -> Result<Filter, QueryError> {
    let Some(Bson::String(pattern)) = doc.get("$regex") else {
        return Err(QueryError::InvalidFilter("$regex value must be a string".into()));
    };
    for key in doc.keys() {
        if key != "$regex" && key != "$options" {
            return Err(QueryError::InvalidFilter(format!(
                "unexpected key alongside $regex: {key}"
            )));
        }
    }
    let full_pattern = match doc.get("$options") {
        Some(Bson::String(opts)) => {
            let mut prefixed = String::with_capacity(pattern.len() + opts.len() + 4);
            prefixed.push_str("(?");
            for ch in opts.chars() {
                match ch {
                    'i' | 's' | 'm' | 'x' => prefixed.push(ch),
                    c => return Err(QueryError::InvalidFilter(format!("unknown regex option: {c}"))),
                }
            }
            prefixed.push(')');
            prefixed.push_str(pattern);
            prefixed
        }
        Some(_) => return Err(QueryError::InvalidFilter("$options value must be a string".into())),
        None => pattern.clone(),
    };
    let re = Regex::new(&full_pattern)
        .map_err(|e| QueryError::InvalidRegex(format!("invalid regex pattern: {e}")))?;
    Ok(Filter::Regex(field.to_string(), re))
}
