//! Update grammar: `$set`, `$unset`, `$inc`, `$push`, `$pull`,
//! `$addToSet`, `$pop`, or a full-document replacement when the update
//! document carries no top-level `$`-key.
//!
//! Each operator gets its own small function, extended with the array
//! operators (`$push`/`$pull`/`$addToSet`/`$pop`) and the equality
//! semantics (`values_equal`) already shared with the filter/index layers.

use bson::{Bson, Document};

use crate::error::QueryError;
use crate::value::values_equal;

/// A parsed update document: either a set of field operators or a full
/// replacement.
#[derive(Debug, Clone)]
pub enum Update {
    Operators(Vec<UpdateOp>),
    Replace(Document),
}

#[derive(Debug, Clone)]
pub enum UpdateOp {
    Set(String, Bson),
    Unset(String),
    Inc(String, Bson),
    Push(String, Bson),
    Pull(String, Bson),
    AddToSet(String, Bson),
    /// `true` pops the last element, `false` pops the first.
    Pop(String, bool),
}

/// Parses an update document. A document whose keys are all plain field
/// names (no leading `$`) is a full replacement; one with `$`-prefixed
/// top-level keys is an operator document. Mixing the two is rejected.
pub fn parse_update(doc: &Document) -> Result<Update, QueryError> {
    if doc.is_empty() {
        return Ok(Update::Replace(doc.clone()));
    }
    let has_operator_key = doc.keys().any(|k| k.starts_with('$'));
    let has_plain_key = doc.keys().any(|k| !k.starts_with('$'));
    if has_operator_key && has_plain_key {
        return Err(QueryError::InvalidUpdate(
            "update document mixes operators with plain fields".into(),
        ));
    }
    if !has_operator_key {
        return Ok(Update::Replace(doc.clone()));
    }

    let mut ops = Vec::new();
    for (op, fields) in doc {
        let Bson::Document(fields) = fields else {
            return Err(QueryError::InvalidUpdate(format!(
                "{op} value must be a document of field:value pairs"
            )));
        };
        for (field, value) in fields {
            ops.push(build_op(op, field, value)?);
        }
    }
    Ok(Update::Operators(ops))
}

fn build_op(op: &str, field: &str, value: &Bson) -> Result<UpdateOp, QueryError> {
    match op {
        "$set" => Ok(UpdateOp::Set(field.to_string(), value.clone())),
        "$unset" => Ok(UpdateOp::Unset(field.to_string())),
        "$inc" => Ok(UpdateOp::Inc(field.to_string(), value.clone())),
        "$push" => Ok(UpdateOp::Push(field.to_string(), value.clone())),
        "$pull" => Ok(UpdateOp::Pull(field.to_string(), value.clone())),
        "$addToSet" => Ok(UpdateOp::AddToSet(field.to_string(), value.clone())),
        "$pop" => {
            let last = match value {
                Bson::Int32(1) => true,
                Bson::Int32(-1) => false,
                Bson::Int64(1) => true,
                Bson::Int64(-1) => false,
                Bson::Double(n) if *n == 1.0 => true,
                Bson::Double(n) if *n == -1.0 => false,
                _ => {
                    return Err(QueryError::InvalidUpdate(
                        "$pop value must be 1 or -1".into(),
                    ))
                }
            };
            Ok(UpdateOp::Pop(field.to_string(), last))
        }
        other => Err(QueryError::InvalidUpdate(format!("unknown update operator: {other}"))),
    }
}

/// Applies `update` to a clone of `doc`, returning the resulting document.
/// `_id` is never modified by operators or replacement (the caller is
/// responsible for preserving identity).
pub fn apply_update(doc: &Document, update: &Update) -> Result<Document, QueryError> {
    match update {
        Update::Replace(replacement) => {
            let mut out = replacement.clone();
            if let Some(id) = doc.get("_id") {
                out.insert("_id", id.clone());
            }
            Ok(out)
        }
        Update::Operators(ops) => {
            let mut out = doc.clone();
            for op in ops {
                apply_op(&mut out, op)?;
            }
            Ok(out)
        }
    }
}

fn apply_op(doc: &mut Document, op: &UpdateOp) -> Result<(), QueryError> {
    match op {
        UpdateOp::Set(field, value) => {
            doc.insert(field.clone(), value.clone());
        }
        UpdateOp::Unset(field) => {
            doc.remove(field);
        }
        UpdateOp::Inc(field, delta) => op_inc(doc, field, delta)?,
        UpdateOp::Push(field, value) => op_push(doc, field, value)?,
        UpdateOp::Pull(field, value) => op_pull(doc, field, value)?,
        UpdateOp::AddToSet(field, value) => op_add_to_set(doc, field, value)?,
        UpdateOp::Pop(field, last) => op_pop(doc, field, *last)?,
    }
    Ok(())
}

/// `$inc`: adds a numeric delta, promoting integer to float when either
/// side is floating-point.
fn op_inc(doc: &mut Document, field: &str, delta: &Bson) -> Result<(), QueryError> {
    let current = doc.get(field).cloned().unwrap_or_else(|| match delta {
        Bson::Double(_) => Bson::Double(0.0),
        Bson::Int64(_) => Bson::Int64(0),
        _ => Bson::Int32(0),
    });
    let result = match (&current, delta) {
        (Bson::Int32(a), Bson::Int32(b)) => match a.checked_add(*b) {
            Some(sum) => Bson::Int32(sum),
            None => Bson::Int64(*a as i64 + *b as i64),
        },
        (Bson::Int32(a), Bson::Int64(b)) => Bson::Int64(*a as i64 + b),
        (Bson::Int64(a), Bson::Int32(b)) => Bson::Int64(a + *b as i64),
        (Bson::Int64(a), Bson::Int64(b)) => Bson::Int64(a + b),
        (a, b) if is_numeric(a) && is_numeric(b) => Bson::Double(as_f64(a) + as_f64(b)),
        _ => return Err(QueryError::InvalidUpdate(format!("$inc: field '{field}' is not numeric"))),
    };
    doc.insert(field.to_string(), result);
    Ok(())
}

fn is_numeric(v: &Bson) -> bool {
    matches!(v, Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_))
}

fn as_f64(v: &Bson) -> f64 {
    match v {
        Bson::Int32(n) => *n as f64,
        Bson::Int64(n) => *n as f64,
        Bson::Double(n) => *n,
        _ => 0.0,
    }
}

/// `$push`: appends to an array field, creating it if absent.
fn op_push(doc: &mut Document, field: &str, value: &Bson) -> Result<(), QueryError> {
    match doc.get_mut(field) {
        Some(Bson::Array(arr)) => {
            arr.push(value.clone());
            Ok(())
        }
        Some(_) => Err(QueryError::InvalidUpdate(format!("$push: field '{field}' is not an array"))),
        None => {
            doc.insert(field.to_string(), Bson::Array(vec![value.clone()]));
            Ok(())
        }
    }
}

/// `$pull`: removes every element equal to `value` (numeric
/// normalization, byte comparison for strings, structural otherwise).
fn op_pull(doc: &mut Document, field: &str, value: &Bson) -> Result<(), QueryError> {
    match doc.get_mut(field) {
        Some(Bson::Array(arr)) => {
            arr.retain(|existing| !values_equal(existing, value));
            Ok(())
        }
        Some(_) => Err(QueryError::InvalidUpdate(format!("$pull: field '{field}' is not an array"))),
        None => Ok(()),
    }
}

/// `$addToSet`: appends only if no existing element equals `value`.
fn op_add_to_set(doc: &mut Document, field: &str, value: &Bson) -> Result<(), QueryError> {
    match doc.get_mut(field) {
        Some(Bson::Array(arr)) => {
            if !arr.iter().any(|existing| values_equal(existing, value)) {
                arr.push(value.clone());
            }
            Ok(())
        }
        Some(_) => Err(QueryError::InvalidUpdate(format!(
            "$addToSet: field '{field}' is not an array"
        ))),
        None => {
            doc.insert(field.to_string(), Bson::Array(vec![value.clone()]));
            Ok(())
        }
    }
}

/// `$pop`: removes the last element when `last` is true, the first
/// otherwise. No-ops on a missing or empty array.
fn op_pop(doc: &mut Document, field: &str, last: bool) -> Result<(), QueryError> {
    match doc.get_mut(field) {
        Some(Bson::Array(arr)) => {
            if !arr.is_empty() {
                if last {
                    arr.pop();
                } else {
                    arr.remove(0);
                }
            }
            Ok(())
        }
        Some(_) => Err(QueryError::InvalidUpdate(format!("$pop: field '{field}' is not an array"))),
        None => Ok(()),
    }
}
