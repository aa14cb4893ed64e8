//! Field projection: restrict a returned document to a subset
//! of fields. `_id` is included by default unless explicitly excluded;
//! fields the source document lacks are simply absent from the result,
//! never materialized as `null`.

use bson::Document;

use crate::error::QueryError;

#[derive(Debug, Clone)]
pub enum Projection {
    /// No projection document supplied: pass the document through as-is.
    All,
    /// Include only the named fields (plus `_id`, unless it is itself
    /// excluded via `{"_id": false}` sitting inside an otherwise
    /// inclusive projection).
    Include { fields: Vec<String>, include_id: bool },
    /// Exclude the named fields, keeping everything else.
    Exclude { fields: Vec<String> },
}

/// Parses a projection document. Values are truthy/falsy: `1`/`true` means
/// include, `0`/`false` means exclude. Mixing inclusion and exclusion for
/// fields other than `_id` is rejected, matching common document-store
/// projection semantics.
pub fn parse_projection(doc: &Document) -> Result<Projection, QueryError> {
    if doc.is_empty() {
        return Ok(Projection::All);
    }

    let mut include_id = true;
    let mut includes = Vec::new();
    let mut excludes = Vec::new();

    for (field, value) in doc {
        let wants_include = truthy(value)?;
        if field == "_id" {
            include_id = wants_include;
            continue;
        }
        if wants_include {
            includes.push(field.clone());
        } else {
            excludes.push(field.clone());
        }
    }

    if !includes.is_empty() && !excludes.is_empty() {
        return Err(QueryError::InvalidFilter(
            "projection cannot mix inclusion and exclusion of fields".into(),
        ));
    }

    if !includes.is_empty() {
        Ok(Projection::Include { fields: includes, include_id })
    } else if !excludes.is_empty() {
        Ok(Projection::Exclude { fields: excludes })
    } else {
        // Only `_id` appeared.
        if include_id {
            Ok(Projection::All)
        } else {
            Ok(Projection::Exclude { fields: Vec::new() })
        }
    }
}

fn truthy(value: &bson::Bson) -> Result<bool, QueryError> {
    match value {
        bson::Bson::Boolean(b) => Ok(*b),
        bson::Bson::Int32(n) => Ok(*n != 0),
        bson::Bson::Int64(n) => Ok(*n != 0),
        bson::Bson::Double(n) => Ok(*n != 0.0),
        other => Err(QueryError::InvalidFilter(format!(
            "projection value must be a boolean or number, got {other:?}"
        ))),
    }
}

/// Applies `projection` to `doc`, producing a new document.
pub fn apply_projection(doc: &Document, projection: &Projection) -> Document {
    match projection {
        Projection::All => doc.clone(),
        Projection::Include { fields, include_id } => {
            let mut out = Document::new();
            if *include_id {
                if let Some(id) = doc.get("_id") {
                    out.insert("_id", id.clone());
                }
            }
            for field in fields {
                if let Some(v) = doc.get(field) {
                    out.insert(field.clone(), v.clone());
                }
            }
            out
        }
        Projection::Exclude { fields } => {
            let mut out = doc.clone();
            for field in fields {
                out.remove(field);
            }
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn empty_projection_is_passthrough() {
        let projection = parse_projection(&doc! {}).unwrap();
        let result = apply_projection(&doc! { "_id": "a", "name": "bob" }, &projection);
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn inclusion_keeps_id_by_default() {
        let projection = parse_projection(&doc! { "name": 1 }).unwrap();
        let result = apply_projection(&doc! { "_id": "a", "name": "bob", "age": 30 }, &projection);
        assert_eq!(result.len(), 2);
        assert!(result.contains_key("_id"));
        assert!(result.contains_key("name"));
        assert!(!result.contains_key("age"));
    }

    #[test]
    fn inclusion_can_drop_id() {
        let projection = parse_projection(&doc! { "name": 1, "_id": 0 }).unwrap();
        let result = apply_projection(&doc! { "_id": "a", "name": "bob" }, &projection);
        assert!(!result.contains_key("_id"));
        assert!(result.contains_key("name"));
    }

    #[test]
    fn exclusion_keeps_remaining_fields() {
        let projection = parse_projection(&doc! { "age": false }).unwrap();
        let result = apply_projection(&doc! { "_id": "a", "name": "bob", "age": 30 }, &projection);
        assert!(result.contains_key("name"));
        assert!(!result.contains_key("age"));
    }

    #[test]
    fn missing_field_is_absent_not_null() {
        let projection = parse_projection(&doc! { "missing": 1 }).unwrap();
        let result = apply_projection(&doc! { "_id": "a" }, &projection);
        assert!(!result.contains_key("missing"));
    }

    #[test]
    fn mixing_inclusion_and_exclusion_errors() {
        let err = parse_projection(&doc! { "name": 1, "age": 0 }).unwrap_err();
        assert!(matches!(err, QueryError::InvalidFilter(_)));
    }
}
