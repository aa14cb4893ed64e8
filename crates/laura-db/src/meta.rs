//! Sidecar persistence for index definitions.
//!
//! None of the five index variants in `laura-engine` serialize their live
//! structure to a page — only the document store and the catalog do. A
//! collection's index set is therefore reconstructed on reopen from a
//! small JSON sidecar of index *definitions* plus a backfill scan over the
//! document store, the same way `create_index` populates a brand-new one.

use std::path::Path;

use bson::Document;
use laura_engine::{IndexHandle, OrderedIndex, PartialIndex, TextIndex, TtlIndex, UniqueIndex};
use laura_query::parse_filter;
use serde::{Deserialize, Serialize};

use crate::error::DbError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DescKind {
    Ordered,
    Unique,
    Partial { unique: bool, filter: serde_json::Value },
    Ttl { seconds: u64 },
    Text,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexDescriptor {
    pub name: String,
    pub fields: Vec<String>,
    pub kind: DescKind,
}

/// Builds a fresh, empty index from a descriptor. Callers backfill it from
/// the document store themselves.
pub fn build_handle(desc: &IndexDescriptor) -> Result<IndexHandle, DbError> {
    Ok(match &desc.kind {
        DescKind::Ordered => IndexHandle::Ordered { fields: desc.fields.clone(), index: OrderedIndex::new() },
        DescKind::Unique => IndexHandle::Unique { fields: desc.fields.clone(), index: UniqueIndex::new() },
        DescKind::Partial { unique, filter } => {
            let doc: Document =
                serde_json::from_value(filter.clone()).map_err(|e| DbError::Serialization(e.to_string()))?;
            let parsed = parse_filter(&doc)?;
            let predicate: laura_engine::Predicate = Box::new(move |d: &Document| parsed.evaluate(d));
            let index =
                if *unique { PartialIndex::new_unique(predicate) } else { PartialIndex::new_ordered(predicate) };
            IndexHandle::Partial { fields: desc.fields.clone(), index }
        }
        DescKind::Ttl { seconds } => {
            let field = desc.fields.first().cloned().unwrap_or_default();
            IndexHandle::Ttl { field, index: TtlIndex::new(*seconds) }
        }
        DescKind::Text => IndexHandle::Text { index: TextIndex::new(desc.fields.clone()) },
    })
}

pub fn load(path: &Path) -> Vec<IndexDescriptor> {
    match std::fs::read(path) {
        Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_default(),
        Err(_) => Vec::new(),
    }
}

pub fn save(path: &Path, descriptors: &[IndexDescriptor]) -> Result<(), DbError> {
    let bytes = serde_json::to_vec_pretty(descriptors).map_err(|e| DbError::Serialization(e.to_string()))?;
    std::fs::write(path, bytes).map_err(|e| DbError::IoError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn ordered_descriptor_round_trips_through_json() {
        let desc = IndexDescriptor { name: "age".into(), fields: vec!["age".into()], kind: DescKind::Ordered };
        let bytes = serde_json::to_vec(&[desc]).unwrap();
        let back: Vec<IndexDescriptor> = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].name, "age");
    }

    #[test]
    fn partial_descriptor_rebuilds_matching_predicate() {
        let desc = IndexDescriptor {
            name: "email_partial".into(),
            fields: vec!["email".into()],
            kind: DescKind::Partial { unique: false, filter: serde_json::json!({ "active": true }) },
        };
        let handle = build_handle(&desc).unwrap();
        handle
            .insert_document(&doc! { "active": true, "email": "a@b.com" }, "u1")
            .unwrap();
        handle
            .insert_document(&doc! { "active": false, "email": "c@d.com" }, "u2")
            .unwrap();
        assert_eq!(handle.count(), 1);
    }
}
