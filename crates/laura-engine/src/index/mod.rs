//! The five index variants, plus `IndexHandle`, the enum a collection's
//! index set stores so the façade can dispatch generically by name
//! without matching on every variant at every call site.

pub mod ordered;
pub mod partial;
pub mod text;
pub mod ttl;
pub mod unique;

pub use ordered::OrderedIndex;
pub use partial::{PartialIndex, Predicate};
pub use text::{tokenize, TextIndex};
pub use ttl::TtlIndex;
pub use unique::UniqueIndex;

use bson::{Bson, Document};

use crate::codec::IndexKind;
use crate::error::EngineError;

/// A single named index, holding both its live structure and enough
/// metadata (fields, kind) to drive coherent maintenance on document
/// mutation as field values change.
pub enum IndexHandle {
    Ordered { fields: Vec<String>, index: OrderedIndex },
    Unique { fields: Vec<String>, index: UniqueIndex },
    Partial { fields: Vec<String>, index: PartialIndex },
    Ttl { field: String, index: TtlIndex },
    Text { index: TextIndex },
}

impl IndexHandle {
    pub fn kind(&self) -> IndexKind {
        match self {
            IndexHandle::Ordered { .. } => IndexKind::Ordered,
            IndexHandle::Unique { .. } => IndexKind::Unique,
            IndexHandle::Partial { .. } => IndexKind::Ordered,
            IndexHandle::Ttl { .. } => IndexKind::Ttl,
            IndexHandle::Text { .. } => IndexKind::Text,
        }
    }

    pub fn fields(&self) -> Vec<String> {
        match self {
            IndexHandle::Ordered { fields, .. } => fields.clone(),
            IndexHandle::Unique { fields, .. } => fields.clone(),
            IndexHandle::Partial { fields, .. } => fields.clone(),
            IndexHandle::Ttl { field, .. } => vec![field.clone()],
            IndexHandle::Text { index } => index.fields().to_vec(),
        }
    }

    pub fn count(&self) -> u64 {
        match self {
            IndexHandle::Ordered { index, .. } => index.count(),
            IndexHandle::Unique { index, .. } => index.count(),
            IndexHandle::Partial { index, .. } => index.count(),
            IndexHandle::Ttl { index, .. } => index.count(),
            IndexHandle::Text { index } => index.count(),
        }
    }

    /// Inserts `doc` (already known to have an indexed field) into this
    /// index under `id`. Single-field variants read their one field;
    /// the text variant reads all of its fields internally.
    pub fn insert_document(&self, doc: &Document, id: &str) -> Result<(), EngineError> {
        match self {
            IndexHandle::Ordered { fields, index } => {
                if let Some(v) = single_field_value(doc, fields) {
                    index.insert(v, id);
                }
                Ok(())
            }
            IndexHandle::Unique { fields, index } => {
                if let Some(v) = single_field_value(doc, fields) {
                    index.insert(v, id)?;
                }
                Ok(())
            }
            IndexHandle::Partial { fields, index } => {
                if let Some(v) = single_field_value(doc, fields) {
                    index.insert(doc, v, id)?;
                }
                Ok(())
            }
            IndexHandle::Ttl { field, index } => {
                if let Some(v) = crate::value::extract(doc, field) {
                    index.insert(v, id)?;
                }
                Ok(())
            }
            IndexHandle::Text { index } => {
                index.insert(id, doc);
                Ok(())
            }
        }
    }

    pub fn remove_document(&self, doc: &Document, id: &str) {
        match self {
            IndexHandle::Ordered { fields, index } => {
                if let Some(v) = single_field_value(doc, fields) {
                    index.remove(&v, id);
                }
            }
            IndexHandle::Unique { fields, index } => {
                if let Some(v) = single_field_value(doc, fields) {
                    index.remove(&v, id);
                }
            }
            IndexHandle::Partial { fields, index } => {
                if let Some(v) = single_field_value(doc, fields) {
                    index.remove(doc, &v, id);
                }
            }
            IndexHandle::Ttl { index, .. } => index.remove(id),
            IndexHandle::Text { index } => index.remove(id),
        }
    }

    /// Transitions this index's entries for `id` from `old_doc` to
    /// `new_doc`: computes old/new field values and, if they differ,
    /// removes the old entry and inserts the new one.
    pub fn transition_document(
        &self,
        old_doc: &Document,
        new_doc: &Document,
        id: &str,
    ) -> Result<(), EngineError> {
        match self {
            IndexHandle::Ordered { fields, index } => {
                let old_v = single_field_value(old_doc, fields);
                let new_v = single_field_value(new_doc, fields);
                if !values_match(&old_v, &new_v) {
                    if let Some(v) = &old_v {
                        index.remove(v, id);
                    }
                    if let Some(v) = new_v {
                        index.insert(v, id);
                    }
                }
                Ok(())
            }
            IndexHandle::Unique { fields, index } => {
                let old_v = single_field_value(old_doc, fields);
                let new_v = single_field_value(new_doc, fields);
                if !values_match(&old_v, &new_v) {
                    if let Some(v) = &old_v {
                        index.remove(v, id);
                    }
                    if let Some(v) = new_v {
                        index.insert(v, id)?;
                    }
                }
                Ok(())
            }
            IndexHandle::Partial { fields, index } => {
                let old_v = single_field_value(old_doc, fields).unwrap_or(Bson::Null);
                let new_v = single_field_value(new_doc, fields).unwrap_or(Bson::Null);
                index.transition(old_doc, new_doc, &old_v, new_v, id)
            }
            IndexHandle::Ttl { field, index } => {
                let old_v = crate::value::extract(old_doc, field);
                let new_v = crate::value::extract(new_doc, field);
                if !matches!((old_v, new_v), (Some(a), Some(b)) if crate::value::values_equal(a, b))
                {
                    index.remove(id);
                    if let Some(v) = new_v {
                        index.insert(v, id)?;
                    }
                }
                Ok(())
            }
            IndexHandle::Text { index } => {
                index.reindex(id, new_doc);
                Ok(())
            }
        }
    }
}

fn single_field_value(doc: &Document, fields: &[String]) -> Option<Bson> {
    let field = fields.first()?;
    crate::value::extract(doc, field).cloned()
}

fn values_match(a: &Option<Bson>, b: &Option<Bson>) -> bool {
    match (a, b) {
        (Some(x), Some(y)) => crate::value::values_equal(x, y),
        (None, None) => true,
        _ => false,
    }
}
