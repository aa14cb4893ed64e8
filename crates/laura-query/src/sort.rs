//! Sort specs and the combined `FindOptions` bundle (projection, sort,
//! skip, limit) a find operation carries.

use std::cmp::Ordering;

use bson::{Bson, Document};

use crate::error::QueryError;
use crate::projection::{parse_projection, Projection};
use crate::value::{compare_values, extract};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone)]
pub struct SortKey {
    pub field: String,
    pub direction: SortDirection,
}

/// An ordered list of sort keys, applied left to right with ties broken
/// by the next key.
#[derive(Debug, Clone, Default)]
pub struct Sort {
    keys: Vec<SortKey>,
}

impl Sort {
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn compare(&self, a: &Document, b: &Document) -> Ordering {
        for key in &self.keys {
            let av = extract(a, &key.field).cloned().unwrap_or(Bson::Null);
            let bv = extract(b, &key.field).cloned().unwrap_or(Bson::Null);
            let ord = compare_values(&av, &bv);
            let ord = match key.direction {
                SortDirection::Ascending => ord,
                SortDirection::Descending => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    /// Sorts `docs` in place according to this spec. A stable sort, so
    /// ties preserve the caller's original relative order.
    pub fn apply(&self, docs: &mut [Document]) {
        if self.keys.is_empty() {
            return;
        }
        docs.sort_by(|a, b| self.compare(a, b));
    }
}

/// Parses a sort document, e.g. `{"age": 1, "name": -1}`, into ordered
/// sort keys. Field iteration order in `doc` is preserved (insertion
/// order), giving primary/secondary key precedence.
pub fn parse_sort(doc: &Document) -> Result<Sort, QueryError> {
    let mut keys = Vec::with_capacity(doc.len());
    for (field, value) in doc {
        let direction = match value {
            Bson::Int32(1) | Bson::Int64(1) => SortDirection::Ascending,
            Bson::Int32(-1) | Bson::Int64(-1) => SortDirection::Descending,
            other => {
                return Err(QueryError::InvalidFilter(format!(
                    "sort direction for '{field}' must be 1 or -1, got {other:?}"
                )))
            }
        };
        keys.push(SortKey { field: field.clone(), direction });
    }
    Ok(Sort { keys })
}

/// The full set of options a find operation accepts beyond its filter.
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    pub projection: Option<Projection>,
    pub sort: Option<Sort>,
    pub skip: usize,
    pub limit: Option<usize>,
}

impl FindOptions {
    pub fn parse(
        projection: Option<&Document>,
        sort: Option<&Document>,
        skip: Option<i64>,
        limit: Option<i64>,
    ) -> Result<FindOptions, QueryError> {
        let projection = match projection {
            Some(doc) => Some(parse_projection(doc)?),
            None => None,
        };
        let sort = match sort {
            Some(doc) => Some(parse_sort(doc)?),
            None => None,
        };
        let skip = match skip {
            Some(n) if n >= 0 => n as usize,
            Some(n) => {
                return Err(QueryError::InvalidFilter(format!("skip must be non-negative, got {n}")))
            }
            None => 0,
        };
        let limit = match limit {
            Some(n) if n >= 0 => Some(n as usize),
            Some(n) => {
                return Err(QueryError::InvalidFilter(format!("limit must be non-negative, got {n}")))
            }
            None => None,
        };
        Ok(FindOptions { projection, sort, skip, limit })
    }
}
