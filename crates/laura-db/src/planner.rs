//! Given a parsed filter, choose an index to produce a candidate id set,
//! or fall back to a full scan.
//!
//! Index availability only — no cost estimation. The first indexable
//! field with a usable index wins; every other predicate in the filter is
//! applied as a post-filter over the candidates.

use std::ops::Bound;

use bson::Bson;
use laura_engine::IndexHandle;
use laura_query::{Filter, IndexableConstraint};

/// An index this collection's planner can consult, paired with its name.
pub struct IndexRef<'a> {
    pub name: &'a str,
    pub handle: &'a IndexHandle,
}

fn lookup_eq(handle: &IndexHandle, key: &Bson) -> Option<Vec<String>> {
    match handle {
        IndexHandle::Ordered { index, .. } => Some(index.lookup_eq(key)),
        IndexHandle::Unique { index, .. } => Some(index.lookup_eq(key).into_iter().collect()),
        IndexHandle::Partial { index, .. } => Some(index.lookup_eq(key)),
        IndexHandle::Ttl { .. } | IndexHandle::Text { .. } => None,
    }
}

fn range(handle: &IndexHandle, lo: Bound<Bson>, hi: Bound<Bson>) -> Option<Vec<String>> {
    match handle {
        IndexHandle::Ordered { index, .. } => Some(index.range(lo, hi)),
        _ => None,
    }
}

fn first_field(handle: &IndexHandle) -> Option<String> {
    handle.fields().into_iter().next()
}

/// Attempts to satisfy `filter` from one of `indexes`. Returns the
/// candidate id set and the name of the index used, or `None` if no
/// applicable index exists (caller should fall back to a full scan).
pub fn candidate_ids(filter: &Filter, indexes: &[IndexRef<'_>]) -> Option<(Vec<String>, &'static str)> {
    let constraints = filter.indexable_fields();
    let mut seen_fields: Vec<&str> = Vec::new();
    for (field, _) in &constraints {
        if !seen_fields.contains(field) {
            seen_fields.push(field);
        }
    }

    for field in seen_fields {
        let field_constraints: Vec<&IndexableConstraint<'_>> =
            constraints.iter().filter(|(f, _)| *f == field).map(|(_, c)| c).collect();

        let eq_value = field_constraints
            .iter()
            .find_map(|c| if let IndexableConstraint::Eq(v) = c { Some(*v) } else { None });

        if let Some(value) = eq_value {
            for idx in indexes {
                if first_field(idx.handle).as_deref() == Some(field) {
                    if let Some(ids) = lookup_eq(idx.handle, value) {
                        return Some((ids, "eq"));
                    }
                }
            }
            continue;
        }

        let mut lo = Bound::Unbounded;
        let mut hi = Bound::Unbounded;
        let mut has_range = false;
        for c in &field_constraints {
            match c {
                IndexableConstraint::Gt(v) => {
                    lo = Bound::Excluded((*v).clone());
                    has_range = true;
                }
                IndexableConstraint::Gte(v) => {
                    lo = Bound::Included((*v).clone());
                    has_range = true;
                }
                IndexableConstraint::Lt(v) => {
                    hi = Bound::Excluded((*v).clone());
                    has_range = true;
                }
                IndexableConstraint::Lte(v) => {
                    hi = Bound::Included((*v).clone());
                    has_range = true;
                }
                IndexableConstraint::Eq(_) => {}
            }
        }
        if has_range {
            for idx in indexes {
                if first_field(idx.handle).as_deref() == Some(field) {
                    if let Some(ids) = range(idx.handle, lo.clone(), hi.clone()) {
                        return Some((ids, "range"));
                    }
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use laura_engine::OrderedIndex;
    use laura_query::parse_filter;

    #[test]
    fn eq_filter_uses_matching_index() {
        let idx = OrderedIndex::new();
        idx.insert(Bson::String("active".into()), "u1");
        let handle = IndexHandle::Ordered { fields: vec!["status".into()], index: idx };
        let refs = vec![IndexRef { name: "status", handle: &handle }];
        let filter = parse_filter(&doc! { "status": "active" }).unwrap();
        let (ids, kind) = candidate_ids(&filter, &refs).unwrap();
        assert_eq!(ids, vec!["u1".to_string()]);
        assert_eq!(kind, "eq");
    }

    #[test]
    fn range_filter_uses_matching_ordered_index() {
        let idx = OrderedIndex::new();
        for n in 0..10 {
            idx.insert(Bson::Int32(n), &format!("d{n}"));
        }
        let handle = IndexHandle::Ordered { fields: vec!["age".into()], index: idx };
        let refs = vec![IndexRef { name: "age", handle: &handle }];
        let filter = parse_filter(&doc! { "age": { "$gte": 3, "$lte": 5 } }).unwrap();
        let (ids, kind) = candidate_ids(&filter, &refs).unwrap();
        assert_eq!(ids.len(), 3);
        assert_eq!(kind, "range");
    }

    #[test]
    fn no_matching_index_returns_none() {
        let filter = parse_filter(&doc! { "age": 30 }).unwrap();
        assert!(candidate_ids(&filter, &[]).is_none());
    }
}
