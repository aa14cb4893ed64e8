//! Ordered index: a sorted container keyed by the total order over `Bson`
//! values. Backs both the plain ordered variant and, via
//! composition, the unique/partial/TTL variants.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Mutex;

use bson::Bson;

use crate::value::{compare_values, IndexKey};

/// A single field value paired with the document id it belongs to,
/// ordered first by value then by id, so a `BTreeSet`-like multimap can be
/// built atop a plain `BTreeMap<IndexKey, Vec<String>>`.
pub struct OrderedIndex {
    inner: Mutex<BTreeMap<IndexKey, Vec<String>>>,
}

impl OrderedIndex {
    pub fn new() -> Self {
        OrderedIndex {
            inner: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn insert(&self, key: Bson, id: &str) {
        let mut guard = self.inner.lock().unwrap();
        let entry = guard.entry(IndexKey(key)).or_default();
        if !entry.iter().any(|existing| existing == id) {
            entry.push(id.to_string());
        }
    }

    pub fn remove(&self, key: &Bson, id: &str) {
        let mut guard = self.inner.lock().unwrap();
        let ik = IndexKey(key.clone());
        let mut drop_key = false;
        if let Some(ids) = guard.get_mut(&ik) {
            ids.retain(|existing| existing != id);
            drop_key = ids.is_empty();
        }
        if drop_key {
            guard.remove(&ik);
        }
    }

    pub fn lookup_eq(&self, key: &Bson) -> Vec<String> {
        let guard = self.inner.lock().unwrap();
        guard
            .get(&IndexKey(key.clone()))
            .cloned()
            .unwrap_or_default()
    }

    /// Range scan between `lo` and `hi` bounds (either may be `Unbounded`).
    pub fn range(&self, lo: Bound<Bson>, hi: Bound<Bson>) -> Vec<String> {
        let guard = self.inner.lock().unwrap();
        let lo = map_bound(lo);
        let hi = map_bound(hi);
        guard
            .range((lo, hi))
            .flat_map(|(_, ids)| ids.iter().cloned())
            .collect()
    }

    pub fn count(&self) -> u64 {
        self.inner
            .lock()
            .unwrap()
            .values()
            .map(|ids| ids.len() as u64)
            .sum()
    }

    /// Whether any key in the index currently satisfies `key == value`
    /// under the index's total order (used by the partial-index transition
    /// logic in `partial.rs` for lookups without cloning the whole map).
    pub fn contains_value(&self, value: &Bson) -> bool {
        let guard = self.inner.lock().unwrap();
        guard.contains_key(&IndexKey(value.clone()))
    }
}

impl Default for OrderedIndex {
    fn default() -> Self {
        Self::new()
    }
}

fn map_bound(b: Bound<Bson>) -> Bound<IndexKey> {
    match b {
        Bound::Included(v) => Bound::Included(IndexKey(v)),
        Bound::Excluded(v) => Bound::Excluded(IndexKey(v)),
        Bound::Unbounded => Bound::Unbounded,
    }
}

/// Compares two raw `Bson` values using the index's total order; exposed
/// for callers (planner, partial/TTL wrappers) that need it without going
/// through an `IndexKey`.
pub fn cmp(a: &Bson, b: &Bson) -> std::cmp::Ordering {
    compare_values(a, b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_lookup_eq() {
        let idx = OrderedIndex::new();
        idx.insert(Bson::Int32(5), "a");
        idx.insert(Bson::Int32(5), "b");
        let mut ids = idx.lookup_eq(&Bson::Int32(5));
        ids.sort();
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn remove_drops_empty_key() {
        let idx = OrderedIndex::new();
        idx.insert(Bson::Int32(5), "a");
        idx.remove(&Bson::Int32(5), "a");
        assert_eq!(idx.lookup_eq(&Bson::Int32(5)), Vec::<String>::new());
        assert_eq!(idx.count(), 0);
    }

    #[test]
    fn range_scan_inclusive() {
        let idx = OrderedIndex::new();
        for n in 0..10 {
            idx.insert(Bson::Int32(n), &format!("doc{n}"));
        }
        let ids = idx.range(Bound::Included(Bson::Int32(3)), Bound::Included(Bson::Int32(5)));
        assert_eq!(ids.len(), 3);
    }

    #[test]
    fn range_scan_exclusive() {
        let idx = OrderedIndex::new();
        for n in 0..5 {
            idx.insert(Bson::Int32(n), &format!("doc{n}"));
        }
        let ids = idx.range(Bound::Excluded(Bson::Int32(1)), Bound::Excluded(Bson::Int32(4)));
        assert_eq!(ids.len(), 2);
    }

    #[test]
    fn count_sums_all_keys() {
        let idx = OrderedIndex::new();
        idx.insert(Bson::Int32(1), "a");
        idx.insert(Bson::Int32(2), "b");
        idx.insert(Bson::Int32(2), "c");
        assert_eq!(idx.count(), 3);
    }
}
