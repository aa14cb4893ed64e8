//! Partial index: an ordered or unique index gated by a filter predicate
//! evaluated against the full document.
//!
//! Filter evaluation itself belongs to the query layer built on top of
//! this crate, so the predicate here is a plain closure rather than a
//! parsed filter document — the façade compiles a filter into one of
//! these when `CreatePartialIndex` runs.

use bson::{Bson, Document};

use crate::error::EngineError;
use crate::index::ordered::OrderedIndex;
use crate::index::unique::UniqueIndex;

pub type Predicate = Box<dyn Fn(&Document) -> bool + Send + Sync>;

enum Inner {
    Ordered(OrderedIndex),
    Unique(UniqueIndex),
}

pub struct PartialIndex {
    inner: Inner,
    filter: Predicate,
}

impl PartialIndex {
    pub fn new_ordered(filter: Predicate) -> Self {
        PartialIndex {
            inner: Inner::Ordered(OrderedIndex::new()),
            filter,
        }
    }

    pub fn new_unique(filter: Predicate) -> Self {
        PartialIndex {
            inner: Inner::Unique(UniqueIndex::new()),
            filter,
        }
    }

    pub fn matches(&self, doc: &Document) -> bool {
        (self.filter)(doc)
    }

    /// Inserts only if `doc` matches the partial filter. No-ops otherwise.
    pub fn insert(&self, doc: &Document, key: Bson, id: &str) -> Result<(), EngineError> {
        if !self.matches(doc) {
            return Ok(());
        }
        self.raw_insert(key, id)
    }

    pub fn remove(&self, doc: &Document, key: &Bson, id: &str) {
        if self.matches(doc) {
            self.raw_remove(key, id);
        }
    }

    /// Transitions an entry across an update: computes old/new membership
    /// and performs one of (no-op, insert, remove, remove+insert).
    pub fn transition(
        &self,
        old_doc: &Document,
        new_doc: &Document,
        old_key: &Bson,
        new_key: Bson,
        id: &str,
    ) -> Result<(), EngineError> {
        let was_member = self.matches(old_doc);
        let is_member = self.matches(new_doc);
        match (was_member, is_member) {
            (false, false) => Ok(()),
            (true, false) => {
                self.raw_remove(old_key, id);
                Ok(())
            }
            (false, true) => self.raw_insert(new_key, id),
            (true, true) => {
                self.raw_remove(old_key, id);
                self.raw_insert(new_key, id)
            }
        }
    }

    pub fn lookup_eq(&self, key: &Bson) -> Vec<String> {
        match &self.inner {
            Inner::Ordered(o) => o.lookup_eq(key),
            Inner::Unique(u) => u.lookup_eq(key).into_iter().collect(),
        }
    }

    pub fn count(&self) -> u64 {
        match &self.inner {
            Inner::Ordered(o) => o.count(),
            Inner::Unique(u) => u.count(),
        }
    }

    fn raw_insert(&self, key: Bson, id: &str) -> Result<(), EngineError> {
        match &self.inner {
            Inner::Ordered(o) => {
                o.insert(key, id);
                Ok(())
            }
            Inner::Unique(u) => u.insert(key, id),
        }
    }

    fn raw_remove(&self, key: &Bson, id: &str) {
        match &self.inner {
            Inner::Ordered(o) => o.remove(key, id),
            Inner::Unique(u) => u.remove(key, id),
        }
    }
}
