//! Unique index: an ordered index where a key may map to at most one live
//! document id.

use std::collections::BTreeMap;
use std::sync::Mutex;

use bson::Bson;

use crate::error::EngineError;
use crate::value::IndexKey;

pub struct UniqueIndex {
    inner: Mutex<BTreeMap<IndexKey, String>>,
}

impl UniqueIndex {
    pub fn new() -> Self {
        UniqueIndex {
            inner: Mutex::new(BTreeMap::new()),
        }
    }

    /// Fails with `Duplicate` if `key` already maps to a different id.
    pub fn insert(&self, key: Bson, id: &str) -> Result<(), EngineError> {
        let mut guard = self.inner.lock().unwrap();
        let ik = IndexKey(key);
        match guard.get(&ik) {
            Some(existing) if existing != id => {
                Err(EngineError::Duplicate(format!("{:?}", ik.0)))
            }
            _ => {
                guard.insert(ik, id.to_string());
                Ok(())
            }
        }
    }

    pub fn remove(&self, key: &Bson, id: &str) {
        let mut guard = self.inner.lock().unwrap();
        let ik = IndexKey(key.clone());
        if guard.get(&ik).map(|v| v == id).unwrap_or(false) {
            guard.remove(&ik);
        }
    }

    pub fn lookup_eq(&self, key: &Bson) -> Option<String> {
        self.inner.lock().unwrap().get(&IndexKey(key.clone())).cloned()
    }

    pub fn count(&self) -> u64 {
        self.inner.lock().unwrap().len() as u64
    }
}

impl Default for UniqueIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_lookup() {
        let idx = UniqueIndex::new();
        idx.insert(Bson::String("a@b.com".into()), "u1").unwrap();
        assert_eq!(idx.lookup_eq(&Bson::String("a@b.com".into())), Some("u1".to_string()));
    }

    #[test]
    fn duplicate_key_rejected() {
        let idx = UniqueIndex::new();
        idx.insert(Bson::String("a@b.com".into()), "u1").unwrap();
        let err = idx.insert(Bson::String("a@b.com".into()), "u2");
        assert!(matches!(err, Err(EngineError::Duplicate(_))));
    }

    #[test]
    fn reinserting_same_id_is_idempotent() {
        let idx = UniqueIndex::new();
        idx.insert(Bson::String("a@b.com".into()), "u1").unwrap();
        idx.insert(Bson::String("a@b.com".into()), "u1").unwrap();
        assert_eq!(idx.count(), 1);
    }

    #[test]
    fn remove_then_reinsert_with_different_id_succeeds() {
        let idx = UniqueIndex::new();
        idx.insert(Bson::String("a@b.com".into()), "u1").unwrap();
        idx.remove(&Bson::String("a@b.com".into()), "u1");
        idx.insert(Bson::String("a@b.com".into()), "u2").unwrap();
        assert_eq!(idx.lookup_eq(&Bson::String("a@b.com".into())), Some("u2".to_string()));
    }
}
