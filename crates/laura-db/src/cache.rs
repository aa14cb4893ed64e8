//! The query result cache — an LRU/TTL-bound map keyed by a fingerprint of
//! `(filter, options)`.
//!
//! Reuses `laura_pager::Lru`, the same capacity/TTL-bound primitive the
//! document store's hot set is built on. The fingerprint hashes a
//! canonical byte encoding of the filter document and find options with
//! an FNV-1a accumulator, matching the lock manager's hash choice for
//! consistency within the crate rather than pulling in a second hashing
//! crate.

use std::sync::Mutex;
use std::time::Duration;

use bson::Document;
use laura_pager::{Lru, LruStats};
use laura_query::FindOptions;

pub const DEFAULT_CAPACITY: usize = 1000;
pub const DEFAULT_TTL_SECS: u64 = 300;

/// Hashes `filter` and the find options into a single fingerprint.
/// Invalidation is whole-cache per collection, so the fingerprint only
/// needs to distinguish queries from each other, not support partial
/// invalidation.
pub fn fingerprint(filter: &Document, options: &FindOptions) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    hash_bytes(&mut hash, &bson::to_vec(filter).unwrap_or_default());
    if let Some(p) = &options.projection {
        hash_bytes(&mut hash, format!("{p:?}").as_bytes());
    }
    if let Some(s) = &options.sort {
        hash_bytes(&mut hash, format!("{s:?}").as_bytes());
    }
    hash_bytes(&mut hash, &options.skip.to_le_bytes());
    hash_bytes(&mut hash, &options.limit.unwrap_or(usize::MAX).to_le_bytes());
    hash
}

fn hash_bytes(hash: &mut u64, bytes: &[u8]) {
    for &b in bytes {
        *hash ^= b as u64;
        *hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
}

/// Per-collection query result cache. Every mutating operation on the
/// owning collection clears it wholesale, so its size is always zero
/// immediately after a mutation.
pub struct QueryCache {
    inner: Mutex<Lru<u64, Vec<Document>>>,
}

impl QueryCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        QueryCache { inner: Mutex::new(Lru::new(capacity, ttl)) }
    }

    pub fn get(&self, key: u64) -> Option<Vec<Document>> {
        self.inner.lock().unwrap().get(&key).cloned()
    }

    pub fn put(&self, key: u64, results: Vec<Document>) {
        self.inner.lock().unwrap().put(key, results);
    }

    pub fn clear(&self) {
        self.inner.lock().unwrap().clear();
    }

    pub fn stats(&self) -> LruStats {
        self.inner.lock().unwrap().stats()
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        QueryCache::new(DEFAULT_CAPACITY, Duration::from_secs(DEFAULT_TTL_SECS))
    }
}
