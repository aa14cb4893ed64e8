//! The document lock manager — a striped read/write lock table keyed
//! by document id, using fnv1a32 to pick a document's stripe.
//!
//! Reaches for `parking_lot`'s `Arc`-owning guards (`read_arc`/`write_arc`)
//! rather than hand-rolling self-referential guards over
//! `std::sync::RwLock` — the lock manager needs to hand a guard back to a
//! caller that outlives the stripe's own lookup, which owned guards solve
//! directly.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RawRwLock, RwLock};

pub type ReadGuard = parking_lot::ArcRwLockReadGuard<RawRwLock, ()>;
pub type WriteGuard = parking_lot::ArcRwLockWriteGuard<RawRwLock, ()>;

const DEFAULT_STRIPES: usize = 256;

fn fnv1a32(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for &b in bytes {
        hash ^= b as u32;
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

struct Stripe {
    locks: Mutex<HashMap<String, Arc<RwLock<()>>>>,
}

impl Stripe {
    fn new() -> Self {
        Stripe { locks: Mutex::new(HashMap::new()) }
    }

    /// Returns the per-id lock, creating it on demand. The stripe guard
    /// (the inner mutex) is released before the caller takes the rwlock
    /// itself.
    fn handle(&self, id: &str) -> Arc<RwLock<()>> {
        let mut guard = self.locks.lock();
        guard.entry(id.to_string()).or_insert_with(|| Arc::new(RwLock::new(()))).clone()
    }

    fn clear(&self) {
        self.locks.lock().clear();
    }
}

/// Striped RW-lock table over document ids. An id's stripe is
/// `fnv1a32(id) mod num_stripes`.
pub struct LockManager {
    stripes: Vec<Stripe>,
}

impl LockManager {
    pub fn new(num_stripes: usize) -> Self {
        let num_stripes = num_stripes.max(1);
        let stripes = (0..num_stripes).map(|_| Stripe::new()).collect();
        LockManager { stripes }
    }

    fn stripe_for(&self, id: &str) -> &Stripe {
        let idx = fnv1a32(id.as_bytes()) as usize % self.stripes.len();
        &self.stripes[idx]
    }

    pub fn read(&self, id: &str) -> ReadGuard {
        let handle = self.stripe_for(id).handle(id);
        handle.read_arc()
    }

    pub fn write(&self, id: &str) -> WriteGuard {
        let handle = self.stripe_for(id).handle(id);
        handle.write_arc()
    }

    /// Acquires write locks on every id in `ids`, sorted ascending by byte
    /// order first. This never deadlocks against another caller using this
    /// same entry point, no matter the interleaving, since every caller
    /// acquires in the same total order.
    pub fn lock_multiple(&self, ids: &[String]) -> Vec<WriteGuard> {
        let mut sorted: Vec<&String> = ids.iter().collect();
        sorted.sort();
        sorted.into_iter().map(|id| self.write(id)).collect()
    }

    /// Resets every stripe's lock map to empty. Callers must only invoke
    /// this when no per-id lock is held; any lock acquired after this call
    /// is recreated fresh on demand.
    pub fn cleanup(&self) {
        for stripe in &self.stripes {
            stripe.clear();
        }
    }
}

impl Default for LockManager {
    fn default() -> Self {
        LockManager::new(DEFAULT_STRIPES)
    }
}
