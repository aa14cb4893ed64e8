use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Capacity- and TTL-bound LRU cache, shared by the document store's hot
/// set and the query result cache.
pub struct Lru<K, V> {
    capacity: usize,
    ttl: Duration,
    entries: HashMap<K, Entry<V>>,
    // Ascending insertion/touch order; the front is the least recently used.
    order: Vec<K>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

struct Entry<V> {
    value: V,
    inserted_at: Instant,
}

pub struct LruStats {
    pub size: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl<K: Eq + Hash + Clone, V> Lru<K, V> {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Lru {
            capacity,
            ttl,
            entries: HashMap::new(),
            order: Vec::new(),
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    pub fn get(&mut self, key: &K) -> Option<&V> {
        let expired = match self.entries.get(key) {
            Some(e) => e.inserted_at.elapsed() >= self.ttl,
            None => {
                self.misses += 1;
                return None;
            }
        };
        if expired {
            self.remove(key);
            self.misses += 1;
            return None;
        }
        self.touch(key);
        self.hits += 1;
        self.entries.get(key).map(|e| &e.value)
    }

    pub fn put(&mut self, key: K, value: V) {
        if self.entries.contains_key(&key) {
            self.touch(&key);
        } else {
            self.order.push(key.clone());
        }
        self.entries.insert(
            key,
            Entry {
                value,
                inserted_at: Instant::now(),
            },
        );
        self.evict_overflow();
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }
        self.entries.remove(key).map(|e| e.value)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> LruStats {
        LruStats {
            size: self.entries.len(),
            capacity: self.capacity,
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
        }
    }

    fn touch(&mut self, key: &K) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            let k = self.order.remove(pos);
            self.order.push(k);
        }
    }

    fn evict_overflow(&mut self) {
        while self.entries.len() > self.capacity && !self.order.is_empty() {
            let oldest = self.order.remove(0);
            self.entries.remove(&oldest);
            self.evictions += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_put_get() {
        let mut cache: Lru<String, i32> = Lru::new(10, Duration::from_secs(60));
        cache.put("a".into(), 1);
        assert_eq!(cache.get(&"a".to_string()), Some(&1));
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn evicts_least_recently_used() {
        let mut cache: Lru<i32, i32> = Lru::new(2, Duration::from_secs(60));
        cache.put(1, 1);
        cache.put(2, 2);
        cache.get(&1); // 1 is now most-recent
        cache.put(3, 3); // evicts 2
        assert_eq!(cache.get(&2), None);
        assert_eq!(cache.get(&1), Some(&1));
        assert_eq!(cache.get(&3), Some(&3));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn ttl_expiry() {
        let mut cache: Lru<i32, i32> = Lru::new(10, Duration::from_millis(1));
        cache.put(1, 1);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get(&1), None);
    }

    #[test]
    fn clear_empties_cache() {
        let mut cache: Lru<i32, i32> = Lru::new(10, Duration::from_secs(60));
        cache.put(1, 1);
        cache.clear();
        assert_eq!(cache.len(), 0);
    }
}
