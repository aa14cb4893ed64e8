//! TTL index: a time-keyed ordered index supporting expiry sweeps
//!. Accepts three encodings for the indexed field: a native
//! `DateTime`, an RFC 3339 string, or an integer count of seconds since
//! the epoch.

use std::collections::BTreeMap;
use std::sync::Mutex;

use bson::Bson;

use crate::error::EngineError;

struct TtlState {
    // millis since epoch -> ids expiring at that instant
    by_time: BTreeMap<i64, Vec<String>>,
    // id -> millis, so remove() doesn't need the original key recomputed
    by_id: std::collections::HashMap<String, i64>,
}

pub struct TtlIndex {
    ttl_seconds: u64,
    state: Mutex<TtlState>,
}

impl TtlIndex {
    pub fn new(ttl_seconds: u64) -> Self {
        TtlIndex {
            ttl_seconds,
            state: Mutex::new(TtlState {
                by_time: BTreeMap::new(),
                by_id: std::collections::HashMap::new(),
            }),
        }
    }

    pub fn ttl_seconds(&self) -> u64 {
        self.ttl_seconds
    }

    pub fn insert(&self, key: &Bson, id: &str) -> Result<(), EngineError> {
        let millis = decode_timestamp(key)?;
        let mut guard = self.state.lock().unwrap();
        guard.by_time.entry(millis).or_default().push(id.to_string());
        guard.by_id.insert(id.to_string(), millis);
        Ok(())
    }

    pub fn remove(&self, id: &str) {
        let mut guard = self.state.lock().unwrap();
        if let Some(millis) = guard.by_id.remove(id) {
            let mut drop_key = false;
            if let Some(ids) = guard.by_time.get_mut(&millis) {
                ids.retain(|existing| existing != id);
                drop_key = ids.is_empty();
            }
            if drop_key {
                guard.by_time.remove(&millis);
            }
        }
    }

    /// Returns every id whose `stored_timestamp + ttl_seconds <= now`.
    pub fn get_expired(&self, now_millis: i64) -> Vec<String> {
        let guard = self.state.lock().unwrap();
        let cutoff = now_millis - (self.ttl_seconds as i64 * 1000);
        guard
            .by_time
            .range(..=cutoff)
            .flat_map(|(_, ids)| ids.iter().cloned())
            .collect()
    }

    pub fn count(&self) -> u64 {
        self.state.lock().unwrap().by_id.len() as u64
    }
}

fn decode_timestamp(value: &Bson) -> Result<i64, EngineError> {
    match value {
        Bson::DateTime(dt) => Ok(dt.timestamp_millis()),
        Bson::String(s) => bson::DateTime::parse_rfc3339_str(s)
            .map(|dt| dt.timestamp_millis())
            .map_err(|e| EngineError::InvalidArgument(format!("bad RFC3339 timestamp: {e}"))),
        Bson::Int32(secs) => Ok(*secs as i64 * 1000),
        Bson::Int64(secs) => Ok(secs * 1000),
        Bson::Double(secs) => Ok((*secs * 1000.0) as i64),
        other => Err(EngineError::InvalidArgument(format!(
            "unsupported TTL field encoding: {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expired_entries_found_after_ttl_elapses() {
        let idx = TtlIndex::new(60);
        idx.insert(&Bson::Int64(1_000), "doc1").unwrap();
        let not_yet = idx.get_expired(1_000 * 1000 + 59_000);
        assert!(not_yet.is_empty());
        let expired = idx.get_expired(1_000 * 1000 + 60_000);
        assert_eq!(expired, vec!["doc1".to_string()]);
    }

    #[test]
    fn accepts_seconds_since_epoch_encoding() {
        let idx = TtlIndex::new(10);
        idx.insert(&Bson::Int32(100), "a").unwrap();
        assert_eq!(idx.count(), 1);
    }

    #[test]
    fn accepts_native_datetime_encoding() {
        let idx = TtlIndex::new(10);
        let dt = bson::DateTime::from_millis(5_000);
        idx.insert(&Bson::DateTime(dt), "a").unwrap();
        assert_eq!(idx.get_expired(16_000), vec!["a".to_string()]);
    }

    #[test]
    fn accepts_rfc3339_string_encoding() {
        let idx = TtlIndex::new(0);
        idx.insert(&Bson::String("1970-01-01T00:00:05Z".into()), "a").unwrap();
        assert_eq!(idx.get_expired(5_000), vec!["a".to_string()]);
    }

    #[test]
    fn remove_drops_from_expiry_set() {
        let idx = TtlIndex::new(0);
        idx.insert(&Bson::Int64(1), "a").unwrap();
        idx.remove("a");
        assert_eq!(idx.get_expired(i64::MAX), Vec::<String>::new());
        assert_eq!(idx.count(), 0);
    }

    #[test]
    fn rejects_unsupported_encoding() {
        let idx = TtlIndex::new(0);
        assert!(idx.insert(&Bson::Boolean(true), "a").is_err());
    }
}
