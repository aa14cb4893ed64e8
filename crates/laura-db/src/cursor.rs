//! Server-side cursors — a batched, timed-out handle over a materialized
//! result list.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use bson::Document;
use uuid::Uuid;

use crate::error::DbError;

pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const DEFAULT_TIMEOUT_SECS: u64 = 600;

/// State machine: Open -> Exhausted | Closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CursorState {
    Open,
    Exhausted,
    Closed,
}

/// A single server-side cursor over a materialized result list.
pub struct Cursor {
    id: String,
    results: Vec<Document>,
    position: usize,
    batch_size: usize,
    timeout: Duration,
    state: CursorState,
    last_access: Instant,
}

impl Cursor {
    fn new(results: Vec<Document>, batch_size: usize, timeout: Duration) -> Self {
        Cursor {
            id: format!("{:032x}", Uuid::new_v4().as_u128()),
            results,
            position: 0,
            batch_size,
            timeout,
            state: CursorState::Open,
            last_access: Instant::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn count(&self) -> usize {
        self.results.len()
    }

    pub fn remaining(&self) -> usize {
        self.results.len() - self.position
    }

    pub fn has_next(&self) -> bool {
        self.state == CursorState::Open && self.position < self.results.len()
    }

    pub fn is_exhausted(&self) -> bool {
        self.state == CursorState::Exhausted
    }

    pub fn is_closed(&self) -> bool {
        self.state == CursorState::Closed
    }

    /// Returns the single next document, advancing position by one. Fails
    /// if the cursor is not `Open`.
    pub fn next(&mut self) -> Result<Option<Document>, DbError> {
        if self.state != CursorState::Open {
            return Err(DbError::InvalidArgument("cursor is not open".into()));
        }
        if self.position >= self.results.len() {
            self.state = CursorState::Exhausted;
            return Ok(None);
        }
        let doc = self.results[self.position].clone();
        self.position += 1;
        if self.position >= self.results.len() {
            self.state = CursorState::Exhausted;
        }
        Ok(doc.into())
    }

    /// Returns at most `batch_size` documents and advances the position.
    /// Past the end, returns empty and sets the cursor exhausted; in
    /// `Exhausted`/`Closed` it also returns empty, without erroring.
    pub fn next_batch(&mut self) -> Vec<Document> {
        if self.state != CursorState::Open {
            return Vec::new();
        }
        let end = (self.position + self.batch_size).min(self.results.len());
        let batch = self.results[self.position..end].to_vec();
        self.position = end;
        if self.position >= self.results.len() {
            self.state = CursorState::Exhausted;
        }
        batch
    }

    pub fn close(&mut self) {
        self.state = CursorState::Closed;
    }

    fn touch(&mut self) {
        self.last_access = Instant::now();
    }

    fn timed_out(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_access) >= self.timeout
    }
}

/// Manages every open cursor for a database. Safe under concurrent
/// creation/close; a background worker periodically calls
/// `cleanup_timed_out`.
pub struct CursorManager {
    default_batch_size: usize,
    default_timeout: Duration,
    cursors: Mutex<HashMap<String, Cursor>>,
}

impl CursorManager {
    pub fn new(default_batch_size: usize, default_timeout: Duration) -> Self {
        CursorManager {
            default_batch_size,
            default_timeout,
            cursors: Mutex::new(HashMap::new()),
        }
    }

    pub fn create(&self, results: Vec<Document>) -> String {
        self.create_with(results, self.default_batch_size, self.default_timeout)
    }

    pub fn create_with(&self, results: Vec<Document>, batch_size: usize, timeout: Duration) -> String {
        let cursor = Cursor::new(results, batch_size, timeout);
        let id = cursor.id.clone();
        self.cursors.lock().unwrap().insert(id.clone(), cursor);
        id
    }

    /// Runs `f` against the cursor for `id`, refreshing its last-access
    /// instant first. Fails with `NotFound` if missing or already timed
    /// out (and evicts it in that case).
    pub fn with_cursor<R>(&self, id: &str, f: impl FnOnce(&mut Cursor) -> R) -> Result<R, DbError> {
        let mut guard = self.cursors.lock().unwrap();
        let now = Instant::now();
        let timed_out = guard.get(id).map(|c| c.timed_out(now)).unwrap_or(false);
        if timed_out {
            guard.remove(id);
        }
        let cursor = guard
            .get_mut(id)
            .ok_or_else(|| DbError::NotFound(format!("cursor {id}")))?;
        cursor.touch();
        Ok(f(cursor))
    }

    pub fn close(&self, id: &str) -> Result<(), DbError> {
        let mut guard = self.cursors.lock().unwrap();
        match guard.get_mut(id) {
            Some(cursor) => {
                cursor.close();
                Ok(())
            }
            None => Err(DbError::NotFound(format!("cursor {id}"))),
        }
    }

    /// Evicts every cursor whose `now - last_access >= timeout`.
    pub fn cleanup_timed_out(&self) -> usize {
        let mut guard = self.cursors.lock().unwrap();
        let now = Instant::now();
        let before = guard.len();
        guard.retain(|_, c| !c.timed_out(now));
        before - guard.len()
    }

    pub fn active_count(&self) -> usize {
        self.cursors.lock().unwrap().len()
    }
}

impl Default for CursorManager {
    fn default() -> Self {
        CursorManager::new(DEFAULT_BATCH_SIZE, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }
}
