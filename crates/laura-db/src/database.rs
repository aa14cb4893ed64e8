//! The database entry point: opens the on-disk layout, owns the catalog
//! and the live collection set, and runs a background maintenance thread
//! for TTL cleanup and cursor reaping.
//!
//! The maintenance thread uses an `AtomicBool` shutdown flag plus a
//! `Condvar` wait, running two independent jobs (cursor reaping,
//! per-collection TTL cleanup) back to back on the same tick, and logging
//! recoverable failures with `log` instead of silently continuing past
//! them.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bson::Document;
use laura_engine::{Catalog, CatalogEntry, DocumentStore};
use laura_pager::Pager;
use laura_query::FindOptions;

use crate::collection::{BulkOp, BulkWriteResult, Collection};
use crate::cursor::CursorManager;
use crate::error::DbError;
use crate::pool::{PoolStats, WorkerPool};

/// Tunables for a `Database::open` call. Defaults mirror the
/// per-component defaults each collaborator already picks for itself
/// (`QueryCache`, `CursorManager`, `WorkerPool`).
#[derive(Debug, Clone)]
pub struct Config {
    pub root_dir: PathBuf,
    pub lock_stripes: usize,
    pub cache_capacity: usize,
    pub cache_ttl: Duration,
    pub cursor_batch_size: usize,
    pub cursor_timeout: Duration,
    pub pool_workers: usize,
    pub pool_queue_size: usize,
    /// How often the background thread sweeps for expired documents and
    /// timed-out cursors. `Duration::ZERO` disables the thread entirely.
    pub maintenance_interval: Duration,
}

impl Config {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Config {
            root_dir: root_dir.into(),
            lock_stripes: 256,
            cache_capacity: crate::cache::DEFAULT_CAPACITY,
            cache_ttl: Duration::from_secs(crate::cache::DEFAULT_TTL_SECS),
            cursor_batch_size: crate::cursor::DEFAULT_BATCH_SIZE,
            cursor_timeout: Duration::from_secs(crate::cursor::DEFAULT_TIMEOUT_SECS),
            pool_workers: crate::pool::DEFAULT_NUM_WORKERS,
            pool_queue_size: crate::pool::DEFAULT_QUEUE_SIZE,
            maintenance_interval: Duration::from_secs(30),
        }
    }
}

struct Inner {
    config: Config,
    catalog: Catalog,
    collections: Arc<RwLock<HashMap<String, Arc<Collection>>>>,
}

/// The database. Owns the catalog, lazily opens collections on first
/// reference, and runs background maintenance.
pub struct Database {
    inner: Arc<Inner>,
    cursors: Arc<CursorManager>,
    pool: WorkerPool,
    maintenance: Mutex<Option<MaintenanceHandle>>,
}

impl Database {
    pub fn open(config: Config) -> Result<Self, DbError> {
        std::fs::create_dir_all(&config.root_dir).map_err(|e| DbError::IoError(e.to_string()))?;
        let catalog_pager = Arc::new(Pager::open(&config.root_dir.join("catalog.laur"))?);
        let catalog = Catalog::open(catalog_pager)?;
        let collections = Arc::new(RwLock::new(HashMap::new()));
        let cursors = Arc::new(CursorManager::new(config.cursor_batch_size, config.cursor_timeout));
        let pool = WorkerPool::new(config.pool_workers, config.pool_queue_size);
        let maintenance = spawn_maintenance(collections.clone(), cursors.clone(), config.maintenance_interval);

        Ok(Database {
            inner: Arc::new(Inner { config, catalog, collections }),
            cursors,
            pool,
            maintenance: Mutex::new(maintenance),
        })
    }

    /// Returns the named collection, registering and opening it on first
    /// reference — collections are created implicitly.
    pub fn collection(&self, name: &str) -> Result<Arc<Collection>, DbError> {
        if let Some(c) = self.inner.collections.read().unwrap().get(name) {
            return Ok(c.clone());
        }
        let mut guard = self.inner.collections.write().unwrap();
        if let Some(c) = guard.get(name) {
            return Ok(c.clone());
        }
        let entry = match self.inner.catalog.get(name) {
            Some(e) => e,
            None => {
                let collection_id = self.inner.catalog.register(name, false)?;
                CatalogEntry {
                    collection_id,
                    name: name.to_string(),
                    metadata_page: 0,
                    active: true,
                    system: false,
                }
            }
        };
        let opened = Arc::new(self.open_collection(&entry)?);
        guard.insert(name.to_string(), opened.clone());
        Ok(opened)
    }

    fn open_collection(&self, entry: &CatalogEntry) -> Result<Collection, DbError> {
        let data_path = self.inner.config.root_dir.join(format!("{}.data", entry.name));
        let pager = Arc::new(Pager::open(&data_path)?);
        let page_ids: Vec<u32> = (1..pager.page_count()).collect();
        let store = DocumentStore::reopen(pager, &page_ids)?;
        let index_path = self.inner.config.root_dir.join(format!("{}.indexes.json", entry.name));
        Collection::open(
            entry.collection_id,
            entry.name.clone(),
            store,
            Some(index_path),
            self.inner.config.lock_stripes,
            self.inner.config.cache_capacity,
            self.inner.config.cache_ttl,
        )
    }

    pub fn list_collections(&self) -> Vec<String> {
        self.inner.catalog.list().into_iter().map(|e| e.name).collect()
    }

    pub fn drop_collection(&self, name: &str) -> Result<(), DbError> {
        self.inner.catalog.drop_collection(name)?;
        self.inner.collections.write().unwrap().remove(name);
        Ok(())
    }

    // ── CRUD, delegated to the named collection ────────────────────

    pub fn insert_one(&self, collection: &str, doc: Document) -> Result<String, DbError> {
        self.collection(collection)?.insert_one(doc)
    }

    pub fn find_one(&self, collection: &str, filter: &Document) -> Result<Option<Document>, DbError> {
        self.collection(collection)?.find_one(filter)
    }

    pub fn find(&self, collection: &str, filter: &Document, options: &FindOptions) -> Result<Vec<Document>, DbError> {
        self.collection(collection)?.find(filter, options)
    }

    pub fn update_one(&self, collection: &str, filter: &Document, update: &Document) -> Result<bool, DbError> {
        self.collection(collection)?.update_one(filter, update)
    }

    pub fn update_many(&self, collection: &str, filter: &Document, update: &Document) -> Result<u64, DbError> {
        self.collection(collection)?.update_many(filter, update)
    }

    pub fn delete_one(&self, collection: &str, filter: &Document) -> Result<bool, DbError> {
        self.collection(collection)?.delete_one(filter)
    }

    pub fn delete_many(&self, collection: &str, filter: &Document) -> Result<u64, DbError> {
        self.collection(collection)?.delete_many(filter)
    }

    pub fn bulk_write(&self, collection: &str, ops: Vec<BulkOp>, ordered: bool) -> Result<BulkWriteResult, DbError> {
        Ok(self.collection(collection)?.bulk_write(ops, ordered))
    }

    pub fn aggregate(&self, collection: &str, pipeline: &[Document]) -> Result<Vec<Document>, DbError> {
        self.collection(collection)?.aggregate(pipeline)
    }

    pub fn text_search(&self, collection: &str, query: &str) -> Result<Vec<Document>, DbError> {
        self.collection(collection)?.text_search(query)
    }

    // ── Index management ────────────────────────────────────────────

    pub fn create_index(&self, collection: &str, field: &str, unique: bool) -> Result<String, DbError> {
        self.collection(collection)?.create_index(field, unique)
    }

    pub fn create_ttl_index(&self, collection: &str, field: &str, ttl_seconds: u64) -> Result<String, DbError> {
        self.collection(collection)?.create_ttl_index(field, ttl_seconds)
    }

    pub fn create_partial_index(
        &self,
        collection: &str,
        field: &str,
        filter: &Document,
        unique: bool,
    ) -> Result<String, DbError> {
        self.collection(collection)?.create_partial_index(field, filter, unique)
    }

    pub fn create_text_index(&self, collection: &str, fields: Vec<String>) -> Result<String, DbError> {
        self.collection(collection)?.create_text_index(fields)
    }

    pub fn drop_index(&self, collection: &str, name: &str) -> Result<(), DbError> {
        self.collection(collection)?.drop_index(name)
    }

    pub fn list_indexes(&self, collection: &str) -> Result<Vec<String>, DbError> {
        Ok(self.collection(collection)?.list_indexes())
    }

    // ── Cursors ──────────────────────────────────────────────────────

    pub fn find_cursor(&self, collection: &str, filter: &Document, options: &FindOptions) -> Result<String, DbError> {
        let docs = self.collection(collection)?.find(filter, options)?;
        Ok(self.cursors.create(docs))
    }

    pub fn find_cursor_with(
        &self,
        collection: &str,
        filter: &Document,
        options: &FindOptions,
        batch_size: usize,
        timeout: Duration,
    ) -> Result<String, DbError> {
        let docs = self.collection(collection)?.find(filter, options)?;
        Ok(self.cursors.create_with(docs, batch_size, timeout))
    }

    pub fn cursor_next(&self, cursor_id: &str) -> Result<Option<Document>, DbError> {
        self.cursors.with_cursor(cursor_id, |c| c.next())?
    }

    pub fn cursor_next_batch(&self, cursor_id: &str) -> Result<Vec<Document>, DbError> {
        self.cursors.with_cursor(cursor_id, |c| c.next_batch())
    }

    pub fn cursor_close(&self, cursor_id: &str) -> Result<(), DbError> {
        self.cursors.close(cursor_id)
    }

    // ── Background work ─────────────────────────────────────────────

    /// Submits an arbitrary task to the bounded worker pool,
    /// for callers that want off-thread execution of a long-running find
    /// or aggregation without blocking on the database directly.
    pub fn submit(&self, task: impl FnOnce() + Send + 'static) -> bool {
        self.pool.submit(task)
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        self.maintenance.lock().unwrap().take();
        self.pool.shutdown_and_drain();
    }
}

struct MaintenanceHandle {
    shutdown: Arc<AtomicBool>,
    notify: Arc<(Mutex<()>, Condvar)>,
    handle: Option<JoinHandle<()>>,
}

impl MaintenanceHandle {
    fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        self.notify.1.notify_one();
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

impl Drop for MaintenanceHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Spawns the background maintenance thread, or returns `None` if
/// `interval == Duration::ZERO`, disabling maintenance entirely.
fn spawn_maintenance(
    collections: Arc<RwLock<HashMap<String, Arc<Collection>>>>,
    cursors: Arc<CursorManager>,
    interval: Duration,
) -> Option<MaintenanceHandle> {
    if interval.is_zero() {
        return None;
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    let notify = Arc::new((Mutex::new(()), Condvar::new()));
    let sweep_shutdown = shutdown.clone();
    let sweep_notify = notify.clone();

    let handle = thread::spawn(move || loop {
        let (lock, cvar) = &*sweep_notify;
        let guard = lock.lock().unwrap();
        let _ = cvar.wait_timeout(guard, interval).unwrap();
        if sweep_shutdown.load(Ordering::Relaxed) {
            break;
        }

        let evicted = cursors.cleanup_timed_out();
        if evicted > 0 {
            log::debug!("maintenance: evicted {evicted} timed-out cursor(s)");
        }

        let snapshot: Vec<Arc<Collection>> = collections.read().unwrap().values().cloned().collect();
        let now = now_millis();
        for coll in snapshot {
            match coll.cleanup_expired_documents(now) {
                Ok(0) => {}
                Ok(n) => log::debug!("maintenance: expired {n} document(s) in '{}'", coll.name()),
                Err(e) => log::warn!("maintenance: ttl cleanup failed for '{}': {e}", coll.name()),
            }
        }
    });

    Some(MaintenanceHandle { shutdown, notify, handle: Some(handle) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use tempfile::tempdir;

    fn test_config(dir: &std::path::Path) -> Config {
        let mut cfg = Config::new(dir);
        cfg.maintenance_interval = Duration::ZERO;
        cfg
    }

    #[test]
    fn collections_are_created_implicitly() {
        let dir = tempdir().unwrap();
        let db = Database::open(test_config(dir.path())).unwrap();
        let id = db.insert_one("users", doc! { "name": "ada" }).unwrap();
        assert!(db.find_one("users", &doc! { "_id": &id }).unwrap().is_some());
        assert_eq!(db.list_collections(), vec!["users".to_string()]);
    }

    #[test]
    fn reopening_the_database_preserves_documents_and_indexes() {
        let dir = tempdir().unwrap();
        let path = dir.path().to_path_buf();
        {
            let db = Database::open(test_config(&path)).unwrap();
            db.create_index("users", "email", true).unwrap();
            db.insert_one("users", doc! { "_id": "u1", "email": "a@b.com" }).unwrap();
        }
        let db = Database::open(test_config(&path)).unwrap();
        let found = db.find_one("users", &doc! { "_id": "u1" }).unwrap().unwrap();
        assert_eq!(found.get_str("email").unwrap(), "a@b.com");
        assert_eq!(db.list_indexes("users").unwrap(), vec!["email".to_string()]);
        let dup = db.insert_one("users", doc! { "email": "a@b.com" });
        assert!(dup.is_err());
    }

    #[test]
    fn invalid_collection_name_is_rejected() {
        let dir = tempdir().unwrap();
        let db = Database::open(test_config(dir.path())).unwrap();
        let err = db.insert_one("not a valid name!", doc! { "n": 1 });
        assert!(matches!(err, Err(DbError::InvalidName(_))));
    }

    #[test]
    fn drop_collection_removes_it_from_the_catalog() {
        let dir = tempdir().unwrap();
        let db = Database::open(test_config(dir.path())).unwrap();
        db.insert_one("temp", doc! { "n": 1 }).unwrap();
        db.drop_collection("temp").unwrap();
        assert!(db.list_collections().is_empty());
    }

    #[test]
    fn find_cursor_batches_results() {
        let dir = tempdir().unwrap();
        let db = Database::open(test_config(dir.path())).unwrap();
        for i in 0..5 {
            db.insert_one("nums", doc! { "n": i }).unwrap();
        }
        let id = db
            .find_cursor_with("nums", &doc! {}, &FindOptions::default(), 2, Duration::from_secs(60))
            .unwrap();
        let mut total = 0;
        loop {
            let batch = db.cursor_next_batch(&id).unwrap();
            if batch.is_empty() {
                break;
            }
            total += batch.len();
        }
        assert_eq!(total, 5);
    }

    #[test]
    fn maintenance_thread_expires_ttl_documents_in_background() {
        let dir = tempdir().unwrap();
        let mut cfg = test_config(dir.path());
        cfg.maintenance_interval = Duration::from_millis(20);
        let db = Database::open(cfg).unwrap();
        db.create_ttl_index("sessions", "expires_at", 0).unwrap();
        db.insert_one("sessions", doc! { "_id": "s1", "expires_at": 1_i64 }).unwrap();
        thread::sleep(Duration::from_millis(150));
        assert!(db.find_one("sessions", &doc! { "_id": "s1" }).unwrap().is_none());
    }
}
