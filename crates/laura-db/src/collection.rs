//! The collection façade — the one type application code actually calls.
//! Wires together the document store, the index set, the query planner,
//! the update engine, the lock manager, and the query cache into
//! `insert_one`/`find`/`update_one`/etc.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Mutex, RwLock};
use std::time::Duration;

use bson::{Bson, Document};
use laura_engine::{DocumentStore, IndexHandle};
use laura_query::{apply_projection, apply_update, parse_filter, parse_update, FindOptions};
use uuid::Uuid;

use crate::aggregate;
use crate::cache::{fingerprint, QueryCache};
use crate::error::DbError;
use crate::lock::LockManager;
use crate::meta::{self, DescKind, IndexDescriptor};
use crate::planner::{self, IndexRef};

/// One write operation within a `bulk_write` call.
pub enum BulkOp {
    InsertOne(Document),
    UpdateOne { filter: Document, update: Document },
    DeleteOne { filter: Document },
}

#[derive(Debug, Clone)]
pub struct BulkWriteError {
    pub index: usize,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct BulkWriteResult {
    pub inserted_count: u64,
    pub modified_count: u64,
    pub deleted_count: u64,
    pub inserted_ids: Vec<String>,
    pub errors: Vec<BulkWriteError>,
}

/// A collection: one document store plus its live index set, guarded by
/// the document lock manager and fronted by a query cache.
pub struct Collection {
    id: u32,
    name: String,
    store: DocumentStore,
    indexes: RwLock<HashMap<String, IndexHandle>>,
    descriptors: Mutex<Vec<IndexDescriptor>>,
    index_meta_path: Option<PathBuf>,
    locks: LockManager,
    cache: QueryCache,
}

impl Collection {
    /// Opens a collection backed by `store`. If `index_meta_path` names an
    /// existing sidecar, every descriptor in it is rebuilt and backfilled
    /// from the store's current documents, since indexes have no on-disk
    /// form of their own, only their definitions do.
    pub fn open(
        id: u32,
        name: String,
        store: DocumentStore,
        index_meta_path: Option<PathBuf>,
        lock_stripes: usize,
        cache_capacity: usize,
        cache_ttl: Duration,
    ) -> Result<Self, DbError> {
        let descriptors = match &index_meta_path {
            Some(path) => meta::load(path),
            None => Vec::new(),
        };
        let mut indexes = HashMap::new();
        for desc in &descriptors {
            let handle = meta::build_handle(desc)?;
            for doc_id in store.all_ids() {
                if let Some(doc) = store.get(&doc_id)? {
                    // best-effort: a stale duplicate must not block reopening
                    let _ = handle.insert_document(&doc, &doc_id);
                }
            }
            indexes.insert(desc.name.clone(), handle);
        }
        Ok(Collection {
            id,
            name,
            store,
            indexes: RwLock::new(indexes),
            descriptors: Mutex::new(descriptors),
            index_meta_path,
            locks: LockManager::new(lock_stripes),
            cache: QueryCache::new(cache_capacity, cache_ttl),
        })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn count(&self) -> u64 {
        self.store.count()
    }

    fn index_refs<'a>(indexes: &'a HashMap<String, IndexHandle>) -> Vec<IndexRef<'a>> {
        indexes.iter().map(|(name, handle)| IndexRef { name, handle }).collect()
    }

    fn candidates(&self, filter: &laura_query::Filter) -> Vec<String> {
        let indexes = self.indexes.read().unwrap();
        let refs = Self::index_refs(&indexes);
        match planner::candidate_ids(filter, &refs) {
            Some((ids, _)) => ids,
            None => self.store.all_ids(),
        }
    }

    /// Finds the first document matching `filter`, scanning candidates
    /// from the planner under `filter`'s own evaluation (the planner only
    /// narrows, it never substitutes for a full re-check).
    fn resolve_one(&self, filter: &laura_query::Filter) -> Result<Option<(String, Document)>, DbError> {
        for id in self.candidates(filter) {
            if let Some(doc) = self.store.get(&id)? {
                if filter.evaluate(&doc) {
                    return Ok(Some((id, doc)));
                }
            }
        }
        Ok(None)
    }

    /// Inserts `doc`, generating an id via `uuid::Uuid::new_v4` if `_id` is
    /// absent. Indexes are rolled back best-effort if any rejects the
    /// insert, with no write-ahead log.
    pub fn insert_one(&self, mut doc: Document) -> Result<String, DbError> {
        let id = match doc.get("_id") {
            Some(Bson::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => Uuid::new_v4().to_string(),
        };
        doc.insert("_id", id.clone());

        let _guard = self.locks.write(&id);
        self.store.insert(&id, &doc)?;

        let indexes = self.indexes.read().unwrap();
        for handle in indexes.values() {
            if let Err(e) = handle.insert_document(&doc, &id) {
                for h in indexes.values() {
                    h.remove_document(&doc, &id);
                }
                drop(indexes);
                let _ = self.store.delete(&id);
                return Err(e.into());
            }
        }
        drop(indexes);
        self.cache.clear();
        Ok(id)
    }

    pub fn find_one(&self, filter_doc: &Document) -> Result<Option<Document>, DbError> {
        let mut options = FindOptions::default();
        options.limit = Some(1);
        Ok(self.find(filter_doc, &options)?.into_iter().next())
    }

    /// Runs `filter_doc`/`options` against the collection, serving from
    /// the query cache when the exact fingerprint has been seen before
    ///.
    pub fn find(&self, filter_doc: &Document, options: &FindOptions) -> Result<Vec<Document>, DbError> {
        let key = fingerprint(filter_doc, options);
        if let Some(cached) = self.cache.get(key) {
            return Ok(cached);
        }

        let filter = parse_filter(filter_doc)?;
        let mut docs = Vec::new();
        for id in self.candidates(&filter) {
            if let Some(d) = self.store.get(&id)? {
                if filter.evaluate(&d) {
                    docs.push(d);
                }
            }
        }
        if let Some(sort) = &options.sort {
            sort.apply(&mut docs);
        }
        if options.skip > 0 {
            docs = docs.into_iter().skip(options.skip).collect();
        }
        if let Some(n) = options.limit {
            docs.truncate(n);
        }
        if let Some(projection) = &options.projection {
            docs = docs.iter().map(|d| apply_projection(d, projection)).collect();
        }

        self.cache.put(key, docs.clone());
        Ok(docs)
    }

    /// Applies `update_doc` to the first document matching `filter_doc`.
    /// Returns `false` if nothing matched. Indexes are transitioned after
    /// the store write succeeds.
    pub fn update_one(&self, filter_doc: &Document, update_doc: &Document) -> Result<bool, DbError> {
        let filter = parse_filter(filter_doc)?;
        let update = parse_update(update_doc)?;

        let Some((id, current)) = self.resolve_one(&filter)? else {
            return Ok(false);
        };
        let _guard = self.locks.write(&id);
        // re-fetch under the document lock: the candidate snapshot above
        // raced with no protection against a concurrent writer.
        let Some(current) = self.store.get(&id)? else {
            return Ok(false);
        };
        if !filter.evaluate(&current) {
            return Ok(false);
        }
        let new_doc = apply_update(&current, &update)?;

        if !self.store.update(&id, &new_doc)? {
            self.store.delete(&id)?;
            self.store.insert(&id, &new_doc)?;
        }

        let indexes = self.indexes.read().unwrap();
        for handle in indexes.values() {
            handle.transition_document(&current, &new_doc, &id)?;
        }
        drop(indexes);
        self.cache.clear();
        Ok(true)
    }

    /// Replaces every index entry and cache slot matching `filter_doc`, one
    /// document at a time, applying `update_doc` to each.
    pub fn update_many(&self, filter_doc: &Document, update_doc: &Document) -> Result<u64, DbError> {
        let filter = parse_filter(filter_doc)?;
        let update = parse_update(update_doc)?;
        let ids = self.candidates(&filter);
        let mut modified = 0;
        for id in ids {
            let _guard = self.locks.write(&id);
            let Some(current) = self.store.get(&id)? else { continue };
            if !filter.evaluate(&current) {
                continue;
            }
            let new_doc = apply_update(&current, &update)?;
            if !self.store.update(&id, &new_doc)? {
                self.store.delete(&id)?;
                self.store.insert(&id, &new_doc)?;
            }
            let indexes = self.indexes.read().unwrap();
            for handle in indexes.values() {
                handle.transition_document(&current, &new_doc, &id)?;
            }
            drop(indexes);
            modified += 1;
        }
        if modified > 0 {
            self.cache.clear();
        }
        Ok(modified)
    }

    pub fn delete_one(&self, filter_doc: &Document) -> Result<bool, DbError> {
        let filter = parse_filter(filter_doc)?;
        let Some((id, _)) = self.resolve_one(&filter)? else {
            return Ok(false);
        };
        let _guard = self.locks.write(&id);
        let Some(doc) = self.store.get(&id)? else {
            return Ok(false);
        };
        if !filter.evaluate(&doc) {
            return Ok(false);
        }
        self.store.delete(&id)?;
        let indexes = self.indexes.read().unwrap();
        for handle in indexes.values() {
            handle.remove_document(&doc, &id);
        }
        drop(indexes);
        self.cache.clear();
        Ok(true)
    }

    pub fn delete_many(&self, filter_doc: &Document) -> Result<u64, DbError> {
        let filter = parse_filter(filter_doc)?;
        let ids = self.candidates(&filter);
        let mut deleted = 0;
        for id in ids {
            let _guard = self.locks.write(&id);
            let Some(doc) = self.store.get(&id)? else { continue };
            if !filter.evaluate(&doc) {
                continue;
            }
            self.store.delete(&id)?;
            let indexes = self.indexes.read().unwrap();
            for handle in indexes.values() {
                handle.remove_document(&doc, &id);
            }
            drop(indexes);
            deleted += 1;
        }
        if deleted > 0 {
            self.cache.clear();
        }
        Ok(deleted)
    }

    /// Runs `ops` in order if `ordered`, stopping at the first failure;
    /// otherwise runs every op and collects every failure.
    pub fn bulk_write(&self, ops: Vec<BulkOp>, ordered: bool) -> BulkWriteResult {
        let mut result = BulkWriteResult::default();
        for (index, op) in ops.into_iter().enumerate() {
            let outcome: Result<(), DbError> = match op {
                BulkOp::InsertOne(doc) => self.insert_one(doc).map(|id| {
                    result.inserted_ids.push(id);
                    result.inserted_count += 1;
                }),
                BulkOp::UpdateOne { filter, update } => self.update_one(&filter, &update).map(|modified| {
                    if modified {
                        result.modified_count += 1;
                    }
                }),
                BulkOp::DeleteOne { filter } => self.delete_one(&filter).map(|deleted| {
                    if deleted {
                        result.deleted_count += 1;
                    }
                }),
            };
            if let Err(e) = outcome {
                result.errors.push(BulkWriteError { index, message: e.to_string() });
                if ordered {
                    break;
                }
            }
        }
        result
    }

    /// Materializes every document and runs `pipeline` over it. No stage
    /// pushes down onto an index; aggregation always scans.
    pub fn aggregate(&self, pipeline: &[Document]) -> Result<Vec<Document>, DbError> {
        let mut docs = Vec::with_capacity(self.store.count() as usize);
        for id in self.store.all_ids() {
            if let Some(d) = self.store.get(&id)? {
                docs.push(d);
            }
        }
        Ok(aggregate::run_pipeline(docs, pipeline)?)
    }

    /// Ranks every document against `query` using the first text index
    /// covering any of its fields, annotating each hit with `_textScore`.
    pub fn text_search(&self, query: &str) -> Result<Vec<Document>, DbError> {
        let indexes = self.indexes.read().unwrap();
        let text_index = indexes.values().find_map(|h| match h {
            IndexHandle::Text { index } => Some(index),
            _ => None,
        });
        let Some(text_index) = text_index else {
            return Err(DbError::NoTextIndex);
        };
        let hits = text_index.search(query);
        drop(indexes);

        let mut out = Vec::with_capacity(hits.len());
        for (id, score) in hits {
            if let Some(mut doc) = self.store.get(&id)? {
                doc.insert("_textScore", score);
                out.push(doc);
            }
        }
        Ok(out)
    }

    fn install_index(&self, name: String, kind: DescKind, fields: Vec<String>) -> Result<(), DbError> {
        let desc = IndexDescriptor { name: name.clone(), fields, kind };
        let handle = meta::build_handle(&desc)?;
        {
            let mut indexes = self.indexes.write().unwrap();
            if indexes.contains_key(&name) {
                return Err(DbError::Duplicate(name));
            }
            for id in self.store.all_ids() {
                if let Some(doc) = self.store.get(&id)? {
                    handle.insert_document(&doc, &id)?;
                }
            }
            indexes.insert(name, handle);
        }
        self.save_descriptor(desc);
        Ok(())
    }

    fn save_descriptor(&self, desc: IndexDescriptor) {
        let mut guard = self.descriptors.lock().unwrap();
        guard.push(desc);
        self.persist_descriptors(&guard);
    }

    fn persist_descriptors(&self, descriptors: &[IndexDescriptor]) {
        if let Some(path) = &self.index_meta_path {
            if let Err(e) = meta::save(path, descriptors) {
                log::warn!("failed to persist index descriptors for '{}': {e}", self.name);
            }
        }
    }

    pub fn create_index(&self, field: &str, unique: bool) -> Result<String, DbError> {
        let name = field.to_string();
        let kind = if unique { DescKind::Unique } else { DescKind::Ordered };
        self.install_index(name.clone(), kind, vec![field.to_string()])?;
        Ok(name)
    }

    pub fn create_ttl_index(&self, field: &str, ttl_seconds: u64) -> Result<String, DbError> {
        let name = format!("{field}_ttl");
        self.install_index(name.clone(), DescKind::Ttl { seconds: ttl_seconds }, vec![field.to_string()])?;
        Ok(name)
    }

    pub fn create_partial_index(&self, field: &str, filter_doc: &Document, unique: bool) -> Result<String, DbError> {
        let name = format!("{field}_partial");
        let filter_json = serde_json::to_value(filter_doc).map_err(|e| DbError::Serialization(e.to_string()))?;
        self.install_index(name.clone(), DescKind::Partial { unique, filter: filter_json }, vec![field.to_string()])?;
        Ok(name)
    }

    pub fn create_text_index(&self, fields: Vec<String>) -> Result<String, DbError> {
        let name = format!("{}_text", fields.join("_"));
        self.install_index(name.clone(), DescKind::Text, fields)?;
        Ok(name)
    }

    pub fn drop_index(&self, name: &str) -> Result<(), DbError> {
        {
            let mut indexes = self.indexes.write().unwrap();
            if indexes.remove(name).is_none() {
                return Err(DbError::NotFound(name.to_string()));
            }
        }
        let mut guard = self.descriptors.lock().unwrap();
        guard.retain(|d| d.name != name);
        self.persist_descriptors(&guard);
        self.cache.clear();
        Ok(())
    }

    pub fn list_indexes(&self) -> Vec<String> {
        self.indexes.read().unwrap().keys().cloned().collect()
    }

    /// Sweeps every TTL index for expired ids and removes the matching
    /// documents from the store and every other index. Called periodically
    /// by the database's background maintenance thread.
    pub fn cleanup_expired_documents(&self, now_millis: i64) -> Result<usize, DbError> {
        let mut expired: Vec<String> = {
            let indexes = self.indexes.read().unwrap();
            indexes
                .values()
                .filter_map(|h| match h {
                    IndexHandle::Ttl { index, .. } => Some(index.get_expired(now_millis)),
                    _ => None,
                })
                .flatten()
                .collect()
        };
        let mut seen = HashSet::new();
        expired.retain(|id| seen.insert(id.clone()));

        let mut removed = 0;
        for id in expired {
            let _guard = self.locks.write(&id);
            if let Some(doc) = self.store.get(&id)? {
                self.store.delete(&id)?;
                let indexes = self.indexes.read().unwrap();
                for handle in indexes.values() {
                    handle.remove_document(&doc, &id);
                }
                removed += 1;
            }
        }
        if removed > 0 {
            self.cache.clear();
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use laura_pager::Pager;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn collection() -> (tempfile::TempDir, Collection) {
        let dir = tempdir().unwrap();
        let pager = Arc::new(Pager::open(&dir.path().join("data.laur")).unwrap());
        pager.allocate_page().unwrap();
        let store = DocumentStore::new(pager);
        let coll = Collection::open(1, "people".into(), store, None, 8, 100, Duration::from_secs(60)).unwrap();
        (dir, coll)
    }

    #[test]
    fn insert_then_find_round_trips() {
        let (_dir, c) = collection();
        let id = c.insert_one(doc! { "name": "ava", "age": 30 }).unwrap();
        let found = c.find_one(&doc! { "_id": &id }).unwrap().unwrap();
        assert_eq!(found.get_str("name").unwrap(), "ava");
    }

    #[test]
    fn insert_generates_id_when_absent() {
        let (_dir, c) = collection();
        let id = c.insert_one(doc! { "name": "noam" }).unwrap();
        assert!(!id.is_empty());
    }

    #[test]
    fn update_one_applies_operators_and_transitions_indexes() {
        let (_dir, c) = collection();
        c.create_index("age", false).unwrap();
        let id = c.insert_one(doc! { "_id": "p1", "age": 20 }).unwrap();
        let modified = c.update_one(&doc! { "_id": &id }, &doc! { "$inc": { "age": 1 } }).unwrap();
        assert!(modified);
        let found = c.find_one(&doc! { "_id": &id }).unwrap().unwrap();
        assert_eq!(found.get_i32("age").unwrap(), 21);
        let hits = c.find(&doc! { "age": 21 }, &FindOptions::default()).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn delete_one_removes_document_and_index_entry() {
        let (_dir, c) = collection();
        c.create_index("age", false).unwrap();
        let id = c.insert_one(doc! { "_id": "p1", "age": 5 }).unwrap();
        assert!(c.delete_one(&doc! { "_id": &id }).unwrap());
        assert!(c.find_one(&doc! { "_id": &id }).unwrap().is_none());
    }

    #[test]
    fn unique_index_rejects_duplicate_and_rolls_back_insert() {
        let (_dir, c) = collection();
        c.create_index("email", true).unwrap();
        c.insert_one(doc! { "email": "a@b.com" }).unwrap();
        let err = c.insert_one(doc! { "email": "a@b.com" });
        assert!(matches!(err, Err(DbError::Duplicate(_))));
        assert_eq!(c.count(), 1);
    }

    #[test]
    fn query_cache_clears_on_mutation() {
        let (_dir, c) = collection();
        c.insert_one(doc! { "_id": "a", "n": 1 }).unwrap();
        let _ = c.find(&doc! {}, &FindOptions::default()).unwrap();
        assert_eq!(c.cache.stats().size, 1);
        c.update_one(&doc! { "_id": "a" }, &doc! { "$set": { "n": 2 } }).unwrap();
        assert_eq!(c.cache.stats().size, 0);
    }

    #[test]
    fn bulk_write_ordered_stops_on_first_error() {
        let (_dir, c) = collection();
        c.create_index("email", true).unwrap();
        c.insert_one(doc! { "email": "a@b.com" }).unwrap();
        let ops = vec![
            BulkOp::InsertOne(doc! { "email": "a@b.com" }),
            BulkOp::InsertOne(doc! { "email": "c@d.com" }),
        ];
        let result = c.bulk_write(ops, true);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.inserted_count, 0);
        assert_eq!(c.count(), 1);
    }

    #[test]
    fn bulk_write_unordered_continues_past_errors() {
        let (_dir, c) = collection();
        c.create_index("email", true).unwrap();
        c.insert_one(doc! { "email": "a@b.com" }).unwrap();
        let ops = vec![
            BulkOp::InsertOne(doc! { "email": "a@b.com" }),
            BulkOp::InsertOne(doc! { "email": "c@d.com" }),
        ];
        let result = c.bulk_write(ops, false);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.inserted_count, 1);
        assert_eq!(c.count(), 2);
    }

    #[test]
    fn ttl_cleanup_removes_expired_documents() {
        let (_dir, c) = collection();
        c.create_ttl_index("expires_at", 0).unwrap();
        c.insert_one(doc! { "_id": "a", "expires_at": 1_000_i64 }).unwrap();
        let removed = c.cleanup_expired_documents(2_000).unwrap();
        assert_eq!(removed, 1);
        assert!(c.find_one(&doc! { "_id": "a" }).unwrap().is_none());
    }

    #[test]
    fn text_search_ranks_and_annotates_score() {
        let (_dir, c) = collection();
        c.create_text_index(vec!["body".into()]).unwrap();
        c.insert_one(doc! { "_id": "a", "body": "rust database engine" }).unwrap();
        c.insert_one(doc! { "_id": "b", "body": "rust rust rust" }).unwrap();
        let hits = c.text_search("rust").unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits[0].get_f64("_textScore").is_ok());
    }

    #[test]
    fn drop_index_removes_it_from_the_live_set() {
        let (_dir, c) = collection();
        c.create_index("age", false).unwrap();
        assert_eq!(c.list_indexes().len(), 1);
        c.drop_index("age").unwrap();
        assert!(c.list_indexes().is_empty());
        assert!(matches!(c.drop_index("age"), Err(DbError::NotFound(_))));
    }

    #[test]
    fn reopening_a_collection_rebuilds_indexes_from_sidecar() {
        let dir = tempdir().unwrap();
        let data_path = dir.path().join("data.laur");
        let index_path = dir.path().join("people.indexes.json");
        {
            let pager = Arc::new(Pager::open(&data_path).unwrap());
            pager.allocate_page().unwrap();
            let store = DocumentStore::new(pager);
            let coll = Collection::open(
                1,
                "people".into(),
                store,
                Some(index_path.clone()),
                8,
                100,
                Duration::from_secs(60),
            )
            .unwrap();
            coll.create_index("age", false).unwrap();
            coll.insert_one(doc! { "_id": "a", "age": 9 }).unwrap();
        }
        let pager = Arc::new(Pager::open(&data_path).unwrap());
        let page_ids: Vec<u32> = (1..pager.page_count()).collect();
        let store = DocumentStore::reopen(pager, &page_ids).unwrap();
        let coll = Collection::open(1, "people".into(), store, Some(index_path), 8, 100, Duration::from_secs(60))
            .unwrap();
        assert_eq!(coll.list_indexes(), vec!["age".to_string()]);
        let hits = coll.find(&doc! { "age": 9 }, &FindOptions::default()).unwrap();
        assert_eq!(hits.len(), 1);
    }
}
