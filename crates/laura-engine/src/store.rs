//! The document store — a single read-write lock over an id-map plus a
//! working set of slotted pages.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use bson::Document;
use laura_pager::{Pager, SlottedPage, LOW_WATER_MARK, PAGE_SIZE};

use crate::codec::{decode_document, encode_document};
use crate::error::EngineError;

const ACTIVE_SET_CAP: usize = 100;
const SLOT_ENTRY_SIZE: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Location {
    page_id: u32,
    slot_id: u32,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct StoreStats {
    pub document_count: u64,
    pub active_pages: usize,
    pub total_pages_touched: usize,
}

struct StoreInner {
    ids: HashMap<String, Location>,
    active_pages: Vec<u32>,
    pages: HashMap<u32, SlottedPage>,
}

/// Document store for a single collection's data pages.
pub struct DocumentStore {
    pager: Arc<Pager>,
    inner: RwLock<StoreInner>,
}

impl DocumentStore {
    pub fn new(pager: Arc<Pager>) -> Self {
        DocumentStore {
            pager,
            inner: RwLock::new(StoreInner {
                ids: HashMap::new(),
                active_pages: Vec::new(),
                pages: HashMap::new(),
            }),
        }
    }

    /// Reopens a store for a collection whose data pages already exist,
    /// rebuilding the id-map by scanning every page reachable from
    /// `first_page` onward. Multi-page chaining for the catalog itself is
    /// tracked separately via `first_metadata_page`; document pages here
    /// are simply every page the collection has ever allocated, tracked
    /// by the caller.
    pub fn reopen(pager: Arc<Pager>, page_ids: &[u32]) -> Result<Self, EngineError> {
        let store = DocumentStore::new(pager);
        {
            let mut guard = store.inner.write().unwrap();
            for &page_id in page_ids {
                let raw = store.pager.read_page(page_id)?;
                let page = SlottedPage::from_bytes(raw);
                for (slot_id, bytes) in page.iter() {
                    let doc = decode_document(bytes)?;
                    if let Some(id) = doc.get_str("_id").ok().map(|s| s.to_string()) {
                        guard.ids.insert(id, Location { page_id, slot_id });
                    }
                }
                if page.contiguous_free() >= LOW_WATER_MARK {
                    guard.active_pages.push(page_id);
                }
                guard.pages.insert(page_id, page);
            }
        }
        Ok(store)
    }

    pub fn insert(&self, id: &str, doc: &Document) -> Result<(), EngineError> {
        let mut guard = self.inner.write().unwrap();
        if guard.ids.contains_key(id) {
            return Err(EngineError::Duplicate(id.to_string()));
        }
        let bytes = encode_document(doc)?;
        let required = bytes.len() + SLOT_ENTRY_SIZE;

        let target_page = guard
            .active_pages
            .iter()
            .copied()
            .find(|pid| {
                guard
                    .pages
                    .get(pid)
                    .map(|p| p.contiguous_free() >= required)
                    .unwrap_or(false)
            });

        let page_id = match target_page {
            Some(pid) => pid,
            None => self.allocate_page(&mut guard)?,
        };

        let slot_id = {
            let page = guard.pages.get_mut(&page_id).unwrap();
            page.insert(&bytes)?
        };

        if let Err(e) = self.persist_page(&guard, page_id) {
            let page = guard.pages.get_mut(&page_id).unwrap();
            let _ = page.delete(slot_id);
            return Err(e);
        }

        guard.ids.insert(id.to_string(), Location { page_id, slot_id });
        self.refresh_active_set(&mut guard, page_id);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Option<Document>, EngineError> {
        let guard = self.inner.read().unwrap();
        let Some(loc) = guard.ids.get(id) else {
            return Ok(None);
        };
        let page = guard
            .pages
            .get(&loc.page_id)
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;
        match page.get(loc.slot_id) {
            Some(bytes) => Ok(Some(decode_document(bytes)?)),
            None => Ok(None),
        }
    }

    pub fn exists(&self, id: &str) -> bool {
        self.inner.read().unwrap().ids.contains_key(id)
    }

    /// Attempts in-place replacement within the same slot. Returns `Ok(false)`
    /// if the new encoding doesn't fit — callers fall back to delete+insert.
    pub fn update(&self, id: &str, doc: &Document) -> Result<bool, EngineError> {
        let mut guard = self.inner.write().unwrap();
        let loc = match guard.ids.get(id) {
            Some(l) => *l,
            None => return Err(EngineError::NotFound(id.to_string())),
        };
        let bytes = encode_document(doc)?;

        let fits = {
            let page = guard.pages.get_mut(&loc.page_id).unwrap();
            page.update_in_place(loc.slot_id, &bytes).is_ok()
        };
        if !fits {
            return Ok(false);
        }
        if let Err(e) = self.persist_page(&guard, loc.page_id) {
            return Err(e);
        }
        Ok(true)
    }

    pub fn delete(&self, id: &str) -> Result<(), EngineError> {
        let mut guard = self.inner.write().unwrap();
        let loc = match guard.ids.remove(id) {
            Some(l) => l,
            None => return Err(EngineError::NotFound(id.to_string())),
        };
        if let Some(page) = guard.pages.get_mut(&loc.page_id) {
            let _ = page.delete(loc.slot_id);
        }
        if let Err(e) = self.persist_page(&guard, loc.page_id) {
            guard.ids.insert(id.to_string(), loc);
            return Err(e);
        }
        self.refresh_active_set(&mut guard, loc.page_id);
        Ok(())
    }

    pub fn all_ids(&self) -> Vec<String> {
        self.inner.read().unwrap().ids.keys().cloned().collect()
    }

    pub fn count(&self) -> u64 {
        self.inner.read().unwrap().ids.len() as u64
    }

    pub fn flush_all(&self) -> Result<(), EngineError> {
        self.pager.sync()?;
        Ok(())
    }

    pub fn stats(&self) -> StoreStats {
        let guard = self.inner.read().unwrap();
        StoreStats {
            document_count: guard.ids.len() as u64,
            active_pages: guard.active_pages.len(),
            total_pages_touched: guard.pages.len(),
        }
    }

    /// All data page ids this store has ever allocated, for persistence of
    /// the owning collection's metadata (`first_data_page` chain).
    pub fn page_ids(&self) -> Vec<u32> {
        self.inner.read().unwrap().pages.keys().copied().collect()
    }

    fn allocate_page(&self, guard: &mut StoreInner) -> Result<u32, EngineError> {
        let page_id = self.pager.allocate_page()?;
        guard.pages.insert(page_id, SlottedPage::new(page_id));
        Ok(page_id)
    }

    fn persist_page(&self, guard: &StoreInner, page_id: u32) -> Result<(), EngineError> {
        let page = guard.pages.get(&page_id).expect("page must exist");
        self.pager.write_page(page_id, &page.as_bytes())?;
        Ok(())
    }

    /// Removes `page_id` from the active set once its contiguous free
    /// space drops below the low-water mark, or (re)admits it, and enforces
    /// the active-set cap: beyond the cap, pages stay usable in
    /// place but are not retained as insert targets.
    fn refresh_active_set(&self, guard: &mut StoreInner, page_id: u32) {
        let free = guard
            .pages
            .get(&page_id)
            .map(|p| p.contiguous_free())
            .unwrap_or(0);
        guard.active_pages.retain(|&p| p != page_id);
        if free >= LOW_WATER_MARK && guard.active_pages.len() < ACTIVE_SET_CAP {
            guard.active_pages.push(page_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use tempfile::tempdir;

    fn store() -> (tempfile::TempDir, DocumentStore) {
        let dir = tempdir().unwrap();
        let pager = Arc::new(Pager::open(&dir.path().join("data.laur")).unwrap());
        // page 0 is the catalog page; allocate a fresh page for data use.
        pager.allocate_page().unwrap();
        (dir, DocumentStore::new(pager))
    }

    #[test]
    fn insert_and_get_round_trip() {
        let (_dir, s) = store();
        let doc = doc! { "_id": "a1", "name": "alice" };
        s.insert("a1", &doc).unwrap();
        let back = s.get("a1").unwrap().unwrap();
        assert_eq!(back.get_str("name").unwrap(), "alice");
    }

    #[test]
    fn duplicate_insert_fails() {
        let (_dir, s) = store();
        let doc = doc! { "_id": "a1" };
        s.insert("a1", &doc).unwrap();
        assert!(matches!(s.insert("a1", &doc), Err(EngineError::Duplicate(_))));
    }

    #[test]
    fn update_in_place_when_it_fits() {
        let (_dir, s) = store();
        s.insert("a1", &doc! { "_id": "a1", "n": 1 }).unwrap();
        let fits = s.update("a1", &doc! { "_id": "a1", "n": 2 }).unwrap();
        assert!(fits);
        assert_eq!(s.get("a1").unwrap().unwrap().get_i32("n").unwrap(), 2);
    }

    #[test]
    fn update_reports_failure_when_it_does_not_fit() {
        let (_dir, s) = store();
        s.insert("a1", &doc! { "_id": "a1", "n": 1 }).unwrap();
        let big = "x".repeat(PAGE_SIZE);
        let fits = s.update("a1", &doc! { "_id": "a1", "blob": big }).unwrap();
        assert!(!fits);
    }

    #[test]
    fn delete_removes_from_id_map() {
        let (_dir, s) = store();
        s.insert("a1", &doc! { "_id": "a1" }).unwrap();
        s.delete("a1").unwrap();
        assert!(!s.exists("a1"));
        assert_eq!(s.count(), 0);
    }

    #[test]
    fn delete_missing_id_errors() {
        let (_dir, s) = store();
        assert!(matches!(s.delete("nope"), Err(EngineError::NotFound(_))));
    }

    #[test]
    fn all_ids_reflects_inserts() {
        let (_dir, s) = store();
        s.insert("a1", &doc! { "_id": "a1" }).unwrap();
        s.insert("a2", &doc! { "_id": "a2" }).unwrap();
        let mut ids = s.all_ids();
        ids.sort();
        assert_eq!(ids, vec!["a1".to_string(), "a2".to_string()]);
    }

    #[test]
    fn reopen_rebuilds_id_map_from_pages() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.laur");
        let page_id;
        {
            let pager = Arc::new(Pager::open(&path).unwrap());
            page_id = pager.allocate_page().unwrap();
            let s = DocumentStore::new(pager);
            s.insert("a1", &doc! { "_id": "a1", "n": 1 }).unwrap();
        }
        let pager = Arc::new(Pager::open(&path).unwrap());
        let s = DocumentStore::reopen(pager, &[page_id]).unwrap();
        assert!(s.exists("a1"));
        assert_eq!(s.count(), 1);
    }
}
