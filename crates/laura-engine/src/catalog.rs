//! The collection catalog, persisted on page 0.
//!
//! Page 0 holds a 32-byte header followed by a variable-length directory of
//! collection entries. This is the one page in the file that is not a
//! `SlottedPage` — its layout is fixed by the wire format below, not by the
//! generic slot/data-area split `laura_pager::page` uses for document pages.

use std::collections::HashMap;
use std::sync::Mutex;

use laura_pager::{Pager, PAGE_SIZE};

use crate::error::EngineError;

const MAGIC: u32 = 0x4C41_5552; // "LAUR"
const VERSION: u16 = 1;
const HEADER_LEN: usize = 32;

const FLAG_ACTIVE: u16 = 1 << 0;
const FLAG_SYSTEM: u16 = 1 << 1;

#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    pub collection_id: u32,
    pub name: String,
    pub metadata_page: u32,
    pub active: bool,
    pub system: bool,
}

struct CatalogHeader {
    collection_count: u32,
    next_collection_id: u32,
    first_metadata_page: u32,
    free_metadata_page: u32,
    last_checkpoint_txn_id: u64,
}

impl CatalogHeader {
    fn fresh() -> Self {
        CatalogHeader {
            collection_count: 0,
            next_collection_id: 1,
            first_metadata_page: 0,
            free_metadata_page: 0,
            last_checkpoint_txn_id: 0,
        }
    }
}

struct CatalogState {
    header: CatalogHeader,
    // all entries, including inactive (dropped) ones, in directory order
    entries: Vec<CatalogEntry>,
}

/// The in-memory catalog, backed by page 0 of the pager.
pub struct Catalog {
    pager: std::sync::Arc<Pager>,
    state: Mutex<CatalogState>,
}

impl Catalog {
    /// Opens the catalog, reading page 0 if it exists, or initializing a
    /// fresh header if its magic doesn't match.
    pub fn open(pager: std::sync::Arc<Pager>) -> Result<Self, EngineError> {
        let raw = pager.read_page(0)?;
        let state = match decode_page(&raw) {
            Some((header, entries)) => CatalogState { header, entries },
            None => CatalogState {
                header: CatalogHeader::fresh(),
                entries: Vec::new(),
            },
        };
        let catalog = Catalog {
            pager,
            state: Mutex::new(state),
        };
        catalog.persist()?;
        Ok(catalog)
    }

    /// Registers a new collection, returning its assigned id.
    ///
    /// Fails if `name` is empty or already active. On persist failure, all
    /// in-memory changes (name, id counter, count) are rolled back.
    pub fn register(&self, name: &str, system: bool) -> Result<u32, EngineError> {
        if !system && !is_valid_collection_name(name) {
            return Err(EngineError::InvalidName(name.to_string()));
        }
        let mut guard = self.state.lock().unwrap();
        if guard
            .entries
            .iter()
            .any(|e| e.active && e.name == name)
        {
            return Err(EngineError::Duplicate(name.to_string()));
        }

        let snapshot_entries = guard.entries.clone();
        let snapshot_count = guard.header.collection_count;
        let snapshot_next_id = guard.header.next_collection_id;

        let id = guard.header.next_collection_id;
        guard.entries.push(CatalogEntry {
            collection_id: id,
            name: name.to_string(),
            metadata_page: 0,
            active: true,
            system,
        });
        guard.header.next_collection_id += 1;
        guard.header.collection_count += 1;

        if let Err(e) = persist_locked(&self.pager, &guard) {
            log::warn!("register('{name}'): persist failed, rolling back: {e}");
            guard.entries = snapshot_entries;
            guard.header.collection_count = snapshot_count;
            guard.header.next_collection_id = snapshot_next_id;
            return Err(e);
        }
        Ok(id)
    }

    /// Sets the metadata page for a collection entry (called once its
    /// metadata record has been written).
    pub fn set_metadata_page(&self, collection_id: u32, page: u32) -> Result<(), EngineError> {
        let mut guard = self.state.lock().unwrap();
        let snapshot = guard.entries.clone();
        match guard
            .entries
            .iter_mut()
            .find(|e| e.collection_id == collection_id && e.active)
        {
            Some(entry) => entry.metadata_page = page,
            None => return Err(EngineError::NotFound(collection_id.to_string())),
        }
        if let Err(e) = persist_locked(&self.pager, &guard) {
            log::warn!("set_metadata_page({collection_id}): persist failed, rolling back: {e}");
            guard.entries = snapshot;
            return Err(e);
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<CatalogEntry> {
        let guard = self.state.lock().unwrap();
        guard
            .entries
            .iter()
            .find(|e| e.active && e.name == name)
            .cloned()
    }

    pub fn get_by_id(&self, collection_id: u32) -> Option<CatalogEntry> {
        let guard = self.state.lock().unwrap();
        guard
            .entries
            .iter()
            .find(|e| e.active && e.collection_id == collection_id)
            .cloned()
    }

    pub fn list(&self) -> Vec<CatalogEntry> {
        let guard = self.state.lock().unwrap();
        guard.entries.iter().filter(|e| e.active).cloned().collect()
    }

    pub fn count(&self) -> u32 {
        let guard = self.state.lock().unwrap();
        guard.header.collection_count
    }

    /// Flips the active bit and removes the collection from the in-memory
    /// active set. The directory entry itself is retained (tombstoned).
    pub fn drop_collection(&self, name: &str) -> Result<(), EngineError> {
        let mut guard = self.state.lock().unwrap();
        let snapshot = guard.entries.clone();
        let snapshot_count = guard.header.collection_count;
        match guard.entries.iter_mut().find(|e| e.active && e.name == name) {
            Some(entry) => entry.active = false,
            None => return Err(EngineError::NotFound(name.to_string())),
        }
        guard.header.collection_count = guard.header.collection_count.saturating_sub(1);
        if let Err(e) = persist_locked(&self.pager, &guard) {
            log::warn!("drop_collection('{name}'): persist failed, rolling back: {e}");
            guard.entries = snapshot;
            guard.header.collection_count = snapshot_count;
            return Err(e);
        }
        Ok(())
    }

    fn persist(&self) -> Result<(), EngineError> {
        let guard = self.state.lock().unwrap();
        persist_locked(&self.pager, &guard)
    }
}

/// Collection names are 1..255 chars of `[A-Za-z0-9_-]`, and may not start
/// with the reserved `system.` prefix (that prefix is reserved for
/// internal bookkeeping collections, registered with `system: true`).
fn is_valid_collection_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 255
        && !name.starts_with("system.")
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn persist_locked(pager: &Pager, state: &CatalogState) -> Result<(), EngineError> {
    let bytes = encode_page(state)?;
    pager.write_page(0, &bytes)?;
    Ok(())
}

fn encode_page(state: &CatalogState) -> Result<[u8; PAGE_SIZE], EngineError> {
    let mut buf = Vec::with_capacity(HEADER_LEN);
    buf.extend_from_slice(&MAGIC.to_le_bytes());
    buf.extend_from_slice(&VERSION.to_le_bytes());
    buf.extend_from_slice(&state.header.collection_count.to_le_bytes());
    buf.extend_from_slice(&state.header.next_collection_id.to_le_bytes());
    buf.extend_from_slice(&state.header.first_metadata_page.to_le_bytes());
    buf.extend_from_slice(&state.header.free_metadata_page.to_le_bytes());
    buf.extend_from_slice(&state.header.last_checkpoint_txn_id.to_le_bytes());
    buf.extend_from_slice(&0u16.to_le_bytes()); // reserved

    for entry in &state.entries {
        buf.extend_from_slice(&entry.collection_id.to_le_bytes());
        let name_bytes = entry.name.as_bytes();
        buf.extend_from_slice(&(name_bytes.len() as u16).to_le_bytes());
        buf.extend_from_slice(name_bytes);
        buf.extend_from_slice(&entry.metadata_page.to_le_bytes());
        let mut flags = 0u16;
        if entry.active {
            flags |= FLAG_ACTIVE;
        }
        if entry.system {
            flags |= FLAG_SYSTEM;
        }
        buf.extend_from_slice(&flags.to_le_bytes());
    }

    if buf.len() > PAGE_SIZE {
        return Err(EngineError::PageFull);
    }
    let mut page = [0u8; PAGE_SIZE];
    page[..buf.len()].copy_from_slice(&buf);
    Ok(page)
}

fn decode_page(raw: &[u8]) -> Option<(CatalogHeader, Vec<CatalogEntry>)> {
    if raw.len() < HEADER_LEN {
        return None;
    }
    let magic = u32::from_le_bytes(raw[0..4].try_into().ok()?);
    if magic != MAGIC {
        return None;
    }
    let version = u16::from_le_bytes(raw[4..6].try_into().ok()?);
    if version != VERSION {
        return None;
    }
    let collection_count = u32::from_le_bytes(raw[6..10].try_into().ok()?);
    let next_collection_id = u32::from_le_bytes(raw[10..14].try_into().ok()?);
    let first_metadata_page = u32::from_le_bytes(raw[14..18].try_into().ok()?);
    let free_metadata_page = u32::from_le_bytes(raw[18..22].try_into().ok()?);
    let last_checkpoint_txn_id = u64::from_le_bytes(raw[22..30].try_into().ok()?);

    let mut entries = Vec::new();
    let mut pos = HEADER_LEN;
    while pos + 4 + 2 <= raw.len() {
        let collection_id = u32::from_le_bytes(raw[pos..pos + 4].try_into().ok()?);
        pos += 4;
        let name_len = u16::from_le_bytes(raw[pos..pos + 2].try_into().ok()?) as usize;
        pos += 2;
        if name_len == 0 && collection_id == 0 {
            break;
        }
        if pos + name_len + 4 + 2 > raw.len() {
            break;
        }
        let name = std::str::from_utf8(&raw[pos..pos + name_len]).ok()?.to_string();
        pos += name_len;
        let metadata_page = u32::from_le_bytes(raw[pos..pos + 4].try_into().ok()?);
        pos += 4;
        let flags = u16::from_le_bytes(raw[pos..pos + 2].try_into().ok()?);
        pos += 2;
        entries.push(CatalogEntry {
            collection_id,
            name,
            metadata_page,
            active: flags & FLAG_ACTIVE != 0,
            system: flags & FLAG_SYSTEM != 0,
        });
    }

    Some((
        CatalogHeader {
            collection_count,
            next_collection_id,
            first_metadata_page,
            free_metadata_page,
            last_checkpoint_txn_id,
        },
        entries,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn open_catalog(dir: &std::path::Path) -> Catalog {
        let pager = Arc::new(Pager::open(&dir.join("data.laur")).unwrap());
        Catalog::open(pager).unwrap()
    }

    #[test]
    fn register_and_get() {
        let dir = tempdir().unwrap();
        let cat = open_catalog(dir.path());
        let id = cat.register("users", false).unwrap();
        assert_eq!(id, 1);
        let entry = cat.get("users").unwrap();
        assert_eq!(entry.collection_id, 1);
        assert!(entry.active);
    }

    #[test]
    fn duplicate_name_rejected() {
        let dir = tempdir().unwrap();
        let cat = open_catalog(dir.path());
        cat.register("users", false).unwrap();
        assert!(matches!(
            cat.register("users", false),
            Err(EngineError::Duplicate(_))
        ));
    }

    #[test]
    fn empty_name_rejected() {
        let dir = tempdir().unwrap();
        let cat = open_catalog(dir.path());
        assert!(matches!(cat.register("", false), Err(EngineError::InvalidName(_))));
    }

    #[test]
    fn names_with_invalid_charset_or_system_prefix_rejected() {
        let dir = tempdir().unwrap();
        let cat = open_catalog(dir.path());
        assert!(matches!(cat.register("has space", false), Err(EngineError::InvalidName(_))));
        assert!(matches!(cat.register("has.dot", false), Err(EngineError::InvalidName(_))));
        assert!(matches!(cat.register("system.indexes", false), Err(EngineError::InvalidName(_))));
        assert!(cat.register("system.indexes", true).is_ok());
        assert!(cat.register("valid_name-1", false).is_ok());
    }

    #[test]
    fn drop_removes_from_active_set() {
        let dir = tempdir().unwrap();
        let cat = open_catalog(dir.path());
        cat.register("users", false).unwrap();
        cat.drop_collection("users").unwrap();
        assert!(cat.get("users").is_none());
        assert_eq!(cat.count(), 0);
    }

    #[test]
    fn round_trips_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.laur");
        {
            let pager = Arc::new(Pager::open(&path).unwrap());
            let cat = Catalog::open(pager).unwrap();
            cat.register("users", false).unwrap();
            cat.register("orders", false).unwrap();
        }
        let pager = Arc::new(Pager::open(&path).unwrap());
        let cat = Catalog::open(pager).unwrap();
        let mut names: Vec<String> = cat.list().into_iter().map(|e| e.name).collect();
        names.sort();
        assert_eq!(names, vec!["orders".to_string(), "users".to_string()]);
        assert_ne!(
            cat.get("users").unwrap().collection_id,
            cat.get("orders").unwrap().collection_id
        );
    }

    #[test]
    fn drop_then_reregister_gets_new_id() {
        let dir = tempdir().unwrap();
        let cat = open_catalog(dir.path());
        let first = cat.register("users", false).unwrap();
        cat.drop_collection("users").unwrap();
        let second = cat.register("users", false).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn bad_magic_initializes_fresh_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.laur");
        {
            let pager = Pager::open(&path).unwrap();
            pager.write_page(0, &[0xFFu8; PAGE_SIZE]).unwrap();
        }
        let pager = Arc::new(Pager::open(&path).unwrap());
        let cat = Catalog::open(pager).unwrap();
        assert_eq!(cat.count(), 0);
    }
}
