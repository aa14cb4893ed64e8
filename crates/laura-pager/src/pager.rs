use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Mutex;

use crate::error::PagerError;
use crate::page::PAGE_SIZE;

/// A raw 4 KiB page, as read from or about to be written to disk.
pub type PageBuf = [u8; PAGE_SIZE];

/// Reads and writes fixed-size pages of a single data file by id, and
/// allocates new ones. Page 0 is reserved for the catalog
/// and always exists once the file is opened.
///
/// All operations serialize through a single mutex: the pager is the
/// lowest layer of the concurrency stack and every disk access
/// elsewhere in the crate happens while a higher-level lock (the document
/// store's rwlock, the catalog mutex) is already held.
pub struct Pager {
    inner: Mutex<PagerInner>,
}

struct PagerInner {
    file: File,
    page_count: u32,
}

impl Pager {
    /// Open (creating if absent) the data file at `path`. Ensures page 0
    /// exists so the catalog always has somewhere to live.
    pub fn open(path: &Path) -> Result<Self, PagerError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .inspect_err(|e| log::warn!("open({}): failed: {e}", path.display()))?;
        let len = file.metadata()?.len();
        let page_count = (len / PAGE_SIZE as u64) as u32;
        let mut inner = PagerInner { file, page_count };
        if page_count == 0 {
            inner.allocate()?;
        }
        Ok(Pager {
            inner: Mutex::new(inner),
        })
    }

    pub fn page_count(&self) -> u32 {
        self.inner.lock().unwrap().page_count
    }

    pub fn read_page(&self, id: u32) -> Result<PageBuf, PagerError> {
        self.inner.lock().unwrap().read(id)
    }

    pub fn write_page(&self, id: u32, data: &PageBuf) -> Result<(), PagerError> {
        self.inner.lock().unwrap().write(id, data)
    }

    /// Allocate a new zeroed page and return its id.
    pub fn allocate_page(&self) -> Result<u32, PagerError> {
        self.inner.lock().unwrap().allocate()
    }

    pub fn sync(&self) -> Result<(), PagerError> {
        self.inner.lock().unwrap().file.sync_all()?;
        Ok(())
    }
}

impl PagerInner {
    fn offset(id: u32) -> u64 {
        id as u64 * PAGE_SIZE as u64
    }

    fn read(&mut self, id: u32) -> Result<PageBuf, PagerError> {
        if id >= self.page_count {
            log::warn!("read_page({id}): out of range (have {})", self.page_count);
            return Err(PagerError::CorruptPage(format!(
                "page {id} out of range (have {})",
                self.page_count
            )));
        }
        self.file.seek(SeekFrom::Start(Self::offset(id))).inspect_err(|e| {
            log::warn!("read_page({id}): seek failed: {e}");
        })?;
        let mut buf = [0u8; PAGE_SIZE];
        self.file.read_exact(&mut buf).inspect_err(|e| {
            log::warn!("read_page({id}): read failed: {e}");
        })?;
        Ok(buf)
    }

    fn write(&mut self, id: u32, data: &PageBuf) -> Result<(), PagerError> {
        self.file.seek(SeekFrom::Start(Self::offset(id))).inspect_err(|e| {
            log::warn!("write_page({id}): seek failed: {e}");
        })?;
        self.file.write_all(data).inspect_err(|e| {
            log::warn!("write_page({id}): write failed: {e}");
        })?;
        self.file.flush().inspect_err(|e| {
            log::warn!("write_page({id}): flush failed: {e}");
        })?;
        Ok(())
    }

    fn allocate(&mut self) -> Result<u32, PagerError> {
        let id = self.page_count;
        self.write(id, &[0u8; PAGE_SIZE])?;
        self.page_count += 1;
        log::debug!("allocated page {id}");
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_creates_page_zero() {
        let dir = tempfile::tempdir().unwrap();
        let pager = Pager::open(&dir.path().join("data.laura")).unwrap();
        assert_eq!(pager.page_count(), 1);
        pager.read_page(0).unwrap();
    }

    #[test]
    fn allocate_and_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let pager = Pager::open(&dir.path().join("data.laura")).unwrap();
        let id = pager.allocate_page().unwrap();
        assert_eq!(id, 1);
        let mut buf = [0u8; PAGE_SIZE];
        buf[0] = 0xAB;
        pager.write_page(id, &buf).unwrap();
        let back = pager.read_page(id).unwrap();
        assert_eq!(back[0], 0xAB);
    }

    #[test]
    fn reopen_preserves_pages() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.laura");
        {
            let pager = Pager::open(&path).unwrap();
            let id = pager.allocate_page().unwrap();
            let mut buf = [0u8; PAGE_SIZE];
            buf[10] = 42;
            pager.write_page(id, &buf).unwrap();
            pager.sync().unwrap();
        }
        let pager = Pager::open(&path).unwrap();
        assert_eq!(pager.page_count(), 2);
        let buf = pager.read_page(1).unwrap();
        assert_eq!(buf[10], 42);
    }
}
