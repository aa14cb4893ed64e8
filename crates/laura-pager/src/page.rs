use crate::error::PagerError;

/// Fixed page size for the data file. Page 0 is reserved for the catalog
/// and is written directly by `laura-engine::catalog` using its own
/// 32-byte header; every other page uses the slotted layout below.
pub const PAGE_SIZE: usize = 4096;

const HEADER_SIZE: usize = 12;
const SLOT_SIZE: usize = 4;
const TOMBSTONE: u16 = u16::MAX;

/// Low-water mark below which a page is no longer offered for new inserts
/// by the document store's active-page set.
pub const LOW_WATER_MARK: usize = 256;

/// A single slotted page: a small fixed header, a slot directory growing
/// forward from the header, and a data area packed backward from the end
/// of the page. Slot ids are stable across updates and deletes (deletes
/// tombstone rather than compact).
pub struct SlottedPage {
    buf: Box<[u8; PAGE_SIZE]>,
}

impl SlottedPage {
    /// Initialize a fresh, empty page with the given id.
    pub fn new(page_id: u32) -> Self {
        let mut buf = Box::new([0u8; PAGE_SIZE]);
        write_u32(&mut buf, 0, page_id);
        write_u16(&mut buf, 4, 0); // slot_count
        write_u16(&mut buf, 6, HEADER_SIZE as u16); // free_start
        write_u16(&mut buf, 8, PAGE_SIZE as u16); // free_end
        write_u16(&mut buf, 10, 0); // reserved
        SlottedPage { buf }
    }

    /// Wrap an existing on-disk page buffer.
    pub fn from_bytes(buf: [u8; PAGE_SIZE]) -> Self {
        SlottedPage { buf: Box::new(buf) }
    }

    pub fn as_bytes(&self) -> &[u8; PAGE_SIZE] {
        &self.buf
    }

    pub fn page_id(&self) -> u32 {
        read_u32(&self.buf, 0)
    }

    pub fn slot_count(&self) -> u16 {
        read_u16(&self.buf, 4)
    }

    fn free_start(&self) -> u16 {
        read_u16(&self.buf, 6)
    }

    fn free_end(&self) -> u16 {
        read_u16(&self.buf, 8)
    }

    /// Contiguous free space between the slot directory and the data area.
    pub fn contiguous_free(&self) -> usize {
        self.free_end() as usize - self.free_start() as usize
    }

    /// Space a new record of `len` bytes would consume (slot entry + data).
    pub fn required_space(len: usize) -> usize {
        SLOT_SIZE + len
    }

    fn slot_offset(slot_id: u32) -> usize {
        HEADER_SIZE + slot_id as usize * SLOT_SIZE
    }

    fn read_slot(&self, slot_id: u32) -> Option<(u16, u16)> {
        if slot_id as u16 >= self.slot_count() {
            return None;
        }
        let off = Self::slot_offset(slot_id);
        let offset = read_u16(&self.buf, off);
        let length = read_u16(&self.buf, off + 2);
        Some((offset, length))
    }

    fn write_slot(&mut self, slot_id: u32, offset: u16, length: u16) {
        let off = Self::slot_offset(slot_id);
        write_u16(&mut self.buf, off, offset);
        write_u16(&mut self.buf, off + 2, length);
    }

    /// Fetch the bytes stored at `slot_id`, or `None` if the slot is
    /// unused or tombstoned.
    pub fn get(&self, slot_id: u32) -> Option<&[u8]> {
        let (offset, length) = self.read_slot(slot_id)?;
        if length == TOMBSTONE {
            return None;
        }
        let start = offset as usize;
        let end = start + length as usize;
        Some(&self.buf[start..end])
    }

    /// Insert a new record, returning its slot id. Fails if the page does
    /// not have `required_space(data.len())` contiguous bytes free.
    pub fn insert(&mut self, data: &[u8]) -> Result<u32, PagerError> {
        if self.contiguous_free() < Self::required_space(data.len()) {
            return Err(PagerError::PageFull);
        }
        let slot_id = self.slot_count() as u32;
        let new_end = self.free_end() as usize - data.len();
        self.buf[new_end..new_end + data.len()].copy_from_slice(data);
        self.write_slot(slot_id, new_end as u16, data.len() as u16);
        write_u16(&mut self.buf, 4, self.slot_count() + 1);
        write_u16(&mut self.buf, 6, self.free_start() + SLOT_SIZE as u16);
        write_u16(&mut self.buf, 8, new_end as u16);
        Ok(slot_id)
    }

    /// Replace the bytes stored at `slot_id` in place. Succeeds only if
    /// `data` fits within the slot's currently reserved length; the
    /// caller falls back to delete+insert otherwise.
    pub fn update_in_place(&mut self, slot_id: u32, data: &[u8]) -> Result<(), PagerError> {
        let (offset, length) = self
            .read_slot(slot_id)
            .ok_or(PagerError::InvalidSlot(slot_id))?;
        if length == TOMBSTONE {
            return Err(PagerError::InvalidSlot(slot_id));
        }
        if data.len() > length as usize {
            return Err(PagerError::PageFull);
        }
        let start = offset as usize;
        self.buf[start..start + data.len()].copy_from_slice(data);
        self.write_slot(slot_id, offset, data.len() as u16);
        Ok(())
    }

    /// Tombstone a slot. The occupied bytes are not reclaimed; only a
    /// full page rebuild (out of scope) compacts them.
    pub fn delete(&mut self, slot_id: u32) -> Result<(), PagerError> {
        let (offset, length) = self
            .read_slot(slot_id)
            .ok_or(PagerError::InvalidSlot(slot_id))?;
        if length == TOMBSTONE {
            return Err(PagerError::InvalidSlot(slot_id));
        }
        self.write_slot(slot_id, offset, TOMBSTONE);
        Ok(())
    }

    /// Iterate over `(slot_id, bytes)` for every live (non-tombstoned) slot.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &[u8])> {
        (0..self.slot_count() as u32).filter_map(move |id| self.get(id).map(|data| (id, data)))
    }
}

fn read_u16(buf: &[u8], off: usize) -> u16 {
    u16::from_le_bytes(buf[off..off + 2].try_into().unwrap())
}

fn write_u16(buf: &mut [u8], off: usize, v: u16) {
    buf[off..off + 2].copy_from_slice(&v.to_le_bytes());
}

fn read_u32(buf: &[u8], off: usize) -> u32 {
    u32::from_le_bytes(buf[off..off + 4].try_into().unwrap())
}

fn write_u32(buf: &mut [u8], off: usize, v: u32) {
    buf[off..off + 4].copy_from_slice(&v.to_le_bytes());
}
