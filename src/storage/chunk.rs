//! Slot-allocated fixed-size record storage: a chunk is a contiguous run
//! of `N` record slots plus a used-slot bitmap; a chunked vector is an
//! ordered sequence of chunks with a free-list of chunks that still
//! have room, so record identity (the logical offset) never moves.

use rustc_hash::FxHashSet;

use crate::error::Result;
use crate::pager::{PageBuf, PagedFile};
use crate::storage::record::FixedRecord;

/// Logical offset into a [`ChunkedVec`]: `chunk_index * records_per_chunk + slot`.
pub type LogicalOffset = u64;

pub struct Chunk<T> {
    slots: Vec<Option<T>>,
    used: usize,
}

impl<T> Chunk<T> {
    fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self { slots, used: 0 }
    }

    fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn is_full(&self) -> bool {
        self.used == self.capacity()
    }

    fn first_free(&self) -> Option<usize> {
        self.slots.iter().position(|s| s.is_none())
    }
}

/// A record container addressed by logical offset, with free-list reuse
/// of erased slots and chunk-at-a-time growth.
pub struct ChunkedVec<T> {
    records_per_chunk: usize,
    chunks: Vec<Chunk<T>>,
    chunks_with_room: FxHashSet<usize>,
}

impl<T> ChunkedVec<T> {
    pub fn new(records_per_chunk: usize) -> Self {
        assert!(records_per_chunk > 0);
        Self {
            records_per_chunk,
            chunks: Vec::new(),
            chunks_with_room: FxHashSet::default(),
        }
    }

    fn split(&self, offset: LogicalOffset) -> (usize, usize) {
        let rpc = self.records_per_chunk as u64;
        ((offset / rpc) as usize, (offset % rpc) as usize)
    }

    fn join(&self, chunk: usize, slot: usize) -> LogicalOffset {
        chunk as u64 * self.records_per_chunk as u64 + slot as u64
    }

    fn grow_chunk(&mut self) -> usize {
        self.chunks.push(Chunk::new(self.records_per_chunk));
        let idx = self.chunks.len() - 1;
        self.chunks_with_room.insert(idx);
        idx
    }

    /// Appends unconditionally at the end, growing a new chunk if needed.
    /// Used by recovery redo, which must preserve the exact slot a
    /// record previously occupied rather than reusing a free slot.
    pub fn store_at(&mut self, offset: LogicalOffset, value: T) {
        let (chunk_idx, slot) = self.split(offset);
        while self.chunks.len() <= chunk_idx {
            self.grow_chunk();
        }
        let chunk = &mut self.chunks[chunk_idx];
        if chunk.slots[slot].is_none() {
            chunk.used += 1;
        }
        chunk.slots[slot] = Some(value);
        if self.chunks[chunk_idx].is_full() {
            self.chunks_with_room.remove(&chunk_idx);
        } else {
            self.chunks_with_room.insert(chunk_idx);
        }
    }

    /// Inserts into the first available free slot (reusing erased
    /// records before growing), returning its logical offset.
    pub fn store(&mut self, value: T) -> LogicalOffset {
        let chunk_idx = self
            .chunks_with_room
            .iter()
            .copied()
            .next()
            .unwrap_or_else(|| self.grow_chunk());
        let slot = self.chunks[chunk_idx].first_free().expect("tracked chunk has room");
        self.chunks[chunk_idx].slots[slot] = Some(value);
        self.chunks[chunk_idx].used += 1;
        if self.chunks[chunk_idx].is_full() {
            self.chunks_with_room.remove(&chunk_idx);
        }
        self.join(chunk_idx, slot)
    }

    /// Appends past the current high-water mark without scanning for a
    /// free slot; used for bulk load where reuse doesn't matter.
    pub fn append(&mut self, value: T) -> LogicalOffset {
        if self.chunks.last().map(|c| c.is_full()).unwrap_or(true) {
            self.grow_chunk();
        }
        let chunk_idx = self.chunks.len() - 1;
        let slot = self.chunks[chunk_idx].first_free().expect("just grew or has room");
        self.chunks[chunk_idx].slots[slot] = Some(value);
        self.chunks[chunk_idx].used += 1;
        if self.chunks[chunk_idx].is_full() {
            self.chunks_with_room.remove(&chunk_idx);
        }
        self.join(chunk_idx, slot)
    }

    pub fn at(&self, offset: LogicalOffset) -> Option<&T> {
        let (chunk_idx, slot) = self.split(offset);
        self.chunks.get(chunk_idx).and_then(|c| c.slots[slot].as_ref())
    }

    pub fn at_mut(&mut self, offset: LogicalOffset) -> Option<&mut T> {
        let (chunk_idx, slot) = self.split(offset);
        self.chunks.get_mut(chunk_idx).and_then(|c| c.slots[slot].as_mut())
    }

    /// Removes the record at `offset`, freeing its slot for reuse by
    /// [`store`]. Returns the removed value if present.
    pub fn erase(&mut self, offset: LogicalOffset) -> Option<T> {
        let (chunk_idx, slot) = self.split(offset);
        let chunk = self.chunks.get_mut(chunk_idx)?;
        let value = chunk.slots[slot].take();
        if value.is_some() {
            chunk.used -= 1;
            self.chunks_with_room.insert(chunk_idx);
        }
        value
    }

    pub fn is_allocated(&self, offset: LogicalOffset) -> bool {
        self.at(offset).is_some()
    }

    pub fn capacity(&self) -> LogicalOffset {
        (self.chunks.len() * self.records_per_chunk) as u64
    }

    pub fn num_chunks(&self) -> usize {
        self.chunks.len()
    }

    pub fn records_per_chunk(&self) -> usize {
        self.records_per_chunk
    }

    pub fn chunk_utilization(&self) -> Vec<(usize, usize)> {
        self.chunks.iter().map(|c| (c.used, c.capacity())).collect()
    }

    /// Iterates every occupied slot in offset order.
    pub fn iter(&self) -> impl Iterator<Item = (LogicalOffset, &T)> {
        let rpc = self.records_per_chunk;
        self.chunks.iter().enumerate().flat_map(move |(ci, chunk)| {
            chunk
                .slots
                .iter()
                .enumerate()
                .filter_map(move |(si, v)| v.as_ref().map(|v| ((ci * rpc + si) as u64, v)))
        })
    }

    /// Iterates occupied slots within chunk range `[first_chunk, last_chunk)`,
    /// used to partition a parallel label scan across worker threads.
    pub fn range(&self, first_chunk: usize, last_chunk: usize) -> impl Iterator<Item = (LogicalOffset, &T)> {
        let rpc = self.records_per_chunk;
        let last_chunk = last_chunk.min(self.chunks.len());
        self.chunks[first_chunk.min(last_chunk)..last_chunk]
            .iter()
            .enumerate()
            .flat_map(move |(rel_ci, chunk)| {
                let ci = first_chunk + rel_ci;
                chunk
                    .slots
                    .iter()
                    .enumerate()
                    .filter_map(move |(si, v)| v.as_ref().map(|v| ((ci * rpc + si) as u64, v)))
            })
    }
}

impl<T: FixedRecord> ChunkedVec<T> {
    /// Serializes every occupied slot as `offset(8) || encoded record`
    /// and persists the resulting blob across however many pages of
    /// `file` are needed, taken as the checkpointed snapshot of this
    /// vector. Mirrors [`crate::storage::dictionary::Dictionary::flush_to_file`].
    pub fn flush_to_file(&self, file: &mut PagedFile) -> Result<()> {
        let entry_len = 8 + T::ENCODED_LEN;
        let mut blob = Vec::with_capacity(self.iter().count() * entry_len);
        for (offset, record) in self.iter() {
            blob.extend_from_slice(&offset.to_le_bytes());
            let mut buf = vec![0u8; T::ENCODED_LEN];
            record.encode(&mut buf);
            blob.extend_from_slice(&buf);
        }

        let page_size = file.page_size();
        let usable = page_size - 8;
        let pages_needed = 1 + (blob.len().saturating_sub(usable)).div_ceil(page_size);
        while (file.page_count() as usize) < pages_needed {
            file.allocate_page()?;
        }

        let mut buf = PageBuf::zeroed(page_size);
        buf.data[0..8].copy_from_slice(&(blob.len() as u64).to_le_bytes());
        let first_chunk = blob.len().min(usable);
        buf.data[8..8 + first_chunk].copy_from_slice(&blob[..first_chunk]);
        file.write_page(1, &buf)?;

        let mut written = first_chunk;
        let mut pid = 2u32;
        while written < blob.len() {
            let chunk = (blob.len() - written).min(page_size);
            let mut page = PageBuf::zeroed(page_size);
            page.data[..chunk].copy_from_slice(&blob[written..written + chunk]);
            file.write_page(pid, &page)?;
            written += chunk;
            pid += 1;
        }
        Ok(())
    }

    /// Rebuilds a vector from a snapshot written by [`flush_to_file`],
    /// preserving every record's original logical offset via
    /// [`store_at`].
    pub fn load_from_file(file: &mut PagedFile, records_per_chunk: usize) -> Result<Self> {
        let mut out = Self::new(records_per_chunk);
        if file.page_count() == 0 {
            return Ok(out);
        }
        let page_size = file.page_size();
        let usable = page_size - 8;
        let first = file.read_page(1)?;
        let total_len = u64::from_le_bytes(first.data[0..8].try_into().unwrap()) as usize;
        let mut blob = Vec::with_capacity(total_len);
        let first_chunk = total_len.min(usable);
        blob.extend_from_slice(&first.data[8..8 + first_chunk]);

        let mut pid = 2u32;
        while blob.len() < total_len && pid <= file.page_count() {
            let page = file.read_page(pid)?;
            let remaining = total_len - blob.len();
            let take = remaining.min(page_size);
            blob.extend_from_slice(&page.data[..take]);
            pid += 1;
        }

        let entry_len = 8 + T::ENCODED_LEN;
        for entry in blob.chunks_exact(entry_len) {
            let offset = u64::from_le_bytes(entry[0..8].try_into().unwrap());
            out.store_at(offset, T::decode(&entry[8..]));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_reuses_erased_slots() {
        let mut v: ChunkedVec<u32> = ChunkedVec::new(4);
        let a = v.store(10);
        let b = v.store(20);
        v.erase(a);
        let c = v.store(30);
        assert_eq!(c, a);
        assert_eq!(*v.at(b).unwrap(), 20);
    }

    #[test]
    fn grows_across_chunk_boundary() {
        let mut v: ChunkedVec<u32> = ChunkedVec::new(2);
        for i in 0..5u32 {
            v.store(i);
        }
        assert_eq!(v.num_chunks(), 3);
        assert_eq!(v.iter().count(), 5);
    }

    #[test]
    fn store_at_preserves_identity_for_redo() {
        let mut v: ChunkedVec<u32> = ChunkedVec::new(4);
        v.store_at(9, 99);
        assert_eq!(*v.at(9).unwrap(), 99);
        assert_eq!(v.num_chunks(), 3);
    }
}
